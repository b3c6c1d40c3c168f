//! Benchmark Definitions
//!
//! A [`Benchmark`] is one fully expanded variable combination of a benchmark
//! definition. Instances are produced by [`BenchmarkBuilder`] before the suite
//! starts and are shared immutably (usually behind an `Arc`) by every stage
//! of the pipeline afterwards.

use crate::error::ModelError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Query property naming a data source that overrides the benchmark's one
pub const DATA_SOURCE_PROPERTY: &str = "datasource";

/// A named SQL template
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    /// Query name
    pub name: String,
    /// SQL text with `${var}` placeholders
    pub sql_template: String,
    /// Free-form key/value properties
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

impl Query {
    /// Create a query without properties
    pub fn new(name: impl Into<String>, sql_template: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sql_template: sql_template.into(),
            properties: BTreeMap::new(),
        }
    }

    /// Attach a property
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Explicit data source override, if any
    pub fn data_source(&self) -> Option<&str> {
        self.properties.get(DATA_SOURCE_PROPERTY).map(String::as_str)
    }
}

/// One concrete benchmark: a fixed query list run `runs` times at a fixed concurrency
#[derive(Debug, Clone, PartialEq)]
pub struct Benchmark {
    name: String,
    unique_name: String,
    sequence_id: String,
    data_source: String,
    environment: String,
    queries: Vec<Query>,
    runs: u32,
    prewarm_runs: u32,
    concurrency: u32,
    before_benchmark_macros: Vec<String>,
    after_benchmark_macros: Vec<String>,
    before_execution_macros: Vec<String>,
    after_execution_macros: Vec<String>,
    variables: BTreeMap<String, String>,
}

impl Benchmark {
    /// Definition name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Deterministic name derived from the definition name and variables
    pub fn unique_name(&self) -> &str {
        &self.unique_name
    }

    /// Suite run identifier shared by all benchmarks of one invocation
    pub fn sequence_id(&self) -> &str {
        &self.sequence_id
    }

    /// Default data source for all queries
    pub fn data_source(&self) -> &str {
        &self.data_source
    }

    /// Environment tag reported to the results store
    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// Queries in execution order
    pub fn queries(&self) -> &[Query] {
        &self.queries
    }

    /// Number of measured passes through the query list
    pub fn runs(&self) -> u32 {
        self.runs
    }

    /// Number of unreported passes executed before measurement starts
    pub fn prewarm_runs(&self) -> u32 {
        self.prewarm_runs
    }

    /// Worker pool size
    pub fn concurrency(&self) -> u32 {
        self.concurrency
    }

    /// Macros run once before the first query
    pub fn before_benchmark_macros(&self) -> &[String] {
        &self.before_benchmark_macros
    }

    /// Macros run once after the last query
    pub fn after_benchmark_macros(&self) -> &[String] {
        &self.after_benchmark_macros
    }

    /// Macros run before every query execution
    pub fn before_execution_macros(&self) -> &[String] {
        &self.before_execution_macros
    }

    /// Macros run after every query execution
    pub fn after_execution_macros(&self) -> &[String] {
        &self.after_execution_macros
    }

    /// Concrete variable values of this combination
    pub fn variables(&self) -> &BTreeMap<String, String> {
        &self.variables
    }

    /// More than one worker
    pub fn is_concurrent(&self) -> bool {
        self.concurrency > 1
    }

    /// Exactly one worker
    pub fn is_serial(&self) -> bool {
        !self.is_concurrent()
    }

    /// Number of measured query executions (`runs * queries`)
    pub fn total_executions(&self) -> usize {
        self.runs as usize * self.queries.len()
    }

    /// Every macro name referenced by the benchmark-level phases
    pub fn macro_names(&self) -> impl Iterator<Item = &str> {
        self.before_benchmark_macros
            .iter()
            .chain(&self.after_benchmark_macros)
            .chain(&self.before_execution_macros)
            .chain(&self.after_execution_macros)
            .map(String::as_str)
    }
}

impl std::fmt::Display for Benchmark {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} (runs={}, prewarm={}, concurrency={})",
            self.unique_name, self.runs, self.prewarm_runs, self.concurrency
        )
    }
}

/// Build the unique name for a benchmark: `name` followed by `_key=value` for
/// every variable in key order, with anything outside `[A-Za-z0-9_=-]`
/// replaced by `_`.
pub fn unique_name(name: &str, variables: &BTreeMap<String, String>) -> String {
    let mut raw = String::from(name);
    for (key, value) in variables {
        raw.push('_');
        raw.push_str(key);
        raw.push('=');
        raw.push_str(value);
    }

    raw.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '=' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Step-wise constructor for [`Benchmark`]
#[derive(Debug, Clone)]
pub struct BenchmarkBuilder {
    name: String,
    sequence_id: String,
    queries: Vec<Query>,
    data_source: String,
    environment: String,
    runs: u32,
    prewarm_runs: u32,
    concurrency: u32,
    before_benchmark_macros: Vec<String>,
    after_benchmark_macros: Vec<String>,
    before_execution_macros: Vec<String>,
    after_execution_macros: Vec<String>,
    variables: BTreeMap<String, String>,
}

impl BenchmarkBuilder {
    /// Start a builder with defaults: 3 runs, no prewarm, one worker
    pub fn new(name: impl Into<String>, sequence_id: impl Into<String>, queries: Vec<Query>) -> Self {
        Self {
            name: name.into(),
            sequence_id: sequence_id.into(),
            queries,
            data_source: String::new(),
            environment: String::from("default"),
            runs: 3,
            prewarm_runs: 0,
            concurrency: 1,
            before_benchmark_macros: Vec::new(),
            after_benchmark_macros: Vec::new(),
            before_execution_macros: Vec::new(),
            after_execution_macros: Vec::new(),
            variables: BTreeMap::new(),
        }
    }

    /// Default data source
    pub fn data_source(mut self, data_source: impl Into<String>) -> Self {
        self.data_source = data_source.into();
        self
    }

    /// Environment tag
    pub fn environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = environment.into();
        self
    }

    /// Measured runs
    pub fn runs(mut self, runs: u32) -> Self {
        self.runs = runs;
        self
    }

    /// Prewarm runs
    pub fn prewarm_runs(mut self, prewarm_runs: u32) -> Self {
        self.prewarm_runs = prewarm_runs;
        self
    }

    /// Worker pool size
    pub fn concurrency(mut self, concurrency: u32) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Macros run before the benchmark
    pub fn before_benchmark_macros(mut self, macros: Vec<String>) -> Self {
        self.before_benchmark_macros = macros;
        self
    }

    /// Macros run after the benchmark
    pub fn after_benchmark_macros(mut self, macros: Vec<String>) -> Self {
        self.after_benchmark_macros = macros;
        self
    }

    /// Macros run before each execution
    pub fn before_execution_macros(mut self, macros: Vec<String>) -> Self {
        self.before_execution_macros = macros;
        self
    }

    /// Macros run after each execution
    pub fn after_execution_macros(mut self, macros: Vec<String>) -> Self {
        self.after_execution_macros = macros;
        self
    }

    /// Variable values of this combination
    pub fn variables(mut self, variables: BTreeMap<String, String>) -> Self {
        self.variables = variables;
        self
    }

    /// Validate and freeze the benchmark
    pub fn build(self) -> Result<Benchmark, ModelError> {
        if self.name.is_empty() {
            return Err(ModelError::MissingField {
                benchmark: self.name,
                field: "name",
            });
        }
        if self.data_source.is_empty() {
            return Err(ModelError::MissingField {
                benchmark: self.name,
                field: "data_source",
            });
        }
        if self.queries.is_empty() {
            return Err(ModelError::NoQueries {
                benchmark: self.name,
            });
        }
        if self.concurrency == 0 {
            return Err(ModelError::InvalidConcurrency {
                benchmark: self.name,
            });
        }
        if self.runs == 0 {
            return Err(ModelError::InvalidRuns {
                benchmark: self.name,
            });
        }

        let unique_name = unique_name(&self.name, &self.variables);

        Ok(Benchmark {
            name: self.name,
            unique_name,
            sequence_id: self.sequence_id,
            data_source: self.data_source,
            environment: self.environment,
            queries: self.queries,
            runs: self.runs,
            prewarm_runs: self.prewarm_runs,
            concurrency: self.concurrency,
            before_benchmark_macros: self.before_benchmark_macros,
            after_benchmark_macros: self.after_benchmark_macros,
            before_execution_macros: self.before_execution_macros,
            after_execution_macros: self.after_execution_macros,
            variables: self.variables,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn builder() -> BenchmarkBuilder {
        BenchmarkBuilder::new("q1", "seq", vec![Query::new("q1", "SELECT 1")]).data_source("trino")
    }

    #[test]
    fn test_unique_name_sorts_and_sanitizes() {
        let name = unique_name("tpch q1", &vars(&[("schema", "sf1.0"), ("format", "orc")]));
        assert_eq!(name, "tpch_q1_format=orc_schema=sf1_0");
    }

    #[test]
    fn test_unique_name_without_variables() {
        assert_eq!(unique_name("simple", &BTreeMap::new()), "simple");
    }

    #[test]
    fn test_build_computes_unique_name() {
        let benchmark = builder()
            .variables(vars(&[("schema", "tiny")]))
            .build()
            .unwrap();
        assert_eq!(benchmark.unique_name(), "q1_schema=tiny");
        assert_eq!(benchmark.runs(), 3);
        assert!(benchmark.is_serial());
        assert!(!benchmark.is_concurrent());
    }

    #[test]
    fn test_concurrent_and_serial_are_exclusive() {
        let benchmark = builder().concurrency(5).build().unwrap();
        assert!(benchmark.is_concurrent());
        assert!(!benchmark.is_serial());
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let err = builder().concurrency(0).build().unwrap_err();
        assert!(matches!(err, ModelError::InvalidConcurrency { .. }));
    }

    #[test]
    fn test_zero_runs_rejected() {
        let err = builder().runs(0).build().unwrap_err();
        assert!(matches!(err, ModelError::InvalidRuns { .. }));
    }

    #[test]
    fn test_missing_data_source_rejected() {
        let err = BenchmarkBuilder::new("q", "seq", vec![Query::new("q", "SELECT 1")])
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            ModelError::MissingField {
                benchmark: "q".to_string(),
                field: "data_source"
            }
        );
    }

    #[test]
    fn test_query_data_source_override() {
        let query = Query::new("q", "SELECT 1").with_property(DATA_SOURCE_PROPERTY, "hive");
        assert_eq!(query.data_source(), Some("hive"));
        assert_eq!(Query::new("q", "SELECT 1").data_source(), None);
    }

    #[test]
    fn test_total_executions() {
        let benchmark = BenchmarkBuilder::new(
            "multi",
            "seq",
            vec![Query::new("a", "SELECT 1"), Query::new("b", "SELECT 2")],
        )
        .data_source("trino")
        .runs(4)
        .build()
        .unwrap();
        assert_eq!(benchmark.total_executions(), 8);
    }
}
