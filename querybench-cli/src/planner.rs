//! Benchmark Planner
//!
//! Turns `[[benchmark]]` definitions into the immutable benchmark list the
//! orchestrator runs.
//!
//! ```text
//! [[benchmark]] definitions (file order)
//!       │
//!       ▼  expand variables (odometer order, keys sorted)
//!       ▼  active-variables filter (full regex match)
//!       ▼  name filter (name or unique name)
//!       ▼  validate: duplicates, references, macros, pool size
//! Vec<Arc<Benchmark>>
//! ```
//!
//! Every problem found here is a [`ConfigError`] and fatal before the suite
//! starts.

use crate::config::{BenchConfig, BenchmarkDefinition, MacroConfig};
use crate::error::ConfigError;
use crate::macros::MacroDispatcher;
use crate::sql::DataSources;
use querybench_core::{
    BENCHMARK_NAME_VARIABLE, Benchmark, BenchmarkBuilder, DATA_SOURCE_PROPERTY, Query,
    VariableCombination, expand_variables,
};
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::Path;
use std::sync::Arc;

/// Timestamp format of the default suite sequence id
pub const SEQUENCE_ID_FORMAT: &str = "%Y-%m-%dT%H:%M:%S:%3f";

/// Execution plan for a suite
#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    /// Benchmarks in definition order, then expansion order
    pub benchmarks: Vec<Arc<Benchmark>>,
}

/// Suite-wide inputs that are not part of a benchmark definition
#[derive(Debug, Clone)]
pub struct PlanOptions<'a> {
    /// Sequence id shared by every benchmark of the suite
    pub sequence_id: String,
    /// Environment tag
    pub environment: String,
    /// Keep only benchmarks whose name or unique name matches
    pub filter: Option<&'a Regex>,
}

/// Sequence id used when neither the config nor the CLI sets one
pub fn default_sequence_id() -> String {
    chrono::Local::now().format(SEQUENCE_ID_FORMAT).to_string()
}

/// Expand, filter and validate every benchmark definition
///
/// `base_dir` resolves query `file` paths. Macro names are validated against
/// the registered drivers so that dispatch failures surface before the first
/// benchmark runs.
pub fn build_plan(
    config: &BenchConfig,
    base_dir: &Path,
    options: &PlanOptions<'_>,
    macros: &MacroDispatcher,
    data_sources: &DataSources,
) -> Result<ExecutionPlan, ConfigError> {
    let active = compile_active_variables(&config.runner.active_variables)?;

    let mut benchmarks = Vec::new();
    for definition in &config.benchmarks {
        let queries = resolve_queries(config, definition, base_dir)?;
        let data_source = resolve_data_source(definition, data_sources)?;

        for variables in expand_definition(definition)? {
            let keep = active.iter().all(|(name, pattern)| {
                variables
                    .get(name)
                    .is_some_and(|value| pattern.is_match(value))
            });
            if !keep {
                continue;
            }

            let benchmark = BenchmarkBuilder::new(
                &definition.name,
                &options.sequence_id,
                queries.clone(),
            )
            .data_source(&data_source)
            .environment(&options.environment)
            .runs(definition.runs.unwrap_or(config.runner.runs))
            .prewarm_runs(definition.prewarm_runs.unwrap_or(config.runner.prewarm_runs))
            .concurrency(definition.concurrency)
            .before_benchmark_macros(definition.before_benchmark.clone())
            .after_benchmark_macros(definition.after_benchmark.clone())
            .before_execution_macros(definition.before_execution.clone())
            .after_execution_macros(definition.after_execution.clone())
            .variables(variables)
            .build()?;

            if let Some(re) = options.filter {
                if !re.is_match(benchmark.name()) && !re.is_match(benchmark.unique_name()) {
                    continue;
                }
            }
            benchmarks.push(Arc::new(benchmark));
        }
    }

    validate(config, &benchmarks, macros, data_sources)?;
    Ok(ExecutionPlan { benchmarks })
}

fn compile_active_variables(
    patterns: &BTreeMap<String, String>,
) -> Result<Vec<(String, Regex)>, ConfigError> {
    patterns
        .iter()
        .map(|(name, pattern)| {
            // full match, not substring
            Regex::new(&format!("^(?:{})$", pattern))
                .map(|re| (name.clone(), re))
                .map_err(|source| ConfigError::InvalidRegex {
                    pattern: pattern.clone(),
                    source,
                })
        })
        .collect()
}

fn resolve_queries(
    config: &BenchConfig,
    definition: &BenchmarkDefinition,
    base_dir: &Path,
) -> Result<Vec<Query>, ConfigError> {
    definition
        .queries
        .iter()
        .map(|name| {
            let query_config =
                config
                    .queries
                    .get(name)
                    .ok_or_else(|| ConfigError::UnknownReference {
                        benchmark: definition.name.clone(),
                        kind: "query",
                        name: name.clone(),
                    })?;
            let mut query = Query::new(name, query_config.load_sql(name, base_dir)?);
            for (key, value) in &query_config.properties {
                query = query.with_property(key, value);
            }
            if let Some(data_source) = &query_config.data_source {
                query = query.with_property(DATA_SOURCE_PROPERTY, data_source);
            }
            Ok(query)
        })
        .collect()
}

fn resolve_data_source(
    definition: &BenchmarkDefinition,
    data_sources: &DataSources,
) -> Result<String, ConfigError> {
    if let Some(name) = &definition.data_source {
        return Ok(name.clone());
    }
    let mut names = data_sources.names();
    match (names.next(), names.next()) {
        (Some(only), None) => Ok(only.to_string()),
        _ => Err(ConfigError::InvalidBenchmark {
            benchmark: definition.name.clone(),
            reason: "data_source is required unless exactly one data source is configured"
                .to_string(),
        }),
    }
}

/// Expand the variable table; no variables yields one empty combination
fn expand_definition(
    definition: &BenchmarkDefinition,
) -> Result<Vec<VariableCombination>, ConfigError> {
    let invalid = |name: &str, reason: &str| ConfigError::InvalidVariable {
        benchmark: definition.name.clone(),
        name: name.to_string(),
        reason: reason.to_string(),
    };

    let mut candidates = Vec::with_capacity(definition.variables.len());
    for (name, value) in &definition.variables {
        if name == BENCHMARK_NAME_VARIABLE {
            return Err(invalid(name, "'name' is reserved for the benchmark name"));
        }
        let values = match value {
            toml::Value::Array(items) => items
                .iter()
                .map(|item| scalar(item).ok_or_else(|| invalid(name, "lists may only hold scalars")))
                .collect::<Result<Vec<_>, _>>()?,
            other => vec![scalar(other).ok_or_else(|| invalid(name, "unsupported value type"))?],
        };
        if values.is_empty() {
            return Err(invalid(name, "candidate list is empty"));
        }
        candidates.push((name.as_str(), values));
    }

    if candidates.is_empty() {
        return Ok(vec![VariableCombination::new()]);
    }
    Ok(expand_variables(&candidates))
}

fn scalar(value: &toml::Value) -> Option<String> {
    match value {
        toml::Value::String(s) => Some(s.clone()),
        toml::Value::Integer(i) => Some(i.to_string()),
        toml::Value::Float(f) => Some(f.to_string()),
        toml::Value::Boolean(b) => Some(b.to_string()),
        _ => None,
    }
}

fn validate(
    config: &BenchConfig,
    benchmarks: &[Arc<Benchmark>],
    macros: &MacroDispatcher,
    data_sources: &DataSources,
) -> Result<(), ConfigError> {
    let runner = &config.runner;
    macros
        .validate(
            runner
                .before_all
                .iter()
                .chain(&runner.after_all)
                .chain(&runner.health_check)
                .map(String::as_str),
        )
        .map_err(|source| ConfigError::Macro {
            scope: "runner".to_string(),
            source,
        })?;

    let mut seen = HashSet::new();
    for benchmark in benchmarks {
        if !seen.insert(benchmark.unique_name()) {
            return Err(ConfigError::DuplicateBenchmark(
                benchmark.unique_name().to_string(),
            ));
        }

        let unknown = |name: &str| ConfigError::UnknownReference {
            benchmark: benchmark.unique_name().to_string(),
            kind: "data source",
            name: name.to_string(),
        };
        if !data_sources.contains(benchmark.data_source()) {
            return Err(unknown(benchmark.data_source()));
        }
        for name in benchmark.macro_names() {
            if let Some(source) = sql_macro_data_source(config, name) {
                if !data_sources.contains(source) {
                    return Err(unknown(source));
                }
            }
        }

        // every worker may hold one connection of each of these at once
        let mut concurrent: BTreeSet<&str> = benchmark
            .queries()
            .iter()
            .map(|query| query.data_source().unwrap_or(benchmark.data_source()))
            .collect();
        concurrent.extend(
            benchmark
                .before_execution_macros()
                .iter()
                .chain(benchmark.after_execution_macros())
                .filter_map(|name| sql_macro_data_source(config, name)),
        );
        for name in concurrent {
            let source = data_sources.get(name).map_err(|_| unknown(name))?;
            if source.max_connections() < benchmark.concurrency() {
                return Err(ConfigError::PoolTooSmall {
                    benchmark: benchmark.unique_name().to_string(),
                    data_source: name.to_string(),
                    max_connections: source.max_connections(),
                    concurrency: benchmark.concurrency(),
                });
            }
        }

        macros
            .validate(benchmark.macro_names())
            .map_err(|source| ConfigError::Macro {
                scope: format!("benchmark '{}'", benchmark.unique_name()),
                source,
            })?;
    }
    Ok(())
}

/// Explicit data source of a SQL macro, if `name` is one
fn sql_macro_data_source<'a>(config: &'a BenchConfig, name: &str) -> Option<&'a str> {
    match config.macros.get(name) {
        Some(MacroConfig::Sql {
            data_source: Some(source),
            ..
        }) => Some(source),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DataSourceConfig;
    use crate::error::MacroError;
    use crate::macros::{ShellMacroDriver, SqlMacro, SqlMacroDriver};
    use crate::sql::CommandDataSource;

    fn data_sources(names: &[&str]) -> DataSources {
        let pools: Vec<(&str, u32)> = names.iter().map(|name| (*name, 4)).collect();
        sized_data_sources(&pools)
    }

    fn sized_data_sources(pools: &[(&str, u32)]) -> DataSources {
        let mut sources = DataSources::new();
        for (name, max_connections) in pools {
            let config = DataSourceConfig {
                command: "cat".to_string(),
                max_connections: *max_connections,
                query_id_pattern: None,
            };
            sources.register(Arc::new(CommandDataSource::from_config(name, &config).unwrap()));
        }
        sources
    }

    fn macros() -> MacroDispatcher {
        let commands = BTreeMap::from([("drop-caches".to_string(), "sync".to_string())]);
        MacroDispatcher::new().with_driver(Arc::new(ShellMacroDriver::new(commands)))
    }

    fn options(filter: Option<&Regex>) -> PlanOptions<'_> {
        PlanOptions {
            sequence_id: "seq".to_string(),
            environment: "ci".to_string(),
            filter,
        }
    }

    fn plan(toml_str: &str, filter: Option<&Regex>) -> Result<ExecutionPlan, ConfigError> {
        let config: BenchConfig = toml::from_str(toml_str).unwrap();
        build_plan(
            &config,
            Path::new("."),
            &options(filter),
            &macros(),
            &data_sources(&["trino"]),
        )
    }

    const QUERIES: &str = r#"
        [queries.q1]
        sql = "SELECT * FROM ${schema}.t"

        [queries.q2]
        sql = "SELECT 1"
        data_source = "trino"
    "#;

    fn unique_names(plan: &ExecutionPlan) -> Vec<&str> {
        plan.benchmarks.iter().map(|b| b.unique_name()).collect()
    }

    #[test]
    fn test_expansion_follows_definition_then_odometer_order() {
        let plan = plan(
            &format!(
                r#"{QUERIES}
                [[benchmark]]
                name = "scan"
                queries = ["q1"]
                variables = {{ schema = ["a", "b"], scale = [1, 10] }}

                [[benchmark]]
                name = "ping"
                queries = ["q2"]
                runs = 7
                "#
            ),
            None,
        )
        .unwrap();

        assert_eq!(
            unique_names(&plan),
            vec![
                "scan_scale=1_schema=a",
                "scan_scale=1_schema=b",
                "scan_scale=10_schema=a",
                "scan_scale=10_schema=b",
                "ping",
            ]
        );
        let ping = &plan.benchmarks[4];
        assert!(ping.variables().is_empty());
        assert_eq!(ping.runs(), 7);
        assert_eq!(ping.prewarm_runs(), 2);
        assert_eq!(ping.data_source(), "trino");
        assert_eq!(ping.sequence_id(), "seq");
        assert_eq!(ping.environment(), "ci");
        assert_eq!(ping.queries()[0].data_source(), Some("trino"));
    }

    #[test]
    fn test_active_variables_require_full_match() {
        let plan = plan(
            &format!(
                r#"{QUERIES}
                [runner.active_variables]
                schema = "tpch_sf1"

                [[benchmark]]
                name = "scan"
                queries = ["q1"]
                variables = {{ schema = ["tpch_sf1", "tpch_sf10"] }}

                [[benchmark]]
                name = "ping"
                queries = ["q2"]
                "#
            ),
            None,
        )
        .unwrap();

        // benchmarks without the variable are dropped too
        assert_eq!(unique_names(&plan), vec!["scan_schema=tpch_sf1"]);
    }

    #[test]
    fn test_name_filter_matches_name_or_unique_name() {
        let toml_str = format!(
            r#"{QUERIES}
            [[benchmark]]
            name = "scan"
            queries = ["q1"]
            variables = {{ schema = ["a", "b"] }}
            "#
        );
        let by_unique = Regex::new("schema=b").unwrap();
        assert_eq!(
            unique_names(&plan(&toml_str, Some(&by_unique)).unwrap()),
            vec!["scan_schema=b"]
        );
        let by_name = Regex::new("^scan$").unwrap();
        assert_eq!(plan(&toml_str, Some(&by_name)).unwrap().benchmarks.len(), 2);
    }

    #[test]
    fn test_reserved_name_variable_rejected() {
        let err = plan(
            &format!(
                r#"{QUERIES}
                [[benchmark]]
                name = "scan"
                queries = ["q1"]
                variables = {{ name = "x" }}
                "#
            ),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidVariable { name, .. } if name == "name"));
    }

    #[test]
    fn test_duplicates_rejected() {
        let err = plan(
            &format!(
                r#"{QUERIES}
                [[benchmark]]
                name = "ping"
                queries = ["q2"]

                [[benchmark]]
                name = "ping"
                queries = ["q1"]
                "#
            ),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateBenchmark(name) if name == "ping"));
    }

    #[test]
    fn test_unknown_references_rejected() {
        let unknown_query = plan(
            r#"
            [[benchmark]]
            name = "ping"
            queries = ["missing"]
            "#,
            None,
        )
        .unwrap_err();
        assert!(matches!(
            unknown_query,
            ConfigError::UnknownReference { kind: "query", .. }
        ));

        let unknown_source = plan(
            &format!(
                r#"{QUERIES}
                [[benchmark]]
                name = "ping"
                data_source = "postgres"
                queries = ["q2"]
                "#
            ),
            None,
        )
        .unwrap_err();
        assert!(matches!(
            unknown_source,
            ConfigError::UnknownReference { kind: "data source", .. }
        ));

        let unknown_macro = plan(
            &format!(
                r#"{QUERIES}
                [[benchmark]]
                name = "ping"
                queries = ["q2"]
                before_execution = ["drop-caches", "vacuum"]
                "#
            ),
            None,
        )
        .unwrap_err();
        assert!(matches!(
            unknown_macro,
            ConfigError::Macro { source: MacroError::NotFound { name }, .. } if name == "vacuum"
        ));
    }

    #[test]
    fn test_suite_macros_validated() {
        let err = plan(
            r#"
            [runner]
            after_all = ["cleanup"]
            "#,
            None,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Macro { scope, .. } if scope == "runner"));
    }

    #[test]
    fn test_pool_smaller_than_concurrency_rejected() {
        let err = plan(
            &format!(
                r#"{QUERIES}
                [[benchmark]]
                name = "ping"
                queries = ["q2"]
                concurrency = 5
                "#
            ),
            None,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::PoolTooSmall { max_connections: 4, concurrency: 5, .. }
        ));
    }

    #[test]
    fn test_every_concurrent_pool_must_fit_concurrency() {
        let sources = || sized_data_sources(&[("trino", 8), ("admin", 2)]);
        let sql_macros = |config: &BenchConfig| {
            let definitions = config
                .macros
                .iter()
                .filter_map(|(name, definition)| match definition {
                    MacroConfig::Sql { sql, data_source } => Some((
                        name.clone(),
                        SqlMacro {
                            sql: sql.clone(),
                            data_source: data_source.clone(),
                        },
                    )),
                    MacroConfig::Shell { .. } => None,
                })
                .collect();
            MacroDispatcher::new().with_driver(Arc::new(SqlMacroDriver::new(definitions, sources())))
        };
        let build = |toml_str: &str| {
            let config: BenchConfig = toml::from_str(toml_str).unwrap();
            build_plan(
                &config,
                Path::new("."),
                &options(None),
                &sql_macros(&config),
                &sources(),
            )
        };

        let overridden = build(
            r#"
            [queries.q1]
            sql = "SELECT 1"

            [queries.q2]
            sql = "SELECT 2"
            data_source = "admin"

            [[benchmark]]
            name = "mixed"
            data_source = "trino"
            queries = ["q1", "q2"]
            concurrency = 4
            "#,
        )
        .unwrap_err();
        assert!(matches!(
            overridden,
            ConfigError::PoolTooSmall { ref data_source, max_connections: 2, concurrency: 4, .. }
                if data_source == "admin"
        ));

        let through_macro = build(
            r#"
            [macros.reset]
            kind = "sql"
            sql = "CALL reset()"
            data_source = "admin"

            [queries.q1]
            sql = "SELECT 1"

            [[benchmark]]
            name = "reset-each"
            data_source = "trino"
            queries = ["q1"]
            concurrency = 4
            before_execution = ["reset"]
            "#,
        )
        .unwrap_err();
        assert!(matches!(
            through_macro,
            ConfigError::PoolTooSmall { ref data_source, .. } if data_source == "admin"
        ));

        // benchmark-level macros run outside the workers
        let once = build(
            r#"
            [macros.reset]
            kind = "sql"
            sql = "CALL reset()"
            data_source = "admin"

            [queries.q1]
            sql = "SELECT 1"

            [[benchmark]]
            name = "reset-once"
            data_source = "trino"
            queries = ["q1"]
            concurrency = 4
            before_benchmark = ["reset"]
            "#,
        )
        .unwrap();
        assert_eq!(once.benchmarks.len(), 1);
    }

    #[test]
    fn test_zero_runs_rejected() {
        let err = plan(
            &format!(
                r#"{QUERIES}
                [[benchmark]]
                name = "ping"
                queries = ["q2"]
                runs = 0
                "#
            ),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Model(_)));
    }

    #[test]
    fn test_data_source_required_with_several_sources() {
        let config: BenchConfig = toml::from_str(&format!(
            r#"{QUERIES}
            [[benchmark]]
            name = "ping"
            queries = ["q2"]
            "#
        ))
        .unwrap();
        let err = build_plan(
            &config,
            Path::new("."),
            &options(None),
            &macros(),
            &data_sources(&["trino", "postgres"]),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidBenchmark { .. }));
    }

    #[test]
    fn test_default_sequence_id_format() {
        let id = default_sequence_id();
        assert!(chrono::NaiveDateTime::parse_from_str(&id, SEQUENCE_ID_FORMAT).is_ok());
    }
}
