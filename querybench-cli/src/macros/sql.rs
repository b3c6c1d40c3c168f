//! SQL macros run on a benchmark's connection

use super::{BorrowedConnection, MacroDriver};
use crate::error::BoxError;
use crate::sql::{Connection, DataSources};
use async_trait::async_trait;
use querybench_core::{Benchmark, render_template};
use std::collections::BTreeMap;
use tracing::info;

/// Definition of one SQL macro
#[derive(Debug, Clone)]
pub struct SqlMacro {
    /// `${var}` template; may hold several `;`-separated statements
    pub sql: String,
    /// Explicit data source; a dedicated connection is opened when it differs
    /// from the one the borrowed connection belongs to
    pub data_source: Option<String>,
}

/// Runs SQL macros.
///
/// The surrounding execution's connection is reused unless the macro names
/// a different data source.
pub struct SqlMacroDriver {
    macros: BTreeMap<String, SqlMacro>,
    data_sources: DataSources,
}

impl SqlMacroDriver {
    /// Create from macro definitions and the data source registry
    pub fn new(macros: BTreeMap<String, SqlMacro>, data_sources: DataSources) -> Self {
        Self {
            macros,
            data_sources,
        }
    }
}

#[async_trait]
impl MacroDriver for SqlMacroDriver {
    fn name(&self) -> &str {
        "sql"
    }

    fn can_execute(&self, macro_name: &str) -> bool {
        self.macros.contains_key(macro_name)
    }

    async fn execute(
        &self,
        macro_name: &str,
        benchmark: Option<&Benchmark>,
        connection: Option<BorrowedConnection<'_>>,
    ) -> Result<(), BoxError> {
        let definition = self
            .macros
            .get(macro_name)
            .ok_or_else(|| format!("sql macro '{}' is not defined", macro_name))?;
        let benchmark = benchmark
            .ok_or_else(|| format!("sql macro '{}' requires a benchmark", macro_name))?;

        let mut variables = benchmark.variables().clone();
        variables.insert(
            querybench_core::BENCHMARK_NAME_VARIABLE.to_string(),
            benchmark.name().to_string(),
        );
        let rendered = render_template(&definition.sql, &variables)?;
        let statements: Vec<&str> = rendered
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();

        let requested = definition.data_source.as_deref();
        match connection {
            Some(borrowed) if requested.is_none_or(|name| name == borrowed.data_source) => {
                run_statements(macro_name, borrowed.connection, &statements).await
            }
            _ => {
                let name = requested.unwrap_or(benchmark.data_source());
                let mut own = self.data_sources.connect(name).await?;
                run_statements(macro_name, own.as_mut(), &statements).await
            }
        }
    }
}

async fn run_statements(
    macro_name: &str,
    connection: &mut dyn Connection,
    statements: &[&str],
) -> Result<(), BoxError> {
    for statement in statements {
        info!("executing macro '{}' statement: {}", macro_name, statement);
        connection.execute(statement).await?;
    }
    Ok(())
}
