//! Macro Dispatch
//!
//! Macros are named side-effecting actions run at lifecycle phases (before and
//! after the suite, benchmark or execution, and as health checks). Drivers are
//! held in an explicit registry built at startup and consulted in
//! registration order:
//!
//! ```text
//! "drop-caches" ──▶ can_execute? ──▶ shell ✓   sql ✗   ──▶ shell.execute()
//! "both"        ──▶ can_execute? ──▶ shell ✓   sql ✓   ──▶ AmbiguousMacro
//! "nobody"      ──▶ can_execute? ──▶ shell ✗   sql ✗   ──▶ MacroNotFound
//! ```
//!
//! A phase runs its macros strictly in order; the first failure aborts the
//! rest of the phase.

mod shell;
mod sql;

pub use shell::ShellMacroDriver;
pub use sql::{SqlMacro, SqlMacroDriver};

use crate::error::{BoxError, MacroError};
use crate::sql::Connection;
use async_trait::async_trait;
use querybench_core::Benchmark;
use std::sync::Arc;
use tracing::{debug, info};

/// The surrounding execution's open connection, lent to its macros
pub struct BorrowedConnection<'a> {
    /// Data source the connection was acquired from
    pub data_source: &'a str,
    /// The connection itself
    pub connection: &'a mut dyn Connection,
}

impl<'a> BorrowedConnection<'a> {
    /// Lend `connection`, acquired from `data_source`
    pub fn new(data_source: &'a str, connection: &'a mut dyn Connection) -> Self {
        Self {
            data_source,
            connection,
        }
    }

    /// Lend the same connection again for a shorter scope
    pub fn reborrow(&mut self) -> BorrowedConnection<'_> {
        BorrowedConnection {
            data_source: self.data_source,
            connection: &mut *self.connection,
        }
    }
}

/// A macro execution backend
#[async_trait]
pub trait MacroDriver: Send + Sync {
    /// Driver name, used in ambiguity errors
    fn name(&self) -> &str;

    /// Whether this driver claims the macro
    fn can_execute(&self, macro_name: &str) -> bool;

    /// Run the macro.
    ///
    /// `connection` is the surrounding execution's open connection, if any.
    async fn execute(
        &self,
        macro_name: &str,
        benchmark: Option<&Benchmark>,
        connection: Option<BorrowedConnection<'_>>,
    ) -> Result<(), BoxError>;
}

/// Routes macros to exactly one capable driver
#[derive(Clone, Default)]
pub struct MacroDispatcher {
    drivers: Vec<Arc<dyn MacroDriver>>,
}

impl MacroDispatcher {
    /// Create an empty dispatcher
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a driver; registration order is consultation order
    pub fn register(&mut self, driver: Arc<dyn MacroDriver>) {
        self.drivers.push(driver);
    }

    /// Builder-style [`register`](Self::register)
    pub fn with_driver(mut self, driver: Arc<dyn MacroDriver>) -> Self {
        self.register(driver);
        self
    }

    /// Find the single driver claiming `name`
    pub fn resolve(&self, name: &str) -> Result<&Arc<dyn MacroDriver>, MacroError> {
        let mut matching = self.drivers.iter().filter(|d| d.can_execute(name));
        match (matching.next(), matching.next()) {
            (Some(driver), None) => Ok(driver),
            (None, _) => Err(MacroError::NotFound {
                name: name.to_string(),
            }),
            (Some(_), Some(_)) => Err(MacroError::Ambiguous {
                name: name.to_string(),
                candidates: self
                    .drivers
                    .iter()
                    .filter(|d| d.can_execute(name))
                    .map(|d| d.name().to_string())
                    .collect(),
            }),
        }
    }

    /// Check that every name resolves, without running anything
    pub fn validate<'a>(&self, names: impl IntoIterator<Item = &'a str>) -> Result<(), MacroError> {
        for name in names {
            self.resolve(name)?;
        }
        Ok(())
    }

    /// Run a single macro
    pub async fn run_macro(
        &self,
        name: &str,
        benchmark: Option<&Benchmark>,
        connection: Option<BorrowedConnection<'_>>,
    ) -> Result<(), MacroError> {
        let driver = self.resolve(name)?;
        debug!(driver = driver.name(), "running macro '{}'", name);
        driver
            .execute(name, benchmark, connection)
            .await
            .map_err(|source| MacroError::Execution {
                name: name.to_string(),
                source,
            })
    }

    /// Run a macro phase in order, stopping at the first failure
    pub async fn run_phase(
        &self,
        phase: &str,
        names: &[String],
        benchmark: Option<&Benchmark>,
        mut connection: Option<BorrowedConnection<'_>>,
    ) -> Result<(), MacroError> {
        if names.is_empty() {
            return Ok(());
        }
        info!("running {} macros: {}", phase, names.join(", "));
        for name in names {
            let borrowed = connection.as_mut().map(BorrowedConnection::reborrow);
            self.run_macro(name, benchmark, borrowed).await?;
        }
        Ok(())
    }
}
