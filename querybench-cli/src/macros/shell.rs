//! Shell macros run through `bash -c`

use super::{BorrowedConnection, MacroDriver};
use crate::error::BoxError;
use async_trait::async_trait;
use querybench_core::Benchmark;
use std::collections::BTreeMap;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{info, warn};

/// Runs configured shell commands.
///
/// Benchmark variables are exported to the command's environment, upper-cased
/// (`schema` becomes `SCHEMA`), alongside `BENCHMARK_NAME`.
pub struct ShellMacroDriver {
    commands: BTreeMap<String, String>,
}

impl ShellMacroDriver {
    /// Create from macro name to command line
    pub fn new(commands: BTreeMap<String, String>) -> Self {
        Self { commands }
    }
}

#[async_trait]
impl MacroDriver for ShellMacroDriver {
    fn name(&self) -> &str {
        "shell"
    }

    fn can_execute(&self, macro_name: &str) -> bool {
        self.commands.contains_key(macro_name)
    }

    async fn execute(
        &self,
        macro_name: &str,
        benchmark: Option<&Benchmark>,
        _connection: Option<BorrowedConnection<'_>>,
    ) -> Result<(), BoxError> {
        let command = self
            .commands
            .get(macro_name)
            .ok_or_else(|| format!("shell macro '{}' is not defined", macro_name))?;

        let mut process = Command::new("bash");
        process
            .arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(benchmark) = benchmark {
            process.env("BENCHMARK_NAME", benchmark.name());
            for (key, value) in benchmark.variables() {
                process.env(key.to_uppercase(), value);
            }
        }

        info!("executing macro '{}': {}", macro_name, command);
        let output = process.output().await?;

        for line in String::from_utf8_lossy(&output.stdout).lines() {
            info!(target: "querybench::macros", "{} stdout: {}", macro_name, line);
        }
        for line in String::from_utf8_lossy(&output.stderr).lines() {
            warn!(target: "querybench::macros", "{} stderr: {}", macro_name, line);
        }

        if !output.status.success() {
            return Err(format!("macro '{}' exited with {}", macro_name, output.status).into());
        }
        Ok(())
    }
}
