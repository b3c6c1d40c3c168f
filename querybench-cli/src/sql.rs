//! SQL Execution Primitive
//!
//! Data sources hand out connections; a connection runs one statement at a
//! time and reports the row count plus an optional engine correlation id.
//!
//! The bundled [`CommandDataSource`] drives a command-line client (`trino`,
//! `psql`, ...) through `bash -c`, feeding the statement on stdin. Its pool is
//! a semaphore sized to `max_connections`; a connection holds one permit for
//! its whole lifetime, so at most `max_connections` workers execute at once.

use crate::config::DataSourceConfig;
use crate::error::{ConfigError, SqlError};
use async_trait::async_trait;
use querybench_core::is_select_statement;
use regex::Regex;
use std::collections::BTreeMap;
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

/// Outcome of a successful statement
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatementOutcome {
    /// Returned rows for queries, affected rows for updates
    pub rows: u64,
    /// Engine query id, when the client reports one
    pub correlation_id: Option<String>,
}

/// An open connection
#[async_trait]
pub trait Connection: Send {
    /// Execute one statement
    async fn execute(&mut self, sql: &str) -> Result<StatementOutcome, SqlError>;
}

/// A named source of connections
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Data source name
    fn name(&self) -> &str;

    /// Pool capacity
    fn max_connections(&self) -> u32;

    /// Acquire a connection, waiting for pool capacity
    async fn connect(&self) -> Result<Box<dyn Connection>, SqlError>;
}

/// Registry of data sources by name
#[derive(Clone, Default)]
pub struct DataSources {
    sources: BTreeMap<String, Arc<dyn DataSource>>,
}

impl DataSources {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Build command-backed data sources from configuration
    pub fn from_config(config: &BTreeMap<String, DataSourceConfig>) -> Result<Self, ConfigError> {
        let mut sources = Self::new();
        for (name, ds) in config {
            sources.register(Arc::new(CommandDataSource::from_config(name, ds)?));
        }
        Ok(sources)
    }

    /// Register a data source under its own name
    pub fn register(&mut self, source: Arc<dyn DataSource>) {
        self.sources.insert(source.name().to_string(), source);
    }

    /// Look up a data source
    pub fn get(&self, name: &str) -> Result<&Arc<dyn DataSource>, SqlError> {
        self.sources
            .get(name)
            .ok_or_else(|| SqlError::UnknownDataSource(name.to_string()))
    }

    /// Whether a data source is registered
    pub fn contains(&self, name: &str) -> bool {
        self.sources.contains_key(name)
    }

    /// Registered names, sorted
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.sources.keys().map(String::as_str)
    }

    /// Acquire a connection from the named data source
    pub async fn connect(&self, name: &str) -> Result<Box<dyn Connection>, SqlError> {
        self.get(name)?.connect().await
    }
}

/// Data source backed by a command-line SQL client
pub struct CommandDataSource {
    name: String,
    command: String,
    max_connections: u32,
    query_id_pattern: Option<Regex>,
    permits: Arc<Semaphore>,
}

impl CommandDataSource {
    /// Create from configuration
    pub fn from_config(name: &str, config: &DataSourceConfig) -> Result<Self, ConfigError> {
        let query_id_pattern = config
            .query_id_pattern
            .as_deref()
            .map(|pattern| {
                Regex::new(pattern).map_err(|source| ConfigError::InvalidRegex {
                    pattern: pattern.to_string(),
                    source,
                })
            })
            .transpose()?;
        Ok(Self {
            name: name.to_string(),
            command: config.command.clone(),
            max_connections: config.max_connections,
            query_id_pattern,
            permits: Arc::new(Semaphore::new(config.max_connections as usize)),
        })
    }
}

#[async_trait]
impl DataSource for CommandDataSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn max_connections(&self) -> u32 {
        self.max_connections
    }

    async fn connect(&self) -> Result<Box<dyn Connection>, SqlError> {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| SqlError::PoolClosed(self.name.clone()))?;
        Ok(Box::new(CommandConnection {
            command: self.command.clone(),
            query_id_pattern: self.query_id_pattern.clone(),
            _permit: permit,
        }))
    }
}

struct CommandConnection {
    command: String,
    query_id_pattern: Option<Regex>,
    _permit: OwnedSemaphorePermit,
}

#[async_trait]
impl Connection for CommandConnection {
    async fn execute(&mut self, sql: &str) -> Result<StatementOutcome, SqlError> {
        debug!(command = %self.command, "executing statement: {}", sql);
        let mut child = Command::new("bash")
            .arg("-c")
            .arg(&self.command)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(sql.as_bytes()).await?;
            stdin.write_all(b"\n").await?;
        }

        let output = child.wait_with_output().await?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        if !output.status.success() {
            let message = stderr.trim();
            return Err(SqlError::Statement(if message.is_empty() {
                format!("client exited with {}", output.status)
            } else {
                message.to_string()
            }));
        }

        let rows = if is_select_statement(sql) {
            stdout.lines().filter(|l| !l.trim().is_empty()).count() as u64
        } else {
            affected_rows(&stdout).or_else(|| affected_rows(&stderr)).unwrap_or(0)
        };

        let correlation_id = self.query_id_pattern.as_ref().and_then(|re| {
            re.captures(&stderr)
                .or_else(|| re.captures(&stdout))
                .and_then(|caps| caps.get(1))
                .map(|m| m.as_str().to_string())
        });

        Ok(StatementOutcome {
            rows,
            correlation_id,
        })
    }
}

/// Extract "N rows" style update counts from client output
fn affected_rows(output: &str) -> Option<u64> {
    output.lines().find_map(|line| {
        let mut words = line.split_whitespace().peekable();
        while let Some(word) = words.next() {
            if let Ok(count) = word.trim_start_matches(['(', ':']).parse::<u64>() {
                if words
                    .peek()
                    .is_some_and(|next| next.to_lowercase().starts_with("row"))
                {
                    return Some(count);
                }
            }
        }
        None
    })
}
