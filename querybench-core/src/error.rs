//! Model Errors

use thiserror::Error;

/// Invalid benchmark definition detected while building the model
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    /// Concurrency must be at least one worker
    #[error("benchmark '{benchmark}': concurrency must be >= 1")]
    InvalidConcurrency {
        /// Benchmark name
        benchmark: String,
    },

    /// At least one measured run is required
    #[error("benchmark '{benchmark}': runs must be >= 1")]
    InvalidRuns {
        /// Benchmark name
        benchmark: String,
    },

    /// A benchmark without queries cannot be executed
    #[error("benchmark '{benchmark}' has no queries")]
    NoQueries {
        /// Benchmark name
        benchmark: String,
    },

    /// A mandatory field was left empty
    #[error("benchmark '{benchmark}': missing {field}")]
    MissingField {
        /// Benchmark name
        benchmark: String,
        /// Name of the empty field
        field: &'static str,
    },
}

/// Failure rendering a `${var}` SQL template
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    /// The template references a variable that is not defined
    #[error("unknown variable '${{{name}}}' in query template")]
    UnknownVariable {
        /// Variable name as written in the template
        name: String,
    },

    /// A `${` without a closing brace
    #[error("unterminated variable reference at byte {offset}")]
    Unterminated {
        /// Byte offset of the `${`
        offset: usize,
    },
}
