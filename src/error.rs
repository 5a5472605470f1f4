//! Error type of the rowbench facade.
//!
//! Wraps the benchmark error from `rowbench-core` and adds the failures that
//! only happen at the outer surface: loading and validating configuration,
//! exporting results.

use thiserror::Error;

/// All rowbench errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Error raised by the store, a strategy, the checker or the harness
    #[error(transparent)]
    Bench(#[from] rowbench_core::Error),

    /// Configuration is well-formed but unusable
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Configuration could not be parsed
    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// Configuration could not be encoded
    #[error("config encode error: {0}")]
    Encode(#[from] toml::ser::Error),

    /// Result export failed
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for rowbench operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Check if this error is a transient store error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Bench(e) if e.is_retryable())
    }

    /// Check if replicas disagreed after the check budget was spent.
    pub fn is_wrong_data(&self) -> bool {
        matches!(self, Error::Bench(e) if e.is_wrong_data())
    }

    /// Check if this is a configuration problem.
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            Error::Config(_)
                | Error::Parse(_)
                | Error::Bench(rowbench_core::Error::InvalidConfig(_))
        )
    }
}
