//! Error types for Warren CLI.

use thiserror::Error;
use warren_messaging::MessagingError;

/// Result type for CLI operations.
pub type CliResult<T> = Result<T, CliError>;

/// CLI error types.
#[derive(Debug, Error)]
pub enum CliError {
    /// IO error (reading config or payload files)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file or override could not be used
    #[error("Configuration error: {0}")]
    Config(String),

    /// Broker operation failed
    #[error(transparent)]
    Messaging(#[from] MessagingError),
}

impl From<toml::de::Error> for CliError {
    fn from(err: toml::de::Error) -> Self {
        CliError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for CliError {
    fn from(err: toml::ser::Error) -> Self {
        CliError::Config(err.to_string())
    }
}
