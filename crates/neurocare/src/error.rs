//! Error types for the neurocare CLI.

use thiserror::Error;

/// CLI-level errors not covered by neurocare-core.
#[derive(Error, Debug)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<toml::de::Error> for CliError {
    fn from(e: toml::de::Error) -> Self {
        CliError::Config(e.to_string())
    }
}

impl From<toml::ser::Error> for CliError {
    fn from(e: toml::ser::Error) -> Self {
        CliError::Serialization(e.to_string())
    }
}

impl From<neurocare_core::Error> for CliError {
    fn from(e: neurocare_core::Error) -> Self {
        CliError::Config(e.to_string())
    }
}

/// Result type alias for CLI operations.
pub type CliResult<T> = Result<T, CliError>;
