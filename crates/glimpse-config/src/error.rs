//! Configuration errors.

use thiserror::Error;

/// Convenience result alias.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Loading or validation failure.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("cannot read config file {path}: {source}")]
    Io {
        /// File path.
        path: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid TOML.
    #[error("cannot parse config file {path}: {source}")]
    Parse {
        /// File path.
        path: String,
        /// Underlying error.
        #[source]
        source: toml::de::Error,
    },

    /// A merged value failed validation.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}
