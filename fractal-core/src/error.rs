//! Error types for the Fractal Policy Controller.

use thiserror::Error;

/// Errors raised while loading and validating configuration at startup.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConfigError {
    #[error("missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("malformed JSON in {file}: {reason}")]
    Malformed { file: String, reason: String },

    #[error("policy table is missing an entry for query type {type_name}")]
    MissingTypeEntry { type_name: String },
}

/// Master error type for the controller. Only configuration loading can
/// fail this way; every per-turn pipeline function is infallible.
#[derive(Debug, Clone, Error)]
pub enum FractalError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type alias for fallible controller operations.
pub type FractalResult<T> = Result<T, FractalError>;
