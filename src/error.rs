//! Error types for the stress simulation core

use thiserror::Error;

/// Errors that can occur while configuring or running a stress simulation
///
/// Degenerate statistics (empty CVaR tails, zero liabilities, cascades that
/// never liquidate) are not errors; they resolve to documented fallback values.
#[derive(Error, Debug)]
pub enum SentinelError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Invalid confidence level: {0} (must be between 0 and 1)")]
    InvalidConfidenceLevel(f64),

    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Numerical instability: {0}")]
    NumericalInstability(String),

    #[error("Distribution error: {0}")]
    Distribution(String),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SentinelError>;
