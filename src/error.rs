//! Engine error types.

use rust_decimal::Decimal;
use thiserror::Error;

/// Errors surfaced by the betting engine.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("insufficient funds: requested {requested}, available {available}")]
    InsufficientFunds {
        requested: Decimal,
        available: Decimal,
    },

    #[error("prediction unavailable: {0}")]
    PredictionUnavailable(String),

    #[error("invalid bet state: {0}")]
    InvalidBetState(String),

    #[error("{operation} timed out after {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("initialization error: {0}")]
    Initialization(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<config::ConfigError> for EngineError {
    fn from(err: config::ConfigError) -> Self {
        EngineError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
