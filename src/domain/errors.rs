// src/domain/errors.rs
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Signal error: {0}")]
    Signal(#[from] SignalError),

    #[error("Market data error: {0}")]
    MarketData(#[from] MarketDataError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SignalError {
    /// The calculation routine failed or did not produce its column.
    #[error("Computation of signal '{signal}' failed: {reason}")]
    Computation { signal: String, reason: String },

    /// An event column is absent or not boolean-shaped.
    #[error("Malformed signal column '{column}': {reason}")]
    Malformed { column: String, reason: String },

    #[error("Invalid condition: {0}")]
    InvalidCondition(String),

    #[error("Signal synthesis error: {0}")]
    Synthesis(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MarketDataError {
    #[error("Fetch error: {0}")]
    Fetch(String),

    #[error("Invalid bar at {timestamp}: {reason}")]
    InvalidBar { timestamp: String, reason: String },

    #[error("Invalid resolution: {0}")]
    InvalidResolution(String),

    #[error("No data available for: {0}")]
    NoData(String),
}

impl SignalError {
    pub fn computation(signal: &str, reason: impl ToString) -> Self {
        SignalError::Computation {
            signal: signal.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn malformed(column: &str, reason: impl ToString) -> Self {
        SignalError::Malformed {
            column: column.to_string(),
            reason: reason.to_string(),
        }
    }
}

// Result type alias for convenience
pub type AppResult<T> = Result<T, AppError>;
pub type SignalResult<T> = Result<T, SignalError>;
pub type MarketDataResult<T> = Result<T, MarketDataError>;
