//! Error handling for the application

use thiserror::Error;

/// Swap pipeline errors (finder, builder, validator, executor)
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SwapError {
    #[error("Trading pair not found: {0}")]
    PairNotFound(String),

    #[error("Swap chain not found: {0}")]
    ChainNotFound(String),

    #[error("Swap action not found: {0}")]
    ActionNotFound(String),

    #[error("Price data outdated for {0}")]
    StalePrice(String),

    #[error("Swap percent {percent}% below threshold {min_percent}%")]
    BelowThreshold { percent: f64, min_percent: f64 },

    #[error("Quantity {quantity} for {symbol} outside allowed range [{min}, {max}]")]
    QuantityOutOfRange {
        symbol: String,
        quantity: f64,
        min: f64,
        max: f64,
    },

    #[error("Inconsistent swap chain: {0}")]
    InconsistentChain(String),

    #[error("Exchange rejected request: {0}")]
    ExchangeRejected(String),

    #[error("Order {order_id} on {symbol} was not filled in time")]
    FillTimeout { symbol: String, order_id: i64 },

    #[error("Swap execution cancelled")]
    Cancelled,

    #[error("Repository error: {0}")]
    Repository(String),
}

/// Exchange API errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExchangeError {
    #[error("Order rejected: {0}")]
    Rejected(String),

    #[error("Order not found: {symbol} #{order_id}")]
    OrderNotFound { symbol: String, order_id: i64 },

    #[error("Network error: {0}")]
    NetworkError(String),
}

/// Persistence errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RepositoryError {
    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Duplicate record: {0}")]
    Duplicate(String),

    #[error("Storage failure: {0}")]
    Storage(String),
}

/// General application error
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Exchange error: {0}")]
    ExchangeError(String),

    #[error("Swap error: {0}")]
    SwapError(#[from] SwapError),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl From<ExchangeError> for SwapError {
    fn from(err: ExchangeError) -> Self {
        SwapError::ExchangeRejected(err.to_string())
    }
}

impl From<RepositoryError> for SwapError {
    fn from(err: RepositoryError) -> Self {
        SwapError::Repository(err.to_string())
    }
}

impl From<ExchangeError> for AppError {
    fn from(err: ExchangeError) -> Self {
        AppError::ExchangeError(err.to_string())
    }
}

impl From<RepositoryError> for AppError {
    fn from(err: RepositoryError) -> Self {
        AppError::DatabaseError(err.to_string())
    }
}
