use thiserror::Error;

#[derive(Error, Debug)]
pub enum TradingError {
    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Concurrent execution: {0}")]
    ConcurrentExecution(String),

    #[error("Calculation error: {0}")]
    CalculationError(String),
}
