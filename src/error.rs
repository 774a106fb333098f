use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    // Upstream Errors
    #[error("{exchange}: {message}")]
    Provider {
        exchange: String,
        message: String,
    },

    #[error("{exchange}: invalid ticker for {symbol}: {reason}")]
    InvalidTicker {
        exchange: String,
        symbol: String,
        reason: String,
    },

    #[error("timeout after {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("temporarily unavailable")]
    StaleCache {
        exchange: String,
    },

    // Startup Errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Failed to initialize ticker source: {0}")]
    SourceInit(String),

    // Runtime Errors
    #[error("Task failed: {0}")]
    TaskFailed(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl Error {
    pub fn provider(exchange: impl Into<String>, message: impl ToString) -> Self {
        Error::Provider {
            exchange: exchange.into(),
            message: message.to_string(),
        }
    }

    /// Source name to attribute this error to in an aggregation result, if any.
    pub fn exchange(&self) -> Option<&str> {
        match self {
            Error::Provider { exchange, .. }
            | Error::InvalidTicker { exchange, .. }
            | Error::StaleCache { exchange } => Some(exchange),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::SerializationError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
