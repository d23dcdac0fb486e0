use thiserror::Error;

/// Message transport errors
#[derive(Debug, Error)]
pub enum BusError {
    #[error("Publish to {channel} failed: {message}")]
    Publish { channel: String, message: String },

    #[error("Subscribe failed: {0}")]
    Subscribe(String),

    #[error("Receive failed: {0}")]
    Receive(String),

    #[error("Commit failed: {0}")]
    Commit(String),

    #[error("Partition {partition} does not exist on {channel}")]
    InvalidPartition { channel: String, partition: i32 },

    #[error("Codec error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type for bus operations
pub type BusResult<T> = Result<T, BusError>;

impl From<BusError> for vigil_core::AppError {
    fn from(err: BusError) -> Self {
        vigil_core::AppError::Bus(err.to_string())
    }
}
