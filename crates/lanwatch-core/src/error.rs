use thiserror::Error;

/// Top-level error type for Lanwatch domain values.
#[derive(Error, Debug)]
pub enum LanwatchError {
    #[error("Invalid hardware address: {0}")]
    InvalidMac(String),

    #[error("Invalid device status: {0}")]
    InvalidStatus(String),

    #[error("Invalid scan method: {0}")]
    InvalidMethod(String),

    #[error("Invalid scan status: {0}")]
    InvalidScanStatus(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
