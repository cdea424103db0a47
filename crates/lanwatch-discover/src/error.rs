//! Error types for the lanwatch-discover crate.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DiscoverError {
    #[error("A scan is already running")]
    AlreadyRunning,

    #[error("Invalid subnet {cidr}: {reason}")]
    InvalidSubnet { cidr: String, reason: String },

    #[error("Probe of {cidr} failed: {reason}")]
    Probe { cidr: String, reason: String },

    #[error("Probe of {cidr} timed out after {secs}s")]
    Timeout { cidr: String, secs: u64 },

    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Store error: {0}")]
    Store(#[from] lanwatch_store::StoreError),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, DiscoverError>;
