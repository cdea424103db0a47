//! Errors from inventory storage.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Neo4j connection error: {0}")]
    Connection(String),

    #[error("Neo4j query error: {0}")]
    Query(#[from] neo4rs::Error),

    #[error("Device not found: {0}")]
    NotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Transaction aborted: {0}")]
    Aborted(String),
}

impl From<lanwatch_core::LanwatchError> for StoreError {
    fn from(e: lanwatch_core::LanwatchError) -> Self {
        Self::Serialization(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
