//! Lanwatch Store: transactional persistence for the device inventory.
//!
//! The discovery engine only talks to storage through [`InventoryStore`]
//! and [`InventoryTxn`]. Two backends are provided: [`MemoryStore`] for
//! single-process deployments and tests, and [`GraphStore`] on Neo4j.

pub mod error;
pub mod graph;
pub mod memory;
pub mod store;

pub use error::StoreError;
pub use graph::{GraphConfig, GraphStore};
pub use memory::MemoryStore;
pub use store::{InventoryStore, InventoryTxn};
