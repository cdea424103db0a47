//! lanwatch-core: Shared types, events, and error handling for Lanwatch.
//!
//! This crate provides the foundational types used across all Lanwatch components:
//! - Inventory types (Device, Sighting, MacAddress) keyed by hardware address
//! - Scan bookkeeping (ScanRecord, HistoryPoint, ScanSummary)
//! - Event types pushed to live subscribers while scans run
//! - Common error types

pub mod error;
pub mod events;
pub mod types;

pub use error::LanwatchError;
pub use events::{EventPayload, ScanEvent};
pub use types::*;
