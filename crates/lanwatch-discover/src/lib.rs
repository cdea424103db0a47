//! lanwatch-discover: LAN device discovery for the Lanwatch inventory.
//!
//! Detects local subnets, probes them (ARP with a ping-sweep fallback),
//! reconciles sightings against the stored inventory in one transaction,
//! records scan history, and broadcasts scan events to live subscribers.

pub mod broadcast;
pub mod config;
pub mod engine;
pub mod error;
pub mod history;
pub mod probe;
pub mod queries;
pub mod reconcile;
pub mod scheduler;
pub mod subnet;

pub use broadcast::{EventBroadcaster, Subscription};
pub use engine::DiscoveryEngine;
pub use error::{DiscoverError, Result};
pub use probe::{HostProbe, NetworkProber, SubnetScan};
pub use scheduler::{ScanScheduler, SchedulerHandle};
pub use subnet::SubnetDetector;
