//! Event types pushed to live subscribers while scans run.
//!
//! On the wire every event is a single JSON object:
//! `{"event": "<name>", "data": {...}, "timestamp": "<rfc3339>"}`.

use std::net::Ipv4Addr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{MacAddress, Sighting};

/// An event emitted by the discovery engine, timestamped at publish time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanEvent {
    #[serde(flatten)]
    pub payload: EventPayload,
    pub timestamp: DateTime<Utc>,
}

impl ScanEvent {
    pub fn new(payload: EventPayload) -> Self {
        Self {
            payload,
            timestamp: Utc::now(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.payload.name()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// The event payload, tagged by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum EventPayload {
    // ── Scan lifecycle ────────────────────────────────────────
    /// A scan began. Carries no data.
    ScanStarted {},
    /// A scan finished and its results were committed.
    ScanComplete {
        total_devices: u32,
        new_devices: u32,
        offline_devices: u32,
        scan_duration_ms: u64,
        subnets: Vec<String>,
    },
    /// A scan could not be committed; nothing it observed was persisted.
    ScanFailed { error: String },

    // ── Device transitions ────────────────────────────────────
    /// A hardware address was seen for the first time.
    DeviceNew(Sighting),
    /// A previously online device was absent from the latest scan.
    DeviceOffline {
        ip_address: Ipv4Addr,
        mac_address: MacAddress,
    },
}

impl EventPayload {
    pub fn name(&self) -> &'static str {
        match self {
            Self::ScanStarted {} => "scan_started",
            Self::ScanComplete { .. } => "scan_complete",
            Self::ScanFailed { .. } => "scan_failed",
            Self::DeviceNew(_) => "device_new",
            Self::DeviceOffline { .. } => "device_offline",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_shape() {
        let event = ScanEvent::new(EventPayload::ScanStarted {});
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["event"], "scan_started");
        assert!(json["data"].as_object().unwrap().is_empty());
        assert!(json["timestamp"].is_string());
    }

    #[test]
    fn device_offline_payload() {
        let mac: MacAddress = "BB:BB:00:00:00:02".parse().unwrap();
        let event = ScanEvent::new(EventPayload::DeviceOffline {
            ip_address: Ipv4Addr::new(192, 168, 1, 20),
            mac_address: mac,
        });
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["event"], "device_offline");
        assert_eq!(json["data"]["ip_address"], "192.168.1.20");
        assert_eq!(json["data"]["mac_address"], "BB:BB:00:00:00:02");
    }

    #[test]
    fn event_serialization_roundtrip() {
        let event = ScanEvent::new(EventPayload::ScanComplete {
            total_devices: 2,
            new_devices: 2,
            offline_devices: 0,
            scan_duration_ms: 1500,
            subnets: vec!["192.168.1.0/24".to_string()],
        });

        let json = event.to_json().unwrap();
        let deserialized: ScanEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized.payload, event.payload);
        assert_eq!(deserialized.name(), "scan_complete");
    }
}
