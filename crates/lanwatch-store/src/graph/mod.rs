//! Neo4j inventory backend.
//!
//! Devices are `(:Device)` nodes keyed by `mac_address`; each scan is a
//! `(:ScanRecord)` with a `[:SNAPSHOT]` edge to its `(:HistoryPoint)`.
//! Optional strings are stored as `""` and timestamps as RFC 3339.

mod client;
mod mutations;
mod queries;

pub use client::{GraphConfig, GraphStore};
pub use mutations::GraphTxn;

use chrono::{DateTime, Utc};
use lanwatch_core::{Device, HistoryPoint, NewScanRecord, ScanRecord};
use neo4rs::Row;

use crate::error::StoreError;

pub(crate) const DEVICE_FIELDS: &str = "d.mac_address AS mac_address, d.ip_address AS ip_address,
     d.hostname AS hostname, d.vendor AS vendor, d.status AS status,
     d.device_type AS device_type, d.custom_name AS custom_name, d.notes AS notes,
     d.first_seen AS first_seen, d.last_seen AS last_seen";

pub(crate) const SCAN_FIELDS: &str = "s.id AS id, s.subnets AS subnets, s.device_count AS device_count,
     s.new_devices AS new_devices, s.offline_devices AS offline_devices,
     s.method AS method, s.duration_ms AS duration_ms, s.status AS status,
     s.error_message AS error_message, s.started_at AS started_at,
     s.completed_at AS completed_at";

pub(crate) const HISTORY_FIELDS: &str = "h.scan_id AS scan_id, h.timestamp AS timestamp,
     h.online_count AS online_count, h.offline_count AS offline_count,
     h.total_count AS total_count";

fn get_string(row: &Row, key: &str) -> Result<String, StoreError> {
    row.get::<String>(key)
        .map_err(|e| StoreError::Serialization(format!("Failed to read {key}: {e}")))
}

fn get_opt_string(row: &Row, key: &str) -> Option<String> {
    row.get::<String>(key).ok().filter(|s| !s.is_empty())
}

fn get_i64(row: &Row, key: &str) -> Result<i64, StoreError> {
    row.get::<i64>(key)
        .map_err(|e| StoreError::Serialization(format!("Failed to read {key}: {e}")))
}

fn get_u32(row: &Row, key: &str) -> Result<u32, StoreError> {
    let raw = get_i64(row, key)?;
    u32::try_from(raw).map_err(|_| StoreError::Serialization(format!("{key} out of range: {raw}")))
}

fn parse_time(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::Serialization(format!("Bad timestamp {raw:?}: {e}")))
}

pub(crate) fn opt_string(opt: &Option<String>) -> String {
    opt.clone().unwrap_or_default()
}

pub(crate) fn device_from_row(row: &Row) -> Result<Device, StoreError> {
    Ok(Device {
        mac_address: get_string(row, "mac_address")?.parse()?,
        ip_address: get_string(row, "ip_address")?
            .parse()
            .map_err(|e| StoreError::Serialization(format!("Bad ip_address: {e}")))?,
        hostname: get_opt_string(row, "hostname"),
        vendor: get_opt_string(row, "vendor"),
        status: get_string(row, "status")?.parse()?,
        device_type: get_string(row, "device_type")?,
        custom_name: get_opt_string(row, "custom_name"),
        notes: get_opt_string(row, "notes"),
        first_seen: parse_time(&get_string(row, "first_seen")?)?,
        last_seen: parse_time(&get_string(row, "last_seen")?)?,
    })
}

pub(crate) fn scan_from_row(row: &Row) -> Result<ScanRecord, StoreError> {
    let completed_at = match get_opt_string(row, "completed_at") {
        Some(raw) => Some(parse_time(&raw)?),
        None => None,
    };

    Ok(ScanRecord {
        id: get_i64(row, "id")?,
        record: NewScanRecord {
            subnets: row.get::<Vec<String>>("subnets").unwrap_or_default(),
            device_count: get_u32(row, "device_count")?,
            new_devices: get_u32(row, "new_devices")?,
            offline_devices: get_u32(row, "offline_devices")?,
            method: get_string(row, "method")?.parse()?,
            duration_ms: get_i64(row, "duration_ms")?.max(0) as u64,
            status: get_string(row, "status")?.parse()?,
            error_message: get_opt_string(row, "error_message"),
            started_at: parse_time(&get_string(row, "started_at")?)?,
            completed_at,
        },
    })
}

pub(crate) fn history_from_row(row: &Row) -> Result<HistoryPoint, StoreError> {
    Ok(HistoryPoint {
        scan_id: get_i64(row, "scan_id")?,
        timestamp: parse_time(&get_string(row, "timestamp")?)?,
        online_count: get_u32(row, "online_count")?,
        offline_count: get_u32(row, "offline_count")?,
        total_count: get_u32(row, "total_count")?,
    })
}
