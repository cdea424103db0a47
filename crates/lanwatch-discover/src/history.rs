//! Scan record and history point persistence.
//!
//! Both writes share the transaction that carried the device mutations,
//! so a history point always describes exactly the committed inventory.

use chrono::{DateTime, Utc};
use lanwatch_core::{DeviceCounts, HistoryPoint, NewScanRecord};
use lanwatch_store::{InventoryStore, InventoryTxn};

use crate::error::Result;

/// Append a scan record and return its id.
pub async fn record_scan<T: InventoryTxn>(txn: &mut T, record: &NewScanRecord) -> Result<i64> {
    let id = txn.insert_scan_record(record).await?;
    tracing::debug!(scan_id = id, status = record.status.as_str(), "Scan record written");
    Ok(id)
}

/// Snapshot the transaction's device totals against `scan_id`.
pub async fn record_history_point<T: InventoryTxn>(
    txn: &mut T,
    scan_id: i64,
    timestamp: DateTime<Utc>,
) -> Result<HistoryPoint> {
    let counts: DeviceCounts = txn.device_counts().await?;
    let point = HistoryPoint::from_counts(scan_id, counts, timestamp);
    txn.insert_history_point(&point).await?;
    Ok(point)
}

/// The latest `limit` history points, oldest first.
pub async fn history<S: InventoryStore>(store: &S, limit: usize) -> Result<Vec<HistoryPoint>> {
    let mut points = store.recent_history(limit).await?;
    points.reverse();
    Ok(points)
}
