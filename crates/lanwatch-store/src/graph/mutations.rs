//! Transactional writes for the inventory graph.
//!
//! Devices use MERGE (upsert) semantics on `mac_address`. Scan record ids
//! come from a `(:Sequence)` node incremented inside the same transaction.

use lanwatch_core::{Device, DeviceCounts, DeviceStatus, HistoryPoint, NewScanRecord};
use neo4rs::{query, Query, Row, Txn};

use super::{device_from_row, opt_string, DEVICE_FIELDS};
use crate::error::{Result, StoreError};
use crate::store::InventoryTxn;
use crate::GraphStore;

/// An open Neo4j transaction.
pub struct GraphTxn {
    txn: Txn,
}

impl GraphTxn {
    async fn fetch_rows(&mut self, q: Query) -> Result<Vec<Row>> {
        let mut stream = self.txn.execute(q).await?;
        let mut rows = Vec::new();
        while let Some(row) = stream.next(self.txn.handle()).await? {
            rows.push(row);
        }
        Ok(rows)
    }
}

impl InventoryTxn for GraphTxn {
    async fn load_devices(&mut self) -> Result<Vec<Device>> {
        let cypher = format!("MATCH (d:Device) RETURN {DEVICE_FIELDS}");
        let rows = self.fetch_rows(query(&cypher)).await?;
        rows.iter().map(device_from_row).collect()
    }

    async fn upsert_device(&mut self, device: &Device) -> Result<()> {
        let q = query(
            "MERGE (d:Device {mac_address: $mac_address})
             SET d.ip_address = $ip_address, d.hostname = $hostname,
                 d.vendor = $vendor, d.status = $status,
                 d.device_type = $device_type, d.custom_name = $custom_name,
                 d.notes = $notes, d.first_seen = $first_seen,
                 d.last_seen = $last_seen",
        )
        .param("mac_address", device.mac_address.to_string())
        .param("ip_address", device.ip_address.to_string())
        .param("hostname", opt_string(&device.hostname))
        .param("vendor", opt_string(&device.vendor))
        .param("status", device.status.as_str())
        .param("device_type", device.device_type.clone())
        .param("custom_name", opt_string(&device.custom_name))
        .param("notes", opt_string(&device.notes))
        .param("first_seen", device.first_seen.to_rfc3339())
        .param("last_seen", device.last_seen.to_rfc3339());

        self.txn.run(q).await?;
        Ok(())
    }

    async fn insert_scan_record(&mut self, record: &NewScanRecord) -> Result<i64> {
        let q = query(
            "MERGE (c:Sequence {name: 'scan_record'})
             ON CREATE SET c.value = 0
             SET c.value = c.value + 1
             WITH c
             CREATE (s:ScanRecord {
               id: c.value, subnets: $subnets, device_count: $device_count,
               new_devices: $new_devices, offline_devices: $offline_devices,
               method: $method, duration_ms: $duration_ms, status: $status,
               error_message: $error_message, started_at: $started_at,
               completed_at: $completed_at
             })
             RETURN s.id AS id",
        )
        .param("subnets", record.subnets.clone())
        .param("device_count", record.device_count as i64)
        .param("new_devices", record.new_devices as i64)
        .param("offline_devices", record.offline_devices as i64)
        .param("method", record.method.as_str())
        .param("duration_ms", record.duration_ms as i64)
        .param("status", record.status.as_str())
        .param("error_message", opt_string(&record.error_message))
        .param("started_at", record.started_at.to_rfc3339())
        .param(
            "completed_at",
            record
                .completed_at
                .map(|t| t.to_rfc3339())
                .unwrap_or_default(),
        );

        let rows = self.fetch_rows(q).await?;
        let row = rows
            .first()
            .ok_or_else(|| StoreError::Aborted("scan record insert returned no id".to_string()))?;
        row.get::<i64>("id")
            .map_err(|e| StoreError::Serialization(format!("Failed to read scan id: {e}")))
    }

    async fn insert_history_point(&mut self, point: &HistoryPoint) -> Result<()> {
        let q = query(
            "MATCH (s:ScanRecord {id: $scan_id})
             CREATE (s)-[:SNAPSHOT]->(h:HistoryPoint {
               scan_id: $scan_id, timestamp: $timestamp,
               online_count: $online_count, offline_count: $offline_count,
               total_count: $total_count
             })
             RETURN h.scan_id AS scan_id",
        )
        .param("scan_id", point.scan_id)
        .param("timestamp", point.timestamp.to_rfc3339())
        .param("online_count", point.online_count as i64)
        .param("offline_count", point.offline_count as i64)
        .param("total_count", point.total_count as i64);

        if self.fetch_rows(q).await?.is_empty() {
            return Err(StoreError::Aborted(format!(
                "history point references unknown scan {}",
                point.scan_id
            )));
        }
        Ok(())
    }

    async fn device_counts(&mut self) -> Result<DeviceCounts> {
        let rows = self
            .fetch_rows(query(
                "MATCH (d:Device) RETURN d.status AS status, count(d) AS cnt",
            ))
            .await?;
        Ok(counts_from_rows(&rows))
    }

    async fn commit(self) -> Result<()> {
        self.txn.commit().await?;
        Ok(())
    }

    async fn rollback(self) -> Result<()> {
        self.txn.rollback().await?;
        Ok(())
    }
}

pub(crate) fn counts_from_rows(rows: &[Row]) -> DeviceCounts {
    let mut counts = DeviceCounts::default();
    for row in rows {
        let cnt = row.get::<i64>("cnt").unwrap_or(0).max(0) as u32;
        match row.get::<String>("status").ok().and_then(|s| s.parse().ok()) {
            Some(DeviceStatus::Online) => counts.online += cnt,
            Some(DeviceStatus::Offline) => counts.offline += cnt,
            None => tracing::warn!(cnt, "Devices with unrecognized status ignored in counts"),
        }
    }
    counts
}

impl GraphStore {
    pub(crate) async fn start_txn(&self) -> Result<GraphTxn> {
        Ok(GraphTxn {
            txn: self.inner().start_txn().await?,
        })
    }
}
