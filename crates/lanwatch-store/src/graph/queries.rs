//! Read operations for the inventory graph.

use std::net::Ipv4Addr;

use chrono::{DateTime, Utc};
use lanwatch_core::{
    Device, DeviceAnnotation, DeviceCounts, DeviceStatus, HistoryPoint, MacAddress, ScanRecord,
};
use neo4rs::query;

use super::mutations::{counts_from_rows, GraphTxn};
use super::{
    device_from_row, history_from_row, opt_string, scan_from_row, DEVICE_FIELDS, HISTORY_FIELDS,
    SCAN_FIELDS,
};
use crate::error::{Result, StoreError};
use crate::store::InventoryStore;
use crate::GraphStore;

impl InventoryStore for GraphStore {
    type Txn = GraphTxn;

    async fn begin(&self) -> Result<GraphTxn> {
        self.start_txn().await
    }

    async fn list_devices(&self, status: Option<DeviceStatus>) -> Result<Vec<Device>> {
        let q = match status {
            Some(status) => query(&format!(
                "MATCH (d:Device) WHERE d.status = $status RETURN {DEVICE_FIELDS}"
            ))
            .param("status", status.as_str()),
            None => query(&format!("MATCH (d:Device) RETURN {DEVICE_FIELDS}")),
        };

        let rows = self.query_rows(q).await?;
        let mut devices = rows
            .iter()
            .map(device_from_row)
            .collect::<Result<Vec<_>>>()?;
        // Stored as strings; order numerically here.
        devices.sort_by_key(|d| d.ip_address);
        Ok(devices)
    }

    async fn find_device_by_ip(&self, ip: Ipv4Addr) -> Result<Option<Device>> {
        let q = query(&format!(
            "MATCH (d:Device {{ip_address: $ip}}) RETURN {DEVICE_FIELDS} \
             ORDER BY status = 'online' DESC, last_seen DESC LIMIT 1"
        ))
        .param("ip", ip.to_string());

        self.query_one(q)
            .await?
            .map(|row| device_from_row(&row))
            .transpose()
    }

    async fn find_device(&self, mac: &MacAddress) -> Result<Option<Device>> {
        let q = query(&format!(
            "MATCH (d:Device {{mac_address: $mac}}) RETURN {DEVICE_FIELDS}"
        ))
        .param("mac", mac.to_string());

        self.query_one(q)
            .await?
            .map(|row| device_from_row(&row))
            .transpose()
    }

    async fn device_counts(&self) -> Result<DeviceCounts> {
        let rows = self
            .query_rows(query(
                "MATCH (d:Device) RETURN d.status AS status, count(d) AS cnt",
            ))
            .await?;
        Ok(counts_from_rows(&rows))
    }

    async fn annotate_device(
        &self,
        mac: &MacAddress,
        annotation: &DeviceAnnotation,
    ) -> Result<Device> {
        let cypher = format!(
            "MATCH (d:Device {{mac_address: $mac}})
             SET d.device_type = CASE WHEN $device_type = '' THEN d.device_type ELSE $device_type END,
                 d.custom_name = CASE WHEN $custom_name = '' THEN d.custom_name ELSE $custom_name END,
                 d.notes = CASE WHEN $notes = '' THEN d.notes ELSE $notes END
             RETURN {DEVICE_FIELDS}"
        );
        let q = query(&cypher)
            .param("mac", mac.to_string())
            .param("device_type", opt_string(&annotation.device_type))
            .param("custom_name", opt_string(&annotation.custom_name))
            .param("notes", opt_string(&annotation.notes));

        match self.query_one(q).await? {
            Some(row) => device_from_row(&row),
            None => Err(StoreError::NotFound(mac.to_string())),
        }
    }

    async fn recent_scans(&self, limit: usize) -> Result<Vec<ScanRecord>> {
        let q = query(&format!(
            "MATCH (s:ScanRecord) RETURN {SCAN_FIELDS} ORDER BY s.id DESC LIMIT $limit"
        ))
        .param("limit", limit as i64);

        let rows = self.query_rows(q).await?;
        rows.iter().map(scan_from_row).collect()
    }

    async fn last_completed_scan_at(&self) -> Result<Option<DateTime<Utc>>> {
        let q = query(&format!(
            "MATCH (s:ScanRecord {{status: 'completed'}})
             RETURN {SCAN_FIELDS} ORDER BY s.completed_at DESC LIMIT 1"
        ));

        match self.query_one(q).await? {
            Some(row) => Ok(scan_from_row(&row)?.record.completed_at),
            None => Ok(None),
        }
    }

    async fn recent_history(&self, limit: usize) -> Result<Vec<HistoryPoint>> {
        let q = query(&format!(
            "MATCH (h:HistoryPoint)
             RETURN {HISTORY_FIELDS}
             ORDER BY h.timestamp DESC, h.scan_id DESC LIMIT $limit"
        ))
        .param("limit", limit as i64);

        let rows = self.query_rows(q).await?;
        rows.iter().map(history_from_row).collect()
    }
}
