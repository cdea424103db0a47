//! In-process inventory backend.
//!
//! A transaction takes the store lock for its whole lifetime and works on a
//! private copy of the inventory; commit swaps the copy in. Readers wait for
//! an open transaction to finish, so they never observe a partial scan.

use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use lanwatch_core::{
    Device, DeviceAnnotation, DeviceCounts, DeviceStatus, HistoryPoint, MacAddress, NewScanRecord,
    ScanRecord, ScanStatus,
};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::error::{Result, StoreError};
use crate::store::{apply_annotation, count_devices, InventoryStore, InventoryTxn};

#[derive(Debug, Clone, Default)]
struct Inventory {
    devices: BTreeMap<MacAddress, Device>,
    scans: Vec<ScanRecord>,
    history: Vec<HistoryPoint>,
    next_scan_id: i64,
}

/// Mutex-guarded inventory held in memory. Clone is cheap (inner Arc).
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inventory>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed devices directly, bypassing reconciliation.
    pub async fn seed_devices(&self, devices: impl IntoIterator<Item = Device>) {
        let mut inv = self.inner.lock().await;
        for device in devices {
            inv.devices.insert(device.mac_address, device);
        }
    }

    pub async fn scan_count(&self) -> usize {
        self.inner.lock().await.scans.len()
    }
}

pub struct MemoryTxn {
    guard: OwnedMutexGuard<Inventory>,
    working: Inventory,
}

impl InventoryTxn for MemoryTxn {
    async fn load_devices(&mut self) -> Result<Vec<Device>> {
        Ok(self.working.devices.values().cloned().collect())
    }

    async fn upsert_device(&mut self, device: &Device) -> Result<()> {
        self.working
            .devices
            .insert(device.mac_address, device.clone());
        Ok(())
    }

    async fn insert_scan_record(&mut self, record: &NewScanRecord) -> Result<i64> {
        self.working.next_scan_id += 1;
        let id = self.working.next_scan_id;
        self.working.scans.push(ScanRecord {
            id,
            record: record.clone(),
        });
        Ok(id)
    }

    async fn insert_history_point(&mut self, point: &HistoryPoint) -> Result<()> {
        if !self.working.scans.iter().any(|s| s.id == point.scan_id) {
            return Err(StoreError::Aborted(format!(
                "history point references unknown scan {}",
                point.scan_id
            )));
        }
        self.working.history.push(point.clone());
        Ok(())
    }

    async fn device_counts(&mut self) -> Result<DeviceCounts> {
        Ok(count_devices(self.working.devices.values()))
    }

    async fn commit(mut self) -> Result<()> {
        *self.guard = self.working;
        Ok(())
    }

    async fn rollback(self) -> Result<()> {
        Ok(())
    }
}

impl InventoryStore for MemoryStore {
    type Txn = MemoryTxn;

    async fn begin(&self) -> Result<MemoryTxn> {
        let guard = self.inner.clone().lock_owned().await;
        let working = guard.clone();
        Ok(MemoryTxn { guard, working })
    }

    async fn list_devices(&self, status: Option<DeviceStatus>) -> Result<Vec<Device>> {
        let inv = self.inner.lock().await;
        let mut devices: Vec<Device> = inv
            .devices
            .values()
            .filter(|d| status.map_or(true, |s| d.status == s))
            .cloned()
            .collect();
        devices.sort_by_key(|d| d.ip_address);
        Ok(devices)
    }

    async fn find_device_by_ip(&self, ip: Ipv4Addr) -> Result<Option<Device>> {
        // A reassigned address can be shared; the live holder wins.
        let inv = self.inner.lock().await;
        Ok(inv
            .devices
            .values()
            .filter(|d| d.ip_address == ip)
            .max_by_key(|d| (d.status == DeviceStatus::Online, d.last_seen))
            .cloned())
    }

    async fn find_device(&self, mac: &MacAddress) -> Result<Option<Device>> {
        Ok(self.inner.lock().await.devices.get(mac).cloned())
    }

    async fn device_counts(&self) -> Result<DeviceCounts> {
        Ok(count_devices(self.inner.lock().await.devices.values()))
    }

    async fn annotate_device(
        &self,
        mac: &MacAddress,
        annotation: &DeviceAnnotation,
    ) -> Result<Device> {
        let mut inv = self.inner.lock().await;
        let device = inv
            .devices
            .get_mut(mac)
            .ok_or_else(|| StoreError::NotFound(mac.to_string()))?;
        apply_annotation(device, annotation);
        Ok(device.clone())
    }

    async fn recent_scans(&self, limit: usize) -> Result<Vec<ScanRecord>> {
        let inv = self.inner.lock().await;
        Ok(inv.scans.iter().rev().take(limit).cloned().collect())
    }

    async fn last_completed_scan_at(&self) -> Result<Option<DateTime<Utc>>> {
        let inv = self.inner.lock().await;
        Ok(inv
            .scans
            .iter()
            .filter(|s| s.record.status == ScanStatus::Completed)
            .filter_map(|s| s.record.completed_at)
            .max())
    }

    async fn recent_history(&self, limit: usize) -> Result<Vec<HistoryPoint>> {
        let inv = self.inner.lock().await;
        Ok(inv.history.iter().rev().take(limit).cloned().collect())
    }
}
