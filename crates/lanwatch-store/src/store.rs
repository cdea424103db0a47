//! The storage seam consumed by the discovery engine.
//!
//! All scan-time writes go through one [`InventoryTxn`]: device upserts,
//! the scan record, and its history point become visible together on
//! [`InventoryTxn::commit`] or not at all.

use std::future::Future;
use std::net::Ipv4Addr;

use chrono::{DateTime, Utc};
use lanwatch_core::{
    Device, DeviceAnnotation, DeviceCounts, DeviceStatus, HistoryPoint, MacAddress, NewScanRecord,
    ScanRecord,
};

use crate::error::Result;

/// A single storage transaction.
///
/// Dropping a transaction without committing discards its writes.
pub trait InventoryTxn: Send {
    /// Every device row, as visible inside this transaction.
    fn load_devices(&mut self) -> impl Future<Output = Result<Vec<Device>>> + Send;

    /// Insert or replace the device keyed by its hardware address.
    fn upsert_device(&mut self, device: &Device) -> impl Future<Output = Result<()>> + Send;

    /// Append a scan record and return its assigned id.
    fn insert_scan_record(
        &mut self,
        record: &NewScanRecord,
    ) -> impl Future<Output = Result<i64>> + Send;

    /// Append a history point for an already-inserted scan record.
    fn insert_history_point(
        &mut self,
        point: &HistoryPoint,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Online/offline totals including this transaction's own writes.
    fn device_counts(&mut self) -> impl Future<Output = Result<DeviceCounts>> + Send;

    fn commit(self) -> impl Future<Output = Result<()>> + Send;

    fn rollback(self) -> impl Future<Output = Result<()>> + Send;
}

/// Transactional create/read/update over devices, scan records, and
/// history points, with hardware-address uniqueness enforced.
pub trait InventoryStore: Send + Sync + 'static {
    type Txn: InventoryTxn;

    fn begin(&self) -> impl Future<Output = Result<Self::Txn>> + Send;

    /// Devices ordered by IP address, optionally filtered by status.
    fn list_devices(
        &self,
        status: Option<DeviceStatus>,
    ) -> impl Future<Output = Result<Vec<Device>>> + Send;

    fn find_device_by_ip(
        &self,
        ip: Ipv4Addr,
    ) -> impl Future<Output = Result<Option<Device>>> + Send;

    fn find_device(
        &self,
        mac: &MacAddress,
    ) -> impl Future<Output = Result<Option<Device>>> + Send;

    fn device_counts(&self) -> impl Future<Output = Result<DeviceCounts>> + Send;

    /// Update user labels on a device. Returns the updated device, or
    /// [`StoreError::NotFound`](crate::StoreError::NotFound).
    fn annotate_device(
        &self,
        mac: &MacAddress,
        annotation: &DeviceAnnotation,
    ) -> impl Future<Output = Result<Device>> + Send;

    /// Most recent scan records, newest first.
    fn recent_scans(&self, limit: usize) -> impl Future<Output = Result<Vec<ScanRecord>>> + Send;

    /// Completion time of the most recent completed scan.
    fn last_completed_scan_at(
        &self,
    ) -> impl Future<Output = Result<Option<DateTime<Utc>>>> + Send;

    /// Most recent history points, newest first.
    fn recent_history(
        &self,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<HistoryPoint>>> + Send;
}

/// Apply an annotation's non-empty fields to a device.
pub fn apply_annotation(device: &mut Device, annotation: &DeviceAnnotation) {
    if let Some(device_type) = &annotation.device_type {
        device.device_type = device_type.clone();
    }
    if let Some(name) = &annotation.custom_name {
        device.custom_name = Some(name.clone());
    }
    if let Some(notes) = &annotation.notes {
        device.notes = Some(notes.clone());
    }
}

/// Count online and offline devices in a slice.
pub fn count_devices<'a>(devices: impl IntoIterator<Item = &'a Device>) -> DeviceCounts {
    devices
        .into_iter()
        .fold(DeviceCounts::default(), |mut counts, d| {
            match d.status {
                DeviceStatus::Online => counts.online += 1,
                DeviceStatus::Offline => counts.offline += 1,
            }
            counts
        })
}
