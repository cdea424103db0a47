//! Read-side operations for presentation layers.

use std::net::Ipv4Addr;

use lanwatch_core::{
    Device, DeviceAnnotation, DeviceStatus, HistoryPoint, InventorySummary, MacAddress, ScanRecord,
};
use lanwatch_store::{InventoryStore, StoreError};

use crate::engine::DiscoveryEngine;
use crate::error::{DiscoverError, Result};
use crate::history;
use crate::probe::HostProbe;
use crate::subnet::to_strings;

pub const DEFAULT_HISTORY_LIMIT: usize = 50;
pub const MAX_HISTORY_LIMIT: usize = 500;
pub const DEFAULT_SCAN_LIMIT: usize = 20;
pub const MAX_SCAN_LIMIT: usize = 100;

impl<S: InventoryStore, P: HostProbe> DiscoveryEngine<S, P> {
    /// Devices ordered by IP, optionally only those with `status`.
    pub async fn list_devices(&self, status: Option<DeviceStatus>) -> Result<Vec<Device>> {
        Ok(self.store.list_devices(status).await?)
    }

    pub async fn get_device(&self, ip: Ipv4Addr) -> Result<Device> {
        self.store
            .find_device_by_ip(ip)
            .await?
            .ok_or_else(|| DiscoverError::DeviceNotFound(ip.to_string()))
    }

    pub async fn summary(&self) -> Result<InventorySummary> {
        let counts = self.store.device_counts().await?;
        let last_scan_at = self.store.last_completed_scan_at().await?;
        Ok(InventorySummary {
            total_devices: counts.total(),
            online_devices: counts.online,
            offline_devices: counts.offline,
            last_scan_at,
            subnets: self.subnets().await,
        })
    }

    /// The latest `limit` history points (clamped to 1..=500), oldest first.
    pub async fn history(&self, limit: usize) -> Result<Vec<HistoryPoint>> {
        history::history(self.store.as_ref(), limit.clamp(1, MAX_HISTORY_LIMIT)).await
    }

    /// The latest `limit` scan records (clamped to 1..=100), newest first.
    pub async fn list_scans(&self, limit: usize) -> Result<Vec<ScanRecord>> {
        Ok(self
            .store
            .recent_scans(limit.clamp(1, MAX_SCAN_LIMIT))
            .await?)
    }

    /// Subnets the next scan would cover.
    pub async fn subnets(&self) -> Vec<String> {
        to_strings(&self.detector.detect().await)
    }

    /// Set user labels on a device. Status and addresses are untouched.
    pub async fn annotate_device(
        &self,
        mac: &MacAddress,
        annotation: &DeviceAnnotation,
    ) -> Result<Device> {
        match self.store.annotate_device(mac, annotation).await {
            Ok(device) => Ok(device),
            Err(StoreError::NotFound(_)) => Err(DiscoverError::DeviceNotFound(mac.to_string())),
            Err(e) => Err(e.into()),
        }
    }
}
