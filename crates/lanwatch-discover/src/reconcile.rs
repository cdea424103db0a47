//! Reconciliation: diff one scan's sightings against the stored inventory.
//!
//! [`plan`] is pure and decides every insert, refresh, and online→offline
//! transition. [`reconcile`] runs it against an open transaction.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Utc};
use lanwatch_core::{Device, DeviceStatus, EventPayload, MacAddress, Sighting};
use lanwatch_store::InventoryTxn;

use crate::error::Result;

/// Device writes produced by one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcilePlan {
    /// Known devices seen again, refreshed and online.
    pub updated: Vec<Device>,
    /// First sightings of a hardware address.
    pub inserted: Vec<Device>,
    /// Devices that were online and are absent from this scan.
    pub went_offline: Vec<Device>,
}

impl ReconcilePlan {
    pub fn new_count(&self) -> u32 {
        self.inserted.len() as u32
    }

    pub fn offline_count(&self) -> u32 {
        self.went_offline.len() as u32
    }

    /// One `device_new` per insert, then one `device_offline` per transition.
    pub fn events(&self) -> Vec<EventPayload> {
        let new = self.inserted.iter().map(|d| {
            EventPayload::DeviceNew(Sighting {
                ip_address: d.ip_address,
                mac_address: Some(d.mac_address),
                hostname: d.hostname.clone(),
                vendor: d.vendor.clone(),
            })
        });
        let offline = self.went_offline.iter().map(|d| EventPayload::DeviceOffline {
            ip_address: d.ip_address,
            mac_address: d.mac_address,
        });
        new.chain(offline).collect()
    }

    fn writes(&self) -> impl Iterator<Item = &Device> {
        self.updated
            .iter()
            .chain(&self.inserted)
            .chain(&self.went_offline)
    }
}

/// Merge sightings per hardware address. Unresolved addresses are dropped.
///
/// The lowest IP wins; hostname and vendor come from the first sighting,
/// in IP order, that carries them. Input order therefore never matters.
pub fn collapse(sightings: &[Sighting]) -> BTreeMap<MacAddress, Sighting> {
    let mut resolved: Vec<&Sighting> = sightings.iter().filter(|s| s.mac_address.is_some()).collect();
    resolved.sort_by(|a, b| {
        (a.ip_address, &a.hostname, &a.vendor).cmp(&(b.ip_address, &b.hostname, &b.vendor))
    });

    let mut merged: BTreeMap<MacAddress, Sighting> = BTreeMap::new();
    for sighting in resolved {
        let Some(mac) = sighting.mac_address else {
            continue;
        };
        merged
            .entry(mac)
            .and_modify(|kept| {
                if kept.hostname.is_none() {
                    kept.hostname = sighting.hostname.clone();
                }
                if kept.vendor.is_none() {
                    kept.vendor = sighting.vendor.clone();
                }
            })
            .or_insert_with(|| sighting.clone());
    }
    merged
}

/// Decide the device writes for `sightings` observed at `now`.
pub fn plan(existing: Vec<Device>, sightings: &[Sighting], now: DateTime<Utc>) -> ReconcilePlan {
    let seen = collapse(sightings);
    let mut known: HashMap<MacAddress, Device> = existing
        .into_iter()
        .map(|d| (d.mac_address, d))
        .collect();

    let mut result = ReconcilePlan::default();
    for (mac, sighting) in &seen {
        match known.remove(mac) {
            Some(mut device) => {
                device.ip_address = sighting.ip_address;
                if sighting.hostname.is_some() {
                    device.hostname = sighting.hostname.clone();
                }
                if sighting.vendor.is_some() {
                    device.vendor = sighting.vendor.clone();
                }
                device.status = DeviceStatus::Online;
                device.last_seen = now;
                result.updated.push(device);
            }
            None => result.inserted.push(Device::discovered(
                *mac,
                sighting.ip_address,
                sighting.hostname.clone(),
                sighting.vendor.clone(),
                now,
            )),
        }
    }

    let seen_macs: HashSet<&MacAddress> = seen.keys().collect();
    let mut went_offline: Vec<Device> = known
        .into_values()
        .filter(|d| d.is_online() && !seen_macs.contains(&d.mac_address))
        .map(|mut d| {
            d.status = DeviceStatus::Offline;
            d
        })
        .collect();
    went_offline.sort_by_key(|d| d.ip_address);
    result.went_offline = went_offline;

    result
}

/// Reconcile `sightings` inside `txn`. Nothing is visible until the caller
/// commits.
pub async fn reconcile<T: InventoryTxn>(
    txn: &mut T,
    sightings: &[Sighting],
    now: DateTime<Utc>,
) -> Result<ReconcilePlan> {
    let existing = txn.load_devices().await?;
    let plan = plan(existing, sightings, now);

    for device in plan.writes() {
        txn.upsert_device(device).await?;
    }

    tracing::debug!(
        updated = plan.updated.len(),
        new = plan.new_count(),
        offline = plan.offline_count(),
        "Reconciled sightings"
    );
    Ok(plan)
}
