//! Hostname and vendor enrichment. Both lookups are best-effort: a failure
//! leaves the field empty.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use lanwatch_core::{MacAddress, Sighting};
use mac_oui::Oui;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

pub const RANDOMIZED_VENDOR: &str = "Private Device (Randomized MAC)";

const MAX_CONCURRENT_DNS: usize = 10;
const DNS_TIMEOUT: Duration = Duration::from_secs(2);

static OUI_DB: OnceLock<Option<Oui>> = OnceLock::new();

fn oui_db() -> Option<&'static Oui> {
    OUI_DB
        .get_or_init(|| {
            let db = Oui::default().ok();
            if db.is_none() {
                tracing::warn!("OUI database failed to load, vendors will be empty");
            }
            db
        })
        .as_ref()
}

/// Manufacturer for a hardware address. Locally administered addresses
/// have no registered OUI and get a fixed label instead.
pub fn lookup_vendor(mac: &MacAddress) -> Option<String> {
    if mac.is_locally_administered() {
        return Some(RANDOMIZED_VENDOR.to_string());
    }
    let db = oui_db()?;
    match db.lookup_by_mac(&mac.to_string()) {
        Ok(Some(entry)) => Some(entry.company_name.clone()),
        _ => None,
    }
}

/// Reverse DNS. A resolver echoing the address back counts as no name.
pub fn reverse_lookup(ip: Ipv4Addr) -> Option<String> {
    match dns_lookup::lookup_addr(&IpAddr::V4(ip)) {
        Ok(name) if name != ip.to_string() => Some(name),
        _ => None,
    }
}

async fn resolve_hostnames(ips: Vec<Ipv4Addr>) -> HashMap<Ipv4Addr, String> {
    let semaphore = Arc::new(Semaphore::new(MAX_CONCURRENT_DNS));
    let mut tasks = JoinSet::new();

    for ip in ips {
        let semaphore = Arc::clone(&semaphore);
        tasks.spawn(async move {
            let _permit = semaphore.acquire_owned().await.ok()?;
            let lookup = tokio::task::spawn_blocking(move || reverse_lookup(ip));
            match tokio::time::timeout(DNS_TIMEOUT, lookup).await {
                Ok(Ok(Some(name))) => Some((ip, name)),
                _ => None,
            }
        });
    }

    let mut names = HashMap::new();
    while let Some(joined) = tasks.join_next().await {
        if let Ok(Some((ip, name))) = joined {
            names.insert(ip, name);
        }
    }
    names
}

/// Fill in vendor (from the MAC) and, when enabled, hostname (reverse DNS)
/// on sightings that lack them.
pub async fn enrich(sightings: &mut [Sighting], resolve_names: bool) {
    for sighting in sightings.iter_mut() {
        if sighting.vendor.is_none() {
            sighting.vendor = sighting.mac_address.as_ref().and_then(lookup_vendor);
        }
    }

    if !resolve_names {
        return;
    }
    let pending: Vec<Ipv4Addr> = sightings
        .iter()
        .filter(|s| s.hostname.is_none())
        .map(|s| s.ip_address)
        .collect();
    if pending.is_empty() {
        return;
    }

    let mut names = resolve_hostnames(pending).await;
    for sighting in sightings.iter_mut() {
        if let Some(name) = names.remove(&sighting.ip_address) {
            sighting.hostname = Some(name);
        }
    }
}
