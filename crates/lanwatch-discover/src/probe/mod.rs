//! Host probing for one subnet.
//!
//! ARP is tried first. When it is unavailable (no privilege, no interface
//! on the subnet) the subnet is swept with ICMP echo instead, and hardware
//! addresses are recovered from the OS neighbor cache.

pub mod arp;
pub mod lookup;
pub mod neighbor;
pub mod ping;

use std::future::Future;
use std::net::Ipv4Addr;
use std::time::Duration;

use ipnet::Ipv4Net;
use lanwatch_core::{ScanMethod, Sighting};

use crate::config::DiscoverConfig;
use crate::error::Result;
use crate::subnet::usable_hosts;

/// Result of one probing strategy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Found(Vec<Sighting>),
    /// The strategy cannot run here. Not a scan failure.
    Unavailable(String),
}

/// Sightings from one subnet and the method that produced them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubnetScan {
    pub subnet: Ipv4Net,
    pub sightings: Vec<Sighting>,
    pub method: ScanMethod,
}

/// Something that can enumerate live hosts on a subnet.
///
/// The engine calls this once per subnet per scan, concurrently across
/// subnets, under its own hard timeout.
pub trait HostProbe: Send + Sync + 'static {
    /// `timeout` bounds how long ARP replies are collected.
    fn scan_network(
        &self,
        subnet: Ipv4Net,
        timeout: Duration,
    ) -> impl Future<Output = Result<SubnetScan>> + Send;
}

/// Tunables for [`NetworkProber`].
#[derive(Debug, Clone)]
pub struct ProbeSettings {
    pub ping_timeout: Duration,
    pub ping_concurrency: usize,
    pub max_hosts: usize,
    pub resolve_hostnames: bool,
}

impl ProbeSettings {
    pub fn from_config(config: &DiscoverConfig) -> Self {
        Self {
            ping_timeout: config.ping_timeout(),
            ping_concurrency: config.ping_concurrency,
            max_hosts: config.max_hosts_per_subnet,
            resolve_hostnames: config.resolve_hostnames,
        }
    }
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self::from_config(&DiscoverConfig::default())
    }
}

/// The real prober: raw-socket ARP, ICMP sweep, neighbor cache, reverse DNS.
pub struct NetworkProber {
    settings: ProbeSettings,
}

impl NetworkProber {
    pub fn new(settings: ProbeSettings) -> Self {
        Self { settings }
    }

    fn target_hosts(&self, subnet: &Ipv4Net) -> Vec<Ipv4Addr> {
        let hosts: Vec<Ipv4Addr> = usable_hosts(subnet).take(self.settings.max_hosts).collect();
        if hosts.len() == self.settings.max_hosts && usable_hosts(subnet).nth(hosts.len()).is_some()
        {
            tracing::warn!(
                cidr = %subnet,
                max_hosts = self.settings.max_hosts,
                "Subnet larger than host cap, probing truncated"
            );
        }
        hosts
    }

    async fn ping_sweep(&self, subnet: Ipv4Net, hosts: Vec<Ipv4Addr>) -> Result<Vec<Sighting>> {
        let alive = ping::sweep(
            hosts,
            self.settings.ping_timeout,
            self.settings.ping_concurrency,
        )
        .await;

        let macs = neighbor::resolve_macs(&alive).await;
        let sightings: Vec<Sighting> = alive
            .into_iter()
            .map(|ip| Sighting::new(ip, macs.get(&ip).copied()))
            .collect();

        let unresolved = sightings.iter().filter(|s| s.mac_address.is_none()).count();
        if unresolved > 0 {
            tracing::debug!(cidr = %subnet, unresolved, "Hosts answered ping without a cached MAC");
        }
        Ok(sightings)
    }
}

impl HostProbe for NetworkProber {
    async fn scan_network(&self, subnet: Ipv4Net, timeout: Duration) -> Result<SubnetScan> {
        let hosts = self.target_hosts(&subnet);
        let primary = arp::scan(subnet, hosts.clone(), timeout).await;
        let (mut sightings, method) =
            with_fallback(subnet, primary, || self.ping_sweep(subnet, hosts)).await?;

        lookup::enrich(&mut sightings, self.settings.resolve_hostnames).await;

        tracing::info!(
            cidr = %subnet,
            method = %method,
            hosts = sightings.len(),
            "Subnet probed"
        );
        Ok(SubnetScan {
            subnet,
            sightings,
            method,
        })
    }
}

/// Settle the strategy for one subnet: the primary (ARP) outcome if it
/// ran, otherwise the fallback sweep.
pub async fn with_fallback<F, Fut>(
    subnet: Ipv4Net,
    primary: ProbeOutcome,
    fallback: F,
) -> Result<(Vec<Sighting>, ScanMethod)>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Vec<Sighting>>>,
{
    match primary {
        ProbeOutcome::Found(sightings) => Ok((sightings, ScanMethod::Arp)),
        ProbeOutcome::Unavailable(reason) => {
            tracing::warn!(cidr = %subnet, reason = %reason, "ARP unavailable, falling back to ping sweep");
            Ok((fallback().await?, ScanMethod::Ping))
        }
    }
}
