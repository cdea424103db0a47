//! Local subnet detection.
//!
//! Detection walks a ladder and the first rung that yields anything wins:
//! explicit configuration, the OS interface table, the platform's
//! address-listing command, and finally a fixed fallback subnet.

use std::net::Ipv4Addr;

use ipnet::Ipv4Net;
use pnet::datalink;
use tokio::process::Command;

use crate::config::DiscoverConfig;
use crate::error::{DiscoverError, Result};

/// Derives the IPv4 networks to scan.
#[derive(Debug, Clone)]
pub struct SubnetDetector {
    configured: Vec<Ipv4Net>,
    fallback: Ipv4Net,
}

impl SubnetDetector {
    pub fn new(configured: Vec<Ipv4Net>, fallback: Ipv4Net) -> Self {
        Self {
            configured,
            fallback,
        }
    }

    pub fn from_config(config: &DiscoverConfig) -> Result<Self> {
        let configured = config
            .subnets
            .iter()
            .map(|s| parse_cidr(s))
            .collect::<Result<Vec<_>>>()?;
        let fallback = parse_cidr(&config.fallback_subnet)?;
        Ok(Self::new(dedup(configured), fallback))
    }

    /// Ordered, de-duplicated networks to scan. Never empty.
    pub async fn detect(&self) -> Vec<Ipv4Net> {
        if !self.configured.is_empty() {
            return self.configured.clone();
        }

        let from_interfaces = interface_subnets();
        if !from_interfaces.is_empty() {
            tracing::debug!(count = from_interfaces.len(), "Subnets from interface table");
            return from_interfaces;
        }

        match command_subnets().await {
            Ok(nets) if !nets.is_empty() => {
                tracing::debug!(count = nets.len(), "Subnets from address command");
                return nets;
            }
            Ok(_) => tracing::warn!("Address command reported no IPv4 networks"),
            Err(e) => tracing::warn!(error = %e, "Address command failed"),
        }

        tracing::warn!(subnet = %self.fallback, "Subnet detection failed, using fallback");
        vec![self.fallback]
    }
}

/// Parse a CIDR string, normalizing host bits away (`10.0.0.7/24` → `10.0.0.0/24`).
pub fn parse_cidr(s: &str) -> Result<Ipv4Net> {
    s.trim()
        .parse::<Ipv4Net>()
        .map(|net| net.trunc())
        .map_err(|e| DiscoverError::InvalidSubnet {
            cidr: s.to_string(),
            reason: e.to_string(),
        })
}

/// Usable host addresses: everything except the network and broadcast
/// addresses (for /31 and /32 every address is usable).
pub fn usable_hosts(net: &Ipv4Net) -> impl Iterator<Item = Ipv4Addr> {
    net.hosts()
}

fn dedup(nets: Vec<Ipv4Net>) -> Vec<Ipv4Net> {
    let mut out: Vec<Ipv4Net> = Vec::with_capacity(nets.len());
    for net in nets {
        if !out.contains(&net) {
            out.push(net);
        }
    }
    out
}

/// Containing networks for address/prefix pairs, skipping loopback,
/// link-local, and unassigned addresses.
pub fn collect_networks(pairs: impl IntoIterator<Item = (Ipv4Addr, u8)>) -> Vec<Ipv4Net> {
    let nets = pairs
        .into_iter()
        .filter(|(ip, prefix)| {
            !ip.is_loopback() && !ip.is_link_local() && !ip.is_unspecified() && *prefix > 0
        })
        .filter_map(|(ip, prefix)| Ipv4Net::new(ip, prefix).ok())
        .map(|net| net.trunc())
        .collect();
    dedup(nets)
}

fn interface_subnets() -> Vec<Ipv4Net> {
    let pairs = datalink::interfaces()
        .into_iter()
        .filter(|iface| !iface.is_loopback())
        .flat_map(|iface| iface.ips)
        .filter_map(|net| match net.ip() {
            std::net::IpAddr::V4(ip) => Some((ip, net.prefix())),
            std::net::IpAddr::V6(_) => None,
        });
    collect_networks(pairs)
}

async fn command_subnets() -> Result<Vec<Ipv4Net>> {
    let (program, args, parse): (&str, &[&str], fn(&str) -> Vec<(Ipv4Addr, u8)>) =
        if cfg!(target_os = "linux") {
            ("ip", &["-4", "addr"], parse_ip_addr)
        } else {
            ("ifconfig", &[], parse_ifconfig)
        };

    let output = Command::new(program).args(args).output().await?;
    if !output.status.success() {
        return Err(DiscoverError::Probe {
            cidr: "*".to_string(),
            reason: format!("{program} exited with {}", output.status),
        });
    }

    let text = String::from_utf8_lossy(&output.stdout);
    Ok(collect_networks(parse(&text)))
}

/// Parse `ip -4 addr` output (`inet 192.168.1.20/24 brd ...`).
pub fn parse_ip_addr(text: &str) -> Vec<(Ipv4Addr, u8)> {
    text.lines()
        .filter_map(|line| {
            let mut tokens = line.split_whitespace();
            if tokens.next()? != "inet" {
                return None;
            }
            let (ip, prefix) = tokens.next()?.split_once('/')?;
            Some((ip.parse().ok()?, prefix.parse().ok()?))
        })
        .collect()
}

/// Parse `ifconfig` output. Handles BSD hex masks
/// (`inet 10.0.0.5 netmask 0xffffff00`) and net-tools dotted masks
/// (`inet 10.0.0.5  netmask 255.255.255.0`).
pub fn parse_ifconfig(text: &str) -> Vec<(Ipv4Addr, u8)> {
    text.lines()
        .filter_map(|line| {
            let tokens: Vec<&str> = line.split_whitespace().collect();
            if tokens.first() != Some(&"inet") {
                return None;
            }
            let ip = tokens.get(1)?.trim_start_matches("addr:").parse().ok()?;
            let mask_pos = tokens.iter().position(|t| *t == "netmask")?;
            let prefix = parse_netmask(tokens.get(mask_pos + 1)?)?;
            Some((ip, prefix))
        })
        .collect()
}

fn parse_netmask(raw: &str) -> Option<u8> {
    let mask = match raw.strip_prefix("0x") {
        Some(hex) => Ipv4Addr::from(u32::from_str_radix(hex, 16).ok()?),
        None => raw.parse().ok()?,
    };
    ipnet::ipv4_mask_to_prefix(mask).ok()
}

/// Render networks for records and events.
pub fn to_strings(nets: &[Ipv4Net]) -> Vec<String> {
    nets.iter().map(ToString::to_string).collect()
}
