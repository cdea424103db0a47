//! Hardware-address recovery from the OS neighbor (ARP) cache.

use std::collections::HashMap;
use std::net::Ipv4Addr;

use lanwatch_core::MacAddress;
use tokio::process::Command;

const PROC_NET_ARP: &str = "/proc/net/arp";

/// Best-effort MAC lookup for hosts that just answered a ping. Hosts
/// missing from the result have no complete cache entry.
pub async fn resolve_macs(ips: &[Ipv4Addr]) -> HashMap<Ipv4Addr, MacAddress> {
    if ips.is_empty() {
        return HashMap::new();
    }

    let table = match tokio::fs::read_to_string(PROC_NET_ARP).await {
        Ok(text) => parse_proc_net_arp(&text),
        Err(_) => match Command::new("arp").arg("-an").output().await {
            Ok(out) => parse_arp_output(&String::from_utf8_lossy(&out.stdout)),
            Err(e) => {
                tracing::debug!(error = %e, "Neighbor cache unavailable");
                HashMap::new()
            }
        },
    };

    ips.iter()
        .filter_map(|ip| table.get(ip).map(|mac| (*ip, *mac)))
        .collect()
}

/// Parse Linux `/proc/net/arp`. Incomplete entries (flags `0x0`) and
/// all-zero addresses are skipped.
///
/// ```text
/// IP address       HW type     Flags       HW address            Mask     Device
/// 192.168.1.1      0x1         0x2         a4:2b:b0:11:22:33     *        eth0
/// ```
pub fn parse_proc_net_arp(text: &str) -> HashMap<Ipv4Addr, MacAddress> {
    text.lines()
        .skip(1)
        .filter_map(|line| {
            let cols: Vec<&str> = line.split_whitespace().collect();
            if cols.len() < 4 || cols[2] == "0x0" {
                return None;
            }
            let ip = cols[0].parse().ok()?;
            let mac: MacAddress = cols[3].parse().ok()?;
            usable(&mac).then_some((ip, mac))
        })
        .collect()
}

/// Parse BSD/Windows style `arp -an` / `arp -a` output, taking the first
/// MAC-shaped token after each IPv4 address.
///
/// ```text
/// ? (192.168.1.1) at 0:1c:b3:9:a:ff on en0 ifscope [ethernet]
///   192.168.1.20          a4-2b-b0-11-22-33     dynamic
/// ```
pub fn parse_arp_output(text: &str) -> HashMap<Ipv4Addr, MacAddress> {
    text.lines()
        .filter_map(|line| {
            let mut tokens = line
                .split_whitespace()
                .map(|t| t.trim_matches(|c| c == '(' || c == ')'));
            let ip: Ipv4Addr = tokens.find_map(|t| t.parse().ok())?;
            let mac = tokens.find_map(|t| t.parse::<MacAddress>().ok())?;
            usable(&mac).then_some((ip, mac))
        })
        .collect()
}

fn usable(mac: &MacAddress) -> bool {
    !mac.is_zero() && !mac.is_broadcast()
}
