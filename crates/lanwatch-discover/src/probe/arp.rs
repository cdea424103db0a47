//! Link-layer ARP scanning over a raw datalink channel.
//!
//! Opening the channel needs CAP_NET_RAW (or root). Every failure here is
//! reported as [`ProbeOutcome::Unavailable`] so the caller can fall back.

use std::collections::BTreeMap;
use std::io;
use std::net::{IpAddr, Ipv4Addr};
use std::time::{Duration, Instant};

use ipnet::Ipv4Net;
use lanwatch_core::{MacAddress, Sighting};
use pnet::datalink::{self, Channel, NetworkInterface};
use pnet::packet::arp::{ArpHardwareTypes, ArpOperations, ArpPacket, MutableArpPacket};
use pnet::packet::ethernet::{EtherTypes, EthernetPacket, MutableEthernetPacket};
use pnet::packet::Packet;
use pnet::util::MacAddr;

use super::ProbeOutcome;

const FRAME_LEN: usize = 42;
const READ_POLL: Duration = Duration::from_millis(100);

/// ARP-scan `targets` on `subnet`, collecting replies for `timeout`.
pub async fn scan(subnet: Ipv4Net, targets: Vec<Ipv4Addr>, timeout: Duration) -> ProbeOutcome {
    match tokio::task::spawn_blocking(move || scan_blocking(subnet, &targets, timeout)).await {
        Ok(outcome) => outcome,
        Err(e) => ProbeOutcome::Unavailable(format!("ARP worker failed: {e}")),
    }
}

fn scan_blocking(subnet: Ipv4Net, targets: &[Ipv4Addr], timeout: Duration) -> ProbeOutcome {
    let Some((iface, source_mac, source_ip)) = interface_for(&subnet) else {
        return ProbeOutcome::Unavailable(format!("no local interface on {subnet}"));
    };

    let config = datalink::Config {
        read_timeout: Some(READ_POLL),
        ..Default::default()
    };
    let (mut tx, mut rx) = match datalink::channel(&iface, config) {
        Ok(Channel::Ethernet(tx, rx)) => (tx, rx),
        Ok(_) => return ProbeOutcome::Unavailable("unsupported channel type".to_string()),
        Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
            return ProbeOutcome::Unavailable(format!("permission denied: {e}"));
        }
        Err(e) => return ProbeOutcome::Unavailable(format!("datalink channel: {e}")),
    };

    for target in targets {
        let frame = build_request(source_mac, source_ip, *target);
        if let Some(Err(e)) = tx.send_to(&frame, None) {
            if e.kind() == io::ErrorKind::PermissionDenied {
                return ProbeOutcome::Unavailable(format!("permission denied: {e}"));
            }
            tracing::debug!(target = %target, error = %e, "ARP request send failed");
        }
    }

    let deadline = Instant::now() + timeout;
    let mut replies: BTreeMap<Ipv4Addr, MacAddress> = BTreeMap::new();
    while Instant::now() < deadline {
        match rx.next() {
            Ok(frame) => {
                if let Some((ip, mac)) = parse_reply(frame, &subnet) {
                    replies.entry(ip).or_insert(mac);
                }
            }
            Err(e) if e.kind() == io::ErrorKind::TimedOut => continue,
            Err(e) => {
                tracing::debug!(cidr = %subnet, error = %e, "ARP receive error");
                std::thread::sleep(Duration::from_millis(1));
            }
        }
    }

    ProbeOutcome::Found(
        replies
            .into_iter()
            .map(|(ip, mac)| Sighting::new(ip, Some(mac)))
            .collect(),
    )
}

fn interface_for(subnet: &Ipv4Net) -> Option<(NetworkInterface, MacAddr, Ipv4Addr)> {
    datalink::interfaces().into_iter().find_map(|iface| {
        if !iface.is_up() || iface.is_loopback() {
            return None;
        }
        let mac = iface.mac?;
        let ip = iface.ips.iter().find_map(|net| match net.ip() {
            IpAddr::V4(ip) if subnet.contains(&ip) => Some(ip),
            _ => None,
        })?;
        Some((iface, mac, ip))
    })
}

/// Broadcast Ethernet frame carrying an ARP who-has for `target_ip`.
pub fn build_request(source_mac: MacAddr, source_ip: Ipv4Addr, target_ip: Ipv4Addr) -> Vec<u8> {
    let mut buffer = vec![0u8; FRAME_LEN];

    if let Some(mut eth) = MutableEthernetPacket::new(&mut buffer[..14]) {
        eth.set_destination(MacAddr::broadcast());
        eth.set_source(source_mac);
        eth.set_ethertype(EtherTypes::Arp);
    }

    if let Some(mut arp) = MutableArpPacket::new(&mut buffer[14..]) {
        arp.set_hardware_type(ArpHardwareTypes::Ethernet);
        arp.set_protocol_type(EtherTypes::Ipv4);
        arp.set_hw_addr_len(6);
        arp.set_proto_addr_len(4);
        arp.set_operation(ArpOperations::Request);
        arp.set_sender_hw_addr(source_mac);
        arp.set_sender_proto_addr(source_ip);
        arp.set_target_hw_addr(MacAddr::zero());
        arp.set_target_proto_addr(target_ip);
    }

    buffer
}

/// Sender address of an ARP reply from inside `subnet`, if `frame` is one.
pub fn parse_reply(frame: &[u8], subnet: &Ipv4Net) -> Option<(Ipv4Addr, MacAddress)> {
    let eth = EthernetPacket::new(frame)?;
    if eth.get_ethertype() != EtherTypes::Arp {
        return None;
    }
    let arp = ArpPacket::new(eth.payload())?;
    if arp.get_operation() != ArpOperations::Reply {
        return None;
    }

    let ip = arp.get_sender_proto_addr();
    if !subnet.contains(&ip) {
        return None;
    }
    let MacAddr(a, b, c, d, e, f) = arp.get_sender_hw_addr();
    let mac = MacAddress::new([a, b, c, d, e, f]);
    if mac.is_zero() || mac.is_broadcast() {
        return None;
    }
    Some((ip, mac))
}
