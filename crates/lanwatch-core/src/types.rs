//! Core domain types for the Lanwatch device inventory.
//!
//! A [`Device`] is identified by its hardware address for its whole life;
//! everything else about it (IP, hostname, status) is refreshed by each scan.

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::LanwatchError;

// ── Hardware Address ──────────────────────────────────────────────

/// A 48-bit Ethernet hardware address.
///
/// Displays as upper-case, colon-separated octets (`AA:BB:CC:00:11:22`).
/// Parsing accepts `:` or `-` separators and single-digit groups, which
/// is how BSD `arp` prints leading zeros away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MacAddress([u8; 6]);

impl MacAddress {
    pub const fn new(octets: [u8; 6]) -> Self {
        Self(octets)
    }

    pub fn octets(&self) -> [u8; 6] {
        self.0
    }

    /// The organizationally unique identifier (first three octets).
    pub fn oui(&self) -> [u8; 3] {
        [self.0[0], self.0[1], self.0[2]]
    }

    /// Bit 1 of the first octet marks locally administered (randomized or
    /// virtual) addresses.
    pub fn is_locally_administered(&self) -> bool {
        self.0[0] & 0x02 != 0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0; 6]
    }

    pub fn is_broadcast(&self) -> bool {
        self.0 == [0xff; 6]
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02X}:{b:02X}:{c:02X}:{d:02X}:{e:02X}:{g:02X}")
    }
}

impl FromStr for MacAddress {
    type Err = LanwatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || LanwatchError::InvalidMac(s.to_string());
        let mut octets = [0u8; 6];
        let mut groups = s.trim().split([':', '-']);

        for octet in octets.iter_mut() {
            let group = groups.next().ok_or_else(invalid)?;
            if group.is_empty() || group.len() > 2 {
                return Err(invalid());
            }
            *octet = u8::from_str_radix(group, 16).map_err(|_| invalid())?;
        }

        if groups.next().is_some() {
            return Err(invalid());
        }
        Ok(Self(octets))
    }
}

impl TryFrom<String> for MacAddress {
    type Error = LanwatchError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<MacAddress> for String {
    fn from(mac: MacAddress) -> Self {
        mac.to_string()
    }
}

/// Serde adapter for optional hardware addresses that travel as the
/// literal string `"unknown"` when unresolved.
pub mod unknown_mac {
    use serde::{Deserialize, Deserializer, Serializer};

    use super::MacAddress;

    pub const UNKNOWN: &str = "unknown";

    pub fn serialize<S: Serializer>(mac: &Option<MacAddress>, s: S) -> Result<S::Ok, S::Error> {
        match mac {
            Some(mac) => s.collect_str(mac),
            None => s.serialize_str(UNKNOWN),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<MacAddress>, D::Error> {
        let raw = String::deserialize(d)?;
        if raw.eq_ignore_ascii_case(UNKNOWN) {
            return Ok(None);
        }
        raw.parse().map(Some).map_err(serde::de::Error::custom)
    }
}

// ── Sightings ─────────────────────────────────────────────────────

/// One host observed by a probe during a scan.
///
/// `mac_address` is `None` when the hardware address could not be
/// recovered (ping sweep with an empty neighbor cache entry).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sighting {
    pub ip_address: Ipv4Addr,
    #[serde(with = "unknown_mac")]
    pub mac_address: Option<MacAddress>,
    pub hostname: Option<String>,
    pub vendor: Option<String>,
}

impl Sighting {
    pub fn new(ip_address: Ipv4Addr, mac_address: Option<MacAddress>) -> Self {
        Self {
            ip_address,
            mac_address,
            hostname: None,
            vendor: None,
        }
    }
}

// ── Devices ───────────────────────────────────────────────────────

/// Whether a device answered the most recent scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    Online,
    Offline,
}

impl DeviceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Offline => "offline",
        }
    }
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeviceStatus {
    type Err = LanwatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "online" => Ok(Self::Online),
            "offline" => Ok(Self::Offline),
            _ => Err(LanwatchError::InvalidStatus(s.to_string())),
        }
    }
}

pub const DEFAULT_DEVICE_TYPE: &str = "unknown";

/// A device in the persistent inventory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub mac_address: MacAddress,
    pub ip_address: Ipv4Addr,
    pub hostname: Option<String>,
    pub vendor: Option<String>,
    pub status: DeviceStatus,
    pub device_type: String,
    pub custom_name: Option<String>,
    pub notes: Option<String>,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

impl Device {
    /// A freshly discovered, online device.
    pub fn discovered(
        mac_address: MacAddress,
        ip_address: Ipv4Addr,
        hostname: Option<String>,
        vendor: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            mac_address,
            ip_address,
            hostname,
            vendor,
            status: DeviceStatus::Online,
            device_type: DEFAULT_DEVICE_TYPE.to_string(),
            custom_name: None,
            notes: None,
            first_seen: now,
            last_seen: now,
        }
    }

    pub fn is_online(&self) -> bool {
        self.status == DeviceStatus::Online
    }
}

/// User-supplied labels for a device. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceAnnotation {
    pub device_type: Option<String>,
    pub custom_name: Option<String>,
    pub notes: Option<String>,
}

// ── Scan Records ──────────────────────────────────────────────────

/// The probing strategy a subnet (or a whole scan) ended up using.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanMethod {
    Arp,
    Ping,
}

impl ScanMethod {
    /// Fold per-subnet methods into the single label stored on a scan:
    /// any ping fallback makes the whole scan "ping".
    pub fn combine(self, other: ScanMethod) -> ScanMethod {
        match (self, other) {
            (Self::Arp, Self::Arp) => Self::Arp,
            _ => Self::Ping,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Arp => "arp",
            Self::Ping => "ping",
        }
    }
}

impl fmt::Display for ScanMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScanMethod {
    type Err = LanwatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "arp" => Ok(Self::Arp),
            "ping" => Ok(Self::Ping),
            _ => Err(LanwatchError::InvalidMethod(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanStatus {
    Completed,
    Failed,
}

impl ScanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl FromStr for ScanStatus {
    type Err = LanwatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(LanwatchError::InvalidScanStatus(s.to_string())),
        }
    }
}

/// A scan record before the store has assigned it an id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewScanRecord {
    pub subnets: Vec<String>,
    /// Total sightings, including ones with an unresolved hardware address.
    pub device_count: u32,
    pub new_devices: u32,
    pub offline_devices: u32,
    pub method: ScanMethod,
    pub duration_ms: u64,
    pub status: ScanStatus,
    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// One executed scan. Immutable once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanRecord {
    pub id: i64,
    #[serde(flatten)]
    pub record: NewScanRecord,
}

/// Online/offline device totals at one instant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceCounts {
    pub online: u32,
    pub offline: u32,
}

impl DeviceCounts {
    pub fn total(&self) -> u32 {
        self.online + self.offline
    }
}

/// Aggregate inventory snapshot written alongside each completed scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryPoint {
    pub scan_id: i64,
    pub timestamp: DateTime<Utc>,
    pub online_count: u32,
    pub offline_count: u32,
    pub total_count: u32,
}

impl HistoryPoint {
    pub fn from_counts(scan_id: i64, counts: DeviceCounts, timestamp: DateTime<Utc>) -> Self {
        Self {
            scan_id,
            timestamp,
            online_count: counts.online,
            offline_count: counts.offline,
            total_count: counts.total(),
        }
    }
}

// ── Summaries ─────────────────────────────────────────────────────

/// Which method a single subnet was probed with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubnetMethod {
    pub cidr: String,
    pub method: ScanMethod,
}

/// Result of one `run_scan` invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanSummary {
    pub scan_id: i64,
    pub total_devices: u32,
    pub new_devices: u32,
    pub offline_devices: u32,
    pub duration_ms: u64,
    pub subnets: Vec<String>,
    pub method: ScanMethod,
    pub subnet_methods: Vec<SubnetMethod>,
}

/// Inventory-wide totals for presentation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventorySummary {
    pub total_devices: u32,
    pub online_devices: u32,
    pub offline_devices: u32,
    pub last_scan_at: Option<DateTime<Utc>>,
    pub subnets: Vec<String>,
}
