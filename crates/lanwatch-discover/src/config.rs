//! Configuration for the lanwatch-discover daemon.

use std::time::Duration;

use lanwatch_store::GraphConfig;
use serde::Deserialize;

use crate::error::{DiscoverError, Result};

/// Top-level discover configuration.
///
/// Loaded from the `[discover]` section of `lanwatch.toml` or
/// `LANWATCH__DISCOVER__*` environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct DiscoverConfig {
    /// Seconds between scheduled scans.
    #[serde(default = "default_scan_interval")]
    pub scan_interval_secs: u64,

    /// How long ARP replies are collected for each subnet.
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,

    /// Timeout of a single ICMP echo during a ping sweep.
    #[serde(default = "default_ping_timeout_ms")]
    pub ping_timeout_ms: u64,

    /// Maximum in-flight pings per sweep.
    #[serde(default = "default_ping_concurrency")]
    pub ping_concurrency: usize,

    /// Hard limit on probing one subnet; exceeding it drops that subnet.
    #[serde(default = "default_subnet_timeout")]
    pub subnet_timeout_secs: u64,

    /// Ping sweeps over larger networks are truncated to this many hosts.
    #[serde(default = "default_max_hosts")]
    pub max_hosts_per_subnet: usize,

    /// Explicit CIDR targets. Empty means auto-detect from interfaces.
    #[serde(default)]
    pub subnets: Vec<String>,

    /// Subnet scanned when detection finds nothing.
    #[serde(default = "default_fallback_subnet")]
    pub fallback_subnet: String,

    /// Reverse-DNS every sighting.
    #[serde(default = "default_true")]
    pub resolve_hostnames: bool,
}

impl DiscoverConfig {
    /// Reject settings the scheduler and prober cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.scan_interval_secs == 0 {
            return Err(DiscoverError::Config(
                "[discover]: scan_interval_secs must be at least 1".to_string(),
            ));
        }
        if self.ping_concurrency == 0 {
            return Err(DiscoverError::Config(
                "[discover]: ping_concurrency must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.scan_interval_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn ping_timeout(&self) -> Duration {
        Duration::from_millis(self.ping_timeout_ms)
    }

    pub fn subnet_timeout(&self) -> Duration {
        Duration::from_secs(self.subnet_timeout_secs)
    }
}

/// Which inventory backend the daemon persists to.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Memory,
    Neo4j,
}

/// Storage configuration, from the `[store]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,

    #[serde(default = "default_neo4j_uri")]
    pub uri: String,

    #[serde(default = "default_neo4j_user")]
    pub user: String,

    #[serde(default = "default_neo4j_password")]
    pub password: String,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl StoreConfig {
    pub fn graph_config(&self) -> GraphConfig {
        GraphConfig {
            uri: self.uri.clone(),
            user: self.user.clone(),
            password: self.password.clone(),
            max_connections: self.max_connections,
            ..Default::default()
        }
    }
}

fn default_scan_interval() -> u64 {
    300
}

fn default_probe_timeout() -> u64 {
    3
}

fn default_ping_timeout_ms() -> u64 {
    1000
}

fn default_ping_concurrency() -> usize {
    50
}

fn default_subnet_timeout() -> u64 {
    120
}

fn default_max_hosts() -> usize {
    4096
}

fn default_fallback_subnet() -> String {
    "192.168.1.0/24".to_string()
}

fn default_true() -> bool {
    true
}

fn default_neo4j_uri() -> String {
    "bolt://localhost:7687".to_string()
}

fn default_neo4j_user() -> String {
    "neo4j".to_string()
}

fn default_neo4j_password() -> String {
    "lanwatch-dev".to_string()
}

fn default_max_connections() -> u32 {
    16
}

impl Default for DiscoverConfig {
    fn default() -> Self {
        Self {
            scan_interval_secs: default_scan_interval(),
            probe_timeout_secs: default_probe_timeout(),
            ping_timeout_ms: default_ping_timeout_ms(),
            ping_concurrency: default_ping_concurrency(),
            subnet_timeout_secs: default_subnet_timeout(),
            max_hosts_per_subnet: default_max_hosts(),
            subnets: Vec::new(),
            fallback_subnet: default_fallback_subnet(),
            resolve_hostnames: default_true(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            uri: default_neo4j_uri(),
            user: default_neo4j_user(),
            password: default_neo4j_password(),
            max_connections: default_max_connections(),
        }
    }
}

fn build(file_prefix: &str) -> Result<config::Config> {
    config::Config::builder()
        .add_source(config::File::with_name(file_prefix).required(false))
        .add_source(
            config::Environment::with_prefix("LANWATCH")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("discover.subnets")
                .try_parsing(true),
        )
        .build()
        .map_err(|e| DiscoverError::Config(e.to_string()))
}

fn section<T>(cfg: &config::Config, key: &str) -> Result<T>
where
    T: for<'de> Deserialize<'de> + Default,
{
    match cfg.get::<T>(key) {
        Ok(c) => Ok(c),
        Err(config::ConfigError::NotFound(_)) => Ok(T::default()),
        Err(e) => Err(DiscoverError::Config(format!("[{key}]: {e}"))),
    }
}

/// Load `[discover]` and `[store]` from `<file_prefix>.{toml,yaml,json}`
/// overlaid by `LANWATCH__*` environment variables.
pub fn load(file_prefix: &str) -> Result<(DiscoverConfig, StoreConfig)> {
    let cfg = build(file_prefix)?;
    let discover: DiscoverConfig = section(&cfg, "discover")?;
    discover.validate()?;
    Ok((discover, section(&cfg, "store")?))
}
