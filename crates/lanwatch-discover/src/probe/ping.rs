//! Bounded-concurrency ICMP echo sweep.
//!
//! Uses an in-process ICMP socket when the OS allows one, otherwise shells
//! out to the system `ping` binary once per host.

use std::net::{IpAddr, Ipv4Addr};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use surge_ping::{Client, Config, PingIdentifier, PingSequence};
use tokio::process::Command;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

const PAYLOAD: [u8; 56] = [0; 56];

#[derive(Clone)]
enum Echo {
    Socket(Arc<Client>),
    Command,
}

impl Echo {
    fn open() -> Self {
        match Client::new(&Config::default()) {
            Ok(client) => Self::Socket(Arc::new(client)),
            Err(e) => {
                tracing::debug!(error = %e, "ICMP socket unavailable, using system ping");
                Self::Command
            }
        }
    }

    async fn reply(&self, ip: Ipv4Addr, ident: u16, timeout: Duration) -> bool {
        match self {
            Self::Socket(client) => client
                .pinger(IpAddr::V4(ip), PingIdentifier(ident))
                .await
                .timeout(timeout)
                .ping(PingSequence(0), &PAYLOAD)
                .await
                .is_ok(),
            Self::Command => command_ping(ip, timeout).await,
        }
    }
}

/// Arguments for a single echo with `timeout`, per platform.
pub fn ping_args(ip: Ipv4Addr, timeout: Duration) -> Vec<String> {
    let ms = timeout.as_millis().max(1);
    if cfg!(target_os = "windows") {
        vec!["-n".into(), "1".into(), "-w".into(), ms.to_string(), ip.to_string()]
    } else if cfg!(target_os = "macos") {
        vec!["-c".into(), "1".into(), "-W".into(), ms.to_string(), ip.to_string()]
    } else {
        let secs = timeout.as_secs().max(1);
        vec!["-c".into(), "1".into(), "-W".into(), secs.to_string(), ip.to_string()]
    }
}

async fn command_ping(ip: Ipv4Addr, timeout: Duration) -> bool {
    let status = Command::new("ping")
        .args(ping_args(ip, timeout))
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .status();

    // The binary's own timeout is coarse on some platforms.
    match tokio::time::timeout(timeout + Duration::from_secs(1), status).await {
        Ok(Ok(status)) => status.success(),
        Ok(Err(e)) => {
            tracing::debug!(ip = %ip, error = %e, "ping command failed to start");
            false
        }
        Err(_) => false,
    }
}

/// Echo every host, at most `concurrency` at a time. Returns responders in
/// address order.
pub async fn sweep(hosts: Vec<Ipv4Addr>, timeout: Duration, concurrency: usize) -> Vec<Ipv4Addr> {
    if hosts.is_empty() {
        return Vec::new();
    }

    let echo = Echo::open();
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let base = std::process::id() as u16;
    let mut tasks = JoinSet::new();

    for (i, ip) in hosts.into_iter().enumerate() {
        let echo = echo.clone();
        let semaphore = Arc::clone(&semaphore);
        let ident = base.wrapping_add(i as u16);
        tasks.spawn(async move {
            let _permit = semaphore.acquire_owned().await.ok()?;
            echo.reply(ip, ident, timeout).await.then_some(ip)
        });
    }

    let mut alive = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Some(ip)) => alive.push(ip),
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, "Ping task failed"),
        }
    }
    alive.sort();
    alive
}
