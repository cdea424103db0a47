//! Scan orchestration.
//!
//! A scan is: detect subnets → probe each in parallel under a hard
//! timeout → reconcile, record, and snapshot in one transaction → publish.
//! Manual triggers and the scheduler share [`DiscoveryEngine::run_scan`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use ipnet::Ipv4Net;
use lanwatch_core::{
    EventPayload, NewScanRecord, ScanMethod, ScanStatus, ScanSummary, Sighting, SubnetMethod,
};
use lanwatch_store::{InventoryStore, InventoryTxn};
use tokio::sync::Mutex;
use tokio::task::JoinSet;

use crate::broadcast::EventBroadcaster;
use crate::config::DiscoverConfig;
use crate::error::{DiscoverError, Result};
use crate::history::{record_history_point, record_scan};
use crate::probe::{HostProbe, SubnetScan};
use crate::reconcile::{reconcile, ReconcilePlan};
use crate::subnet::{to_strings, SubnetDetector};

/// Wires the detector, prober, store, and broadcaster together.
pub struct DiscoveryEngine<S, P> {
    pub(crate) store: Arc<S>,
    prober: Arc<P>,
    pub(crate) detector: SubnetDetector,
    events: Arc<EventBroadcaster>,
    probe_timeout: Duration,
    subnet_timeout: Duration,
    /// Held for the whole of `run_scan`.
    scan_lock: Mutex<()>,
    /// Mirrors `scan_lock` so status checks never contend for it.
    scanning: AtomicBool,
}

/// Clears the scanning flag when a scan ends, however it ends.
struct ScanningFlag<'a>(&'a AtomicBool);

impl<'a> ScanningFlag<'a> {
    fn raise(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::Release);
        Self(flag)
    }
}

impl Drop for ScanningFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl<S: InventoryStore, P: HostProbe> DiscoveryEngine<S, P> {
    pub fn new(
        store: Arc<S>,
        prober: Arc<P>,
        detector: SubnetDetector,
        events: Arc<EventBroadcaster>,
    ) -> Self {
        let defaults = DiscoverConfig::default();
        Self {
            store,
            prober,
            detector,
            events,
            probe_timeout: defaults.probe_timeout(),
            subnet_timeout: defaults.subnet_timeout(),
            scan_lock: Mutex::new(()),
            scanning: AtomicBool::new(false),
        }
    }

    /// `probe` is handed to the prober; `subnet` is the hard limit per subnet.
    pub fn with_timeouts(mut self, probe: Duration, subnet: Duration) -> Self {
        self.probe_timeout = probe;
        self.subnet_timeout = subnet;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn events(&self) -> &Arc<EventBroadcaster> {
        &self.events
    }

    pub fn is_scanning(&self) -> bool {
        self.scanning.load(Ordering::Acquire)
    }

    /// Run one full scan. Fails fast with [`DiscoverError::AlreadyRunning`]
    /// if another scan holds the engine.
    pub async fn run_scan(&self) -> Result<ScanSummary> {
        let _guard = self.scan_lock.try_lock().map_err(|_| {
            tracing::info!("Scan trigger rejected, a scan is already running");
            DiscoverError::AlreadyRunning
        })?;
        let _scanning = ScanningFlag::raise(&self.scanning);

        let started_at = Utc::now();
        let clock = Instant::now();
        self.events.publish(EventPayload::ScanStarted {});

        let subnets = self.detector.detect().await;
        tracing::info!(subnets = ?to_strings(&subnets), "Scan started");

        let scans = self.probe_all(&subnets).await;
        let sightings: Vec<Sighting> = scans
            .iter()
            .flat_map(|s| s.sightings.iter().cloned())
            .collect();
        let subnet_methods: Vec<SubnetMethod> = scans
            .iter()
            .map(|s| SubnetMethod {
                cidr: s.subnet.to_string(),
                method: s.method,
            })
            .collect();
        let method = scans
            .iter()
            .fold(ScanMethod::Arp, |acc, s| acc.combine(s.method));
        let duration_ms = clock.elapsed().as_millis() as u64;

        let mut record = NewScanRecord {
            subnets: to_strings(&subnets),
            device_count: sightings.len() as u32,
            new_devices: 0,
            offline_devices: 0,
            method,
            duration_ms,
            status: ScanStatus::Completed,
            error_message: None,
            started_at,
            completed_at: None,
        };

        let now = Utc::now();
        let (scan_id, plan) = match self.commit_scan(&sightings, &mut record, now).await {
            Ok(committed) => committed,
            Err(e) => {
                self.record_failure(record, &e).await;
                return Err(e);
            }
        };

        for event in plan.events() {
            self.events.publish(event);
        }
        self.events.publish(EventPayload::ScanComplete {
            total_devices: record.device_count,
            new_devices: record.new_devices,
            offline_devices: record.offline_devices,
            scan_duration_ms: duration_ms,
            subnets: record.subnets.clone(),
        });

        tracing::info!(
            scan_id,
            total = record.device_count,
            new = record.new_devices,
            offline = record.offline_devices,
            method = %method,
            duration_ms,
            "Scan complete"
        );

        Ok(ScanSummary {
            scan_id,
            total_devices: record.device_count,
            new_devices: record.new_devices,
            offline_devices: record.offline_devices,
            duration_ms,
            subnets: record.subnets,
            method,
            subnet_methods,
        })
    }

    /// Probe every subnet concurrently. Failed or timed-out subnets are
    /// logged and left out; the rest keep detection order.
    async fn probe_all(&self, subnets: &[Ipv4Net]) -> Vec<SubnetScan> {
        let mut tasks = JoinSet::new();
        for (idx, subnet) in subnets.iter().copied().enumerate() {
            let prober = Arc::clone(&self.prober);
            let probe_timeout = self.probe_timeout;
            let limit = self.subnet_timeout;
            tasks.spawn(async move {
                let result =
                    match tokio::time::timeout(limit, prober.scan_network(subnet, probe_timeout))
                        .await
                    {
                        Ok(result) => result,
                        Err(_) => Err(DiscoverError::Timeout {
                            cidr: subnet.to_string(),
                            secs: limit.as_secs(),
                        }),
                    };
                (idx, subnet, result)
            });
        }

        let mut slots: Vec<Option<SubnetScan>> = vec![None; subnets.len()];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((idx, _, Ok(scan))) => slots[idx] = Some(scan),
                Ok((_, subnet, Err(e))) => {
                    tracing::error!(cidr = %subnet, error = %e, "Subnet probe failed, excluded from scan");
                }
                Err(e) => tracing::error!(error = %e, "Subnet probe task panicked"),
            }
        }
        slots.into_iter().flatten().collect()
    }

    async fn commit_scan(
        &self,
        sightings: &[Sighting],
        record: &mut NewScanRecord,
        now: DateTime<Utc>,
    ) -> Result<(i64, ReconcilePlan)> {
        let mut txn = self.store.begin().await?;
        match write_scan(&mut txn, sightings, record, now).await {
            Ok(written) => {
                txn.commit().await?;
                Ok(written)
            }
            Err(e) => {
                if let Err(rb) = txn.rollback().await {
                    tracing::warn!(error = %rb, "Rollback after failed scan also failed");
                }
                Err(e)
            }
        }
    }

    /// Persist a failed record on its own, then tell subscribers.
    async fn record_failure(&self, mut record: NewScanRecord, error: &DiscoverError) {
        tracing::error!(error = %error, "Scan failed, inventory unchanged");

        record.status = ScanStatus::Failed;
        record.error_message = Some(error.to_string());
        record.new_devices = 0;
        record.offline_devices = 0;
        record.completed_at = Some(Utc::now());

        let written = async {
            let mut txn = self.store.begin().await?;
            let id = record_scan(&mut txn, &record).await?;
            txn.commit().await?;
            Ok::<_, DiscoverError>(id)
        }
        .await;
        if let Err(e) = written {
            tracing::error!(error = %e, "Failed scan record could not be written");
        }

        self.events.publish(EventPayload::ScanFailed {
            error: error.to_string(),
        });
    }
}

async fn write_scan<T: InventoryTxn>(
    txn: &mut T,
    sightings: &[Sighting],
    record: &mut NewScanRecord,
    now: DateTime<Utc>,
) -> Result<(i64, ReconcilePlan)> {
    let plan = reconcile(txn, sightings, now).await?;
    record.new_devices = plan.new_count();
    record.offline_devices = plan.offline_count();
    record.completed_at = Some(now);

    let scan_id = record_scan(txn, record).await?;
    record_history_point(txn, scan_id, now).await?;
    Ok((scan_id, plan))
}
