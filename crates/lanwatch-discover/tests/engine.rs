//! End-to-end scan tests against the in-memory store with a scripted prober.

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use ipnet::Ipv4Net;
use lanwatch_core::{
    Device, DeviceAnnotation, DeviceCounts, DeviceStatus, EventPayload, HistoryPoint, MacAddress,
    NewScanRecord, ScanMethod, ScanRecord, ScanStatus, Sighting,
};
use lanwatch_discover::{
    DiscoverError, DiscoveryEngine, EventBroadcaster, HostProbe, ScanScheduler, SubnetDetector,
    SubnetScan, Subscription,
};
use lanwatch_store::memory::MemoryTxn;
use lanwatch_store::{InventoryStore, InventoryTxn, MemoryStore, StoreError};
use tokio::sync::Notify;

// ── Scripted prober ───────────────────────────────────────────────

#[derive(Clone)]
enum Script {
    Found(Vec<Sighting>, ScanMethod),
    Fail,
    Hang,
    /// Announce entry on the prober's `entered`, then wait for `release`.
    Gated(Vec<Sighting>),
}

#[derive(Default)]
struct ScriptedProber {
    scripts: Mutex<HashMap<Ipv4Net, Script>>,
    calls: AtomicUsize,
    entered: Notify,
    release: Notify,
}

impl ScriptedProber {
    fn set(&self, subnet: &str, script: Script) {
        self.scripts.lock().unwrap().insert(net(subnet), script);
    }
}

impl HostProbe for ScriptedProber {
    async fn scan_network(
        &self,
        subnet: Ipv4Net,
        _timeout: Duration,
    ) -> lanwatch_discover::Result<SubnetScan> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let script = self
            .scripts
            .lock()
            .unwrap()
            .get(&subnet)
            .cloned()
            .unwrap_or(Script::Found(Vec::new(), ScanMethod::Arp));

        let (sightings, method) = match script {
            Script::Found(sightings, method) => (sightings, method),
            Script::Fail => {
                return Err(DiscoverError::Probe {
                    cidr: subnet.to_string(),
                    reason: "scripted failure".to_string(),
                })
            }
            Script::Hang => std::future::pending().await,
            Script::Gated(sightings) => {
                self.entered.notify_one();
                self.release.notified().await;
                (sightings, ScanMethod::Arp)
            }
        };
        Ok(SubnetScan {
            subnet,
            sightings,
            method,
        })
    }
}

// ── Store that fails mid-transaction ──────────────────────────────

#[derive(Clone, Default)]
struct FailingStore {
    inner: MemoryStore,
}

struct FailingTxn(MemoryTxn);

impl InventoryTxn for FailingTxn {
    async fn load_devices(&mut self) -> lanwatch_store::error::Result<Vec<Device>> {
        self.0.load_devices().await
    }

    async fn upsert_device(&mut self, device: &Device) -> lanwatch_store::error::Result<()> {
        self.0.upsert_device(device).await
    }

    async fn insert_scan_record(
        &mut self,
        record: &NewScanRecord,
    ) -> lanwatch_store::error::Result<i64> {
        self.0.insert_scan_record(record).await
    }

    async fn insert_history_point(
        &mut self,
        _point: &HistoryPoint,
    ) -> lanwatch_store::error::Result<()> {
        Err(StoreError::Aborted("disk full".to_string()))
    }

    async fn device_counts(&mut self) -> lanwatch_store::error::Result<DeviceCounts> {
        self.0.device_counts().await
    }

    async fn commit(self) -> lanwatch_store::error::Result<()> {
        self.0.commit().await
    }

    async fn rollback(self) -> lanwatch_store::error::Result<()> {
        self.0.rollback().await
    }
}

impl InventoryStore for FailingStore {
    type Txn = FailingTxn;

    async fn begin(&self) -> lanwatch_store::error::Result<FailingTxn> {
        Ok(FailingTxn(self.inner.begin().await?))
    }

    async fn list_devices(
        &self,
        status: Option<DeviceStatus>,
    ) -> lanwatch_store::error::Result<Vec<Device>> {
        self.inner.list_devices(status).await
    }

    async fn find_device_by_ip(
        &self,
        ip: Ipv4Addr,
    ) -> lanwatch_store::error::Result<Option<Device>> {
        self.inner.find_device_by_ip(ip).await
    }

    async fn find_device(&self, mac: &MacAddress) -> lanwatch_store::error::Result<Option<Device>> {
        self.inner.find_device(mac).await
    }

    async fn device_counts(&self) -> lanwatch_store::error::Result<DeviceCounts> {
        self.inner.device_counts().await
    }

    async fn annotate_device(
        &self,
        mac: &MacAddress,
        annotation: &DeviceAnnotation,
    ) -> lanwatch_store::error::Result<Device> {
        self.inner.annotate_device(mac, annotation).await
    }

    async fn recent_scans(&self, limit: usize) -> lanwatch_store::error::Result<Vec<ScanRecord>> {
        self.inner.recent_scans(limit).await
    }

    async fn last_completed_scan_at(
        &self,
    ) -> lanwatch_store::error::Result<Option<DateTime<Utc>>> {
        self.inner.last_completed_scan_at().await
    }

    async fn recent_history(
        &self,
        limit: usize,
    ) -> lanwatch_store::error::Result<Vec<HistoryPoint>> {
        self.inner.recent_history(limit).await
    }
}

// ── Helpers ───────────────────────────────────────────────────────

const LAN: &str = "192.168.1.0/24";

fn net(cidr: &str) -> Ipv4Net {
    cidr.parse().unwrap()
}

fn mac(tag: u8) -> MacAddress {
    MacAddress::new([tag, tag, 0, 0, 0, 1])
}

fn host(last_octet: u8, mac_tag: u8) -> Sighting {
    Sighting::new(Ipv4Addr::new(192, 168, 1, last_octet), Some(mac(mac_tag)))
}

fn engine_for<S: InventoryStore>(
    store: S,
    prober: Arc<ScriptedProber>,
    subnets: &[&str],
) -> Arc<DiscoveryEngine<S, ScriptedProber>> {
    let detector = SubnetDetector::new(subnets.iter().map(|s| net(s)).collect(), net(LAN));
    Arc::new(
        DiscoveryEngine::new(
            Arc::new(store),
            prober,
            detector,
            Arc::new(EventBroadcaster::new()),
        )
        .with_timeouts(Duration::from_millis(10), Duration::from_millis(200)),
    )
}

fn drain(sub: &mut Subscription) -> Vec<&'static str> {
    let mut names = Vec::new();
    while let Some(event) = sub.try_recv() {
        names.push(event.name());
    }
    names
}

// ── Scenarios ─────────────────────────────────────────────────────

#[tokio::test]
async fn scenario_a_first_scan_inserts_devices() {
    let store = MemoryStore::new();
    let prober = Arc::new(ScriptedProber::default());
    prober.set(LAN, Script::Found(vec![host(10, 0xaa), host(20, 0xbb)], ScanMethod::Arp));
    let engine = engine_for(store.clone(), prober, &[LAN]);

    let summary = engine.run_scan().await.unwrap();
    assert_eq!(summary.total_devices, 2);
    assert_eq!(summary.new_devices, 2);
    assert_eq!(summary.offline_devices, 0);
    assert_eq!(summary.subnets, vec![LAN.to_string()]);

    let devices = store.list_devices(None).await.unwrap();
    assert_eq!(devices.len(), 2);
    assert!(devices.iter().all(|d| d.status == DeviceStatus::Online));

    let scans = store.recent_scans(10).await.unwrap();
    assert_eq!(scans.len(), 1);
    let record = &scans[0].record;
    assert_eq!(
        (record.device_count, record.new_devices, record.offline_devices),
        (2, 2, 0)
    );
    assert_eq!(record.status, ScanStatus::Completed);
    assert_eq!(record.method, ScanMethod::Arp);
}

#[tokio::test]
async fn scenario_b_absent_device_goes_offline() {
    let store = MemoryStore::new();
    let prober = Arc::new(ScriptedProber::default());
    prober.set(LAN, Script::Found(vec![host(10, 0xaa), host(20, 0xbb)], ScanMethod::Arp));
    let engine = engine_for(store.clone(), Arc::clone(&prober), &[LAN]);
    engine.run_scan().await.unwrap();

    prober.set(LAN, Script::Found(vec![host(10, 0xaa)], ScanMethod::Arp));
    let summary = engine.run_scan().await.unwrap();
    assert_eq!(
        (summary.total_devices, summary.new_devices, summary.offline_devices),
        (1, 0, 1)
    );

    let gone = store.find_device(&mac(0xbb)).await.unwrap().unwrap();
    assert_eq!(gone.status, DeviceStatus::Offline);

    let history = engine.history(1).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(
        (history[0].online_count, history[0].offline_count, history[0].total_count),
        (1, 1, 2)
    );
    assert_eq!(history[0].scan_id, summary.scan_id);
}

#[tokio::test]
async fn scenario_c_ping_fallback_is_recorded() {
    let store = MemoryStore::new();
    let prober = Arc::new(ScriptedProber::default());
    prober.set(LAN, Script::Found(vec![host(10, 0xaa)], ScanMethod::Ping));
    prober.set("10.0.0.0/24", Script::Found(Vec::new(), ScanMethod::Arp));
    let engine = engine_for(store.clone(), prober, &[LAN, "10.0.0.0/24"]);

    let summary = engine.run_scan().await.unwrap();
    assert_eq!(summary.method, ScanMethod::Ping);
    assert_eq!(summary.subnet_methods.len(), 2);
    assert_eq!(summary.subnet_methods[0].cidr, LAN);
    assert_eq!(summary.subnet_methods[0].method, ScanMethod::Ping);
    assert_eq!(summary.subnet_methods[1].method, ScanMethod::Arp);

    let scans = store.recent_scans(1).await.unwrap();
    assert_eq!(scans[0].record.method, ScanMethod::Ping);
    assert_eq!(scans[0].record.status, ScanStatus::Completed);
}

#[tokio::test]
async fn scenario_d_empty_scan_flips_everything_offline() {
    let store = MemoryStore::new();
    let seen_at = Utc::now();
    store
        .seed_devices((1..=3).map(|i| {
            Device::discovered(mac(i), Ipv4Addr::new(192, 168, 1, i), None, None, seen_at)
        }))
        .await;
    let prober = Arc::new(ScriptedProber::default());
    prober.set(LAN, Script::Found(Vec::new(), ScanMethod::Arp));
    let engine = engine_for(store.clone(), prober, &[LAN]);

    let summary = engine.run_scan().await.unwrap();
    assert_eq!(summary.total_devices, 0);
    assert_eq!(summary.offline_devices, 3);

    let offline = store.list_devices(Some(DeviceStatus::Offline)).await.unwrap();
    assert_eq!(offline.len(), 3);
    assert!(offline.iter().all(|d| d.last_seen == seen_at));
}

// ── Policies ──────────────────────────────────────────────────────

#[tokio::test]
async fn unknown_mac_counted_but_not_persisted() {
    let store = MemoryStore::new();
    let prober = Arc::new(ScriptedProber::default());
    let unresolved = Sighting::new(Ipv4Addr::new(192, 168, 1, 77), None);
    prober.set(LAN, Script::Found(vec![host(10, 0xaa), unresolved], ScanMethod::Ping));
    let engine = engine_for(store.clone(), prober, &[LAN]);

    let summary = engine.run_scan().await.unwrap();
    assert_eq!(summary.total_devices, 2);
    assert_eq!(summary.new_devices, 1);
    assert_eq!(store.list_devices(None).await.unwrap().len(), 1);
    assert!(matches!(
        engine.get_device(Ipv4Addr::new(192, 168, 1, 77)).await,
        Err(DiscoverError::DeviceNotFound(_))
    ));
}

#[tokio::test]
async fn failing_and_hanging_subnets_are_excluded() {
    let store = MemoryStore::new();
    let prober = Arc::new(ScriptedProber::default());
    prober.set(LAN, Script::Found(vec![host(10, 0xaa)], ScanMethod::Arp));
    prober.set("10.0.0.0/24", Script::Fail);
    prober.set("10.0.1.0/24", Script::Hang);
    let engine = engine_for(
        store.clone(),
        Arc::clone(&prober),
        &[LAN, "10.0.0.0/24", "10.0.1.0/24"],
    );

    let summary = engine.run_scan().await.unwrap();
    assert_eq!(prober.calls.load(Ordering::SeqCst), 3);
    assert_eq!(summary.total_devices, 1);
    assert_eq!(summary.subnet_methods.len(), 1);
    // The record still lists every subnet that was attempted.
    assert_eq!(summary.subnets.len(), 3);
    assert_eq!(store.recent_scans(1).await.unwrap()[0].record.status, ScanStatus::Completed);
}

#[tokio::test]
async fn single_flight_rejects_overlapping_trigger() {
    let store = MemoryStore::new();
    let prober = Arc::new(ScriptedProber::default());
    prober.set(LAN, Script::Gated(vec![host(10, 0xaa)]));
    let engine = engine_for(store.clone(), Arc::clone(&prober), &[LAN]);

    let first = tokio::spawn({
        let engine = Arc::clone(&engine);
        async move { engine.run_scan().await }
    });

    prober.entered.notified().await;
    assert!(engine.is_scanning());
    assert!(matches!(
        engine.run_scan().await,
        Err(DiscoverError::AlreadyRunning)
    ));

    prober.release.notify_one();
    first.await.unwrap().unwrap();
    assert!(!engine.is_scanning());
    assert_eq!(store.scan_count().await, 1);
    assert_eq!(prober.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn status_checks_never_block_a_trigger() {
    let store = MemoryStore::new();
    let prober = Arc::new(ScriptedProber::default());
    prober.set(LAN, Script::Found(vec![host(10, 0xaa)], ScanMethod::Arp));
    let engine = engine_for(store.clone(), prober, &[LAN]);

    let watcher = tokio::spawn({
        let engine = Arc::clone(&engine);
        async move {
            for _ in 0..20_000 {
                std::hint::black_box(engine.is_scanning());
            }
        }
    });

    for _ in 0..50 {
        engine.run_scan().await.unwrap();
    }
    watcher.await.unwrap();
    assert_eq!(store.scan_count().await, 50);
    assert!(!engine.is_scanning());
}

#[tokio::test]
async fn storage_failure_rolls_back_and_records_failure() {
    let store = FailingStore::default();
    let prober = Arc::new(ScriptedProber::default());
    prober.set(LAN, Script::Found(vec![host(10, 0xaa), host(20, 0xbb)], ScanMethod::Arp));
    let engine = engine_for(store.clone(), prober, &[LAN]);
    let mut sub = engine.events().subscribe();

    let err = engine.run_scan().await.unwrap_err();
    assert!(matches!(err, DiscoverError::Store(StoreError::Aborted(_))));

    assert!(store.list_devices(None).await.unwrap().is_empty());
    assert!(store.recent_history(10).await.unwrap().is_empty());

    let scans = store.recent_scans(10).await.unwrap();
    assert_eq!(scans.len(), 1);
    assert_eq!(scans[0].record.status, ScanStatus::Failed);
    assert!(scans[0]
        .record
        .error_message
        .as_deref()
        .unwrap()
        .contains("disk full"));
    assert_eq!(scans[0].record.new_devices, 0);

    // No device events for state that was never committed.
    assert_eq!(drain(&mut sub), vec!["scan_started", "scan_failed"]);
    assert_eq!(engine.summary().await.unwrap().last_scan_at, None);
}

// ── Events ────────────────────────────────────────────────────────

#[tokio::test]
async fn events_follow_scan_lifecycle() {
    let store = MemoryStore::new();
    let prober = Arc::new(ScriptedProber::default());
    prober.set(LAN, Script::Found(vec![host(10, 0xaa), host(20, 0xbb)], ScanMethod::Arp));
    let engine = engine_for(store, Arc::clone(&prober), &[LAN]);
    let mut sub = engine.events().subscribe();

    engine.run_scan().await.unwrap();
    assert_eq!(
        drain(&mut sub),
        vec!["scan_started", "device_new", "device_new", "scan_complete"]
    );

    prober.set(LAN, Script::Found(vec![host(10, 0xaa)], ScanMethod::Arp));
    engine.run_scan().await.unwrap();

    let mut payloads = Vec::new();
    while let Some(event) = sub.try_recv() {
        payloads.push(event.payload.clone());
    }
    assert_eq!(payloads.len(), 3);
    assert_eq!(
        payloads[1],
        EventPayload::DeviceOffline {
            ip_address: Ipv4Addr::new(192, 168, 1, 20),
            mac_address: mac(0xbb),
        }
    );
    match &payloads[2] {
        EventPayload::ScanComplete {
            total_devices,
            new_devices,
            offline_devices,
            subnets,
            ..
        } => {
            assert_eq!((*total_devices, *new_devices, *offline_devices), (1, 0, 1));
            assert_eq!(subnets, &vec![LAN.to_string()]);
        }
        other => panic!("expected scan_complete, got {other:?}"),
    }
}

#[tokio::test]
async fn large_scan_delivers_every_event_to_unread_subscriber() {
    let store = MemoryStore::new();
    let prober = Arc::new(ScriptedProber::default());
    let crowd: Vec<Sighting> = (0..600u32)
        .map(|i| {
            let ip = Ipv4Addr::from(u32::from(Ipv4Addr::new(10, 0, 0, 1)) + i);
            let mac = MacAddress::new([0x02, 0, 0, 0, (i >> 8) as u8, i as u8]);
            Sighting::new(ip, Some(mac))
        })
        .collect();
    prober.set("10.0.0.0/22", Script::Found(crowd, ScanMethod::Ping));
    let engine = engine_for(store, prober, &["10.0.0.0/22"]);
    let mut sub = engine.events().subscribe();

    let summary = engine.run_scan().await.unwrap();
    assert_eq!(summary.new_devices, 600);
    assert_eq!(engine.events().subscriber_count(), 1);

    let names = drain(&mut sub);
    assert_eq!(names.len(), 602);
    assert_eq!(names.first(), Some(&"scan_started"));
    assert_eq!(names.last(), Some(&"scan_complete"));
    assert_eq!(names.iter().filter(|n| **n == "device_new").count(), 600);
}

// ── Queries ───────────────────────────────────────────────────────

#[tokio::test]
async fn queries_reflect_committed_scans() {
    let store = MemoryStore::new();
    let prober = Arc::new(ScriptedProber::default());
    let mut named = host(20, 0xbb);
    named.hostname = Some("printer.lan".to_string());
    prober.set(LAN, Script::Found(vec![named, host(10, 0xaa)], ScanMethod::Arp));
    let engine = engine_for(store, Arc::clone(&prober), &[LAN]);

    for _ in 0..3 {
        engine.run_scan().await.unwrap();
    }

    let devices = engine.list_devices(None).await.unwrap();
    assert_eq!(devices[0].ip_address, Ipv4Addr::new(192, 168, 1, 10));
    assert_eq!(devices[1].ip_address, Ipv4Addr::new(192, 168, 1, 20));

    let printer = engine.get_device(Ipv4Addr::new(192, 168, 1, 20)).await.unwrap();
    assert_eq!(printer.hostname.as_deref(), Some("printer.lan"));

    let summary = engine.summary().await.unwrap();
    assert_eq!(
        (summary.total_devices, summary.online_devices, summary.offline_devices),
        (2, 2, 0)
    );
    assert!(summary.last_scan_at.is_some());
    assert_eq!(summary.subnets, vec![LAN.to_string()]);
    assert_eq!(engine.subnets().await, vec![LAN.to_string()]);

    let history = engine.history(2).await.unwrap();
    assert_eq!(history.len(), 2);
    assert!(history[0].scan_id < history[1].scan_id);
    assert!(history.iter().all(|h| h.total_count == h.online_count + h.offline_count));

    let scans = engine.list_scans(0).await.unwrap();
    assert_eq!(scans.len(), 1);
    assert_eq!(scans[0].id, 3);
    assert_eq!(engine.list_scans(1000).await.unwrap().len(), 3);
}

#[tokio::test]
async fn annotate_device_sets_labels_only() {
    let store = MemoryStore::new();
    let prober = Arc::new(ScriptedProber::default());
    prober.set(LAN, Script::Found(vec![host(10, 0xaa)], ScanMethod::Arp));
    let engine = engine_for(store, Arc::clone(&prober), &[LAN]);
    engine.run_scan().await.unwrap();

    let annotation = DeviceAnnotation {
        custom_name: Some("Office NAS".to_string()),
        device_type: Some("nas".to_string()),
        notes: None,
    };
    let device = engine.annotate_device(&mac(0xaa), &annotation).await.unwrap();
    assert_eq!(device.custom_name.as_deref(), Some("Office NAS"));
    assert_eq!(device.status, DeviceStatus::Online);

    // A later scan keeps the labels.
    engine.run_scan().await.unwrap();
    let device = engine.get_device(Ipv4Addr::new(192, 168, 1, 10)).await.unwrap();
    assert_eq!(device.device_type, "nas");

    assert!(matches!(
        engine.annotate_device(&mac(0x42), &annotation).await,
        Err(DiscoverError::DeviceNotFound(_))
    ));
}

// ── Scheduler ─────────────────────────────────────────────────────

#[tokio::test]
async fn scheduler_runs_pauses_and_stops() {
    let store = MemoryStore::new();
    let prober = Arc::new(ScriptedProber::default());
    prober.set(LAN, Script::Found(vec![host(10, 0xaa)], ScanMethod::Arp));
    let engine = engine_for(store.clone(), prober, &[LAN]);

    let (scheduler, handle) = ScanScheduler::new(engine, Duration::from_millis(40));
    let task = tokio::spawn(scheduler.run());

    tokio::time::sleep(Duration::from_millis(150)).await;
    let running = store.scan_count().await;
    assert!(running >= 2, "expected repeated scans, got {running}");

    handle.pause();
    assert!(handle.is_paused());
    tokio::time::sleep(Duration::from_millis(20)).await;
    let paused_at = store.scan_count().await;
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(store.scan_count().await, paused_at);

    handle.resume();
    assert!(!handle.is_paused());
    tokio::time::sleep(Duration::from_millis(120)).await;
    assert!(store.scan_count().await > paused_at);

    handle.shutdown();
    tokio::time::timeout(Duration::from_secs(1), task)
        .await
        .expect("scheduler did not stop")
        .unwrap();

    // Stopped is terminal.
    handle.resume();
    assert!(!handle.is_paused());
}

#[tokio::test]
async fn scheduler_survives_zero_interval() {
    let store = MemoryStore::new();
    let prober = Arc::new(ScriptedProber::default());
    prober.set(LAN, Script::Found(vec![host(10, 0xaa)], ScanMethod::Arp));
    let engine = engine_for(store.clone(), prober, &[LAN]);

    let (scheduler, handle) = ScanScheduler::new(engine, Duration::ZERO);
    let task = tokio::spawn(scheduler.run());

    tokio::time::sleep(Duration::from_millis(200)).await;
    // First tick is immediate; the next is a full second away.
    assert_eq!(store.scan_count().await, 1);

    handle.shutdown();
    tokio::time::timeout(Duration::from_secs(1), task)
        .await
        .expect("scheduler did not stop")
        .unwrap();
}
