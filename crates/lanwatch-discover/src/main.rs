//! CLI entry point for the lanwatch-discover daemon.

use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

use lanwatch_store::{GraphStore, InventoryStore, MemoryStore};

use lanwatch_discover::config::{self, DiscoverConfig, StoreBackend};
use lanwatch_discover::probe::ProbeSettings;
use lanwatch_discover::queries::{DEFAULT_HISTORY_LIMIT, DEFAULT_SCAN_LIMIT};
use lanwatch_discover::{
    DiscoveryEngine, EventBroadcaster, NetworkProber, ScanScheduler, SubnetDetector,
};

#[derive(Parser)]
#[command(name = "lanwatch-discover")]
#[command(about = "LAN device discovery and inventory tracking")]
struct Cli {
    /// Run a single scan, print its summary as JSON, and exit.
    #[arg(long)]
    once: bool,

    /// Run scheduled scans and stream events as JSON lines.
    #[arg(long)]
    daemon: bool,

    /// Print the subnets that would be scanned and exit.
    #[arg(long)]
    subnets: bool,

    /// Print the device inventory and exit.
    #[arg(long)]
    devices: bool,

    /// Print recent history points (oldest first) and exit.
    #[arg(long, value_name = "LIMIT")]
    history: Option<Option<usize>>,

    /// Print recent scan records (newest first) and exit.
    #[arg(long, value_name = "LIMIT")]
    scans: Option<Option<usize>>,

    /// Config file prefix (default: lanwatch).
    #[arg(short, long, default_value = "lanwatch")]
    config: String,

    /// Override the scan interval in seconds.
    #[arg(short, long)]
    interval: Option<u64>,

    /// Scan this subnet instead of auto-detecting (repeatable).
    #[arg(short, long = "subnet")]
    subnet: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .json()
        .init();

    let cli = Cli::parse();
    let (mut discover_config, store_config) = config::load(&cli.config)?;
    if let Some(secs) = cli.interval {
        discover_config.scan_interval_secs = secs;
    }
    if !cli.subnet.is_empty() {
        discover_config.subnets = cli.subnet.clone();
    }
    discover_config.validate()?;

    let inspecting = cli.subnets || cli.devices || cli.history.is_some() || cli.scans.is_some();
    if !(cli.once || cli.daemon || inspecting) {
        anyhow::bail!("Specify --once, --daemon, or one of --subnets/--devices/--history/--scans");
    }

    match store_config.backend {
        StoreBackend::Memory => {
            tracing::info!("Using in-memory inventory");
            run(&cli, discover_config, MemoryStore::new()).await
        }
        StoreBackend::Neo4j => {
            let store = GraphStore::connect(&store_config.graph_config()).await?;
            tracing::info!(uri = %store_config.uri, "Connected to Neo4j");
            run(&cli, discover_config, store).await
        }
    }
}

async fn run<S: InventoryStore>(cli: &Cli, config: DiscoverConfig, store: S) -> anyhow::Result<()> {
    let detector = SubnetDetector::from_config(&config)?;
    let prober = NetworkProber::new(ProbeSettings::from_config(&config));
    let events = Arc::new(EventBroadcaster::new());
    let engine = Arc::new(
        DiscoveryEngine::new(Arc::new(store), Arc::new(prober), detector, events)
            .with_timeouts(config.probe_timeout(), config.subnet_timeout()),
    );

    if cli.subnets {
        println!("{}", serde_json::to_string_pretty(&engine.subnets().await)?);
    } else if cli.devices {
        println!("{}", serde_json::to_string_pretty(&engine.list_devices(None).await?)?);
    } else if let Some(limit) = cli.history {
        println!("{}", serde_json::to_string_pretty(&engine.history(limit.unwrap_or(DEFAULT_HISTORY_LIMIT)).await?)?);
    } else if let Some(limit) = cli.scans {
        println!("{}", serde_json::to_string_pretty(&engine.list_scans(limit.unwrap_or(DEFAULT_SCAN_LIMIT)).await?)?);
    } else if cli.once {
        let summary = engine.run_scan().await?;
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        run_daemon(engine, config).await?;
    }
    Ok(())
}

async fn run_daemon<S: InventoryStore>(
    engine: Arc<DiscoveryEngine<S, NetworkProber>>,
    config: DiscoverConfig,
) -> anyhow::Result<()> {
    let mut subscription = engine.events().subscribe();
    let (scheduler, handle) = ScanScheduler::new(Arc::clone(&engine), config.scan_interval());
    let scheduler_task = tokio::spawn(scheduler.run());

    loop {
        tokio::select! {
            event = subscription.recv() => match event {
                Some(event) => println!("{}", event.to_json()?),
                None => {
                    tracing::warn!("Event stream closed, resubscribing");
                    subscription = engine.events().subscribe();
                }
            },
            signal = tokio::signal::ctrl_c() => {
                signal?;
                tracing::info!("Shutdown requested");
                break;
            }
        }
    }

    handle.shutdown();
    scheduler_task.await?;
    Ok(())
}
