//! Interval scheduling of scans.
//!
//! The first scan fires immediately, then every `interval`. A tick that
//! lands while a scan is still running is skipped, not queued. Pausing or
//! stopping never interrupts a scan already in flight.

use std::sync::Arc;
use std::time::Duration;

use lanwatch_store::InventoryStore;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};

use crate::engine::DiscoveryEngine;
use crate::error::DiscoverError;
use crate::probe::HostProbe;

const MIN_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Running,
    Paused,
    Stopped,
}

pub struct ScanScheduler<S, P> {
    engine: Arc<DiscoveryEngine<S, P>>,
    interval: Duration,
    state: watch::Receiver<State>,
}

/// Control handle for a running [`ScanScheduler`]. Dropping every handle
/// stops the scheduler.
#[derive(Clone)]
pub struct SchedulerHandle {
    state: Arc<watch::Sender<State>>,
}

impl SchedulerHandle {
    pub fn pause(&self) {
        self.transition(State::Paused);
    }

    pub fn resume(&self) {
        self.transition(State::Running);
    }

    pub fn shutdown(&self) {
        self.transition(State::Stopped);
    }

    pub fn is_paused(&self) -> bool {
        *self.state.borrow() == State::Paused
    }

    fn transition(&self, next: State) {
        self.state.send_if_modified(|current| {
            // Stopped is terminal.
            if *current == State::Stopped || *current == next {
                return false;
            }
            *current = next;
            true
        });
    }
}

impl<S: InventoryStore, P: HostProbe> ScanScheduler<S, P> {
    /// A zero `interval` is raised to one second.
    pub fn new(engine: Arc<DiscoveryEngine<S, P>>, interval: Duration) -> (Self, SchedulerHandle) {
        let interval = if interval.is_zero() {
            tracing::warn!("Zero scan interval, using {}s", MIN_INTERVAL.as_secs());
            MIN_INTERVAL
        } else {
            interval
        };
        let (tx, rx) = watch::channel(State::Running);
        let scheduler = Self {
            engine,
            interval,
            state: rx,
        };
        let handle = SchedulerHandle {
            state: Arc::new(tx),
        };
        (scheduler, handle)
    }

    /// Run until shut down.
    pub async fn run(mut self) {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tracing::info!(interval_secs = self.interval.as_secs(), "Scheduler started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let state = *self.state.borrow();
                    match state {
                        State::Running => self.tick().await,
                        State::Paused => tracing::debug!("Scheduler paused, tick skipped"),
                        State::Stopped => break,
                    }
                }
                changed = self.state.changed() => {
                    let state = *self.state.borrow();
                    if changed.is_err() || state == State::Stopped {
                        break;
                    }
                    tracing::info!(paused = state == State::Paused, "Scheduler state changed");
                }
            }
        }

        tracing::info!("Scheduler stopped");
    }

    async fn tick(&self) {
        match self.engine.run_scan().await {
            Ok(summary) => tracing::debug!(scan_id = summary.scan_id, "Scheduled scan finished"),
            Err(DiscoverError::AlreadyRunning) => {
                tracing::info!("Scheduled scan skipped, previous scan still running");
            }
            Err(e) => tracing::error!(error = %e, "Scheduled scan failed"),
        }
    }
}
