//! ---
//! evc_section: "01-core-functionality"
//! evc_subsection: "module"
//! evc_type: "source"
//! evc_scope: "code"
//! evc_description: "Per-vehicle coordination and fleet lifecycle management."
//! evc_version: "v0.0.0-prealpha"
//! evc_owner: "tbd"
//! ---
//! Scheduling state shared by the coordinators and their loops.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use indexmap::IndexMap;
use parking_lot::Mutex;
use r_evc_client::ResourceKind;
use tokio::sync::{broadcast, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::cache::VehicleSnapshot;
use crate::error::CoordinatorError;

/// Per-coordinator polling controls.
#[derive(Debug)]
pub struct PollingState {
    enabled: AtomicBool,
    force_next: AtomicBool,
    interval: Mutex<Duration>,
    wake: Notify,
}

impl PollingState {
    pub fn new(interval: Duration) -> Self {
        Self {
            enabled: AtomicBool::new(true),
            force_next: AtomicBool::new(false),
            interval: Mutex::new(interval),
            wake: Notify::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Enable or disable scheduled polling. Wakes the loop so the change applies now.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
        self.wake.notify_one();
    }

    /// Ask the scheduling loop to run a forced cycle as soon as possible.
    pub fn request_force(&self) {
        self.force_next.store(true, Ordering::SeqCst);
        self.wake.notify_one();
    }

    /// Consume a pending force request.
    pub fn take_force(&self) -> bool {
        self.force_next.swap(false, Ordering::SeqCst)
    }

    pub fn current_interval(&self) -> Duration {
        *self.interval.lock()
    }

    /// Set the interval used for the next scheduled sleep.
    pub fn set_interval(&self, interval: Duration) -> Duration {
        std::mem::replace(&mut *self.interval.lock(), interval)
    }

    pub(crate) async fn woken(&self) {
        self.wake.notified().await;
    }
}

/// Outcome of one coordinator cycle.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub coordinator: &'static str,
    pub cycle: u64,
    pub forced: bool,
    /// Polling was disabled and nothing was fetched.
    pub skipped: bool,
    /// Effective view after the cycle. Climate is only carried while the
    /// vehicle is on unless it was freshly fetched.
    pub snapshot: VehicleSnapshot,
    pub partial_failures: IndexMap<ResourceKind, String>,
    /// A fetched value was discarded by an armed guard.
    pub guard_rejected: bool,
    pub material_digest: Option<String>,
    pub material_changed: bool,
}

impl CycleReport {
    pub(crate) fn skipped(coordinator: &'static str, cycle: u64, snapshot: VehicleSnapshot) -> Self {
        Self {
            coordinator,
            cycle,
            forced: false,
            skipped: true,
            snapshot,
            partial_failures: IndexMap::new(),
            guard_rejected: false,
            material_digest: None,
            material_changed: false,
        }
    }

    pub fn is_degraded(&self) -> bool {
        !self.partial_failures.is_empty()
    }
}

/// Read-only derived power state, as consumed by the location scheduler.
pub trait PowerStateSource: Send + Sync {
    fn is_vehicle_powered_on(&self) -> bool;
}

/// A periodically refreshed per-vehicle coordinator.
#[async_trait]
pub trait Coordinator: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    fn vin(&self) -> &str;

    fn polling(&self) -> &PollingState;

    /// Run one single-flight cycle. Honors and consumes a pending force request.
    async fn refresh(&self, force: bool) -> Result<CycleReport, CoordinatorError>;
}

/// Spawn the scheduling loop for `coordinator`.
///
/// The loop sleeps for the current interval, or waits only for a wake-up
/// while polling is disabled, and exits on the shutdown broadcast.
pub fn spawn_schedule(
    coordinator: Arc<dyn Coordinator>,
    mut shutdown: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let vehicle = r_evc_logging::redact_vin(coordinator.vin()).to_owned();
        loop {
            let polling = coordinator.polling();
            let interval = polling.current_interval();
            let enabled = polling.is_enabled();
            tokio::select! {
                biased;
                _ = shutdown.recv() => {
                    debug!(vin = %vehicle, coordinator = coordinator.name(), "scheduler shutdown signal received");
                    break;
                }
                _ = polling.woken() => {}
                _ = tokio::time::sleep(interval), if enabled => {}
            }

            match coordinator.refresh(false).await {
                Ok(_) => {}
                Err(CoordinatorError::AuthRequired(reason)) => {
                    warn!(vin = %vehicle, coordinator = coordinator.name(), reason = %reason, "re-authentication required; scheduled polling continues");
                }
                Err(err) => {
                    warn!(vin = %vehicle, coordinator = coordinator.name(), error = %err, "scheduled refresh failed");
                }
            }
        }
    })
}
