//! ---
//! evc_section: "01-core-functionality"
//! evc_subsection: "module"
//! evc_type: "source"
//! evc_scope: "code"
//! evc_description: "Per-vehicle coordination and fleet lifecycle management."
//! evc_version: "v0.0.0-prealpha"
//! evc_owner: "tbd"
//! ---
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use indexmap::IndexMap;
use r_evc_client::{ApiSession, PushReceiver, VehicleIdentity};
use r_evc_common::config::AppConfig;
use r_evc_logging::redact_vin;
use r_evc_metrics::CoordinatorMetrics;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::VehicleSnapshot;
use crate::polling::{spawn_schedule, Coordinator};
use crate::push::PushIngestion;
use crate::registry::{CoordinatorRegistry, VehicleCoordinators};

/// Fleet entrypoint: discovers vehicles and starts their coordinators.
#[derive(Debug)]
pub struct FleetOrchestrator {
    config: Arc<AppConfig>,
    session: Arc<ApiSession>,
    push: Option<PushReceiver>,
    metrics: Option<CoordinatorMetrics>,
}

impl FleetOrchestrator {
    pub fn new(
        config: AppConfig,
        session: Arc<ApiSession>,
        push: Option<PushReceiver>,
        metrics: Option<CoordinatorMetrics>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            session,
            push,
            metrics,
        }
    }

    /// Register every tracked vehicle, run its first refresh and spawn the
    /// scheduling loops. Any first-refresh failure aborts the start.
    pub async fn start(self) -> Result<FleetHandle> {
        let identities = self
            .session
            .call("vehicles", |api| async move { api.get_vehicles().await })
            .await
            .context("failed to list vehicles on the account")?;
        let discovered = identities.len();
        let tracked: Vec<VehicleIdentity> = identities
            .into_iter()
            .filter(|identity| self.config.tracks_vehicle(&identity.vin))
            .collect();
        if tracked.is_empty() {
            bail!(
                "no vehicles to coordinate ({} discovered, {} allowlisted)",
                discovered,
                self.config.vehicles.len()
            );
        }

        let registry = Arc::new(CoordinatorRegistry::new());
        for identity in tracked {
            let vin = identity.vin.clone();
            let vehicle = Arc::new(VehicleCoordinators::build(
                identity,
                self.session.clone(),
                &self.config,
                self.metrics.clone(),
            ));
            vehicle
                .telemetry
                .refresh(true)
                .await
                .with_context(|| format!("initial telemetry refresh failed for {}", redact_vin(&vin)))?;
            vehicle
                .location
                .refresh(true)
                .await
                .with_context(|| format!("initial location refresh failed for {}", redact_vin(&vin)))?;
            if registry.register(vehicle).is_some() {
                warn!(vin = redact_vin(&vin), "duplicate vehicle in account listing replaced");
            }
        }

        let (shutdown_tx, _) = broadcast::channel(16);
        let mut tasks = Vec::new();
        for vehicle in registry.all() {
            let telemetry: Arc<dyn Coordinator> = vehicle.telemetry.clone();
            let location: Arc<dyn Coordinator> = vehicle.location.clone();
            tasks.push(spawn_schedule(telemetry, shutdown_tx.subscribe()));
            tasks.push(spawn_schedule(location, shutdown_tx.subscribe()));
        }
        if let Some(events) = self.push {
            let ingestion = PushIngestion::new(registry.clone(), self.metrics.clone());
            tasks.push(ingestion.spawn(events, shutdown_tx.subscribe()));
        }

        if let Some(metrics) = &self.metrics {
            metrics.set_vehicle_count(registry.len());
        }
        info!(
            vehicles = registry.len(),
            discovered,
            mode = ?self.config.mode,
            "fleet orchestrator started"
        );

        Ok(FleetHandle {
            shutdown: shutdown_tx,
            tasks,
            registry,
            session: self.session,
            config: self.config,
        })
    }
}

/// Running fleet; dropped tasks keep running until [`FleetHandle::shutdown`].
#[derive(Debug)]
pub struct FleetHandle {
    shutdown: broadcast::Sender<()>,
    tasks: Vec<JoinHandle<()>>,
    registry: Arc<CoordinatorRegistry>,
    session: Arc<ApiSession>,
    config: Arc<AppConfig>,
}

impl FleetHandle {
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn registry(&self) -> Arc<CoordinatorRegistry> {
        self.registry.clone()
    }

    pub fn vehicle(&self, vin: &str) -> Option<Arc<VehicleCoordinators>> {
        self.registry.get(vin)
    }

    pub fn vins(&self) -> Vec<String> {
        self.registry.vins()
    }

    /// Read-only view of every vehicle's cache, keyed by VIN.
    pub fn snapshot(&self) -> IndexMap<String, VehicleSnapshot> {
        self.registry
            .all()
            .into_iter()
            .map(|vehicle| (vehicle.vin().to_owned(), vehicle.snapshot()))
            .collect()
    }

    /// Toggle polling for one vehicle; `false` when the VIN is unknown.
    pub fn set_polling_enabled(&self, vin: &str, enabled: bool) -> bool {
        match self.registry.get(vin) {
            Some(vehicle) => {
                vehicle.set_polling_enabled(enabled);
                info!(vin = redact_vin(vin), enabled, "polling toggled");
                true
            }
            None => false,
        }
    }

    pub async fn shutdown(self) -> Result<()> {
        let _ = self.shutdown.send(());
        for task in self.tasks {
            if let Err(err) = task.await {
                if !err.is_cancelled() {
                    return Err(err).context("coordinator task panicked");
                }
            }
        }
        for vehicle in self.registry.all() {
            vehicle.dispatcher.shutdown();
        }
        self.session.shutdown().await;
        debug!(vehicles = self.registry.len(), "coordinators torn down");
        info!("fleet orchestrator shutdown complete");
        Ok(())
    }
}
