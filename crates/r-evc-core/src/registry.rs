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

use indexmap::IndexMap;
use parking_lot::RwLock;
use r_evc_client::{ApiSession, VehicleIdentity};
use r_evc_common::config::AppConfig;
use r_evc_metrics::CoordinatorMetrics;
use tokio::sync::watch;

use crate::cache::{VehicleCache, VehicleSnapshot};
use crate::dispatcher::{CommandDispatcher, DispatchSettings};
use crate::error::CoordinatorError;
use crate::location::{LocationCoordinator, LocationSettings};
use crate::polling::PowerStateSource;
use crate::telemetry::{TelemetryCoordinator, TelemetrySettings};

/// Everything that runs for one vehicle.
#[derive(Debug)]
pub struct VehicleCoordinators {
    pub cache: Arc<VehicleCache>,
    pub telemetry: Arc<TelemetryCoordinator>,
    pub location: Arc<LocationCoordinator>,
    pub dispatcher: Arc<CommandDispatcher>,
}

impl VehicleCoordinators {
    pub fn build(
        identity: VehicleIdentity,
        session: Arc<ApiSession>,
        config: &AppConfig,
        metrics: Option<CoordinatorMetrics>,
    ) -> Self {
        Self::with_settings(
            identity,
            session,
            TelemetrySettings::from_config(config),
            LocationSettings::from_config(config),
            DispatchSettings::from_config(config),
            metrics,
        )
    }

    pub fn with_settings(
        identity: VehicleIdentity,
        session: Arc<ApiSession>,
        telemetry: TelemetrySettings,
        location: LocationSettings,
        dispatch: DispatchSettings,
        metrics: Option<CoordinatorMetrics>,
    ) -> Self {
        let cache = Arc::new(VehicleCache::new(identity));
        let telemetry = Arc::new(
            TelemetryCoordinator::new(session.clone(), cache.clone(), telemetry)
                .with_metrics(metrics.clone()),
        );
        let power: Arc<dyn PowerStateSource> = telemetry.clone();
        let location = Arc::new(
            LocationCoordinator::new(session.clone(), cache.clone(), power, location)
                .with_metrics(metrics.clone()),
        );
        let dispatcher = Arc::new(
            CommandDispatcher::new(session, telemetry.clone(), location.clone(), dispatch)
                .with_metrics(metrics),
        );
        Self {
            cache,
            telemetry,
            location,
            dispatcher,
        }
    }

    pub fn vin(&self) -> &str {
        self.cache.vin()
    }

    pub fn snapshot(&self) -> VehicleSnapshot {
        self.cache.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.cache.subscribe()
    }

    pub fn is_vehicle_powered_on(&self) -> bool {
        self.telemetry.is_vehicle_powered_on()
    }

    pub fn set_polling_enabled(&self, enabled: bool) {
        self.telemetry.polling().set_enabled(enabled);
        self.location.polling().set_enabled(enabled);
    }

    /// Wake both scheduling loops for a forced cycle without waiting for it.
    pub fn request_refresh(&self) {
        self.telemetry.polling().request_force();
        self.location.polling().request_force();
    }

    /// Run a forced telemetry and location cycle now.
    pub async fn force_refresh(&self) -> Result<(), CoordinatorError> {
        self.telemetry.refresh(true).await?;
        self.location.refresh(true).await?;
        Ok(())
    }
}

/// VIN-keyed lookup of live coordinators, shared explicitly with push ingestion.
#[derive(Debug, Default)]
pub struct CoordinatorRegistry {
    vehicles: RwLock<IndexMap<String, Arc<VehicleCoordinators>>>,
}

impl CoordinatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, coordinators: Arc<VehicleCoordinators>) -> Option<Arc<VehicleCoordinators>> {
        self.vehicles
            .write()
            .insert(coordinators.vin().to_owned(), coordinators)
    }

    pub fn remove(&self, vin: &str) -> Option<Arc<VehicleCoordinators>> {
        self.vehicles.write().shift_remove(vin)
    }

    pub fn get(&self, vin: &str) -> Option<Arc<VehicleCoordinators>> {
        self.vehicles.read().get(vin).cloned()
    }

    pub fn vins(&self) -> Vec<String> {
        self.vehicles.read().keys().cloned().collect()
    }

    pub fn all(&self) -> Vec<Arc<VehicleCoordinators>> {
        self.vehicles.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.vehicles.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.vehicles.read().is_empty()
    }
}
