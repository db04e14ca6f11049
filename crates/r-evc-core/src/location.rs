//! ---
//! evc_section: "01-core-functionality"
//! evc_subsection: "module"
//! evc_type: "source"
//! evc_scope: "code"
//! evc_description: "Per-vehicle coordination and fleet lifecycle management."
//! evc_version: "v0.0.0-prealpha"
//! evc_owner: "tbd"
//! ---
//! GPS polling with an interval that follows the vehicle's power state.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use indexmap::IndexMap;
use r_evc_client::{ApiSession, CallError, LocationFix, ResourceKind};
use r_evc_common::config::AppConfig;
use r_evc_logging::{evc_debug, evc_info, evc_warn, LogContext};
use r_evc_metrics::CoordinatorMetrics;
use tokio::time::Instant;

use crate::cache::{CacheUpdate, VehicleCache};
use crate::error::CoordinatorError;
use crate::polling::{Coordinator, CycleReport, PollingState, PowerStateSource};
use crate::value_guard::guard_location;

const NAME: &str = "location";

#[derive(Debug, Clone)]
pub struct LocationSettings {
    /// Interval used when smart polling is off.
    pub interval: Duration,
    pub smart_polling: bool,
    pub active_interval: Duration,
    pub inactive_interval: Duration,
}

impl Default for LocationSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(300),
            smart_polling: false,
            active_interval: Duration::from_secs(30),
            inactive_interval: Duration::from_secs(600),
        }
    }
}

impl LocationSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            interval: config.polling.location_interval,
            smart_polling: config.polling.smart_polling,
            active_interval: config.polling.active_interval,
            inactive_interval: config.polling.inactive_interval,
        }
    }

    fn next_interval(&self, powered_on: bool) -> Duration {
        match (self.smart_polling, powered_on) {
            (false, _) => self.interval,
            (true, true) => self.active_interval,
            (true, false) => self.inactive_interval,
        }
    }
}

pub struct LocationCoordinator {
    vin: String,
    session: Arc<ApiSession>,
    cache: Arc<VehicleCache>,
    power: Arc<dyn PowerStateSource>,
    settings: LocationSettings,
    polling: PollingState,
    cycle: tokio::sync::Mutex<u64>,
    metrics: Option<CoordinatorMetrics>,
}

impl std::fmt::Debug for LocationCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocationCoordinator")
            .field("vin", &r_evc_logging::redact_vin(&self.vin))
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl LocationCoordinator {
    pub fn new(
        session: Arc<ApiSession>,
        cache: Arc<VehicleCache>,
        power: Arc<dyn PowerStateSource>,
        settings: LocationSettings,
    ) -> Self {
        let initial = settings.next_interval(power.is_vehicle_powered_on());
        Self {
            vin: cache.vin().to_owned(),
            session,
            cache,
            power,
            polling: PollingState::new(initial),
            settings,
            cycle: tokio::sync::Mutex::new(0),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Option<CoordinatorMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn vin(&self) -> &str {
        &self.vin
    }

    pub fn polling(&self) -> &PollingState {
        &self.polling
    }

    pub fn current_interval(&self) -> Duration {
        self.polling.current_interval()
    }

    pub async fn refresh(&self, force: bool) -> Result<CycleReport, CoordinatorError> {
        let mut counter = self.cycle.lock().await;
        *counter += 1;
        let cycle = *counter;
        let pending_force = self.polling.take_force();
        let forced = force || pending_force;
        let ctx = LogContext::new()
            .with_vin(&self.vin)
            .with_coordinator(NAME)
            .with_cycle(cycle);

        if !forced && !self.polling.is_enabled() {
            evc_debug!(context = ctx, "polling disabled; serving cached state");
            self.record_cycle("skipped");
            return Ok(CycleReport::skipped(NAME, cycle, self.cache.snapshot()));
        }

        let started = Instant::now();
        let mut failures = IndexMap::new();
        match self.call_location().await {
            Ok(fix) => self.merge_fix(fix, &ctx),
            Err(CallError::AuthRequired(reason)) => {
                evc_warn!(context = ctx, "location fetch requires re-authentication");
                self.record_cycle("auth_required");
                return Err(CoordinatorError::AuthRequired(reason));
            }
            Err(err) => {
                if self.cache.location().is_none() {
                    evc_warn!(context = ctx, "location cycle failed without cached fix: {}", err);
                    self.record_cycle("failed");
                    return Err(CoordinatorError::Unavailable {
                        resource: ResourceKind::Location,
                        message: err.to_string(),
                    });
                }
                evc_warn!(context = ctx, "location fetch failed; keeping cached fix: {}", err);
                if let Some(metrics) = &self.metrics {
                    metrics.record_partial_failure(r_evc_logging::redact_vin(&self.vin), NAME);
                }
                failures.insert(ResourceKind::Location, err.to_string());
            }
        }

        self.adjust_interval(&ctx);
        self.record_cycle(if failures.is_empty() { "ok" } else { "degraded" });
        if let Some(metrics) = &self.metrics {
            metrics.observe_cycle_duration(NAME, started.elapsed().as_secs_f64());
        }

        Ok(CycleReport {
            coordinator: NAME,
            cycle,
            forced,
            skipped: false,
            snapshot: self.cache.snapshot(),
            partial_failures: failures,
            guard_rejected: false,
            material_digest: None,
            material_changed: false,
        })
    }

    /// Fetch and merge a fix outside the regular cycle.
    pub async fn fetch_location(&self) -> Result<Option<LocationFix>, CoordinatorError> {
        let _cycle = self.cycle.lock().await;
        let ctx = LogContext::new().with_vin(&self.vin).with_coordinator(NAME);
        let fix = self
            .call_location()
            .await
            .map_err(|err| CoordinatorError::from_call(ResourceKind::Location, err))?;
        self.merge_fix(fix, &ctx);
        Ok(self.cache.location())
    }

    fn merge_fix(&self, fix: LocationFix, ctx: &LogContext<'_>) {
        let previous = self.cache.location();
        match guard_location(previous.as_ref(), fix) {
            Some(accepted) => {
                self.cache.merge(CacheUpdate::default().location(accepted));
            }
            None => {
                evc_debug!(context = ctx, "implausible fix discarded; keeping previous location");
            }
        }
    }

    fn adjust_interval(&self, ctx: &LogContext<'_>) {
        let next = self
            .settings
            .next_interval(self.power.is_vehicle_powered_on());
        let previous = self.polling.set_interval(next);
        if previous != next {
            evc_info!(
                context = ctx,
                "location interval changed from {:?} to {:?}",
                previous,
                next
            );
        }
        if let Some(metrics) = &self.metrics {
            metrics.set_location_interval(r_evc_logging::redact_vin(&self.vin), next.as_secs());
        }
    }

    fn record_cycle(&self, outcome: &str) {
        if let Some(metrics) = &self.metrics {
            metrics.record_cycle(r_evc_logging::redact_vin(&self.vin), NAME, outcome);
        }
    }

    async fn call_location(&self) -> Result<LocationFix, CallError> {
        self.session
            .call_vin("location", &self.vin, |api, vin| async move {
                api.get_location(&vin).await
            })
            .await
    }
}

#[async_trait]
impl Coordinator for LocationCoordinator {
    fn name(&self) -> &'static str {
        NAME
    }

    fn vin(&self) -> &str {
        &self.vin
    }

    fn polling(&self) -> &PollingState {
        &self.polling
    }

    async fn refresh(&self, force: bool) -> Result<CycleReport, CoordinatorError> {
        LocationCoordinator::refresh(self, force).await
    }
}
