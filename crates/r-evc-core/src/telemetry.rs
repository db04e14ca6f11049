//! ---
//! evc_section: "01-core-functionality"
//! evc_subsection: "module"
//! evc_type: "source"
//! evc_scope: "code"
//! evc_description: "Per-vehicle coordination and fleet lifecycle management."
//! evc_version: "v0.0.0-prealpha"
//! evc_owner: "tbd"
//! ---
//! Realtime, climate, energy and charging polling for one vehicle.
//!
//! Realtime is the mandatory resource: a cycle fails only when it can be
//! obtained neither from the network nor from the cache. Climate is fetched
//! only when the vehicle is on, when nothing was ever cached, or when the
//! cycle is forced, and every fetched climate value passes the HVAC guard.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use indexmap::IndexMap;
use parking_lot::Mutex;
use r_evc_client::{
    ApiSession, CallError, ChargingState, ClimateState, ClimateStatus, EnergyState,
    RealtimeState, ResourceKind, SeatClimateParams, SeatHeatVentState, SwitchState,
};
use r_evc_common::config::AppConfig;
use r_evc_common::time::duration_to_millis;
use r_evc_logging::{evc_debug, evc_info, evc_warn, LogContext};
use r_evc_metrics::CoordinatorMetrics;
use tokio::time::Instant;

use crate::cache::{CacheUpdate, VehicleCache};
use crate::error::CoordinatorError;
use crate::guard::Guard;
use crate::materiality;
use crate::polling::{Coordinator, CycleReport, PollingState, PowerStateSource};

const NAME: &str = "telemetry";

#[derive(Debug, Clone)]
pub struct TelemetrySettings {
    pub interval: Duration,
    pub fetch_energy: bool,
    pub fetch_charging: bool,
    /// How long an optimistic HVAC power value suppresses contradicting reads.
    pub climate_guard_ttl: Duration,
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(300),
            fetch_energy: true,
            fetch_charging: true,
            climate_guard_ttl: Duration::from_secs(60),
        }
    }
}

impl TelemetrySettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            interval: config.polling.telemetry_interval,
            fetch_energy: config.telemetry.fetch_energy,
            fetch_charging: config.telemetry.fetch_charging,
            climate_guard_ttl: config.commands.climate_guard_ttl,
        }
    }
}

/// Speculative climate change written into the cache ahead of confirmation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClimatePatch {
    pub power: Option<bool>,
    pub temperature: Option<f64>,
    pub seats: Option<SeatClimateParams>,
}

impl ClimatePatch {
    pub fn power(on: bool) -> Self {
        Self {
            power: Some(on),
            ..Self::default()
        }
    }

    pub fn seats(params: SeatClimateParams) -> Self {
        Self {
            seats: Some(params),
            ..Self::default()
        }
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Apply to `climate`. Switching HVAC off also drops every active seat
    /// and steering-wheel function back to off.
    pub fn apply(&self, climate: &mut ClimateState) {
        if let Some(on) = self.power {
            climate.status = Some(if on {
                ClimateStatus::On
            } else {
                ClimateStatus::Off
            });
            if !on {
                reset_comfort(climate);
            }
        }
        if let Some(temperature) = self.temperature {
            climate.main_setting_temp = Some(temperature);
        }
        if let Some(seats) = &self.seats {
            let slots = [
                (&mut climate.main_seat_heat_state, seats.main_heat),
                (&mut climate.main_seat_ventilation_state, seats.main_ventilation),
                (&mut climate.copilot_seat_heat_state, seats.copilot_heat),
                (&mut climate.copilot_seat_ventilation_state, seats.copilot_ventilation),
                (&mut climate.lr_seat_heat_state, seats.lr_heat),
                (&mut climate.lr_seat_ventilation_state, seats.lr_ventilation),
                (&mut climate.rr_seat_heat_state, seats.rr_heat),
                (&mut climate.rr_seat_ventilation_state, seats.rr_ventilation),
            ];
            for (slot, requested) in slots {
                if let Some(level) = requested {
                    *slot = Some(level);
                }
            }
            if let Some(state) = seats.steering_wheel_heat {
                climate.steering_wheel_heat_state = Some(state);
            }
        }
    }
}

fn reset_comfort(climate: &mut ClimateState) {
    for slot in climate.seat_states_mut() {
        if slot.is_some_and(SeatHeatVentState::is_active) {
            *slot = Some(SeatHeatVentState::Off);
        }
    }
    if climate.steering_wheel_heat_state == Some(SwitchState::On) {
        climate.steering_wheel_heat_state = Some(SwitchState::Off);
    }
}

pub struct TelemetryCoordinator {
    vin: String,
    session: Arc<ApiSession>,
    cache: Arc<VehicleCache>,
    settings: TelemetrySettings,
    polling: PollingState,
    climate_guard: Guard<bool>,
    /// Held for a whole cycle; the value is the cycle counter.
    cycle: tokio::sync::Mutex<u64>,
    unsupported: Mutex<HashSet<ResourceKind>>,
    last_digest: Mutex<Option<String>>,
    metrics: Option<CoordinatorMetrics>,
}

impl std::fmt::Debug for TelemetryCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelemetryCoordinator")
            .field("vin", &r_evc_logging::redact_vin(&self.vin))
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl TelemetryCoordinator {
    pub fn new(session: Arc<ApiSession>, cache: Arc<VehicleCache>, settings: TelemetrySettings) -> Self {
        Self {
            vin: cache.vin().to_owned(),
            session,
            polling: PollingState::new(settings.interval),
            cache,
            settings,
            climate_guard: Guard::new(),
            cycle: tokio::sync::Mutex::new(0),
            unsupported: Mutex::new(HashSet::new()),
            last_digest: Mutex::new(None),
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

    pub fn cache(&self) -> &Arc<VehicleCache> {
        &self.cache
    }

    pub fn polling(&self) -> &PollingState {
        &self.polling
    }

    pub fn climate_guard(&self) -> &Guard<bool> {
        &self.climate_guard
    }

    /// Whether `kind` was switched off after the cloud reported it unsupported.
    pub fn is_unsupported(&self, kind: ResourceKind) -> bool {
        self.unsupported.lock().contains(&kind)
    }

    /// Derived power state from the cached realtime; `false` without one.
    pub fn is_vehicle_powered_on(&self) -> bool {
        self.cache.read(|snapshot| snapshot.is_vehicle_on())
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
        let cached = self.cache.snapshot();
        let mut failures = IndexMap::new();

        let fresh_realtime = match self.call_realtime().await {
            Ok(realtime) => Some(realtime),
            Err(err) => {
                self.absorb(ResourceKind::Realtime, err, &mut failures, &ctx)?;
                None
            }
        };

        let powered_on = fresh_realtime
            .as_ref()
            .or(cached.realtime.as_ref())
            .map(RealtimeState::is_vehicle_on)
            .unwrap_or(false);
        let fetch_climate = cached.climate.is_none() || forced || powered_on;

        let fresh_climate = if fetch_climate {
            match self.call_climate().await {
                Ok(climate) => Some(climate),
                Err(err) => {
                    self.absorb(ResourceKind::Climate, err, &mut failures, &ctx)?;
                    None
                }
            }
        } else {
            evc_debug!(context = ctx, "vehicle off; climate fetch suppressed");
            None
        };

        let fresh_energy = if self.wants(ResourceKind::Energy) {
            match self.call_energy().await {
                Ok(energy) => Some(energy),
                Err(err) => {
                    self.absorb(ResourceKind::Energy, err, &mut failures, &ctx)?;
                    None
                }
            }
        } else {
            None
        };

        let fresh_charging = if self.wants(ResourceKind::Charging) {
            match self.call_charging().await {
                Ok(charging) => Some(charging),
                Err(err) => {
                    self.absorb(ResourceKind::Charging, err, &mut failures, &ctx)?;
                    None
                }
            }
        } else {
            None
        };

        if fresh_realtime.is_none() && cached.realtime.is_none() {
            let message = failures
                .get(&ResourceKind::Realtime)
                .cloned()
                .unwrap_or_else(|| "no realtime data".to_owned());
            evc_warn!(context = ctx, "telemetry cycle failed: {}", message);
            self.record_cycle("failed");
            return Err(CoordinatorError::Unavailable {
                resource: ResourceKind::Realtime,
                message,
            });
        }

        // The guard is consulted at merge time: a command may have armed it
        // while this cycle was still waiting on energy or charging.
        let fetched_power = fresh_climate.as_ref().map(ClimateState::is_ac_on);
        let (_, climate_kept) = self.cache.merge_checked(
            CacheUpdate {
                realtime: fresh_realtime,
                climate: fresh_climate,
                location: None,
                energy: fresh_energy,
                charging: fresh_charging,
            },
            |climate| self.climate_guard.accepts(&climate.is_ac_on()),
        );
        let guard_rejected = !climate_kept;
        if let (Some(power), true) = (fetched_power, guard_rejected) {
            self.note_guard_rejection(power, &ctx);
        }
        let climate_fetched = fetched_power.is_some() && climate_kept;

        let mut snapshot = self.cache.snapshot();
        let digest = materiality::digest(&materiality::snapshot(&snapshot));
        let material_changed = {
            let mut last = self.last_digest.lock();
            let changed = *last != digest;
            *last = digest.clone();
            changed
        };
        if !climate_fetched && !powered_on {
            snapshot.climate = None;
        }

        if failures.is_empty() {
            evc_debug!(
                context = ctx,
                "telemetry cycle complete in {:.1} ms (forced: {}, material change: {})",
                duration_to_millis(started.elapsed()),
                forced,
                material_changed
            );
            self.record_cycle("ok");
        } else {
            evc_warn!(
                context = ctx,
                "telemetry cycle degraded to cached data: {}",
                describe_failures(&failures)
            );
            self.record_cycle("degraded");
        }
        if let Some(metrics) = &self.metrics {
            metrics.observe_cycle_duration(NAME, started.elapsed().as_secs_f64());
        }

        Ok(CycleReport {
            coordinator: NAME,
            cycle,
            forced,
            skipped: false,
            snapshot,
            partial_failures: failures,
            guard_rejected,
            material_digest: digest,
            material_changed,
        })
    }

    /// Fetch and merge realtime outside the regular cycle.
    pub async fn fetch_realtime(&self) -> Result<RealtimeState, CoordinatorError> {
        let _cycle = self.cycle.lock().await;
        let realtime = self
            .call_realtime()
            .await
            .map_err(|err| CoordinatorError::from_call(ResourceKind::Realtime, err))?;
        self.cache
            .merge(CacheUpdate::default().realtime(realtime.clone()));
        Ok(realtime)
    }

    /// Fetch climate outside the regular cycle. `Ok(None)` when the guard discarded it.
    pub async fn fetch_climate(&self) -> Result<Option<ClimateState>, CoordinatorError> {
        let _cycle = self.cycle.lock().await;
        let ctx = LogContext::new().with_vin(&self.vin).with_coordinator(NAME);
        let climate = self
            .call_climate()
            .await
            .map_err(|err| CoordinatorError::from_call(ResourceKind::Climate, err))?;
        let power = climate.is_ac_on();
        let (_, kept) = self
            .cache
            .merge_checked(CacheUpdate::default().climate(climate.clone()), |candidate| {
                self.climate_guard.accepts(&candidate.is_ac_on())
            });
        if !kept {
            self.note_guard_rejection(power, &ctx);
            return Ok(None);
        }
        Ok(Some(climate))
    }

    /// Merge realtime delivered by push, bypassing the poll cycle.
    pub fn merge_pushed_realtime(&self, realtime: RealtimeState) {
        let revision = self.cache.merge(CacheUpdate::default().realtime(realtime));
        let ctx = LogContext::new().with_vin(&self.vin).with_coordinator(NAME);
        evc_debug!(context = ctx, "merged pushed realtime (revision {})", revision);
    }

    /// Write `patch` into the cached climate and arm the HVAC guard when it
    /// sets power. Returns `false` and does nothing without cached climate.
    pub fn apply_optimistic_climate(&self, patch: &ClimatePatch) -> bool {
        let ctx = LogContext::new().with_vin(&self.vin).with_coordinator(NAME);
        let ttl = self.settings.climate_guard_ttl;
        // Armed under the cache write lock so an in-flight cycle sees either
        // both the patch and the guard or neither.
        let patched = self.cache.patch_climate(|climate| {
            patch.apply(climate);
            if let Some(on) = patch.power {
                self.climate_guard.arm(on, ttl);
            }
        });
        if !patched {
            evc_debug!(context = ctx, "no cached climate; optimistic patch skipped");
            return false;
        }
        if let Some(on) = patch.power {
            evc_info!(
                context = ctx,
                "optimistic climate power={} applied; guard armed for {:?}",
                on,
                self.settings.climate_guard_ttl
            );
        }
        true
    }

    fn note_guard_rejection(&self, power: bool, ctx: &LogContext<'_>) {
        evc_info!(
            context = ctx,
            "discarding fetched climate power={} contradicting armed guard",
            power
        );
        if let Some(metrics) = &self.metrics {
            metrics.record_guard_rejection(r_evc_logging::redact_vin(&self.vin), "climate_power");
        }
    }

    fn wants(&self, kind: ResourceKind) -> bool {
        let enabled = match kind {
            ResourceKind::Energy => self.settings.fetch_energy,
            ResourceKind::Charging => self.settings.fetch_charging,
            _ => true,
        };
        enabled && !self.is_unsupported(kind)
    }

    /// Record a recoverable per-resource failure, or abort the cycle on auth failures.
    fn absorb(
        &self,
        kind: ResourceKind,
        err: CallError,
        failures: &mut IndexMap<ResourceKind, String>,
        ctx: &LogContext<'_>,
    ) -> Result<(), CoordinatorError> {
        if let CallError::AuthRequired(reason) = err {
            evc_warn!(context = ctx, "{} fetch requires re-authentication", kind);
            self.record_cycle("auth_required");
            return Err(CoordinatorError::AuthRequired(reason));
        }
        if err.is_unsupported() && matches!(kind, ResourceKind::Energy | ResourceKind::Charging) {
            evc_info!(context = ctx, "{} endpoint unsupported; no longer requested", kind);
            self.unsupported.lock().insert(kind);
        }
        if let Some(metrics) = &self.metrics {
            metrics.record_partial_failure(r_evc_logging::redact_vin(&self.vin), kind.as_str());
        }
        failures.insert(kind, err.to_string());
        Ok(())
    }

    fn record_cycle(&self, outcome: &str) {
        if let Some(metrics) = &self.metrics {
            metrics.record_cycle(r_evc_logging::redact_vin(&self.vin), NAME, outcome);
        }
    }

    async fn call_realtime(&self) -> Result<RealtimeState, CallError> {
        self.session
            .call_vin("realtime", &self.vin, |api, vin| async move {
                api.get_realtime(&vin).await
            })
            .await
    }

    async fn call_climate(&self) -> Result<ClimateState, CallError> {
        self.session
            .call_vin("climate", &self.vin, |api, vin| async move {
                api.get_climate_status(&vin).await
            })
            .await
    }

    async fn call_energy(&self) -> Result<EnergyState, CallError> {
        self.session
            .call_vin("energy", &self.vin, |api, vin| async move {
                api.get_energy(&vin).await
            })
            .await
    }

    async fn call_charging(&self) -> Result<ChargingState, CallError> {
        self.session
            .call_vin("charging", &self.vin, |api, vin| async move {
                api.get_charging_status(&vin).await
            })
            .await
    }
}

fn describe_failures(failures: &IndexMap<ResourceKind, String>) -> String {
    failures
        .iter()
        .map(|(kind, message)| format!("{kind}: {message}"))
        .collect::<Vec<_>>()
        .join("; ")
}

impl PowerStateSource for TelemetryCoordinator {
    fn is_vehicle_powered_on(&self) -> bool {
        TelemetryCoordinator::is_vehicle_powered_on(self)
    }
}

#[async_trait]
impl Coordinator for TelemetryCoordinator {
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
        TelemetryCoordinator::refresh(self, force).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn heated_climate() -> ClimateState {
        ClimateState {
            status: Some(ClimateStatus::On),
            main_setting_temp: Some(22.0),
            main_seat_heat_state: Some(SeatHeatVentState::High),
            copilot_seat_ventilation_state: Some(SeatHeatVentState::Low),
            lr_seat_heat_state: Some(SeatHeatVentState::Unavailable),
            rr_seat_heat_state: Some(SeatHeatVentState::Off),
            steering_wheel_heat_state: Some(SwitchState::On),
            ..ClimateState::default()
        }
    }

    #[test]
    fn stop_patch_resets_active_comfort_functions() {
        let mut climate = heated_climate();
        ClimatePatch::power(false).apply(&mut climate);
        assert!(!climate.is_ac_on());
        assert_eq!(climate.main_seat_heat_state, Some(SeatHeatVentState::Off));
        assert_eq!(climate.copilot_seat_ventilation_state, Some(SeatHeatVentState::Off));
        assert_eq!(climate.lr_seat_heat_state, Some(SeatHeatVentState::Unavailable));
        assert_eq!(climate.rr_seat_heat_state, Some(SeatHeatVentState::Off));
        assert_eq!(climate.main_seat_ventilation_state, None);
        assert_eq!(climate.steering_wheel_heat_state, Some(SwitchState::Off));
        assert_eq!(climate.main_setting_temp, Some(22.0));
    }

    #[test]
    fn start_patch_sets_power_and_temperature() {
        let mut climate = ClimateState::default();
        ClimatePatch::power(true)
            .with_temperature(23.5)
            .apply(&mut climate);
        assert!(climate.is_ac_on());
        assert_eq!(climate.main_setting_temp, Some(23.5));
    }

    #[test]
    fn seat_patch_only_touches_requested_slots() {
        let mut climate = heated_climate();
        ClimatePatch::seats(SeatClimateParams {
            main_heat: Some(SeatHeatVentState::Low),
            steering_wheel_heat: Some(SwitchState::Off),
            ..SeatClimateParams::default()
        })
        .apply(&mut climate);
        assert_eq!(climate.main_seat_heat_state, Some(SeatHeatVentState::Low));
        assert_eq!(climate.copilot_seat_ventilation_state, Some(SeatHeatVentState::Low));
        assert_eq!(climate.steering_wheel_heat_state, Some(SwitchState::Off));
        assert!(climate.is_ac_on());
    }
}
