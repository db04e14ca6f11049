//! ---
//! evc_section: "01-core-functionality"
//! evc_subsection: "module"
//! evc_type: "source"
//! evc_scope: "code"
//! evc_description: "Per-vehicle coordination and fleet lifecycle management."
//! evc_version: "v0.0.0-prealpha"
//! evc_owner: "tbd"
//! ---
//! Remote command execution with optimistic cache updates.
//!
//! A successful (or softly failed) command patches the cache for climate
//! commands, arms the HVAC guard on power changes, and schedules delayed
//! confirmation fetches so the cache catches up before the next poll.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use r_evc_client::{ApiSession, CallError, ResourceKind, VehicleCommand};
use r_evc_common::config::AppConfig;
use r_evc_logging::{evc_debug, evc_info, evc_warn, LogContext};
use r_evc_metrics::CoordinatorMetrics;
use tokio::task::JoinHandle;

use crate::error::CommandError;
use crate::location::LocationCoordinator;
use crate::pending::{CommandMemory, ConfirmationStrategy};
use crate::telemetry::{ClimatePatch, TelemetryCoordinator};

const NAME: &str = "dispatcher";

#[derive(Debug, Clone)]
pub struct DispatchSettings {
    pub confirm_delay: Duration,
    /// Delay of the forced refresh following an HVAC power switch.
    pub power_confirm_delay: Duration,
    /// Target temperature assumed when neither the command nor the cache has one.
    pub default_temperature: f64,
    /// Lifetime of a consumer's pending-command memory.
    pub pending_ttl: Duration,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            confirm_delay: Duration::from_secs(3),
            power_confirm_delay: Duration::from_secs(20),
            default_temperature: 21.0,
            pending_ttl: Duration::from_secs(300),
        }
    }
}

impl DispatchSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            confirm_delay: config.commands.confirm_delay,
            power_confirm_delay: config.commands.power_confirm_delay,
            default_temperature: config.commands.default_climate_temperature,
            pending_ttl: config.commands.pending_ttl,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    Accepted,
    /// The cloud accepted the request but reported a later failure; handled
    /// as optimistic success.
    SoftFailure(String),
}

pub struct CommandDispatcher {
    vin: String,
    session: Arc<ApiSession>,
    telemetry: Arc<TelemetryCoordinator>,
    location: Arc<LocationCoordinator>,
    settings: DispatchSettings,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    metrics: Option<CoordinatorMetrics>,
}

impl std::fmt::Debug for CommandDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandDispatcher")
            .field("vin", &r_evc_logging::redact_vin(&self.vin))
            .field("settings", &self.settings)
            .field("scheduled", &self.tasks.lock().len())
            .finish_non_exhaustive()
    }
}

impl CommandDispatcher {
    pub fn new(
        session: Arc<ApiSession>,
        telemetry: Arc<TelemetryCoordinator>,
        location: Arc<LocationCoordinator>,
        settings: DispatchSettings,
    ) -> Self {
        Self {
            vin: telemetry.vin().to_owned(),
            session,
            telemetry,
            location,
            settings,
            tasks: Mutex::new(Vec::new()),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Option<CoordinatorMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Issue `command`. On hard failure `on_rollback` runs and the cause is
    /// surfaced as [`CommandError::ActionFailed`].
    pub async fn execute<R>(
        &self,
        command: &VehicleCommand,
        on_rollback: R,
    ) -> Result<CommandOutcome, CommandError>
    where
        R: FnOnce() + Send,
    {
        let ctx = LogContext::new().with_vin(&self.vin).with_coordinator(NAME);
        let result = self
            .session
            .call_vin(command.name(), &self.vin, |api, vin| {
                let command = command.clone();
                async move { command.invoke(api.as_ref(), &vin).await }
            })
            .await;

        let outcome = match result {
            Ok(()) => {
                evc_info!(context = ctx, "command {} accepted", command.name());
                CommandOutcome::Accepted
            }
            Err(CallError::RemoteControlSoftFailure(reason)) => {
                evc_warn!(
                    context = ctx,
                    "command {} reported soft failure, assuming it will apply: {}",
                    command.name(),
                    reason
                );
                CommandOutcome::SoftFailure(reason)
            }
            Err(err) => {
                evc_warn!(context = ctx, "command {} failed: {}", command.name(), err);
                on_rollback();
                self.record(command, "failed");
                return Err(CommandError::ActionFailed(err.to_string()));
            }
        };
        self.record(
            command,
            match outcome {
                CommandOutcome::Accepted => "accepted",
                CommandOutcome::SoftFailure(_) => "soft_failure",
            },
        );

        if command.affects_climate() {
            if let Some(patch) = self.patch_for(command) {
                self.telemetry.apply_optimistic_climate(&patch);
            }
        }

        for kind in command.affected_resources() {
            self.schedule_fetch(*kind, self.settings.confirm_delay);
        }
        if command.climate_power().is_some() {
            self.schedule_forced_refresh(self.settings.power_confirm_delay);
        }
        Ok(outcome)
    }

    /// Fresh pending-command memory using the configured TTL.
    pub fn command_memory<T: Clone>(&self, strategy: ConfirmationStrategy<T>) -> CommandMemory<T> {
        CommandMemory::new(strategy, self.settings.pending_ttl)
    }

    /// [`execute`](Self::execute) that arms `memory` with `expected` on
    /// success and resets it on failure.
    pub async fn execute_tracked<T>(
        &self,
        command: &VehicleCommand,
        memory: &CommandMemory<T>,
        expected: T,
    ) -> Result<CommandOutcome, CommandError>
    where
        T: Clone + Send + Sync,
    {
        let outcome = self.execute(command, || memory.reset()).await?;
        memory.arm(expected);
        Ok(outcome)
    }

    /// Handle a pushed command acknowledgement: consumers re-evaluate now and
    /// climate plus realtime are re-fetched after the confirmation delay.
    pub fn handle_command_ack(&self, command: &str, payload: &serde_json::Value) {
        let ctx = LogContext::new().with_vin(&self.vin).with_coordinator(NAME);
        let revision = self.telemetry.cache().touch();
        evc_debug!(
            context = ctx,
            "command ack {} received (revision {}, payload {})",
            command,
            revision,
            payload
        );
        self.schedule_fetch(ResourceKind::Climate, self.settings.confirm_delay);
        self.schedule_fetch(ResourceKind::Realtime, self.settings.confirm_delay);
    }

    /// Number of delayed tasks not yet finished.
    pub fn pending_tasks(&self) -> usize {
        let mut tasks = self.tasks.lock();
        tasks.retain(|task| !task.is_finished());
        tasks.len()
    }

    /// Abort every scheduled confirmation.
    pub fn shutdown(&self) {
        let tasks = std::mem::take(&mut *self.tasks.lock());
        let aborted = tasks.len();
        for task in tasks {
            task.abort();
        }
        if aborted > 0 {
            let ctx = LogContext::new().with_vin(&self.vin).with_coordinator(NAME);
            evc_debug!(context = ctx, "aborted {} delayed confirmation tasks", aborted);
        }
    }

    fn patch_for(&self, command: &VehicleCommand) -> Option<ClimatePatch> {
        match command {
            VehicleCommand::StartClimate(params) => {
                let temperature = params
                    .temperature
                    .or_else(|| {
                        self.telemetry
                            .cache()
                            .read(|snapshot| snapshot.climate.as_ref()?.main_setting_temp)
                    })
                    .unwrap_or(self.settings.default_temperature);
                Some(ClimatePatch::power(true).with_temperature(temperature))
            }
            VehicleCommand::StopClimate => Some(ClimatePatch::power(false)),
            VehicleCommand::SetSeatClimate(params) => Some(ClimatePatch::seats(params.clone())),
            _ => None,
        }
    }

    fn schedule_fetch(&self, kind: ResourceKind, delay: Duration) {
        let telemetry = self.telemetry.clone();
        let location = self.location.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let result = match kind {
                ResourceKind::Realtime => telemetry.fetch_realtime().await.map(|_| ()),
                ResourceKind::Climate => telemetry.fetch_climate().await.map(|_| ()),
                ResourceKind::Location => location.fetch_location().await.map(|_| ()),
                _ => telemetry.refresh(true).await.map(|_| ()),
            };
            let ctx = LogContext::new()
                .with_vin(telemetry.vin())
                .with_coordinator(NAME);
            match result {
                Ok(()) => evc_debug!(context = ctx, "confirmation fetch of {} complete", kind),
                Err(err) => evc_debug!(
                    context = ctx,
                    "confirmation fetch of {} failed; next poll retries: {}",
                    kind,
                    err
                ),
            }
        });
        self.track(handle);
    }

    fn schedule_forced_refresh(&self, delay: Duration) {
        let telemetry = self.telemetry.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(err) = telemetry.refresh(true).await {
                let ctx = LogContext::new()
                    .with_vin(telemetry.vin())
                    .with_coordinator(NAME);
                evc_debug!(context = ctx, "power confirmation refresh failed: {}", err);
            }
        });
        self.track(handle);
    }

    fn track(&self, handle: JoinHandle<()>) {
        let mut tasks = self.tasks.lock();
        tasks.retain(|task| !task.is_finished());
        tasks.push(handle);
    }

    fn record(&self, command: &VehicleCommand, outcome: &str) {
        if let Some(metrics) = &self.metrics {
            metrics.record_command(r_evc_logging::redact_vin(&self.vin), command.name(), outcome);
        }
    }
}

impl Drop for CommandDispatcher {
    fn drop(&mut self) {
        for task in self.tasks.get_mut().drain(..) {
            task.abort();
        }
    }
}
