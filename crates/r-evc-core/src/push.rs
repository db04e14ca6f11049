//! ---
//! evc_section: "01-core-functionality"
//! evc_subsection: "module"
//! evc_type: "source"
//! evc_scope: "code"
//! evc_description: "Per-vehicle coordination and fleet lifecycle management."
//! evc_version: "v0.0.0-prealpha"
//! evc_owner: "tbd"
//! ---
//! Drains pushed events into the owning vehicle's coordinators.

use std::sync::Arc;

use r_evc_client::{PushEvent, PushReceiver};
use r_evc_metrics::CoordinatorMetrics;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::registry::CoordinatorRegistry;

#[derive(Debug, Clone)]
pub struct PushIngestion {
    registry: Arc<CoordinatorRegistry>,
    metrics: Option<CoordinatorMetrics>,
}

impl PushIngestion {
    pub fn new(registry: Arc<CoordinatorRegistry>, metrics: Option<CoordinatorMetrics>) -> Self {
        Self { registry, metrics }
    }

    /// Route one event. Returns `false` for vehicles not in the registry.
    pub fn apply(&self, event: PushEvent) -> bool {
        let kind = match &event {
            PushEvent::VehicleInfo { .. } => "vehicle_info",
            PushEvent::CommandAck { .. } => "command_ack",
        };
        let Some(vehicle) = self.registry.get(event.vin()) else {
            debug!(
                vin = r_evc_logging::redact_vin(event.vin()),
                kind, "push event for unregistered vehicle ignored"
            );
            self.record(kind, false);
            return false;
        };
        match event {
            PushEvent::VehicleInfo { realtime, .. } => {
                vehicle.telemetry.merge_pushed_realtime(realtime);
            }
            PushEvent::CommandAck {
                command, payload, ..
            } => {
                vehicle.dispatcher.handle_command_ack(&command, &payload);
            }
        }
        self.record(kind, true);
        true
    }

    /// Spawn the task draining `events` until shutdown or channel close.
    pub fn spawn(self, mut events: PushReceiver, mut shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.recv() => {
                        debug!("push ingestion shutdown signal received");
                        break;
                    }
                    event = events.recv() => match event {
                        Some(event) => {
                            self.apply(event);
                        }
                        None => {
                            debug!("push channel closed");
                            break;
                        }
                    }
                }
            }
        })
    }

    fn record(&self, kind: &str, routed: bool) {
        if let Some(metrics) = &self.metrics {
            metrics.record_push_event(kind, routed);
        }
    }
}
