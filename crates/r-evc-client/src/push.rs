//! ---
//! evc_section: "05-networking-external-interfaces"
//! evc_subsection: "module"
//! evc_type: "source"
//! evc_scope: "code"
//! evc_description: "Vehicle-cloud client seam and data model."
//! evc_version: "v0.0.0-prealpha"
//! evc_owner: "tbd"
//! ---
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::models::RealtimeState;

/// Unsolicited update delivered by the cloud outside the poll cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PushEvent {
    /// Pre-parsed realtime state for one vehicle.
    VehicleInfo { vin: String, realtime: RealtimeState },
    /// Acknowledgement correlated with a previously issued command.
    CommandAck {
        vin: String,
        command: String,
        payload: serde_json::Value,
    },
}

impl PushEvent {
    pub fn vin(&self) -> &str {
        match self {
            PushEvent::VehicleInfo { vin, .. } | PushEvent::CommandAck { vin, .. } => vin,
        }
    }
}

pub type PushSender = mpsc::Sender<PushEvent>;
pub type PushReceiver = mpsc::Receiver<PushEvent>;

/// Create the bounded channel a transport publishes [`PushEvent`]s on.
pub fn push_channel(capacity: usize) -> (PushSender, PushReceiver) {
    mpsc::channel(capacity.max(1))
}
