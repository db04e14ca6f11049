//! ---
//! evc_section: "05-networking-external-interfaces"
//! evc_subsection: "module"
//! evc_type: "source"
//! evc_scope: "code"
//! evc_description: "Vehicle-cloud client seam and data model."
//! evc_version: "v0.0.0-prealpha"
//! evc_owner: "tbd"
//! ---
//! Contract between the coordinators and a remote vehicle cloud.
//!
//! The wire client itself lives outside this workspace; embedders provide a
//! [`VehicleConnector`] that yields [`VehicleApi`] implementations. The
//! [`ApiSession`] wrapper owns the connection lifecycle and maps the remote
//! [`ApiError`] taxonomy onto [`CallError`].

pub mod api;
pub mod command;
pub mod error;
pub mod models;
pub mod push;
pub mod session;

pub use api::{VehicleApi, VehicleConnector};
pub use command::{BatteryHeatParams, ClimateParams, SeatClimateParams, VehicleCommand};
pub use error::{ApiError, ApiResult, CallError};
pub use models::{
    ChargingState, ClimateState, ClimateStatus, EnergyState, LocationFix, LockState, PowerGear,
    RealtimeState, ResourceKind, SeatHeatVentState, SwitchState, VehicleIdentity,
};
pub use push::{push_channel, PushEvent, PushReceiver, PushSender};
pub use session::ApiSession;
