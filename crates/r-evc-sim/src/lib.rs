//! ---
//! evc_section: "11-simulation"
//! evc_subsection: "module"
//! evc_type: "source"
//! evc_scope: "code"
//! evc_description: "Simulation runtime module exports and shared types."
//! evc_version: "v0.0.0-prealpha"
//! evc_owner: "tbd"
//! ---
//! Seeded in-process vehicle cloud for running R-EVC without credentials.

pub mod cloud;
pub mod vehicle;

pub use cloud::{spawn_push_loop, SimulatedConnector, SimulatedVehicleCloud};
pub use vehicle::SimVehicle;
