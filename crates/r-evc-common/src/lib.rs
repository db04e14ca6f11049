//! ---
//! evc_section: "01-core-functionality"
//! evc_subsection: "module"
//! evc_type: "source"
//! evc_scope: "code"
//! evc_description: "Shared primitives and utilities for the core runtime."
//! evc_version: "v0.0.0-prealpha"
//! evc_owner: "tbd"
//! ---
//! Core shared primitives for the R-EVC workspace.
//! This crate exposes configuration loading, logging bootstrap, and the
//! monotonic time helpers consumed by the coordinators.

pub mod config;
pub mod logging;
pub mod time;

pub use config::{
    AppConfig, CommandConfig, LoggingConfig, MetricsConfig, Mode, PollingConfig, SimulationConfig,
    TelemetryConfig,
};
pub use logging::{init_tracing, LogFormat};
