//! ---
//! evc_section: "03-observability"
//! evc_subsection: "module"
//! evc_type: "source"
//! evc_scope: "code"
//! evc_description: "Structured logging adapters and sinks."
//! evc_version: "v0.0.0-prealpha"
//! evc_owner: "tbd"
//! ---
#![warn(missing_docs)]
//! Vehicle-scoped logging context shared by the coordinators.

use tracing::Level;
use tracing_subscriber::{fmt as subscriber_fmt, prelude::*, EnvFilter, Registry};

pub mod macros;

/// Initialize a baseline tracing subscriber suitable for tests and tools.
pub fn init() {
    let _ = Registry::default()
        .with(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with(subscriber_fmt::layer().with_test_writer())
        .try_init();
}

/// Shorten a VIN to its last six characters for log output.
pub fn redact_vin(vin: &str) -> &str {
    let cut = vin.len().saturating_sub(6);
    vin.get(cut..).unwrap_or(vin)
}

/// Structured logging context propagated by the convenience macros.
#[derive(Debug, Default, Clone)]
pub struct LogContext<'a> {
    /// Vehicle identifier, emitted redacted.
    pub vin: Option<&'a str>,
    /// Coordinator or component name (`telemetry`, `location`, `dispatcher`, ...).
    pub coordinator: Option<&'a str>,
    /// Cycle sequence number within the coordinator.
    pub cycle: Option<u64>,
}

impl<'a> LogContext<'a> {
    /// Create an empty logging context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a vehicle identifier.
    pub fn with_vin(mut self, vin: &'a str) -> Self {
        self.vin = Some(vin);
        self
    }

    /// Attach a coordinator name.
    pub fn with_coordinator(mut self, coordinator: &'a str) -> Self {
        self.coordinator = Some(coordinator);
        self
    }

    /// Attach a cycle number.
    pub fn with_cycle(mut self, cycle: u64) -> Self {
        self.cycle = Some(cycle);
        self
    }

    /// Redacted VIN, empty when unset.
    pub fn vin_field(&self) -> &str {
        self.vin.map(redact_vin).unwrap_or("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn macros_emit_without_panic() {
        init();
        let ctx = LogContext::new()
            .with_vin("LGXCE4CB0N0123456")
            .with_coordinator("telemetry")
            .with_cycle(3);
        evc_info!(context = ctx.clone(), "refresh complete");
        evc_debug!("debug message");
        evc_warn!(context = ctx.clone(), "endpoint failures: {}", 2);
        evc_error!(context = ctx, "error code: {}", 42);
    }

    #[test]
    fn redaction_keeps_tail() {
        assert_eq!(redact_vin("LGXCE4CB0N0123456"), "123456");
        assert_eq!(redact_vin("ABC"), "ABC");
        let ctx = LogContext::new().with_vin("LGXCE4CB0N0123456");
        assert_eq!(ctx.vin_field(), "123456");
        assert_eq!(LogContext::new().vin_field(), "");
    }
}
