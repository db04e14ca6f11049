//! ---
//! evc_section: "03-observability"
//! evc_subsection: "module"
//! evc_type: "source"
//! evc_scope: "code"
//! evc_description: "Structured logging adapters and sinks."
//! evc_version: "v0.0.0-prealpha"
//! evc_owner: "tbd"
//! ---
//! Context-stamping wrappers around `tracing::event!`.

/// Emit an event at an explicit level enriched with a [`LogContext`](crate::LogContext).
#[macro_export]
macro_rules! evc_event {
    ($level:expr, context = $ctx:expr, $($arg:tt)+) => {{
        let ctx = &$ctx;
        tracing::event!(
            $level,
            vin = ctx.vin_field(),
            coordinator = ctx.coordinator.unwrap_or(""),
            cycle = ctx.cycle.unwrap_or_default(),
            message = %format_args!($($arg)+)
        );
    }};
    ($level:expr, $($arg:tt)+) => {{
        let ctx = &$crate::LogContext::default();
        tracing::event!(
            $level,
            vin = ctx.vin_field(),
            coordinator = ctx.coordinator.unwrap_or(""),
            cycle = ctx.cycle.unwrap_or_default(),
            message = %format_args!($($arg)+)
        );
    }};
}

/// Emit a debug log enriched with vehicle context.
#[macro_export]
macro_rules! evc_debug {
    ($($arg:tt)+) => {
        $crate::evc_event!(tracing::Level::DEBUG, $($arg)+)
    };
}

/// Emit an informational log enriched with vehicle context.
#[macro_export]
macro_rules! evc_info {
    ($($arg:tt)+) => {
        $crate::evc_event!(tracing::Level::INFO, $($arg)+)
    };
}

/// Emit a warning enriched with vehicle context.
#[macro_export]
macro_rules! evc_warn {
    ($($arg:tt)+) => {
        $crate::evc_event!(tracing::Level::WARN, $($arg)+)
    };
}

/// Emit an error log enriched with vehicle context.
#[macro_export]
macro_rules! evc_error {
    ($($arg:tt)+) => {
        $crate::evc_event!(tracing::Level::ERROR, $($arg)+)
    };
}
