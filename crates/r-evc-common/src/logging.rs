//! ---
//! evc_section: "03-observability"
//! evc_subsection: "module"
//! evc_type: "source"
//! evc_scope: "code"
//! evc_description: "Daemon tracing bootstrap: filter directives and sinks."
//! evc_version: "v0.0.0-prealpha"
//! evc_owner: "tbd"
//! ---
//! Tracing bootstrap for the daemon.
//!
//! The filter is built from `logging.level` plus one directive per entry in
//! `logging.components`; `R_EVC_LOG` (then `RUST_LOG`) replaces it wholesale.
//! HTTP plumbing of the metrics exporter is capped at `warn` unless the
//! operator names it explicitly.

use anyhow::{Context, Result};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use tracing::info;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::daily;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::LoggingConfig;

const LOG_ENV: &str = "R_EVC_LOG";

/// Component names accepted under `[logging.components]` and the module
/// targets they select.
pub const COMPONENT_TARGETS: &[(&str, &str)] = &[
    ("telemetry", "r_evc_core::telemetry"),
    ("location", "r_evc_core::location"),
    ("dispatcher", "r_evc_core::dispatcher"),
    ("scheduler", "r_evc_core::polling"),
    ("push", "r_evc_core::push"),
    ("orchestrator", "r_evc_core::orchestrator"),
    ("session", "r_evc_client::session"),
    ("simulation", "r_evc_sim"),
    ("metrics", "r_evc_metrics"),
];

const QUIET_TARGETS: &[&str] = &["hyper", "axum"];

/// Worker guards flushing the non-blocking writers; live for the process.
struct Sinks {
    _stdout: WorkerGuard,
    _file: Option<WorkerGuard>,
}

static SINKS: OnceCell<Sinks> = OnceCell::new();

/// Available log formats for the daemon.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum LogFormat {
    #[default]
    StructuredJson,
    Pretty,
}

pub fn component_target(component: &str) -> Option<&'static str> {
    COMPONENT_TARGETS
        .iter()
        .find(|(name, _)| *name == component)
        .map(|(_, target)| *target)
}

pub fn component_names() -> Vec<&'static str> {
    COMPONENT_TARGETS.iter().map(|(name, _)| *name).collect()
}

/// Filter directives derived from configuration alone.
pub fn config_directives(config: &LoggingConfig) -> String {
    let mut directives = vec![config.level.to_ascii_lowercase()];
    for target in QUIET_TARGETS {
        directives.push(format!("{target}=warn"));
    }
    for (component, level) in &config.components {
        if let Some(target) = component_target(component) {
            directives.push(format!("{target}={}", level.to_ascii_lowercase()));
        }
    }
    directives.join(",")
}

/// Pick the effective directives: `R_EVC_LOG`, then `RUST_LOG`, then configuration.
pub fn select_directives(
    config: &LoggingConfig,
    evc_env: Option<String>,
    rust_env: Option<String>,
) -> String {
    evc_env
        .or(rust_env)
        .filter(|directive| !directive.trim().is_empty())
        .unwrap_or_else(|| config_directives(config))
}

fn build_filter(config: &LoggingConfig) -> EnvFilter {
    let directives = select_directives(
        config,
        std::env::var(LOG_ENV).ok(),
        std::env::var(EnvFilter::DEFAULT_ENV).ok(),
    );
    EnvFilter::try_new(&directives).unwrap_or_else(|err| {
        eprintln!("invalid log directives {directives:?} ({err}); using configured levels");
        EnvFilter::new(config_directives(config))
    })
}

fn stdout_layer<S>(format: LogFormat, writer: NonBlocking) -> Box<dyn Layer<S> + Send + Sync>
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a> + 'static,
{
    let layer = fmt::layer()
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .with_writer(writer);
    match format {
        LogFormat::StructuredJson => layer.with_target(false).json().boxed(),
        LogFormat::Pretty => layer.with_target(true).boxed(),
    }
}

/// Install the global subscriber for `service_name`. Later calls are no-ops.
pub fn init_tracing(service_name: &str, config: &LoggingConfig) -> Result<()> {
    let (stdout_writer, stdout_guard) = tracing_appender::non_blocking(std::io::stdout());

    let (file_layer, file_guard) = if config.file {
        std::fs::create_dir_all(&config.directory).with_context(|| {
            format!("failed to create log directory {}", config.directory.display())
        })?;
        let prefix = config.file_prefix.as_deref().unwrap_or(service_name);
        let appender = daily(&config.directory, format!("{prefix}.log"));
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let layer = fmt::layer()
            .with_timer(fmt::time::UtcTime::rfc_3339())
            .json()
            .with_writer(writer);
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    let installed = tracing_subscriber::registry()
        .with(build_filter(config))
        .with(stdout_layer(config.format, stdout_writer))
        .with(file_layer)
        .try_init()
        .is_ok();
    if !installed {
        return Ok(());
    }
    let _ = SINKS.set(Sinks {
        _stdout: stdout_guard,
        _file: file_guard,
    });

    info!(
        service = %service_name,
        format = ?config.format,
        file_sink = config.file,
        log_dir = %config.directory.display(),
        components = config.components.len(),
        "tracing initialised"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with(components: &[(&str, &str)]) -> LoggingConfig {
        let mut config = LoggingConfig::default();
        for (component, level) in components {
            config
                .components
                .insert((*component).to_owned(), (*level).to_owned());
        }
        config
    }

    #[test]
    fn components_map_to_module_targets() {
        let config = config_with(&[("telemetry", "DEBUG"), ("session", "trace")]);
        assert_eq!(
            config_directives(&config),
            "info,hyper=warn,axum=warn,r_evc_core::telemetry=debug,r_evc_client::session=trace"
        );
        assert!(EnvFilter::try_new(config_directives(&config)).is_ok());
    }

    #[test]
    fn environment_overrides_configuration() {
        let config = config_with(&[("location", "debug")]);
        assert_eq!(
            select_directives(&config, Some("warn".into()), Some("trace".into())),
            "warn"
        );
        assert_eq!(select_directives(&config, None, Some("trace".into())), "trace");
        assert_eq!(
            select_directives(&config, Some("  ".into()), None),
            config_directives(&config)
        );
    }

    #[test]
    fn unknown_component_is_rejected() {
        assert!(component_target("scheduler").is_some());
        let err = config_with(&[("gearbox", "debug")]).validate().unwrap_err();
        assert!(err.to_string().contains("gearbox"));
        let err = config_with(&[("push", "loud")]).validate().unwrap_err();
        assert!(err.to_string().contains("loud"));
    }
}
