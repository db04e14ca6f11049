//! ---
//! evc_section: "03-observability"
//! evc_subsection: "module"
//! evc_type: "source"
//! evc_scope: "code"
//! evc_description: "Metrics collection and export utilities."
//! evc_version: "v0.0.0-prealpha"
//! evc_owner: "tbd"
//! ---
use std::net::{SocketAddr, TcpListener as StdTcpListener};
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::http::{header, HeaderValue, StatusCode};
use axum::routing::get;
use axum::{response::IntoResponse, Router};
use prometheus::{
    GaugeVec, Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge,
    IntGaugeVec, Opts, Registry, TextEncoder,
};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Shared registry type used across services.
pub type SharedRegistry = Arc<Registry>;

/// Produce a new shared registry.
pub fn new_registry() -> SharedRegistry {
    Arc::new(Registry::new())
}

/// Spawn an HTTP server that exposes the registry at `/metrics`.
pub fn spawn_http_server(registry: SharedRegistry, addr: SocketAddr) -> Result<MetricsServer> {
    let app = Router::new().route(
        "/metrics",
        get({
            let registry = registry.clone();
            move || metrics_handler(registry.clone())
        }),
    );

    let std_listener = StdTcpListener::bind(addr)
        .with_context(|| format!("failed to bind metrics listener {}", addr))?;
    std_listener
        .set_nonblocking(true)
        .with_context(|| "failed to configure metrics listener as non-blocking")?;
    let bound = std_listener
        .local_addr()
        .with_context(|| "failed to read metrics listener address")?;
    let listener = TcpListener::from_std(std_listener)
        .with_context(|| "failed to convert std listener into tokio listener")?;

    info!(address = %bound, "metrics server starting");

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let service = app.into_make_service();
    let handle: JoinHandle<Result<()>> = tokio::spawn(async move {
        axum::serve(listener, service)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            })
            .await
            .context("metrics server encountered an error")?;
        Ok(())
    });

    Ok(MetricsServer {
        addr: bound,
        shutdown: Some(shutdown_tx),
        task: handle,
    })
}

async fn metrics_handler(registry: SharedRegistry) -> impl IntoResponse {
    let families = registry.gather();
    let encoder = TextEncoder::new();
    match encoder.encode_to_string(&families) {
        Ok(body) => (
            StatusCode::OK,
            [(
                header::CONTENT_TYPE,
                HeaderValue::from_static(prometheus::TEXT_FORMAT),
            )],
            body,
        ),
        Err(err) => {
            error!(error = %err, "failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [(
                    header::CONTENT_TYPE,
                    HeaderValue::from_static("text/plain; charset=utf-8"),
                )],
                String::from("metrics encoding error"),
            )
        }
    }
}

/// Handle to the running HTTP exporter.
#[derive(Debug)]
pub struct MetricsServer {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<Result<()>>,
}

impl MetricsServer {
    /// Bound address; differs from the configured one when port 0 was requested.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Signal shutdown and await task completion.
    pub async fn shutdown(mut self) -> Result<()> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        match self.task.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(err),
            Err(join_err) => Err(anyhow::Error::new(join_err)),
        }
    }
}

/// Metrics recorded by the daemon process itself.
#[derive(Clone)]
pub struct DaemonMetrics {
    registry: SharedRegistry,
    starts_total: IntCounter,
    config_load_seconds: Histogram,
    build_info: GaugeVec,
}

impl DaemonMetrics {
    pub fn new(registry: SharedRegistry) -> Result<Self> {
        let starts_total = IntCounter::with_opts(Opts::new(
            "r_evcd_starts_total",
            "Total number of times the R-EVC daemon has initialised",
        ))?;
        registry.register(Box::new(starts_total.clone()))?;

        let buckets = prometheus::exponential_buckets(0.001, 2.0, 16)
            .context("failed to construct histogram buckets")?;
        let config_load_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "r_evcd_config_load_seconds",
                "Time spent loading and validating configuration",
            )
            .buckets(buckets),
        )?;
        registry.register(Box::new(config_load_seconds.clone()))?;

        let build_info = GaugeVec::new(
            Opts::new(
                "r_evcd_build_info",
                "Build metadata for the running daemon binary",
            ),
            &["version", "mode"],
        )?;
        registry.register(Box::new(build_info.clone()))?;

        Ok(Self {
            registry,
            starts_total,
            config_load_seconds,
            build_info,
        })
    }

    pub fn registry(&self) -> SharedRegistry {
        self.registry.clone()
    }

    pub fn inc_start(&self) {
        self.starts_total.inc();
    }

    pub fn observe_config_load(&self, seconds: f64) {
        self.config_load_seconds.observe(seconds);
    }

    pub fn set_build_info(&self, version: &str, mode: &str) {
        self.build_info.with_label_values(&[version, mode]).set(1.0);
    }
}

/// Per-vehicle coordinator instrumentation.
///
/// The `vehicle` label carries a redacted VIN supplied by the caller.
#[derive(Clone, Debug)]
pub struct CoordinatorMetrics {
    registry: SharedRegistry,
    vehicles_total: IntGauge,
    cycles: IntCounterVec,
    cycle_seconds: HistogramVec,
    partial_failures: IntCounterVec,
    guard_rejections: IntCounterVec,
    commands: IntCounterVec,
    location_interval: IntGaugeVec,
    push_events: IntCounterVec,
}

impl CoordinatorMetrics {
    pub fn new(registry: SharedRegistry) -> Result<Self> {
        let vehicles_total = IntGauge::with_opts(Opts::new(
            "r_evc_vehicles_total",
            "Number of vehicles coordinated by this process",
        ))?;
        registry.register(Box::new(vehicles_total.clone()))?;

        let cycles = IntCounterVec::new(
            Opts::new(
                "r_evc_cycles_total",
                "Coordinator refresh cycles by outcome",
            ),
            &["vehicle", "coordinator", "outcome"],
        )?;
        registry.register(Box::new(cycles.clone()))?;

        let buckets = prometheus::exponential_buckets(0.005, 2.0, 12)
            .context("failed to construct cycle histogram buckets")?;
        let cycle_seconds = HistogramVec::new(
            HistogramOpts::new(
                "r_evc_cycle_duration_seconds",
                "Wall time spent in a non-skipped refresh cycle",
            )
            .buckets(buckets),
            &["coordinator"],
        )?;
        registry.register(Box::new(cycle_seconds.clone()))?;

        let partial_failures = IntCounterVec::new(
            Opts::new(
                "r_evc_partial_failures_total",
                "Per-resource fetch failures absorbed by cache fallback",
            ),
            &["vehicle", "resource"],
        )?;
        registry.register(Box::new(partial_failures.clone()))?;

        let guard_rejections = IntCounterVec::new(
            Opts::new(
                "r_evc_guard_rejections_total",
                "Fetched values discarded because they contradicted an armed guard",
            ),
            &["vehicle", "field"],
        )?;
        registry.register(Box::new(guard_rejections.clone()))?;

        let commands = IntCounterVec::new(
            Opts::new("r_evc_commands_total", "Remote commands by outcome"),
            &["vehicle", "command", "outcome"],
        )?;
        registry.register(Box::new(commands.clone()))?;

        let location_interval = IntGaugeVec::new(
            Opts::new(
                "r_evc_location_interval_seconds",
                "Interval currently applied by the location scheduler",
            ),
            &["vehicle"],
        )?;
        registry.register(Box::new(location_interval.clone()))?;

        let push_events = IntCounterVec::new(
            Opts::new(
                "r_evc_push_events_total",
                "Push events received, by kind and routing result",
            ),
            &["kind", "routed"],
        )?;
        registry.register(Box::new(push_events.clone()))?;

        Ok(Self {
            registry,
            vehicles_total,
            cycles,
            cycle_seconds,
            partial_failures,
            guard_rejections,
            commands,
            location_interval,
            push_events,
        })
    }

    pub fn registry(&self) -> SharedRegistry {
        self.registry.clone()
    }

    pub fn set_vehicle_count(&self, count: usize) {
        self.vehicles_total.set(count as i64);
    }

    pub fn record_cycle(&self, vehicle: &str, coordinator: &str, outcome: &str) {
        self.cycles
            .with_label_values(&[vehicle, coordinator, outcome])
            .inc();
    }

    pub fn observe_cycle_duration(&self, coordinator: &str, seconds: f64) {
        self.cycle_seconds
            .with_label_values(&[coordinator])
            .observe(seconds);
    }

    pub fn record_partial_failure(&self, vehicle: &str, resource: &str) {
        self.partial_failures
            .with_label_values(&[vehicle, resource])
            .inc();
    }

    pub fn record_guard_rejection(&self, vehicle: &str, field: &str) {
        self.guard_rejections
            .with_label_values(&[vehicle, field])
            .inc();
    }

    pub fn record_command(&self, vehicle: &str, command: &str, outcome: &str) {
        self.commands
            .with_label_values(&[vehicle, command, outcome])
            .inc();
    }

    pub fn set_location_interval(&self, vehicle: &str, seconds: u64) {
        self.location_interval
            .with_label_values(&[vehicle])
            .set(seconds as i64);
    }

    pub fn record_push_event(&self, kind: &str, routed: bool) {
        self.push_events
            .with_label_values(&[kind, if routed { "true" } else { "false" }])
            .inc();
    }
}

pub use prometheus;
