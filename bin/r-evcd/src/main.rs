//! ---
//! evc_section: "01-core-functionality"
//! evc_subsection: "binary"
//! evc_type: "source"
//! evc_scope: "code"
//! evc_description: "Binary entrypoint for the R-EVC daemon."
//! evc_version: "v0.0.0-prealpha"
//! evc_owner: "tbd"
//! ---
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use r_evc_client::{push_channel, ApiSession, PushReceiver};
use r_evc_common::config::{AppConfig, Mode};
use r_evc_common::logging::init_tracing;
use r_evc_core::{FleetHandle, FleetOrchestrator};
use r_evc_metrics::{
    new_registry, spawn_http_server, CoordinatorMetrics, DaemonMetrics, MetricsServer,
};
use r_evc_sim::{spawn_push_loop, SimulatedConnector, SimulatedVehicleCloud};
use tokio::signal;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, warn};

const PUSH_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Parser)]
#[command(
    author,
    version = concat!("R-EVC ", env!("CARGO_PKG_VERSION")),
    about = "R-EVC daemon",
    long_about = None
)]
struct Cli {
    #[arg(long, value_name = "FILE", help = "Path to configuration file")]
    config: Option<PathBuf>,

    #[arg(long, value_enum, help = "Override application mode")]
    mode: Option<CliMode>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliMode {
    Production,
    Simulation,
}

impl From<CliMode> for Mode {
    fn from(value: CliMode) -> Self {
        match value {
            CliMode::Production => Mode::Production,
            CliMode::Simulation => Mode::Simulation,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Run the fleet coordinators until interrupted")]
    Run,
    #[command(about = "Start the fleet, print every vehicle's cached state as JSON and exit")]
    Snapshot,
    #[command(about = "Validate the configuration and print the effective settings")]
    CheckConfig,
}

fn mode_label(mode: Mode) -> &'static str {
    match mode {
        Mode::Production => "production",
        Mode::Simulation => "simulation",
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut candidates = Vec::new();
    if let Some(path) = &cli.config {
        candidates.push(path.clone());
    }
    candidates.push(PathBuf::from("configs/r-evc.toml"));
    candidates.push(PathBuf::from("configs/example.sim.toml"));

    let load_started = Instant::now();
    let loaded = AppConfig::load_with_source(&candidates)?;
    let mut config = loaded.config;
    let load_duration = load_started.elapsed();
    if let Some(mode) = cli.mode {
        config.mode = mode.into();
        config.validate()?;
    }

    let command = cli.command.unwrap_or(Commands::Run);
    if let Commands::CheckConfig = command {
        println!("# effective configuration from {}", loaded.source.display());
        println!(
            "{}",
            toml::to_string_pretty(&config).context("failed to render configuration")?
        );
        return Ok(());
    }

    init_tracing("r-evcd", &config.logging)?;
    info!(config_path = %loaded.source.display(), mode = mode_label(config.mode), "configuration loaded");

    let registry = new_registry();
    let daemon_metrics = DaemonMetrics::new(registry.clone())?;
    daemon_metrics.observe_config_load(load_duration.as_secs_f64());
    daemon_metrics.inc_start();
    daemon_metrics.set_build_info(env!("CARGO_PKG_VERSION"), mode_label(config.mode));

    let metrics_settings = config.metrics.clone();
    let (metrics_server, coordinator_metrics) = if metrics_settings.enabled {
        let coordinator_metrics = CoordinatorMetrics::new(registry.clone())?;
        let server = spawn_http_server(registry, metrics_settings.listen)?;
        info!(address = %server.addr(), "metrics exporter enabled");
        (Some(server), Some(coordinator_metrics))
    } else {
        info!("metrics exporter disabled by configuration");
        (None, None)
    };

    let outcome = run_fleet(config, command, coordinator_metrics).await;
    finish(outcome, metrics_server).await
}

/// Stop the exporter whatever the fleet outcome was; the fleet error wins.
async fn finish(outcome: Result<()>, metrics_server: Option<MetricsServer>) -> Result<()> {
    let Some(server) = metrics_server else {
        return outcome;
    };
    let stopped = server.shutdown().await;
    match (outcome, stopped) {
        (Err(err), Err(stop_err)) => {
            warn!(error = %stop_err, "metrics exporter did not stop cleanly");
            Err(err)
        }
        (Err(err), Ok(())) => Err(err),
        (Ok(()), stopped) => stopped,
    }
}

async fn run_fleet(
    config: AppConfig,
    command: Commands,
    coordinator_metrics: Option<CoordinatorMetrics>,
) -> Result<()> {
    let backend = Backend::connect(&config)?;
    let orchestrator = FleetOrchestrator::new(
        config,
        backend.session.clone(),
        backend.push,
        coordinator_metrics,
    );
    let handle = match orchestrator.start().await {
        Ok(handle) => handle,
        Err(err) => {
            backend.simulation.stop().await;
            return Err(err);
        }
    };

    let served = match command {
        Commands::Snapshot => serde_json::to_string_pretty(&handle.snapshot())
            .context("failed to render fleet snapshot")
            .map(|rendered| println!("{rendered}")),
        _ => wait_for_shutdown(&handle).await,
    };

    let stopped = handle.shutdown().await;
    backend.simulation.stop().await;
    served.and(stopped)
}

async fn wait_for_shutdown(handle: &FleetHandle) -> Result<()> {
    info!(
        vehicles = handle.vins().len(),
        mode = mode_label(handle.config().mode),
        "daemon running; waiting for termination signal"
    );
    signal::ctrl_c().await?;
    info!("ctrl-c received; shutting down");
    Ok(())
}

/// Remote session plus whatever drives it in simulation mode.
struct Backend {
    session: Arc<ApiSession>,
    push: Option<PushReceiver>,
    simulation: SimulationTask,
}

impl Backend {
    fn connect(config: &AppConfig) -> Result<Self> {
        match config.mode {
            Mode::Production => bail!(
                "no production vehicle-cloud client is linked into this build; run with --mode simulation"
            ),
            Mode::Simulation => {
                let cloud = SimulatedVehicleCloud::new(&config.simulation)?;
                let (push_tx, push_rx) = push_channel(PUSH_CHANNEL_CAPACITY);
                cloud.attach_push(push_tx.clone());
                let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
                let task = match config.simulation.push_interval {
                    Some(interval) => Some(spawn_push_loop(
                        cloud.clone(),
                        push_tx,
                        interval,
                        shutdown_rx,
                    )),
                    None => {
                        warn!("simulation push interval unset; only command acknowledgements are pushed");
                        None
                    }
                };
                let session = Arc::new(ApiSession::new(Arc::new(SimulatedConnector::new(cloud))));
                Ok(Self {
                    session,
                    push: Some(push_rx),
                    simulation: SimulationTask {
                        shutdown: shutdown_tx,
                        task,
                    },
                })
            }
        }
    }
}

struct SimulationTask {
    shutdown: broadcast::Sender<()>,
    task: Option<JoinHandle<()>>,
}

impl SimulationTask {
    async fn stop(self) {
        let _ = self.shutdown.send(());
        if let Some(task) = self.task {
            if let Err(err) = task.await {
                warn!(error = %err, "simulation push loop ended abnormally");
            }
        }
    }
}
