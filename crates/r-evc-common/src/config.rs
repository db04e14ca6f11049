//! ---
//! evc_section: "01-core-functionality"
//! evc_subsection: "module"
//! evc_type: "source"
//! evc_scope: "code"
//! evc_description: "Shared primitives and utilities for the core runtime."
//! evc_version: "v0.0.0-prealpha"
//! evc_owner: "tbd"
//! ---
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationSeconds};
use tracing::debug;

use crate::logging::LogFormat;

fn default_mode() -> Mode {
    Mode::Production
}

fn default_telemetry_interval() -> Duration {
    Duration::from_secs(300)
}

fn default_location_interval() -> Duration {
    Duration::from_secs(300)
}

fn default_active_interval() -> Duration {
    Duration::from_secs(30)
}

fn default_inactive_interval() -> Duration {
    Duration::from_secs(600)
}

fn default_confirm_delay() -> Duration {
    Duration::from_secs(3)
}

fn default_power_confirm_delay() -> Duration {
    Duration::from_secs(20)
}

fn default_climate_guard_ttl() -> Duration {
    Duration::from_secs(60)
}

fn default_pending_ttl() -> Duration {
    Duration::from_secs(300)
}

fn default_climate_temperature() -> f64 {
    21.0
}

fn default_true() -> bool {
    true
}

fn default_logging_directory() -> PathBuf {
    PathBuf::from("target/logs")
}

fn default_log_format() -> LogFormat {
    LogFormat::StructuredJson
}

fn default_metrics_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 9899))
}

fn default_simulation_seed() -> u64 {
    0xE_7C0DE
}

fn default_simulated_vehicles() -> usize {
    1
}

fn default_push_interval() -> Duration {
    Duration::from_secs(45)
}

/// Primary configuration object for the R-EVC runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_mode")]
    pub mode: Mode,
    /// Optional VIN allowlist. Empty means every vehicle on the account.
    #[serde(default)]
    pub vehicles: IndexSet<String>,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub commands: CommandConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
}

/// Metadata describing where an [`AppConfig`] was loaded from.
#[derive(Debug, Clone)]
pub struct LoadedAppConfig {
    pub config: AppConfig,
    pub source: PathBuf,
}

impl AppConfig {
    pub const ENV_CONFIG_PATH: &str = "R_EVC_CONFIG";

    /// Load configuration from disk, respecting the `R_EVC_CONFIG` override.
    pub fn load<P: AsRef<Path>>(candidates: &[P]) -> Result<Self> {
        Ok(Self::load_with_source(candidates)?.config)
    }

    /// Load configuration from disk together with the effective source path.
    pub fn load_with_source<P: AsRef<Path>>(candidates: &[P]) -> Result<LoadedAppConfig> {
        if let Ok(env_path) = std::env::var(Self::ENV_CONFIG_PATH) {
            if !env_path.trim().is_empty() {
                let path = PathBuf::from(env_path);
                let config = Self::from_path(&path)?;
                return Ok(LoadedAppConfig {
                    config,
                    source: path,
                });
            }
        }

        for candidate in candidates {
            if candidate.as_ref().exists() {
                let path = candidate.as_ref().to_path_buf();
                let config = Self::from_path(&path)?;
                return Ok(LoadedAppConfig {
                    config,
                    source: path,
                });
            }
        }

        Err(anyhow!(
            "no configuration files found. inspected: {}",
            candidates
                .iter()
                .map(|p| p.as_ref().display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ))
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        debug!(config_path = %path.display(), "loading configuration");
        let contents = fs::read_to_string(path)
            .with_context(|| format!("unable to read config file {}", path.display()))?;
        let config = toml::from_str::<AppConfig>(&contents)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Whether a VIN passes the configured allowlist.
    pub fn tracks_vehicle(&self, vin: &str) -> bool {
        self.vehicles.is_empty() || self.vehicles.contains(vin)
    }

    /// Validate structural invariants.
    pub fn validate(&self) -> Result<()> {
        self.polling.validate()?;
        self.commands.validate()?;
        self.logging.validate()?;
        if self.mode.is_simulation() && self.simulation.vehicles == 0 {
            return Err(anyhow!("simulation mode requires at least one simulated vehicle"));
        }
        if let Some(interval) = self.simulation.push_interval {
            if interval.is_zero() {
                return Err(anyhow!("simulation.push_interval must be greater than zero"));
            }
            check_upper_bound("simulation", "push_interval", interval)?;
        }
        if !(0.0..=1.0).contains(&self.simulation.soft_failure_rate) {
            return Err(anyhow!(
                "simulation.soft_failure_rate must be within 0.0..=1.0 (got {})",
                self.simulation.soft_failure_rate
            ));
        }
        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            vehicles: IndexSet::new(),
            polling: PollingConfig::default(),
            telemetry: TelemetryConfig::default(),
            commands: CommandConfig::default(),
            logging: LoggingConfig::default(),
            metrics: MetricsConfig::default(),
            simulation: SimulationConfig::default(),
        }
    }
}

impl std::str::FromStr for AppConfig {
    type Err = anyhow::Error;

    fn from_str(content: &str) -> std::result::Result<Self, Self::Err> {
        let config: AppConfig =
            toml::from_str(content).with_context(|| "failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }
}

/// Which vehicle cloud backend the daemon talks to.
#[derive(Debug, Copy, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Production,
    Simulation,
}

impl Mode {
    pub fn is_simulation(&self) -> bool {
        matches!(self, Mode::Simulation)
    }
}

impl std::str::FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "production" => Ok(Mode::Production),
            "simulation" => Ok(Mode::Simulation),
            other => Err(format!("unknown mode: {}", other)),
        }
    }
}

/// Scheduling intervals for the telemetry and location coordinators.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    #[serde(default = "default_telemetry_interval")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub telemetry_interval: Duration,
    #[serde(default = "default_location_interval")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub location_interval: Duration,
    /// Derive the location interval from vehicle power state.
    #[serde(default)]
    pub smart_polling: bool,
    #[serde(default = "default_active_interval")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub active_interval: Duration,
    #[serde(default = "default_inactive_interval")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub inactive_interval: Duration,
}

impl PollingConfig {
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("telemetry_interval", self.telemetry_interval),
            ("location_interval", self.location_interval),
            ("active_interval", self.active_interval),
            ("inactive_interval", self.inactive_interval),
        ] {
            if value.is_zero() {
                return Err(anyhow!("polling.{} must be greater than zero", name));
            }
            check_upper_bound("polling", name, value)?;
        }
        if self.smart_polling && self.active_interval > self.inactive_interval {
            return Err(anyhow!(
                "polling.active_interval ({}s) must not exceed polling.inactive_interval ({}s)",
                self.active_interval.as_secs(),
                self.inactive_interval.as_secs()
            ));
        }
        Ok(())
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            telemetry_interval: default_telemetry_interval(),
            location_interval: default_location_interval(),
            smart_polling: false,
            active_interval: default_active_interval(),
            inactive_interval: default_inactive_interval(),
        }
    }
}

/// Optional sub-resources fetched alongside realtime and climate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_true")]
    pub fetch_energy: bool,
    #[serde(default = "default_true")]
    pub fetch_charging: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            fetch_energy: true,
            fetch_charging: true,
        }
    }
}

/// Longest interval, delay or TTL accepted anywhere in the configuration.
pub const MAX_CONFIGURED_DURATION: Duration = Duration::from_secs(7 * 86_400);

fn check_upper_bound(section: &str, name: &str, value: Duration) -> Result<()> {
    if value > MAX_CONFIGURED_DURATION {
        return Err(anyhow!(
            "{}.{} ({}s) exceeds the {}s maximum",
            section,
            name,
            value.as_secs(),
            MAX_CONFIGURED_DURATION.as_secs()
        ));
    }
    Ok(())
}

/// Timing for optimistic command handling.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandConfig {
    /// Grace period before the confirmation fetch after a command or ack.
    #[serde(default = "default_confirm_delay")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub confirm_delay: Duration,
    /// Grace period before the forced refresh after a climate power switch.
    #[serde(default = "default_power_confirm_delay")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub power_confirm_delay: Duration,
    #[serde(default = "default_climate_guard_ttl")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub climate_guard_ttl: Duration,
    #[serde(default = "default_pending_ttl")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub pending_ttl: Duration,
    #[serde(default = "default_climate_temperature")]
    pub default_climate_temperature: f64,
}

impl CommandConfig {
    pub fn validate(&self) -> Result<()> {
        if self.climate_guard_ttl.is_zero() {
            return Err(anyhow!("commands.climate_guard_ttl must be greater than zero"));
        }
        for (name, value) in [
            ("confirm_delay", self.confirm_delay),
            ("power_confirm_delay", self.power_confirm_delay),
            ("climate_guard_ttl", self.climate_guard_ttl),
            ("pending_ttl", self.pending_ttl),
        ] {
            check_upper_bound("commands", name, value)?;
        }
        if !(15.0..=31.0).contains(&self.default_climate_temperature) {
            return Err(anyhow!(
                "commands.default_climate_temperature {} outside 15..=31 °C",
                self.default_climate_temperature
            ));
        }
        Ok(())
    }
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            confirm_delay: default_confirm_delay(),
            power_confirm_delay: default_power_confirm_delay(),
            climate_guard_ttl: default_climate_guard_ttl(),
            pending_ttl: default_pending_ttl(),
            default_climate_temperature: default_climate_temperature(),
        }
    }
}

/// Log sinks and verbosity.
///
/// `components` raises or lowers individual parts of the daemon, keyed by
/// the names in [`crate::logging::COMPONENT_TARGETS`] (`telemetry = "debug"`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_directory")]
    pub directory: PathBuf,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
    #[serde(default)]
    pub file_prefix: Option<String>,
    /// Write the rolling JSON file next to stdout.
    #[serde(default = "default_true")]
    pub file: bool,
    /// Base level when neither `R_EVC_LOG` nor `RUST_LOG` is set.
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub components: IndexMap<String, String>,
}

impl LoggingConfig {
    pub fn validate(&self) -> Result<()> {
        parse_level("logging.level", &self.level)?;
        for (component, level) in &self.components {
            if crate::logging::component_target(component).is_none() {
                return Err(anyhow!(
                    "logging.components.{} is not a known component (expected one of: {})",
                    component,
                    crate::logging::component_names().join(", ")
                ));
            }
            parse_level(&format!("logging.components.{component}"), level)?;
        }
        Ok(())
    }
}

fn parse_level(key: &str, level: &str) -> Result<tracing::Level> {
    level
        .parse::<tracing::Level>()
        .map_err(|_| anyhow!("{} has invalid level {:?}", key, level))
}

fn default_log_level() -> String {
    "info".to_owned()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: default_logging_directory(),
            format: default_log_format(),
            file_prefix: None,
            file: true,
            level: default_log_level(),
            components: IndexMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_metrics_listen")]
    pub listen: SocketAddr,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            listen: default_metrics_listen(),
        }
    }
}

/// Settings for the simulated vehicle cloud used in `simulation` mode.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    #[serde(default = "default_simulation_seed")]
    pub random_seed: u64,
    #[serde(default = "default_simulated_vehicles")]
    pub vehicles: usize,
    /// Interval between unsolicited realtime pushes; absent disables pushes.
    #[serde(default = "default_push_interval_opt")]
    #[serde_as(as = "Option<DurationSeconds<u64>>")]
    pub push_interval: Option<Duration>,
    /// Probability in `0.0..=1.0` that a command reports an async cloud failure.
    #[serde(default)]
    pub soft_failure_rate: f64,
}

fn default_push_interval_opt() -> Option<Duration> {
    Some(default_push_interval())
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            random_seed: default_simulation_seed(),
            vehicles: default_simulated_vehicles(),
            push_interval: default_push_interval_opt(),
            soft_failure_rate: 0.0,
        }
    }
}
