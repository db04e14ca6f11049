//! ---
//! evc_section: "11-simulation"
//! evc_subsection: "module"
//! evc_type: "source"
//! evc_scope: "code"
//! evc_description: "Simulated vehicle cloud implementing the client seam."
//! evc_version: "v0.0.0-prealpha"
//! evc_owner: "tbd"
//! ---
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use indexmap::IndexMap;
use parking_lot::Mutex;
use r_evc_client::{
    ApiError, ApiResult, BatteryHeatParams, ChargingState, ClimateParams, ClimateState,
    EnergyState, LocationFix, PushEvent, PushSender, RealtimeState, SeatClimateParams,
    VehicleApi, VehicleConnector, VehicleIdentity,
};
use r_evc_common::config::SimulationConfig;
use rand::prelude::*;
use rand_distr::Normal;
use serde_json::json;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::vehicle::SimVehicle;

const OUTSIDE_TEMP_C: f64 = 12.0;
/// Chance per step that a vehicle is switched on or off.
const POWER_TOGGLE_PROBABILITY: f64 = 0.08;

/// In-process vehicle cloud driven by a seeded RNG.
#[derive(Debug)]
pub struct SimulatedVehicleCloud {
    vehicles: Mutex<IndexMap<String, SimVehicle>>,
    rng: Mutex<StdRng>,
    noise: Normal<f64>,
    soft_failure_rate: f64,
    push: Mutex<Option<PushSender>>,
}

impl SimulatedVehicleCloud {
    pub fn new(config: &SimulationConfig) -> Result<Arc<Self>> {
        let vehicles = (0..config.vehicles)
            .map(|index| {
                let vehicle = SimVehicle::new(index, OUTSIDE_TEMP_C);
                (vehicle.vin().to_owned(), vehicle)
            })
            .collect();
        let noise =
            Normal::new(0.0, 1.0).map_err(|err| anyhow!("invalid simulation noise: {err}"))?;
        info!(
            vehicles = config.vehicles,
            seed = config.random_seed,
            soft_failure_rate = config.soft_failure_rate,
            "simulated vehicle cloud created"
        );
        Ok(Arc::new(Self {
            vehicles: Mutex::new(vehicles),
            rng: Mutex::new(StdRng::seed_from_u64(config.random_seed)),
            noise,
            soft_failure_rate: config.soft_failure_rate.clamp(0.0, 1.0),
            push: Mutex::new(None),
        }))
    }

    /// Route command acknowledgements to `sender`.
    pub fn attach_push(&self, sender: PushSender) {
        *self.push.lock() = Some(sender);
    }

    pub fn vins(&self) -> Vec<String> {
        self.vehicles.lock().keys().cloned().collect()
    }

    /// Switch a vehicle on or off outside the random walk.
    pub fn set_powered(&self, vin: &str, powered: bool) -> bool {
        match self.vehicles.lock().get_mut(vin) {
            Some(vehicle) => {
                vehicle.powered = powered;
                true
            }
            None => false,
        }
    }

    /// Advance every vehicle by one step.
    pub fn tick(&self) {
        let mut rng = self.rng.lock();
        let mut vehicles = self.vehicles.lock();
        for vehicle in vehicles.values_mut() {
            if rng.gen_bool(POWER_TOGGLE_PROBABILITY) {
                vehicle.powered = !vehicle.powered;
                debug!(vin = vehicle.vin(), powered = vehicle.powered, "simulated power toggle");
            }
            let sample = self.noise.sample(&mut *rng);
            vehicle.step(sample);
        }
    }

    /// Current realtime for every vehicle, as pushed by the cloud.
    pub fn realtime_events(&self) -> Vec<PushEvent> {
        let now = timestamp();
        self.vehicles
            .lock()
            .values()
            .map(|vehicle| PushEvent::VehicleInfo {
                vin: vehicle.vin().to_owned(),
                realtime: vehicle.realtime(now),
            })
            .collect()
    }

    fn read<T>(&self, vin: &str, f: impl FnOnce(&SimVehicle, i64) -> T) -> ApiResult<T> {
        let vehicles = self.vehicles.lock();
        let vehicle = vehicles.get(vin).ok_or_else(|| unknown_vehicle(vin))?;
        Ok(f(vehicle, timestamp()))
    }

    /// Apply a command, acknowledge it on the push channel and roll the
    /// soft-failure dice. The state change applies either way.
    fn command(&self, vin: &str, name: &str, f: impl FnOnce(&mut SimVehicle)) -> ApiResult<()> {
        {
            let mut vehicles = self.vehicles.lock();
            let vehicle = vehicles.get_mut(vin).ok_or_else(|| unknown_vehicle(vin))?;
            f(vehicle);
        }
        self.acknowledge(vin, name);
        if self.rng.lock().gen_bool(self.soft_failure_rate) {
            debug!(vin, command = name, "simulated soft failure");
            return Err(ApiError::RemoteControlSoftFailure(format!(
                "{name} result not confirmed by vehicle"
            )));
        }
        Ok(())
    }

    fn acknowledge(&self, vin: &str, name: &str) {
        let Some(sender) = self.push.lock().clone() else {
            return;
        };
        let event = PushEvent::CommandAck {
            vin: vin.to_owned(),
            command: name.to_owned(),
            payload: json!({ "controlState": 1, "requestSerial": timestamp() }),
        };
        if let Err(err) = sender.try_send(event) {
            warn!(vin, command = name, error = %err, "command acknowledgement dropped");
        }
    }
}

fn timestamp() -> i64 {
    chrono::Utc::now().timestamp()
}

fn unknown_vehicle(vin: &str) -> ApiError {
    ApiError::api("1002", format!("vehicle {vin} not on this account"))
}

#[async_trait]
impl VehicleApi for SimulatedVehicleCloud {
    async fn get_vehicles(&self) -> ApiResult<Vec<VehicleIdentity>> {
        Ok(self
            .vehicles
            .lock()
            .values()
            .map(|vehicle| vehicle.identity.clone())
            .collect())
    }

    async fn get_realtime(&self, vin: &str) -> ApiResult<RealtimeState> {
        self.read(vin, |vehicle, now| vehicle.realtime(now))
    }

    async fn get_climate_status(&self, vin: &str) -> ApiResult<ClimateState> {
        self.read(vin, |vehicle, now| vehicle.climate(now))
    }

    async fn get_location(&self, vin: &str) -> ApiResult<LocationFix> {
        self.read(vin, |vehicle, now| vehicle.location(now))
    }

    async fn get_energy(&self, vin: &str) -> ApiResult<EnergyState> {
        self.read(vin, |vehicle, now| vehicle.energy(now))
    }

    async fn get_charging_status(&self, vin: &str) -> ApiResult<ChargingState> {
        self.read(vin, |vehicle, now| vehicle.charging(now))
    }

    async fn lock(&self, vin: &str) -> ApiResult<()> {
        self.command(vin, "lock", |vehicle| vehicle.locked = true)
    }

    async fn unlock(&self, vin: &str) -> ApiResult<()> {
        self.command(vin, "unlock", |vehicle| vehicle.locked = false)
    }

    async fn start_climate(&self, vin: &str, params: &ClimateParams) -> ApiResult<()> {
        self.command(vin, "start_climate", |vehicle| vehicle.start_climate(params))
    }

    async fn stop_climate(&self, vin: &str) -> ApiResult<()> {
        self.command(vin, "stop_climate", SimVehicle::stop_climate)
    }

    async fn set_seat_climate(&self, vin: &str, params: &SeatClimateParams) -> ApiResult<()> {
        self.command(vin, "set_seat_climate", |vehicle| vehicle.set_seats(params))
    }

    async fn set_battery_heat(&self, vin: &str, params: &BatteryHeatParams) -> ApiResult<()> {
        self.command(vin, "set_battery_heat", |vehicle| {
            vehicle.set_battery_heat(params)
        })
    }

    async fn close(&self) {
        debug!("simulated vehicle cloud session closed");
    }
}

/// Connector handing out the shared simulated cloud.
#[derive(Debug, Clone)]
pub struct SimulatedConnector {
    cloud: Arc<SimulatedVehicleCloud>,
}

impl SimulatedConnector {
    pub fn new(cloud: Arc<SimulatedVehicleCloud>) -> Self {
        Self { cloud }
    }
}

#[async_trait]
impl VehicleConnector for SimulatedConnector {
    async fn connect(&self) -> ApiResult<Arc<dyn VehicleApi>> {
        let api: Arc<dyn VehicleApi> = self.cloud.clone();
        Ok(api)
    }
}

/// Step the simulation every `interval` and push each vehicle's realtime.
pub fn spawn_push_loop(
    cloud: Arc<SimulatedVehicleCloud>,
    sender: PushSender,
    interval: Duration,
    mut shutdown: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    debug!("simulation push loop shutdown signal received");
                    break;
                }
                _ = ticker.tick() => {
                    cloud.tick();
                    for event in cloud.realtime_events() {
                        if sender.send(event).await.is_err() {
                            debug!("push receiver closed; stopping simulation loop");
                            return;
                        }
                    }
                }
            }
        }
    })
}
