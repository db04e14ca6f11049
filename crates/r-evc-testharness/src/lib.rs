//! ---
//! evc_section: "11-simulation"
//! evc_subsection: "01-bootstrap"
//! evc_type: "source"
//! evc_scope: "code"
//! evc_description: "Scripted vehicle-cloud doubles and shared fixtures."
//! evc_version: "v0.1.0"
//! evc_owner: "tbd"
//! ---
//! Deterministic stand-ins for the remote vehicle cloud.
//!
//! [`ScriptedVehicleApi`] answers every endpoint from a per-endpoint
//! [`Script`]: queued one-shot results are consumed first, then a sticky
//! default is repeated. Unscripted endpoints fail with an `Api` error so a
//! test notices calls it did not expect. [`Script::hold`] parks the next
//! call mid-flight so tests can interleave work with an in-progress request.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use r_evc_client::{
    ApiError, ApiResult, ApiSession, BatteryHeatParams, ChargingState, ClimateParams,
    ClimateState, ClimateStatus, EnergyState, LocationFix, LockState, PowerGear, RealtimeState,
    SeatClimateParams, VehicleApi, VehicleConnector, VehicleIdentity,
};
use tokio::sync::Notify;
use tracing::trace;

/// Scripted responses for a single endpoint.
#[derive(Debug)]
pub struct Script<T> {
    queue: Mutex<VecDeque<ApiResult<T>>>,
    sticky: Mutex<Option<ApiResult<T>>>,
    hold: Mutex<Option<Arc<Notify>>>,
    calls: AtomicUsize,
}

impl<T> Default for Script<T> {
    fn default() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            sticky: Mutex::new(None),
            hold: Mutex::new(None),
            calls: AtomicUsize::new(0),
        }
    }
}

impl<T: Clone> Script<T> {
    /// Queue a one-shot result.
    pub fn push(&self, result: ApiResult<T>) -> &Self {
        self.queue.lock().push_back(result);
        self
    }

    pub fn push_ok(&self, value: T) -> &Self {
        self.push(Ok(value))
    }

    pub fn push_err(&self, err: ApiError) -> &Self {
        self.push(Err(err))
    }

    /// Result returned whenever the queue is empty.
    pub fn set(&self, result: ApiResult<T>) -> &Self {
        *self.sticky.lock() = Some(result);
        self
    }

    pub fn set_ok(&self, value: T) -> &Self {
        self.set(Ok(value))
    }

    pub fn set_err(&self, err: ApiError) -> &Self {
        self.set(Err(err))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Park the next call after it is counted, until the returned handle is notified.
    pub fn hold(&self) -> Arc<Notify> {
        let release = Arc::new(Notify::new());
        *self.hold.lock() = Some(release.clone());
        release
    }

    async fn next_async(&self, endpoint: &str) -> ApiResult<T> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let hold = self.hold.lock().take();
        if let Some(release) = hold {
            trace!(endpoint, "scripted call held");
            release.notified().await;
        }
        self.resolve(endpoint)
    }

    fn next(&self, endpoint: &str) -> ApiResult<T> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.resolve(endpoint)
    }

    fn resolve(&self, endpoint: &str) -> ApiResult<T> {
        if let Some(result) = self.queue.lock().pop_front() {
            return result;
        }
        match self.sticky.lock().as_ref() {
            Some(result) => result.clone(),
            None => Err(ApiError::api("unscripted", format!("{endpoint} not scripted"))),
        }
    }
}

/// In-memory [`VehicleApi`] driven entirely by test scripts.
#[derive(Debug, Default)]
pub struct ScriptedVehicleApi {
    pub vehicles: Script<Vec<VehicleIdentity>>,
    pub realtime: Script<RealtimeState>,
    pub climate: Script<ClimateState>,
    pub location: Script<LocationFix>,
    pub energy: Script<EnergyState>,
    pub charging: Script<ChargingState>,
    /// Shared by every command endpoint.
    pub commands: Script<()>,
    issued: Mutex<Vec<String>>,
    closed: AtomicUsize,
}

impl ScriptedVehicleApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Names of the commands issued so far, in order.
    pub fn issued_commands(&self) -> Vec<String> {
        self.issued.lock().clone()
    }

    pub fn close_calls(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    fn command(&self, name: &str) -> ApiResult<()> {
        self.issued.lock().push(name.to_owned());
        self.commands.next(name)
    }
}

#[async_trait]
impl VehicleApi for ScriptedVehicleApi {
    async fn get_vehicles(&self) -> ApiResult<Vec<VehicleIdentity>> {
        self.vehicles.next("get_vehicles")
    }

    async fn get_realtime(&self, vin: &str) -> ApiResult<RealtimeState> {
        trace!(vin, "scripted realtime");
        self.realtime.next_async("get_realtime").await
    }

    async fn get_climate_status(&self, _vin: &str) -> ApiResult<ClimateState> {
        self.climate.next_async("get_climate_status").await
    }

    async fn get_location(&self, _vin: &str) -> ApiResult<LocationFix> {
        self.location.next_async("get_location").await
    }

    async fn get_energy(&self, _vin: &str) -> ApiResult<EnergyState> {
        self.energy.next_async("get_energy").await
    }

    async fn get_charging_status(&self, _vin: &str) -> ApiResult<ChargingState> {
        self.charging.next_async("get_charging_status").await
    }

    async fn lock(&self, _vin: &str) -> ApiResult<()> {
        self.command("lock")
    }

    async fn unlock(&self, _vin: &str) -> ApiResult<()> {
        self.command("unlock")
    }

    async fn start_climate(&self, _vin: &str, _params: &ClimateParams) -> ApiResult<()> {
        self.command("start_climate")
    }

    async fn stop_climate(&self, _vin: &str) -> ApiResult<()> {
        self.command("stop_climate")
    }

    async fn set_seat_climate(&self, _vin: &str, _params: &SeatClimateParams) -> ApiResult<()> {
        self.command("set_seat_climate")
    }

    async fn set_battery_heat(&self, _vin: &str, _params: &BatteryHeatParams) -> ApiResult<()> {
        self.command("set_battery_heat")
    }

    async fn close(&self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Connector handing out the same scripted client, counting connections.
#[derive(Debug)]
pub struct ScriptedConnector {
    api: Arc<ScriptedVehicleApi>,
    failures: Mutex<VecDeque<ApiError>>,
    connects: AtomicUsize,
}

impl ScriptedConnector {
    pub fn new(api: Arc<ScriptedVehicleApi>) -> Arc<Self> {
        Arc::new(Self {
            api,
            failures: Mutex::new(VecDeque::new()),
            connects: AtomicUsize::new(0),
        })
    }

    /// Make the next connection attempt fail with `err`.
    pub fn fail_next(&self, err: ApiError) {
        self.failures.lock().push_back(err);
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VehicleConnector for ScriptedConnector {
    async fn connect(&self) -> ApiResult<Arc<dyn VehicleApi>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.failures.lock().pop_front() {
            return Err(err);
        }
        let api: Arc<dyn VehicleApi> = self.api.clone();
        Ok(api)
    }
}

/// Scripted client, its connector, and a session over both.
pub struct Harness {
    pub api: Arc<ScriptedVehicleApi>,
    pub connector: Arc<ScriptedConnector>,
    pub session: Arc<ApiSession>,
}

impl Harness {
    pub fn new() -> Self {
        let api = ScriptedVehicleApi::new();
        let connector = ScriptedConnector::new(api.clone());
        let session = Arc::new(ApiSession::new(connector.clone()));
        Self {
            api,
            connector,
            session,
        }
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

/// Realtime reading for a parked vehicle with locked doors.
pub fn realtime_off() -> RealtimeState {
    let mut realtime = RealtimeState {
        elec_percent: Some(72.0),
        endurance_mileage: Some(310.0),
        total_mileage: Some(18_250.0),
        speed: Some(0.0),
        temp_in_car: Some(18.5),
        power_gear: Some(PowerGear::Off),
        timestamp: Some(1_700_000_000),
        ..RealtimeState::default()
    };
    realtime.set_all_doors(LockState::Locked);
    realtime
}

/// Realtime reading for a vehicle that is switched on.
pub fn realtime_on() -> RealtimeState {
    RealtimeState {
        power_gear: Some(PowerGear::On),
        ..realtime_off()
    }
}

pub fn climate(on: bool, temperature: f64) -> ClimateState {
    ClimateState {
        status: Some(if on {
            ClimateStatus::On
        } else {
            ClimateStatus::Off
        }),
        main_setting_temp: Some(temperature),
        temp_out_car: Some(9.0),
        pm: Some(12.0),
        timestamp: Some(1_700_000_000),
        ..ClimateState::default()
    }
}

pub fn fix(latitude: f64, longitude: f64) -> LocationFix {
    LocationFix {
        gps_timestamp: Some(1_700_000_000),
        ..LocationFix::at(latitude, longitude)
    }
}

pub fn identity(vin: &str) -> VehicleIdentity {
    VehicleIdentity::new(vin).with_model("Atto 3")
}
