//! ---
//! evc_section: "05-networking-external-interfaces"
//! evc_subsection: "module"
//! evc_type: "source"
//! evc_scope: "code"
//! evc_description: "Vehicle-cloud client seam and data model."
//! evc_version: "v0.0.0-prealpha"
//! evc_owner: "tbd"
//! ---
//! Parsed vehicle sub-resources as returned by the cloud.
//!
//! Every reading is optional: regions and model years expose different
//! subsets, and a missing value must never be confused with zero.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Independently fetchable sub-resource of a vehicle's state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Identity,
    Realtime,
    Climate,
    Location,
    Energy,
    Charging,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Identity => "identity",
            ResourceKind::Realtime => "realtime",
            ResourceKind::Climate => "climate",
            ResourceKind::Location => "location",
            ResourceKind::Energy => "energy",
            ResourceKind::Charging => "charging",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Static description of a vehicle registered on the account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VehicleIdentity {
    pub vin: String,
    #[serde(default)]
    pub model_name: Option<String>,
    #[serde(default)]
    pub brand_name: Option<String>,
    #[serde(default)]
    pub nickname: Option<String>,
}

impl VehicleIdentity {
    pub fn new(vin: impl Into<String>) -> Self {
        Self {
            vin: vin.into(),
            model_name: None,
            brand_name: None,
            nickname: None,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model_name = Some(model.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerGear {
    Off,
    Accessory,
    On,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockState {
    Locked,
    Unlocked,
}

/// Binary heater state (battery heat, steering wheel heat).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwitchState {
    Off,
    On,
}

impl SwitchState {
    pub fn from_bool(on: bool) -> Self {
        if on {
            SwitchState::On
        } else {
            SwitchState::Off
        }
    }

    pub fn is_on(self) -> bool {
        matches!(self, SwitchState::On)
    }
}

/// Seat heating or ventilation level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeatHeatVentState {
    /// The seat has no such function.
    Unavailable,
    Off,
    Low,
    High,
}

impl SeatHeatVentState {
    /// Whether stopping climate should force this seat back to off.
    pub fn is_active(self) -> bool {
        matches!(self, SeatHeatVentState::Low | SeatHeatVentState::High)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClimateStatus {
    Off,
    On,
}

/// Live vehicle readings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RealtimeState {
    pub elec_percent: Option<f64>,
    pub endurance_mileage: Option<f64>,
    pub total_mileage: Option<f64>,
    pub speed: Option<f64>,
    pub temp_in_car: Option<f64>,
    pub left_front_tire_pressure: Option<f64>,
    pub right_front_tire_pressure: Option<f64>,
    pub left_rear_tire_pressure: Option<f64>,
    pub right_rear_tire_pressure: Option<f64>,
    pub power_gear: Option<PowerGear>,
    pub left_front_door_lock: Option<LockState>,
    pub right_front_door_lock: Option<LockState>,
    pub left_rear_door_lock: Option<LockState>,
    pub right_rear_door_lock: Option<LockState>,
    pub battery_heat_state: Option<SwitchState>,
    /// Cloud-side capture time, epoch seconds.
    pub timestamp: Option<i64>,
    pub request_serial: Option<String>,
}

impl RealtimeState {
    pub fn is_vehicle_on(&self) -> bool {
        matches!(self.power_gear, Some(PowerGear::On))
    }

    /// `Some(true)` when every reported door is locked, `None` without door data.
    pub fn is_locked(&self) -> Option<bool> {
        let doors = [
            self.left_front_door_lock,
            self.right_front_door_lock,
            self.left_rear_door_lock,
            self.right_rear_door_lock,
        ];
        let mut seen = false;
        for door in doors.into_iter().flatten() {
            seen = true;
            if door == LockState::Unlocked {
                return Some(false);
            }
        }
        seen.then_some(true)
    }

    /// Set every door to the same lock state.
    pub fn set_all_doors(&mut self, state: LockState) {
        self.left_front_door_lock = Some(state);
        self.right_front_door_lock = Some(state);
        self.left_rear_door_lock = Some(state);
        self.right_rear_door_lock = Some(state);
    }
}

/// HVAC and seat comfort state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClimateState {
    pub status: Option<ClimateStatus>,
    pub main_setting_temp: Option<f64>,
    pub temp_out_car: Option<f64>,
    pub pm: Option<f64>,
    pub main_seat_heat_state: Option<SeatHeatVentState>,
    pub main_seat_ventilation_state: Option<SeatHeatVentState>,
    pub copilot_seat_heat_state: Option<SeatHeatVentState>,
    pub copilot_seat_ventilation_state: Option<SeatHeatVentState>,
    pub lr_seat_heat_state: Option<SeatHeatVentState>,
    pub lr_seat_ventilation_state: Option<SeatHeatVentState>,
    pub rr_seat_heat_state: Option<SeatHeatVentState>,
    pub rr_seat_ventilation_state: Option<SeatHeatVentState>,
    pub steering_wheel_heat_state: Option<SwitchState>,
    pub timestamp: Option<i64>,
}

impl ClimateState {
    pub fn is_ac_on(&self) -> bool {
        matches!(self.status, Some(ClimateStatus::On))
    }

    /// Mutable access to every seat heat/ventilation slot.
    pub fn seat_states_mut(&mut self) -> [&mut Option<SeatHeatVentState>; 8] {
        [
            &mut self.main_seat_heat_state,
            &mut self.main_seat_ventilation_state,
            &mut self.copilot_seat_heat_state,
            &mut self.copilot_seat_ventilation_state,
            &mut self.lr_seat_heat_state,
            &mut self.lr_seat_ventilation_state,
            &mut self.rr_seat_heat_state,
            &mut self.rr_seat_ventilation_state,
        ]
    }
}

/// GPS fix. Coordinates are optional because the cloud sometimes omits them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocationFix {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub speed: Option<f64>,
    pub direction: Option<f64>,
    pub gps_timestamp: Option<i64>,
}

impl LocationFix {
    pub fn at(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude: Some(latitude),
            longitude: Some(longitude),
            ..Self::default()
        }
    }

    pub fn coordinates(&self) -> Option<(f64, f64)> {
        Some((self.latitude?, self.longitude?))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnergyState {
    pub total_energy: Option<f64>,
    pub avg_energy_consumption: Option<f64>,
    pub electricity_consumption: Option<f64>,
    pub timestamp: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChargingState {
    pub soc: Option<f64>,
    pub is_connected: Option<bool>,
    pub is_charging: Option<bool>,
    /// Remaining time to full, hour component.
    pub full_hour: Option<u32>,
    pub full_minute: Option<u32>,
    pub timestamp: Option<i64>,
}
