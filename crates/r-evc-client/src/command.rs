//! ---
//! evc_section: "05-networking-external-interfaces"
//! evc_subsection: "module"
//! evc_type: "source"
//! evc_scope: "code"
//! evc_description: "Vehicle-cloud client seam and data model."
//! evc_version: "v0.0.0-prealpha"
//! evc_owner: "tbd"
//! ---
//! Remote commands and their parameters.

use serde::{Deserialize, Serialize};

use crate::api::VehicleApi;
use crate::error::ApiResult;
use crate::models::{ResourceKind, SeatHeatVentState, SwitchState};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClimateParams {
    /// Cabin target temperature in °C.
    pub temperature: Option<f64>,
    pub duration_minutes: Option<u32>,
}

/// Seat and steering-wheel comfort settings. `None` leaves a slot untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SeatClimateParams {
    pub main_heat: Option<SeatHeatVentState>,
    pub main_ventilation: Option<SeatHeatVentState>,
    pub copilot_heat: Option<SeatHeatVentState>,
    pub copilot_ventilation: Option<SeatHeatVentState>,
    pub lr_heat: Option<SeatHeatVentState>,
    pub lr_ventilation: Option<SeatHeatVentState>,
    pub rr_heat: Option<SeatHeatVentState>,
    pub rr_ventilation: Option<SeatHeatVentState>,
    pub steering_wheel_heat: Option<SwitchState>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatteryHeatParams {
    pub on: bool,
}

/// A user-issued remote command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum VehicleCommand {
    Lock,
    Unlock,
    StartClimate(ClimateParams),
    StopClimate,
    SetSeatClimate(SeatClimateParams),
    SetBatteryHeat(BatteryHeatParams),
}

impl VehicleCommand {
    pub fn name(&self) -> &'static str {
        match self {
            VehicleCommand::Lock => "lock",
            VehicleCommand::Unlock => "unlock",
            VehicleCommand::StartClimate(_) => "start_climate",
            VehicleCommand::StopClimate => "stop_climate",
            VehicleCommand::SetSeatClimate(_) => "set_seat_climate",
            VehicleCommand::SetBatteryHeat(_) => "set_battery_heat",
        }
    }

    /// Resource kinds whose cached values this command is expected to change.
    pub fn affected_resources(&self) -> &'static [ResourceKind] {
        match self {
            VehicleCommand::Lock | VehicleCommand::Unlock | VehicleCommand::SetBatteryHeat(_) => {
                &[ResourceKind::Realtime]
            }
            VehicleCommand::StartClimate(_)
            | VehicleCommand::StopClimate
            | VehicleCommand::SetSeatClimate(_) => &[ResourceKind::Climate],
        }
    }

    /// Expected HVAC power after the command, for power-switching commands only.
    pub fn climate_power(&self) -> Option<bool> {
        match self {
            VehicleCommand::StartClimate(_) => Some(true),
            VehicleCommand::StopClimate => Some(false),
            _ => None,
        }
    }

    pub fn affects_climate(&self) -> bool {
        self.affected_resources().contains(&ResourceKind::Climate)
    }

    /// Issue the command through `api`.
    pub async fn invoke(&self, api: &dyn VehicleApi, vin: &str) -> ApiResult<()> {
        match self {
            VehicleCommand::Lock => api.lock(vin).await,
            VehicleCommand::Unlock => api.unlock(vin).await,
            VehicleCommand::StartClimate(params) => api.start_climate(vin, params).await,
            VehicleCommand::StopClimate => api.stop_climate(vin).await,
            VehicleCommand::SetSeatClimate(params) => api.set_seat_climate(vin, params).await,
            VehicleCommand::SetBatteryHeat(params) => api.set_battery_heat(vin, params).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn climate_commands_target_climate() {
        let start = VehicleCommand::StartClimate(ClimateParams::default());
        assert!(start.affects_climate());
        assert_eq!(start.climate_power(), Some(true));
        assert_eq!(VehicleCommand::StopClimate.climate_power(), Some(false));
        let seats = VehicleCommand::SetSeatClimate(SeatClimateParams::default());
        assert!(seats.affects_climate());
        assert_eq!(seats.climate_power(), None);
    }

    #[test]
    fn body_commands_target_realtime() {
        assert_eq!(
            VehicleCommand::Lock.affected_resources(),
            &[ResourceKind::Realtime]
        );
        let heat = VehicleCommand::SetBatteryHeat(BatteryHeatParams { on: true });
        assert!(!heat.affects_climate());
        assert_eq!(heat.name(), "set_battery_heat");
    }
}
