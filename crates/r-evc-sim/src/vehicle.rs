//! ---
//! evc_section: "11-simulation"
//! evc_subsection: "module"
//! evc_type: "source"
//! evc_scope: "code"
//! evc_description: "Simulated vehicle state and telemetry synthesis."
//! evc_version: "v0.0.0-prealpha"
//! evc_owner: "tbd"
//! ---
use r_evc_client::{
    BatteryHeatParams, ChargingState, ClimateParams, ClimateState, ClimateStatus, EnergyState,
    LocationFix, LockState, PowerGear, RealtimeState, SeatClimateParams, SeatHeatVentState,
    SwitchState, VehicleIdentity,
};

const FULL_RANGE_KM: f64 = 420.0;
const MIN_CABIN_TEMP: f64 = 15.0;
const MAX_CABIN_TEMP: f64 = 31.0;

/// Mutable state of one simulated vehicle.
#[derive(Debug, Clone)]
pub struct SimVehicle {
    pub identity: VehicleIdentity,
    pub soc: f64,
    pub odometer_km: f64,
    pub speed_kmh: f64,
    pub cabin_temp: f64,
    pub outside_temp: f64,
    pub powered: bool,
    pub locked: bool,
    pub climate_on: bool,
    pub target_temp: f64,
    pub seats: ClimateState,
    pub battery_heat: bool,
    pub plugged_in: bool,
    pub latitude: f64,
    pub longitude: f64,
    pub heading: f64,
    pub trip_energy_kwh: f64,
}

impl SimVehicle {
    pub fn new(index: usize, outside_temp: f64) -> Self {
        let vin = format!("LSIMEVC{:010}", index + 1);
        let model = if index % 2 == 0 { "Atto 3" } else { "Seal" };
        let seats = ClimateState {
            main_seat_heat_state: Some(SeatHeatVentState::Off),
            main_seat_ventilation_state: Some(SeatHeatVentState::Off),
            copilot_seat_heat_state: Some(SeatHeatVentState::Off),
            copilot_seat_ventilation_state: Some(SeatHeatVentState::Off),
            lr_seat_heat_state: Some(SeatHeatVentState::Unavailable),
            lr_seat_ventilation_state: Some(SeatHeatVentState::Unavailable),
            rr_seat_heat_state: Some(SeatHeatVentState::Unavailable),
            rr_seat_ventilation_state: Some(SeatHeatVentState::Unavailable),
            steering_wheel_heat_state: Some(SwitchState::Off),
            ..ClimateState::default()
        };
        Self {
            identity: VehicleIdentity::new(vin).with_model(model),
            soc: 80.0 - 7.5 * (index % 5) as f64,
            odometer_km: 12_000.0 + 1_850.0 * index as f64,
            speed_kmh: 0.0,
            cabin_temp: outside_temp + 2.0,
            outside_temp,
            powered: false,
            locked: true,
            climate_on: false,
            target_temp: 21.0,
            seats,
            battery_heat: false,
            plugged_in: index % 3 == 2,
            latitude: 22.543 + 0.01 * index as f64,
            longitude: 114.057 - 0.01 * index as f64,
            heading: 90.0,
            trip_energy_kwh: 0.0,
        }
    }

    pub fn vin(&self) -> &str {
        &self.identity.vin
    }

    /// Advance one simulation step. `noise` is a unit-scale random sample.
    pub fn step(&mut self, noise: f64) {
        if self.powered {
            self.speed_kmh = (self.speed_kmh + 8.0 * noise).clamp(0.0, 120.0);
            let distance_km = self.speed_kmh / 60.0;
            self.odometer_km += distance_km;
            let used_kwh = distance_km * 0.16;
            self.trip_energy_kwh += used_kwh;
            self.soc = (self.soc - used_kwh / 0.6).max(0.0);
            self.heading = (self.heading + 15.0 * noise).rem_euclid(360.0);
            let radians = self.heading.to_radians();
            self.latitude += distance_km / 111.0 * radians.cos();
            self.longitude += distance_km / 111.0 * radians.sin();
        } else {
            self.speed_kmh = 0.0;
            if self.plugged_in && self.soc < 100.0 {
                self.soc = (self.soc + 0.5).min(100.0);
            }
        }
        let target = if self.climate_on {
            self.target_temp
        } else {
            self.outside_temp
        };
        self.cabin_temp += (target - self.cabin_temp) * 0.2 + 0.1 * noise;
        self.outside_temp += 0.05 * noise;
    }

    pub fn realtime(&self, timestamp: i64) -> RealtimeState {
        let door = if self.locked {
            LockState::Locked
        } else {
            LockState::Unlocked
        };
        let mut realtime = RealtimeState {
            elec_percent: Some(round1(self.soc)),
            endurance_mileage: Some((self.soc / 100.0 * FULL_RANGE_KM).round()),
            total_mileage: Some(self.odometer_km.round()),
            speed: Some(round1(self.speed_kmh)),
            temp_in_car: Some(round1(self.cabin_temp)),
            left_front_tire_pressure: Some(2.5),
            right_front_tire_pressure: Some(2.5),
            left_rear_tire_pressure: Some(2.4),
            right_rear_tire_pressure: Some(2.4),
            power_gear: Some(if self.powered {
                PowerGear::On
            } else {
                PowerGear::Off
            }),
            battery_heat_state: Some(SwitchState::from_bool(self.battery_heat)),
            timestamp: Some(timestamp),
            ..RealtimeState::default()
        };
        realtime.set_all_doors(door);
        realtime
    }

    pub fn climate(&self, timestamp: i64) -> ClimateState {
        ClimateState {
            status: Some(if self.climate_on {
                ClimateStatus::On
            } else {
                ClimateStatus::Off
            }),
            main_setting_temp: Some(self.target_temp),
            temp_out_car: Some(round1(self.outside_temp)),
            pm: Some(18.0),
            timestamp: Some(timestamp),
            ..self.seats.clone()
        }
    }

    pub fn location(&self, timestamp: i64) -> LocationFix {
        LocationFix {
            speed: Some(round1(self.speed_kmh)),
            direction: Some(self.heading.round()),
            gps_timestamp: Some(timestamp),
            ..LocationFix::at(self.latitude, self.longitude)
        }
    }

    pub fn energy(&self, timestamp: i64) -> EnergyState {
        let avg = if self.trip_energy_kwh > 0.0 {
            16.0 + self.trip_energy_kwh.fract()
        } else {
            15.8
        };
        EnergyState {
            total_energy: Some(round1(self.trip_energy_kwh)),
            avg_energy_consumption: Some(round1(avg)),
            electricity_consumption: Some(round1(self.trip_energy_kwh)),
            timestamp: Some(timestamp),
        }
    }

    pub fn charging(&self, timestamp: i64) -> ChargingState {
        let charging = self.plugged_in && !self.powered && self.soc < 100.0;
        let minutes_to_full = if charging {
            ((100.0 - self.soc) * 2.4).round() as u32
        } else {
            0
        };
        ChargingState {
            soc: Some(round1(self.soc)),
            is_connected: Some(self.plugged_in),
            is_charging: Some(charging),
            full_hour: Some(minutes_to_full / 60),
            full_minute: Some(minutes_to_full % 60),
            timestamp: Some(timestamp),
        }
    }

    pub fn start_climate(&mut self, params: &ClimateParams) {
        self.climate_on = true;
        if let Some(temperature) = params.temperature {
            self.target_temp = temperature.clamp(MIN_CABIN_TEMP, MAX_CABIN_TEMP);
        }
    }

    /// Switching HVAC off also drops active seat and wheel functions.
    pub fn stop_climate(&mut self) {
        self.climate_on = false;
        for slot in self.seats.seat_states_mut() {
            if slot.is_some_and(SeatHeatVentState::is_active) {
                *slot = Some(SeatHeatVentState::Off);
            }
        }
        if self.seats.steering_wheel_heat_state == Some(SwitchState::On) {
            self.seats.steering_wheel_heat_state = Some(SwitchState::Off);
        }
    }

    pub fn set_seats(&mut self, params: &SeatClimateParams) {
        let requested = [
            params.main_heat,
            params.main_ventilation,
            params.copilot_heat,
            params.copilot_ventilation,
            params.lr_heat,
            params.lr_ventilation,
            params.rr_heat,
            params.rr_ventilation,
        ];
        for (slot, level) in self.seats.seat_states_mut().into_iter().zip(requested) {
            // Rear seats without the option stay unavailable.
            if let Some(level) = level {
                if *slot != Some(SeatHeatVentState::Unavailable) {
                    *slot = Some(level);
                }
            }
        }
        if let Some(state) = params.steering_wheel_heat {
            self.seats.steering_wheel_heat_state = Some(state);
        }
    }

    pub fn set_battery_heat(&mut self, params: &BatteryHeatParams) {
        self.battery_heat = params.on;
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vins_are_seventeen_characters() {
        let vehicle = SimVehicle::new(41, 12.0);
        assert_eq!(vehicle.vin().len(), 17);
        assert_eq!(vehicle.vin(), "LSIMEVC0000000042");
    }

    #[test]
    fn stop_climate_resets_comfort_functions() {
        let mut vehicle = SimVehicle::new(0, 5.0);
        vehicle.start_climate(&ClimateParams {
            temperature: Some(40.0),
            duration_minutes: None,
        });
        assert_eq!(vehicle.target_temp, MAX_CABIN_TEMP);
        vehicle.set_seats(&SeatClimateParams {
            main_heat: Some(SeatHeatVentState::High),
            rr_heat: Some(SeatHeatVentState::High),
            steering_wheel_heat: Some(SwitchState::On),
            ..SeatClimateParams::default()
        });
        let climate = vehicle.climate(0);
        assert_eq!(climate.main_seat_heat_state, Some(SeatHeatVentState::High));
        assert_eq!(climate.rr_seat_heat_state, Some(SeatHeatVentState::Unavailable));

        vehicle.stop_climate();
        let climate = vehicle.climate(0);
        assert!(!climate.is_ac_on());
        assert_eq!(climate.main_seat_heat_state, Some(SeatHeatVentState::Off));
        assert_eq!(climate.steering_wheel_heat_state, Some(SwitchState::Off));
    }

    #[test]
    fn driving_moves_and_discharges() {
        let mut vehicle = SimVehicle::new(0, 15.0);
        vehicle.powered = true;
        vehicle.speed_kmh = 60.0;
        let start = vehicle.location(0).coordinates();
        let soc = vehicle.soc;
        vehicle.step(0.0);
        assert!(vehicle.soc < soc);
        assert_ne!(vehicle.location(0).coordinates(), start);
        assert!(vehicle.realtime(0).is_vehicle_on());
    }
}
