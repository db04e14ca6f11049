//! ---
//! evc_section: "05-networking-external-interfaces"
//! evc_subsection: "module"
//! evc_type: "source"
//! evc_scope: "code"
//! evc_description: "Vehicle-cloud client seam and data model."
//! evc_version: "v0.0.0-prealpha"
//! evc_owner: "tbd"
//! ---
use std::sync::Arc;

use async_trait::async_trait;

use crate::command::{BatteryHeatParams, ClimateParams, SeatClimateParams};
use crate::error::ApiResult;
use crate::models::{
    ChargingState, ClimateState, EnergyState, LocationFix, RealtimeState, VehicleIdentity,
};

/// Typed operations offered by a vehicle cloud for one authenticated account.
#[async_trait]
pub trait VehicleApi: Send + Sync + 'static {
    async fn get_vehicles(&self) -> ApiResult<Vec<VehicleIdentity>>;

    async fn get_realtime(&self, vin: &str) -> ApiResult<RealtimeState>;

    async fn get_climate_status(&self, vin: &str) -> ApiResult<ClimateState>;

    async fn get_location(&self, vin: &str) -> ApiResult<LocationFix>;

    async fn get_energy(&self, vin: &str) -> ApiResult<EnergyState>;

    async fn get_charging_status(&self, vin: &str) -> ApiResult<ChargingState>;

    async fn lock(&self, vin: &str) -> ApiResult<()>;

    async fn unlock(&self, vin: &str) -> ApiResult<()>;

    async fn start_climate(&self, vin: &str, params: &ClimateParams) -> ApiResult<()>;

    async fn stop_climate(&self, vin: &str) -> ApiResult<()>;

    async fn set_seat_climate(&self, vin: &str, params: &SeatClimateParams) -> ApiResult<()>;

    async fn set_battery_heat(&self, vin: &str, params: &BatteryHeatParams) -> ApiResult<()>;

    /// Release the underlying connection. Further calls may fail.
    async fn close(&self) {}
}

/// Factory creating authenticated clients on demand.
///
/// [`ApiSession`](crate::ApiSession) calls it lazily on first use and again
/// after a client has been invalidated.
#[async_trait]
pub trait VehicleConnector: Send + Sync + 'static {
    async fn connect(&self) -> ApiResult<Arc<dyn VehicleApi>>;
}
