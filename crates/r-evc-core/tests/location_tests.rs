//! ---
//! evc_section: "01-core-functionality"
//! evc_subsection: "tests"
//! evc_type: "source"
//! evc_scope: "code"
//! evc_description: "Location plausibility filtering and power-aware intervals."
//! evc_version: "v0.0.0-prealpha"
//! evc_owner: "tbd"
//! ---
use std::sync::Arc;
use std::time::Duration;

use r_evc_client::{ApiError, LocationFix, ResourceKind};
use r_evc_core::{
    CoordinatorError, DispatchSettings, LocationSettings, TelemetrySettings, VehicleCoordinators,
};
use r_evc_testharness::{climate, fix, identity, realtime_off, realtime_on, Harness};

const VIN: &str = "LGXCE4CB0N0000002";

fn vehicle(h: &Harness, location: LocationSettings) -> Arc<VehicleCoordinators> {
    Arc::new(VehicleCoordinators::with_settings(
        identity(VIN),
        h.session.clone(),
        TelemetrySettings {
            fetch_energy: false,
            fetch_charging: false,
            ..TelemetrySettings::default()
        },
        location,
        DispatchSettings::default(),
        None,
    ))
}

#[tokio::test]
async fn null_island_fix_keeps_previous_location() {
    let h = Harness::new();
    h.api.location.push_ok(fix(31.23, 121.47));
    h.api.location.push_ok(fix(0.01, 0.02));
    h.api.location.push_ok(LocationFix::default());
    let v = vehicle(&h, LocationSettings::default());

    v.location.refresh(false).await.expect("first fix");
    v.location.refresh(false).await.expect("implausible fix");
    v.location.refresh(false).await.expect("empty fix");

    let kept = v.cache.location().expect("location cached");
    assert_eq!(kept.coordinates(), Some((31.23, 121.47)));
}

#[tokio::test]
async fn first_fix_is_accepted_even_near_zero() {
    let h = Harness::new();
    h.api.location.set_ok(fix(0.05, 0.05));
    let v = vehicle(&h, LocationSettings::default());

    v.location.refresh(false).await.expect("first fix");
    assert!(v.cache.location().is_some());
}

#[tokio::test]
async fn failure_without_cached_fix_fails_the_cycle() {
    let h = Harness::new();
    h.api
        .location
        .set_err(ApiError::Transport("gps gateway timeout".into()));
    let v = vehicle(&h, LocationSettings::default());

    let err = v.location.refresh(false).await.unwrap_err();
    assert!(matches!(
        err,
        CoordinatorError::Unavailable {
            resource: ResourceKind::Location,
            ..
        }
    ));
}

#[tokio::test]
async fn failure_with_cached_fix_degrades() {
    let h = Harness::new();
    h.api.location.push_ok(fix(52.52, 13.40));
    h.api.location.set_err(ApiError::api("1001", "busy"));
    let v = vehicle(&h, LocationSettings::default());
    v.location.refresh(false).await.expect("first fix");

    let report = v.location.refresh(false).await.expect("degraded");
    assert!(report.is_degraded());
    assert_eq!(
        v.cache.location().and_then(|fix| fix.coordinates()),
        Some((52.52, 13.40))
    );
}

#[tokio::test]
async fn smart_interval_follows_vehicle_power() {
    let h = Harness::new();
    h.api.realtime.push_ok(realtime_on());
    h.api.realtime.set_ok(realtime_off());
    h.api.climate.set_ok(climate(false, 20.0));
    h.api.location.set_ok(fix(48.85, 2.35));
    let v = vehicle(
        &h,
        LocationSettings {
            smart_polling: true,
            ..LocationSettings::default()
        },
    );
    assert_eq!(v.location.current_interval(), Duration::from_secs(600));

    v.telemetry.refresh(false).await.expect("vehicle on");
    v.location.refresh(false).await.expect("location");
    assert_eq!(v.location.current_interval(), Duration::from_secs(30));

    v.telemetry.refresh(false).await.expect("vehicle off");
    v.location.refresh(false).await.expect("location");
    assert_eq!(v.location.current_interval(), Duration::from_secs(600));
}

#[tokio::test]
async fn fixed_interval_ignores_power() {
    let h = Harness::new();
    h.api.realtime.set_ok(realtime_on());
    h.api.climate.set_ok(climate(false, 20.0));
    h.api.location.set_ok(fix(48.85, 2.35));
    let v = vehicle(&h, LocationSettings::default());

    v.telemetry.refresh(false).await.expect("vehicle on");
    v.location.refresh(false).await.expect("location");
    assert_eq!(v.location.current_interval(), Duration::from_secs(300));
}
