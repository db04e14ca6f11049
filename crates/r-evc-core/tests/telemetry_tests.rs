//! ---
//! evc_section: "01-core-functionality"
//! evc_subsection: "tests"
//! evc_type: "source"
//! evc_scope: "code"
//! evc_description: "Telemetry cycle fetch rules, fallback and guard behaviour."
//! evc_version: "v0.0.0-prealpha"
//! evc_owner: "tbd"
//! ---
use std::sync::Arc;
use std::time::Duration;

use r_evc_client::{
    ApiError, ChargingState, ClimateParams, EnergyState, ResourceKind, VehicleCommand,
};
use r_evc_core::materiality;
use r_evc_core::{
    CoordinatorError, DispatchSettings, LocationSettings, TelemetrySettings, VehicleCoordinators,
};
use r_evc_testharness::{climate, identity, realtime_off, realtime_on, Harness};

const VIN: &str = "LGXCE4CB0N0000001";

fn vehicle(h: &Harness, telemetry: TelemetrySettings) -> Arc<VehicleCoordinators> {
    Arc::new(VehicleCoordinators::with_settings(
        identity(VIN),
        h.session.clone(),
        telemetry,
        LocationSettings::default(),
        DispatchSettings::default(),
        None,
    ))
}

fn core_only() -> TelemetrySettings {
    TelemetrySettings {
        fetch_energy: false,
        fetch_charging: false,
        ..TelemetrySettings::default()
    }
}

#[tokio::test]
async fn climate_is_fetched_only_when_on_forced_or_uncached() {
    let h = Harness::new();
    h.api.realtime.set_ok(realtime_off());
    h.api.climate.set_ok(climate(false, 20.0));
    let v = vehicle(&h, core_only());

    let first = v.telemetry.refresh(false).await.expect("first cycle");
    assert_eq!(h.api.climate.calls(), 1, "nothing cached yet");
    assert!(first.snapshot.climate.is_some());

    let second = v.telemetry.refresh(false).await.expect("second cycle");
    assert_eq!(h.api.climate.calls(), 1, "vehicle off suppresses climate");
    assert!(second.snapshot.climate.is_none());
    assert!(v.cache.climate().is_some(), "cache keeps last climate");

    v.telemetry.refresh(true).await.expect("forced cycle");
    assert_eq!(h.api.climate.calls(), 2);

    h.api.realtime.set_ok(realtime_on());
    let on = v.telemetry.refresh(false).await.expect("vehicle on");
    assert_eq!(h.api.climate.calls(), 3);
    assert!(on.snapshot.climate.is_some());
    assert!(v.is_vehicle_powered_on());
}

#[tokio::test]
async fn failed_resources_fall_back_to_cache() {
    let h = Harness::new();
    h.api.realtime.push_ok(realtime_on());
    h.api.climate.push_ok(climate(true, 22.0));
    let v = vehicle(&h, core_only());
    v.telemetry.refresh(false).await.expect("warm cache");

    h.api
        .realtime
        .set_err(ApiError::Transport("connection reset".into()));
    h.api.climate.set_err(ApiError::api("1001", "busy"));
    let report = v.telemetry.refresh(false).await.expect("degraded cycle");

    assert!(report.is_degraded());
    assert!(report.partial_failures.contains_key(&ResourceKind::Realtime));
    assert!(report.partial_failures.contains_key(&ResourceKind::Climate));
    assert_eq!(report.snapshot.realtime, Some(realtime_on()));
    assert_eq!(v.cache.climate(), Some(climate(true, 22.0)));
}

#[tokio::test]
async fn missing_realtime_without_cache_fails_the_cycle() {
    let h = Harness::new();
    h.api.realtime.set_err(ApiError::api("1001", "busy"));
    h.api.climate.set_ok(climate(false, 20.0));
    let v = vehicle(&h, core_only());

    let err = v.telemetry.refresh(false).await.unwrap_err();
    assert!(matches!(
        err,
        CoordinatorError::Unavailable {
            resource: ResourceKind::Realtime,
            ..
        }
    ));
    assert!(v.cache.realtime().is_none());
}

#[tokio::test]
async fn auth_failure_aborts_the_cycle() {
    let h = Harness::new();
    h.api.realtime.push_ok(realtime_off());
    h.api.climate.set_ok(climate(false, 20.0));
    let v = vehicle(&h, core_only());
    v.telemetry.refresh(false).await.expect("warm cache");

    h.api
        .realtime
        .set_err(ApiError::AuthExpired("password changed".into()));
    let err = v.telemetry.refresh(false).await.unwrap_err();
    assert!(err.is_auth());
    assert_eq!(v.cache.realtime(), Some(realtime_off()));
}

#[tokio::test]
async fn disabled_polling_serves_cache_until_forced() {
    let h = Harness::new();
    h.api.realtime.set_ok(realtime_off());
    h.api.climate.set_ok(climate(false, 20.0));
    let v = vehicle(&h, core_only());
    v.telemetry.refresh(false).await.expect("warm cache");
    let revision = v.cache.revision();

    v.set_polling_enabled(false);
    let skipped = v.telemetry.refresh(false).await.expect("skipped cycle");
    assert!(skipped.skipped);
    assert_eq!(h.api.realtime.calls(), 1);
    assert_eq!(v.cache.revision(), revision);

    v.telemetry.polling().request_force();
    let forced = v.telemetry.refresh(false).await.expect("pending force honoured");
    assert!(forced.forced);
    assert!(!forced.skipped);
    assert_eq!(h.api.realtime.calls(), 2);
}

#[tokio::test]
async fn disabled_refresh_is_idempotent() {
    let h = Harness::new();
    let v = vehicle(&h, TelemetrySettings::default());
    v.set_polling_enabled(false);

    let first = v.telemetry.refresh(false).await.expect("skipped cycle");
    let second = v.telemetry.refresh(false).await.expect("skipped cycle");
    assert!(first.skipped && second.skipped);
    assert_eq!(first.snapshot, second.snapshot);
    assert_eq!(first.snapshot.vin(), VIN);
    assert!(first.snapshot.realtime.is_none(), "identity-only placeholder");
    assert_eq!(v.cache.revision(), 0);
    for calls in [
        h.api.realtime.calls(),
        h.api.climate.calls(),
        h.api.energy.calls(),
        h.api.charging.calls(),
    ] {
        assert_eq!(calls, 0);
    }

    h.api.realtime.set_ok(realtime_on());
    h.api.climate.set_ok(climate(true, 22.0));
    h.api.energy.set_ok(EnergyState::default());
    h.api.charging.set_ok(ChargingState::default());
    v.telemetry.refresh(true).await.expect("forced cycle");
    let revision = v.cache.revision();

    let a = v.telemetry.refresh(false).await.expect("skipped cycle");
    let b = v.telemetry.refresh(false).await.expect("skipped cycle");
    assert_eq!(a.snapshot, b.snapshot);
    assert_eq!(
        materiality::digest(&materiality::snapshot(&a.snapshot)),
        materiality::digest(&materiality::snapshot(&b.snapshot))
    );
    assert_eq!(v.cache.revision(), revision);
    assert_eq!(h.api.realtime.calls(), 1);
    assert_eq!(h.api.climate.calls(), 1);
    assert_eq!(h.api.energy.calls(), 1);
    assert_eq!(h.api.charging.calls(), 1);
}

#[tokio::test]
async fn in_flight_cycle_does_not_overwrite_optimistic_climate() {
    let h = Harness::new();
    h.api.realtime.set_ok(realtime_on());
    h.api.climate.set_ok(climate(false, 21.0));
    h.api.energy.set_ok(EnergyState::default());
    h.api.charging.set_ok(ChargingState::default());
    h.api.commands.set_ok(());
    let v = vehicle(&h, TelemetrySettings::default());
    v.telemetry.refresh(false).await.expect("warm cache");

    // Park the next cycle on its energy request, after climate=off was read.
    let release = h.api.energy.hold();
    let cycle = tokio::spawn({
        let v = v.clone();
        async move { v.telemetry.refresh(false).await }
    });
    while h.api.energy.calls() < 2 {
        tokio::task::yield_now().await;
    }
    assert_eq!(h.api.climate.calls(), 2);

    let command = tokio::spawn({
        let v = v.clone();
        async move {
            v.dispatcher
                .execute(&VehicleCommand::StartClimate(ClimateParams::default()), || {})
                .await
        }
    });
    for _ in 0..4 {
        tokio::task::yield_now().await;
    }
    release.notify_one();

    command.await.expect("command task").expect("accepted");
    cycle.await.expect("cycle task").expect("cycle completes");

    assert_eq!(v.cache.climate().map(|c| c.is_ac_on()), Some(true));
    assert_eq!(v.telemetry.climate_guard().expected(), Some(true));
    assert_eq!(v.cache.read(|s| s.energy.clone()), Some(EnergyState::default()));
}

#[tokio::test]
async fn unsupported_energy_is_not_requested_again() {
    let h = Harness::new();
    h.api.realtime.set_ok(realtime_off());
    h.api.climate.set_ok(climate(false, 20.0));
    h.api.energy.set_err(ApiError::unsupported("energy"));
    h.api.charging.set_ok(ChargingState {
        soc: Some(72.0),
        is_connected: Some(false),
        ..ChargingState::default()
    });
    let v = vehicle(&h, TelemetrySettings::default());

    let report = v.telemetry.refresh(false).await.expect("first cycle");
    assert!(report.partial_failures.contains_key(&ResourceKind::Energy));
    assert!(v.telemetry.is_unsupported(ResourceKind::Energy));
    assert!(report.snapshot.charging.is_some());

    let report = v.telemetry.refresh(false).await.expect("second cycle");
    assert!(!report.is_degraded());
    assert_eq!(h.api.energy.calls(), 1);
    assert_eq!(h.api.charging.calls(), 2);
}

#[tokio::test]
async fn material_digest_ignores_timestamp_churn() {
    let h = Harness::new();
    h.api.realtime.push_ok(realtime_off());
    h.api.realtime.push_ok(realtime_on());
    let mut churned = realtime_on();
    churned.timestamp = Some(1_700_000_900);
    h.api.realtime.push_ok(churned);
    h.api.climate.set_ok(climate(false, 20.0));
    h.api.energy.set_ok(EnergyState {
        total_energy: Some(15.2),
        ..EnergyState::default()
    });
    let v = vehicle(
        &h,
        TelemetrySettings {
            fetch_charging: false,
            ..TelemetrySettings::default()
        },
    );

    let first = v.telemetry.refresh(false).await.expect("first");
    assert!(first.material_changed);
    assert!(first.material_digest.is_some());

    // power gear is not a material field
    let second = v.telemetry.refresh(false).await.expect("second");
    assert!(!second.material_changed);

    let third = v.telemetry.refresh(false).await.expect("third");
    assert!(!third.material_changed);
    assert_eq!(third.material_digest, first.material_digest);
}

#[tokio::test(start_paused = true)]
async fn optimistic_climate_survives_stale_reads_until_guard_expires() {
    let h = Harness::new();
    h.api.realtime.set_ok(realtime_off());
    h.api.climate.set_ok(climate(false, 20.0));
    h.api.commands.set_ok(());
    let v = vehicle(&h, core_only());
    v.telemetry.refresh(false).await.expect("warm cache");

    let start = VehicleCommand::StartClimate(ClimateParams {
        temperature: Some(22.0),
        duration_minutes: None,
    });
    v.dispatcher.execute(&start, || {}).await.expect("command accepted");
    let patched = v.cache.climate().expect("climate cached");
    assert!(patched.is_ac_on());
    assert_eq!(patched.main_setting_temp, Some(22.0));
    assert_eq!(v.telemetry.climate_guard().expected(), Some(true));

    let stale = v.telemetry.refresh(true).await.expect("stale read");
    assert!(stale.guard_rejected);
    assert!(v.cache.climate().is_some_and(|c| c.is_ac_on()));

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert!(v.cache.climate().is_some_and(|c| c.is_ac_on()));
    assert!(v.telemetry.climate_guard().is_armed());

    tokio::time::sleep(Duration::from_secs(31)).await;
    let expired = v.telemetry.refresh(true).await.expect("guard expired");
    assert!(!expired.guard_rejected);
    assert!(v.cache.climate().is_some_and(|c| !c.is_ac_on()));
    assert!(!v.telemetry.climate_guard().is_armed());
}

#[tokio::test]
async fn matching_read_clears_the_guard() {
    let h = Harness::new();
    h.api.realtime.set_ok(realtime_on());
    h.api.climate.push_ok(climate(false, 20.0));
    h.api.climate.set_ok(climate(true, 20.0));
    let v = vehicle(&h, core_only());
    v.telemetry.refresh(false).await.expect("warm cache");

    assert!(v
        .telemetry
        .apply_optimistic_climate(&r_evc_core::ClimatePatch::power(true)));
    let report = v.telemetry.refresh(false).await.expect("confirming read");
    assert!(!report.guard_rejected);
    assert!(!v.telemetry.climate_guard().is_armed());
}

#[tokio::test]
async fn optimistic_patch_needs_a_baseline() {
    let h = Harness::new();
    let v = vehicle(&h, core_only());
    assert!(!v
        .telemetry
        .apply_optimistic_climate(&r_evc_core::ClimatePatch::power(true)));
    assert!(!v.telemetry.climate_guard().is_armed());
    assert!(v.cache.climate().is_none());
}
