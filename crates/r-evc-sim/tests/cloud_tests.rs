//! ---
//! evc_section: "11-simulation"
//! evc_subsection: "tests"
//! evc_type: "source"
//! evc_scope: "code"
//! evc_description: "Simulated vehicle cloud behaviour tests."
//! evc_version: "v0.0.0-prealpha"
//! evc_owner: "tbd"
//! ---
use std::sync::Arc;
use std::time::Duration;

use r_evc_client::{push_channel, ApiError, ApiSession, PushEvent, VehicleApi};
use r_evc_common::config::SimulationConfig;
use r_evc_sim::{spawn_push_loop, SimulatedConnector, SimulatedVehicleCloud};
use tokio::sync::broadcast;

fn config(vehicles: usize, soft_failure_rate: f64) -> SimulationConfig {
    SimulationConfig {
        random_seed: 7,
        vehicles,
        push_interval: Some(Duration::from_secs(45)),
        soft_failure_rate,
    }
}

#[tokio::test]
async fn lists_configured_vehicles() {
    let cloud = SimulatedVehicleCloud::new(&config(3, 0.0)).expect("cloud");
    let vehicles = cloud.get_vehicles().await.expect("vehicles");
    assert_eq!(vehicles.len(), 3);
    assert_eq!(vehicles[0].vin, "LSIMEVC0000000001");
    assert_eq!(cloud.vins().len(), 3);
}

#[tokio::test]
async fn commands_change_reported_state() {
    let cloud = SimulatedVehicleCloud::new(&config(1, 0.0)).expect("cloud");
    let vin = cloud.vins().remove(0);

    assert_eq!(cloud.get_realtime(&vin).await.expect("rt").is_locked(), Some(true));
    cloud.unlock(&vin).await.expect("unlock");
    assert_eq!(cloud.get_realtime(&vin).await.expect("rt").is_locked(), Some(false));

    assert!(!cloud.get_climate_status(&vin).await.expect("climate").is_ac_on());
    cloud
        .start_climate(&vin, &Default::default())
        .await
        .expect("start");
    assert!(cloud.get_climate_status(&vin).await.expect("climate").is_ac_on());
}

#[tokio::test]
async fn unknown_vehicle_is_an_api_error() {
    let cloud = SimulatedVehicleCloud::new(&config(1, 0.0)).expect("cloud");
    let err = cloud.get_location("LNOTONACCOUNT0000").await.unwrap_err();
    assert!(matches!(err, ApiError::Api { .. }));
}

#[tokio::test]
async fn soft_failure_still_applies_and_acknowledges() {
    let cloud = SimulatedVehicleCloud::new(&config(1, 1.0)).expect("cloud");
    let vin = cloud.vins().remove(0);
    let (tx, mut rx) = push_channel(4);
    cloud.attach_push(tx);

    let err = cloud.unlock(&vin).await.unwrap_err();
    assert!(matches!(err, ApiError::RemoteControlSoftFailure(_)));
    assert_eq!(cloud.get_realtime(&vin).await.expect("rt").is_locked(), Some(false));

    match rx.recv().await.expect("ack pushed") {
        PushEvent::CommandAck { vin: acked, command, .. } => {
            assert_eq!(acked, vin);
            assert_eq!(command, "unlock");
        }
        other => panic!("unexpected event {other:?}"),
    }
}

#[tokio::test]
async fn connector_serves_the_shared_cloud() {
    let cloud = SimulatedVehicleCloud::new(&config(2, 0.0)).expect("cloud");
    let session = ApiSession::new(Arc::new(SimulatedConnector::new(cloud.clone())));
    let vehicles = session
        .call("vehicles", |api| async move { api.get_vehicles().await })
        .await
        .expect("vehicles");
    assert_eq!(vehicles.len(), 2);
    assert!(cloud.set_powered(&vehicles[1].vin, true));
    let realtime = session
        .call_vin("realtime", &vehicles[1].vin, |api, vin| async move {
            api.get_realtime(&vin).await
        })
        .await
        .expect("realtime");
    assert!(realtime.is_vehicle_on());
}

#[tokio::test(start_paused = true)]
async fn push_loop_emits_realtime_per_vehicle() {
    let cloud = SimulatedVehicleCloud::new(&config(2, 0.0)).expect("cloud");
    let (tx, mut rx) = push_channel(16);
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let task = spawn_push_loop(cloud.clone(), tx, Duration::from_secs(45), shutdown_rx);

    let first = rx.recv().await.expect("first push");
    let second = rx.recv().await.expect("second push");
    assert!(matches!(first, PushEvent::VehicleInfo { .. }));
    assert_ne!(first.vin(), second.vin());

    shutdown_tx.send(()).expect("loop listening");
    task.await.expect("loop exits");
}

#[test]
fn same_seed_produces_same_walk() {
    let a = SimulatedVehicleCloud::new(&config(2, 0.0)).expect("cloud");
    let b = SimulatedVehicleCloud::new(&config(2, 0.0)).expect("cloud");
    for _ in 0..20 {
        a.tick();
        b.tick();
    }
    let realtime = |cloud: &SimulatedVehicleCloud| -> Vec<_> {
        cloud
            .realtime_events()
            .into_iter()
            .map(|event| match event {
                PushEvent::VehicleInfo { realtime, .. } => {
                    (realtime.elec_percent, realtime.total_mileage, realtime.power_gear)
                }
                PushEvent::CommandAck { .. } => unreachable!(),
            })
            .collect()
    };
    assert_eq!(realtime(&a), realtime(&b));
}
