//! ---
//! evc_section: "05-networking-external-interfaces"
//! evc_subsection: "tests"
//! evc_type: "source"
//! evc_scope: "code"
//! evc_description: "Session retry, invalidation and error mapping tests."
//! evc_version: "v0.0.0-prealpha"
//! evc_owner: "tbd"
//! ---
use r_evc_client::{ApiError, CallError, RealtimeState};
use r_evc_testharness::{realtime_on, Harness};

const VIN: &str = "LGXCE4CB0N0000001";

async fn fetch(h: &Harness) -> Result<RealtimeState, CallError> {
    h.session
        .call("realtime", |api| async move { api.get_realtime(VIN).await })
        .await
}

#[tokio::test]
async fn connects_lazily_and_reuses_client() {
    let h = Harness::new();
    h.api.realtime.set_ok(realtime_on());
    assert_eq!(h.connector.connects(), 0);
    assert!(!h.session.is_connected().await);

    fetch(&h).await.expect("first call");
    fetch(&h).await.expect("second call");

    assert_eq!(h.connector.connects(), 1);
    assert_eq!(h.api.realtime.calls(), 2);
}

#[tokio::test]
async fn session_expiry_reconnects_and_retries_once() {
    let h = Harness::new();
    h.api
        .realtime
        .push_err(ApiError::SessionExpired("token lapsed".into()))
        .set_ok(realtime_on());

    let realtime = fetch(&h).await.expect("retry succeeds");
    assert!(realtime.is_vehicle_on());
    assert_eq!(h.connector.connects(), 2);
    assert_eq!(h.api.realtime.calls(), 2);
}

#[tokio::test]
async fn repeated_session_expiry_requires_auth() {
    let h = Harness::new();
    h.api
        .realtime
        .set_err(ApiError::SessionExpired("token lapsed".into()));

    let err = fetch(&h).await.unwrap_err();
    assert!(err.is_auth());
    assert_eq!(h.api.realtime.calls(), 2, "retried exactly once");
}

#[tokio::test]
async fn retry_failure_outside_auth_is_update_failure() {
    let h = Harness::new();
    h.api
        .realtime
        .push_err(ApiError::SessionExpired("token lapsed".into()))
        .push_err(ApiError::api("1009", "vehicle asleep"));

    let err = fetch(&h).await.unwrap_err();
    assert!(matches!(err, CallError::UpdateFailed { .. }));
    assert!(!err.is_auth());
}

#[tokio::test]
async fn auth_expiry_is_not_retried() {
    let h = Harness::new();
    h.api
        .realtime
        .set_err(ApiError::AuthExpired("password changed".into()));

    let err = fetch(&h).await.unwrap_err();
    assert_eq!(err, CallError::AuthRequired("password changed".into()));
    assert_eq!(h.api.realtime.calls(), 1);
}

#[tokio::test]
async fn transport_failure_invalidates_client() {
    let h = Harness::new();
    h.api
        .realtime
        .push_err(ApiError::Transport("connection reset".into()))
        .set_ok(realtime_on());

    let err = fetch(&h).await.unwrap_err();
    assert!(matches!(
        err,
        CallError::UpdateFailed {
            cause: ApiError::Transport(_),
            ..
        }
    ));
    assert!(!h.session.is_connected().await);

    fetch(&h).await.expect("reconnects");
    assert_eq!(h.connector.connects(), 2);
}

#[tokio::test]
async fn rate_limit_keeps_client() {
    let h = Harness::new();
    h.api
        .realtime
        .push_err(ApiError::RateLimited("429".into()));

    let err = fetch(&h).await.unwrap_err();
    assert!(err.to_string().contains("rate limited"));
    assert!(h.session.is_connected().await);
    assert_eq!(h.connector.connects(), 1);
}

#[tokio::test]
async fn connect_failure_is_mapped() {
    let h = Harness::new();
    h.connector
        .fail_next(ApiError::AuthExpired("bad credentials".into()));

    let err = fetch(&h).await.unwrap_err();
    assert!(err.is_auth());
    assert_eq!(h.api.realtime.calls(), 0);
}

#[tokio::test]
async fn shutdown_closes_client() {
    let h = Harness::new();
    h.api.realtime.set_ok(realtime_on());
    fetch(&h).await.expect("call");

    h.session.shutdown().await;
    assert_eq!(h.api.close_calls(), 1);
    assert!(!h.session.is_connected().await);

    h.session.shutdown().await;
    assert_eq!(h.api.close_calls(), 1);
}
