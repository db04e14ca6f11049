//! ---
//! evc_section: "05-networking-external-interfaces"
//! evc_subsection: "module"
//! evc_type: "source"
//! evc_scope: "code"
//! evc_description: "Vehicle-cloud client seam and data model."
//! evc_version: "v0.0.0-prealpha"
//! evc_owner: "tbd"
//! ---
//! Connection lifecycle around a [`VehicleApi`].
//!
//! One session is shared by every coordinator of an account. Calls are
//! serialized on the client slot so a session renewal never overlaps another
//! request.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::api::{VehicleApi, VehicleConnector};
use crate::error::{ApiError, ApiResult, CallError};

/// Lazily connected, self-healing handle to the remote cloud.
pub struct ApiSession {
    connector: Arc<dyn VehicleConnector>,
    client: Mutex<Option<Arc<dyn VehicleApi>>>,
}

impl std::fmt::Debug for ApiSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiSession").finish_non_exhaustive()
    }
}

impl ApiSession {
    pub fn new(connector: Arc<dyn VehicleConnector>) -> Self {
        Self {
            connector,
            client: Mutex::new(None),
        }
    }

    /// Run `op` against the current client.
    ///
    /// A `SessionExpired` failure invalidates the client, reconnects and
    /// retries exactly once. Hard transport failures drop the client so the
    /// next call reconnects from scratch.
    pub async fn call<T, F, Fut>(&self, ctx: &str, op: F) -> Result<T, CallError>
    where
        T: Send,
        F: Fn(Arc<dyn VehicleApi>) -> Fut + Send + Sync,
        Fut: Future<Output = ApiResult<T>> + Send,
    {
        let started = Instant::now();
        debug!(ctx, "api call started");
        let mut slot = self.client.lock().await;

        let first = match Self::ensure_client(&self.connector, &mut slot).await {
            Ok(client) => op(client).await,
            Err(err) => Err(err),
        };

        let outcome = match first {
            Ok(value) => Ok(value),
            Err(ApiError::SessionExpired(reason)) => {
                info!(ctx, reason = %reason, "session expired; reconnecting once");
                *slot = None;
                let retried = match Self::ensure_client(&self.connector, &mut slot).await {
                    Ok(client) => op(client).await,
                    Err(err) => Err(err),
                };
                retried.map_err(|err| {
                    if matches!(err, ApiError::Transport(_)) {
                        *slot = None;
                    }
                    map_error(ctx, err)
                })
            }
            Err(err) => {
                if matches!(err, ApiError::Transport(_)) {
                    warn!(ctx, error = %err, "transport failure; invalidating client");
                    *slot = None;
                }
                Err(map_error(ctx, err))
            }
        };
        drop(slot);

        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        match &outcome {
            Ok(_) => debug!(ctx, elapsed_ms, "api call succeeded"),
            Err(err) => debug!(ctx, elapsed_ms, error = %err, "api call failed"),
        }
        outcome
    }

    /// [`call`](Self::call) for an operation scoped to one vehicle.
    pub async fn call_vin<T, F, Fut>(&self, ctx: &str, vin: &str, op: F) -> Result<T, CallError>
    where
        T: Send,
        F: Fn(Arc<dyn VehicleApi>, String) -> Fut + Send + Sync,
        Fut: Future<Output = ApiResult<T>> + Send,
    {
        self.call(ctx, |api| op(api, vin.to_owned())).await
    }

    /// Drop the current client; the next call reconnects.
    pub async fn invalidate(&self) {
        self.client.lock().await.take();
    }

    pub async fn is_connected(&self) -> bool {
        self.client.lock().await.is_some()
    }

    /// Close and forget the current client.
    pub async fn shutdown(&self) {
        let client = self.client.lock().await.take();
        if let Some(client) = client {
            client.close().await;
            debug!("api session closed");
        }
    }

    async fn ensure_client(
        connector: &Arc<dyn VehicleConnector>,
        slot: &mut Option<Arc<dyn VehicleApi>>,
    ) -> ApiResult<Arc<dyn VehicleApi>> {
        if let Some(client) = slot.as_ref() {
            return Ok(client.clone());
        }
        let client = connector.connect().await?;
        debug!("api client connected");
        *slot = Some(client.clone());
        Ok(client)
    }
}

fn map_error(ctx: &str, err: ApiError) -> CallError {
    let message = match &err {
        ApiError::AuthExpired(reason) | ApiError::SessionExpired(reason) => {
            return CallError::AuthRequired(reason.clone());
        }
        ApiError::RemoteControlSoftFailure(reason) => {
            return CallError::RemoteControlSoftFailure(reason.clone());
        }
        ApiError::ControlPasswordRejected(_) => format!(
            "{ctx}: control PIN rejected or cloud control temporarily locked"
        ),
        ApiError::RateLimited(_) => format!("{ctx}: rate limited, try again later"),
        ApiError::EndpointUnsupported { .. } => {
            format!("{ctx}: feature not supported for this vehicle/region")
        }
        ApiError::Transport(reason) => format!("{ctx}: transport failure: {reason}"),
        ApiError::Api { .. } => format!("{ctx}: {err}"),
    };
    CallError::UpdateFailed {
        message,
        cause: err,
    }
}
