//! ---
//! evc_section: "01-core-functionality"
//! evc_subsection: "module"
//! evc_type: "source"
//! evc_scope: "code"
//! evc_description: "Per-vehicle coordination and fleet lifecycle management."
//! evc_version: "v0.0.0-prealpha"
//! evc_owner: "tbd"
//! ---
//! Authoritative last-known state of one vehicle.
//!
//! A populated resource kind is only ever replaced by a newer value of the
//! same kind; fetch failures never clear it. Every merge happens under one
//! write lock and bumps a revision published on a `watch` channel.

use parking_lot::RwLock;
use r_evc_client::{
    ChargingState, ClimateState, EnergyState, LocationFix, RealtimeState, ResourceKind,
    VehicleIdentity,
};
use serde::Serialize;
use tokio::sync::watch;

/// Point-in-time copy of everything cached for a vehicle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VehicleSnapshot {
    pub identity: VehicleIdentity,
    pub realtime: Option<RealtimeState>,
    pub climate: Option<ClimateState>,
    pub location: Option<LocationFix>,
    pub energy: Option<EnergyState>,
    pub charging: Option<ChargingState>,
}

impl VehicleSnapshot {
    pub fn new(identity: VehicleIdentity) -> Self {
        Self {
            identity,
            realtime: None,
            climate: None,
            location: None,
            energy: None,
            charging: None,
        }
    }

    pub fn vin(&self) -> &str {
        &self.identity.vin
    }

    pub fn is_vehicle_on(&self) -> bool {
        self.realtime
            .as_ref()
            .map(RealtimeState::is_vehicle_on)
            .unwrap_or(false)
    }

    pub fn has(&self, kind: ResourceKind) -> bool {
        match kind {
            ResourceKind::Identity => true,
            ResourceKind::Realtime => self.realtime.is_some(),
            ResourceKind::Climate => self.climate.is_some(),
            ResourceKind::Location => self.location.is_some(),
            ResourceKind::Energy => self.energy.is_some(),
            ResourceKind::Charging => self.charging.is_some(),
        }
    }
}

/// Values to merge in one atomic step. `None` leaves a kind untouched.
#[derive(Debug, Clone, Default)]
pub struct CacheUpdate {
    pub realtime: Option<RealtimeState>,
    pub climate: Option<ClimateState>,
    pub location: Option<LocationFix>,
    pub energy: Option<EnergyState>,
    pub charging: Option<ChargingState>,
}

impl CacheUpdate {
    pub fn is_empty(&self) -> bool {
        self.realtime.is_none()
            && self.climate.is_none()
            && self.location.is_none()
            && self.energy.is_none()
            && self.charging.is_none()
    }

    pub fn realtime(mut self, value: RealtimeState) -> Self {
        self.realtime = Some(value);
        self
    }

    pub fn climate(mut self, value: ClimateState) -> Self {
        self.climate = Some(value);
        self
    }

    pub fn location(mut self, value: LocationFix) -> Self {
        self.location = Some(value);
        self
    }
}

#[derive(Debug)]
struct CacheInner {
    snapshot: VehicleSnapshot,
    revision: u64,
}

#[derive(Debug)]
pub struct VehicleCache {
    vin: String,
    inner: RwLock<CacheInner>,
    revision_tx: watch::Sender<u64>,
}

impl VehicleCache {
    pub fn new(identity: VehicleIdentity) -> Self {
        let (revision_tx, _) = watch::channel(0);
        Self {
            vin: identity.vin.clone(),
            inner: RwLock::new(CacheInner {
                snapshot: VehicleSnapshot::new(identity),
                revision: 0,
            }),
            revision_tx,
        }
    }

    pub fn vin(&self) -> &str {
        &self.vin
    }

    pub fn snapshot(&self) -> VehicleSnapshot {
        self.inner.read().snapshot.clone()
    }

    /// Borrow the cached state without cloning it.
    pub fn read<R>(&self, f: impl FnOnce(&VehicleSnapshot) -> R) -> R {
        f(&self.inner.read().snapshot)
    }

    pub fn realtime(&self) -> Option<RealtimeState> {
        self.read(|snapshot| snapshot.realtime.clone())
    }

    pub fn climate(&self) -> Option<ClimateState> {
        self.read(|snapshot| snapshot.climate.clone())
    }

    pub fn location(&self) -> Option<LocationFix> {
        self.read(|snapshot| snapshot.location.clone())
    }

    pub fn revision(&self) -> u64 {
        self.inner.read().revision
    }

    /// Receiver observing the revision counter.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision_tx.subscribe()
    }

    /// Apply every populated field of `update` atomically. Empty updates are no-ops.
    pub fn merge(&self, update: CacheUpdate) -> u64 {
        self.merge_checked(update, |_| true).0
    }

    /// [`merge`](Self::merge) where `keep_climate` may veto the climate record.
    ///
    /// The veto runs under the write lock, so it observes any climate patch
    /// applied before it and no patch can slip in between check and write.
    /// Returns the revision and whether the climate record (if any) was kept.
    pub fn merge_checked(
        &self,
        mut update: CacheUpdate,
        keep_climate: impl FnOnce(&ClimateState) -> bool,
    ) -> (u64, bool) {
        let mut inner = self.inner.write();
        let mut climate_kept = true;
        if let Some(climate) = &update.climate {
            if !keep_climate(climate) {
                update.climate = None;
                climate_kept = false;
            }
        }
        if update.is_empty() {
            return (inner.revision, climate_kept);
        }
        let snapshot = &mut inner.snapshot;
        if let Some(value) = update.realtime {
            snapshot.realtime = Some(value);
        }
        if let Some(value) = update.climate {
            snapshot.climate = Some(value);
        }
        if let Some(value) = update.location {
            snapshot.location = Some(value);
        }
        if let Some(value) = update.energy {
            snapshot.energy = Some(value);
        }
        if let Some(value) = update.charging {
            snapshot.charging = Some(value);
        }
        (Self::bump(&mut inner, &self.revision_tx), climate_kept)
    }

    /// Modify the cached climate in place. Returns `false` without a baseline.
    pub fn patch_climate(&self, patch: impl FnOnce(&mut ClimateState)) -> bool {
        let mut inner = self.inner.write();
        let Some(climate) = inner.snapshot.climate.as_mut() else {
            return false;
        };
        patch(climate);
        Self::bump(&mut inner, &self.revision_tx);
        true
    }

    /// Bump the revision without changing data so consumers re-evaluate.
    pub fn touch(&self) -> u64 {
        let mut inner = self.inner.write();
        Self::bump(&mut inner, &self.revision_tx)
    }

    fn bump(inner: &mut CacheInner, tx: &watch::Sender<u64>) -> u64 {
        inner.revision += 1;
        tx.send_replace(inner.revision);
        inner.revision
    }
}
