//! ---
//! evc_section: "01-core-functionality"
//! evc_subsection: "module"
//! evc_type: "source"
//! evc_scope: "code"
//! evc_description: "Per-vehicle coordination and fleet lifecycle management."
//! evc_version: "v0.0.0-prealpha"
//! evc_owner: "tbd"
//! ---
//! Consumer-side memory of an issued command awaiting confirmation.
//!
//! Only the dispatcher arms a memory (on command success) or resets it (on
//! failure); consumers observe cache snapshots, which clears it once the
//! confirmation strategy agrees or the TTL lapses.

use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

use crate::cache::VehicleSnapshot;

/// Pure check of whether `snapshot` reflects `expected`.
pub type ConfirmationStrategy<T> = fn(&VehicleSnapshot, &T) -> bool;

#[derive(Debug, Clone, PartialEq)]
pub enum PendingState<T> {
    Idle,
    Pending { expected: T, armed_at: Instant },
}

#[derive(Debug)]
pub struct CommandMemory<T> {
    state: Mutex<PendingState<T>>,
    strategy: ConfirmationStrategy<T>,
    ttl: Duration,
}

impl<T: Clone> CommandMemory<T> {
    pub fn new(strategy: ConfirmationStrategy<T>, ttl: Duration) -> Self {
        Self {
            state: Mutex::new(PendingState::Idle),
            strategy,
            ttl,
        }
    }

    pub fn state(&self) -> PendingState<T> {
        self.state.lock().clone()
    }

    pub fn is_pending(&self) -> bool {
        matches!(*self.state.lock(), PendingState::Pending { .. })
    }

    pub(crate) fn arm(&self, expected: T) {
        *self.state.lock() = PendingState::Pending {
            expected,
            armed_at: Instant::now(),
        };
    }

    pub(crate) fn reset(&self) {
        *self.state.lock() = PendingState::Idle;
    }

    /// Evaluate a fresh cache snapshot. Returns `true` when this observation
    /// cleared a pending command.
    pub fn observe(&self, snapshot: &VehicleSnapshot) -> bool {
        let mut state = self.state.lock();
        let PendingState::Pending { expected, armed_at } = &*state else {
            return false;
        };
        if armed_at.elapsed() >= self.ttl || (self.strategy)(snapshot, expected) {
            *state = PendingState::Idle;
            return true;
        }
        false
    }

    /// Value to present: the expected one while pending, otherwise `fallback`.
    pub fn display(&self, fallback: T) -> T {
        match &*self.state.lock() {
            PendingState::Pending { expected, .. } => expected.clone(),
            PendingState::Idle => fallback,
        }
    }
}

/// Built-in confirmation strategies.
pub mod strategies {
    use r_evc_client::SwitchState;

    use crate::cache::VehicleSnapshot;

    pub fn lock(snapshot: &VehicleSnapshot, expected_locked: &bool) -> bool {
        snapshot
            .realtime
            .as_ref()
            .and_then(|realtime| realtime.is_locked())
            == Some(*expected_locked)
    }

    /// Turning climate on is only confirmed once the vehicle reports power as well.
    pub fn climate_power(snapshot: &VehicleSnapshot, expected_on: &bool) -> bool {
        let Some(climate) = snapshot.climate.as_ref() else {
            return false;
        };
        if climate.is_ac_on() != *expected_on {
            return false;
        }
        !*expected_on || snapshot.is_vehicle_on()
    }

    pub fn battery_heat(snapshot: &VehicleSnapshot, expected_on: &bool) -> bool {
        snapshot
            .realtime
            .as_ref()
            .and_then(|realtime| realtime.battery_heat_state)
            .map(SwitchState::is_on)
            == Some(*expected_on)
    }

    pub fn steering_wheel_heat(snapshot: &VehicleSnapshot, expected_on: &bool) -> bool {
        snapshot
            .climate
            .as_ref()
            .and_then(|climate| climate.steering_wheel_heat_state)
            .map(SwitchState::is_on)
            == Some(*expected_on)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use r_evc_client::{
        ClimateState, ClimateStatus, LockState, PowerGear, RealtimeState, SwitchState,
        VehicleIdentity,
    };

    fn snapshot() -> VehicleSnapshot {
        VehicleSnapshot::new(VehicleIdentity::new("LGXCE4CB0N0000001"))
    }

    #[test]
    fn lock_strategy_needs_all_doors() {
        let mut snap = snapshot();
        assert!(!strategies::lock(&snap, &true));
        let mut realtime = RealtimeState::default();
        realtime.set_all_doors(LockState::Locked);
        snap.realtime = Some(realtime);
        assert!(strategies::lock(&snap, &true));
        assert!(!strategies::lock(&snap, &false));
    }

    #[test]
    fn climate_on_requires_vehicle_power() {
        let mut snap = snapshot();
        snap.climate = Some(ClimateState {
            status: Some(ClimateStatus::On),
            ..ClimateState::default()
        });
        snap.realtime = Some(RealtimeState {
            power_gear: Some(PowerGear::Off),
            ..RealtimeState::default()
        });
        assert!(!strategies::climate_power(&snap, &true));
        snap.realtime = Some(RealtimeState {
            power_gear: Some(PowerGear::On),
            ..RealtimeState::default()
        });
        assert!(strategies::climate_power(&snap, &true));
        assert!(!strategies::climate_power(&snap, &false));
    }

    #[test]
    fn heater_strategies_read_their_fields() {
        let mut snap = snapshot();
        snap.realtime = Some(RealtimeState {
            battery_heat_state: Some(SwitchState::On),
            ..RealtimeState::default()
        });
        snap.climate = Some(ClimateState {
            steering_wheel_heat_state: Some(SwitchState::Off),
            ..ClimateState::default()
        });
        assert!(strategies::battery_heat(&snap, &true));
        assert!(strategies::steering_wheel_heat(&snap, &false));
        assert!(!strategies::steering_wheel_heat(&snap, &true));
    }

    #[test]
    fn observe_clears_on_confirmation() {
        let memory = CommandMemory::new(strategies::battery_heat, Duration::from_secs(300));
        memory.arm(true);
        assert!(memory.is_pending());
        assert!(memory.display(false));
        assert!(!memory.observe(&snapshot()));

        let mut snap = snapshot();
        snap.realtime = Some(RealtimeState {
            battery_heat_state: Some(SwitchState::On),
            ..RealtimeState::default()
        });
        assert!(memory.observe(&snap));
        assert_eq!(memory.state(), PendingState::Idle);
        assert!(!memory.display(false));
    }

    #[tokio::test(start_paused = true)]
    async fn observe_clears_after_ttl() {
        let memory = CommandMemory::new(strategies::lock, Duration::from_secs(300));
        memory.arm(true);
        tokio::time::advance(Duration::from_secs(299)).await;
        assert!(!memory.observe(&snapshot()));
        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(memory.observe(&snapshot()));
        assert!(!memory.is_pending());
    }
}
