//! ---
//! evc_section: "01-core-functionality"
//! evc_subsection: "module"
//! evc_type: "source"
//! evc_scope: "code"
//! evc_description: "Per-vehicle coordination and fleet lifecycle management."
//! evc_version: "v0.0.0-prealpha"
//! evc_owner: "tbd"
//! ---
//! Change detection immune to transport churn.
//!
//! Each resource kind is reduced to a fixed whitelist of fields; timestamps,
//! request serials and anything else outside the whitelist never reach the
//! digest. Missing and null fields are omitted rather than recorded as null.

use std::collections::BTreeMap;

use r_evc_client::ResourceKind;
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::cache::VehicleSnapshot;

pub const REALTIME_FIELDS: &[&str] = &[
    "elec_percent",
    "endurance_mileage",
    "total_mileage",
    "speed",
    "temp_in_car",
    "left_front_tire_pressure",
    "right_front_tire_pressure",
    "left_rear_tire_pressure",
    "right_rear_tire_pressure",
];

pub const CLIMATE_FIELDS: &[&str] = &["temp_out_car", "pm"];

pub const CHARGING_FIELDS: &[&str] = &["soc", "full_hour", "full_minute"];

pub const ENERGY_FIELDS: &[&str] = &["total_energy", "avg_energy_consumption"];

/// Resource kind → whitelisted field → normalized value. Ordered maps keep
/// the serialized form stable regardless of insertion order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct MaterialSnapshot(BTreeMap<String, BTreeMap<String, Value>>);

impl MaterialSnapshot {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, kind: ResourceKind, field: &str) -> Option<&Value> {
        self.0.get(kind.as_str())?.get(field)
    }

    /// Add the whitelisted fields of `value` under `kind`. Kinds that reduce
    /// to nothing are left out entirely.
    pub fn insert<T: Serialize>(&mut self, kind: ResourceKind, value: &T, fields: &[&str]) {
        let projected = project(value, fields);
        if !projected.is_empty() {
            self.0.insert(kind.as_str().to_owned(), projected);
        }
    }
}

fn project<T: Serialize>(value: &T, fields: &[&str]) -> BTreeMap<String, Value> {
    let Ok(Value::Object(object)) = serde_json::to_value(value) else {
        return BTreeMap::new();
    };
    fields
        .iter()
        .filter_map(|field| match object.get(*field) {
            None | Some(Value::Null) => None,
            Some(value) => Some(((*field).to_owned(), value.clone())),
        })
        .collect()
}

/// Reduce the telemetry resources of `resources` to their material fields.
pub fn snapshot(resources: &VehicleSnapshot) -> MaterialSnapshot {
    let mut material = MaterialSnapshot::default();
    if let Some(realtime) = &resources.realtime {
        material.insert(ResourceKind::Realtime, realtime, REALTIME_FIELDS);
    }
    if let Some(climate) = &resources.climate {
        material.insert(ResourceKind::Climate, climate, CLIMATE_FIELDS);
    }
    if let Some(charging) = &resources.charging {
        material.insert(ResourceKind::Charging, charging, CHARGING_FIELDS);
    }
    if let Some(energy) = &resources.energy {
        material.insert(ResourceKind::Energy, energy, ENERGY_FIELDS);
    }
    material
}

/// SHA-256 hex digest of the snapshot's sorted-key JSON form; `None` when empty.
pub fn digest(snapshot: &MaterialSnapshot) -> Option<String> {
    if snapshot.is_empty() {
        return None;
    }
    let payload = serde_json::to_string(snapshot).ok()?;
    Some(hex::encode(Sha256::digest(payload.as_bytes())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use r_evc_client::{ChargingState, RealtimeState, VehicleIdentity};

    fn resources(realtime: RealtimeState) -> VehicleSnapshot {
        let mut snapshot = VehicleSnapshot::new(VehicleIdentity::new("LGXCE4CB0N0000001"));
        snapshot.realtime = Some(realtime);
        snapshot
    }

    fn realtime() -> RealtimeState {
        RealtimeState {
            elec_percent: Some(80.0),
            total_mileage: Some(12_000.0),
            timestamp: Some(1_700_000_000),
            request_serial: Some("req-1".into()),
            ..RealtimeState::default()
        }
    }

    #[test]
    fn timestamp_churn_does_not_change_digest() {
        let first = resources(realtime());
        let second = resources(RealtimeState {
            timestamp: Some(1_700_000_300),
            request_serial: Some("req-2".into()),
            ..realtime()
        });
        assert_eq!(digest(&snapshot(&first)), digest(&snapshot(&second)));
    }

    #[test]
    fn material_field_changes_digest() {
        let first = resources(realtime());
        let second = resources(RealtimeState {
            elec_percent: Some(79.0),
            ..realtime()
        });
        assert_ne!(digest(&snapshot(&first)), digest(&snapshot(&second)));
    }

    #[test]
    fn missing_fields_are_omitted() {
        let material = snapshot(&resources(realtime()));
        assert!(material.get(ResourceKind::Realtime, "elec_percent").is_some());
        assert!(material.get(ResourceKind::Realtime, "speed").is_none());
        let json = serde_json::to_value(&material).expect("serialize");
        assert!(json["realtime"].get("speed").is_none());
        assert!(json["realtime"].get("timestamp").is_none());
    }

    #[test]
    fn empty_snapshot_has_no_digest() {
        let bare = VehicleSnapshot::new(VehicleIdentity::new("LGXCE4CB0N0000001"));
        assert!(snapshot(&bare).is_empty());
        assert_eq!(digest(&snapshot(&bare)), None);
        let sparse = resources(RealtimeState::default());
        assert_eq!(digest(&snapshot(&sparse)), None);
    }

    #[test]
    fn insertion_order_does_not_matter() {
        let mut left = MaterialSnapshot::default();
        let charging = ChargingState {
            soc: Some(55.0),
            full_hour: Some(1),
            ..ChargingState::default()
        };
        left.insert(ResourceKind::Realtime, &realtime(), REALTIME_FIELDS);
        left.insert(ResourceKind::Charging, &charging, CHARGING_FIELDS);
        let mut right = MaterialSnapshot::default();
        right.insert(ResourceKind::Charging, &charging, CHARGING_FIELDS);
        right.insert(ResourceKind::Realtime, &realtime(), REALTIME_FIELDS);
        assert_eq!(digest(&left), digest(&right));
        assert_eq!(digest(&left).map(|d| d.len()), Some(64));
    }
}
