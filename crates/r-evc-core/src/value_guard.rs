//! ---
//! evc_section: "01-core-functionality"
//! evc_subsection: "module"
//! evc_type: "source"
//! evc_scope: "code"
//! evc_description: "GPS fix plausibility filter."
//! evc_version: "v0.0.0-prealpha"
//! evc_owner: "tbd"
//! ---
//! Plausibility filter for incoming GPS fixes.

use r_evc_client::LocationFix;

/// Fixes closer than this (in degrees, on both axes) to (0, 0) are treated as bogus.
pub const NULL_ISLAND_THRESHOLD: f64 = 0.1;

/// False for fixes without any coordinate or sitting on null island.
///
/// A fix with only one axis reported is passed through as-is.
pub fn is_plausible(fix: &LocationFix) -> bool {
    match (fix.latitude, fix.longitude) {
        (None, None) => false,
        (Some(lat), Some(lon)) => {
            !(lat.abs() < NULL_ISLAND_THRESHOLD && lon.abs() < NULL_ISLAND_THRESHOLD)
        }
        _ => true,
    }
}

/// Decide which fix to keep. `None` means keep `previous` untouched.
///
/// The first fix ever seen is always taken, even if implausible.
pub fn guard_location(previous: Option<&LocationFix>, incoming: LocationFix) -> Option<LocationFix> {
    if previous.is_none() || is_plausible(&incoming) {
        Some(incoming)
    } else {
        None
    }
}
