// SPDX-FileCopyrightText: 2026 Dropgate Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Geofence Verification
//!
//! Great-circle distance on a spherical-Earth approximation plus the radius
//! policy gating location-mode downloads. A missing point is never treated as
//! distance zero; it is infinitely far away.

use serde::{Deserialize, Serialize};

/// Mean Earth radius in meters (spherical approximation).
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// Radius applied when the producer did not specify one.
pub const DEFAULT_RADIUS_METERS: f64 = 100.0;

/// Claimed-accuracy threshold beyond which a verification result is flagged
/// as low confidence.
pub const ACCURACY_WARN_THRESHOLD_METERS: f64 = 500.0;

/// A geographic coordinate with an optional accuracy estimate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
    /// Reported fix accuracy in meters, if the platform provided one.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub accuracy_meters: Option<f64>,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        GeoPoint {
            latitude,
            longitude,
            accuracy_meters: None,
        }
    }

    pub fn with_accuracy(latitude: f64, longitude: f64, accuracy_meters: f64) -> Self {
        GeoPoint {
            latitude,
            longitude,
            accuracy_meters: Some(accuracy_meters),
        }
    }

    /// Returns true if latitude and longitude are within valid ranges.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

/// Outcome of a radius check, including the diagnostics surfaced to the
/// consumer on rejection (distance and radius are not secrets).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RadiusCheck {
    pub distance_meters: f64,
    pub radius_meters: f64,
    pub within: bool,
    /// Set when the claimed point's accuracy is worse than the threshold.
    /// The check still evaluates; callers must surface the reduced
    /// confidence, not change the pass/fail outcome.
    pub low_confidence: bool,
}

/// Computes the haversine great-circle distance between two points, in
/// meters.
pub fn haversine_distance_meters(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let d_lat = (b.latitude - a.latitude).to_radians();
    let d_lon = (b.longitude - a.longitude).to_radians();
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();

    let sa = (d_lat / 2.0).sin();
    let sb = (d_lon / 2.0).sin();
    let c = 2.0 * (sa * sa + lat1.cos() * lat2.cos() * sb * sb).sqrt().asin();

    EARTH_RADIUS_METERS * c
}

/// Distance between two optional points; either point missing yields
/// `+infinity`.
pub fn distance_or_infinity(a: Option<&GeoPoint>, b: Option<&GeoPoint>) -> f64 {
    match (a, b) {
        (Some(a), Some(b)) => haversine_distance_meters(a, b),
        _ => f64::INFINITY,
    }
}

/// Returns true if `distance` falls within `radius`.
pub fn within_radius(distance_meters: f64, radius_meters: f64) -> bool {
    distance_meters <= radius_meters
}

/// Evaluates the full radius policy for a claimed point against a recorded
/// one.
///
/// `radius_meters` of `None` applies [`DEFAULT_RADIUS_METERS`]. The accuracy
/// annotation uses `accuracy_threshold_meters`, normally
/// [`ACCURACY_WARN_THRESHOLD_METERS`].
pub fn check_within_radius(
    recorded: Option<&GeoPoint>,
    claimed: Option<&GeoPoint>,
    radius_meters: Option<f64>,
    accuracy_threshold_meters: f64,
) -> RadiusCheck {
    let radius = radius_meters.unwrap_or(DEFAULT_RADIUS_METERS);
    let distance = distance_or_infinity(recorded, claimed);
    let low_confidence = claimed
        .and_then(|p| p.accuracy_meters)
        .is_some_and(|acc| acc > accuracy_threshold_meters);

    RadiusCheck {
        distance_meters: distance,
        radius_meters: radius,
        within: within_radius(distance, radius),
        low_confidence,
    }
}
