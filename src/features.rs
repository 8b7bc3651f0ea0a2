//! Observation to model-input feature transformation.
//!
//! The model was trained on a fixed 7-column layout. [`FEATURE_NAMES`] is the
//! single source of truth for that layout; the artifact loader checks the
//! scaler and regressor against it before the service accepts traffic.

use std::f64::consts::PI;

use crate::observation::Observation;

/// Width of the model input.
pub const FEATURE_COUNT: usize = 7;

/// Column order the scaler and regressor were trained on.
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "temperature",
    "humidity",
    "ghi",
    "hour_sin",
    "hour_cos",
    "power_t_1",
    "power_t_2",
];

/// Ordered model input, laid out as [`FEATURE_NAMES`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureVector([f64; FEATURE_COUNT]);

impl FeatureVector {
    /// Wraps raw values already in [`FEATURE_NAMES`] order.
    pub fn from_values(values: [f64; FEATURE_COUNT]) -> Self {
        Self(values)
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn values(&self) -> [f64; FEATURE_COUNT] {
        self.0
    }

    /// Looks up a feature by column name.
    pub fn get(&self, name: &str) -> Option<f64> {
        FEATURE_NAMES
            .iter()
            .position(|n| *n == name)
            .map(|i| self.0[i])
    }
}

/// Encodes an hour of day on the unit circle.
///
/// Returns `(sin, cos)` of `2π·h/24`. Hours are taken modulo 24 so that 24
/// and 0 encode identically.
pub fn hour_encoding(hour: u32) -> (f64, f64) {
    let angle = 2.0 * PI * f64::from(hour % 24) / 24.0;
    (angle.sin(), angle.cos())
}

/// Builds the model input for a (validated) observation.
///
/// Weather fields and power lags pass through unchanged; the timestamp is
/// reduced to its cyclical hour encoding.
///
/// # Arguments
///
/// * `observation` - Reading that has already passed plausibility checks
///
/// # Returns
///
/// Features in [`FEATURE_NAMES`] order, unscaled.
pub fn transform(observation: &Observation) -> FeatureVector {
    let (hour_sin, hour_cos) = hour_encoding(observation.hour());
    FeatureVector([
        observation.temperature,
        observation.humidity,
        observation.ghi,
        hour_sin,
        hour_cos,
        observation.power_t_1,
        observation.power_t_2,
    ])
}
