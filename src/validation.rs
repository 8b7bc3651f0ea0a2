//! Physical plausibility checks applied before any feature work.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::observation::Observation;

/// Configurable plausibility limits.
///
/// Humidity is always `[0, 100]` and every lower bound on irradiance and
/// power is zero; only the ranges below are tunable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PlausibilityBounds {
    /// Lowest accepted ambient temperature (°C).
    pub temperature_min_c: f64,
    /// Highest accepted ambient temperature (°C).
    pub temperature_max_c: f64,
    /// Highest accepted irradiance (W/m²). Clear-sky GHI stays below the
    /// solar constant (~1361 W/m²) with some margin for cloud enhancement.
    pub ghi_max_w_m2: f64,
    /// Highest accepted lagged power reading (W).
    pub power_max_w: f64,
}

impl Default for PlausibilityBounds {
    fn default() -> Self {
        Self {
            temperature_min_c: -40.0,
            temperature_max_c: 60.0,
            ghi_max_w_m2: 1500.0,
            power_max_w: 1.0e7,
        }
    }
}

/// The constraint an observation field failed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Bound {
    /// Value must be a finite number.
    Finite,
    /// Value must lie in `[min, max]`.
    Within { min: f64, max: f64 },
}

impl fmt::Display for Bound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Finite => write!(f, "must be a finite number"),
            Self::Within { min, max } => write!(f, "must be within [{min}, {max}]"),
        }
    }
}

/// An observation field outside its plausible range.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{field} = {value} rejected: {bound}")]
pub struct ValidationError {
    /// Name of the offending field as it appears in the request body.
    pub field: &'static str,
    /// The rejected value.
    pub value: f64,
    /// The violated constraint.
    pub bound: Bound,
}

/// Rejects observations that cannot come from a real installation.
///
/// Never clamps: an accepted observation is returned bit-for-bit unchanged.
#[derive(Debug, Clone, Default)]
pub struct ConstraintValidator {
    bounds: PlausibilityBounds,
}

impl ConstraintValidator {
    pub fn new(bounds: PlausibilityBounds) -> Self {
        Self { bounds }
    }

    pub fn bounds(&self) -> &PlausibilityBounds {
        &self.bounds
    }

    /// Checks every field, reporting the first violation in feature order.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] naming the field and its bound.
    pub fn validate(&self, observation: Observation) -> Result<Observation, ValidationError> {
        let b = &self.bounds;
        let checks = [
            ("temperature", observation.temperature, b.temperature_min_c, b.temperature_max_c),
            ("humidity", observation.humidity, 0.0, 100.0),
            ("ghi", observation.ghi, 0.0, b.ghi_max_w_m2),
            ("power_t_1", observation.power_t_1, 0.0, b.power_max_w),
            ("power_t_2", observation.power_t_2, 0.0, b.power_max_w),
        ];

        for (field, value, min, max) in checks {
            check(field, value, min, max)?;
        }
        Ok(observation)
    }
}

fn check(field: &'static str, value: f64, min: f64, max: f64) -> Result<(), ValidationError> {
    if !value.is_finite() {
        return Err(ValidationError {
            field,
            value,
            bound: Bound::Finite,
        });
    }
    if value < min || value > max {
        return Err(ValidationError {
            field,
            value,
            bound: Bound::Within { min, max },
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observation::timestamp;

    fn valid() -> Observation {
        Observation {
            temperature: 25.0,
            humidity: 60.0,
            ghi: 500.0,
            timestamp: timestamp::parse("2024-06-01T12:00:00").unwrap(),
            power_t_1: 120.0,
            power_t_2: 115.0,
        }
    }

    fn field_of(obs: Observation) -> Option<&'static str> {
        ConstraintValidator::default()
            .validate(obs)
            .err()
            .map(|e| e.field)
    }

    #[test]
    fn accepts_valid_observation_unchanged() {
        let obs = valid();
        assert_eq!(ConstraintValidator::default().validate(obs), Ok(obs));
    }

    #[test]
    fn rejects_humidity_out_of_range() {
        for h in [150.0, 100.0001, -0.5, -20.0] {
            let obs = Observation { humidity: h, ..valid() };
            assert_eq!(field_of(obs), Some("humidity"), "humidity {h}");
        }
    }

    #[test]
    fn humidity_bounds_are_inclusive() {
        for h in [0.0, 100.0] {
            let obs = Observation { humidity: h, ..valid() };
            assert!(ConstraintValidator::default().validate(obs).is_ok());
        }
    }

    #[test]
    fn rejects_negative_ghi() {
        let obs = Observation { ghi: -1.0, ..valid() };
        let err = ConstraintValidator::default().validate(obs).unwrap_err();
        assert_eq!(err.field, "ghi");
        assert_eq!(err.bound, Bound::Within { min: 0.0, max: 1500.0 });
    }

    #[test]
    fn rejects_implausible_temperature() {
        assert_eq!(field_of(Observation { temperature: -60.0, ..valid() }), Some("temperature"));
        assert_eq!(field_of(Observation { temperature: 75.0, ..valid() }), Some("temperature"));
    }

    #[test]
    fn rejects_negative_power_lags() {
        assert_eq!(field_of(Observation { power_t_1: -3.0, ..valid() }), Some("power_t_1"));
        assert_eq!(field_of(Observation { power_t_2: -0.1, ..valid() }), Some("power_t_2"));
    }

    #[test]
    fn rejects_non_finite_values() {
        let err = ConstraintValidator::default()
            .validate(Observation { ghi: f64::NAN, ..valid() })
            .unwrap_err();
        assert_eq!(err.field, "ghi");
        assert_eq!(err.bound, Bound::Finite);
        assert_eq!(
            field_of(Observation { temperature: f64::INFINITY, ..valid() }),
            Some("temperature")
        );
    }

    #[test]
    fn custom_bounds_apply() {
        let validator = ConstraintValidator::new(PlausibilityBounds {
            temperature_min_c: -10.0,
            ..PlausibilityBounds::default()
        });
        let obs = Observation { temperature: -15.0, ..valid() };
        assert_eq!(validator.validate(obs).unwrap_err().field, "temperature");
    }

    #[test]
    fn error_message_names_field_and_bound() {
        let err = ConstraintValidator::default()
            .validate(Observation { humidity: 150.0, ..valid() })
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("humidity"));
        assert!(msg.contains("[0, 100]"));
    }
}
