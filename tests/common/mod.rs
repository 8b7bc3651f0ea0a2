//! Shared test fixtures for integration tests.

#![allow(dead_code)]

use std::fs;
use std::path::Path;

use serde_json::json;

use solar_forecast::features::FEATURE_NAMES;

/// Version used by every fixture artifact pair.
pub const VERSION: &str = "v2";

/// Prediction for [`SCENARIO_BODY`] under the fixture forest.
pub const SCENARIO_POWER: f64 = 360.0;

/// The reference request body: 25 °C, 60 %, 500 W/m², noon, lags 120/115.
pub const SCENARIO_BODY: &str = r#"{
    "temperature": 25,
    "humidity": 60,
    "ghi": 500,
    "timestamp": "2024-06-01T12:00:00",
    "power_t_1": 120.0,
    "power_t_2": 115.0
}"#;

/// Writes `scaler_v2.json` and `model_v2.json` into `dir`.
///
/// The forest has a depth-two tree (irradiance, then temperature or
/// recent power) and a stump on the t-1 power lag, in the same flattened
/// layout a training pipeline exports.
pub fn write_fixture_artifacts(dir: &Path) {
    let scaler = json!({
        "mean": [20.0, 50.0, 400.0, 0.0, 0.0, 100.0, 100.0],
        "scale": [10.0, 20.0, 300.0, 0.7, 0.7, 80.0, 80.0],
    });
    let model = json!({
        "n_features": 7,
        "feature_names": FEATURE_NAMES,
        "trees": [
            {
                "children_left":  [1, 3, 5, -1, -1, -1, -1],
                "children_right": [2, 4, 6, -1, -1, -1, -1],
                "feature":        [2, 5, 0, -2, -2, -2, -2],
                "threshold":      [0.0, -1.0, 2.0, -2.0, -2.0, -2.0, -2.0],
                "value":          [200.0, 30.0, 335.0, 0.0, 60.0, 420.0, 250.0]
            },
            {
                "children_left":  [1, -1, -1],
                "children_right": [2, -1, -1],
                "feature":        [5, -2, -2],
                "threshold":      [0.0, -2.0, -2.0],
                "value":          [190.0, 80.0, 300.0]
            }
        ]
    });

    fs::write(dir.join(format!("scaler_{VERSION}.json")), scaler.to_string())
        .expect("scaler fixture should be writable");
    fs::write(dir.join(format!("model_{VERSION}.json")), model.to_string())
        .expect("model fixture should be writable");
}

/// Writes a model whose width disagrees with the scaler.
pub fn write_mismatched_artifacts(dir: &Path) {
    write_fixture_artifacts(dir);
    let model = json!({
        "n_features": 6,
        "trees": [{
            "children_left": [-1], "children_right": [-1],
            "feature": [-2], "threshold": [-2.0], "value": [1.0]
        }]
    });
    fs::write(dir.join(format!("model_{VERSION}.json")), model.to_string())
        .expect("model fixture should be writable");
}
