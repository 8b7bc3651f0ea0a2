//! Scaler + forest evaluation producing a power estimate in Watts.

use thiserror::Error;

use crate::artifact::ModelArtifact;
use crate::features::FeatureVector;

/// A prediction-time fault after the input passed validation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PredictError {
    #[error("scaler width {scaler} does not match the feature vector")]
    WidthMismatch { scaler: usize },
    #[error("tree {index} did not reach a leaf")]
    MalformedTree { index: usize },
    #[error("model produced a non-finite output ({0})")]
    NonFinite(f64),
}

/// Negative output is physically impossible; report it as zero generation.
pub fn clamp_non_negative(raw: f64) -> f64 {
    if raw < 0.0 { 0.0 } else { raw }
}

/// Unclamped forest output for a feature vector.
///
/// # Errors
///
/// Returns [`PredictError`] if the artifact cannot be evaluated or yields a
/// non-finite value.
pub fn predict_raw(features: &FeatureVector, artifact: &ModelArtifact) -> Result<f64, PredictError> {
    let scaler = artifact.scaler();
    let scaled = scaler
        .transform(features)
        .ok_or(PredictError::WidthMismatch {
            scaler: scaler.width(),
        })?;

    let trees = &artifact.model().trees;
    let mut sum = 0.0;
    for (index, tree) in trees.iter().enumerate() {
        sum += tree
            .evaluate(scaled.as_slice())
            .ok_or(PredictError::MalformedTree { index })?;
    }
    let raw = sum / trees.len() as f64;

    if !raw.is_finite() {
        return Err(PredictError::NonFinite(raw));
    }
    Ok(raw)
}

/// Predicted power output (W), never negative.
///
/// Standardizes `features` with the artifact's scaler, averages the forest,
/// then clamps negative output to zero. Reads the artifact only.
///
/// # Arguments
///
/// * `features` - Unscaled model input from [`crate::features::transform`]
/// * `artifact` - Loaded scaler and forest pair
///
/// # Returns
///
/// Mean of the tree outputs, floored at zero.
///
/// # Errors
///
/// See [`predict_raw`].
pub fn predict(features: &FeatureVector, artifact: &ModelArtifact) -> Result<f64, PredictError> {
    predict_raw(features, artifact).map(clamp_non_negative)
}
