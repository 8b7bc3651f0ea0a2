//! Solar power forecasting inference service.
//!
//! An [`service::InferenceService`] loads a versioned scaler and forest
//! once at startup, then turns each [`observation::Observation`] into a
//! clamped power estimate and appends it to the prediction log.

/// REST surface: `GET /`, `GET /health`, `POST /predict`.
#[cfg(feature = "api")]
pub mod api;
/// Versioned scaler and forest artifacts.
pub mod artifact;
/// TOML service configuration.
pub mod config;
/// Observation to feature-vector transformation.
pub mod features;
pub mod observation;
/// Append-only CSV audit trail.
pub mod prediction_log;
pub mod predictor;
/// Lifecycle and the per-request pipeline.
pub mod service;
/// Physical plausibility checks.
pub mod validation;
