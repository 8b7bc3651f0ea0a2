//! Inference service: the composition root for one prediction request.
//!
//! Lifecycle has two states. The service is built Uninitialized, and
//! [`InferenceService::start`] loads the artifacts exactly once to make it
//! Ready. A failed start leaves it Uninitialized; callers are expected to
//! exit rather than serve. Requests only ever read the loaded artifact.

use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::artifact::{ArtifactLoadError, ArtifactStore, ModelArtifact};
use crate::features;
use crate::observation::Observation;
use crate::prediction_log::PredictionLogger;
use crate::predictor::{self, PredictError};
use crate::validation::{ConstraintValidator, ValidationError};

/// Unit attached to every prediction.
pub const POWER_UNIT: &str = "Watts";

/// Lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ServiceState {
    #[serde(rename = "uninitialized")]
    Uninitialized,
    #[serde(rename = "ok")]
    Ready,
}

/// Health report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Health {
    pub status: ServiceState,
    /// Loaded version when Ready, the configured version otherwise.
    pub model_version: String,
    /// Prediction log appends that failed since startup.
    pub log_write_failures: u64,
}

/// Successful prediction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    pub predicted_power: f64,
    pub unit: &'static str,
    pub model_version: String,
}

/// Why a prediction request was not served.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Caller supplied an implausible observation.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// Artifact or predictor fault after validation passed.
    #[error("internal prediction failure")]
    Internal(#[source] PredictError),
    /// Artifacts are not loaded.
    #[error("model artifacts are not loaded")]
    Unavailable,
}

/// Validator → transformer → predictor → logger pipeline over a shared,
/// immutable model artifact.
#[derive(Debug)]
pub struct InferenceService {
    store: ArtifactStore,
    validator: ConstraintValidator,
    logger: PredictionLogger,
    artifact: OnceLock<ModelArtifact>,
    log_write_failures: AtomicU64,
}

impl InferenceService {
    /// Builds an Uninitialized service. Nothing is read from disk yet.
    pub fn new(
        store: ArtifactStore,
        validator: ConstraintValidator,
        logger: PredictionLogger,
    ) -> Self {
        Self {
            store,
            validator,
            logger,
            artifact: OnceLock::new(),
            log_write_failures: AtomicU64::new(0),
        }
    }

    /// Loads artifacts and transitions to Ready.
    ///
    /// Calling `start` on a Ready service returns the already loaded
    /// artifact without touching the store.
    ///
    /// # Errors
    ///
    /// Returns [`ArtifactLoadError`] if the artifacts cannot be loaded; the
    /// service stays Uninitialized.
    pub fn start(&self) -> Result<&ModelArtifact, ArtifactLoadError> {
        if let Some(artifact) = self.artifact.get() {
            return Ok(artifact);
        }
        let loaded = self.store.load()?;
        let artifact = self.artifact.get_or_init(|| loaded);
        info!(version = artifact.version(), "inference service ready");
        Ok(artifact)
    }

    pub fn state(&self) -> ServiceState {
        if self.artifact.get().is_some() {
            ServiceState::Ready
        } else {
            ServiceState::Uninitialized
        }
    }

    pub fn artifact(&self) -> Option<&ModelArtifact> {
        self.artifact.get()
    }

    pub fn logger(&self) -> &PredictionLogger {
        &self.logger
    }

    pub fn health(&self) -> Health {
        let model_version = self
            .artifact
            .get()
            .map_or(self.store.version(), ModelArtifact::version)
            .to_string();
        Health {
            status: self.state(),
            model_version,
            log_write_failures: self.log_write_failures.load(Ordering::Relaxed),
        }
    }

    /// Runs the full pipeline for one observation.
    ///
    /// A failure to append to the prediction log is reported through
    /// `tracing` and [`Health::log_write_failures`] but does not fail the
    /// request.
    ///
    /// # Arguments
    ///
    /// * `observation` - Decoded request body, not yet validated
    ///
    /// # Returns
    ///
    /// The clamped estimate with its unit and the serving model version.
    ///
    /// # Errors
    ///
    /// - [`ServiceError::Unavailable`] before a successful [`start`](Self::start)
    /// - [`ServiceError::Validation`] for implausible input
    /// - [`ServiceError::Internal`] if the predictor fails
    pub fn predict(&self, observation: Observation) -> Result<Prediction, ServiceError> {
        let artifact = self.artifact.get().ok_or(ServiceError::Unavailable)?;

        let observation = self.validator.validate(observation)?;
        let features = features::transform(&observation);
        let predicted_power = predictor::predict(&features, artifact).map_err(|err| {
            error!(error = %err, version = artifact.version(), "prediction failed");
            ServiceError::Internal(err)
        })?;

        if let Err(err) = self
            .logger
            .log(&observation, predicted_power, artifact.version())
        {
            self.log_write_failures.fetch_add(1, Ordering::Relaxed);
            warn!(error = %err, "prediction served but not recorded");
        }

        debug!(predicted_power, version = artifact.version(), "prediction served");
        Ok(Prediction {
            predicted_power,
            unit: POWER_UNIT,
            model_version: artifact.version().to_string(),
        })
    }
}

impl Drop for InferenceService {
    fn drop(&mut self) {
        if let Some(artifact) = self.artifact.get() {
            info!(version = artifact.version(), "model artifacts unloaded");
        }
    }
}
