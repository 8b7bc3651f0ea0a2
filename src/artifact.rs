//! Versioned model artifacts: a standard scaler and a random-forest regressor.
//!
//! Artifacts live in one directory as `model_<version>.json` and
//! `scaler_<version>.json`. They are loaded once at startup, checked for
//! structural integrity and for agreement with [`FEATURE_NAMES`], and then
//! shared read-only for the lifetime of the process.
//!
//! The regressor uses the flattened tree layout of common training
//! libraries: per tree, parallel arrays indexed by node id, where a leaf has
//! `children_left == -1`.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::features::{FEATURE_COUNT, FEATURE_NAMES, FeatureVector};

/// Marker for "no child" in the flattened tree arrays.
pub const LEAF: i64 = -1;

/// Failure to bring model artifacts into a servable state.
#[derive(Debug, Error)]
pub enum ArtifactLoadError {
    #[error("artifact file not found: {}", path.display())]
    Missing { path: PathBuf },
    #[error("cannot read artifact {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cannot decode artifact {}: {source}", path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("corrupted {what}: {reason}")]
    Corrupted { what: &'static str, reason: String },
    #[error("{what} expects {found} features, service produces {expected}")]
    SchemaMismatch {
        what: &'static str,
        expected: usize,
        found: usize,
    },
    #[error("model feature {position} is \"{found}\", service produces \"{expected}\"")]
    FeatureOrder {
        position: usize,
        expected: &'static str,
        found: String,
    },
}

/// Per-feature standardization `(x - mean) / scale`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StandardScaler {
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

impl StandardScaler {
    pub fn width(&self) -> usize {
        self.mean.len()
    }

    /// Standardizes a feature vector.
    ///
    /// Returns `None` if the scaler was fitted on a different width.
    pub fn transform(&self, features: &FeatureVector) -> Option<FeatureVector> {
        if self.mean.len() != FEATURE_COUNT || self.scale.len() != FEATURE_COUNT {
            return None;
        }
        let mut out = features.values();
        for (i, x) in out.iter_mut().enumerate() {
            *x = (*x - self.mean[i]) / self.scale[i];
        }
        Some(FeatureVector::from_values(out))
    }

    fn check(&self) -> Result<(), ArtifactLoadError> {
        let corrupted = |reason: String| ArtifactLoadError::Corrupted {
            what: "scaler",
            reason,
        };
        if self.mean.len() != self.scale.len() {
            return Err(corrupted(format!(
                "mean has {} entries but scale has {}",
                self.mean.len(),
                self.scale.len()
            )));
        }
        if let Some(i) = self.mean.iter().position(|m| !m.is_finite()) {
            return Err(corrupted(format!("mean[{i}] is not finite")));
        }
        if let Some(i) = self
            .scale
            .iter()
            .position(|s| !s.is_finite() || *s == 0.0)
        {
            return Err(corrupted(format!("scale[{i}] must be finite and non-zero")));
        }
        Ok(())
    }
}

/// One regression tree in flattened array form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegressionTree {
    pub children_left: Vec<i64>,
    pub children_right: Vec<i64>,
    pub feature: Vec<i64>,
    pub threshold: Vec<f64>,
    pub value: Vec<f64>,
}

impl RegressionTree {
    /// A single-node tree that always predicts `value`.
    pub fn leaf(value: f64) -> Self {
        Self {
            children_left: vec![LEAF],
            children_right: vec![LEAF],
            feature: vec![-2],
            threshold: vec![-2.0],
            value: vec![value],
        }
    }

    /// A depth-one tree: `left` if `x[feature] <= threshold`, else `right`.
    pub fn stump(feature: usize, threshold: f64, left: f64, right: f64) -> Self {
        Self {
            children_left: vec![1, LEAF, LEAF],
            children_right: vec![2, LEAF, LEAF],
            feature: vec![feature as i64, -2, -2],
            threshold: vec![threshold, -2.0, -2.0],
            value: vec![(left + right) / 2.0, left, right],
        }
    }

    pub fn node_count(&self) -> usize {
        self.value.len()
    }

    /// Walks the tree from the root for input `x`.
    ///
    /// Returns `None` if the walk leaves the node arrays or does not reach
    /// a leaf within `node_count` steps. Neither can happen for a tree that
    /// passed the load-time checks.
    pub fn evaluate(&self, x: &[f64]) -> Option<f64> {
        let mut node = 0usize;
        for _ in 0..self.node_count() {
            let left = *self.children_left.get(node)?;
            if left == LEAF {
                return self.value.get(node).copied();
            }
            let feature = usize::try_from(*self.feature.get(node)?).ok()?;
            let next = if *x.get(feature)? <= *self.threshold.get(node)? {
                left
            } else {
                *self.children_right.get(node)?
            };
            node = usize::try_from(next).ok()?;
        }
        None
    }

    fn check(&self, n_features: usize) -> Result<(), String> {
        let n = self.node_count();
        if n == 0 {
            return Err("tree has no nodes".to_string());
        }
        let lens = [
            self.children_left.len(),
            self.children_right.len(),
            self.feature.len(),
            self.threshold.len(),
        ];
        if lens.iter().any(|len| *len != n) {
            return Err(format!("node arrays disagree in length ({lens:?} vs {n})"));
        }

        for i in 0..n {
            let (left, right) = (self.children_left[i], self.children_right[i]);
            if left == LEAF {
                if right != LEAF {
                    return Err(format!("node {i} has a right child but no left child"));
                }
                if !self.value[i].is_finite() {
                    return Err(format!("leaf {i} has a non-finite value"));
                }
                continue;
            }
            // Children must point forward so every walk terminates.
            for child in [left, right] {
                if child <= i as i64 || child >= n as i64 {
                    return Err(format!("node {i} has invalid child {child}"));
                }
            }
            if self.feature[i] < 0 || self.feature[i] >= n_features as i64 {
                return Err(format!(
                    "node {i} splits on feature {} (model has {n_features})",
                    self.feature[i]
                ));
            }
            if !self.threshold[i].is_finite() {
                return Err(format!("node {i} has a non-finite threshold"));
            }
        }
        Ok(())
    }
}

/// Random-forest regressor: the mean of its trees' outputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ForestRegressor {
    /// Input width the forest was trained on.
    pub n_features: usize,
    /// Training column names, when the exporter recorded them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature_names: Option<Vec<String>>,
    pub trees: Vec<RegressionTree>,
}

impl ForestRegressor {
    pub fn new(n_features: usize, trees: Vec<RegressionTree>) -> Self {
        Self {
            n_features,
            feature_names: None,
            trees,
        }
    }

    fn check(&self) -> Result<(), ArtifactLoadError> {
        if self.trees.is_empty() {
            return Err(ArtifactLoadError::Corrupted {
                what: "model",
                reason: "forest has no trees".to_string(),
            });
        }
        for (index, tree) in self.trees.iter().enumerate() {
            tree.check(self.n_features)
                .map_err(|reason| ArtifactLoadError::Corrupted {
                    what: "model",
                    reason: format!("tree {index}: {reason}"),
                })?;
        }
        Ok(())
    }
}

/// A loaded, checked (scaler, regressor) pair.
///
/// Only constructible through [`ModelArtifact::new`] or
/// [`ArtifactStore::load`], both of which run the full integrity and schema
/// checks.
#[derive(Debug, Clone)]
pub struct ModelArtifact {
    version: String,
    scaler: StandardScaler,
    model: ForestRegressor,
}

impl ModelArtifact {
    /// Checks and pairs a scaler with a regressor.
    ///
    /// # Errors
    ///
    /// Returns [`ArtifactLoadError`] if either part is malformed or if they
    /// disagree with the service's feature layout.
    pub fn new(
        version: impl Into<String>,
        scaler: StandardScaler,
        model: ForestRegressor,
    ) -> Result<Self, ArtifactLoadError> {
        scaler.check()?;
        model.check()?;
        check_schema(&scaler, &model)?;
        Ok(Self {
            version: version.into(),
            scaler,
            model,
        })
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn scaler(&self) -> &StandardScaler {
        &self.scaler
    }

    pub fn model(&self) -> &ForestRegressor {
        &self.model
    }

    pub fn feature_count(&self) -> usize {
        self.model.n_features
    }
}

/// Schema consistency between the artifact pair and [`FEATURE_NAMES`].
fn check_schema(scaler: &StandardScaler, model: &ForestRegressor) -> Result<(), ArtifactLoadError> {
    if scaler.width() != FEATURE_COUNT {
        return Err(ArtifactLoadError::SchemaMismatch {
            what: "scaler",
            expected: FEATURE_COUNT,
            found: scaler.width(),
        });
    }
    if model.n_features != FEATURE_COUNT {
        return Err(ArtifactLoadError::SchemaMismatch {
            what: "model",
            expected: FEATURE_COUNT,
            found: model.n_features,
        });
    }
    if let Some(names) = &model.feature_names {
        if names.len() != FEATURE_COUNT {
            return Err(ArtifactLoadError::SchemaMismatch {
                what: "model feature_names",
                expected: FEATURE_COUNT,
                found: names.len(),
            });
        }
        for (position, (found, expected)) in names.iter().zip(FEATURE_NAMES).enumerate() {
            if found != expected {
                return Err(ArtifactLoadError::FeatureOrder {
                    position,
                    expected,
                    found: found.clone(),
                });
            }
        }
    }
    Ok(())
}

/// Read-only view of a versioned artifact directory.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
    version: String,
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>, version: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            version: version.into(),
        }
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn model_path(&self) -> PathBuf {
        self.dir.join(format!("model_{}.json", self.version))
    }

    pub fn scaler_path(&self) -> PathBuf {
        self.dir.join(format!("scaler_{}.json", self.version))
    }

    /// Reads, decodes, and checks both artifact files.
    ///
    /// # Returns
    ///
    /// A [`ModelArtifact`] whose scaler and forest agree on the feature layout.
    ///
    /// # Errors
    ///
    /// Returns [`ArtifactLoadError`] if a file is missing, unreadable,
    /// undecodable, structurally corrupted, or schema-incompatible.
    pub fn load(&self) -> Result<ModelArtifact, ArtifactLoadError> {
        let scaler_path = self.scaler_path();
        let model_path = self.model_path();
        let scaler: StandardScaler = read_json(&scaler_path)?;
        let model: ForestRegressor = read_json(&model_path)?;
        let artifact = ModelArtifact::new(self.version.clone(), scaler, model)?;

        info!(
            version = %self.version,
            trees = artifact.model().trees.len(),
            model = %model_path.display(),
            scaler = %scaler_path.display(),
            "model artifacts loaded"
        );
        Ok(artifact)
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, ArtifactLoadError> {
    let content = fs::read_to_string(path).map_err(|source| {
        if source.kind() == io::ErrorKind::NotFound {
            ArtifactLoadError::Missing {
                path: path.to_path_buf(),
            }
        } else {
            ArtifactLoadError::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    })?;
    serde_json::from_str(&content).map_err(|source| ArtifactLoadError::Decode {
        path: path.to_path_buf(),
        source,
    })
}
