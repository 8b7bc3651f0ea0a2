//! TOML-based service configuration.

use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::validation::PlausibilityBounds;

/// Top-level service configuration parsed from TOML.
///
/// Every section is optional and falls back to [`ServiceConfig::default`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceConfig {
    /// HTTP listener settings.
    #[serde(default)]
    pub server: ServerConfig,
    /// Model artifact location and version.
    #[serde(default)]
    pub artifacts: ArtifactsConfig,
    /// Prediction audit log.
    #[serde(default)]
    pub prediction_log: PredictionLogConfig,
    /// Plausibility limits for incoming observations.
    #[serde(default)]
    pub bounds: PlausibilityBounds,
}

/// HTTP listener settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Socket address to bind, e.g. `"0.0.0.0:8000"`.
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8000".to_string(),
        }
    }
}

/// Model artifact location and version.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ArtifactsConfig {
    /// Directory holding `model_<version>.json` and `scaler_<version>.json`.
    pub dir: PathBuf,
    /// Artifact version to serve.
    pub model_version: String,
}

impl Default for ArtifactsConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("artifacts"),
            model_version: "v2".to_string(),
        }
    }
}

/// Prediction audit log.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PredictionLogConfig {
    /// CSV file that receives one row per served prediction.
    pub path: PathBuf,
}

impl Default for PredictionLogConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("logs/predictions.csv"),
        }
    }
}

/// Configuration error with field path and constraint description.
#[derive(Debug, Error)]
#[error("config error: {field}: {message}")]
pub struct ConfigError {
    /// Dotted field path (e.g., `"server.bind"`).
    pub field: String,
    /// Human-readable constraint description.
    pub message: String,
}

impl ServiceConfig {
    /// Parses a configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the file cannot be read or the TOML is invalid.
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError {
            field: "config".to_string(),
            message: format!("cannot read \"{}\": {e}", path.display()),
        })?;
        Self::from_toml_str(&content)
    }

    /// Parses a configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the TOML is invalid or contains unknown fields.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|e| ConfigError {
            field: "toml".to_string(),
            message: e.to_string(),
        })
    }

    /// Parsed listener address.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if `server.bind` is not a socket address.
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.server.bind.parse().map_err(|e| ConfigError {
            field: "server.bind".into(),
            message: format!("\"{}\" is not a socket address: {e}", self.server.bind),
        })
    }

    /// Validates all fields and returns a list of errors.
    ///
    /// Returns an empty vector if configuration is valid.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        if let Err(e) = self.bind_addr() {
            errors.push(e);
        }

        let version = &self.artifacts.model_version;
        if version.is_empty() {
            errors.push(ConfigError {
                field: "artifacts.model_version".into(),
                message: "must not be empty".into(),
            });
        } else if version.contains(['/', '\\']) || version.contains("..") {
            errors.push(ConfigError {
                field: "artifacts.model_version".into(),
                message: format!("\"{version}\" must not contain path components"),
            });
        }

        if self.prediction_log.path.as_os_str().is_empty() {
            errors.push(ConfigError {
                field: "prediction_log.path".into(),
                message: "must not be empty".into(),
            });
        }

        let b = &self.bounds;
        let finite = [
            ("bounds.temperature_min_c", b.temperature_min_c),
            ("bounds.temperature_max_c", b.temperature_max_c),
            ("bounds.ghi_max_w_m2", b.ghi_max_w_m2),
            ("bounds.power_max_w", b.power_max_w),
        ];
        for (field, value) in finite {
            if !value.is_finite() {
                errors.push(ConfigError {
                    field: field.into(),
                    message: "must be finite".into(),
                });
            }
        }
        if b.temperature_min_c >= b.temperature_max_c {
            errors.push(ConfigError {
                field: "bounds.temperature_min_c".into(),
                message: "must be < bounds.temperature_max_c".into(),
            });
        }
        if b.ghi_max_w_m2 <= 0.0 {
            errors.push(ConfigError {
                field: "bounds.ghi_max_w_m2".into(),
                message: "must be > 0".into(),
            });
        }
        if b.power_max_w <= 0.0 {
            errors.push(ConfigError {
                field: "bounds.power_max_w".into(),
                message: "must be > 0".into(),
            });
        }

        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_valid() {
        let cfg = ServiceConfig::default();
        let errors = cfg.validate();
        assert!(errors.is_empty(), "default should be valid: {errors:?}");
        assert_eq!(cfg.artifacts.model_version, "v2");
    }

    #[test]
    fn example_config_parses_and_validates() {
        let cfg = ServiceConfig::from_toml_str(include_str!("../config.example.toml"));
        assert!(cfg.is_ok(), "example config should parse: {:?}", cfg.err());
        let errors = cfg.map(|c| c.validate()).unwrap_or_default();
        assert!(errors.is_empty(), "example config should be valid: {errors:?}");
    }

    #[test]
    fn valid_toml_parses() {
        let toml = r#"
[server]
bind = "0.0.0.0:9000"

[artifacts]
dir = "/srv/solar/artifacts"
model_version = "v3"

[prediction_log]
path = "/var/log/solar/predictions.csv"

[bounds]
temperature_min_c = -30.0
temperature_max_c = 55.0
ghi_max_w_m2 = 1400.0
power_max_w = 5000.0
"#;
        let cfg = ServiceConfig::from_toml_str(toml);
        assert!(cfg.is_ok(), "valid TOML should parse: {:?}", cfg.err());
        let cfg = cfg.ok();
        assert_eq!(
            cfg.as_ref().map(|c| c.bind_addr().ok()),
            Some("0.0.0.0:9000".parse().ok())
        );
        assert_eq!(cfg.as_ref().map(|c| &*c.artifacts.model_version), Some("v3"));
        assert_eq!(cfg.as_ref().map(|c| c.bounds.power_max_w), Some(5000.0));
    }

    #[test]
    fn partial_toml_uses_defaults() {
        let toml = r#"
[artifacts]
model_version = "v1"
"#;
        let cfg = ServiceConfig::from_toml_str(toml);
        assert!(cfg.is_ok());
        let cfg = cfg.ok();
        assert_eq!(cfg.as_ref().map(|c| &*c.artifacts.model_version), Some("v1"));
        assert_eq!(
            cfg.as_ref().map(|c| c.artifacts.dir.clone()),
            Some(PathBuf::from("artifacts"))
        );
        assert_eq!(cfg.as_ref().map(|c| c.bounds.temperature_min_c), Some(-40.0));
    }

    #[test]
    fn invalid_toml_unknown_field() {
        let toml = r#"
[server]
bind = "127.0.0.1:8000"
workers = 4
"#;
        assert!(ServiceConfig::from_toml_str(toml).is_err());
    }

    #[test]
    fn validation_catches_bad_bind() {
        let mut cfg = ServiceConfig::default();
        cfg.server.bind = "localhost".to_string();
        let errors = cfg.validate();
        assert!(errors.iter().any(|e| e.field == "server.bind"));
    }

    #[test]
    fn validation_catches_path_like_version() {
        let mut cfg = ServiceConfig::default();
        cfg.artifacts.model_version = "../v2".to_string();
        let errors = cfg.validate();
        assert!(errors.iter().any(|e| e.field == "artifacts.model_version"));
    }

    #[test]
    fn validation_catches_inverted_temperature_range() {
        let mut cfg = ServiceConfig::default();
        cfg.bounds.temperature_min_c = 70.0;
        let errors = cfg.validate();
        assert!(errors.iter().any(|e| e.field == "bounds.temperature_min_c"));
    }

    #[test]
    fn validation_catches_non_positive_limits() {
        let mut cfg = ServiceConfig::default();
        cfg.bounds.ghi_max_w_m2 = 0.0;
        cfg.bounds.power_max_w = -1.0;
        let errors = cfg.validate();
        assert!(errors.iter().any(|e| e.field == "bounds.ghi_max_w_m2"));
        assert!(errors.iter().any(|e| e.field == "bounds.power_max_w"));
    }
}
