//! API response types.
//!
//! Request bodies deserialize straight into [`Observation`]; health and
//! prediction responses reuse the service types.
//!
//! [`Observation`]: crate::observation::Observation

use serde::Serialize;

use crate::validation::ValidationError;

/// `GET /` banner.
#[derive(Debug, Serialize)]
pub struct RootResponse {
    /// `"ok"` once Ready, `"warning"` otherwise.
    pub status: &'static str,
    /// Human-readable readiness message.
    pub message: &'static str,
}

/// Error body for 4xx/5xx responses.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Human-readable error message.
    pub error: String,
    /// Offending request field, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    /// Violated constraint, for validation failures.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bound: Option<String>,
}

impl ErrorResponse {
    pub fn message(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            field: None,
            bound: None,
        }
    }
}

impl From<&ValidationError> for ErrorResponse {
    fn from(e: &ValidationError) -> Self {
        Self {
            error: e.to_string(),
            field: Some(e.field.to_string()),
            bound: Some(e.bound.to_string()),
        }
    }
}
