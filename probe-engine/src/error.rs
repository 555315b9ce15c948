//! Error types for the probe engine

use thiserror::Error;

/// Main error type for probe engine operations
///
/// Spec validation errors (`MissingField`, `InvalidParam`) are raised inside
/// a probe, caught at the runner boundary, and reported as a single `Error`
/// event; the run continues with the next spec. Per-request network failures
/// are never represented here - they are captured into `RequestLog.error`.
#[derive(Debug, Error, Clone, serde::Serialize, serde::Deserialize)]
pub enum ProbeError {
    #[error("Missing required field: {field} - {reason}")]
    MissingField { field: String, reason: String },

    #[error("Invalid parameter: {field} - {reason}")]
    InvalidParam { field: String, reason: String },

    #[error("Plan decode failed: {reason}")]
    PlanDecode { reason: String },

    #[error("HTTP client construction failed: {reason}")]
    ClientBuild { reason: String },
}

impl ProbeError {
    /// Create a missing-field error
    pub fn missing(field: &str, reason: &str) -> Self {
        Self::MissingField {
            field: field.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Create an invalid-parameter error
    pub fn invalid(field: &str, reason: &str) -> Self {
        Self::InvalidParam {
            field: field.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Check whether the error originated from the spec itself rather than
    /// the environment (spec errors abandon one spec, never the run)
    pub fn is_spec_error(&self) -> bool {
        matches!(
            self,
            ProbeError::MissingField { .. } | ProbeError::InvalidParam { .. }
        )
    }
}

impl From<serde_json::Error> for ProbeError {
    fn from(error: serde_json::Error) -> Self {
        ProbeError::PlanDecode {
            reason: error.to_string(),
        }
    }
}

/// Result type for probe engine operations
pub type ProbeResult<T> = Result<T, ProbeError>;
