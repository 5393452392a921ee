//! Report payload types

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A single report: this operator is running this version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    /// Operator contact address identifying the installation
    pub email: String,

    /// Software version string as reported by the client
    pub version: String,
}

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("invalid report payload: {0}")]
    Json(#[from] serde_json::Error),
    #[error("report payload must be a JSON object")]
    NotAnObject,
    #[error("field `{0}` must not be blank")]
    Blank(&'static str),
}

impl Report {
    /// Decode a request body into a report.
    ///
    /// The body must be a JSON object. Both fields are required and must
    /// contain something other than whitespace. Extra fields are ignored.
    pub fn decode(body: &[u8]) -> Result<Self, ReportError> {
        let value: serde_json::Value = serde_json::from_slice(body)?;
        if !value.is_object() {
            return Err(ReportError::NotAnObject);
        }
        let report: Report = serde_json::from_value(value)?;

        if report.email.trim().is_empty() {
            return Err(ReportError::Blank("email"));
        }
        if report.version.trim().is_empty() {
            return Err(ReportError::Blank("version"));
        }

        Ok(report)
    }
}
