use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// Category of a failed analysis, as reported to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFood,
    MalformedResponse,
    SchemaViolation,
    ServiceFailure,
}

impl ErrorKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotFood => "not_food",
            Self::MalformedResponse => "malformed_response",
            Self::SchemaViolation => "schema_violation",
            Self::ServiceFailure => "service_failure",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal outcome of an analysis that did not produce a record.
///
/// None of these are retried by the analyzer; the caller decides.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AnalysisError {
    #[error("Image does not show recognizable food: {0}")]
    NotFood(String),

    #[error("Vision service returned unparseable output: {0}")]
    MalformedResponse(String),

    #[error("Nutrition data failed validation: {0}")]
    SchemaViolation(String),

    #[error("Vision service request failed: {0}")]
    ServiceFailure(String),
}

impl AnalysisError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFood(_) => ErrorKind::NotFood,
            Self::MalformedResponse(_) => ErrorKind::MalformedResponse,
            Self::SchemaViolation(_) => ErrorKind::SchemaViolation,
            Self::ServiceFailure(_) => ErrorKind::ServiceFailure,
        }
    }

    /// The detail message without the category prefix.
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::NotFood(msg)
            | Self::MalformedResponse(msg)
            | Self::SchemaViolation(msg)
            | Self::ServiceFailure(msg) => msg,
        }
    }
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing API key for the vision service")]
    MissingApiKey,

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}
