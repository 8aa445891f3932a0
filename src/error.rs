//! Error types for `redmine2gitlab`.
//!
//! Failures fall into three classes:
//! - connectivity (fatal, aborts the run)
//! - not-found (recoverable, callers fall back to a default)
//! - rejected writes (recoverable per record, collected in the project report)

use serde::Serialize;
use thiserror::Error;

/// Errors produced while talking to either backend or replaying history.
#[derive(Debug, Error)]
pub enum MigrateError {
    #[error("connection to {host} failed: {reason}")]
    Connectivity { host: String, reason: String },

    #[error("missing credential: {0}")]
    MissingCredential(&'static str),

    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },

    #[error("{resource} rejected (HTTP {status}): {message}")]
    Rejected {
        resource: &'static str,
        status: u16,
        message: String,
    },

    #[error("response for {path} has no `{key}` envelope")]
    Envelope { path: String, key: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Stable machine-readable error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    Connectivity,
    MissingCredential,
    NotFound,
    Rejected,
    Envelope,
    Config,
    Internal,
    Io,
    Json,
    Yaml,
}

impl ErrorCode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Connectivity => "connectivity",
            Self::MissingCredential => "missing_credential",
            Self::NotFound => "not_found",
            Self::Rejected => "rejected",
            Self::Envelope => "envelope",
            Self::Config => "config",
            Self::Internal => "internal",
            Self::Io => "io_error",
            Self::Json => "json_error",
            Self::Yaml => "yaml_error",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl MigrateError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Connectivity { .. } => ErrorCode::Connectivity,
            Self::MissingCredential(_) => ErrorCode::MissingCredential,
            Self::NotFound { .. } => ErrorCode::NotFound,
            Self::Rejected { .. } => ErrorCode::Rejected,
            Self::Envelope { .. } => ErrorCode::Envelope,
            Self::Config(_) => ErrorCode::Config,
            Self::Internal(_) => ErrorCode::Internal,
            Self::Io(_) => ErrorCode::Io,
            Self::Json(_) => ErrorCode::Json,
            Self::Yaml(_) => ErrorCode::Yaml,
        }
    }

    /// Fatal errors abort the whole run instead of being recorded per record.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Connectivity { .. } | Self::MissingCredential(_) | Self::Internal(_)
        )
    }

    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    #[must_use]
    pub fn structured(&self) -> StructuredError {
        StructuredError {
            code: self.code(),
            message: self.to_string(),
        }
    }
}

/// Serializable view of an error, used in JSON reports.
#[derive(Debug, Clone, Serialize)]
pub struct StructuredError {
    pub code: ErrorCode,
    pub message: String,
}

pub type Result<T> = std::result::Result<T, MigrateError>;
