//! Error types shared across the workspace.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors reported by a remote listing API.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    /// The remote asked us to slow down.
    #[error("Rate limited (suggested wait: {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    /// 5xx-class failure on the remote side.
    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },

    /// Connection dropped, timed out, or similar.
    #[error("Transport error: {message}")]
    Transport { message: String },

    /// The continuation cursor is no longer valid.
    #[error("Cursor reset: {message}")]
    CursorReset { message: String },

    /// Credentials were rejected or revoked.
    #[error("Authentication failed: {message}")]
    Auth { message: String },

    /// Any other 4xx-class rejection (bad path, malformed request, ...).
    #[error("Request rejected ({status}): {message}")]
    Client { status: u16, message: String },
}

/// How a failure should be handled by a retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Back off (for the suggested wait, if any) and retry.
    RateLimited { retry_after: Option<Duration> },
    /// Back off exponentially and retry.
    Transient,
    /// Do not retry.
    Permanent,
}

impl RemoteError {
    /// Map an HTTP-style status code onto an error.
    pub fn from_status(status: u16, message: impl Into<String>, retry_after: Option<Duration>) -> Self {
        let message = message.into();
        match status {
            429 => Self::RateLimited { retry_after },
            401 | 403 => Self::Auth { message },
            409 if message.contains("reset") => Self::CursorReset { message },
            500..=599 => Self::Server { status, message },
            _ => Self::Client { status, message },
        }
    }

    /// Classify this error for retry decisions.
    pub fn class(&self) -> FailureClass {
        match self {
            Self::RateLimited { retry_after } => FailureClass::RateLimited {
                retry_after: *retry_after,
            },
            Self::Server { .. } | Self::Transport { .. } => FailureClass::Transient,
            Self::CursorReset { .. } | Self::Auth { .. } | Self::Client { .. } => {
                FailureClass::Permanent
            }
        }
    }

    /// Check if a retry could help.
    pub fn is_retryable(&self) -> bool {
        self.class() != FailureClass::Permanent
    }
}

/// Kind of entry warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WarningKind {
    /// Record tag is neither file, folder nor deleted.
    UnknownKind,
    /// A field required for this kind is missing.
    MissingField,
    /// Path is empty, relative, or has an empty leaf name.
    MalformedPath,
}

/// Non-fatal problem with a record received from the remote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryWarning {
    /// Path of the offending record, as far as it is known.
    pub path: String,
    /// Human-readable message.
    pub message: String,
    /// Kind of warning.
    pub kind: WarningKind,
}

impl EntryWarning {
    /// Create a new entry warning.
    pub fn new(path: impl Into<String>, message: impl Into<String>, kind: WarningKind) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
            kind,
        }
    }

    /// Create a missing field warning.
    pub fn missing_field(path: impl Into<String>, field: &str) -> Self {
        Self::new(path, format!("Missing field: {field}"), WarningKind::MissingField)
    }

    /// Create an unknown kind warning.
    pub fn unknown_kind(path: impl Into<String>, tag: &str) -> Self {
        Self::new(path, format!("Unrecognized entry type: {tag}"), WarningKind::UnknownKind)
    }
}
