//! Error taxonomy for harness operations.
//!
//! Every failure a fixture can hit maps onto one [`HarnessError`] variant:
//!
//! | Variant       | Origin                                      | Retried by the poller |
//! |---------------|---------------------------------------------|-----------------------|
//! | `Http`        | non-2xx status from the cluster             | 404, 429, 5xx only    |
//! | `Transport`   | connection refused, socket timeout          | yes                   |
//! | `Decode`      | body is not a JSON document                 | no                    |
//! | `Path`        | expected structure missing from a document  | yes                   |
//! | `Assertion`   | a check evaluated to false                  | yes                   |
//! | `PollTimeout` | deadline passed, wraps the last failure     | no                    |
//! | `Resource`    | unknown bundled payload                     | no                    |
//! | `Cleanup`     | body and release step both failed           | no                    |

use std::fmt;
use std::time::Duration;

use serde_json::Value;

use crate::client::Method;

/// Non-2xx response from the remote system.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{method} {path} returned status {status}: {body}")]
pub struct HttpError {
    pub method: Method,
    pub path: String,
    pub status: u16,
    pub body: String,
}

impl HttpError {
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status)
    }

    pub fn is_server_error(&self) -> bool {
        self.status >= 500
    }

    /// Structured `error.type` from an upstream error body, if any.
    pub fn error_type(&self) -> Option<String> {
        self.error_field("type")
    }

    /// Structured `error.reason` from an upstream error body, if any.
    pub fn reason(&self) -> Option<String> {
        self.error_field("reason")
    }

    /// Whether the reason (or the raw body when no reason is present) mentions `needle`.
    pub fn mentions(&self, needle: &str) -> bool {
        match self.reason() {
            Some(reason) if reason.contains(needle) => true,
            _ => self.body.contains(needle),
        }
    }

    fn error_field(&self, field: &str) -> Option<String> {
        let parsed: Value = serde_json::from_str(&self.body).ok()?;
        parsed
            .get("error")
            .and_then(|error| error.get(field))
            .and_then(Value::as_str)
            .map(str::to_string)
    }
}

/// Response body could not be decoded into a document.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("response body is empty")]
    Empty,

    #[error("malformed JSON at line {line}, column {column}: {message}")]
    Malformed {
        line: usize,
        column: usize,
        message: String,
    },
}

impl From<serde_json::Error> for DecodeError {
    fn from(err: serde_json::Error) -> Self {
        Self::Malformed {
            line: err.line(),
            column: err.column(),
            message: err.to_string(),
        }
    }
}

/// Path traversal through a document failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathError {
    #[error("path '{path}': segment '{segment}' not found")]
    MissingSegment { path: String, segment: String },

    #[error("path '{path}': cannot descend into segment '{segment}' of a {found}")]
    NotTraversable {
        path: String,
        segment: String,
        found: &'static str,
    },

    #[error("path '{path}': expected {expected}, found {found}")]
    TypeMismatch {
        path: String,
        expected: &'static str,
        found: String,
    },
}

impl PathError {
    /// The segment at which traversal stopped, when traversal was the problem.
    pub fn missing_segment(&self) -> Option<&str> {
        match self {
            Self::MissingSegment { segment, .. } | Self::NotTraversable { segment, .. } => {
                Some(segment)
            }
            Self::TypeMismatch { .. } => None,
        }
    }
}

/// Low-level transport failure before any HTTP status was received.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{method} {path}: {message}")]
pub struct TransportError {
    pub method: Method,
    pub path: String,
    pub message: String,
}

/// Error type for harness operations.
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    #[error(transparent)]
    Http(#[from] HttpError),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Path(#[from] PathError),

    #[error("assertion failed: {0}")]
    Assertion(String),

    #[error("{what} did not converge after {attempts} attempts in {elapsed:?}; last failure: {last}")]
    PollTimeout {
        what: String,
        attempts: u32,
        elapsed: Duration,
        last: Box<HarnessError>,
    },

    #[error("resource not found: {0}")]
    Resource(String),

    #[error("{primary}; cleanup also failed: {cleanup}")]
    Cleanup {
        primary: Box<HarnessError>,
        cleanup: Box<HarnessError>,
    },
}

/// Result type for harness operations
pub type HarnessResult<T> = Result<T, HarnessError>;

impl HarnessError {
    pub fn assertion(message: impl fmt::Display) -> Self {
        Self::Assertion(message.to_string())
    }

    /// The HTTP error behind this failure, if it is one.
    pub fn as_http(&self) -> Option<&HttpError> {
        match self {
            Self::Http(err) => Some(err),
            _ => None,
        }
    }

    /// Stable kind label used in reports and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Http(_) => "http",
            Self::Transport(_) => "transport",
            Self::Decode(_) => "decode",
            Self::Path(_) => "path",
            Self::Assertion(_) => "assertion",
            Self::PollTimeout { .. } => "poll_timeout",
            Self::Resource(_) => "resource",
            Self::Cleanup { .. } => "cleanup",
        }
    }
}

/// Errors that can be retried.
pub trait RetryableError {
    /// Whether the poller should re-evaluate after this error.
    fn is_retryable(&self) -> bool;
}

impl RetryableError for HttpError {
    fn is_retryable(&self) -> bool {
        matches!(self.status, 404 | 429) || self.is_server_error()
    }
}

impl RetryableError for HarnessError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Assertion(_) | Self::Path(_) | Self::Transport(_) => true,
            Self::Http(err) => err.is_retryable(),
            Self::Decode(_) | Self::PollTimeout { .. } | Self::Resource(_) | Self::Cleanup { .. } => {
                false
            }
        }
    }
}
