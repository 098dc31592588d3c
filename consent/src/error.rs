//! Error types for the login, consent and logout flows.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Result type alias for flow operations.
pub type Result<T> = std::result::Result<T, FlowError>;

/// Denial reported by a login, consent or logout UI.
///
/// The UI rejects a request with one of these; the error is stored with the
/// flow and surfaced unchanged when the verifier is redeemed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestDeniedError {
    /// OAuth 2.0 error code, e.g. `access_denied`.
    #[serde(default)]
    pub error: String,

    /// Human readable description.
    #[serde(default, rename = "error_description")]
    pub description: String,

    /// Hint to help resolve the error.
    #[serde(default, rename = "error_hint")]
    pub hint: String,

    /// HTTP status code to respond with. `0` means 400.
    #[serde(default, rename = "status_code")]
    pub status_code: u16,

    /// Debug information, never shown to end users.
    #[serde(default, rename = "error_debug")]
    pub debug: String,
}

impl RequestDeniedError {
    /// Create a denial with the given error code and description.
    #[must_use]
    pub fn new(error: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            description: description.into(),
            ..Self::default()
        }
    }

    /// Set the hint.
    #[must_use]
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = hint.into();
        self
    }

    /// Set the HTTP status code.
    #[must_use]
    pub const fn with_status_code(mut self, status_code: u16) -> Self {
        self.status_code = status_code;
        self
    }

    /// Fill in `access_denied` when the UI left the error code empty.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        if self.error.is_empty() {
            self.error = "access_denied".to_string();
        }
        if self.status_code == 0 {
            self.status_code = 400;
        }
        self
    }
}

impl fmt::Display for RequestDeniedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.description.is_empty() {
            write!(f, "{}", self.error)
        } else {
            write!(f, "{}: {}", self.error, self.description)
        }
    }
}

/// Failure modes of the flow engine.
///
/// Protocol aborts (redirects to a UI) are not errors; see
/// [`Outcome`](crate::state::Outcome).
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FlowError {
    // ═══════════════════════════════════════════════════════════
    // Request Errors
    // ═══════════════════════════════════════════════════════════

    /// The request is malformed or carries an invalid parameter.
    #[error("The request is missing a required parameter, includes an invalid parameter value, or is otherwise malformed. {hint}")]
    InvalidRequest {
        /// What was wrong with the request
        hint: String,
    },

    /// End-user authentication is required but could not be prompted for.
    #[error("The Authorization Server requires End-User authentication. {hint}")]
    LoginRequired {
        /// Why authentication is required
        hint: String,
    },

    /// The subject of the `id_token_hint` differs from the session subject.
    #[error("The subject from the id_token_hint does not match the subject of the authenticated session")]
    HintSubjectMismatch,

    /// End-user consent is required but could not be prompted for.
    #[error("The Authorization Server requires End-User consent. {hint}")]
    ConsentRequired {
        /// Why consent is required
        hint: String,
    },

    // ═══════════════════════════════════════════════════════════
    // Authorization Errors
    // ═══════════════════════════════════════════════════════════

    /// The request was denied.
    #[error("The resource owner or authorization server denied the request. {hint}")]
    AccessDenied {
        /// Why the request was denied
        hint: String,
    },

    /// The request was refused (CSRF failures).
    #[error("The request is not allowed. {hint}")]
    Forbidden {
        /// Why the request was refused
        hint: String,
    },

    /// The request could not be authorized (stale requests).
    #[error("The request could not be authorized. {hint}")]
    RequestUnauthorized {
        /// Why the request was not authorized
        hint: String,
    },

    /// A login, consent or logout UI rejected the request.
    #[error("{0}")]
    Denied(RequestDeniedError),

    // ═══════════════════════════════════════════════════════════
    // Token Errors
    // ═══════════════════════════════════════════════════════════

    /// A flow token could not be decoded under the requested purpose.
    #[error("The flow token is invalid")]
    InvalidToken,

    // ═══════════════════════════════════════════════════════════
    // Storage Errors
    // ═══════════════════════════════════════════════════════════

    /// The requested record does not exist.
    #[error("Resource not found")]
    NotFound,

    /// The challenge or verifier has already been redeemed.
    #[error("The request has already been used")]
    AlreadyUsed,

    /// The record is in a state that does not allow the operation.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The storage backend failed.
    #[error("Storage error: {0}")]
    Storage(String),

    // ═══════════════════════════════════════════════════════════
    // Internal Errors
    // ═══════════════════════════════════════════════════════════

    /// Invalid engine configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// An engine invariant was violated.
    #[error("The authorization server encountered an unexpected condition. {debug}")]
    ServerError {
        /// Debug detail
        debug: String,
    },
}

impl FlowError {
    /// Build an `invalid_request` error.
    #[must_use]
    pub fn invalid_request(hint: impl Into<String>) -> Self {
        Self::InvalidRequest { hint: hint.into() }
    }

    /// Build an `access_denied` error.
    #[must_use]
    pub fn access_denied(hint: impl Into<String>) -> Self {
        Self::AccessDenied { hint: hint.into() }
    }

    /// Build a `request_forbidden` error.
    #[must_use]
    pub fn forbidden(hint: impl Into<String>) -> Self {
        Self::Forbidden { hint: hint.into() }
    }

    /// Build a `server_error`, logging the debug detail.
    #[must_use]
    pub fn server_error(debug: impl Into<String>) -> Self {
        let detail: String = debug.into();
        tracing::error!(detail = %detail, "Flow engine invariant violated");
        Self::ServerError { debug: detail }
    }

    /// OAuth 2.0 error code reported to the client.
    ///
    /// # Examples
    ///
    /// ```
    /// use composable_rust_consent::FlowError;
    ///
    /// assert_eq!(FlowError::HintSubjectMismatch.error_code(), "login_required");
    /// assert_eq!(FlowError::InvalidToken.error_code(), "access_denied");
    /// ```
    #[must_use]
    pub fn error_code(&self) -> &str {
        match self {
            Self::InvalidRequest { .. } => "invalid_request",
            Self::LoginRequired { .. } | Self::HintSubjectMismatch => "login_required",
            Self::ConsentRequired { .. } => "consent_required",
            Self::AccessDenied { .. } | Self::InvalidToken | Self::AlreadyUsed => "access_denied",
            Self::Forbidden { .. } => "request_forbidden",
            Self::RequestUnauthorized { .. } => "request_unauthorized",
            Self::Denied(denied) if denied.error.is_empty() => "access_denied",
            Self::Denied(denied) => &denied.error,
            Self::NotFound => "not_found",
            Self::Conflict(_) => "conflict",
            Self::Storage(_) | Self::Configuration(_) | Self::ServerError { .. } => "server_error",
        }
    }

    /// HTTP status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::InvalidRequest { .. }
            | Self::LoginRequired { .. }
            | Self::HintSubjectMismatch
            | Self::ConsentRequired { .. }
            | Self::InvalidToken => 400,
            Self::RequestUnauthorized { .. } => 401,
            Self::AccessDenied { .. } | Self::Forbidden { .. } => 403,
            Self::Denied(denied) => {
                if denied.status_code == 0 {
                    400
                } else {
                    denied.status_code
                }
            }
            Self::NotFound => 404,
            Self::Conflict(_) => 409,
            Self::AlreadyUsed => 410,
            Self::Storage(_) | Self::Configuration(_) | Self::ServerError { .. } => 500,
        }
    }

    /// Check if this error was caused by the user agent or the client.
    ///
    /// # Examples
    ///
    /// ```
    /// use composable_rust_consent::FlowError;
    ///
    /// assert!(FlowError::InvalidToken.is_user_error());
    /// assert!(!FlowError::Storage("timeout".into()).is_user_error());
    /// ```
    #[must_use]
    pub const fn is_user_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidRequest { .. }
                | Self::LoginRequired { .. }
                | Self::HintSubjectMismatch
                | Self::ConsentRequired { .. }
                | Self::AccessDenied { .. }
                | Self::Forbidden { .. }
                | Self::RequestUnauthorized { .. }
                | Self::Denied(_)
                | Self::InvalidToken
                | Self::AlreadyUsed
        )
    }

    /// Check if this error may indicate an attack (replay or CSRF).
    ///
    /// # Examples
    ///
    /// ```
    /// use composable_rust_consent::FlowError;
    ///
    /// assert!(FlowError::AlreadyUsed.is_security_issue());
    /// assert!(!FlowError::NotFound.is_security_issue());
    /// ```
    #[must_use]
    pub const fn is_security_issue(&self) -> bool {
        matches!(
            self,
            Self::Forbidden { .. } | Self::AlreadyUsed | Self::InvalidToken | Self::HintSubjectMismatch
        )
    }
}
