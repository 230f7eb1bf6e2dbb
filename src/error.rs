//! Error types for Streamkeep
//!
//! This module defines error types using thiserror for ergonomic error handling.
//! Errors are categorized by domain (transport, DRM, manifest, download, storage)
//! so callers can decide what to show the user and whether a retry makes sense.
//!
//! Nothing in the core retries on its own. A failed key exchange, manifest load
//! or metadata fetch is surfaced to the caller, which decides whether to run the
//! whole operation again.

use crate::models::ContentId;
use std::sync::Arc;
use thiserror::Error;

/// Result type alias using our StreamkeepError type
pub type Result<T> = std::result::Result<T, StreamkeepError>;

/// Main error type for Streamkeep
#[derive(Error, Debug)]
pub enum StreamkeepError {
    // ===== Transport / Protocol Errors =====

    /// Network connectivity error (connect failure, timeout, dropped stream)
    #[error("Network error: {message}")]
    Transport {
        message: String,
        /// Whether this error might be transient
        is_transient: bool,
    },

    /// Server answered outside 2xx
    #[error("Request failed: {message}")]
    Protocol {
        message: String,
        /// HTTP status code if available
        status_code: Option<u16>,
        /// Endpoint that failed (query string stripped)
        endpoint: Option<String>,
    },

    /// Server answered 2xx but the body was not what we expected
    #[error("Invalid response: {message}")]
    InvalidResponse {
        message: String,
        /// Response body snippet for debugging
        response_body: Option<String>,
    },

    // ===== DRM Errors =====

    /// Offline playback requested but no persisted key exists
    #[error("No persisted license for content {0}")]
    MissingLicense(ContentId),

    /// A field required by the handshake is absent (auth token, DRM URL)
    #[error("Missing required field: {0}")]
    MissingRequiredField(String),

    /// The platform key module refused an operation
    #[error("Platform key module error: {message}")]
    PlatformKey {
        message: String,
        /// Operation that failed (e.g. "key_request", "persistable_key")
        operation: Option<String>,
    },

    // ===== Manifest Errors =====

    /// Fetched manifest could not be decoded
    #[error("Unparseable manifest: {0}")]
    ManifestParse(String),

    /// Request URL does not belong to any scheme we intercept
    #[error("Unsupported request: {0}")]
    UnsupportedRequest(String),

    // ===== Download Errors =====

    /// A leaf download failed; siblings keep going
    #[error("Download of {content_id} failed: {cause}")]
    DownloadFailed {
        content_id: ContentId,
        cause: String,
    },

    // ===== Cache Errors =====

    /// A memoized computation failed; every caller joined on it gets this error
    #[error("Fetch failed: {cause}")]
    CacheComputeFailed {
        #[source]
        cause: Arc<StreamkeepError>,
    },

    // ===== File / State Errors =====

    /// Generic file I/O error with context
    #[error("File I/O error: {0}")]
    FileIo(String),

    /// Record not found (metadata, download node, catalog entry)
    #[error("Record not found: {0}")]
    RecordNotFound(String),

    /// Operation is invalid for the current state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Generic input validation error
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Internal error that should not normally occur
    #[error("Internal error: {0}")]
    Internal(String),

    // ===== External Library Errors =====

    /// HTTP client error from reqwest
    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("JSON serialization error: {0}")]
    SerdeJson(#[from] serde_json::Error),

    /// Database driver error from sqlx
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// Standard I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Coarse failure classification, cheap to copy into state machines
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Transport,
    Protocol,
    MissingLicense,
    MissingField,
    Platform,
    Storage,
    Other,
}

impl From<std::string::FromUtf8Error> for StreamkeepError {
    fn from(err: std::string::FromUtf8Error) -> Self {
        StreamkeepError::ManifestParse(format!("invalid UTF-8: {}", err))
    }
}

impl StreamkeepError {
    pub fn transport<S: Into<String>>(message: S, is_transient: bool) -> Self {
        StreamkeepError::Transport {
            message: message.into(),
            is_transient,
        }
    }

    pub fn protocol<S: Into<String>>(
        message: S,
        status_code: Option<u16>,
        endpoint: Option<String>,
    ) -> Self {
        StreamkeepError::Protocol {
            message: message.into(),
            status_code,
            endpoint,
        }
    }

    pub fn invalid_response<S: Into<String>>(message: S, response_body: Option<String>) -> Self {
        StreamkeepError::InvalidResponse {
            message: message.into(),
            response_body,
        }
    }

    pub fn platform<S: Into<String>>(message: S, operation: Option<&str>) -> Self {
        StreamkeepError::PlatformKey {
            message: message.into(),
            operation: operation.map(str::to_string),
        }
    }

    pub fn not_found<S: Into<String>>(resource: S) -> Self {
        StreamkeepError::RecordNotFound(resource.into())
    }

    pub fn invalid_state<S: Into<String>>(message: S) -> Self {
        StreamkeepError::InvalidState(message.into())
    }

    pub fn internal<S: Into<String>>(message: S) -> Self {
        StreamkeepError::Internal(message.into())
    }

    /// Unwraps cache wrappers so callers can match on the original failure
    pub fn root_cause(&self) -> &StreamkeepError {
        match self {
            StreamkeepError::CacheComputeFailed { cause } => cause.root_cause(),
            other => other,
        }
    }

    /// Classify the error for state machines and progress events
    pub fn kind(&self) -> FailureKind {
        match self.root_cause() {
            StreamkeepError::Transport { .. } | StreamkeepError::Reqwest(_) => FailureKind::Transport,
            StreamkeepError::Protocol { .. } | StreamkeepError::InvalidResponse { .. } => {
                FailureKind::Protocol
            }
            StreamkeepError::MissingLicense(_) => FailureKind::MissingLicense,
            StreamkeepError::MissingRequiredField(_) => FailureKind::MissingField,
            StreamkeepError::PlatformKey { .. } => FailureKind::Platform,
            StreamkeepError::Sqlx(_) | StreamkeepError::Io(_) | StreamkeepError::FileIo(_) => {
                FailureKind::Storage
            }
            _ => FailureKind::Other,
        }
    }

    /// Check if error is retryable (transient network errors, 5xx)
    ///
    /// The core never acts on this itself; it is a hint for the caller.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.root_cause(),
            StreamkeepError::Transport { is_transient: true, .. }
                | StreamkeepError::Protocol { status_code: Some(500..=599), .. }
        )
    }

    /// Check if error is related to the DRM handshake or key storage
    pub fn is_drm_error(&self) -> bool {
        matches!(
            self.root_cause(),
            StreamkeepError::MissingLicense(_)
                | StreamkeepError::MissingRequiredField(_)
                | StreamkeepError::PlatformKey { .. }
        )
    }

    /// Check if error is related to file/disk operations
    pub fn is_file_error(&self) -> bool {
        matches!(
            self.root_cause(),
            StreamkeepError::FileIo(_) | StreamkeepError::Io(_)
        )
    }

    /// User-facing text shown when playback or a download stops
    pub fn user_message(&self) -> String {
        match self.root_cause() {
            StreamkeepError::Transport { .. } | StreamkeepError::Reqwest(_) => {
                "Unable to reach the server. Check your connection and try again.".to_string()
            }
            StreamkeepError::Protocol { status_code: Some(401 | 403), .. } => {
                "Your session has expired. Please sign in again.".to_string()
            }
            StreamkeepError::MissingLicense(_) => {
                "This download can no longer be played offline. Please download it again.".to_string()
            }
            StreamkeepError::ManifestParse(_) => {
                "This video could not be loaded.".to_string()
            }
            StreamkeepError::DownloadFailed { .. } => {
                "The download failed. Please try again.".to_string()
            }
            other => other.to_string(),
        }
    }
}
