//! # Sync Error Types
//!
//! Failure taxonomy for the synchronization engine.
//!
//! ## Retry Classification
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  RETRYABLE (transient, backoff applies)                                 │
//! │  ├── Network        - connect refused, reset, DNS                       │
//! │  ├── Timeout        - request exceeded the configured bound             │
//! │  └── HttpStatus 5xx / 429                                               │
//! │                                                                         │
//! │  NOT RETRYABLE (permanent, fail fast)                                   │
//! │  ├── AuthFailed     - 401/403; retrying wrong credentials is useless    │
//! │  ├── Format         - malformed payload; same bytes parse the same way  │
//! │  ├── HttpStatus 4xx (other)                                             │
//! │  ├── InvalidConfig / Secret / SignatureInvalid                          │
//! │  └── Database / Adjustment                                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

use stockpilot_core::RunError;
use stockpilot_db::{AdjustmentError, DbError};

/// Errors raised by adapters, the HTTP client, and the orchestrator.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The source rejected our credentials (HTTP 401/403).
    #[error("Authentication failed for source {source_id} (HTTP {status})")]
    AuthFailed { source_id: String, status: u16 },

    /// The payload could not be decoded as the configured format.
    #[error("Malformed payload from source {source_id}: {message}")]
    Format { source_id: String, message: String },

    /// Transport-level failure talking to the source.
    #[error("Network error: {0}")]
    Network(String),

    /// The request exceeded the configured timeout.
    #[error("Request timed out after {secs}s")]
    Timeout { secs: u64 },

    /// The source answered with an unexpected HTTP status.
    #[error("Source {source_id} answered HTTP {status}")]
    HttpStatus { source_id: String, status: u16 },

    /// Source or engine configuration is unusable.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Configuration file could not be read or parsed.
    #[error("Failed to load configuration: {0}")]
    ConfigLoad(String),

    /// Credential sealing/unsealing failed (bad key, corrupt ciphertext).
    #[error("Secret error: {0}")]
    Secret(String),

    /// Webhook signature did not match the shared secret.
    #[error("Webhook signature verification failed")]
    SignatureInvalid,

    /// A run was cancelled before all records were processed.
    #[error("Sync run aborted")]
    Aborted,

    /// A worker task died (panic or forced shutdown).
    #[error("Internal error: {0}")]
    Internal(String),

    /// Database failure underneath the engine.
    #[error("Database error: {0}")]
    Database(#[from] DbError),

    /// Adjustment failure while applying a record.
    #[error("Adjustment error: {0}")]
    Adjustment(#[from] AdjustmentError),

    /// JSON (de)serialization failure outside adapter parsing.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SyncError {
    /// True when retrying with backoff can plausibly succeed.
    ///
    /// Auth and format failures are permanent: the same credentials and
    /// the same bytes will fail the same way on every attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Network(_) | SyncError::Timeout { .. } => true,
            SyncError::HttpStatus { status, .. } => *status == 429 || (500..=599).contains(status),
            _ => false,
        }
    }

    /// Stable machine-readable category, stored on failed runs and fed
    /// to alerting.
    pub fn category(&self) -> &'static str {
        match self {
            SyncError::AuthFailed { .. } => "auth",
            SyncError::Format { .. } => "format",
            SyncError::Network(_) => "network",
            SyncError::Timeout { .. } => "timeout",
            SyncError::HttpStatus { .. } => "http",
            SyncError::InvalidConfig(_) | SyncError::ConfigLoad(_) => "config",
            SyncError::Secret(_) => "secret",
            SyncError::SignatureInvalid => "signature",
            SyncError::Aborted => "aborted",
            SyncError::Internal(_) => "internal",
            SyncError::Database(_) => "database",
            SyncError::Adjustment(_) => "adjustment",
            SyncError::Serialization(_) => "serialization",
        }
    }

    /// Converts into the structured payload persisted on a failed run.
    pub fn into_run_error(self, attempts: u32) -> RunError {
        RunError {
            category: self.category().to_string(),
            message: self.to_string(),
            attempts,
        }
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SyncError::Timeout { secs: 0 }
        } else {
            SyncError::Network(err.to_string())
        }
    }
}

/// Convenience type alias for Results with SyncError.
pub type SyncResult<T> = Result<T, SyncError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_classification() {
        assert!(SyncError::Network("reset".into()).is_retryable());
        assert!(SyncError::Timeout { secs: 30 }.is_retryable());
        assert!(SyncError::HttpStatus {
            source_id: "s".into(),
            status: 503
        }
        .is_retryable());
        assert!(SyncError::HttpStatus {
            source_id: "s".into(),
            status: 429
        }
        .is_retryable());

        assert!(!SyncError::HttpStatus {
            source_id: "s".into(),
            status: 404
        }
        .is_retryable());
        assert!(!SyncError::AuthFailed {
            source_id: "s".into(),
            status: 401
        }
        .is_retryable());
        assert!(!SyncError::Format {
            source_id: "s".into(),
            message: "bad csv".into()
        }
        .is_retryable());
    }

    #[test]
    fn test_run_error_payload() {
        let err = SyncError::AuthFailed {
            source_id: "pos-main".into(),
            status: 401,
        };
        let run_error = err.into_run_error(1);
        assert_eq!(run_error.category, "auth");
        assert_eq!(run_error.attempts, 1);
        assert!(run_error.message.contains("pos-main"));
    }
}
