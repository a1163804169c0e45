//! # Source Client
//!
//! Authenticated HTTP fetch from external sources.
//!
//! ## Retry Policy
//! ```text
//! attempt 1 ──fail──► wait 1s ──► attempt 2 ──fail──► wait 5s ──► attempt 3
//!     │                               │                               │
//!     └── transient only: network, timeout, HTTP 5xx/429              │
//!         auth (401/403) and other 4xx fail IMMEDIATELY ──────────────┘
//! ```
//! Schedule and attempt count come from [`RetryConfig`]; the defaults
//! produce 1s then 5s then give up.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use backoff::{future::retry, ExponentialBackoff};
use tracing::{debug, warn};

use crate::config::{AuthKind, RetryConfig, SourceConfig};
use crate::error::{SyncError, SyncResult};
use crate::secrets::Credential;

/// A successful fetch: the raw payload plus how many attempts it took.
#[derive(Debug, Clone)]
pub struct Fetched {
    pub bytes: Vec<u8>,
    pub attempts: u32,
}

/// A fetch that gave up, with the attempt count for the run record.
#[derive(Debug)]
pub struct FetchFailure {
    pub error: SyncError,
    pub attempts: u32,
}

/// HTTP client for external source endpoints.
#[derive(Debug, Clone)]
pub struct SourceClient {
    http: reqwest::Client,
    retry: RetryConfig,
    timeout_secs: u64,
}

impl SourceClient {
    /// Builds a client with a bounded per-request timeout.
    pub fn new(timeout: Duration, retry: RetryConfig) -> SyncResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| SyncError::Network(e.to_string()))?;

        Ok(SourceClient {
            http,
            retry,
            timeout_secs: timeout.as_secs(),
        })
    }

    /// Fetches one source's payload, retrying transient failures with
    /// backoff. Returns the raw bytes for the adapter layer.
    ///
    /// The credential, when present, was decrypted just for this call
    /// and is dropped with it.
    pub async fn fetch(
        &self,
        source: &SourceConfig,
        credential: Option<&Credential>,
    ) -> Result<Fetched, FetchFailure> {
        let policy = ExponentialBackoff {
            initial_interval: Duration::from_secs(self.retry.initial_backoff_secs),
            multiplier: self.retry.backoff_multiplier,
            max_interval: Duration::from_secs(self.retry.max_backoff_secs),
            randomization_factor: 0.0,
            max_elapsed_time: None,
            ..ExponentialBackoff::default()
        };

        let attempts = AtomicU32::new(0);
        let result = retry(policy, || async {
            let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
            debug!(source_id = %source.id, attempt, "Fetching source payload");

            match self.fetch_once(source, credential).await {
                Ok(bytes) => Ok(bytes),
                Err(e) if e.is_retryable() && attempt < self.retry.max_attempts => {
                    warn!(
                        source_id = %source.id,
                        attempt,
                        error = %e,
                        "Transient fetch failure; backing off"
                    );
                    Err(backoff::Error::transient(e))
                }
                Err(e) => Err(backoff::Error::permanent(e)),
            }
        })
        .await;

        let made = attempts.load(Ordering::SeqCst);
        match result {
            Ok(bytes) => Ok(Fetched {
                bytes,
                attempts: made,
            }),
            Err(error) => Err(FetchFailure {
                error,
                attempts: made,
            }),
        }
    }

    /// Single request with no retry.
    async fn fetch_once(
        &self,
        source: &SourceConfig,
        credential: Option<&Credential>,
    ) -> SyncResult<Vec<u8>> {
        let mut request = self.http.get(&source.url);
        request = apply_auth(request, source, credential)?;

        let response = request.send().await.map_err(|e| self.map_transport(e))?;
        let status = response.status();

        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(SyncError::AuthFailed {
                source_id: source.id.clone(),
                status: status.as_u16(),
            });
        }
        if !status.is_success() {
            return Err(SyncError::HttpStatus {
                source_id: source.id.clone(),
                status: status.as_u16(),
            });
        }

        let bytes = response.bytes().await.map_err(|e| self.map_transport(e))?;
        Ok(bytes.to_vec())
    }

    fn map_transport(&self, err: reqwest::Error) -> SyncError {
        if err.is_timeout() {
            SyncError::Timeout {
                secs: self.timeout_secs,
            }
        } else {
            SyncError::Network(err.to_string())
        }
    }
}

/// Attaches the configured authentication to a request.
///
/// Every mechanism except `None` requires a credential; a missing one
/// is a configuration error, not a silent unauthenticated request.
fn apply_auth(
    request: reqwest::RequestBuilder,
    source: &SourceConfig,
    credential: Option<&Credential>,
) -> SyncResult<reqwest::RequestBuilder> {
    fn need<'a>(credential: Option<&'a Credential>, source_id: &str) -> SyncResult<&'a Credential> {
        credential.ok_or_else(|| {
            SyncError::InvalidConfig(format!("source {source_id}: no credential provisioned"))
        })
    }

    match &source.auth {
        AuthKind::None => Ok(request),
        AuthKind::Basic => {
            let (user, pass) = need(credential, &source.id)?.as_basic_pair()?;
            Ok(request.basic_auth(user, Some(pass)))
        }
        AuthKind::Bearer => Ok(request.bearer_auth(need(credential, &source.id)?.expose())),
        AuthKind::ApiKey { header } => {
            Ok(request.header(header.as_str(), need(credential, &source.id)?.expose()))
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
