//! # Sync Configuration
//!
//! TOML-backed configuration for the synchronization engine.
//!
//! ## Example
//! ```toml
//! [engine]
//! workers = 4
//! http_timeout_secs = 30
//! staleness_window_hours = 24
//! create_missing_items = true
//! max_run_duration_secs = 600
//!
//! [retry]
//! max_attempts = 3
//! initial_backoff_secs = 1
//! backoff_multiplier = 5.0
//! max_backoff_secs = 15
//!
//! [[sources]]
//! id = "pos-main"
//! url = "https://pos.example.com/export/stock.json"
//! format = "json"
//! auth = "bearer"
//!
//! [[sources]]
//! id = "vendor-feed"
//! url = "https://vendor.example.com/feed"
//! format = "generic"
//! auth = { api_key = { header = "X-Api-Key" } }
//!
//! [sources.field_map]
//! sku = "itemCode"
//! quantity = "stockLevel"
//! price = "unitPrice"
//! name = "description"
//! ```
//!
//! Plaintext credentials never appear here; sources reference sealed
//! secrets held by the secret store, keyed by source id.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{SyncError, SyncResult};

// =============================================================================
// Engine / Retry Sections
// =============================================================================

/// Orchestrator-level knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Upper bound on concurrently processed SKU groups.
    pub workers: usize,

    /// Per-request HTTP timeout.
    pub http_timeout_secs: u64,

    /// A source with no completed run inside this window is stale.
    pub staleness_window_hours: i64,

    /// Create placeholder items for unknown SKUs instead of tallying
    /// them as failed records.
    pub create_missing_items: bool,

    /// Hard cap on one run's record-processing phase. 0 disables the cap.
    pub max_run_duration_secs: u64,

    /// Consecutive failed runs before a repeated-failure alert fires.
    pub failure_alert_threshold: i64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            workers: 4,
            http_timeout_secs: 30,
            staleness_window_hours: 24,
            create_missing_items: true,
            max_run_duration_secs: 600,
            failure_alert_threshold: 3,
        }
    }
}

impl EngineConfig {
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

/// Retry policy for transient fetch failures.
///
/// Defaults produce the schedule 1s, 5s, 15s (capped) across three
/// attempts. Permanent failures (auth, format) never enter this policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub initial_backoff_secs: u64,
    pub backoff_multiplier: f64,
    pub max_backoff_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig {
            max_attempts: 3,
            initial_backoff_secs: 1,
            backoff_multiplier: 5.0,
            max_backoff_secs: 15,
        }
    }
}

// =============================================================================
// Source Definitions
// =============================================================================

/// Payload format a source speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceFormat {
    Csv,
    Xml,
    Json,
    /// JSON with operator-declared field names (see [`FieldMap`]).
    Generic,
}

/// How requests to a source are authenticated.
///
/// The secret material itself lives sealed in the secret store; this
/// only selects the mechanism.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthKind {
    /// No authentication (public feed).
    None,
    /// HTTP Basic; the sealed secret is "username:password".
    Basic,
    /// Bearer token in the Authorization header.
    Bearer,
    /// Token in a custom header.
    ApiKey { header: String },
}

/// Field-name mapping for the generic adapter.
///
/// Declared explicitly by the operator; the adapter never guesses
/// field names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMap {
    pub sku: String,
    pub quantity: String,
    #[serde(default)]
    pub price: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

/// One configured external source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Stable identifier; keys runs, ledger references, and secrets.
    pub id: String,
    pub url: String,
    pub format: SourceFormat,
    #[serde(default = "default_auth")]
    pub auth: AuthKind,
    /// Required when `format = "generic"`, ignored otherwise.
    #[serde(default)]
    pub field_map: Option<FieldMap>,
}

fn default_auth() -> AuthKind {
    AuthKind::None
}

impl SourceConfig {
    /// Validates one source definition.
    pub fn validate(&self) -> SyncResult<()> {
        stockpilot_core::validation::validate_source_id(&self.id)
            .map_err(|e| SyncError::InvalidConfig(e.to_string()))?;

        let url = Url::parse(&self.url)
            .map_err(|e| SyncError::InvalidConfig(format!("source {}: bad url: {e}", self.id)))?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(SyncError::InvalidConfig(format!(
                "source {}: unsupported url scheme '{}'",
                self.id,
                url.scheme()
            )));
        }

        if self.format == SourceFormat::Generic && self.field_map.is_none() {
            return Err(SyncError::InvalidConfig(format!(
                "source {}: format 'generic' requires a field_map",
                self.id
            )));
        }

        if let AuthKind::ApiKey { header } = &self.auth {
            if header.trim().is_empty() {
                return Err(SyncError::InvalidConfig(format!(
                    "source {}: api_key auth requires a header name",
                    self.id
                )));
            }
        }

        Ok(())
    }
}

// =============================================================================
// Top-Level Config
// =============================================================================

/// Complete engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub engine: EngineConfig,
    pub retry: RetryConfig,
    pub sources: Vec<SourceConfig>,
}

impl SyncConfig {
    /// Loads configuration from a TOML file, then applies environment
    /// overrides.
    pub fn load(path: impl AsRef<Path>) -> SyncResult<Self> {
        let raw = std::fs::read_to_string(path.as_ref())
            .map_err(|e| SyncError::ConfigLoad(format!("{}: {e}", path.as_ref().display())))?;
        let mut config: SyncConfig =
            toml::from_str(&raw).map_err(|e| SyncError::ConfigLoad(e.to_string()))?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Parses configuration from a TOML string (no env overrides).
    pub fn from_toml(raw: &str) -> SyncResult<Self> {
        let config: SyncConfig =
            toml::from_str(raw).map_err(|e| SyncError::ConfigLoad(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Saves configuration to a TOML file.
    pub fn save(&self, path: impl AsRef<Path>) -> SyncResult<()> {
        let raw = toml::to_string_pretty(self)
            .map_err(|e| SyncError::ConfigLoad(e.to_string()))?;
        std::fs::write(path.as_ref(), raw)
            .map_err(|e| SyncError::ConfigLoad(format!("{}: {e}", path.as_ref().display())))?;
        Ok(())
    }

    /// Environment variables win over file values, for container
    /// deployments where editing files is awkward.
    fn apply_env_overrides(&mut self) {
        if let Some(v) = env_parse::<usize>("STOCKPILOT_SYNC_WORKERS") {
            self.engine.workers = v;
        }
        if let Some(v) = env_parse::<u64>("STOCKPILOT_SYNC_HTTP_TIMEOUT_SECS") {
            self.engine.http_timeout_secs = v;
        }
        if let Some(v) = env_parse::<u32>("STOCKPILOT_SYNC_MAX_ATTEMPTS") {
            self.retry.max_attempts = v;
        }
    }

    /// Validates the whole configuration, including uniqueness of
    /// source ids.
    pub fn validate(&self) -> SyncResult<()> {
        if self.engine.workers == 0 {
            return Err(SyncError::InvalidConfig("engine.workers must be > 0".into()));
        }
        if self.retry.max_attempts == 0 {
            return Err(SyncError::InvalidConfig(
                "retry.max_attempts must be > 0".into(),
            ));
        }

        let mut seen = std::collections::HashSet::new();
        for source in &self.sources {
            source.validate()?;
            if !seen.insert(source.id.as_str()) {
                return Err(SyncError::InvalidConfig(format!(
                    "duplicate source id: {}",
                    source.id
                )));
            }
        }
        Ok(())
    }

    /// Looks up a source by id.
    pub fn source(&self, source_id: &str) -> Option<&SourceConfig> {
        self.sources.iter().find(|s| s.id == source_id)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

// =============================================================================
// Unit Tests
// =============================================================================
