//! # Alerting
//!
//! Operator-facing signals from the orchestrator: a failed run, a
//! failure streak, or a source that has gone quiet.
//!
//! The trait is the seam; the default sink just logs. Deployments wire
//! their own (chat, pager) without the orchestrator knowing.

use chrono::{DateTime, Utc};
use tracing::warn;

use stockpilot_core::RunError;

/// Receives operator alerts from the orchestrator.
pub trait AlertSink: Send + Sync {
    /// One run finished in the failed state.
    fn run_failed(&self, source_id: &str, run_id: &str, error: &RunError);

    /// `consecutive` runs in a row have failed for this source.
    fn repeated_failures(&self, source_id: &str, consecutive: i64);

    /// No completed run inside the configured staleness window.
    fn source_stale(&self, source_id: &str, last_success: Option<DateTime<Utc>>);
}

/// Default sink: structured log records at WARN.
#[derive(Debug, Default)]
pub struct TracingAlertSink;

impl AlertSink for TracingAlertSink {
    fn run_failed(&self, source_id: &str, run_id: &str, error: &RunError) {
        warn!(
            source_id = %source_id,
            run_id = %run_id,
            category = %error.category,
            attempts = error.attempts,
            "Sync run failed: {}",
            error.message
        );
    }

    fn repeated_failures(&self, source_id: &str, consecutive: i64) {
        warn!(
            source_id = %source_id,
            consecutive,
            "Source is failing repeatedly"
        );
    }

    fn source_stale(&self, source_id: &str, last_success: Option<DateTime<Utc>>) {
        match last_success {
            Some(ts) => warn!(
                source_id = %source_id,
                last_success = %ts,
                "Source has gone stale"
            ),
            None => warn!(source_id = %source_id, "Source has never completed a run"),
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::sync::Mutex;

    /// Test sink that records every alert it receives.
    #[derive(Debug, Default)]
    pub struct RecordingAlertSink {
        pub failed_runs: Mutex<Vec<(String, String)>>,
        pub streaks: Mutex<Vec<(String, i64)>>,
        pub stale: Mutex<Vec<String>>,
    }

    impl AlertSink for RecordingAlertSink {
        fn run_failed(&self, source_id: &str, run_id: &str, _error: &RunError) {
            self.failed_runs
                .lock()
                .unwrap()
                .push((source_id.to_string(), run_id.to_string()));
        }

        fn repeated_failures(&self, source_id: &str, consecutive: i64) {
            self.streaks
                .lock()
                .unwrap()
                .push((source_id.to_string(), consecutive));
        }

        fn source_stale(&self, source_id: &str, _last_success: Option<DateTime<Utc>>) {
            self.stale.lock().unwrap().push(source_id.to_string());
        }
    }
}
