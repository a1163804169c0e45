//! # Sync Orchestrator
//!
//! Runs complete reconciliation passes against configured sources.
//!
//! ## Run Pipeline
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────────┐
//! │  run_source(source_id)                                                   │
//! │                                                                          │
//! │  1. create run (pending) ──► mark processing                             │
//! │  2. unseal credential just-in-time, fetch payload (retry w/ backoff)    │
//! │  3. adapter.parse ──► records + malformed tally                          │
//! │  4. group records by SKU (order preserved)                               │
//! │       ┌────────┐ ┌────────┐ ┌────────┐                                   │
//! │       │ group  │ │ group  │ │ group  │  ≤ workers concurrent groups;    │
//! │       │ SKU A  │ │ SKU B  │ │ SKU C  │  records WITHIN a group apply    │
//! │       └────────┘ └────────┘ └────────┘  strictly in payload order       │
//! │  5. aggregate tallies ──► finalize completed (created/updated/failed)   │
//! │                                                                          │
//! │  fetch/parse failure ──► finalize failed + structured error + alert     │
//! │  cancellation / time cap ──► finalize failed (aborted)                  │
//! └──────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Per-record failures never abort a run; they are tallied and the run
//! completes. Two different SKUs may reconcile in either order, which is
//! safe because records only ever touch their own item.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::adapter::{adapter_for, ParseContext, ParseOutput};
use crate::alerts::{AlertSink, TracingAlertSink};
use crate::client::SourceClient;
use crate::config::{AuthKind, SourceConfig, SyncConfig};
use crate::error::{SyncError, SyncResult};
use crate::reconcile::{ApplyOutcome, Reconciler};
use crate::secrets::{Credential, SecretStore};
use stockpilot_core::{ExternalSourceRecord, Reference, SyncRun};
use stockpilot_db::{Database, DbError};

// =============================================================================
// Cancellation
// =============================================================================

/// Handle for aborting in-flight runs from another task.
///
/// Cancellation stops workers from starting *new* records; records
/// already applied stay applied. The next run of the same source heals
/// any partial state because reconciliation is idempotent.
#[derive(Debug, Clone)]
pub struct CancelHandle(Arc<watch::Sender<bool>>);

impl CancelHandle {
    /// Signals every in-flight run on this orchestrator to stop.
    pub fn cancel(&self) {
        let _ = self.0.send(true);
    }

    /// Clears the flag so subsequent runs proceed normally.
    pub fn reset(&self) {
        let _ = self.0.send(false);
    }
}

// =============================================================================
// Orchestrator
// =============================================================================

#[derive(Debug, Default, Clone, Copy)]
struct Tally {
    created: i64,
    updated: i64,
    failed: i64,
    aborted: bool,
}

impl Tally {
    fn absorb(&mut self, other: Tally) {
        self.created += other.created;
        self.updated += other.updated;
        self.failed += other.failed;
        self.aborted |= other.aborted;
    }
}

/// Drives reconciliation runs end to end.
pub struct SyncOrchestrator {
    db: Database,
    config: SyncConfig,
    client: SourceClient,
    secrets: Option<SecretStore>,
    /// Sealed credentials by source id. Plaintext only exists inside
    /// one fetch.
    sealed_credentials: HashMap<String, String>,
    alerts: Arc<dyn AlertSink>,
    cancel: Arc<watch::Sender<bool>>,
}

impl SyncOrchestrator {
    /// Builds an orchestrator over a validated configuration.
    pub fn new(db: Database, config: SyncConfig) -> SyncResult<Self> {
        config.validate()?;
        let client = SourceClient::new(config.engine.http_timeout(), config.retry.clone())?;
        let (cancel, _) = watch::channel(false);

        Ok(SyncOrchestrator {
            db,
            config,
            client,
            secrets: None,
            sealed_credentials: HashMap::new(),
            alerts: Arc::new(TracingAlertSink),
            cancel: Arc::new(cancel),
        })
    }

    /// Replaces the default (logging) alert sink.
    pub fn with_alert_sink(mut self, sink: Arc<dyn AlertSink>) -> Self {
        self.alerts = sink;
        self
    }

    /// Attaches the secret store used to unseal source credentials.
    pub fn with_secret_store(mut self, store: SecretStore) -> Self {
        self.secrets = Some(store);
        self
    }

    /// Seals and stores a credential for a source. The plaintext is not
    /// retained.
    pub fn provision_credential(&mut self, source_id: &str, plaintext: &str) -> SyncResult<()> {
        let store = self
            .secrets
            .as_ref()
            .ok_or_else(|| SyncError::InvalidConfig("no secret store configured".into()))?;
        let sealed = store.seal(plaintext)?;
        self.sealed_credentials.insert(source_id.to_string(), sealed);
        Ok(())
    }

    /// Handle for cancelling in-flight runs.
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle(self.cancel.clone())
    }

    // =========================================================================
    // Runs
    // =========================================================================

    /// Full reconciliation pass: fetch, parse, reconcile, finalize.
    ///
    /// Returns the terminal run record. Fetch/parse failures come back
    /// as a *failed run*, not an `Err`; only configuration and
    /// infrastructure problems error out.
    pub async fn run_source(&self, source_id: &str) -> SyncResult<SyncRun> {
        let source = self
            .config
            .source(source_id)
            .cloned()
            .ok_or_else(|| SyncError::InvalidConfig(format!("unknown source: {source_id}")))?;
        let credential = self.unseal_credential(&source)?;

        let run = self.start_run(source_id).await?;
        info!(run_id = %run.id, source_id = %source_id, "Sync run started");

        let fetched = self.client.fetch(&source, credential.as_ref()).await;
        // Credential plaintext dies here, with the fetch.
        drop(credential);

        match fetched {
            Ok(fetched) => self.ingest(&run.id, &source, &fetched.bytes).await,
            Err(failure) => {
                self.finalize_failure(&run.id, source_id, failure.error, failure.attempts)
                    .await
            }
        }
    }

    /// Reconciles an already-obtained payload (manual import, replayed
    /// export). Same parsing, grouping, and bookkeeping as a fetch.
    pub async fn run_from_payload(&self, source_id: &str, raw: &[u8]) -> SyncResult<SyncRun> {
        let source = self
            .config
            .source(source_id)
            .cloned()
            .ok_or_else(|| SyncError::InvalidConfig(format!("unknown source: {source_id}")))?;

        let run = self.start_run(source_id).await?;
        info!(run_id = %run.id, source_id = %source_id, "Payload run started");
        self.ingest(&run.id, &source, raw).await
    }

    /// Flags sources with no completed run inside the staleness window
    /// and alerts on each. Returns the stale source ids.
    pub async fn check_staleness(&self) -> SyncResult<Vec<String>> {
        let window = chrono::Duration::hours(self.config.engine.staleness_window_hours);
        let mut stale = Vec::new();

        for source in &self.config.sources {
            let last = self.db.sync_runs().last_success_at(&source.id).await?;
            let is_stale = match last {
                Some(ts) => chrono::Utc::now() - ts > window,
                None => true,
            };
            if is_stale {
                self.alerts.source_stale(&source.id, last);
                stale.push(source.id.clone());
            }
        }
        Ok(stale)
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn unseal_credential(&self, source: &SourceConfig) -> SyncResult<Option<Credential>> {
        if source.auth == AuthKind::None {
            return Ok(None);
        }
        let sealed = self.sealed_credentials.get(&source.id).ok_or_else(|| {
            SyncError::InvalidConfig(format!("source {}: no credential provisioned", source.id))
        })?;
        let store = self
            .secrets
            .as_ref()
            .ok_or_else(|| SyncError::InvalidConfig("no secret store configured".into()))?;
        Ok(Some(store.unseal(sealed)?))
    }

    async fn start_run(&self, source_id: &str) -> SyncResult<SyncRun> {
        let run = self.db.sync_runs().create(source_id).await?;
        self.db.sync_runs().mark_processing(&run.id).await?;
        Ok(run)
    }

    async fn ingest(&self, run_id: &str, source: &SourceConfig, raw: &[u8]) -> SyncResult<SyncRun> {
        let adapter = match adapter_for(source) {
            Ok(adapter) => adapter,
            Err(e) => return self.finalize_failure(run_id, &source.id, e, 1).await,
        };

        let ctx = ParseContext::new(&source.id);
        let output = match adapter.parse(raw, &ctx) {
            Ok(output) => output,
            Err(e) => return self.finalize_failure(run_id, &source.id, e, 1).await,
        };

        self.process_records(run_id, source, output).await
    }

    /// Groups records by SKU and reconciles groups through a bounded
    /// worker pool. Records for the SAME SKU stay in payload order in
    /// one group, so last writer wins deterministically.
    async fn process_records(
        &self,
        run_id: &str,
        source: &SourceConfig,
        output: ParseOutput,
    ) -> SyncResult<SyncRun> {
        let total = output.records.len() as i64 + output.malformed;
        let groups = group_by_sku(output.records);
        debug!(
            run_id = %run_id,
            total,
            groups = groups.len(),
            malformed = output.malformed,
            "Processing records"
        );

        let reconciler = Reconciler::new(self.db.clone(), self.config.engine.create_missing_items);
        let reference = Reference::new("source", &source.id);
        let semaphore = Arc::new(Semaphore::new(self.config.engine.workers));
        let mut pool: JoinSet<SyncResult<Tally>> = JoinSet::new();

        for (_, records) in groups {
            let semaphore = Arc::clone(&semaphore);
            let reconciler = reconciler.clone();
            let reference = reference.clone();
            let cancel = self.cancel.subscribe();
            let run = run_id.to_string();

            pool.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|_| SyncError::Aborted)?;
                reconcile_group(records, &reconciler, &reference, &cancel, &run).await
            });
        }

        let cap = self.config.engine.max_run_duration_secs;
        let collected = if cap > 0 {
            match tokio::time::timeout(Duration::from_secs(cap), collect(&mut pool)).await {
                Ok(result) => result,
                Err(_) => {
                    pool.abort_all();
                    warn!(run_id = %run_id, cap_secs = cap, "Run exceeded its time cap");
                    Ok(Tally {
                        aborted: true,
                        ..Tally::default()
                    })
                }
            }
        } else {
            collect(&mut pool).await
        };

        let tally = match collected {
            Ok(tally) => tally,
            Err(e) => {
                // Infrastructure failure mid-run: record it, then surface it.
                let payload = serde_json::to_string(&e.into_run_error(1))?;
                if let Err(e2) = self.db.sync_runs().finalize_failed(run_id, &payload).await {
                    error!(run_id = %run_id, "Could not record run failure: {e2}");
                }
                return Err(SyncError::Internal(format!(
                    "run {run_id} aborted on a worker failure"
                )));
            }
        };

        if tally.aborted {
            return self
                .finalize_failure(run_id, &source.id, SyncError::Aborted, 1)
                .await;
        }

        let failed = tally.failed + output.malformed;
        self.db
            .sync_runs()
            .finalize_completed(run_id, total, tally.created, tally.updated, failed)
            .await?;

        info!(
            run_id = %run_id,
            source_id = %source.id,
            total,
            created = tally.created,
            updated = tally.updated,
            failed,
            "Sync run completed"
        );
        self.load_run(run_id).await
    }

    /// Finalizes a failed run with a structured error payload and
    /// notifies alerting, including the failure-streak check.
    async fn finalize_failure(
        &self,
        run_id: &str,
        source_id: &str,
        error: SyncError,
        attempts: u32,
    ) -> SyncResult<SyncRun> {
        let run_error = error.into_run_error(attempts);
        let payload = serde_json::to_string(&run_error)?;
        self.db.sync_runs().finalize_failed(run_id, &payload).await?;

        self.alerts.run_failed(source_id, run_id, &run_error);
        let streak = self.db.sync_runs().consecutive_failures(source_id).await?;
        if streak >= self.config.engine.failure_alert_threshold {
            self.alerts.repeated_failures(source_id, streak);
        }

        self.load_run(run_id).await
    }

    async fn load_run(&self, run_id: &str) -> SyncResult<SyncRun> {
        self.db
            .sync_runs()
            .get_by_id(run_id)
            .await?
            .ok_or_else(|| SyncError::Database(DbError::not_found("SyncRun", run_id)))
    }
}

/// Buckets records by SKU, preserving both first-seen group order and
/// record order within each group.
fn group_by_sku(records: Vec<ExternalSourceRecord>) -> Vec<(String, Vec<ExternalSourceRecord>)> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<(String, Vec<ExternalSourceRecord>)> = Vec::new();

    for record in records {
        match index.get(&record.external_sku) {
            Some(&i) => groups[i].1.push(record),
            None => {
                index.insert(record.external_sku.clone(), groups.len());
                groups.push((record.external_sku.clone(), vec![record]));
            }
        }
    }
    groups
}

/// Applies one SKU group sequentially, honoring cancellation between
/// records.
async fn reconcile_group(
    records: Vec<ExternalSourceRecord>,
    reconciler: &Reconciler,
    reference: &Reference,
    cancel: &watch::Receiver<bool>,
    run_id: &str,
) -> SyncResult<Tally> {
    let mut tally = Tally::default();

    for record in records {
        if *cancel.borrow() {
            tally.aborted = true;
            return Ok(tally);
        }

        match reconciler.apply_record(&record, reference).await? {
            ApplyOutcome::Created => tally.created += 1,
            ApplyOutcome::Updated => tally.updated += 1,
            ApplyOutcome::Failed { sku, reason } => {
                warn!(run_id = %run_id, sku = %sku, "Record failed: {reason}");
                tally.failed += 1;
            }
        }
    }
    Ok(tally)
}

/// Drains the worker pool into one aggregate tally.
async fn collect(pool: &mut JoinSet<SyncResult<Tally>>) -> SyncResult<Tally> {
    let mut aggregate = Tally::default();
    while let Some(joined) = pool.join_next().await {
        match joined {
            Ok(Ok(tally)) => aggregate.absorb(tally),
            Ok(Err(e)) => return Err(e),
            Err(e) => return Err(SyncError::Internal(format!("worker task failed: {e}"))),
        }
    }
    Ok(aggregate)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::test_support::RecordingAlertSink;
    use crate::config::{EngineConfig, SourceFormat};
    use chrono::Utc;
    use stockpilot_core::{ItemOrigin, RunError, StockItem, SyncRunStatus};
    use stockpilot_db::DbConfig;
    use uuid::Uuid;

    fn json_source(id: &str) -> SourceConfig {
        SourceConfig {
            id: id.to_string(),
            url: format!("https://{id}.example.com/stock.json"),
            format: SourceFormat::Json,
            auth: AuthKind::None,
            field_map: None,
        }
    }

    fn config(create_missing: bool) -> SyncConfig {
        SyncConfig {
            engine: EngineConfig {
                workers: 4,
                create_missing_items: create_missing,
                failure_alert_threshold: 2,
                ..EngineConfig::default()
            },
            sources: vec![json_source("pos-main")],
            ..SyncConfig::default()
        }
    }

    async fn test_db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    async fn seed_manual(db: &Database, sku: &str, qty: i64) {
        let now = Utc::now();
        let item = StockItem {
            id: Uuid::new_v4().to_string(),
            sku: sku.to_string(),
            name: format!("Item {sku}"),
            track_inventory: true,
            allow_backorder: false,
            current_quantity: qty,
            low_stock_threshold: 0,
            price_cents: None,
            origin: ItemOrigin::Manual,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        db.items().insert(&item).await.unwrap();
    }

    #[tokio::test]
    async fn test_large_run_tallies_created_updated_failed() {
        // 95 resolvable records, 5 unknown SKUs with creation disabled:
        // the run completes with created+updated = 95 and failed = 5.
        let db = test_db().await;
        for i in 0..95 {
            seed_manual(&db, &format!("SKU-{i:03}"), 10).await;
        }

        let mut payload = Vec::new();
        for i in 0..95 {
            payload.push(serde_json::json!({"sku": format!("SKU-{i:03}"), "quantity": i}));
        }
        for i in 0..5 {
            payload.push(serde_json::json!({"sku": format!("GHOST-{i}"), "quantity": 1}));
        }
        let raw = serde_json::to_vec(&payload).unwrap();

        let orchestrator = SyncOrchestrator::new(db.clone(), config(false)).unwrap();
        let run = orchestrator.run_from_payload("pos-main", &raw).await.unwrap();

        assert_eq!(run.status, SyncRunStatus::Completed);
        assert_eq!(run.total_records, 100);
        assert_eq!(run.created, 0);
        assert_eq!(run.updated, 95);
        assert_eq!(run.failed, 5);
        assert_eq!(run.created + run.updated + run.failed, run.total_records);

        let item = db.items().get_by_sku("SKU-042").await.unwrap().unwrap();
        assert_eq!(item.current_quantity, 42);
    }

    #[tokio::test]
    async fn test_rerunning_same_payload_is_idempotent() {
        let db = test_db().await;
        let raw = serde_json::to_vec(&serde_json::json!([
            {"sku": "A-1", "quantity": 5},
            {"sku": "B-2", "quantity": 9}
        ]))
        .unwrap();

        let orchestrator = SyncOrchestrator::new(db.clone(), config(true)).unwrap();
        let first = orchestrator.run_from_payload("pos-main", &raw).await.unwrap();
        assert_eq!(first.created, 2);

        let second = orchestrator.run_from_payload("pos-main", &raw).await.unwrap();
        assert_eq!(second.status, SyncRunStatus::Completed);
        assert_eq!(second.created, 0);
        assert_eq!(second.updated, 2);

        // No new ledger entries on the second pass.
        let item = db.items().get_by_sku("A-1").await.unwrap().unwrap();
        assert_eq!(db.ledger().count_for_item(&item.id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_skus_apply_in_payload_order() {
        let db = test_db().await;
        let raw = serde_json::to_vec(&serde_json::json!([
            {"sku": "DUP-1", "quantity": 10},
            {"sku": "DUP-1", "quantity": 3}
        ]))
        .unwrap();

        let orchestrator = SyncOrchestrator::new(db.clone(), config(true)).unwrap();
        let run = orchestrator.run_from_payload("pos-main", &raw).await.unwrap();
        assert_eq!(run.status, SyncRunStatus::Completed);

        // Last record wins because the group applied sequentially.
        let item = db.items().get_by_sku("DUP-1").await.unwrap().unwrap();
        assert_eq!(item.current_quantity, 3);
    }

    #[tokio::test]
    async fn test_unparseable_payload_fails_run_with_structured_error() {
        let db = test_db().await;
        let sink = Arc::new(RecordingAlertSink::default());
        let orchestrator = SyncOrchestrator::new(db.clone(), config(true))
            .unwrap()
            .with_alert_sink(sink.clone());

        let run = orchestrator
            .run_from_payload("pos-main", b"definitely not json")
            .await
            .unwrap();

        assert_eq!(run.status, SyncRunStatus::Failed);
        let error: RunError = serde_json::from_str(run.error.as_deref().unwrap()).unwrap();
        assert_eq!(error.category, "format");

        let failed = sink.failed_runs.lock().unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].0, "pos-main");
    }

    #[tokio::test]
    async fn test_failure_streak_triggers_repeated_alert() {
        let db = test_db().await;
        let sink = Arc::new(RecordingAlertSink::default());
        let orchestrator = SyncOrchestrator::new(db.clone(), config(true))
            .unwrap()
            .with_alert_sink(sink.clone());

        orchestrator.run_from_payload("pos-main", b"bad 1").await.unwrap();
        orchestrator.run_from_payload("pos-main", b"bad 2").await.unwrap();

        let streaks = sink.streaks.lock().unwrap();
        assert_eq!(streaks.len(), 1, "threshold is 2, fired on the second failure");
        assert_eq!(streaks[0], ("pos-main".to_string(), 2));
    }

    #[tokio::test]
    async fn test_unknown_source_is_config_error_without_a_run() {
        let db = test_db().await;
        let orchestrator = SyncOrchestrator::new(db.clone(), config(true)).unwrap();

        let err = orchestrator
            .run_from_payload("nope", b"[]")
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::InvalidConfig(_)));
        assert!(db.sync_runs().history("nope", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_run_finalizes_as_aborted() {
        let db = test_db().await;
        let orchestrator = SyncOrchestrator::new(db.clone(), config(true)).unwrap();
        let handle = orchestrator.cancel_handle();

        handle.cancel();
        let raw = serde_json::to_vec(&serde_json::json!([{"sku": "C-1", "quantity": 1}])).unwrap();
        let run = orchestrator.run_from_payload("pos-main", &raw).await.unwrap();

        assert_eq!(run.status, SyncRunStatus::Failed);
        let error: RunError = serde_json::from_str(run.error.as_deref().unwrap()).unwrap();
        assert_eq!(error.category, "aborted");
        assert!(db.items().get_by_sku("C-1").await.unwrap().is_none());

        // Reset lets the next run proceed normally.
        handle.reset();
        let run = orchestrator.run_from_payload("pos-main", &raw).await.unwrap();
        assert_eq!(run.status, SyncRunStatus::Completed);
    }

    #[tokio::test]
    async fn test_staleness_flags_sources_without_completed_runs() {
        let db = test_db().await;
        let sink = Arc::new(RecordingAlertSink::default());
        let orchestrator = SyncOrchestrator::new(db.clone(), config(true))
            .unwrap()
            .with_alert_sink(sink.clone());

        // Never ran: stale.
        let stale = orchestrator.check_staleness().await.unwrap();
        assert_eq!(stale, vec!["pos-main".to_string()]);
        assert_eq!(*sink.stale.lock().unwrap(), vec!["pos-main".to_string()]);

        // A completed run clears it.
        orchestrator.run_from_payload("pos-main", b"[]").await.unwrap();
        let stale = orchestrator.check_staleness().await.unwrap();
        assert!(stale.is_empty());
    }

    #[tokio::test]
    async fn test_empty_payload_completes_with_zero_counts() {
        let db = test_db().await;
        let orchestrator = SyncOrchestrator::new(db.clone(), config(true)).unwrap();

        let run = orchestrator.run_from_payload("pos-main", b"[]").await.unwrap();
        assert_eq!(run.status, SyncRunStatus::Completed);
        assert_eq!(run.total_records, 0);
        assert_eq!(run.failed, 0);
    }

    #[tokio::test]
    async fn test_provisioning_requires_secret_store() {
        let db = test_db().await;
        let mut orchestrator = SyncOrchestrator::new(db, config(true)).unwrap();
        assert!(matches!(
            orchestrator.provision_credential("pos-main", "tok"),
            Err(SyncError::InvalidConfig(_))
        ));

        let mut orchestrator = orchestrator.with_secret_store(SecretStore::new(&[1u8; 32]));
        orchestrator.provision_credential("pos-main", "tok").unwrap();
        // Stored sealed, not in the clear.
        let sealed = orchestrator.sealed_credentials.get("pos-main").unwrap();
        assert!(!sealed.contains("tok"));
    }
}
