//! # Sync Run Repository
//!
//! Bookkeeping for reconciliation passes.
//!
//! ## Run Lifecycle
//! ```text
//! create() ──► pending
//! mark_processing() ──► processing
//! finalize_completed(counts) ──► completed   (normal, even with failures)
//! finalize_failed(error) ──► failed          (fetch/parse threw)
//! ```

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use stockpilot_core::{SyncRun, SyncRunStatus};

const RUN_COLUMNS: &str = "id, source_id, status, started_at, completed_at, total_records, \
     created, updated, failed, error";

/// Repository for sync run operations.
#[derive(Debug, Clone)]
pub struct SyncRunRepository {
    pool: SqlitePool,
}

impl SyncRunRepository {
    /// Creates a new SyncRunRepository.
    pub fn new(pool: SqlitePool) -> Self {
        SyncRunRepository { pool }
    }

    /// Creates a pending run for a source.
    pub async fn create(&self, source_id: &str) -> DbResult<SyncRun> {
        let run = SyncRun {
            id: Uuid::new_v4().to_string(),
            source_id: source_id.to_string(),
            status: SyncRunStatus::Pending,
            started_at: Utc::now(),
            completed_at: None,
            total_records: 0,
            created: 0,
            updated: 0,
            failed: 0,
            error: None,
        };

        debug!(run_id = %run.id, source_id = %source_id, "Creating sync run");

        sqlx::query(
            r#"
            INSERT INTO sync_runs (
                id, source_id, status, started_at, completed_at,
                total_records, created, updated, failed, error
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(&run.id)
        .bind(&run.source_id)
        .bind(run.status)
        .bind(run.started_at)
        .bind(run.completed_at)
        .bind(run.total_records)
        .bind(run.created)
        .bind(run.updated)
        .bind(run.failed)
        .bind(&run.error)
        .execute(&self.pool)
        .await?;

        Ok(run)
    }

    /// Transitions a pending run to processing.
    pub async fn mark_processing(&self, id: &str) -> DbResult<()> {
        let result =
            sqlx::query("UPDATE sync_runs SET status = 'processing' WHERE id = ?1 AND status = 'pending'")
                .bind(id)
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("SyncRun (pending)", id));
        }
        Ok(())
    }

    /// Finalizes a run as completed with its aggregate counts.
    ///
    /// Per-record failures land in `failed`; they do not make the run
    /// itself failed. Partial success is the normal terminal state.
    pub async fn finalize_completed(
        &self,
        id: &str,
        total_records: i64,
        created: i64,
        updated: i64,
        failed: i64,
    ) -> DbResult<()> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            UPDATE sync_runs SET
                status = 'completed',
                completed_at = ?2,
                total_records = ?3,
                created = ?4,
                updated = ?5,
                failed = ?6
            WHERE id = ?1 AND status = 'processing'
            "#,
        )
        .bind(id)
        .bind(now)
        .bind(total_records)
        .bind(created)
        .bind(updated)
        .bind(failed)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("SyncRun (processing)", id));
        }
        Ok(())
    }

    /// Finalizes a run as failed with a structured error payload (JSON).
    ///
    /// Only a fetch/parse failure lands here.
    pub async fn finalize_failed(&self, id: &str, error_json: &str) -> DbResult<()> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            UPDATE sync_runs SET
                status = 'failed',
                completed_at = ?2,
                error = ?3
            WHERE id = ?1 AND status IN ('pending', 'processing')
            "#,
        )
        .bind(id)
        .bind(now)
        .bind(error_json)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("SyncRun", id));
        }
        Ok(())
    }

    /// Gets a run by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<SyncRun>> {
        let run = sqlx::query_as::<_, SyncRun>(&format!(
            "SELECT {RUN_COLUMNS} FROM sync_runs WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(run)
    }

    /// Run history for one source, newest first.
    pub async fn history(&self, source_id: &str, limit: u32) -> DbResult<Vec<SyncRun>> {
        let runs = sqlx::query_as::<_, SyncRun>(&format!(
            r#"
            SELECT {RUN_COLUMNS} FROM sync_runs
            WHERE source_id = ?1
            ORDER BY started_at DESC
            LIMIT ?2
            "#
        ))
        .bind(source_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(runs)
    }

    /// Timestamp of the last *completed* run for a source, for staleness
    /// alerting.
    pub async fn last_success_at(
        &self,
        source_id: &str,
    ) -> DbResult<Option<chrono::DateTime<Utc>>> {
        let ts: Option<chrono::DateTime<Utc>> = sqlx::query_scalar(
            r#"
            SELECT completed_at FROM sync_runs
            WHERE source_id = ?1 AND status = 'completed'
            ORDER BY completed_at DESC
            LIMIT 1
            "#,
        )
        .bind(source_id)
        .fetch_optional(&self.pool)
        .await?
        .flatten();

        Ok(ts)
    }

    /// Number of consecutive failed runs for a source (most recent first,
    /// stopping at the first non-failed run). Feeds repeated-failure alerts.
    pub async fn consecutive_failures(&self, source_id: &str) -> DbResult<i64> {
        // Window small on purpose: alerting only cares about "a few in a row".
        let statuses: Vec<SyncRunStatus> = sqlx::query_scalar(
            r#"
            SELECT status FROM sync_runs
            WHERE source_id = ?1
            ORDER BY started_at DESC
            LIMIT 20
            "#,
        )
        .bind(source_id)
        .fetch_all(&self.pool)
        .await?;

        let mut streak = 0i64;
        for status in statuses {
            if status == SyncRunStatus::Failed {
                streak += 1;
            } else {
                break;
            }
        }
        Ok(streak)
    }
}
