//! Durable per-(scan, space) cursors.
//!
//! The upsert is a single atomic `INSERT .. ON CONFLICT DO UPDATE` with
//! merge semantics, so concurrent writers for different pages of the same
//! space cannot lose updates:
//! - page id / attachment name only overwrite when the incoming value is
//!   non-blank;
//! - progress only overwrites when the incoming value is non-null (and the
//!   pipeline only ever reports non-decreasing progress, so the stored
//!   value never regresses);
//! - status and updated_at always overwrite.
//!
//! The status state machine is consulted before writing: a write against a
//! terminal checkpoint (Completed / Failed) is skipped with a warning, not
//! an error — late or duplicate events after completion are expected under
//! concurrency.  The SQL carries the same terminal guard so the read-check
//! race cannot overwrite a terminal row either.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::{debug, warn};
use uuid::Uuid;

use pl_core::{ScanCheckpoint, ScanStatus};

use crate::error::StoreError;
use crate::models::CheckpointRow;

/// Input for one checkpoint write.
#[derive(Debug, Clone)]
pub struct NewCheckpoint {
    pub scan_id: Uuid,
    pub space_key: String,
    pub last_page_id: Option<String>,
    pub last_attachment_name: Option<String>,
    pub status: ScanStatus,
    pub progress: Option<f64>,
}

/// What the upsert did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Applied,
    /// The stored status is terminal; the write was skipped.
    SkippedIllegalTransition,
}

#[derive(Clone)]
pub struct CheckpointStore {
    pool: SqlitePool,
}

impl CheckpointStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Atomic merge-upsert of one checkpoint.
    pub async fn upsert(&self, new: &NewCheckpoint) -> Result<UpsertOutcome, StoreError> {
        // Status gate: never resurrect a terminal checkpoint.
        if let Some(current) = self.find(new.scan_id, &new.space_key).await? {
            if !current.status.allows_transition_to(new.status) {
                warn!(
                    scan_id = %new.scan_id,
                    space = %new.space_key,
                    current = current.status.as_str(),
                    attempted = new.status.as_str(),
                    "checkpoint write skipped: illegal status transition"
                );
                return Ok(UpsertOutcome::SkippedIllegalTransition);
            }
        }

        let result = sqlx::query(
            "INSERT INTO scan_checkpoints \
               (scan_id, space_key, last_page_id, last_attachment_name, status, progress, updated_at, version) \
             VALUES (?, ?, ?, ?, ?, ?, ?, 1) \
             ON CONFLICT (scan_id, space_key) DO UPDATE SET \
               last_page_id = CASE \
                 WHEN excluded.last_page_id IS NOT NULL AND TRIM(excluded.last_page_id) != '' \
                 THEN excluded.last_page_id ELSE scan_checkpoints.last_page_id END, \
               last_attachment_name = CASE \
                 WHEN excluded.last_attachment_name IS NOT NULL AND TRIM(excluded.last_attachment_name) != '' \
                 THEN excluded.last_attachment_name ELSE scan_checkpoints.last_attachment_name END, \
               status = excluded.status, \
               progress = COALESCE(excluded.progress, scan_checkpoints.progress), \
               updated_at = excluded.updated_at, \
               version = scan_checkpoints.version + 1 \
             WHERE scan_checkpoints.status NOT IN ('completed', 'failed')",
        )
        .bind(new.scan_id.to_string())
        .bind(&new.space_key)
        .bind(&new.last_page_id)
        .bind(&new.last_attachment_name)
        .bind(new.status.as_str())
        .bind(new.progress)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            // Lost the race against a concurrent terminal write.
            debug!(
                scan_id = %new.scan_id,
                space = %new.space_key,
                "checkpoint upsert matched a terminal row; skipped"
            );
            return Ok(UpsertOutcome::SkippedIllegalTransition);
        }
        Ok(UpsertOutcome::Applied)
    }

    /// Clear the in-flight attachment marker once a page fully completes.
    pub async fn clear_attachment(&self, scan_id: Uuid, space_key: &str) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE scan_checkpoints SET last_attachment_name = NULL, updated_at = ? \
             WHERE scan_id = ? AND space_key = ? AND status NOT IN ('completed', 'failed')",
        )
        .bind(Utc::now())
        .bind(scan_id.to_string())
        .bind(space_key)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn find(
        &self,
        scan_id: Uuid,
        space_key: &str,
    ) -> Result<Option<ScanCheckpoint>, StoreError> {
        let row: Option<CheckpointRow> = sqlx::query_as(
            "SELECT * FROM scan_checkpoints WHERE scan_id = ? AND space_key = ?",
        )
        .bind(scan_id.to_string())
        .bind(space_key)
        .fetch_optional(&self.pool)
        .await?;
        row.map(CheckpointRow::into_domain).transpose()
    }

    /// All checkpoints of one scan, ordered by space key.
    pub async fn find_by_scan(&self, scan_id: Uuid) -> Result<Vec<ScanCheckpoint>, StoreError> {
        let rows: Vec<CheckpointRow> = sqlx::query_as(
            "SELECT * FROM scan_checkpoints WHERE scan_id = ? ORDER BY space_key",
        )
        .bind(scan_id.to_string())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(CheckpointRow::into_domain).collect()
    }

    /// Most recently updated scan that is still Running or Paused — used to
    /// avoid starting a duplicate concurrent scan.
    pub async fn most_recent_active_scan(&self) -> Result<Option<Uuid>, StoreError> {
        let id: Option<String> = sqlx::query_scalar(
            "SELECT scan_id FROM scan_checkpoints \
             WHERE status IN ('running', 'paused', 'cancelled') \
             ORDER BY updated_at DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;
        id.map(|s| {
            Uuid::parse_str(&s).map_err(|e| StoreError::CorruptRow(format!("scan_id {s}: {e}")))
        })
        .transpose()
    }

    /// Latest checkpoint per space, across all scans.
    pub async fn latest_per_space(&self) -> Result<Vec<ScanCheckpoint>, StoreError> {
        let rows: Vec<CheckpointRow> = sqlx::query_as(
            "SELECT c.* FROM scan_checkpoints c \
             JOIN (SELECT space_key, MAX(updated_at) AS max_updated \
                   FROM scan_checkpoints GROUP BY space_key) latest \
               ON c.space_key = latest.space_key AND c.updated_at = latest.max_updated \
             ORDER BY c.space_key",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(CheckpointRow::into_domain).collect()
    }

    /// Purge Running/Paused checkpoints before starting a fresh scan.
    /// Returns the number of rows removed.
    pub async fn delete_active(&self) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "DELETE FROM scan_checkpoints WHERE status IN ('running', 'paused', 'cancelled')",
        )
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn delete_by_scan(&self, scan_id: Uuid) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM scan_checkpoints WHERE scan_id = ?")
            .bind(scan_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn delete_all(&self) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM scan_checkpoints")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
