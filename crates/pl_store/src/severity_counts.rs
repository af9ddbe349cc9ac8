//! Per-(scan, space) severity tallies.
//!
//! Increments are commutative, so the store never does read-modify-write
//! from the application layer: one atomic `INSERT .. ON CONFLICT DO UPDATE
//! SET nb_x = nb_x + excluded.nb_x` per delta.  Loss of update is
//! structurally impossible under any interleaving of concurrent workers.

use sqlx::SqlitePool;
use uuid::Uuid;

use pl_core::SeverityCounts;

use crate::error::StoreError;
use crate::models::SeverityCountRow;

#[derive(Clone)]
pub struct SeverityCountStore {
    pool: SqlitePool,
}

impl SeverityCountStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Add `delta` to the (scan, space) tally, creating the row if needed.
    /// A zero delta is a no-op.
    pub async fn increment(
        &self,
        scan_id: Uuid,
        space_key: &str,
        delta: SeverityCounts,
    ) -> Result<(), StoreError> {
        if delta.is_empty() {
            return Ok(());
        }
        sqlx::query(
            "INSERT INTO scan_severity_counts (scan_id, space_key, nb_high, nb_medium, nb_low) \
             VALUES (?, ?, ?, ?, ?) \
             ON CONFLICT (scan_id, space_key) DO UPDATE SET \
               nb_high = nb_high + excluded.nb_high, \
               nb_medium = nb_medium + excluded.nb_medium, \
               nb_low = nb_low + excluded.nb_low",
        )
        .bind(scan_id.to_string())
        .bind(space_key)
        .bind(delta.high as i64)
        .bind(delta.medium as i64)
        .bind(delta.low as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn find(
        &self,
        scan_id: Uuid,
        space_key: &str,
    ) -> Result<Option<SeverityCounts>, StoreError> {
        let row: Option<SeverityCountRow> = sqlx::query_as(
            "SELECT * FROM scan_severity_counts WHERE scan_id = ? AND space_key = ?",
        )
        .bind(scan_id.to_string())
        .bind(space_key)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| r.counts()))
    }

    /// All tallies for one scan, ordered by space key.
    pub async fn find_by_scan(
        &self,
        scan_id: Uuid,
    ) -> Result<Vec<(String, SeverityCounts)>, StoreError> {
        let rows: Vec<SeverityCountRow> = sqlx::query_as(
            "SELECT * FROM scan_severity_counts WHERE scan_id = ? ORDER BY space_key",
        )
        .bind(scan_id.to_string())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|r| (r.space_key.clone(), r.counts()))
            .collect())
    }

    /// Scan-wide totals.
    pub async fn totals_for_scan(&self, scan_id: Uuid) -> Result<SeverityCounts, StoreError> {
        let mut totals = SeverityCounts::default();
        for (_, counts) in self.find_by_scan(scan_id).await? {
            totals += counts;
        }
        Ok(totals)
    }

    pub async fn delete_by_scan(&self, scan_id: Uuid) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM scan_severity_counts WHERE scan_id = ?")
            .bind(scan_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn delete_all(&self) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM scan_severity_counts")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
