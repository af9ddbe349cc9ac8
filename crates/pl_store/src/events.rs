//! Append-only scan event log.
//!
//! Each event is keyed by (scan_id, seq) with seq assigned inside the
//! INSERT itself (`COALESCE(MAX(seq), 0) + 1` subselect) — atomic under
//! SQLite's single-writer lock, so sequences are gapless and monotonic per
//! scan without an application-side counter.
//!
//! Entity lists (raw values + sensitive contexts) are serialised to JSON
//! and vault-encrypted before the INSERT; a plaintext masked digest is kept
//! alongside for listing without the vault key.  Encryption failure aborts
//! the append — plaintext is never written to the `_enc` column.

use sqlx::SqlitePool;
use uuid::Uuid;

use pl_core::{DetectedEntity, ScanEvent, ScanEventType, ScanStatus, Severity};

use crate::db::Store;
use crate::error::StoreError;
use crate::models::{MaskedFinding, ScanEventRow};

/// One persisted event with its sequence number.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredEvent {
    pub seq: i64,
    pub event: ScanEvent,
}

#[derive(Clone)]
pub struct EventStore {
    store: Store,
}

impl EventStore {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    fn pool(&self) -> &SqlitePool {
        &self.store.pool
    }

    /// Append one event, returning its assigned sequence number.
    pub async fn append(&self, event: &ScanEvent) -> Result<i64, StoreError> {
        let entities_enc = if event.entities.is_empty() {
            None
        } else {
            let json = serde_json::to_vec(&event.entities)?;
            Some(self.store.encrypt_value(&json).await?)
        };

        let masked_summary = if event.entities.is_empty() {
            None
        } else {
            let digest: Vec<MaskedFinding> = event
                .entities
                .iter()
                .map(|e| MaskedFinding {
                    pii_type: e.pii_type.clone(),
                    type_label: e.type_label.clone(),
                    masked_context: e.masked_context.clone(),
                    confidence: e.confidence,
                    start: e.start,
                    end: e.end,
                })
                .collect();
            Some(serde_json::to_string(&digest)?)
        };

        let seq: i64 = sqlx::query_scalar(
            "INSERT INTO scan_events \
               (scan_id, seq, event_type, space_key, page_id, page_title, page_url, \
                attachment_name, attachment_media_type, severity, progress, pages_total, \
                status, error_message, entities_enc, masked_summary, occurred_at) \
             VALUES (?, \
               (SELECT COALESCE(MAX(seq), 0) + 1 FROM scan_events WHERE scan_id = ?), \
               ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
             RETURNING seq",
        )
        .bind(event.scan_id.to_string())
        .bind(event.scan_id.to_string())
        .bind(event.event_type.as_str())
        .bind(&event.space_key)
        .bind(&event.page_id)
        .bind(&event.page_title)
        .bind(&event.page_url)
        .bind(&event.attachment_name)
        .bind(&event.attachment_media_type)
        .bind(event.severity.map(|s| s.as_str()))
        .bind(event.progress)
        .bind(event.pages_total.map(|n| n as i64))
        .bind(event.status.map(|s| s.as_str()))
        .bind(&event.error_message)
        .bind(entities_enc)
        .bind(masked_summary)
        .bind(event.occurred_at)
        .fetch_one(self.pool())
        .await?;

        Ok(seq)
    }

    /// All events of a scan in sequence order, entities decrypted.
    pub async fn list(&self, scan_id: Uuid) -> Result<Vec<StoredEvent>, StoreError> {
        let rows: Vec<ScanEventRow> =
            sqlx::query_as("SELECT * FROM scan_events WHERE scan_id = ? ORDER BY seq")
                .bind(scan_id.to_string())
                .fetch_all(self.pool())
                .await?;
        self.decrypt_rows(rows).await
    }

    /// Events of one space within a scan, in sequence order.
    pub async fn list_for_space(
        &self,
        scan_id: Uuid,
        space_key: &str,
    ) -> Result<Vec<StoredEvent>, StoreError> {
        let rows: Vec<ScanEventRow> = sqlx::query_as(
            "SELECT * FROM scan_events WHERE scan_id = ? AND space_key = ? ORDER BY seq",
        )
        .bind(scan_id.to_string())
        .bind(space_key)
        .fetch_all(self.pool())
        .await?;
        self.decrypt_rows(rows).await
    }

    pub async fn count_for_scan(&self, scan_id: Uuid) -> Result<i64, StoreError> {
        Ok(
            sqlx::query_scalar("SELECT COUNT(*) FROM scan_events WHERE scan_id = ?")
                .bind(scan_id.to_string())
                .fetch_one(self.pool())
                .await?,
        )
    }

    pub async fn delete_by_scan(&self, scan_id: Uuid) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM scan_events WHERE scan_id = ?")
            .bind(scan_id.to_string())
            .execute(self.pool())
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn delete_all(&self) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM scan_events")
            .execute(self.pool())
            .await?;
        Ok(result.rows_affected())
    }

    async fn decrypt_rows(&self, rows: Vec<ScanEventRow>) -> Result<Vec<StoredEvent>, StoreError> {
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(self.row_to_event(row).await?);
        }
        Ok(out)
    }

    async fn row_to_event(&self, row: ScanEventRow) -> Result<StoredEvent, StoreError> {
        let scan_id = Uuid::parse_str(&row.scan_id)
            .map_err(|e| StoreError::CorruptRow(format!("scan_id {}: {e}", row.scan_id)))?;
        let event_type = ScanEventType::parse(&row.event_type)
            .ok_or_else(|| StoreError::CorruptRow(format!("event_type {}", row.event_type)))?;
        let severity = row
            .severity
            .as_deref()
            .map(|s| match s {
                "high" => Ok(Severity::High),
                "medium" => Ok(Severity::Medium),
                "low" => Ok(Severity::Low),
                other => Err(StoreError::CorruptRow(format!("severity {other}"))),
            })
            .transpose()?;
        let status = row
            .status
            .as_deref()
            .map(|s| {
                ScanStatus::parse(s).ok_or_else(|| StoreError::CorruptRow(format!("status {s}")))
            })
            .transpose()?;

        let entities: Vec<DetectedEntity> = match &row.entities_enc {
            Some(ciphertext) => {
                let json = self.store.decrypt_value(ciphertext).await?;
                serde_json::from_slice(&json)?
            }
            None => Vec::new(),
        };

        Ok(StoredEvent {
            seq: row.seq,
            event: ScanEvent {
                scan_id,
                event_type,
                space_key: row.space_key,
                page_id: row.page_id,
                page_title: row.page_title,
                page_url: row.page_url,
                attachment_name: row.attachment_name,
                attachment_media_type: row.attachment_media_type,
                entities,
                severity,
                progress: row.progress,
                pages_total: row.pages_total.map(|n| n.max(0) as u64),
                status,
                error_message: row.error_message,
                occurred_at: row.occurred_at,
            },
        })
    }
}
