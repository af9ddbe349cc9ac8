//! Database row models — these map to/from SQL rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use pl_core::{ScanCheckpoint, ScanStatus, SeverityCounts};

use crate::error::StoreError;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct CheckpointRow {
    pub scan_id: String,
    pub space_key: String,
    pub last_page_id: Option<String>,
    pub last_attachment_name: Option<String>,
    pub status: String,
    pub progress: Option<f64>,
    pub updated_at: DateTime<Utc>,
    pub version: i64,
}

impl CheckpointRow {
    pub fn into_domain(self) -> Result<ScanCheckpoint, StoreError> {
        let scan_id = Uuid::parse_str(&self.scan_id)
            .map_err(|e| StoreError::CorruptRow(format!("scan_id {}: {e}", self.scan_id)))?;
        let status = ScanStatus::parse(&self.status)
            .ok_or_else(|| StoreError::CorruptRow(format!("status {}", self.status)))?;
        Ok(ScanCheckpoint {
            scan_id,
            space_key: self.space_key,
            last_page_id: self.last_page_id,
            last_attachment_name: self.last_attachment_name,
            status,
            progress: self.progress,
            updated_at: self.updated_at,
            version: self.version,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct SeverityCountRow {
    pub scan_id: String,
    pub space_key: String,
    pub nb_high: i64,
    pub nb_medium: i64,
    pub nb_low: i64,
}

impl SeverityCountRow {
    pub fn counts(&self) -> SeverityCounts {
        SeverityCounts {
            high: self.nb_high.max(0) as u64,
            medium: self.nb_medium.max(0) as u64,
            low: self.nb_low.max(0) as u64,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ScanEventRow {
    pub scan_id: String,
    pub seq: i64,
    pub event_type: String,
    pub space_key: String,
    pub page_id: Option<String>,
    pub page_title: Option<String>,
    pub page_url: Option<String>,
    pub attachment_name: Option<String>,
    pub attachment_media_type: Option<String>,
    pub severity: Option<String>,
    pub progress: Option<f64>,
    pub pages_total: Option<i64>,
    pub status: Option<String>,
    pub error_message: Option<String>,
    /// Vault-encrypted JSON of the entity list; NULL when no entities.
    pub entities_enc: Option<String>,
    /// Plaintext JSON of masked findings.
    pub masked_summary: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Plaintext, PII-free digest of one finding — safe to list without
/// unlocking the vault.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MaskedFinding {
    pub pii_type: String,
    pub type_label: String,
    pub masked_context: String,
    pub confidence: f64,
    pub start: usize,
    pub end: usize,
}
