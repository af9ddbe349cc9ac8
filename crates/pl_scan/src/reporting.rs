//! Read-side reporting over checkpoints, tallies, and the event log.
//!
//! State and tally queries never touch the vault; only
//! [`ScanReporter::findings_for_scan`] decrypts entities and therefore
//! requires an unlocked vault.

use uuid::Uuid;

use pl_core::{ScanCheckpoint, SeverityCounts};
use pl_store::{Store, StoredEvent};

use crate::error::ScanError;

/// Latest known state of one space plus its finding tally.
#[derive(Debug, Clone)]
pub struct SpaceScanState {
    pub checkpoint: ScanCheckpoint,
    pub counts: SeverityCounts,
}

/// One scan rolled up across its spaces.
#[derive(Debug, Clone)]
pub struct ScanSummary {
    pub scan_id: Uuid,
    pub spaces: Vec<SpaceScanState>,
    pub totals: SeverityCounts,
    pub event_count: i64,
}

#[derive(Clone)]
pub struct ScanReporter {
    store: Store,
}

impl ScanReporter {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Latest checkpoint per space across all scans, with tallies.
    pub async fn space_scan_states(&self) -> Result<Vec<SpaceScanState>, ScanError> {
        let checkpoints = self.store.checkpoints().latest_per_space().await?;
        let counts_store = self.store.severity_counts();
        let mut states = Vec::with_capacity(checkpoints.len());
        for cp in checkpoints {
            let counts = counts_store
                .find(cp.scan_id, &cp.space_key)
                .await?
                .unwrap_or_default();
            states.push(SpaceScanState {
                checkpoint: cp,
                counts,
            });
        }
        Ok(states)
    }

    /// Roll one scan up across its spaces.
    pub async fn scan_summary(&self, scan_id: Uuid) -> Result<ScanSummary, ScanError> {
        let checkpoints = self.store.checkpoints().find_by_scan(scan_id).await?;
        if checkpoints.is_empty() {
            return Err(ScanError::ScanNotFound(scan_id));
        }

        let counts_store = self.store.severity_counts();
        let mut spaces = Vec::with_capacity(checkpoints.len());
        for cp in checkpoints {
            let counts = counts_store
                .find(scan_id, &cp.space_key)
                .await?
                .unwrap_or_default();
            spaces.push(SpaceScanState {
                checkpoint: cp,
                counts,
            });
        }

        let totals = counts_store.totals_for_scan(scan_id).await?;
        let event_count = self.store.events().count_for_scan(scan_id).await?;

        Ok(ScanSummary {
            scan_id,
            spaces,
            totals,
            event_count,
        })
    }

    /// Summary of the most recently updated scan, active or not.
    pub async fn latest_scan(&self) -> Result<Option<ScanSummary>, ScanError> {
        let checkpoints = self.store.checkpoints();
        let scan_id = match checkpoints.most_recent_active_scan().await? {
            Some(id) => Some(id),
            None => checkpoints
                .latest_per_space()
                .await?
                .into_iter()
                .max_by_key(|cp| cp.updated_at)
                .map(|cp| cp.scan_id),
        };
        match scan_id {
            Some(id) => Ok(Some(self.scan_summary(id).await?)),
            None => Ok(None),
        }
    }

    /// Events of a scan that carry findings, entities decrypted.  Fails
    /// with a vault error when the vault is locked.
    pub async fn findings_for_scan(&self, scan_id: Uuid) -> Result<Vec<StoredEvent>, ScanError> {
        let events = self.store.events().list(scan_id).await?;
        Ok(events
            .into_iter()
            .filter(|e| !e.event.entities.is_empty())
            .collect())
    }
}
