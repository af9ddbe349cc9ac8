//! Per-event side-effect sequencing.
//!
//! For every scan event, in this order:
//! 1. persist the checkpoint — always, even when a later step fails;
//! 2. when the event carries entities, aggregate their severities and
//!    atomically increment the per-(scan, space) tally;
//! 3. append the event to the encrypted event log;
//! 4. on Complete, notify space-completed listeners — strictly after the
//!    append has committed, so an observer can never see a completion whose
//!    event is not durable.
//!
//! Checkpoint failures never abort the pipeline: conflicts are logged at
//! info and skipped, benign interrupts at debug, anything else at warn.
//! Event-log failures (including encryption failures) propagate — storing
//! a finding in plaintext because the vault misbehaved is not an option.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};
use uuid::Uuid;

use pl_core::factory::MULTI_SPACE_KEY;
use pl_core::{ScanEvent, ScanEventType, ScanStatus, SeverityCounts};
use pl_store::{CheckpointStore, EventStore, NewCheckpoint, SeverityCountStore, Store, UpsertOutcome};

use crate::error::ScanError;
use crate::interrupt::is_benign_interrupt;

/// Fires once a space's scan reaches Complete.  Implementations must be
/// quick or hand off to their own task; they run on the scan worker.
#[async_trait]
pub trait SpaceCompletionNotifier: Send + Sync {
    async fn space_completed(&self, scan_id: Uuid, space_key: &str);
}

/// Default notifier: a structured log line.
pub struct LoggingNotifier;

#[async_trait]
impl SpaceCompletionNotifier for LoggingNotifier {
    async fn space_completed(&self, scan_id: Uuid, space_key: &str) {
        info!(scan_id = %scan_id, space = %space_key, "space scan completed");
    }
}

pub struct ScanOrchestrator {
    checkpoints: CheckpointStore,
    severity_counts: SeverityCountStore,
    events: EventStore,
    notifier: Arc<dyn SpaceCompletionNotifier>,
}

impl ScanOrchestrator {
    pub fn new(store: &Store, notifier: Arc<dyn SpaceCompletionNotifier>) -> Self {
        Self {
            checkpoints: store.checkpoints(),
            severity_counts: store.severity_counts(),
            events: store.events(),
            notifier,
        }
    }

    /// Run the full side-effect sequence for one event.
    pub async fn handle_event(&self, event: &ScanEvent) -> Result<(), ScanError> {
        self.persist_checkpoint(event).await;

        if !event.entities.is_empty() {
            let delta = SeverityCounts::aggregate(&event.entities);
            if let Err(e) = self
                .severity_counts
                .increment(event.scan_id, &event.space_key, delta)
                .await
            {
                // Commutative increments tolerate a single lost delta far
                // better than an aborted scan; the event log still has the
                // entities for a rebuild.
                warn!(
                    scan_id = %event.scan_id,
                    space = %event.space_key,
                    error = %e,
                    "severity increment failed"
                );
            }
        }

        self.events.append(event).await?;

        if event.event_type == ScanEventType::Complete {
            self.notifier
                .space_completed(event.scan_id, &event.space_key)
                .await;
        }
        Ok(())
    }

    /// Step 1: checkpoint write.  Never propagates.
    async fn persist_checkpoint(&self, event: &ScanEvent) {
        // Multi-space marker events are scan-scoped; they have no space
        // checkpoint to advance.
        if event.space_key == MULTI_SPACE_KEY {
            return;
        }

        let new = checkpoint_for(event);
        match self.checkpoints.upsert(&new).await {
            Ok(UpsertOutcome::Applied) => {
                if event.event_type == ScanEventType::PageComplete {
                    // The attachment loop for this page is done; a resume
                    // must not restart it.
                    if let Err(e) = self
                        .checkpoints
                        .clear_attachment(event.scan_id, &event.space_key)
                        .await
                    {
                        warn!(scan_id = %event.scan_id, error = %e, "attachment marker clear failed");
                    }
                }
            }
            Ok(UpsertOutcome::SkippedIllegalTransition) => {
                info!(
                    scan_id = %event.scan_id,
                    space = %event.space_key,
                    event_type = event.event_type.as_str(),
                    "checkpoint write skipped (concurrent or terminal state)"
                );
            }
            Err(e) if is_benign_interrupt(&e) => {
                debug!(
                    scan_id = %event.scan_id,
                    space = %event.space_key,
                    error = %e,
                    "checkpoint write interrupted by a disconnect elsewhere; continuing"
                );
            }
            Err(e) => {
                warn!(
                    scan_id = %event.scan_id,
                    space = %event.space_key,
                    error = %e,
                    "checkpoint write failed; resume will re-scan this page"
                );
            }
        }
    }
}

/// Derive the checkpoint write from an event.  Only Item/AttachmentItem
/// advance the page cursor; only AttachmentItem sets the in-flight
/// attachment marker; progress rides along whenever present.
fn checkpoint_for(event: &ScanEvent) -> NewCheckpoint {
    let last_page_id = if event.advances_cursor() {
        event.page_id.clone()
    } else {
        None
    };
    let last_attachment_name = if event.event_type == ScanEventType::AttachmentItem {
        event.attachment_name.clone()
    } else {
        None
    };
    NewCheckpoint {
        scan_id: event.scan_id,
        space_key: event.space_key.clone(),
        last_page_id,
        last_attachment_name,
        status: event.status.unwrap_or(ScanStatus::Running),
        progress: event.progress,
    }
}
