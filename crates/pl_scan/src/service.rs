//! Scan use cases: start, resume, pause, purge, subscribe.
//!
//! Every stream use case follows the same shape: validate, register a
//! detached producer with the task manager, return the scan id at once.
//! Producers run the page pipeline per space and hand each event to the
//! orchestrator BEFORE publishing it to subscribers, so nothing becomes
//! visible that is not already durable.

use std::sync::Arc;

use tracing::{debug, error, info, warn};
use uuid::Uuid;

use pl_core::factory::{self, MULTI_SPACE_KEY};
use pl_core::resume::{compute_remaining_pages, ResumePlan};
use pl_core::{Page, ScanCheckpoint, ScanEvent, ScanStatus, Space};
use pl_store::{NewCheckpoint, Store};

use crate::detector::{DetectionRequest, PiiDetector};
use crate::error::ScanError;
use crate::interrupt::is_benign_interrupt;
use crate::orchestrator::{ScanOrchestrator, SpaceCompletionNotifier};
use crate::source::ContentSource;
use crate::task_manager::{EventPublisher, ScanTaskManager, Subscription};

/// Spans below this confidence are not reported by the detector.
pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.5;

struct Inner {
    store: Store,
    orchestrator: ScanOrchestrator,
    detector: Arc<dyn PiiDetector>,
    source: Arc<dyn ContentSource>,
    tasks: ScanTaskManager,
    threshold: f64,
}

#[derive(Clone)]
pub struct ScanService {
    inner: Arc<Inner>,
}

impl ScanService {
    pub fn new(
        store: Store,
        detector: Arc<dyn PiiDetector>,
        source: Arc<dyn ContentSource>,
        notifier: Arc<dyn SpaceCompletionNotifier>,
    ) -> Self {
        let orchestrator = ScanOrchestrator::new(&store, notifier);
        Self {
            inner: Arc::new(Inner {
                store,
                orchestrator,
                detector,
                source,
                tasks: ScanTaskManager::new(),
                threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            }),
        }
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        // Arc::get_mut is fine here: builders run before the service is shared.
        if let Some(inner) = Arc::get_mut(&mut self.inner) {
            inner.threshold = threshold.clamp(0.0, 1.0);
        }
        self
    }

    pub fn task_manager(&self) -> ScanTaskManager {
        self.inner.tasks.clone()
    }

    /// Start scanning one space on a detached task.  Refuses when another
    /// scan is still active unless `force` purges it first.  An unknown
    /// space key still yields a scan id: its stream carries a single Error
    /// event, so subscribers learn the reason the same way they learn
    /// everything else.
    pub async fn stream_space(&self, space_key: &str, force: bool) -> Result<Uuid, ScanError> {
        self.guard_active(force).await?;

        let space = self
            .inner
            .source
            .space(space_key)
            .await
            .map_err(|e| ScanError::Source(e.to_string()))?;

        let scan_id = Uuid::new_v4();
        let key = space_key.to_string();
        let inner = self.inner.clone();

        match space {
            Some(space) => {
                info!(scan_id = %scan_id, space = %space.key, "starting space scan");
                self.inner
                    .tasks
                    .start(scan_id, move |publisher| async move {
                        scan_one_space(&inner, &publisher, scan_id, &space.key, None).await;
                    })
                    .await;
            }
            None => {
                warn!(scan_id = %scan_id, space = %key, "space not found");
                self.inner
                    .tasks
                    .start(scan_id, move |publisher| async move {
                        emit_best_effort(
                            &inner,
                            &publisher,
                            factory::space_error_event(scan_id, &key, "space not found"),
                        )
                        .await;
                    })
                    .await;
            }
        }
        Ok(scan_id)
    }

    /// Scan every space of the instance, sequentially, under one scan id.
    /// Calling this is an explicit restart: any active checkpoints from a
    /// previous run are purged first.  A failing space is reported and
    /// skipped; its siblings continue.
    pub async fn stream_all_spaces(&self) -> Result<Uuid, ScanError> {
        self.purge_active().await?;

        let spaces = self
            .inner
            .source
            .all_spaces()
            .await
            .map_err(|e| ScanError::Source(e.to_string()))?;

        let scan_id = Uuid::new_v4();
        info!(scan_id = %scan_id, spaces = spaces.len(), "starting multi-space scan");

        let inner = self.inner.clone();
        self.inner
            .tasks
            .start(scan_id, move |publisher| async move {
                run_multi_space(&inner, &publisher, scan_id, spaces).await;
            })
            .await;
        Ok(scan_id)
    }

    /// Resume an unfinished scan from its checkpoints — the given one, or
    /// the most recently updated active scan when none is named.  Each
    /// non-terminal space picks up where its cursor left off; progress
    /// continues from the analyzed offset instead of restarting at zero.
    pub async fn resume_all_spaces(&self, scan: Option<Uuid>) -> Result<Uuid, ScanError> {
        let scan_id = match scan {
            Some(id) => id,
            None => self
                .inner
                .store
                .checkpoints()
                .most_recent_active_scan()
                .await?
                .ok_or(ScanError::NothingToResume)?,
        };

        if self.inner.tasks.is_running(scan_id).await {
            return Err(ScanError::ScanAlreadyActive(scan_id));
        }

        let checkpoints = self.inner.store.checkpoints().find_by_scan(scan_id).await?;
        let pending: Vec<ScanCheckpoint> = checkpoints
            .into_iter()
            .filter(|cp| cp.space_key != MULTI_SPACE_KEY && !cp.status.is_terminal())
            .collect();
        if pending.is_empty() {
            return Err(ScanError::NothingToResume);
        }

        info!(scan_id = %scan_id, spaces = pending.len(), "resuming scan");

        // A multi-space resume re-emits both markers, so a reattaching
        // consumer sees the same bracketed stream as a fresh full scan.
        let multi = pending.len() > 1;
        let spaces_total = pending.len() as u64;
        let inner = self.inner.clone();
        self.inner
            .tasks
            .start(scan_id, move |publisher| async move {
                if multi {
                    emit_best_effort(
                        &inner,
                        &publisher,
                        factory::multi_start_event(scan_id, spaces_total),
                    )
                    .await;
                }
                for cp in &pending {
                    scan_one_space(&inner, &publisher, scan_id, &cp.space_key, Some(cp)).await;
                }
                if multi {
                    emit_best_effort(&inner, &publisher, factory::multi_complete_event(scan_id))
                        .await;
                }
            })
            .await;
        Ok(scan_id)
    }

    /// Abort a running scan and mark its open checkpoints Paused.  Returns
    /// false when the scan was not running (re-entrant).
    pub async fn pause_scan(&self, scan_id: Uuid) -> Result<bool, ScanError> {
        let aborted = self.inner.tasks.pause(scan_id).await;
        if !aborted {
            return Ok(false);
        }

        let checkpoints = self.inner.store.checkpoints();
        for cp in checkpoints.find_by_scan(scan_id).await? {
            if cp.status.is_terminal() {
                continue;
            }
            let write = NewCheckpoint {
                scan_id,
                space_key: cp.space_key.clone(),
                last_page_id: None,
                last_attachment_name: None,
                status: ScanStatus::Paused,
                progress: None,
            };
            if let Err(e) = checkpoints.upsert(&write).await {
                warn!(scan_id = %scan_id, space = %cp.space_key, error = %e, "pause checkpoint write failed");
            }
        }
        Ok(true)
    }

    /// Delete every checkpoint, tally, and event.  Irreversible.
    pub async fn purge_all_scans(&self) -> Result<u64, ScanError> {
        let store = &self.inner.store;
        let mut removed = store.checkpoints().delete_all().await?;
        removed += store.severity_counts().delete_all().await?;
        removed += store.events().delete_all().await?;
        info!(rows = removed, "purged all scan data");
        Ok(removed)
    }

    /// Replay-then-live event stream of a scan; None for unknown ids.
    pub async fn subscribe(&self, scan_id: Uuid) -> Option<Subscription> {
        self.inner.tasks.subscribe(scan_id).await
    }

    pub async fn is_running(&self, scan_id: Uuid) -> bool {
        self.inner.tasks.is_running(scan_id).await
    }

    async fn guard_active(&self, force: bool) -> Result<(), ScanError> {
        if force {
            return self.purge_active().await;
        }
        // Stale rows from a previous process run count too: they are
        // resumable, so a fresh start without force is refused.
        let checkpoints = self.inner.store.checkpoints();
        if let Some(active) = checkpoints.most_recent_active_scan().await? {
            return Err(ScanError::ScanAlreadyActive(active));
        }
        Ok(())
    }

    /// Stop whatever scan is active and delete its resumable checkpoints.
    async fn purge_active(&self) -> Result<(), ScanError> {
        let checkpoints = self.inner.store.checkpoints();
        if let Some(active) = checkpoints.most_recent_active_scan().await? {
            self.inner.tasks.pause(active).await;
            let removed = checkpoints.delete_active().await?;
            debug!(scan_id = %active, removed, "purged active checkpoints before a fresh scan");
        }
        Ok(())
    }
}

async fn run_multi_space(
    inner: &Arc<Inner>,
    publisher: &EventPublisher,
    scan_id: Uuid,
    spaces: Vec<Space>,
) {
    emit_best_effort(
        inner,
        publisher,
        factory::multi_start_event(scan_id, spaces.len() as u64),
    )
    .await;
    for space in &spaces {
        scan_one_space(inner, publisher, scan_id, &space.key, None).await;
    }
    emit_best_effort(inner, publisher, factory::multi_complete_event(scan_id)).await;
}

/// Scan one space end to end: listing, resume planning, then the page
/// pipeline.  Detector failures are page-scoped; source failures abandon
/// the space with a Failed checkpoint and an Error event.
async fn scan_one_space(
    inner: &Arc<Inner>,
    publisher: &EventPublisher,
    scan_id: Uuid,
    space_key: &str,
    checkpoint: Option<&ScanCheckpoint>,
) {
    let pages = match inner.source.pages_in_space(space_key).await {
        Ok(pages) => pages,
        Err(e) => {
            warn!(scan_id = %scan_id, space = %space_key, error = %e, "space listing failed");
            emit_best_effort(
                inner,
                publisher,
                factory::space_error_event(scan_id, space_key, &e.to_string()),
            )
            .await;
            return;
        }
    };

    let plan = compute_remaining_pages(&pages, checkpoint);
    emit_best_effort(
        inner,
        publisher,
        factory::start_event(
            scan_id,
            space_key,
            plan.original_total,
            factory::progress_percent(plan.analyzed_offset, plan.original_total),
        ),
    )
    .await;

    if scan_pages(inner, publisher, scan_id, space_key, &plan).await {
        emit_best_effort(inner, publisher, factory::complete_event(scan_id, space_key)).await;
    }
}

/// Run the page pipeline over a resume plan.  Returns false when the space
/// must be abandoned (persistent event-log failure).
async fn scan_pages(
    inner: &Arc<Inner>,
    publisher: &EventPublisher,
    scan_id: Uuid,
    space_key: &str,
    plan: &ResumePlan,
) -> bool {
    let total = plan.original_total;
    for (i, page) in plan.remaining.iter().enumerate() {
        let analyzed = plan.analyzed_offset + i as u64;

        emit_best_effort(
            inner,
            publisher,
            factory::page_start_event(scan_id, space_key, page),
        )
        .await;

        match detect(inner, scan_id, space_key, page, &page.content).await {
            Ok(spans) => {
                let ev = factory::item_event(
                    scan_id,
                    space_key,
                    page,
                    spans,
                    factory::progress_percent(analyzed, total),
                );
                if !emit(inner, publisher, ev).await {
                    return false;
                }
            }
            Err(message) => {
                emit_best_effort(
                    inner,
                    publisher,
                    factory::page_error_event(scan_id, space_key, Some(page.id.clone()), &message),
                )
                .await;
                continue;
            }
        }

        scan_attachments(inner, publisher, scan_id, space_key, page, analyzed, total).await;

        emit_best_effort(
            inner,
            publisher,
            factory::page_complete_event(
                scan_id,
                space_key,
                page,
                factory::progress_percent(analyzed + 1, total),
            ),
        )
        .await;
    }
    true
}

async fn scan_attachments(
    inner: &Arc<Inner>,
    publisher: &EventPublisher,
    scan_id: Uuid,
    space_key: &str,
    page: &Page,
    analyzed: u64,
    total: u64,
) {
    let attachments = match inner.source.attachments(&page.id).await {
        Ok(list) => list,
        Err(e) => {
            emit_best_effort(
                inner,
                publisher,
                factory::page_error_event(scan_id, space_key, Some(page.id.clone()), &e.to_string()),
            )
            .await;
            return;
        }
    };

    for attachment in &attachments {
        let text = match inner.source.attachment_text(attachment).await {
            Ok(Some(text)) => text,
            Ok(None) => {
                debug!(page = %page.id, attachment = %attachment.name, "no extractable text; skipped");
                continue;
            }
            Err(e) => {
                emit_best_effort(
                    inner,
                    publisher,
                    factory::page_error_event(
                        scan_id,
                        space_key,
                        Some(page.id.clone()),
                        &e.to_string(),
                    ),
                )
                .await;
                continue;
            }
        };

        match detect(inner, scan_id, space_key, page, &text).await {
            Ok(spans) => {
                let ev = factory::attachment_item_event(
                    scan_id,
                    space_key,
                    page,
                    attachment,
                    &text,
                    spans,
                    factory::progress_percent(analyzed, total),
                );
                emit_best_effort(inner, publisher, ev).await;
            }
            Err(message) => {
                emit_best_effort(
                    inner,
                    publisher,
                    factory::page_error_event(scan_id, space_key, Some(page.id.clone()), &message),
                )
                .await;
            }
        }
    }
}

async fn detect(
    inner: &Arc<Inner>,
    scan_id: Uuid,
    space_key: &str,
    page: &Page,
    content: &str,
) -> Result<Vec<pl_core::DetectedSpan>, String> {
    let req = DetectionRequest {
        page_id: &page.id,
        page_title: &page.title,
        space_key,
        content,
        threshold: inner.threshold,
    };
    match inner.detector.detect(req).await {
        Ok(res) => Ok(res.entities),
        Err(e) => {
            warn!(scan_id = %scan_id, page = %page.id, error = %e, "detection failed");
            Err(e.to_string())
        }
    }
}

/// Persist, then publish.  Returns false when the space must abort.
async fn emit(inner: &Arc<Inner>, publisher: &EventPublisher, event: ScanEvent) -> bool {
    match inner.orchestrator.handle_event(&event).await {
        Ok(()) => {
            publisher.publish(event);
            true
        }
        Err(e) if is_benign_interrupt(&e) => {
            debug!(scan_id = %event.scan_id, error = %e, "event persist interrupted; continuing");
            publisher.publish(event);
            true
        }
        Err(e) => {
            error!(
                scan_id = %event.scan_id,
                space = %event.space_key,
                error = %e,
                "event persist failed; abandoning space"
            );
            false
        }
    }
}

/// Like [`emit`] but for events whose loss the pipeline tolerates
/// (markers, errors, completion bookkeeping).  Failures are already logged
/// inside [`emit`].
async fn emit_best_effort(inner: &Arc<Inner>, publisher: &EventPublisher, event: ScanEvent) {
    let _ = emit(inner, publisher, event).await;
}
