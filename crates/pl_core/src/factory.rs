//! Constructors for every scan-event variant.
//!
//! The factory is the only place events are built, so ordering and field
//! conventions (progress, severity, status) stay uniform across the
//! pipeline.  Item / attachment-item construction maps raw detector spans
//! into [`DetectedEntity`] values and runs context extraction for each.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::content::{Attachment, ContentKind, Page};
use crate::context::enrich_entities;
use crate::entity::DetectedEntity;
use crate::event::{ScanEvent, ScanEventType, ScanStatus};
use crate::severity::Severity;

/// Space key used for scan-scoped (multi-space) events.
pub const MULTI_SPACE_KEY: &str = "*";

/// A raw span as returned by the detection backend, before context
/// extraction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DetectedSpan {
    pub pii_type: String,
    pub type_label: String,
    pub value: String,
    pub start: usize,
    pub end: usize,
    pub confidence: f64,
}

/// Percentage of `analyzed` out of `total`, with an empty space counting as
/// fully scanned.
pub fn progress_percent(analyzed: u64, total: u64) -> f64 {
    if total == 0 {
        100.0
    } else {
        (analyzed as f64 / total as f64) * 100.0
    }
}

fn base_event(scan_id: Uuid, event_type: ScanEventType, space_key: &str) -> ScanEvent {
    ScanEvent {
        scan_id,
        event_type,
        space_key: space_key.to_string(),
        page_id: None,
        page_title: None,
        page_url: None,
        attachment_name: None,
        attachment_media_type: None,
        entities: Vec::new(),
        severity: None,
        progress: None,
        pages_total: None,
        status: None,
        error_message: None,
        occurred_at: Utc::now(),
    }
}

fn max_severity(entities: &[DetectedEntity]) -> Option<Severity> {
    entities
        .iter()
        .map(|e| Severity::classify(&e.pii_type))
        .max()
}

fn build_entities(source: &str, kind: ContentKind, spans: Vec<DetectedSpan>) -> Vec<DetectedEntity> {
    let mut entities: Vec<DetectedEntity> = spans
        .into_iter()
        .map(|span| DetectedEntity {
            start: span.start,
            end: span.end,
            pii_type: span.pii_type,
            type_label: span.type_label,
            confidence: span.confidence.clamp(0.0, 1.0),
            sensitive_value: span.value,
            sensitive_context: String::new(),
            masked_context: String::new(),
        })
        .collect();
    enrich_entities(source, &mut entities, kind);
    entities
}

pub fn start_event(scan_id: Uuid, space_key: &str, pages_total: u64, progress: f64) -> ScanEvent {
    let mut ev = base_event(scan_id, ScanEventType::Start, space_key);
    ev.pages_total = Some(pages_total);
    ev.progress = Some(progress);
    ev.status = Some(ScanStatus::Running);
    ev
}

pub fn page_start_event(scan_id: Uuid, space_key: &str, page: &Page) -> ScanEvent {
    let mut ev = base_event(scan_id, ScanEventType::PageStart, space_key);
    ev.page_id = Some(page.id.clone());
    ev.page_title = Some(page.title.clone());
    ev.page_url = Some(page.url.clone());
    ev.status = Some(ScanStatus::Running);
    ev
}

/// Final event for a page's own content.  Maps detector spans to entities
/// (with context extraction against the page body) and carries the highest
/// entity severity.
pub fn item_event(
    scan_id: Uuid,
    space_key: &str,
    page: &Page,
    spans: Vec<DetectedSpan>,
    progress: f64,
) -> ScanEvent {
    let mut ev = base_event(scan_id, ScanEventType::Item, space_key);
    ev.page_id = Some(page.id.clone());
    ev.page_title = Some(page.title.clone());
    ev.page_url = Some(page.url.clone());
    ev.entities = build_entities(&page.content, page.kind, spans);
    ev.severity = max_severity(&ev.entities);
    ev.progress = Some(progress);
    ev.status = Some(ScanStatus::Running);
    ev
}

/// Final event for one attachment of a page.  Context extraction runs
/// against the extracted attachment text, which is always plain.
pub fn attachment_item_event(
    scan_id: Uuid,
    space_key: &str,
    page: &Page,
    attachment: &Attachment,
    text: &str,
    spans: Vec<DetectedSpan>,
    progress: f64,
) -> ScanEvent {
    let mut ev = base_event(scan_id, ScanEventType::AttachmentItem, space_key);
    ev.page_id = Some(page.id.clone());
    ev.page_title = Some(page.title.clone());
    ev.page_url = Some(page.url.clone());
    ev.attachment_name = Some(attachment.name.clone());
    ev.attachment_media_type = Some(attachment.media_type.clone());
    ev.entities = build_entities(text, ContentKind::Plain, spans);
    ev.severity = max_severity(&ev.entities);
    ev.progress = Some(progress);
    ev.status = Some(ScanStatus::Running);
    ev
}

pub fn page_complete_event(scan_id: Uuid, space_key: &str, page: &Page, progress: f64) -> ScanEvent {
    let mut ev = base_event(scan_id, ScanEventType::PageComplete, space_key);
    ev.page_id = Some(page.id.clone());
    ev.page_title = Some(page.title.clone());
    ev.progress = Some(progress);
    ev.status = Some(ScanStatus::Running);
    ev
}

/// Page- or attachment-scoped error.  Carries no status on purpose: the
/// space is still being scanned, so its checkpoint must stay Running.
pub fn page_error_event(
    scan_id: Uuid,
    space_key: &str,
    page_id: Option<String>,
    message: &str,
) -> ScanEvent {
    let mut ev = base_event(scan_id, ScanEventType::Error, space_key);
    ev.page_id = page_id;
    ev.error_message = Some(message.to_string());
    ev
}

/// Space-scoped error: the whole space is abandoned (its checkpoint goes
/// Failed); sibling spaces of a multi-space scan continue.
pub fn space_error_event(scan_id: Uuid, space_key: &str, message: &str) -> ScanEvent {
    let mut ev = base_event(scan_id, ScanEventType::Error, space_key);
    ev.error_message = Some(message.to_string());
    ev.status = Some(ScanStatus::Failed);
    ev
}

pub fn complete_event(scan_id: Uuid, space_key: &str) -> ScanEvent {
    let mut ev = base_event(scan_id, ScanEventType::Complete, space_key);
    ev.progress = Some(100.0);
    ev.status = Some(ScanStatus::Completed);
    ev
}

pub fn multi_start_event(scan_id: Uuid, spaces_total: u64) -> ScanEvent {
    let mut ev = base_event(scan_id, ScanEventType::MultiStart, MULTI_SPACE_KEY);
    ev.pages_total = Some(spaces_total);
    ev.status = Some(ScanStatus::Running);
    ev
}

pub fn multi_complete_event(scan_id: Uuid) -> ScanEvent {
    let mut ev = base_event(scan_id, ScanEventType::MultiComplete, MULTI_SPACE_KEY);
    ev.progress = Some(100.0);
    ev.status = Some(ScanStatus::Completed);
    ev
}
