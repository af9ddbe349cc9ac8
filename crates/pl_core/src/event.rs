//! Scan event records and scan lifecycle enums.
//!
//! Events are constructed by [`crate::factory`], immutable thereafter, and
//! persisted append-only.  Within one (scan, space) they are emitted in
//! causal order: Start before any PageStart, a page's Item before its
//! PageComplete, Complete last.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entity::DetectedEntity;
use crate::severity::Severity;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ScanEventType {
    Start,
    PageStart,
    Item,
    AttachmentItem,
    PageComplete,
    Error,
    Complete,
    MultiStart,
    MultiComplete,
}

impl ScanEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanEventType::Start => "start",
            ScanEventType::PageStart => "page_start",
            ScanEventType::Item => "item",
            ScanEventType::AttachmentItem => "attachment_item",
            ScanEventType::PageComplete => "page_complete",
            ScanEventType::Error => "error",
            ScanEventType::Complete => "complete",
            ScanEventType::MultiStart => "multi_start",
            ScanEventType::MultiComplete => "multi_complete",
        }
    }

    pub fn parse(s: &str) -> Option<ScanEventType> {
        Some(match s {
            "start" => ScanEventType::Start,
            "page_start" => ScanEventType::PageStart,
            "item" => ScanEventType::Item,
            "attachment_item" => ScanEventType::AttachmentItem,
            "page_complete" => ScanEventType::PageComplete,
            "error" => ScanEventType::Error,
            "complete" => ScanEventType::Complete,
            "multi_start" => ScanEventType::MultiStart,
            "multi_complete" => ScanEventType::MultiComplete,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ScanStatus {
    Running,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

impl ScanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanStatus::Running => "running",
            ScanStatus::Paused => "paused",
            ScanStatus::Completed => "completed",
            ScanStatus::Failed => "failed",
            ScanStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<ScanStatus> {
        Some(match s {
            "running" => ScanStatus::Running,
            "paused" => ScanStatus::Paused,
            "completed" => ScanStatus::Completed,
            "failed" => ScanStatus::Failed,
            "cancelled" => ScanStatus::Cancelled,
            _ => return None,
        })
    }

    /// Completed and Failed are terminal: no further checkpoint writes are
    /// accepted without an explicit new scan.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ScanStatus::Completed | ScanStatus::Failed)
    }

    /// An active scan is one that may still produce events.
    pub fn is_active(&self) -> bool {
        matches!(self, ScanStatus::Running | ScanStatus::Paused)
    }

    /// Whether a checkpoint currently in `self` may be overwritten with
    /// `next`.  Terminal states reject everything; late or duplicate writes
    /// against them are skipped by the checkpoint store, not errors.
    pub fn allows_transition_to(&self, _next: ScanStatus) -> bool {
        !self.is_terminal()
    }

    /// Cancelled scans are shown as paused in read models — the distinction
    /// only matters to the resume logic.
    pub fn display(&self) -> ScanStatus {
        match self {
            ScanStatus::Cancelled => ScanStatus::Paused,
            other => *other,
        }
    }
}

/// One record in a scan's event stream.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScanEvent {
    pub scan_id: Uuid,
    pub event_type: ScanEventType,
    pub space_key: String,
    pub page_id: Option<String>,
    pub page_title: Option<String>,
    pub page_url: Option<String>,
    pub attachment_name: Option<String>,
    pub attachment_media_type: Option<String>,
    pub entities: Vec<DetectedEntity>,
    /// Highest severity among `entities`; absent when there are none.
    pub severity: Option<Severity>,
    /// Progress through the space, `0.0..=100.0`.
    pub progress: Option<f64>,
    /// Total pages in the space — carried by Start events.
    pub pages_total: Option<u64>,
    pub status: Option<ScanStatus>,
    pub error_message: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

impl ScanEvent {
    /// Item and AttachmentItem events are final for their page/attachment:
    /// they advance the checkpoint cursor.
    pub fn advances_cursor(&self) -> bool {
        matches!(
            self.event_type,
            ScanEventType::Item | ScanEventType::AttachmentItem
        )
    }
}

/// Durable cursor for one (scan, space) pair.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScanCheckpoint {
    pub scan_id: Uuid,
    pub space_key: String,
    pub last_page_id: Option<String>,
    pub last_attachment_name: Option<String>,
    pub status: ScanStatus,
    pub progress: Option<f64>,
    pub updated_at: DateTime<Utc>,
    pub version: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_strings() {
        for status in [
            ScanStatus::Running,
            ScanStatus::Paused,
            ScanStatus::Completed,
            ScanStatus::Failed,
            ScanStatus::Cancelled,
        ] {
            assert_eq!(ScanStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(ScanStatus::parse("bogus"), None);
    }

    #[test]
    fn terminal_states_reject_transitions() {
        assert!(!ScanStatus::Completed.allows_transition_to(ScanStatus::Running));
        assert!(!ScanStatus::Failed.allows_transition_to(ScanStatus::Running));
        assert!(ScanStatus::Running.allows_transition_to(ScanStatus::Completed));
        assert!(ScanStatus::Paused.allows_transition_to(ScanStatus::Running));
    }

    #[test]
    fn cancelled_displays_as_paused() {
        assert_eq!(ScanStatus::Cancelled.display(), ScanStatus::Paused);
        assert_eq!(ScanStatus::Running.display(), ScanStatus::Running);
    }

    #[test]
    fn enums_serialise_as_snake_case() {
        assert_eq!(
            serde_json::to_string(&ScanEventType::AttachmentItem).unwrap(),
            "\"attachment_item\""
        );
        assert_eq!(
            serde_json::to_string(&ScanStatus::Running).unwrap(),
            "\"running\""
        );
    }
}
