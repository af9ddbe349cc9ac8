//! Resume planning: which pages remain for a space, given its checkpoint.
//!
//! Pure and deterministic — the same inputs always yield the same plan.
//! The analyzed offset mirrors the index math so progress percentages stay
//! continuous across a resume (no visible regression or jump).

use crate::content::Page;
use crate::event::{ScanCheckpoint, ScanStatus};

/// Derived resume state for one space.  Never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct ResumePlan {
    /// Page count of the full space listing the plan was computed from.
    pub original_total: u64,
    /// Pages already credited as analyzed — feeds progress reporting.
    pub analyzed_offset: u64,
    /// Pages still to scan, in listing order.
    pub remaining: Vec<Page>,
}

impl ResumePlan {
    fn all_of(pages: &[Page]) -> ResumePlan {
        ResumePlan {
            original_total: pages.len() as u64,
            analyzed_offset: 0,
            remaining: pages.to_vec(),
        }
    }

    fn none_of(pages: &[Page]) -> ResumePlan {
        ResumePlan {
            original_total: pages.len() as u64,
            analyzed_offset: pages.len() as u64,
            remaining: Vec::new(),
        }
    }

    pub fn is_done(&self) -> bool {
        self.remaining.is_empty()
    }
}

/// Compute the pages still to scan for a space.
///
/// - no checkpoint → everything remains;
/// - checkpoint Completed → nothing remains;
/// - blank last page id → everything remains (the scan had not advanced
///   past page granularity yet);
/// - last page id absent from the listing → everything remains (the page
///   list changed underneath us; re-scanning is the conservative choice);
/// - an attachment was mid-processing → that same page is re-included so
///   its attachment loop restarts; otherwise resume at the following page.
pub fn compute_remaining_pages(pages: &[Page], checkpoint: Option<&ScanCheckpoint>) -> ResumePlan {
    if pages.is_empty() {
        return ResumePlan {
            original_total: 0,
            analyzed_offset: 0,
            remaining: Vec::new(),
        };
    }

    let checkpoint = match checkpoint {
        Some(cp) => cp,
        None => return ResumePlan::all_of(pages),
    };

    if checkpoint.status == ScanStatus::Completed {
        return ResumePlan::none_of(pages);
    }

    let last_page_id = match checkpoint.last_page_id.as_deref() {
        Some(id) if !id.trim().is_empty() => id,
        _ => return ResumePlan::all_of(pages),
    };

    let index = match pages.iter().position(|p| p.id == last_page_id) {
        Some(i) => i,
        None => return ResumePlan::all_of(pages),
    };

    let attachment_in_flight = checkpoint
        .last_attachment_name
        .as_deref()
        .map(|name| !name.trim().is_empty())
        .unwrap_or(false);

    let resume_at = if attachment_in_flight { index } else { index + 1 };

    ResumePlan {
        original_total: pages.len() as u64,
        analyzed_offset: resume_at as u64,
        remaining: pages[resume_at..].to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::ContentKind;
    use chrono::Utc;
    use uuid::Uuid;

    fn pages(ids: &[&str]) -> Vec<Page> {
        ids.iter()
            .map(|id| Page {
                id: id.to_string(),
                title: format!("Page {id}"),
                url: format!("https://wiki.example.com/{id}"),
                content: String::new(),
                kind: ContentKind::Html,
            })
            .collect()
    }

    fn checkpoint(
        last_page_id: Option<&str>,
        last_attachment: Option<&str>,
        status: ScanStatus,
    ) -> ScanCheckpoint {
        ScanCheckpoint {
            scan_id: Uuid::new_v4(),
            space_key: "WIKI".to_string(),
            last_page_id: last_page_id.map(str::to_string),
            last_attachment_name: last_attachment.map(str::to_string),
            status,
            progress: None,
            updated_at: Utc::now(),
            version: 1,
        }
    }

    #[test]
    fn no_checkpoint_means_everything_remains() {
        let all = pages(&["page-1", "page-2", "page-3"]);
        let plan = compute_remaining_pages(&all, None);
        assert_eq!(plan.analyzed_offset, 0);
        assert_eq!(plan.remaining.len(), 3);
        assert_eq!(plan.original_total, 3);
    }

    #[test]
    fn completed_checkpoint_means_nothing_remains() {
        let all = pages(&["page-1", "page-2"]);
        let cp = checkpoint(Some("page-1"), None, ScanStatus::Completed);
        let plan = compute_remaining_pages(&all, Some(&cp));
        assert!(plan.is_done());
        assert_eq!(plan.analyzed_offset, 2);
    }

    #[test]
    fn blank_page_id_means_everything_remains() {
        let all = pages(&["page-1", "page-2"]);
        let cp = checkpoint(Some("  "), None, ScanStatus::Running);
        let plan = compute_remaining_pages(&all, Some(&cp));
        assert_eq!(plan.remaining.len(), 2);
        let cp = checkpoint(None, None, ScanStatus::Running);
        let plan = compute_remaining_pages(&all, Some(&cp));
        assert_eq!(plan.remaining.len(), 2);
    }

    #[test]
    fn resume_starts_after_the_last_processed_page() {
        let all = pages(&["page-1", "page-2", "page-3"]);
        let cp = checkpoint(Some("page-2"), None, ScanStatus::Running);
        let plan = compute_remaining_pages(&all, Some(&cp));
        assert_eq!(plan.analyzed_offset, 2);
        assert_eq!(plan.remaining.len(), 1);
        assert_eq!(plan.remaining[0].id, "page-3");
    }

    #[test]
    fn in_flight_attachment_re_includes_its_page() {
        let all = pages(&["page-1", "page-2", "page-3"]);
        let cp = checkpoint(Some("page-2"), Some("export.xlsx"), ScanStatus::Running);
        let plan = compute_remaining_pages(&all, Some(&cp));
        assert_eq!(plan.analyzed_offset, 1);
        assert_eq!(plan.remaining[0].id, "page-2");
    }

    #[test]
    fn unknown_page_id_falls_back_to_full_rescan() {
        let all = pages(&["page-1", "page-2"]);
        let cp = checkpoint(Some("deleted-page"), None, ScanStatus::Running);
        let plan = compute_remaining_pages(&all, Some(&cp));
        assert_eq!(plan.analyzed_offset, 0);
        assert_eq!(plan.remaining.len(), 2);
    }

    #[test]
    fn empty_page_list_yields_empty_plan() {
        let cp = checkpoint(Some("page-1"), None, ScanStatus::Running);
        let plan = compute_remaining_pages(&[], Some(&cp));
        assert!(plan.is_done());
        assert_eq!(plan.original_total, 0);
    }

    #[test]
    fn planner_is_deterministic() {
        let all = pages(&["page-1", "page-2", "page-3"]);
        let cp = checkpoint(Some("page-1"), None, ScanStatus::Running);
        let a = compute_remaining_pages(&all, Some(&cp));
        let b = compute_remaining_pages(&all, Some(&cp));
        assert_eq!(a, b);
    }
}
