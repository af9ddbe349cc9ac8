//! End-to-end pipeline scenarios against an in-memory store, with the
//! detector and content source faked at their trait seams.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use pl_core::{
    Attachment, ContentKind, DetectedSpan, Page, ScanEventType, ScanStatus, Space,
};
use pl_scan::{
    ContentSource, DetectionRequest, DetectionResponse, DetectorError, LoggingNotifier,
    PiiDetector, ScanService, SourceError,
};
use pl_store::{NewCheckpoint, Store, Vault};

// ── Fakes ────────────────────────────────────────────────────────────────────

#[derive(Default)]
struct FakeSource {
    spaces: Vec<Space>,
    pages: HashMap<String, Vec<Page>>,
    attachments: HashMap<String, Vec<Attachment>>,
    attachment_text: HashMap<String, String>,
}

#[async_trait]
impl ContentSource for FakeSource {
    async fn all_spaces(&self) -> Result<Vec<Space>, SourceError> {
        Ok(self.spaces.clone())
    }

    async fn space(&self, key: &str) -> Result<Option<Space>, SourceError> {
        Ok(self.spaces.iter().find(|s| s.key == key).cloned())
    }

    async fn pages_in_space(&self, key: &str) -> Result<Vec<Page>, SourceError> {
        Ok(self.pages.get(key).cloned().unwrap_or_default())
    }

    async fn attachments(&self, page_id: &str) -> Result<Vec<Attachment>, SourceError> {
        Ok(self.attachments.get(page_id).cloned().unwrap_or_default())
    }

    async fn attachment_text(
        &self,
        attachment: &Attachment,
    ) -> Result<Option<String>, SourceError> {
        Ok(self.attachment_text.get(&attachment.name).cloned())
    }
}

/// Detector keyed on content: fixed spans per exact content string, with
/// optional per-content failures and a configurable per-call delay.
#[derive(Default)]
struct FakeDetector {
    spans: HashMap<String, Vec<DetectedSpan>>,
    fail_on: HashSet<String>,
    delay: Option<Duration>,
}

#[async_trait]
impl PiiDetector for FakeDetector {
    async fn detect(&self, req: DetectionRequest<'_>) -> Result<DetectionResponse, DetectorError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_on.contains(req.content) {
            return Err(DetectorError::Unavailable("model backend down".into()));
        }
        Ok(DetectionResponse {
            entities: self.spans.get(req.content).cloned().unwrap_or_default(),
        })
    }
}

// ── Fixtures ─────────────────────────────────────────────────────────────────

const PAGE_1_CONTENT: &str = "contact bob@example.com today";
const PAGE_2_CONTENT: &str = "card 4111111111111111 on file";
const PAGE_3_CONTENT: &str = "nothing sensitive here";
const ATTACHMENT_TEXT: &str = "call 06 12 34 56 78";

fn page(id: &str, content: &str) -> Page {
    Page {
        id: id.to_string(),
        title: format!("Page {id}"),
        url: format!("https://wiki.example.com/{id}"),
        content: content.to_string(),
        kind: ContentKind::Plain,
    }
}

fn span(pii_type: &str, value: &str, start: usize, end: usize) -> DetectedSpan {
    DetectedSpan {
        pii_type: pii_type.to_string(),
        type_label: pii_type.to_string(),
        value: value.to_string(),
        start,
        end,
        confidence: 0.95,
    }
}

fn wiki_source() -> FakeSource {
    let mut source = FakeSource::default();
    source.spaces = vec![Space {
        key: "WIKI".to_string(),
        name: "Company wiki".to_string(),
    }];
    source.pages.insert(
        "WIKI".to_string(),
        vec![
            page("page-1", PAGE_1_CONTENT),
            page("page-2", PAGE_2_CONTENT),
            page("page-3", PAGE_3_CONTENT),
        ],
    );
    source
}

fn wiki_detector() -> FakeDetector {
    let mut detector = FakeDetector::default();
    detector.spans.insert(
        PAGE_1_CONTENT.to_string(),
        vec![span("EMAIL", "bob@example.com", 8, 23)],
    );
    detector.spans.insert(
        PAGE_2_CONTENT.to_string(),
        vec![span("CREDIT_CARD", "4111111111111111", 5, 21)],
    );
    detector.spans.insert(
        ATTACHMENT_TEXT.to_string(),
        vec![span("PHONE", "06 12 34 56 78", 5, 19)],
    );
    detector
}

async fn open_store() -> Store {
    let vault = Vault::new();
    vault.unlock_with_key([7u8; 32]).await.unwrap();
    Store::open_in_memory(vault).await.expect("open store")
}

fn make_service(store: &Store, detector: FakeDetector, source: FakeSource) -> ScanService {
    ScanService::new(
        store.clone(),
        Arc::new(detector),
        Arc::new(source),
        Arc::new(LoggingNotifier),
    )
}

async fn wait_done(service: &ScanService, scan_id: Uuid) {
    for _ in 0..200 {
        if !service.is_running(scan_id).await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("scan {scan_id} did not finish in time");
}

// ── Scenarios ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn fresh_scan_emits_the_full_event_sequence() {
    let store = open_store().await;
    let service = make_service(&store, wiki_detector(), wiki_source());

    let scan_id = service.stream_space("WIKI", false).await.unwrap();
    wait_done(&service, scan_id).await;

    let events = store.events().list(scan_id).await.unwrap();
    let types: Vec<ScanEventType> = events.iter().map(|e| e.event.event_type).collect();
    assert_eq!(
        types,
        vec![
            ScanEventType::Start,
            ScanEventType::PageStart,
            ScanEventType::Item,
            ScanEventType::PageComplete,
            ScanEventType::PageStart,
            ScanEventType::Item,
            ScanEventType::PageComplete,
            ScanEventType::PageStart,
            ScanEventType::Item,
            ScanEventType::PageComplete,
            ScanEventType::Complete,
        ]
    );

    // Sequences are gapless and monotonic.
    let seqs: Vec<i64> = events.iter().map(|e| e.seq).collect();
    assert_eq!(seqs, (1..=11).collect::<Vec<i64>>());

    let cp = store
        .checkpoints()
        .find(scan_id, "WIKI")
        .await
        .unwrap()
        .expect("checkpoint exists");
    assert_eq!(cp.status, ScanStatus::Completed);
    assert_eq!(cp.progress, Some(100.0));
    assert_eq!(cp.last_page_id.as_deref(), Some("page-3"));

    let counts = store
        .severity_counts()
        .find(scan_id, "WIKI")
        .await
        .unwrap()
        .expect("counts exist");
    assert_eq!(counts.high, 1); // credit card
    assert_eq!(counts.medium, 1); // email
    assert_eq!(counts.low, 0);
}

#[tokio::test]
async fn resume_processes_only_the_remaining_pages() {
    let store = open_store().await;
    let scan_id = Uuid::new_v4();

    // A previous run got through page-2 and was interrupted.
    store
        .checkpoints()
        .upsert(&NewCheckpoint {
            scan_id,
            space_key: "WIKI".to_string(),
            last_page_id: Some("page-2".to_string()),
            last_attachment_name: None,
            status: ScanStatus::Running,
            progress: Some(66.7),
        })
        .await
        .unwrap();

    let service = make_service(&store, wiki_detector(), wiki_source());
    let resumed = service.resume_all_spaces(None).await.unwrap();
    assert_eq!(resumed, scan_id);
    wait_done(&service, scan_id).await;

    let events = store.events().list(scan_id).await.unwrap();
    let scanned: Vec<&str> = events
        .iter()
        .filter(|e| e.event.event_type == ScanEventType::Item)
        .filter_map(|e| e.event.page_id.as_deref())
        .collect();
    assert_eq!(scanned, vec!["page-3"]);

    // The re-emitted Start carries the original total and offset progress.
    let start = events
        .iter()
        .find(|e| e.event.event_type == ScanEventType::Start)
        .expect("start event");
    assert_eq!(start.event.pages_total, Some(3));
    let progress = start.event.progress.expect("progress");
    assert!((progress - 66.666).abs() < 0.1);

    let cp = store
        .checkpoints()
        .find(scan_id, "WIKI")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(cp.status, ScanStatus::Completed);
}

#[tokio::test]
async fn in_flight_attachment_restarts_its_page_on_resume() {
    let store = open_store().await;
    let scan_id = Uuid::new_v4();
    store
        .checkpoints()
        .upsert(&NewCheckpoint {
            scan_id,
            space_key: "WIKI".to_string(),
            last_page_id: Some("page-2".to_string()),
            last_attachment_name: Some("export.xlsx".to_string()),
            status: ScanStatus::Running,
            progress: Some(40.0),
        })
        .await
        .unwrap();

    let service = make_service(&store, wiki_detector(), wiki_source());
    let resumed = service.resume_all_spaces(Some(scan_id)).await.unwrap();
    wait_done(&service, resumed).await;

    let events = store.events().list(scan_id).await.unwrap();
    let scanned: Vec<&str> = events
        .iter()
        .filter(|e| e.event.event_type == ScanEventType::Item)
        .filter_map(|e| e.event.page_id.as_deref())
        .collect();
    assert_eq!(scanned, vec!["page-2", "page-3"]);
}

#[tokio::test]
async fn detector_failure_is_page_scoped() {
    let store = open_store().await;
    let mut detector = wiki_detector();
    detector.fail_on.insert(PAGE_2_CONTENT.to_string());
    let service = make_service(&store, detector, wiki_source());

    let scan_id = service.stream_space("WIKI", false).await.unwrap();
    wait_done(&service, scan_id).await;

    let events = store.events().list(scan_id).await.unwrap();
    let error = events
        .iter()
        .find(|e| e.event.event_type == ScanEventType::Error)
        .expect("error event for the failing page");
    assert_eq!(error.event.page_id.as_deref(), Some("page-2"));
    assert!(error.event.error_message.is_some());

    // The other pages still scanned and the space still completed.
    let scanned: Vec<&str> = events
        .iter()
        .filter(|e| e.event.event_type == ScanEventType::Item)
        .filter_map(|e| e.event.page_id.as_deref())
        .collect();
    assert_eq!(scanned, vec!["page-1", "page-3"]);

    let cp = store
        .checkpoints()
        .find(scan_id, "WIKI")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(cp.status, ScanStatus::Completed);
}

#[tokio::test]
async fn attachments_are_scanned_and_their_marker_cleared() {
    let store = open_store().await;
    let mut source = wiki_source();
    source.attachments.insert(
        "page-1".to_string(),
        vec![
            Attachment {
                name: "notes.txt".to_string(),
                media_type: "text/plain".to_string(),
                download_url: "https://wiki.example.com/dl/notes.txt".to_string(),
            },
            Attachment {
                name: "scan.pdf".to_string(),
                media_type: "application/pdf".to_string(),
                download_url: "https://wiki.example.com/dl/scan.pdf".to_string(),
            },
        ],
    );
    source
        .attachment_text
        .insert("notes.txt".to_string(), ATTACHMENT_TEXT.to_string());
    // scan.pdf has no extractable text on purpose.

    let service = make_service(&store, wiki_detector(), source);
    let scan_id = service.stream_space("WIKI", false).await.unwrap();
    wait_done(&service, scan_id).await;

    let events = store.events().list(scan_id).await.unwrap();
    let attachment_items: Vec<&str> = events
        .iter()
        .filter(|e| e.event.event_type == ScanEventType::AttachmentItem)
        .filter_map(|e| e.event.attachment_name.as_deref())
        .collect();
    assert_eq!(attachment_items, vec!["notes.txt"]);

    let item = events
        .iter()
        .find(|e| e.event.event_type == ScanEventType::AttachmentItem)
        .unwrap();
    assert_eq!(item.event.entities.len(), 1);
    assert_eq!(item.event.entities[0].pii_type, "PHONE");

    // PageComplete cleared the in-flight marker.
    let cp = store
        .checkpoints()
        .find(scan_id, "WIKI")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(cp.last_attachment_name, None);
    assert_eq!(cp.status, ScanStatus::Completed);
}

#[tokio::test]
async fn multi_space_scan_survives_a_failing_space() {
    let store = open_store().await;
    let mut source = wiki_source();
    source.spaces = vec![
        Space {
            key: "WIKI".to_string(),
            name: "Company wiki".to_string(),
        },
        Space {
            key: "HR".to_string(),
            name: "People".to_string(),
        },
    ];
    // HR has no page map entry: listing yields an empty space, which is a
    // legitimate complete-at-100% scan, so instead make its listing fail by
    // scanning through a source wrapper.
    struct FailingSpace<S>(S, String);

    #[async_trait]
    impl<S: ContentSource> ContentSource for FailingSpace<S> {
        async fn all_spaces(&self) -> Result<Vec<Space>, SourceError> {
            self.0.all_spaces().await
        }
        async fn space(&self, key: &str) -> Result<Option<Space>, SourceError> {
            self.0.space(key).await
        }
        async fn pages_in_space(&self, key: &str) -> Result<Vec<Page>, SourceError> {
            if key == self.1 {
                return Err(SourceError::Unavailable("space is gone".into()));
            }
            self.0.pages_in_space(key).await
        }
        async fn attachments(&self, page_id: &str) -> Result<Vec<Attachment>, SourceError> {
            self.0.attachments(page_id).await
        }
        async fn attachment_text(
            &self,
            attachment: &Attachment,
        ) -> Result<Option<String>, SourceError> {
            self.0.attachment_text(attachment).await
        }
    }

    let service = ScanService::new(
        store.clone(),
        Arc::new(wiki_detector()),
        Arc::new(FailingSpace(source, "HR".to_string())),
        Arc::new(LoggingNotifier),
    );

    let scan_id = service.stream_all_spaces().await.unwrap();
    wait_done(&service, scan_id).await;

    let events = store.events().list(scan_id).await.unwrap();
    assert!(events
        .iter()
        .any(|e| e.event.event_type == ScanEventType::MultiStart));
    assert!(events
        .iter()
        .any(|e| e.event.event_type == ScanEventType::MultiComplete));

    // WIKI completed despite HR failing.
    let wiki = store.checkpoints().find(scan_id, "WIKI").await.unwrap().unwrap();
    assert_eq!(wiki.status, ScanStatus::Completed);
    let hr = store.checkpoints().find(scan_id, "HR").await.unwrap().unwrap();
    assert_eq!(hr.status, ScanStatus::Failed);
}

#[tokio::test]
async fn full_scan_purges_a_leftover_active_scan() {
    let store = open_store().await;
    let old = Uuid::new_v4();
    store
        .checkpoints()
        .upsert(&NewCheckpoint {
            scan_id: old,
            space_key: "WIKI".to_string(),
            last_page_id: Some("page-1".to_string()),
            last_attachment_name: None,
            status: ScanStatus::Paused,
            progress: Some(33.0),
        })
        .await
        .unwrap();

    // Starting a full scan is an explicit restart: no force flag needed.
    let service = make_service(&store, wiki_detector(), wiki_source());
    let fresh = service.stream_all_spaces().await.unwrap();
    assert_ne!(fresh, old);
    wait_done(&service, fresh).await;

    assert!(store.checkpoints().find(old, "WIKI").await.unwrap().is_none());
    let cp = store
        .checkpoints()
        .find(fresh, "WIKI")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(cp.status, ScanStatus::Completed);
}

#[tokio::test]
async fn multi_space_resume_brackets_the_stream_with_markers() {
    let store = open_store().await;
    let scan_id = Uuid::new_v4();
    for space in ["WIKI", "HR"] {
        store
            .checkpoints()
            .upsert(&NewCheckpoint {
                scan_id,
                space_key: space.to_string(),
                last_page_id: None,
                last_attachment_name: None,
                status: ScanStatus::Paused,
                progress: None,
            })
            .await
            .unwrap();
    }

    let mut source = wiki_source();
    source.spaces.push(Space {
        key: "HR".to_string(),
        name: "People".to_string(),
    });
    let service = make_service(&store, wiki_detector(), source);
    service.resume_all_spaces(Some(scan_id)).await.unwrap();
    wait_done(&service, scan_id).await;

    let events = store.events().list(scan_id).await.unwrap();
    let first = events.first().expect("events recorded");
    assert_eq!(first.event.event_type, ScanEventType::MultiStart);
    assert_eq!(first.event.pages_total, Some(2));
    assert_eq!(
        events.last().map(|e| e.event.event_type),
        Some(ScanEventType::MultiComplete)
    );
    let multi_starts = events
        .iter()
        .filter(|e| e.event.event_type == ScanEventType::MultiStart)
        .count();
    assert_eq!(multi_starts, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn pause_aborts_the_producer_and_marks_checkpoints() {
    let store = open_store().await;
    let mut detector = wiki_detector();
    detector.delay = Some(Duration::from_millis(100));
    let service = make_service(&store, detector, wiki_source());

    let scan_id = service.stream_space("WIKI", false).await.unwrap();
    // Let the Start event land, then pause mid-page.
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(service.pause_scan(scan_id).await.unwrap());
    assert!(
        !service.pause_scan(scan_id).await.unwrap(),
        "pausing twice is a no-op"
    );
    assert!(!service.is_running(scan_id).await);

    let cp = store
        .checkpoints()
        .find(scan_id, "WIKI")
        .await
        .unwrap()
        .expect("checkpoint written before pause");
    assert_eq!(cp.status, ScanStatus::Paused);

    // A paused scan blocks a fresh start without force...
    let err = service.stream_space("WIKI", false).await.unwrap_err();
    assert!(matches!(err, pl_scan::ScanError::ScanAlreadyActive(id) if id == scan_id));

    // ...and force purges it and starts clean.
    let fresh = service.stream_space("WIKI", true).await.unwrap();
    assert_ne!(fresh, scan_id);
    wait_done(&service, fresh).await;
    assert!(store
        .checkpoints()
        .find(scan_id, "WIKI")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn late_subscriber_replays_a_finished_scan() {
    let store = open_store().await;
    let service = make_service(&store, wiki_detector(), wiki_source());

    let scan_id = service.stream_space("WIKI", false).await.unwrap();
    wait_done(&service, scan_id).await;

    let sub = service.subscribe(scan_id).await.expect("task still buffered");
    assert_eq!(sub.replay.first().map(|e| e.event_type), Some(ScanEventType::Start));
    assert_eq!(
        sub.replay.last().map(|e| e.event_type),
        Some(ScanEventType::Complete)
    );
    assert!(service.subscribe(Uuid::new_v4()).await.is_none());
}

#[tokio::test]
async fn unknown_space_yields_a_single_error_event() {
    let store = open_store().await;
    let service = make_service(&store, wiki_detector(), wiki_source());

    let scan_id = service.stream_space("NOPE", false).await.unwrap();
    wait_done(&service, scan_id).await;

    let events = store.events().list(scan_id).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event.event_type, ScanEventType::Error);
    assert_eq!(events[0].event.space_key, "NOPE");

    let cp = store
        .checkpoints()
        .find(scan_id, "NOPE")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(cp.status, ScanStatus::Failed);
}

#[tokio::test]
async fn resume_with_nothing_pending_is_an_error() {
    let store = open_store().await;
    let service = make_service(&store, wiki_detector(), wiki_source());
    let err = service.resume_all_spaces(None).await.unwrap_err();
    assert!(matches!(err, pl_scan::ScanError::NothingToResume));
}
