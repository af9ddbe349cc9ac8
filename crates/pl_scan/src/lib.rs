//! Scan engine: orchestration, detached execution, resume, and reporting.
//!
//! Layers, bottom up:
//! - [`detector`] / [`source`] — the two external-service seams;
//! - [`orchestrator`] — per-event side-effect sequencing against the store;
//! - [`task_manager`] — detached producers with replay-capable streams;
//! - [`service`] — the use cases (start, resume, pause, purge, subscribe);
//! - [`reporting`] — read-side rollups.

pub mod confluence;
pub mod detector;
pub mod error;
pub mod interrupt;
pub mod orchestrator;
pub mod reporting;
pub mod service;
pub mod source;
pub mod task_manager;

pub use confluence::ConfluenceClient;
pub use detector::{DetectionRequest, DetectionResponse, DetectorError, HttpDetector, PiiDetector};
pub use error::ScanError;
pub use interrupt::is_benign_interrupt;
pub use orchestrator::{LoggingNotifier, ScanOrchestrator, SpaceCompletionNotifier};
pub use reporting::{ScanReporter, ScanSummary, SpaceScanState};
pub use service::{ScanService, DEFAULT_CONFIDENCE_THRESHOLD};
pub use source::{ContentSource, SourceError};
pub use task_manager::{spawn_sweeper, ScanTaskManager, Subscription, DEFAULT_TASK_TTL};
