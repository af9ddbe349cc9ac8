//! pl_core — Pagelock PII Audit domain model and pure scan logic
//!
//! Everything in this crate is side-effect free: no I/O, no async, no
//! storage.  The application layer (`pl_scan`) drives these types; the
//! persistence layer (`pl_store`) maps them to and from SQL rows.
//!
//! # Module layout
//! - `severity` — PII-type → severity tier classification + aggregation
//! - `entity`   — detected PII entities (position-tagged, typed, scored)
//! - `event`    — scan event records, status + event-type enums
//! - `context`  — masked / sensitive context extraction around a finding
//! - `factory`  — constructors for every scan-event variant
//! - `resume`   — resume planning from a checkpoint and a page list
//! - `content`  — content-source domain types (spaces, pages, attachments)

pub mod content;
pub mod context;
pub mod entity;
pub mod event;
pub mod factory;
pub mod resume;
pub mod severity;

pub use content::{Attachment, ContentKind, Page, Space};
pub use entity::DetectedEntity;
pub use factory::DetectedSpan;
pub use event::{ScanCheckpoint, ScanEvent, ScanEventType, ScanStatus};
pub use resume::{compute_remaining_pages, ResumePlan};
pub use severity::{Severity, SeverityCounts};
