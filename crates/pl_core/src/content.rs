//! Content-source domain types (spaces, pages, attachments).
//!
//! These mirror what the repository client returns; the client itself
//! (HTTP, pagination, auth) lives in `pl_scan`.

use serde::{Deserialize, Serialize};

/// How the source content is structured — drives line-boundary detection
/// during context extraction.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    Html,
    Plain,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Space {
    pub key: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Page {
    pub id: String,
    pub title: String,
    pub url: String,
    /// Full page body (storage format for wikis, so usually HTML).
    pub content: String,
    pub kind: ContentKind,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Attachment {
    pub name: String,
    pub media_type: String,
    pub download_url: String,
}
