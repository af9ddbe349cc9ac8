//! Content-source interface.
//!
//! HTTP access, pagination, and HTML handling live behind this trait; the
//! scan engine consumes plain lists.  Failures are space-scoped: a
//! multi-space scan reports an Error event for the failing space and
//! continues with its siblings.

use async_trait::async_trait;
use thiserror::Error;

use pl_core::{Attachment, Page, Space};

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Content source unavailable: {0}")]
    Unavailable(String),

    #[error("Content source returned an invalid response: {0}")]
    InvalidResponse(String),
}

#[async_trait]
pub trait ContentSource: Send + Sync {
    async fn all_spaces(&self) -> Result<Vec<Space>, SourceError>;

    /// None when the key does not name a space.
    async fn space(&self, key: &str) -> Result<Option<Space>, SourceError>;

    /// Every page of a space, in the source's listing order.
    async fn pages_in_space(&self, key: &str) -> Result<Vec<Page>, SourceError>;

    async fn attachments(&self, page_id: &str) -> Result<Vec<Attachment>, SourceError>;

    /// Extracted text of an attachment; None for binary formats the source
    /// cannot extract text from.
    async fn attachment_text(
        &self,
        attachment: &Attachment,
    ) -> Result<Option<String>, SourceError>;
}
