use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("Store error: {0}")]
    Store(#[from] pl_store::StoreError),

    #[error("Detection backend error: {0}")]
    Detector(String),

    #[error("Content source error: {0}")]
    Source(String),

    #[error("Scan not found: {0}")]
    ScanNotFound(Uuid),

    #[error("A scan is already active: {0} — pause it or pass force to restart")]
    ScanAlreadyActive(Uuid),

    #[error("No unfinished scan to resume")]
    NothingToResume,
}
