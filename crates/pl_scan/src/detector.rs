//! Detection backend interface.
//!
//! The PII classifier itself (ML models, regex banks) is an external
//! service; the scan engine only sees spans.  Transient backend failures
//! are page-scoped: the pipeline converts them to an Error event and moves
//! on to the next page.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use pl_core::DetectedSpan;

#[derive(Debug, Error)]
pub enum DetectorError {
    #[error("Detection backend unavailable: {0}")]
    Unavailable(String),

    #[error("Detection backend returned an invalid response: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct DetectionRequest<'a> {
    pub page_id: &'a str,
    pub page_title: &'a str,
    pub space_key: &'a str,
    pub content: &'a str,
    /// Minimum confidence for a span to be reported.
    pub threshold: f64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DetectionResponse {
    pub entities: Vec<DetectedSpan>,
}

#[async_trait]
pub trait PiiDetector: Send + Sync {
    async fn detect(&self, req: DetectionRequest<'_>) -> Result<DetectionResponse, DetectorError>;
}

/// HTTP adapter for a remote detection service.
pub struct HttpDetector {
    client: reqwest::Client,
    base_url: String,
}

impl HttpDetector {
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .user_agent("pagelock-scan/0.1")
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl PiiDetector for HttpDetector {
    async fn detect(&self, req: DetectionRequest<'_>) -> Result<DetectionResponse, DetectorError> {
        let url = format!("{}/api/detect", self.base_url);
        let res = self
            .client
            .post(url)
            .json(&req)
            .send()
            .await
            .map_err(|e| DetectorError::Unavailable(e.to_string()))?;
        if !res.status().is_success() {
            return Err(DetectorError::Unavailable(format!(
                "detect failed with status {}",
                res.status()
            )));
        }
        res.json::<DetectionResponse>()
            .await
            .map_err(|e| DetectorError::InvalidResponse(e.to_string()))
    }
}
