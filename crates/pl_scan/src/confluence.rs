//! Confluence REST adapter for [`ContentSource`].
//!
//! Uses the cursor-less start/limit pagination of the classic REST API and
//! requests storage-format bodies, which are HTML.  Attachment text is only
//! fetched for media types we can treat as text; binaries yield None and
//! the pipeline skips them.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use pl_core::{Attachment, ContentKind, Page, Space};

use crate::source::{ContentSource, SourceError};

const PAGE_LIMIT: usize = 50;

/// Media types whose bytes are scanned as UTF-8 text.
const TEXT_MEDIA_PREFIXES: &[&str] = &["text/"];
const TEXT_MEDIA_TYPES: &[&str] = &[
    "application/json",
    "application/xml",
    "application/csv",
    "image/svg+xml",
];

pub struct ConfluenceClient {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl ConfluenceClient {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .user_agent("pagelock-scan/0.1")
            .build()
            .unwrap_or_default();
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            client,
            base_url,
            token: token.into(),
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, SourceError> {
        let url = format!("{}{}", self.base_url, path);
        let res = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .query(query)
            .send()
            .await
            .map_err(|e| SourceError::Unavailable(e.to_string()))?;
        if !res.status().is_success() {
            return Err(SourceError::Unavailable(format!(
                "{path} returned {}",
                res.status()
            )));
        }
        res.json::<T>()
            .await
            .map_err(|e| SourceError::InvalidResponse(e.to_string()))
    }

    /// Drain a start/limit-paginated listing.
    async fn paged<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        extra: &[(&str, String)],
    ) -> Result<Vec<T>, SourceError> {
        let mut out = Vec::new();
        let mut start = 0usize;
        loop {
            let mut query: Vec<(&str, String)> = extra.to_vec();
            query.push(("start", start.to_string()));
            query.push(("limit", PAGE_LIMIT.to_string()));
            let batch: PagedResponse<T> = self.get_json(path, &query).await?;
            let n = batch.results.len();
            out.extend(batch.results);
            if n < PAGE_LIMIT {
                return Ok(out);
            }
            start += n;
        }
    }

    fn page_url(&self, links: &ApiLinks) -> String {
        match &links.webui {
            Some(webui) => format!("{}{webui}", self.base_url),
            None => self.base_url.clone(),
        }
    }
}

fn is_text_media(media_type: &str) -> bool {
    let mt = media_type
        .split(';')
        .next()
        .unwrap_or(media_type)
        .trim()
        .to_ascii_lowercase();
    TEXT_MEDIA_PREFIXES.iter().any(|p| mt.starts_with(p))
        || TEXT_MEDIA_TYPES.contains(&mt.as_str())
}

#[derive(Deserialize)]
struct PagedResponse<T> {
    #[serde(default = "Vec::new")]
    results: Vec<T>,
}

#[derive(Deserialize)]
struct ApiSpace {
    key: String,
    name: String,
}

#[derive(Deserialize, Default)]
struct ApiLinks {
    webui: Option<String>,
    download: Option<String>,
}

#[derive(Deserialize)]
struct ApiPage {
    id: String,
    title: String,
    #[serde(default)]
    body: Option<ApiBody>,
    #[serde(rename = "_links", default)]
    links: ApiLinks,
}

#[derive(Deserialize, Default)]
struct ApiBody {
    storage: Option<ApiStorage>,
}

#[derive(Deserialize)]
struct ApiStorage {
    value: String,
}

#[derive(Deserialize)]
struct ApiAttachment {
    title: String,
    #[serde(default)]
    metadata: ApiAttachmentMetadata,
    #[serde(rename = "_links", default)]
    links: ApiLinks,
}

#[derive(Deserialize, Default)]
struct ApiAttachmentMetadata {
    #[serde(rename = "mediaType", default)]
    media_type: String,
}

#[async_trait]
impl ContentSource for ConfluenceClient {
    async fn all_spaces(&self) -> Result<Vec<Space>, SourceError> {
        let spaces: Vec<ApiSpace> = self.paged("/rest/api/space", &[]).await?;
        Ok(spaces
            .into_iter()
            .map(|s| Space {
                key: s.key,
                name: s.name,
            })
            .collect())
    }

    async fn space(&self, key: &str) -> Result<Option<Space>, SourceError> {
        let path = format!("/rest/api/space/{key}");
        match self.get_json::<ApiSpace>(&path, &[]).await {
            Ok(s) => Ok(Some(Space {
                key: s.key,
                name: s.name,
            })),
            // The REST API answers 404 for unknown keys; get_json folds
            // that into Unavailable with the status in the message.
            Err(SourceError::Unavailable(msg)) if msg.contains("404") => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn pages_in_space(&self, key: &str) -> Result<Vec<Page>, SourceError> {
        let pages: Vec<ApiPage> = self
            .paged(
                "/rest/api/content",
                &[
                    ("spaceKey", key.to_string()),
                    ("type", "page".to_string()),
                    ("expand", "body.storage".to_string()),
                ],
            )
            .await?;
        Ok(pages
            .into_iter()
            .map(|p| {
                let url = self.page_url(&p.links);
                let content = p
                    .body
                    .and_then(|b| b.storage)
                    .map(|s| s.value)
                    .unwrap_or_default();
                Page {
                    id: p.id,
                    title: p.title,
                    url,
                    content,
                    kind: ContentKind::Html,
                }
            })
            .collect())
    }

    async fn attachments(&self, page_id: &str) -> Result<Vec<Attachment>, SourceError> {
        let path = format!("/rest/api/content/{page_id}/child/attachment");
        let attachments: Vec<ApiAttachment> = self.paged(&path, &[]).await?;
        Ok(attachments
            .into_iter()
            .map(|a| {
                let download_url = a
                    .links
                    .download
                    .map(|d| format!("{}{d}", self.base_url))
                    .unwrap_or_default();
                Attachment {
                    name: a.title,
                    media_type: a.metadata.media_type,
                    download_url,
                }
            })
            .collect())
    }

    async fn attachment_text(
        &self,
        attachment: &Attachment,
    ) -> Result<Option<String>, SourceError> {
        if attachment.download_url.is_empty() || !is_text_media(&attachment.media_type) {
            debug!(
                attachment = %attachment.name,
                media_type = %attachment.media_type,
                "attachment has no extractable text"
            );
            return Ok(None);
        }
        let res = self
            .client
            .get(&attachment.download_url)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| SourceError::Unavailable(e.to_string()))?;
        if !res.status().is_success() {
            return Err(SourceError::Unavailable(format!(
                "attachment download returned {}",
                res.status()
            )));
        }
        let text = res
            .text()
            .await
            .map_err(|e| SourceError::InvalidResponse(e.to_string()))?;
        Ok(Some(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_media_detection() {
        assert!(is_text_media("text/plain"));
        assert!(is_text_media("text/csv; charset=utf-8"));
        assert!(is_text_media("application/json"));
        assert!(!is_text_media("application/pdf"));
        assert!(!is_text_media("image/png"));
    }

    #[test]
    fn base_url_is_normalised() {
        let c = ConfluenceClient::new("https://wiki.example.com///", "t");
        assert_eq!(c.base_url, "https://wiki.example.com");
    }
}
