//! Detected PII entities.

use serde::{Deserialize, Serialize};

/// One PII finding inside a page or attachment.
///
/// `sensitive_value` and `sensitive_context` carry raw PII and are encrypted
/// at rest by the store; `masked_context` has every intersecting entity
/// replaced by its `[TYPE]` token and is safe to store in clear.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DetectedEntity {
    /// Half-open `[start, end)` offsets into the source content, clamped
    /// to the source length.
    pub start: usize,
    pub end: usize,
    /// Machine type identifier, e.g. `CREDIT_CARD`.
    pub pii_type: String,
    /// Display label used for mask tokens, e.g. `CARD NUMBER`.
    pub type_label: String,
    /// Detector confidence in `0.0..=1.0`.
    pub confidence: f64,
    /// The matched text itself — raw PII.
    pub sensitive_value: String,
    /// The enclosing line, verbatim — raw PII.
    pub sensitive_context: String,
    /// The enclosing line with all PII spans replaced by `[TYPE]` tokens.
    pub masked_context: String,
}

impl DetectedEntity {
    /// Mask token for this entity, e.g. `[CARD NUMBER]`.
    pub fn mask_token(&self) -> String {
        format!("[{}]", self.type_label.trim().to_uppercase())
    }

    /// Whether context extraction already ran for this entity.
    pub fn has_context(&self) -> bool {
        !self.masked_context.trim().is_empty() && !self.sensitive_context.trim().is_empty()
    }
}
