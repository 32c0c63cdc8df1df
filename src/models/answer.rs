use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Compact reference to a context chunk that backed a generated answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceSummary {
    pub chunk_id: String,
    pub similarity: f32,
    /// Short content preview, not the full chunk text
    pub preview: String,
}

/// A grounded answer synthesized from retrieved context. Owned transiently
/// by the caller; never persisted by this subsystem.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedAnswer {
    pub text: String,
    /// Confidence in [0, 1]; exactly 0 with no context chunks
    pub confidence: f32,
    pub sources: Vec<SourceSummary>,
    pub model: String,
    pub generated_at: DateTime<Utc>,
}
