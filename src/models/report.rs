use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::SourceSummary;

/// Result of one ingestion run. `chunks_created` and `chunks_embedded` may
/// differ when individual embedding items fail.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestionReport {
    pub chunks_created: usize,
    pub chunks_embedded: usize,
    pub errors: Vec<String>,
    pub workflow_id: String,
}

/// Final answer payload returned by the query entry point.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    pub answer: String,
    pub confidence: f32,
    pub sources: Vec<SourceSummary>,
    pub workflow_id: String,
    /// True when the answer was produced without retrieval (degraded mode)
    pub rag_disabled: bool,
}

/// Advisory embedding cost estimate; never enforced.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CostEstimate {
    pub estimated_tokens: usize,
    pub estimated_cost_usd: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HealthReport {
    pub components: BTreeMap<String, bool>,
}

impl HealthReport {
    pub fn healthy(&self) -> bool {
        !self.components.is_empty() && self.components.values().all(|&ok| ok)
    }
}
