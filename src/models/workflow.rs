use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of input handed to the orchestrator, used to select the tool sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputType {
    Text,
    File,
    Batch,
    Query,
}

impl InputType {
    /// Resolve an input-type label. Unknown labels fall back to `Text`
    /// (the ingestion sequence) with a logged warning.
    pub fn from_label(label: &str) -> Self {
        match label.to_lowercase().as_str() {
            "text" => InputType::Text,
            "file" => InputType::File,
            "batch" => InputType::Batch,
            "query" => InputType::Query,
            other => {
                tracing::warn!(
                    "Unknown input type '{}', falling back to text ingestion",
                    other
                );
                InputType::Text
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Routing,
    Executing,
    Completed,
    Failed,
}

/// Outcome of one executed tool within a workflow run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    pub tool: String,
    pub success: bool,
    pub timestamp: DateTime<Utc>,
    pub summary: String,
}

/// Ephemeral record of one orchestrator invocation. Finalized runs are
/// immutable and retained only in a bounded in-memory ring buffer for
/// diagnostics; this is not a system of record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowRun {
    pub id: String,
    pub input_type: InputType,
    pub status: RunStatus,
    /// Tool names actually executed, in order
    pub tool_sequence: Vec<String>,
    pub steps: Vec<StepRecord>,
    pub errors: Vec<String>,
    pub result: Option<serde_json::Value>,
    pub started_at: DateTime<Utc>,
    pub duration_ms: Option<u64>,
}

impl WorkflowRun {
    pub fn new(input_type: InputType) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            input_type,
            status: RunStatus::Routing,
            tool_sequence: Vec::new(),
            steps: Vec::new(),
            errors: Vec::new(),
            result: None,
            started_at: Utc::now(),
            duration_ms: None,
        }
    }
}
