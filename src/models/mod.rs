pub mod answer;
pub mod chunk;
pub mod report;
pub mod workflow;

pub use answer::{GeneratedAnswer, SourceSummary};
pub use chunk::{Chunk, ChunkMetadata, RetrievalResult, SourceType};
pub use report::{CostEstimate, HealthReport, IngestionReport, QueryResponse};
pub use workflow::{InputType, RunStatus, StepRecord, WorkflowRun};
