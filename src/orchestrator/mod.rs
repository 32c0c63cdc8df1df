use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::chunking::{self, ChunkStrategy};
use crate::config::RagConfig;
use crate::embeddings::EmbeddingClient;
use crate::error::{RagError, RagResult};
use crate::generation::{Generator, Persona};
use crate::models::{
    Chunk, ChunkMetadata, GeneratedAnswer, IngestionReport, InputType, RetrievalResult, RunStatus,
    StepRecord, WorkflowRun,
};
use crate::retrieval::vector::{MetadataFilter, VectorRecord, VectorStore};
use crate::retrieval::Retriever;

const TOOL_CHUNKER: &str = "chunker";
const TOOL_EMBEDDER: &str = "embedder";
const TOOL_INDEXER: &str = "indexer";
const TOOL_RETRIEVER: &str = "retriever";
const TOOL_GENERATOR: &str = "generator";

/// How many finished runs and activity entries are retained for diagnostics
const RETAINED_RUNS: usize = 1000;
const RETAINED_ACTIVITY: usize = 1000;

/// One document queued for ingestion.
#[derive(Debug, Clone)]
pub struct IngestDocument {
    pub content: String,
    pub metadata: ChunkMetadata,
}

/// Input handed to the orchestrator for one workflow run.
pub enum WorkflowInput {
    Ingest {
        input_type: InputType,
        documents: Vec<IngestDocument>,
        strategy: ChunkStrategy,
    },
    Query {
        text: String,
        filter: MetadataFilter,
        top_k: usize,
        similarity_threshold: f32,
        persona: Arc<dyn Persona>,
    },
}

/// Terminal payload of a successful workflow.
pub enum WorkflowOutcome {
    Ingestion(IngestionReport),
    Answer {
        query: String,
        answer: GeneratedAnswer,
    },
}

/// Result of one orchestrator invocation: the finalized run record, the
/// outcome if one was produced, and the terminal error of a failed run.
pub struct WorkflowReport {
    pub run: WorkflowRun,
    pub outcome: Option<WorkflowOutcome>,
    pub failure: Option<RagError>,
}

/// Result of a degraded-mode run.
pub struct DirectRun {
    pub workflow_id: String,
    pub answer: GeneratedAnswer,
}

/// Best-effort activity log entry; independently timestamped per run.
#[derive(Debug, Clone, Serialize)]
pub struct ActivityEntry {
    pub run_id: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// Intermediate payload threaded from each step into the next.
enum StepData {
    Documents {
        documents: Vec<IngestDocument>,
        strategy: ChunkStrategy,
    },
    Chunks(Vec<Chunk>),
    Embedded {
        chunks: Vec<Chunk>,
        vectors: Vec<Option<Vec<f32>>>,
        errors: Vec<String>,
    },
    Indexed(IngestionReport),
    QueryText {
        text: String,
        filter: MetadataFilter,
        top_k: usize,
        similarity_threshold: f32,
        persona: Arc<dyn Persona>,
    },
    Retrieved {
        query: String,
        results: Vec<RetrievalResult>,
        persona: Arc<dyn Persona>,
    },
    Answer {
        query: String,
        answer: GeneratedAnswer,
    },
}

impl StepData {
    fn summary(&self) -> String {
        match self {
            StepData::Documents { documents, .. } => {
                format!("{} documents queued", documents.len())
            }
            StepData::Chunks(chunks) => format!("{} chunks created", chunks.len()),
            StepData::Embedded { vectors, errors, .. } => format!(
                "{} chunks embedded, {} failed",
                vectors.iter().filter(|v| v.is_some()).count(),
                errors.len()
            ),
            StepData::Indexed(report) => format!(
                "{} of {} chunks indexed",
                report.chunks_embedded, report.chunks_created
            ),
            StepData::QueryText { text, .. } => format!("query of {} chars", text.len()),
            StepData::Retrieved { results, .. } => {
                format!("{} chunks retrieved", results.len())
            }
            StepData::Answer { answer, .. } => {
                format!("answer generated (confidence {:.2})", answer.confidence)
            }
        }
    }
}

/// Top-level workflow engine: routes an input to an ordered tool sequence,
/// executes it strictly in order with per-step error capture, and records
/// activity in bounded in-memory buffers.
pub struct Orchestrator {
    config: Arc<RagConfig>,
    embedder: Arc<EmbeddingClient>,
    retriever: Arc<Retriever>,
    generator: Arc<Generator>,
    store: Arc<dyn VectorStore>,
    activity: Mutex<VecDeque<ActivityEntry>>,
    runs: Mutex<VecDeque<WorkflowRun>>,
}

impl Orchestrator {
    pub fn new(
        config: Arc<RagConfig>,
        embedder: Arc<EmbeddingClient>,
        retriever: Arc<Retriever>,
        generator: Arc<Generator>,
        store: Arc<dyn VectorStore>,
    ) -> Self {
        Self {
            config,
            embedder,
            retriever,
            generator,
            store,
            activity: Mutex::new(VecDeque::new()),
            runs: Mutex::new(VecDeque::new()),
        }
    }

    /// Ordered tool sequence for an input type. Every non-query input takes
    /// the ingestion path.
    pub fn route(input_type: InputType) -> &'static [&'static str] {
        match input_type {
            InputType::Query => &[TOOL_RETRIEVER, TOOL_GENERATOR],
            InputType::Text | InputType::File | InputType::Batch => {
                &[TOOL_CHUNKER, TOOL_EMBEDDER, TOOL_INDEXER]
            }
        }
    }

    /// Execute one workflow run. The run always finalizes: a step failure
    /// captures the error, halts the remaining sequence and reports
    /// whatever partial result exists.
    pub async fn run(&self, input: WorkflowInput, cancel: &CancellationToken) -> WorkflowReport {
        let input_type = match &input {
            WorkflowInput::Ingest { input_type, .. } => *input_type,
            WorkflowInput::Query { .. } => InputType::Query,
        };

        let mut run = WorkflowRun::new(input_type);
        let started = std::time::Instant::now();
        self.log(&run.id, format!("workflow started ({:?})", input_type))
            .await;

        let sequence = Self::route(input_type);
        run.tool_sequence = sequence.iter().map(|s| s.to_string()).collect();
        run.status = RunStatus::Executing;

        let mut data = match input {
            WorkflowInput::Ingest {
                documents,
                strategy,
                ..
            } => StepData::Documents {
                documents,
                strategy,
            },
            WorkflowInput::Query {
                text,
                filter,
                top_k,
                similarity_threshold,
                persona,
            } => StepData::QueryText {
                text,
                filter,
                top_k,
                similarity_threshold,
                persona,
            },
        };
        let mut failure = None;

        for &tool in sequence {
            if cancel.is_cancelled() {
                let message = format!("workflow cancelled before step '{}'", tool);
                warn!("{}", message);
                run.errors.push(message.clone());
                run.status = RunStatus::Failed;
                self.log(&run.id, message.clone()).await;
                failure = Some(RagError::Workflow(message));
                break;
            }

            self.log(&run.id, format!("step '{}' started", tool)).await;

            match self.run_tool(tool, &data).await {
                Ok(next) => {
                    run.steps.push(StepRecord {
                        tool: tool.to_string(),
                        success: true,
                        timestamp: Utc::now(),
                        summary: next.summary(),
                    });
                    self.log(&run.id, format!("step '{}' ok: {}", tool, next.summary()))
                        .await;
                    data = next;
                }
                Err(e) => {
                    let message = e.to_string();
                    run.steps.push(StepRecord {
                        tool: tool.to_string(),
                        success: false,
                        timestamp: Utc::now(),
                        summary: message.clone(),
                    });
                    run.errors.push(message.clone());
                    run.status = RunStatus::Failed;
                    self.log(&run.id, format!("step '{}' failed: {}", tool, message))
                        .await;
                    failure = Some(e);
                    break;
                }
            }
        }

        if run.status != RunStatus::Failed {
            run.status = RunStatus::Completed;
        }
        run.duration_ms = Some(started.elapsed().as_millis() as u64);
        run.result = Some(json!({ "summary": data.summary() }));

        info!(
            "Workflow {} {:?} after {} steps in {}ms",
            run.id,
            run.status,
            run.steps.len(),
            run.duration_ms.unwrap_or(0)
        );
        self.log(&run.id, format!("workflow {:?}", run.status)).await;
        self.retain_run(run.clone()).await;

        let outcome = match data {
            StepData::Indexed(mut report) => {
                report.workflow_id = run.id.clone();
                Some(WorkflowOutcome::Ingestion(report))
            }
            StepData::Answer { query, answer } => {
                Some(WorkflowOutcome::Answer { query, answer })
            }
            // Partial states from halted runs carry no outcome payload
            _ => None,
        };

        WorkflowReport {
            run,
            outcome,
            failure,
        }
    }

    /// Degraded-mode execution: skip retrieval entirely and answer from the
    /// generator alone. Still produces a finalized, retained run record.
    pub async fn run_direct(
        &self,
        query: &str,
        persona: &dyn Persona,
        cancel: &CancellationToken,
    ) -> DirectRun {
        let mut run = WorkflowRun::new(InputType::Query);
        let started = std::time::Instant::now();
        run.tool_sequence = vec![TOOL_GENERATOR.to_string()];
        run.status = RunStatus::Executing;
        self.log(&run.id, "direct generation started (no retrieval)".to_string())
            .await;

        let answer = if cancel.is_cancelled() {
            run.errors
                .push("workflow cancelled before generation".to_string());
            run.status = RunStatus::Failed;
            GeneratedAnswer {
                text: crate::generation::FALLBACK_ANSWER.to_string(),
                confidence: 0.0,
                sources: Vec::new(),
                model: self.generator.model_name().to_string(),
                generated_at: Utc::now(),
            }
        } else {
            let answer = self.generator.generate_direct(query, persona).await;
            run.steps.push(StepRecord {
                tool: TOOL_GENERATOR.to_string(),
                success: true,
                timestamp: Utc::now(),
                summary: format!("direct answer (confidence {:.2})", answer.confidence),
            });
            run.status = RunStatus::Completed;
            answer
        };

        run.duration_ms = Some(started.elapsed().as_millis() as u64);
        self.log(&run.id, format!("workflow {:?}", run.status)).await;
        let workflow_id = run.id.clone();
        self.retain_run(run).await;

        DirectRun {
            workflow_id,
            answer,
        }
    }

    async fn run_tool(&self, tool: &str, data: &StepData) -> RagResult<StepData> {
        match (tool, data) {
            (TOOL_CHUNKER, StepData::Documents { documents, strategy }) => {
                let mut chunks = Vec::new();
                for document in documents {
                    chunks.extend(chunking::chunk(
                        &document.content,
                        *strategy,
                        &self.config,
                        &document.metadata,
                    ));
                }
                Ok(StepData::Chunks(chunks))
            }

            (TOOL_EMBEDDER, StepData::Chunks(chunks)) => {
                let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
                let outcomes = self.embedder.embed(&texts).await;

                let mut vectors = Vec::with_capacity(outcomes.len());
                let mut errors = Vec::new();
                for outcome in outcomes {
                    if let Some(error) = outcome.error {
                        errors.push(format!(
                            "chunk {}: {}",
                            chunks[outcome.index].sequence_index, error
                        ));
                    }
                    vectors.push(outcome.vector);
                }

                Ok(StepData::Embedded {
                    chunks: chunks.clone(),
                    vectors,
                    errors,
                })
            }

            (TOOL_INDEXER, StepData::Embedded { chunks, vectors, errors }) => {
                let model = self.embedder.model_name().to_string();
                let records: Vec<VectorRecord> = chunks
                    .iter()
                    .zip(vectors)
                    .filter_map(|(chunk, vector)| {
                        vector.as_ref().map(|v| VectorRecord {
                            chunk_id: chunk.id.clone(),
                            content: chunk.content.clone(),
                            vector: v.clone(),
                            model: model.clone(),
                            metadata: chunk.metadata.clone(),
                            inserted_at: Utc::now(),
                        })
                    })
                    .collect();

                let embedded = records.len();
                self.store.upsert(records).await?;

                Ok(StepData::Indexed(IngestionReport {
                    chunks_created: chunks.len(),
                    chunks_embedded: embedded,
                    errors: errors.clone(),
                    workflow_id: String::new(),
                }))
            }

            (
                TOOL_RETRIEVER,
                StepData::QueryText {
                    text,
                    filter,
                    top_k,
                    similarity_threshold,
                    persona,
                },
            ) => {
                let results = self
                    .retriever
                    .retrieve_by_text(text, *top_k, *similarity_threshold, filter)
                    .await?;
                Ok(StepData::Retrieved {
                    query: text.clone(),
                    results,
                    persona: persona.clone(),
                })
            }

            (TOOL_GENERATOR, StepData::Retrieved { query, results, persona }) => {
                let answer = self
                    .generator
                    .generate_answer(query, results, persona.as_ref())
                    .await;
                Ok(StepData::Answer {
                    query: query.clone(),
                    answer,
                })
            }

            (tool, _) => Err(RagError::Workflow(format!(
                "Tool '{}' received an incompatible step payload",
                tool
            ))),
        }
    }

    /// Append to the bounded activity log. Best effort; never blocks the
    /// workflow beyond the lock itself.
    async fn log(&self, run_id: &str, message: String) {
        debug!("[{}] {}", run_id, message);

        let mut activity = self.activity.lock().await;
        if activity.len() >= RETAINED_ACTIVITY {
            activity.pop_front();
        }
        activity.push_back(ActivityEntry {
            run_id: run_id.to_string(),
            message,
            timestamp: Utc::now(),
        });
    }

    async fn retain_run(&self, run: WorkflowRun) {
        let mut runs = self.runs.lock().await;
        if runs.len() >= RETAINED_RUNS {
            runs.pop_front();
        }
        runs.push_back(run);
    }

    /// Finalized runs, oldest first
    pub async fn recent_runs(&self) -> Vec<WorkflowRun> {
        self.runs.lock().await.iter().cloned().collect()
    }

    pub async fn activity_log(&self) -> Vec<ActivityEntry> {
        self.activity.lock().await.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_routing_table() {
        assert_eq!(
            Orchestrator::route(InputType::Query),
            &[TOOL_RETRIEVER, TOOL_GENERATOR]
        );
        assert_eq!(
            Orchestrator::route(InputType::Text),
            &[TOOL_CHUNKER, TOOL_EMBEDDER, TOOL_INDEXER]
        );
        assert_eq!(
            Orchestrator::route(InputType::Batch),
            Orchestrator::route(InputType::File)
        );
    }

    #[test]
    fn test_unknown_label_routes_to_ingestion() {
        let input_type = InputType::from_label("telepathy");
        assert_eq!(
            Orchestrator::route(input_type),
            &[TOOL_CHUNKER, TOOL_EMBEDDER, TOOL_INDEXER]
        );
    }
}
