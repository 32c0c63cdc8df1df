use std::collections::BTreeMap;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::chunking::ChunkStrategy;
use crate::config::RagConfig;
use crate::embeddings::{EmbeddingClient, EmbeddingProvider};
use crate::error::{RagError, RagResult};
use crate::generation::{ChatProvider, Generator, Persona};
use crate::models::{
    ChunkMetadata, CostEstimate, HealthReport, IngestionReport, InputType, QueryResponse,
    WorkflowRun,
};
use crate::orchestrator::{
    ActivityEntry, IngestDocument, Orchestrator, WorkflowInput, WorkflowOutcome,
};
use crate::retrieval::vector::{MetadataFilter, VectorStore};
use crate::retrieval::Retriever;

/// A file handed to [`RagPipeline::ingest_file`]. Content is expected to be
/// already decoded to UTF-8; binary extraction happens upstream.
#[derive(Debug, Clone)]
pub struct FileInput {
    pub filename: String,
    pub content: String,
}

fn file_extension(filename: &str) -> Option<&str> {
    filename.rsplit_once('.').map(|(_, ext)| ext)
}

/// Facade over the full pipeline: wires the embedding client, vector store,
/// retriever, generator and orchestrator together and exposes the ingestion
/// and query entry points.
pub struct RagPipeline {
    config: Arc<RagConfig>,
    embedder: Arc<EmbeddingClient>,
    store: Arc<dyn VectorStore>,
    orchestrator: Orchestrator,
    cancel: CancellationToken,
}

impl RagPipeline {
    pub fn new(
        config: RagConfig,
        embedding_provider: Arc<dyn EmbeddingProvider>,
        chat_provider: Arc<dyn ChatProvider>,
        store: Arc<dyn VectorStore>,
    ) -> Self {
        let config = Arc::new(config);
        let embedder = Arc::new(EmbeddingClient::new(&config, embedding_provider));
        let retriever = Arc::new(Retriever::new(store.clone(), embedder.clone()));
        let generator = Arc::new(Generator::new(&config, chat_provider));

        let orchestrator = Orchestrator::new(
            config.clone(),
            embedder.clone(),
            retriever,
            generator,
            store.clone(),
        );

        info!(
            "RAG pipeline initialized (embedding model {}, retrieval enabled: {})",
            embedder.model_name(),
            config.retrieval_enabled
        );

        Self {
            config,
            embedder,
            store,
            orchestrator,
            cancel: CancellationToken::new(),
        }
    }

    /// Token used to abort in-flight workflows between steps.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Chunk, embed and index one document. Per-chunk embedding failures are
    /// reported inside the returned report; only validation and index
    /// failures surface as errors.
    pub async fn ingest_text(
        &self,
        content: &str,
        metadata: ChunkMetadata,
        strategy: ChunkStrategy,
    ) -> RagResult<IngestionReport> {
        if content.trim().is_empty() {
            return Err(RagError::Validation("Document content is empty".to_string()));
        }

        self.ingest(
            InputType::Text,
            vec![IngestDocument {
                content: content.to_string(),
                metadata,
            }],
            strategy,
        )
        .await
    }

    /// Ingest a file by extension. Plain-text kinds are decoded ingestion;
    /// anything else is rejected as unsupported rather than mis-chunked.
    pub async fn ingest_file(
        &self,
        file: FileInput,
        metadata: ChunkMetadata,
    ) -> RagResult<IngestionReport> {
        let extension = file_extension(&file.filename)
            .map(|ext| ext.to_ascii_lowercase())
            .unwrap_or_default();

        match extension.as_str() {
            "txt" | "text" | "md" | "markdown" => {
                if file.content.trim().is_empty() {
                    return Err(RagError::Validation(format!(
                        "File '{}' is empty",
                        file.filename
                    )));
                }
                self.ingest(
                    InputType::File,
                    vec![IngestDocument {
                        content: file.content,
                        metadata,
                    }],
                    ChunkStrategy::default(),
                )
                .await
            }
            other => Err(RagError::UnsupportedFileType(format!(
                "'{}' ({})",
                file.filename,
                if other.is_empty() { "no extension" } else { other }
            ))),
        }
    }

    /// Ingest several documents in one workflow run.
    pub async fn ingest_batch(
        &self,
        documents: Vec<IngestDocument>,
        strategy: ChunkStrategy,
    ) -> RagResult<IngestionReport> {
        if documents.is_empty() {
            return Err(RagError::Validation("Batch contains no documents".to_string()));
        }
        self.ingest(InputType::Batch, documents, strategy).await
    }

    async fn ingest(
        &self,
        input_type: InputType,
        documents: Vec<IngestDocument>,
        strategy: ChunkStrategy,
    ) -> RagResult<IngestionReport> {
        let report = self
            .orchestrator
            .run(
                WorkflowInput::Ingest {
                    input_type,
                    documents,
                    strategy,
                },
                &self.cancel,
            )
            .await;

        if let Some(failure) = report.failure {
            return Err(failure);
        }
        match report.outcome {
            Some(WorkflowOutcome::Ingestion(ingestion)) => Ok(ingestion),
            _ => Err(RagError::Workflow(format!(
                "Ingestion run {} produced no report",
                report.run.id
            ))),
        }
    }

    /// Answer a question over the indexed corpus. When retrieval is
    /// administratively disabled, or the index is unavailable, the query is
    /// answered directly without context and flagged `rag_disabled`.
    pub async fn query(
        &self,
        text: &str,
        filter: MetadataFilter,
        persona: Arc<dyn Persona>,
    ) -> RagResult<QueryResponse> {
        if text.trim().is_empty() {
            return Err(RagError::Validation("Query text is empty".to_string()));
        }

        if !self.config.retrieval_enabled {
            return Ok(self.query_degraded(text, persona, "retrieval disabled").await);
        }

        let report = self
            .orchestrator
            .run(
                WorkflowInput::Query {
                    text: text.to_string(),
                    filter,
                    top_k: self.config.default_top_k,
                    similarity_threshold: self.config.default_similarity_threshold,
                    persona: persona.clone(),
                },
                &self.cancel,
            )
            .await;

        match (report.outcome, report.failure) {
            (Some(WorkflowOutcome::Answer { answer, .. }), _) => Ok(QueryResponse {
                answer: answer.text,
                confidence: answer.confidence,
                sources: answer.sources,
                workflow_id: report.run.id,
                rag_disabled: false,
            }),
            (_, Some(RagError::IndexUnavailable(reason))) => {
                Ok(self.query_degraded(text, persona, &reason).await)
            }
            (_, Some(failure)) => Err(failure),
            (_, None) => Err(RagError::Workflow(format!(
                "Query run {} produced no answer",
                report.run.id
            ))),
        }
    }

    async fn query_degraded(
        &self,
        text: &str,
        persona: Arc<dyn Persona>,
        reason: &str,
    ) -> QueryResponse {
        warn!("Answering without retrieval context: {}", reason);

        let run = self
            .orchestrator
            .run_direct(text, persona.as_ref(), &self.cancel)
            .await;

        QueryResponse {
            answer: run.answer.text,
            confidence: run.answer.confidence,
            sources: Vec::new(),
            workflow_id: run.workflow_id,
            rag_disabled: true,
        }
    }

    /// Per-component liveness snapshot. The index is probed with a count,
    /// the embedder and generator report configuration-level readiness.
    pub async fn health_check(&self) -> HealthReport {
        let mut components = BTreeMap::new();
        components.insert(
            "vector_store".to_string(),
            self.store.count().await.is_ok(),
        );
        components.insert(
            "embedding_client".to_string(),
            !self.embedder.model_name().is_empty(),
        );
        components.insert("retrieval_enabled".to_string(), self.config.retrieval_enabled);

        HealthReport { components }
    }

    /// Advisory pre-ingestion cost estimate.
    pub fn estimate_cost(&self, text_lengths: &[usize]) -> CostEstimate {
        self.embedder.estimate_cost(text_lengths)
    }

    pub async fn recent_runs(&self) -> Vec<WorkflowRun> {
        self.orchestrator.recent_runs().await
    }

    pub async fn activity_log(&self) -> Vec<ActivityEntry> {
        self.orchestrator.activity_log().await
    }
}
