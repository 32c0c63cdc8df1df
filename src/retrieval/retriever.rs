use std::sync::Arc;

use tracing::debug;

use super::vector::{MetadataFilter, VectorRecord, VectorStore};
use crate::embeddings::EmbeddingClient;
use crate::error::{RagError, RagResult};
use crate::models::RetrievalResult;

/// Issues similarity queries against the vector index, vectorizing query
/// text through the shared embedding client and applying metadata filters.
pub struct Retriever {
    store: Arc<dyn VectorStore>,
    embedder: Arc<EmbeddingClient>,
}

impl Retriever {
    pub fn new(store: Arc<dyn VectorStore>, embedder: Arc<EmbeddingClient>) -> Self {
        Self { store, embedder }
    }

    /// Nearest-neighbor retrieval for a pre-computed query vector. The
    /// vector is validated before any index call; results below the
    /// similarity threshold are dropped, the rest sorted descending and
    /// truncated to `top_k`.
    pub async fn retrieve_similar(
        &self,
        query_vector: &[f32],
        top_k: usize,
        similarity_threshold: f32,
        filter: &MetadataFilter,
    ) -> RagResult<Vec<RetrievalResult>> {
        if query_vector.is_empty() {
            return Err(RagError::Validation("Query vector is empty".to_string()));
        }
        let expected = self.embedder.dimension();
        if query_vector.len() != expected {
            return Err(RagError::Validation(format!(
                "Query vector dimension {} does not match embedding dimension {}",
                query_vector.len(),
                expected
            )));
        }

        let matches = self.store.query(query_vector, top_k, filter).await?;

        let mut results: Vec<RetrievalResult> = matches
            .into_iter()
            .filter(|m| m.similarity >= similarity_threshold)
            .map(|m| RetrievalResult {
                chunk_id: m.record.chunk_id,
                content: m.record.content,
                metadata: m.record.metadata,
                similarity_score: m.similarity,
            })
            .collect();

        results.sort_by(|a, b| {
            b.similarity_score
                .partial_cmp(&a.similarity_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        results.truncate(top_k);

        debug!(
            "Retrieved {} chunks above threshold {}",
            results.len(),
            similarity_threshold
        );
        Ok(results)
    }

    /// Vectorize `query_text` then delegate to [`retrieve_similar`].
    ///
    /// [`retrieve_similar`]: Retriever::retrieve_similar
    pub async fn retrieve_by_text(
        &self,
        query_text: &str,
        top_k: usize,
        similarity_threshold: f32,
        filter: &MetadataFilter,
    ) -> RagResult<Vec<RetrievalResult>> {
        if query_text.trim().is_empty() {
            return Err(RagError::Validation("Query text is empty".to_string()));
        }

        let query_vector = self.embedder.embed_one(query_text).await?;
        self.retrieve_similar(&query_vector, top_k, similarity_threshold, filter)
            .await
    }

    /// Metadata-only lookup in insertion order, bypassing similarity
    /// scoring entirely. Administrative/debugging use.
    pub async fn search_by_metadata(
        &self,
        filter: &MetadataFilter,
        limit: usize,
    ) -> RagResult<Vec<VectorRecord>> {
        Ok(self.store.query_by_metadata(filter, limit).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RagConfig;
    use crate::embeddings::{EmbeddingError, EmbeddingProvider};
    use crate::models::{ChunkMetadata, SourceType};
    use crate::retrieval::vector::{InMemoryVectorStore, VectorRecord};
    use async_trait::async_trait;
    use chrono::Utc;

    struct UnitProvider;

    #[async_trait]
    impl EmbeddingProvider for UnitProvider {
        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            Ok(texts.iter().map(|_| vec![1.0, 0.0, 0.0]).collect())
        }

        fn dimension(&self) -> usize {
            3
        }

        fn model_name(&self) -> &str {
            "unit-embedder"
        }
    }

    fn record(chunk_id: &str, vector: Vec<f32>) -> VectorRecord {
        VectorRecord {
            chunk_id: chunk_id.to_string(),
            content: format!("content of {}", chunk_id),
            vector,
            model: "unit-embedder".to_string(),
            metadata: ChunkMetadata {
                source_type: SourceType::JobDescription,
                ..ChunkMetadata::default()
            },
            inserted_at: Utc::now(),
        }
    }

    async fn retriever_with_records(records: Vec<VectorRecord>) -> Retriever {
        let store = Arc::new(InMemoryVectorStore::new());
        store.upsert(records).await.unwrap();
        let embedder = Arc::new(EmbeddingClient::new(
            &RagConfig::default(),
            Arc::new(UnitProvider),
        ));
        Retriever::new(store, embedder)
    }

    #[tokio::test]
    async fn test_threshold_and_top_k() {
        // Similarities against [1,0,0]: 0.9, 0.4, 0.2
        let retriever = retriever_with_records(vec![
            record("high", vec![0.9, (1.0f32 - 0.81).sqrt(), 0.0]),
            record("mid", vec![0.4, (1.0f32 - 0.16).sqrt(), 0.0]),
            record("low", vec![0.2, (1.0f32 - 0.04).sqrt(), 0.0]),
        ])
        .await;

        let results = retriever
            .retrieve_similar(&[1.0, 0.0, 0.0], 2, 0.5, &MetadataFilter::default())
            .await
            .unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk_id, "high");
        assert!((results[0].similarity_score - 0.9).abs() < 1e-4);
    }

    #[tokio::test]
    async fn test_results_sorted_descending() {
        let retriever = retriever_with_records(vec![
            record("b", vec![0.5, (1.0f32 - 0.25).sqrt(), 0.0]),
            record("a", vec![0.8, (1.0f32 - 0.64).sqrt(), 0.0]),
            record("c", vec![0.6, (1.0f32 - 0.36).sqrt(), 0.0]),
        ])
        .await;

        let results = retriever
            .retrieve_similar(&[1.0, 0.0, 0.0], 3, 0.0, &MetadataFilter::default())
            .await
            .unwrap();

        let scores: Vec<f32> = results.iter().map(|r| r.similarity_score).collect();
        assert!(scores.windows(2).all(|w| w[0] >= w[1]));
        assert_eq!(results[0].chunk_id, "a");
    }

    #[tokio::test]
    async fn test_empty_vector_rejected_before_index_call() {
        let retriever = retriever_with_records(vec![]).await;
        let err = retriever
            .retrieve_similar(&[], 5, 0.0, &MetadataFilter::default())
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::Validation(_)));
    }

    #[tokio::test]
    async fn test_wrong_dimension_rejected() {
        let retriever = retriever_with_records(vec![]).await;
        let err = retriever
            .retrieve_similar(&[1.0, 0.0], 5, 0.0, &MetadataFilter::default())
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::Validation(_)));
    }

    #[tokio::test]
    async fn test_retrieve_by_text() {
        let retriever =
            retriever_with_records(vec![record("only", vec![1.0, 0.0, 0.0])]).await;

        let results = retriever
            .retrieve_by_text("what does the role involve", 5, 0.5, &MetadataFilter::default())
            .await
            .unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].content, "content of only");
    }
}
