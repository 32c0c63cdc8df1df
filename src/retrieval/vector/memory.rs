use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::types::{MetadataFilter, VectorMatch, VectorRecord, VectorStore, VectorStoreError};

/// Cosine similarity between two equal-length vectors, in [-1, 1].
/// Zero-magnitude vectors score 0. Callers must not pass vectors of
/// different dimensions; scores over a common prefix are meaningless.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let magnitude_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let magnitude_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if magnitude_a == 0.0 || magnitude_b == 0.0 {
        return 0.0;
    }

    dot_product / (magnitude_a * magnitude_b)
}

/// In-memory vector index: a linear cosine scan over stored records.
/// Suitable for tests and small deployments; the trait boundary is where a
/// production index plugs in.
#[derive(Default)]
pub struct InMemoryVectorStore {
    records: RwLock<Vec<VectorRecord>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn upsert(&self, records: Vec<VectorRecord>) -> Result<(), VectorStoreError> {
        let mut stored = self.records.write().await;

        for record in records {
            match stored.iter_mut().find(|r| r.chunk_id == record.chunk_id) {
                Some(existing) => *existing = record,
                None => stored.push(record),
            }
        }

        Ok(())
    }

    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: &MetadataFilter,
    ) -> Result<Vec<VectorMatch>, VectorStoreError> {
        let stored = self.records.read().await;

        let mut matches: Vec<VectorMatch> = stored
            .iter()
            .filter(|record| filter.matches(&record.metadata))
            .filter(|record| {
                // Records embedded at another dimension are incomparable
                // with this query and never scored
                if record.vector.len() == vector.len() {
                    true
                } else {
                    warn!(
                        "Skipping record {} (model {}, {}-d) in a {}-d query",
                        record.chunk_id,
                        record.model,
                        record.vector.len(),
                        vector.len()
                    );
                    false
                }
            })
            .map(|record| VectorMatch {
                similarity: cosine_similarity(vector, &record.vector),
                record: record.clone(),
            })
            .collect();

        matches.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        matches.truncate(top_k);

        debug!("Vector query matched {} records", matches.len());
        Ok(matches)
    }

    async fn query_by_metadata(
        &self,
        filter: &MetadataFilter,
        limit: usize,
    ) -> Result<Vec<VectorRecord>, VectorStoreError> {
        let stored = self.records.read().await;

        Ok(stored
            .iter()
            .filter(|record| filter.matches(&record.metadata))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn count(&self) -> Result<usize, VectorStoreError> {
        Ok(self.records.read().await.len())
    }
}
