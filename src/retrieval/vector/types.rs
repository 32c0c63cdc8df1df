use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{ChunkMetadata, SourceType};

/// Error types for vector index operations
#[derive(Debug, thiserror::Error)]
pub enum VectorStoreError {
    #[error("Index unavailable: {0}")]
    Unavailable(String),

    #[error("Operation failed: {0}")]
    Operation(String),
}

/// One stored embedding plus the chunk it was computed from.
///
/// Chunk content lives inside the record so retrieval returns the exact
/// stored text; there is no separate per-chunk content store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorRecord {
    pub chunk_id: String,
    pub content: String,
    pub vector: Vec<f32>,
    /// Embedding model that produced `vector`; vectors from different
    /// models are never compared
    pub model: String,
    pub metadata: ChunkMetadata,
    pub inserted_at: DateTime<Utc>,
}

/// A nearest-neighbor hit with its cosine similarity.
#[derive(Debug, Clone)]
pub struct VectorMatch {
    pub record: VectorRecord,
    pub similarity: f32,
}

/// Exact-match conjunction over chunk metadata fields. An unset field
/// matches everything.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetadataFilter {
    pub source_type: Option<SourceType>,
    pub source_id: Option<String>,
    pub owner_user_id: Option<String>,
    pub owner_org_id: Option<String>,
}

impl MetadataFilter {
    pub fn matches(&self, metadata: &ChunkMetadata) -> bool {
        if let Some(source_type) = self.source_type {
            if metadata.source_type != source_type {
                return false;
            }
        }
        if let Some(ref source_id) = self.source_id {
            if metadata.source_id.as_ref() != Some(source_id) {
                return false;
            }
        }
        if let Some(ref owner_user_id) = self.owner_user_id {
            if metadata.owner_user_id.as_ref() != Some(owner_user_id) {
                return false;
            }
        }
        if let Some(ref owner_org_id) = self.owner_org_id {
            if metadata.owner_org_id.as_ref() != Some(owner_org_id) {
                return false;
            }
        }
        true
    }

    pub fn is_empty(&self) -> bool {
        self.source_type.is_none()
            && self.source_id.is_none()
            && self.owner_user_id.is_none()
            && self.owner_org_id.is_none()
    }
}

/// Abstract trait for the vector index consumed by the pipeline. The index
/// is an external, independently-concurrent service; no client-side locking
/// is layered on top of it.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert or update records keyed by chunk id
    async fn upsert(&self, records: Vec<VectorRecord>) -> Result<(), VectorStoreError>;

    /// Nearest neighbors by cosine similarity, restricted to records whose
    /// metadata matches the filter, at most `top_k` of them
    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: &MetadataFilter,
    ) -> Result<Vec<VectorMatch>, VectorStoreError>;

    /// Metadata-only lookup in insertion order, without similarity scoring
    async fn query_by_metadata(
        &self,
        filter: &MetadataFilter,
        limit: usize,
    ) -> Result<Vec<VectorRecord>, VectorStoreError>;

    /// Number of stored records
    async fn count(&self) -> Result<usize, VectorStoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_filter_matches_everything() {
        let filter = MetadataFilter::default();
        assert!(filter.is_empty());
        assert!(filter.matches(&ChunkMetadata::default()));
    }

    #[test]
    fn test_filter_is_a_conjunction() {
        let metadata = ChunkMetadata {
            source_type: SourceType::Resume,
            source_id: Some("resume-7".to_string()),
            owner_user_id: Some("user-1".to_string()),
            owner_org_id: None,
        };

        let matching = MetadataFilter {
            source_type: Some(SourceType::Resume),
            owner_user_id: Some("user-1".to_string()),
            ..MetadataFilter::default()
        };
        assert!(matching.matches(&metadata));

        let mismatched = MetadataFilter {
            source_type: Some(SourceType::Resume),
            owner_user_id: Some("user-2".to_string()),
            ..MetadataFilter::default()
        };
        assert!(!mismatched.matches(&metadata));

        // A filter on a field the record does not carry never matches
        let org_scoped = MetadataFilter {
            owner_org_id: Some("org-9".to_string()),
            ..MetadataFilter::default()
        };
        assert!(!org_scoped.matches(&metadata));
    }
}
