use serde::{Deserialize, Serialize};
use unicode_segmentation::UnicodeSegmentation;
use uuid::Uuid;

/// Kind of source document a chunk was cut from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Resume,
    JobDescription,
    #[default]
    FreeForm,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Resume => "resume",
            SourceType::JobDescription => "job_description",
            SourceType::FreeForm => "free_form",
        }
    }
}

/// Scoping and provenance fields attached to every chunk. These are the
/// exact-match filterable fields at retrieval time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub source_type: SourceType,
    pub source_id: Option<String>,
    pub owner_user_id: Option<String>,
    pub owner_org_id: Option<String>,
}

/// A bounded span of source text prepared for embedding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub content: String,
    /// Position within the source document. Chunks from one ingestion run
    /// have contiguous, strictly increasing indices starting at zero.
    pub sequence_index: usize,
    pub word_count: usize,
    pub char_count: usize,
    pub metadata: ChunkMetadata,
    /// Deterministic hash of `content`, used for de-duplication and cache keys
    pub content_hash: String,
}

impl Chunk {
    pub fn new(content: String, sequence_index: usize, metadata: ChunkMetadata) -> Self {
        let word_count = content.unicode_words().count();
        let char_count = content.chars().count();
        let content_hash = format!("{:x}", md5::compute(content.as_bytes()));

        Self {
            id: Uuid::new_v4().to_string(),
            content,
            sequence_index,
            word_count,
            char_count,
            metadata,
            content_hash,
        }
    }
}

/// A retrieved chunk plus its query-time cosine similarity. Computed per
/// retrieval call, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub chunk_id: String,
    pub content: String,
    pub metadata: ChunkMetadata,
    pub similarity_score: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_counts() {
        let chunk = Chunk::new(
            "Built a payment service in Rust.".to_string(),
            0,
            ChunkMetadata::default(),
        );
        assert_eq!(chunk.word_count, 6);
        assert_eq!(chunk.char_count, 32);
        assert_eq!(chunk.sequence_index, 0);
    }

    #[test]
    fn test_content_hash_deterministic() {
        let a = Chunk::new("same text".to_string(), 0, ChunkMetadata::default());
        let b = Chunk::new("same text".to_string(), 1, ChunkMetadata::default());
        assert_eq!(a.content_hash, b.content_hash);
        assert_ne!(a.id, b.id);
    }
}
