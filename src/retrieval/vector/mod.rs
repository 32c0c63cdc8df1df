pub mod memory;
pub mod types;

pub use memory::{cosine_similarity, InMemoryVectorStore};
pub use types::{MetadataFilter, VectorMatch, VectorRecord, VectorStore, VectorStoreError};
