//! Retrieval-augmented generation pipeline for talent-platform documents.
//!
//! Ingestion runs documents through chunking, batched embedding and vector
//! indexing; queries run retrieval and grounded answer generation. Both
//! paths execute as orchestrated workflows with per-step error capture.
//! [`pipeline::RagPipeline`] is the top-level entry point.

pub mod chunking;
pub mod config;
pub mod embeddings;
pub mod error;
pub mod generation;
pub mod models;
pub mod orchestrator;
pub mod pipeline;
pub mod retrieval;

pub use config::RagConfig;
pub use error::{RagError, RagResult};
pub use pipeline::{FileInput, RagPipeline};
