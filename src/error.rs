use thiserror::Error;

use crate::retrieval::vector::VectorStoreError;

#[derive(Error, Debug)]
pub enum RagError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Vector index unavailable: {0}")]
    IndexUnavailable(String),

    #[error("Unsupported file type: {0}")]
    UnsupportedFileType(String),

    #[error("Workflow error: {0}")]
    Workflow(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type RagResult<T> = Result<T, RagError>;

impl From<VectorStoreError> for RagError {
    fn from(err: VectorStoreError) -> Self {
        RagError::IndexUnavailable(err.to_string())
    }
}
