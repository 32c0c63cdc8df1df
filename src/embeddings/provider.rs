use async_openai::{
    config::OpenAIConfig,
    types::{CreateEmbeddingRequest, EmbeddingInput},
    Client,
};
use async_trait::async_trait;
use tracing::info;

/// Error types for embedding provider operations
#[derive(Debug, thiserror::Error)]
pub enum EmbeddingError {
    #[error("API error: {0}")]
    Api(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Abstract embedding capability. One call embeds up to `max_batch_size`
/// texts; a batch-level failure is isolated by the client, not here.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed one batch of texts, returning one vector per input in order
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    /// Fixed dimension of every vector this provider produces
    fn dimension(&self) -> usize;

    /// Identifier of the embedding model/version. Changing models
    /// invalidates cross-comparisons of stored vectors.
    fn model_name(&self) -> &str;

    /// Provider's per-call item count limit
    fn max_batch_size(&self) -> usize {
        100
    }
}

/// OpenAI embedding provider
pub struct OpenAiEmbeddings {
    client: Client<OpenAIConfig>,
    model: String,
    dimension: usize,
}

impl OpenAiEmbeddings {
    pub fn new(api_key: &str, model: Option<String>) -> Self {
        let model = model.unwrap_or_else(|| "text-embedding-3-small".to_string());

        let dimension = match model.as_str() {
            "text-embedding-3-small" => 1536,
            "text-embedding-3-large" => 3072,
            "text-embedding-ada-002" => 1536,
            _ => 1536,
        };

        let config = OpenAIConfig::new().with_api_key(api_key);
        let client = Client::with_config(config);

        info!(
            "Initialized OpenAI embeddings: model={}, dimension={}",
            model, dimension
        );

        Self {
            client,
            model,
            dimension,
        }
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbeddings {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let request = CreateEmbeddingRequest {
            model: self.model.clone(),
            input: EmbeddingInput::StringArray(texts.to_vec()),
            encoding_format: None,
            user: None,
            dimensions: None,
        };

        let response = self
            .client
            .embeddings()
            .create(request)
            .await
            .map_err(|e| EmbeddingError::Api(format!("OpenAI API error: {}", e)))?;

        Ok(response.data.into_iter().map(|d| d.embedding).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_dimension_table() {
        let provider = OpenAiEmbeddings::new("test_key", Some("text-embedding-3-large".into()));
        assert_eq!(provider.dimension(), 3072);

        let provider = OpenAiEmbeddings::new("test_key", None);
        assert_eq!(provider.dimension(), 1536);
        assert_eq!(provider.model_name(), "text-embedding-3-small");
    }
}
