mod cache;
mod provider;
mod rate_limit;

pub use cache::EmbeddingCache;
pub use provider::{EmbeddingError, EmbeddingProvider, OpenAiEmbeddings};
pub use rate_limit::SlidingWindowLimiter;

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::config::RagConfig;
use crate::error::{RagError, RagResult};
use crate::models::CostEstimate;

/// Per-item result of an embedding request: a vector or an error, never
/// both. Item failures are isolated; a batch never fails atomically.
#[derive(Debug, Clone, Serialize)]
pub struct EmbeddingOutcome {
    /// Position of the input text in the original request
    pub index: usize,
    pub vector: Option<Vec<f32>>,
    pub error: Option<String>,
    pub from_cache: bool,
}

impl EmbeddingOutcome {
    fn pending(index: usize) -> Self {
        Self {
            index,
            vector: None,
            error: None,
            from_cache: false,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.vector.is_some()
    }
}

/// Converts texts to fixed-dimension vectors with caching, batching,
/// rate limiting and per-item failure isolation.
///
/// One client instance is shared across concurrent workflow runs; the cache
/// and limiter are the only shared mutable state and each sits behind its
/// own lock with a minimal critical section.
pub struct EmbeddingClient {
    provider: Arc<dyn EmbeddingProvider>,
    cache: Mutex<EmbeddingCache>,
    limiter: Mutex<SlidingWindowLimiter>,
    batch_size: usize,
    workers: usize,
    price_per_1k_tokens_usd: f64,
}

impl EmbeddingClient {
    pub fn new(config: &RagConfig, provider: Arc<dyn EmbeddingProvider>) -> Self {
        let batch_size = config
            .embed_batch_size
            .min(provider.max_batch_size())
            .max(1);

        Self {
            cache: Mutex::new(EmbeddingCache::new(config.embed_cache_max_entries)),
            limiter: Mutex::new(SlidingWindowLimiter::new(
                config.embed_calls_per_minute,
                config.embed_calls_per_hour,
            )),
            batch_size,
            workers: config.embed_workers.max(1),
            price_per_1k_tokens_usd: config.price_per_1k_tokens_usd,
            provider,
        }
    }

    pub fn dimension(&self) -> usize {
        self.provider.dimension()
    }

    pub fn model_name(&self) -> &str {
        self.provider.model_name()
    }

    /// Embed a list of texts. Cache hits bypass the network entirely; the
    /// remainder is grouped into bounded batches dispatched through a
    /// bounded worker pool, with per-batch failures attached to the affected
    /// items rather than aborting the request.
    pub async fn embed(&self, texts: &[String]) -> Vec<EmbeddingOutcome> {
        let mut outcomes: Vec<EmbeddingOutcome> = (0..texts.len())
            .map(EmbeddingOutcome::pending)
            .collect();
        if texts.is_empty() {
            return outcomes;
        }

        let model = self.provider.model_name().to_string();

        // Cache lookup
        let mut pending: Vec<usize> = Vec::new();
        {
            let cache = self.cache.lock().await;
            for (i, text) in texts.iter().enumerate() {
                let key = EmbeddingCache::key(&model, text);
                if let Some(vector) = cache.get(&key) {
                    outcomes[i].vector = Some(vector);
                    outcomes[i].from_cache = true;
                } else {
                    pending.push(i);
                }
            }
        }

        debug!(
            "Embedding {} texts ({} cache hits)",
            texts.len(),
            texts.len() - pending.len()
        );

        if pending.is_empty() {
            return outcomes;
        }

        // Batch the uncached texts and overlap outbound calls with a
        // bounded worker pool
        let batches: Vec<Vec<usize>> = pending
            .chunks(self.batch_size)
            .map(|indices| indices.to_vec())
            .collect();

        let batch_results = stream::iter(batches.into_iter().map(|batch| {
            let batch_texts: Vec<String> = batch.iter().map(|&i| texts[i].clone()).collect();
            async move {
                rate_limit::acquire(&self.limiter).await;
                debug!("Embedding batch of {} texts", batch_texts.len());
                let result = self.provider.embed_batch(&batch_texts).await;
                (batch, batch_texts, result)
            }
        }))
        .buffer_unordered(self.workers)
        .collect::<Vec<_>>()
        .await;

        let expected = self.provider.dimension();
        let mut cache = self.cache.lock().await;

        for (batch, batch_texts, result) in batch_results {
            match result {
                Ok(vectors) => {
                    if vectors.len() != batch.len() {
                        let message = format!(
                            "Provider returned {} vectors for {} inputs",
                            vectors.len(),
                            batch.len()
                        );
                        warn!("{}", message);
                        for &i in &batch {
                            outcomes[i].error = Some(message.clone());
                        }
                        continue;
                    }

                    for ((&i, text), vector) in batch.iter().zip(&batch_texts).zip(vectors) {
                        if vector.len() != expected {
                            let message = format!(
                                "Vector dimension {} does not match expected {}",
                                vector.len(),
                                expected
                            );
                            warn!("{}", message);
                            outcomes[i].error = Some(message);
                            continue;
                        }

                        cache.insert(EmbeddingCache::key(&model, text), vector.clone());
                        outcomes[i].vector = Some(vector);
                    }
                }
                Err(e) => {
                    warn!("Embedding batch of {} items failed: {}", batch.len(), e);
                    for &i in &batch {
                        outcomes[i].error = Some(e.to_string());
                    }
                }
            }
        }

        outcomes
    }

    /// Embed a single text, surfacing any item failure as an error.
    pub async fn embed_one(&self, text: &str) -> RagResult<Vec<f32>> {
        let outcomes = self.embed(std::slice::from_ref(&text.to_string())).await;

        match outcomes.into_iter().next() {
            Some(outcome) => outcome.vector.ok_or_else(|| {
                RagError::Provider(
                    outcome
                        .error
                        .unwrap_or_else(|| "No embedding generated".to_string()),
                )
            }),
            None => Err(RagError::Provider("No embedding generated".to_string())),
        }
    }

    /// Advisory cost estimate for embedding texts of the given lengths:
    /// roughly one token per 4 characters at the configured per-1k price.
    pub fn estimate_cost(&self, text_lengths: &[usize]) -> CostEstimate {
        let total_chars: usize = text_lengths.iter().sum();
        let estimated_tokens = (total_chars as f64 / 4.0).ceil() as usize;

        CostEstimate {
            estimated_tokens,
            estimated_cost_usd: estimated_tokens as f64 / 1000.0 * self.price_per_1k_tokens_usd,
        }
    }

    /// Entries currently held by the embedding cache
    pub async fn cache_len(&self) -> usize {
        self.cache.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    struct StubProvider {
        dimension: usize,
        calls: AtomicUsize,
        fail_batch: Option<usize>,
        max_batch: usize,
    }

    impl StubProvider {
        fn new(dimension: usize) -> Self {
            Self {
                dimension,
                calls: AtomicUsize::new(0),
                fail_batch: None,
                max_batch: 100,
            }
        }

        fn vector_for(&self, text: &str) -> Vec<f32> {
            let mut v = vec![0.0; self.dimension];
            for (i, b) in text.bytes().enumerate() {
                v[i % self.dimension] += b as f32;
            }
            v
        }
    }

    #[async_trait]
    impl EmbeddingProvider for StubProvider {
        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if Some(call) == self.fail_batch {
                return Err(EmbeddingError::Api("simulated outage".to_string()));
            }
            Ok(texts.iter().map(|t| self.vector_for(t)).collect())
        }

        fn dimension(&self) -> usize {
            self.dimension
        }

        fn model_name(&self) -> &str {
            "stub-embedder"
        }

        fn max_batch_size(&self) -> usize {
            self.max_batch
        }
    }

    fn client_with(provider: Arc<StubProvider>, config: RagConfig) -> EmbeddingClient {
        EmbeddingClient::new(&config, provider)
    }

    #[tokio::test]
    async fn test_second_embed_hits_cache() {
        let provider = Arc::new(StubProvider::new(4));
        let client = client_with(provider.clone(), RagConfig::default());

        let texts = vec!["hello".to_string()];
        let first = client.embed(&texts).await;
        assert!(first[0].is_ok());
        assert!(!first[0].from_cache);

        let second = client.embed(&texts).await;
        assert!(second[0].from_cache);
        assert_eq!(second[0].vector, first[0].vector);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_batch_is_isolated() {
        let provider = Arc::new(StubProvider {
            dimension: 4,
            calls: AtomicUsize::new(0),
            fail_batch: Some(1),
            max_batch: 2,
        });
        let config = RagConfig {
            embed_batch_size: 2,
            embed_workers: 1,
            ..RagConfig::default()
        };
        let client = client_with(provider.clone(), config);

        let texts: Vec<String> = (0..6).map(|i| format!("text number {}", i)).collect();
        let outcomes = client.embed(&texts).await;

        let ok = outcomes.iter().filter(|o| o.is_ok()).count();
        let failed: Vec<&EmbeddingOutcome> =
            outcomes.iter().filter(|o| o.error.is_some()).collect();

        assert_eq!(ok, 4);
        assert_eq!(failed.len(), 2);
        assert_eq!(failed[0].index, 2);
        assert_eq!(failed[1].index, 3);
        for outcome in failed {
            assert!(outcome.error.as_deref().unwrap().contains("simulated outage"));
        }
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_dimension_mismatch_reported() {
        struct ShortProvider;

        #[async_trait]
        impl EmbeddingProvider for ShortProvider {
            async fn embed_batch(
                &self,
                texts: &[String],
            ) -> Result<Vec<Vec<f32>>, EmbeddingError> {
                Ok(texts.iter().map(|_| vec![1.0, 2.0]).collect())
            }

            fn dimension(&self) -> usize {
                4
            }

            fn model_name(&self) -> &str {
                "short-embedder"
            }
        }

        let client = EmbeddingClient::new(&RagConfig::default(), Arc::new(ShortProvider));
        let outcomes = client.embed(&["abc".to_string()]).await;

        assert!(!outcomes[0].is_ok());
        assert!(outcomes[0]
            .error
            .as_deref()
            .unwrap()
            .contains("does not match expected"));
        // Rejected vectors never reach the cache
        assert_eq!(client.cache_len().await, 0);
    }

    #[tokio::test]
    async fn test_empty_input() {
        let client = client_with(Arc::new(StubProvider::new(4)), RagConfig::default());
        assert!(client.embed(&[]).await.is_empty());
    }

    #[tokio::test]
    async fn test_estimate_cost() {
        let client = client_with(Arc::new(StubProvider::new(4)), RagConfig::default());
        let estimate = client.estimate_cost(&[4000, 4000]);

        assert_eq!(estimate.estimated_tokens, 2000);
        let expected = 2000.0 / 1000.0 * RagConfig::default().price_per_1k_tokens_usd;
        assert!((estimate.estimated_cost_usd - expected).abs() < 1e-12);
    }
}
