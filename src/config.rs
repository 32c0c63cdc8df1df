use serde::{Deserialize, Serialize};

/// Pipeline-wide configuration.
///
/// Constructed once at process start and passed by handle into the
/// orchestrator, embedding client and generator. Provider swapping is a
/// constructor-time decision; there is no global provider state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagConfig {
    /// Maximum chunk size in characters
    pub chunk_size: usize,
    /// Overlap between chunks in characters (fixed strategy only)
    pub chunk_overlap: usize,
    /// Chunks shorter than this (after trim) are discarded
    pub min_chunk_chars: usize,
    /// Chunks with fewer words than this are discarded
    pub min_chunk_words: usize,

    /// Maximum texts per outbound embedding call
    pub embed_batch_size: usize,
    /// Concurrent embedding batch workers
    pub embed_workers: usize,
    /// Embedding cache entry ceiling before eviction kicks in
    pub embed_cache_max_entries: usize,
    /// Outbound embedding call ceiling per sliding minute
    pub embed_calls_per_minute: usize,
    /// Outbound embedding call ceiling per sliding hour
    pub embed_calls_per_hour: usize,

    /// Chat-completion call ceiling per minute
    pub generation_calls_per_minute: usize,
    /// Maximum retrieved chunks assembled into the generation context
    pub context_chunk_limit: usize,
    pub max_answer_tokens: u32,
    pub answer_temperature: f32,
    pub summary_temperature: f32,

    /// Default number of neighbors requested per retrieval
    pub default_top_k: usize,
    /// Default minimum similarity for a retrieval result
    pub default_similarity_threshold: f32,

    /// Advisory embedding price per 1000 tokens
    pub price_per_1k_tokens_usd: f64,

    /// When false, queries skip retrieval and fall back to direct generation
    pub retrieval_enabled: bool,
    /// Fixed confidence attached to degraded-mode answers
    pub degraded_confidence: f32,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            chunk_size: 512,
            chunk_overlap: 50,
            min_chunk_chars: 10,
            min_chunk_words: 2,
            embed_batch_size: 100,
            embed_workers: 4,
            embed_cache_max_entries: 10_000,
            embed_calls_per_minute: 60,
            embed_calls_per_hour: 1000,
            generation_calls_per_minute: 50,
            context_chunk_limit: 5,
            max_answer_tokens: 1024,
            answer_temperature: 0.7,
            summary_temperature: 0.3,
            default_top_k: 5,
            default_similarity_threshold: 0.3,
            price_per_1k_tokens_usd: 0.0001,
            retrieval_enabled: true,
            degraded_confidence: 0.5,
        }
    }
}

impl RagConfig {
    /// Create configuration from environment variables, falling back to
    /// defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            chunk_size: env_parse("CHUNK_SIZE", defaults.chunk_size),
            chunk_overlap: env_parse("CHUNK_OVERLAP", defaults.chunk_overlap),
            min_chunk_chars: env_parse("MIN_CHUNK_CHARS", defaults.min_chunk_chars),
            min_chunk_words: env_parse("MIN_CHUNK_WORDS", defaults.min_chunk_words),
            embed_batch_size: env_parse("EMBED_BATCH_SIZE", defaults.embed_batch_size),
            embed_workers: env_parse("EMBED_WORKERS", defaults.embed_workers),
            embed_cache_max_entries: env_parse(
                "EMBED_CACHE_MAX_ENTRIES",
                defaults.embed_cache_max_entries,
            ),
            embed_calls_per_minute: env_parse(
                "EMBED_CALLS_PER_MINUTE",
                defaults.embed_calls_per_minute,
            ),
            embed_calls_per_hour: env_parse("EMBED_CALLS_PER_HOUR", defaults.embed_calls_per_hour),
            generation_calls_per_minute: env_parse(
                "GENERATION_CALLS_PER_MINUTE",
                defaults.generation_calls_per_minute,
            ),
            context_chunk_limit: env_parse("CONTEXT_CHUNK_LIMIT", defaults.context_chunk_limit),
            max_answer_tokens: env_parse("MAX_ANSWER_TOKENS", defaults.max_answer_tokens),
            answer_temperature: env_parse("ANSWER_TEMPERATURE", defaults.answer_temperature),
            summary_temperature: env_parse("SUMMARY_TEMPERATURE", defaults.summary_temperature),
            default_top_k: env_parse("RAG_TOP_K", defaults.default_top_k),
            default_similarity_threshold: env_parse(
                "RAG_SIMILARITY_THRESHOLD",
                defaults.default_similarity_threshold,
            ),
            price_per_1k_tokens_usd: env_parse(
                "EMBED_PRICE_PER_1K_TOKENS_USD",
                defaults.price_per_1k_tokens_usd,
            ),
            retrieval_enabled: env_parse("RAG_RETRIEVAL_ENABLED", defaults.retrieval_enabled),
            degraded_confidence: env_parse("RAG_DEGRADED_CONFIDENCE", defaults.degraded_confidence),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RagConfig::default();
        assert_eq!(config.chunk_size, 512);
        assert_eq!(config.context_chunk_limit, 5);
        assert!(config.retrieval_enabled);
    }

    #[test]
    fn test_env_parse_fallback() {
        assert_eq!(env_parse("TALENTRAG_TEST_UNSET_VAR", 42usize), 42);
    }
}
