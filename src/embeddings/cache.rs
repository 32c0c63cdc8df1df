use std::collections::HashMap;

use tracing::debug;

#[derive(Debug, Clone)]
struct CacheEntry {
    vector: Vec<f32>,
    /// Monotonic insertion counter, used as the eviction ordering key
    seq: u64,
}

/// In-memory embedding cache keyed by `md5(model + text)`.
///
/// Once entries exceed the configured ceiling, the oldest 20% (by insertion
/// order) are evicted in one pass.
pub struct EmbeddingCache {
    entries: HashMap<String, CacheEntry>,
    max_entries: usize,
    next_seq: u64,
}

impl EmbeddingCache {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: HashMap::new(),
            max_entries: max_entries.max(1),
            next_seq: 0,
        }
    }

    /// Cache key for a (model, text) pair
    pub fn key(model: &str, text: &str) -> String {
        let mut input = Vec::with_capacity(model.len() + text.len() + 1);
        input.extend_from_slice(model.as_bytes());
        input.push(0);
        input.extend_from_slice(text.as_bytes());
        format!("{:x}", md5::compute(input))
    }

    pub fn get(&self, key: &str) -> Option<Vec<f32>> {
        self.entries.get(key).map(|entry| entry.vector.clone())
    }

    pub fn insert(&mut self, key: String, vector: Vec<f32>) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.insert(key, CacheEntry { vector, seq });

        if self.entries.len() > self.max_entries {
            self.evict_oldest();
        }
    }

    fn evict_oldest(&mut self) {
        let evict_count = (self.entries.len() / 5).max(1);

        let mut ordered: Vec<(u64, String)> = self
            .entries
            .iter()
            .map(|(key, entry)| (entry.seq, key.clone()))
            .collect();
        ordered.sort_unstable_by_key(|(seq, _)| *seq);

        for (_, key) in ordered.into_iter().take(evict_count) {
            self.entries.remove(&key);
        }

        debug!(
            "Evicted {} embedding cache entries ({} remain)",
            evict_count,
            self.entries.len()
        );
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_depends_on_model_and_text() {
        let a = EmbeddingCache::key("model-a", "hello");
        let b = EmbeddingCache::key("model-b", "hello");
        let c = EmbeddingCache::key("model-a", "world");
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_eq!(a, EmbeddingCache::key("model-a", "hello"));
    }

    #[test]
    fn test_get_and_insert() {
        let mut cache = EmbeddingCache::new(10);
        let key = EmbeddingCache::key("m", "text");
        assert!(cache.get(&key).is_none());

        cache.insert(key.clone(), vec![0.1, 0.2]);
        assert_eq!(cache.get(&key), Some(vec![0.1, 0.2]));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_eviction_removes_oldest_fifth() {
        let mut cache = EmbeddingCache::new(10);
        for i in 0..11 {
            cache.insert(format!("key-{}", i), vec![i as f32]);
        }

        // Ceiling was exceeded at the 11th insert; the oldest 20% (2 of 11)
        // are gone and the most recent entries survive
        assert_eq!(cache.len(), 9);
        assert!(cache.get("key-0").is_none());
        assert!(cache.get("key-1").is_none());
        assert!(cache.get("key-2").is_some());
        assert!(cache.get("key-10").is_some());
    }
}
