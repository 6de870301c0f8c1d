//! Caches shared across queries: retrieval results and similarity scores.
//!
//! Both are bounded LRU caches safe for concurrent read and insert. Keys are
//! blake3 digests of the normalized inputs.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use assay_core::config::{AssayConfig, RerankingConfig, RetrievalConfig};
use assay_core::domain::evidence::ScoredDocument;
use moka::policy::EvictionPolicy;
use moka::sync::Cache;
use serde::Serialize;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub entries: u64,
    pub hits: u64,
    pub misses: u64,
}

/// Digest of the parts after trimming and lowercasing each one.
pub fn cache_key(parts: &[&str]) -> String {
    let mut hasher = blake3::Hasher::new();
    for part in parts {
        hasher.update(part.trim().to_lowercase().as_bytes());
        hasher.update(&[0x1f]);
    }
    hasher.finalize().to_hex().to_string()
}

struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
}

impl Counters {
    fn new() -> Self {
        Self { hits: AtomicU64::new(0), misses: AtomicU64::new(0) }
    }

    fn record<T>(&self, found: Option<T>) -> Option<T> {
        let counter = if found.is_some() { &self.hits } else { &self.misses };
        counter.fetch_add(1, Ordering::Relaxed);
        found
    }

    fn stats(&self, entries: u64) -> CacheStats {
        CacheStats {
            entries,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

/// Query text plus breadth to the filtered retrieval result.
pub struct EvidenceCache {
    cache: Cache<String, Vec<ScoredDocument>>,
    counters: Counters,
}

impl EvidenceCache {
    pub fn new(max_entries: u64, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_entries)
            .eviction_policy(EvictionPolicy::lru())
            .time_to_live(ttl)
            .build();
        Self { cache, counters: Counters::new() }
    }

    pub fn from_config(config: &RetrievalConfig) -> Self {
        Self::new(config.cache_capacity, Duration::from_secs(config.cache_ttl_secs.max(1)))
    }

    pub fn key(query: &str, breadth: usize) -> String {
        cache_key(&[query, &breadth.to_string()])
    }

    pub fn get(&self, key: &str) -> Option<Vec<ScoredDocument>> {
        self.counters.record(self.cache.get(key))
    }

    pub fn insert(&self, key: String, documents: Vec<ScoredDocument>) {
        self.cache.insert(key, documents);
    }

    pub fn stats(&self) -> CacheStats {
        self.cache.run_pending_tasks();
        self.counters.stats(self.cache.entry_count())
    }
}

/// Query/document pair to similarity score.
pub struct SimilarityCache {
    cache: Cache<String, f64>,
    counters: Counters,
}

impl SimilarityCache {
    pub fn new(max_entries: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_entries)
            .eviction_policy(EvictionPolicy::lru())
            .build();
        Self { cache, counters: Counters::new() }
    }

    pub fn from_config(config: &RerankingConfig) -> Self {
        Self::new(config.similarity_cache_capacity)
    }

    pub fn key(left: &str, right: &str) -> String {
        cache_key(&[left, right])
    }

    pub fn get(&self, key: &str) -> Option<f64> {
        self.counters.record(self.cache.get(key))
    }

    pub fn insert(&self, key: String, similarity: f64) {
        self.cache.insert(key, similarity);
    }

    pub fn stats(&self) -> CacheStats {
        self.cache.run_pending_tasks();
        self.counters.stats(self.cache.entry_count())
    }
}

/// The caches one process shares between all of its queries.
#[derive(Clone)]
pub struct SharedCaches {
    pub evidence: Arc<EvidenceCache>,
    pub similarity: Arc<SimilarityCache>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CacheReport {
    pub evidence: CacheStats,
    pub similarity: CacheStats,
}

impl SharedCaches {
    pub fn from_config(config: &AssayConfig) -> Self {
        Self {
            evidence: Arc::new(EvidenceCache::from_config(&config.retrieval)),
            similarity: Arc::new(SimilarityCache::from_config(&config.reranking)),
        }
    }

    pub fn report(&self) -> CacheReport {
        CacheReport { evidence: self.evidence.stats(), similarity: self.similarity.stats() }
    }
}
