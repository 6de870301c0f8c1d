use std::sync::Arc;

use assay_core::config::RetrievalConfig;
use assay_core::domain::evidence::ScoredDocument;
use assay_core::errors::CollaboratorError;
use tracing::debug;

use crate::cache::EvidenceCache;
use crate::collaborators::VectorStore;

pub struct EvidenceRetriever {
    store: Arc<dyn VectorStore>,
    cache: Arc<EvidenceCache>,
    config: RetrievalConfig,
}

impl EvidenceRetriever {
    pub fn new(
        store: Arc<dyn VectorStore>,
        cache: Arc<EvidenceCache>,
        config: RetrievalConfig,
    ) -> Self {
        Self { store, cache, config }
    }

    /// Candidates fetched for a complexity on a 1-based attempt. Each replan
    /// widens the fetch.
    pub fn breadth(&self, complexity: u8, attempt: u32) -> usize {
        self.config.breadth_for(complexity).saturating_mul(attempt.max(1) as usize)
    }

    /// Documents at or above the minimum retrieval score, best first, not
    /// yet re-ranked. No candidates is a valid, empty result.
    pub async fn retrieve(
        &self,
        query: &str,
        complexity: u8,
        attempt: u32,
    ) -> Result<Vec<ScoredDocument>, CollaboratorError> {
        let breadth = self.breadth(complexity, attempt);
        let key = EvidenceCache::key(query, breadth);
        if let Some(cached) = self.cache.get(&key) {
            debug!(
                event_name = "retrieval.cache.hit",
                breadth,
                documents = cached.len(),
                "evidence served from cache"
            );
            return Ok(cached);
        }

        let hits = self.store.search(query, breadth).await?;
        let candidates = hits.len();
        let mut documents: Vec<ScoredDocument> = hits
            .into_iter()
            .filter(|hit| hit.score.is_finite() && hit.score >= self.config.min_score)
            .map(|hit| {
                let mut document =
                    ScoredDocument::new(hit.id, hit.content, hit.source, hit.score);
                document.metadata = hit.metadata;
                document
            })
            .collect();
        documents.sort_by(|left, right| {
            right
                .retrieval_score
                .total_cmp(&left.retrieval_score)
                .then_with(|| left.id.cmp(&right.id))
        });

        debug!(
            event_name = "retrieval.completed",
            breadth,
            candidates,
            kept = documents.len(),
            min_score = self.config.min_score,
            "evidence retrieved"
        );
        self.cache.insert(key, documents.clone());
        Ok(documents)
    }
}
