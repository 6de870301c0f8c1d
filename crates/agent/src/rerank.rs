use std::sync::Arc;

use assay_core::domain::evidence::ScoredDocument;
use assay_core::scoring::{combined_confidence, source_quality, RerankWeights};
use assay_core::text::lexical_similarity;
use futures::future::join_all;
use tracing::warn;

use crate::cache::SimilarityCache;
use crate::collaborators::SimilarityService;

pub struct Reranker {
    similarity: Arc<dyn SimilarityService>,
    cache: Arc<SimilarityCache>,
    weights: RerankWeights,
}

impl Reranker {
    pub fn new(
        similarity: Arc<dyn SimilarityService>,
        cache: Arc<SimilarityCache>,
        weights: RerankWeights,
    ) -> Self {
        Self { similarity, cache, weights }
    }

    /// Sets `combined_confidence_score` on every document and sorts them
    /// best first. Similarity lookups run concurrently.
    pub async fn rerank(&self, query: &str, documents: Vec<ScoredDocument>) -> Vec<ScoredDocument> {
        let similarities =
            join_all(documents.iter().map(|document| self.similarity_for(query, document))).await;
        self.apply(documents, similarities)
    }

    /// Re-ranks with lexical similarity only, without calling the service.
    pub fn rerank_lexical(
        &self,
        query: &str,
        documents: Vec<ScoredDocument>,
    ) -> Vec<ScoredDocument> {
        let similarities = documents
            .iter()
            .map(|document| lexical_similarity(query, &document.content))
            .collect();
        self.apply(documents, similarities)
    }

    fn apply(
        &self,
        mut documents: Vec<ScoredDocument>,
        similarities: Vec<f64>,
    ) -> Vec<ScoredDocument> {
        for (document, similarity) in documents.iter_mut().zip(similarities) {
            let quality = source_quality(document);
            document.combined_confidence_score = Some(combined_confidence(
                document.retrieval_score,
                similarity,
                quality,
                &self.weights,
            ));
        }
        sort_ranked(&mut documents);
        documents
    }

    async fn similarity_for(&self, query: &str, document: &ScoredDocument) -> f64 {
        let key = SimilarityCache::key(query, &document.content);
        if let Some(cached) = self.cache.get(&key) {
            return cached;
        }

        match self.similarity.similarity(query, &document.content).await {
            Ok(value) => {
                let value = if value.is_nan() { 0.0 } else { value.clamp(0.0, 1.0) };
                self.cache.insert(key, value);
                value
            }
            Err(error) => {
                warn!(
                    event_name = "rerank.similarity.fallback",
                    document_id = %document.id,
                    error = %error,
                    "similarity service failed, using lexical similarity"
                );
                lexical_similarity(query, &document.content)
            }
        }
    }
}

/// Combined score descending, then retrieval score, then id.
pub fn sort_ranked(documents: &mut [ScoredDocument]) {
    documents.sort_by(|left, right| {
        right
            .effective_score()
            .total_cmp(&left.effective_score())
            .then_with(|| right.retrieval_score.total_cmp(&left.retrieval_score))
            .then_with(|| left.id.cmp(&right.id))
    });
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use assay_core::domain::evidence::ScoredDocument;
    use assay_core::errors::CollaboratorError;
    use assay_core::scoring::RerankWeights;
    use async_trait::async_trait;
    use serde_json::json;
    use tokio::sync::Mutex;

    use super::Reranker;
    use crate::cache::SimilarityCache;
    use crate::collaborators::SimilarityService;

    struct ScriptedSimilarity {
        scores: HashMap<String, f64>,
        calls: Mutex<usize>,
    }

    #[async_trait]
    impl SimilarityService for ScriptedSimilarity {
        async fn similarity(&self, _left: &str, right: &str) -> Result<f64, CollaboratorError> {
            *self.calls.lock().await += 1;
            self.scores.get(right).copied().ok_or_else(|| CollaboratorError::Unavailable {
                service: "similarity".to_string(),
                message: "no score scripted".to_string(),
            })
        }
    }

    fn reranker(scores: &[(&str, f64)]) -> (Reranker, Arc<ScriptedSimilarity>) {
        let service = Arc::new(ScriptedSimilarity {
            scores: scores.iter().map(|(text, score)| ((*text).to_string(), *score)).collect(),
            calls: Mutex::new(0),
        });
        let reranker = Reranker::new(
            Arc::clone(&service) as Arc<dyn SimilarityService>,
            Arc::new(SimilarityCache::new(64)),
            RerankWeights::default(),
        );
        (reranker, service)
    }

    fn document(id: &str, content: &str, retrieval: f64, quality: f64) -> ScoredDocument {
        ScoredDocument::new(id, content, "corpus", retrieval)
            .with_metadata("quality", json!(quality))
    }

    #[tokio::test]
    async fn similarity_can_compensate_for_lower_retrieval_score() {
        let (reranker, _) = reranker(&[("on topic", 0.95), ("off topic", 0.2)]);
        let ranked = reranker
            .rerank(
                "query",
                vec![document("a", "off topic", 0.9, 0.9), document("b", "on topic", 0.8, 0.9)],
            )
            .await;

        assert_eq!(ranked[0].id, "b");
        assert!(ranked.iter().all(ScoredDocument::is_ranked));
        assert!(ranked[0].effective_score() > ranked[1].effective_score());
    }

    #[tokio::test]
    async fn equal_signals_keep_retrieval_order() {
        let (reranker, _) = reranker(&[("same", 0.8)]);
        let ranked = reranker
            .rerank(
                "query",
                vec![document("low", "same", 0.7, 0.8), document("high", "same", 0.9, 0.8)],
            )
            .await;
        assert_eq!(ranked[0].id, "high");
    }

    #[tokio::test]
    async fn failed_similarity_falls_back_to_lexical() {
        let (reranker, service) = reranker(&[]);
        let ranked = reranker
            .rerank(
                "boiling water",
                vec![document("a", "Water reaches boiling at 100 degrees.", 0.9, 0.9)],
            )
            .await;

        assert_eq!(*service.calls.lock().await, 1);
        let score = ranked[0].combined_confidence_score.expect("ranked");
        assert!(score > 0.0 && score <= 1.0);
    }

    #[tokio::test]
    async fn similarity_scores_are_cached_across_calls() {
        let (reranker, service) = reranker(&[("on topic", 0.9)]);
        for _ in 0..3 {
            reranker.rerank("query", vec![document("a", "on topic", 0.9, 0.9)]).await;
        }
        assert_eq!(*service.calls.lock().await, 1);
    }
}
