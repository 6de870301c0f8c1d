//! Score combination for evidence re-ranking and overall run confidence

use serde::{Deserialize, Serialize};

use crate::domain::evidence::ScoredDocument;

/// Per-factor floor for re-ranking. Keeps `ln` finite while still letting a
/// near-zero factor sink the combined score.
pub const RERANK_FACTOR_FLOOR: f64 = 1e-6;
/// Per-factor floor for overall confidence.
pub const OVERALL_FACTOR_FLOOR: f64 = 0.01;
/// Quality assumed for a source nothing is known about.
pub const UNKNOWN_SOURCE_QUALITY: f64 = 0.6;

/// Weights for the re-ranking geometric mean
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RerankWeights {
    /// Weight for the retrieval score (default: 0.40)
    pub retrieval: f64,
    /// Weight for query/document semantic similarity (default: 0.40)
    pub similarity: f64,
    /// Weight for source quality (default: 0.20)
    pub quality: f64,
}

impl Default for RerankWeights {
    fn default() -> Self {
        Self { retrieval: 0.4, similarity: 0.4, quality: 0.2 }
    }
}

impl RerankWeights {
    pub fn is_valid(&self) -> bool {
        valid_weights(&[self.retrieval, self.similarity, self.quality])
    }
}

/// Weights for combining stage confidences into one raw overall value
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverallWeights {
    /// Weight for retrieval confidence (default: 0.35)
    pub retrieval: f64,
    /// Weight for generation confidence (default: 0.25)
    pub generation: f64,
    /// Weight for the evaluator's raw overall (default: 0.40)
    pub evaluation: f64,
}

impl Default for OverallWeights {
    fn default() -> Self {
        Self { retrieval: 0.35, generation: 0.25, evaluation: 0.40 }
    }
}

impl OverallWeights {
    pub fn is_valid(&self) -> bool {
        valid_weights(&[self.retrieval, self.generation, self.evaluation])
    }
}

fn valid_weights(weights: &[f64]) -> bool {
    weights.iter().all(|weight| weight.is_finite() && *weight >= 0.0)
        && weights.iter().sum::<f64>() > 0.0
}

/// `exp(Σ wᵢ·ln(max(vᵢ, floor)) / Σ wᵢ)`. Returns 0 when no weight is
/// positive.
pub fn weighted_geometric_mean(factors: &[(f64, f64)], floor: f64) -> f64 {
    let total_weight: f64 = factors.iter().map(|(_, weight)| weight.max(0.0)).sum();
    if total_weight <= 0.0 {
        return 0.0;
    }
    let log_sum: f64 = factors
        .iter()
        .map(|(value, weight)| {
            let value = if value.is_nan() { floor } else { value.clamp(floor, 1.0) };
            weight.max(0.0) * value.ln()
        })
        .sum();
    (log_sum / total_weight).exp().clamp(0.0, 1.0)
}

pub fn combined_confidence(
    retrieval: f64,
    similarity: f64,
    quality: f64,
    weights: &RerankWeights,
) -> f64 {
    weighted_geometric_mean(
        &[
            (retrieval, weights.retrieval),
            (similarity, weights.similarity),
            (quality, weights.quality),
        ],
        RERANK_FACTOR_FLOOR,
    )
}

pub fn overall_raw_confidence(
    retrieval: f64,
    generation: f64,
    evaluation: f64,
    weights: &OverallWeights,
) -> f64 {
    weighted_geometric_mean(
        &[
            (retrieval, weights.retrieval),
            (generation, weights.generation),
            (evaluation, weights.evaluation),
        ],
        OVERALL_FACTOR_FLOOR,
    )
}

/// Declared `quality` metadata wins; otherwise the source name is graded.
pub fn source_quality(document: &ScoredDocument) -> f64 {
    document.declared_quality().unwrap_or_else(|| source_quality_heuristic(&document.source))
}

fn source_quality_heuristic(source: &str) -> f64 {
    let source = source.to_ascii_lowercase();
    let has_any = |needles: &[&str]| needles.iter().any(|needle| source.contains(needle));

    if has_any(&["encyclopedia", "wikipedia", "reference", "official", ".gov", ".edu", "journal"])
        || has_any(&["handbook", "textbook", "docs", "documentation", "standard"])
    {
        0.9
    } else if has_any(&["news", "report", "paper"]) {
        0.75
    } else if has_any(&["blog", "medium.com", "newsletter"]) {
        0.5
    } else if has_any(&["forum", "reddit", "comment", "social", "anonymous"]) {
        0.35
    } else {
        UNKNOWN_SOURCE_QUALITY
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{
        combined_confidence, overall_raw_confidence, source_quality, weighted_geometric_mean,
        OverallWeights, RerankWeights, UNKNOWN_SOURCE_QUALITY,
    };
    use crate::domain::evidence::ScoredDocument;

    #[test]
    fn equal_factors_return_the_factor() {
        let score = combined_confidence(0.7, 0.7, 0.7, &RerankWeights::default());
        assert!((score - 0.7).abs() < 1e-12);
    }

    #[test]
    fn near_zero_factor_cannot_be_rescued() {
        let weights = RerankWeights::default();
        let weak = combined_confidence(0.99, 0.0, 0.99, &weights);
        let arithmetic = 0.4 * 0.99 + 0.4 * 0.0 + 0.2 * 0.99;
        assert!(weak < 0.01);
        assert!(weak < arithmetic);
    }

    #[test]
    fn geometric_mean_is_monotone_in_each_factor() {
        let weights = RerankWeights::default();
        let base = combined_confidence(0.8, 0.6, 0.6, &weights);
        assert!(combined_confidence(0.9, 0.6, 0.6, &weights) > base);
        assert!(combined_confidence(0.8, 0.7, 0.6, &weights) > base);
        assert!(combined_confidence(0.8, 0.6, 0.7, &weights) > base);
    }

    #[test]
    fn zero_weights_yield_zero() {
        assert_eq!(weighted_geometric_mean(&[(0.9, 0.0), (0.8, 0.0)], 1e-6), 0.0);
        assert!(!RerankWeights { retrieval: 0.0, similarity: 0.0, quality: 0.0 }.is_valid());
        assert!(OverallWeights::default().is_valid());
    }

    #[test]
    fn overall_floor_keeps_missing_retrieval_low_but_nonzero() {
        let overall = overall_raw_confidence(0.0, 0.98, 0.74, &OverallWeights::default());
        assert!(overall > 0.0);
        assert!(overall < 0.25);
    }

    #[test]
    fn source_quality_prefers_metadata_then_source_name() {
        let declared =
            ScoredDocument::new("a", "c", "forum", 0.9).with_metadata("quality", json!(0.95));
        assert_eq!(source_quality(&declared), 0.95);

        assert_eq!(source_quality(&ScoredDocument::new("b", "c", "Encyclopedia", 0.9)), 0.9);
        assert!(source_quality(&ScoredDocument::new("c", "c", "reddit thread", 0.9)) < 0.5);
        assert_eq!(
            source_quality(&ScoredDocument::new("d", "c", "corpus-17", 0.9)),
            UNKNOWN_SOURCE_QUALITY
        );
    }
}
