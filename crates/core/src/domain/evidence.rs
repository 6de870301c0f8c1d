use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Evidence returned by retrieval. `combined_confidence_score` stays `None`
/// until the re-ranker has scored the document.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScoredDocument {
    pub id: String,
    pub content: String,
    pub source: String,
    pub retrieval_score: f64,
    pub combined_confidence_score: Option<f64>,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

impl ScoredDocument {
    pub fn new(
        id: impl Into<String>,
        content: impl Into<String>,
        source: impl Into<String>,
        retrieval_score: f64,
    ) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            source: source.into(),
            retrieval_score: retrieval_score.clamp(0.0, 1.0),
            combined_confidence_score: None,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn is_ranked(&self) -> bool {
        self.combined_confidence_score.is_some()
    }

    /// Combined score when ranked, otherwise the raw retrieval score.
    pub fn effective_score(&self) -> f64 {
        self.combined_confidence_score.unwrap_or(self.retrieval_score)
    }

    /// Explicit `quality` metadata in `[0, 1]`, if the source provided one.
    pub fn declared_quality(&self) -> Option<f64> {
        self.metadata.get("quality").and_then(Value::as_f64).map(|value| value.clamp(0.0, 1.0))
    }
}

/// Mean combined score of the top three documents; zero for no evidence.
pub fn retrieval_confidence(documents: &[ScoredDocument]) -> f64 {
    let top: Vec<f64> = documents.iter().take(3).map(ScoredDocument::effective_score).collect();
    if top.is_empty() {
        return 0.0;
    }
    (top.iter().sum::<f64>() / top.len() as f64).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{retrieval_confidence, ScoredDocument};

    #[test]
    fn new_documents_are_unranked_and_clamped() {
        let document = ScoredDocument::new("d1", "content", "wiki", 1.4);
        assert!(!document.is_ranked());
        assert_eq!(document.retrieval_score, 1.0);
    }

    #[test]
    fn declared_quality_is_read_from_metadata() {
        let document =
            ScoredDocument::new("d1", "content", "wiki", 0.9).with_metadata("quality", json!(0.85));
        assert_eq!(document.declared_quality(), Some(0.85));
        assert_eq!(ScoredDocument::new("d2", "c", "s", 0.9).declared_quality(), None);
    }

    #[test]
    fn retrieval_confidence_averages_top_three() {
        assert_eq!(retrieval_confidence(&[]), 0.0);

        let mut documents: Vec<ScoredDocument> = [0.9, 0.8, 0.7, 0.1]
            .iter()
            .enumerate()
            .map(|(index, score)| ScoredDocument::new(format!("d{index}"), "c", "s", *score))
            .collect();
        for document in &mut documents {
            document.combined_confidence_score = Some(document.retrieval_score);
        }
        assert!((retrieval_confidence(&documents) - 0.8).abs() < 1e-9);
    }
}
