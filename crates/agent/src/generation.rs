//! Response generation
//!
//! Builds a prompt whose context labels every evidence passage with its
//! confidence band, calls the generation service and turns whatever signals
//! come back into a [`GenerationResult`].

use std::fmt::Write as _;
use std::sync::Arc;

use assay_core::config::GenerationConfig;
use assay_core::confidence::ConfidenceExtractor;
use assay_core::domain::confidence::GenerationResult;
use assay_core::domain::evidence::ScoredDocument;
use assay_core::errors::CollaboratorError;
use tracing::debug;

use crate::collaborators::GenerationService;

const INSTRUCTIONS: &str = "Answer the question using only the context below. \
Prefer passages with higher confidence and say so when the context is insufficient.";

pub fn confidence_band(score: f64) -> &'static str {
    if score >= 0.8 {
        "HIGH"
    } else if score >= 0.6 {
        "MEDIUM"
    } else {
        "LOW"
    }
}

pub struct ResponseGenerator {
    service: Arc<dyn GenerationService>,
    extractor: ConfidenceExtractor,
    config: GenerationConfig,
}

impl ResponseGenerator {
    pub fn new(service: Arc<dyn GenerationService>, config: GenerationConfig) -> Self {
        Self { service, extractor: ConfidenceExtractor, config }
    }

    /// Prompt with the question, up to `context_documents` ranked passages as
    /// `[n] (BAND score, source) text` lines, then any capability notes.
    pub fn build_prompt(
        &self,
        query: &str,
        documents: &[ScoredDocument],
        capability_notes: &[String],
    ) -> String {
        let mut prompt = format!("{INSTRUCTIONS}\n\nQuestion: {}\n\nContext:\n", query.trim());
        for (index, document) in documents.iter().take(self.config.context_documents).enumerate() {
            let score = document.effective_score();
            let passage = document.content.split_whitespace().collect::<Vec<_>>().join(" ");
            let _ = writeln!(
                prompt,
                "[{}] ({} {score:.2}, {}) {passage}",
                index + 1,
                confidence_band(score),
                document.source,
            );
        }

        if !capability_notes.is_empty() {
            prompt.push_str("\nCapability notes:\n");
            for note in capability_notes {
                let _ = writeln!(prompt, "- {}", note.trim());
            }
        }
        prompt.push_str("\nAnswer:");
        prompt
    }

    pub async fn generate(
        &self,
        query: &str,
        documents: &[ScoredDocument],
        capability_notes: &[String],
        attempt: u32,
    ) -> Result<GenerationResult, CollaboratorError> {
        let prompt = self.build_prompt(query, documents, capability_notes);
        let temperature = self.config.temperature_for_attempt(attempt);
        let output = self.service.generate(&prompt, temperature).await?;

        let result = self.extractor.extract(
            &output.text,
            output.tokens.as_deref(),
            output.log_probabilities.as_deref(),
        );
        debug!(
            event_name = "generation.completed",
            attempt,
            temperature,
            confidence = result.aggregated_confidence,
            source = ?result.confidence_source,
            markers = result.uncertainty_markers.len(),
            "answer generated"
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use assay_core::config::AssayConfig;
    use assay_core::domain::confidence::ConfidenceSource;
    use assay_core::domain::evidence::ScoredDocument;
    use assay_core::errors::CollaboratorError;
    use async_trait::async_trait;
    use tokio::sync::Mutex;

    use super::{confidence_band, ResponseGenerator};
    use crate::collaborators::{GenerationOutput, GenerationService};

    #[derive(Default)]
    struct RecordingService {
        output: GenerationOutput,
        calls: Mutex<Vec<(String, f64)>>,
    }

    #[async_trait]
    impl GenerationService for RecordingService {
        async fn generate(
            &self,
            prompt: &str,
            temperature: f64,
        ) -> Result<GenerationOutput, CollaboratorError> {
            self.calls.lock().await.push((prompt.to_string(), temperature));
            Ok(self.output.clone())
        }
    }

    fn ranked(id: &str, content: &str, score: f64) -> ScoredDocument {
        let mut document = ScoredDocument::new(id, content, "encyclopedia", score);
        document.combined_confidence_score = Some(score);
        document
    }

    #[test]
    fn bands_follow_tier_boundaries() {
        assert_eq!(confidence_band(0.93), "HIGH");
        assert_eq!(confidence_band(0.8), "HIGH");
        assert_eq!(confidence_band(0.6), "MEDIUM");
        assert_eq!(confidence_band(0.59), "LOW");
    }

    #[test]
    fn prompt_labels_and_limits_context() {
        let mut config = AssayConfig::default().generation;
        config.context_documents = 2;
        let generator = ResponseGenerator::new(Arc::new(RecordingService::default()), config);

        let documents = vec![
            ranked("a", "Water boils at\n100 degrees.", 0.93),
            ranked("b", "Pressure matters.", 0.65),
            ranked("c", "Unrelated.", 0.3),
        ];
        let prompt = generator.build_prompt(
            "Boiling point of water?",
            &documents,
            &["research: focus on boiling, water.".to_string()],
        );

        assert!(prompt.contains("Question: Boiling point of water?"));
        assert!(prompt.contains("[1] (HIGH 0.93, encyclopedia) Water boils at 100 degrees."));
        assert!(prompt.contains("[2] (MEDIUM 0.65, encyclopedia) Pressure matters."));
        assert!(!prompt.contains("Unrelated."));
        assert!(prompt.contains("- research: focus on boiling, water."));
        assert!(prompt.ends_with("Answer:"));
    }

    #[tokio::test]
    async fn replans_lower_the_temperature() {
        let service = Arc::new(RecordingService {
            output: GenerationOutput::text_only("Water boils at 100 degrees Celsius."),
            ..Default::default()
        });
        let generator = ResponseGenerator::new(
            Arc::clone(&service) as Arc<dyn GenerationService>,
            AssayConfig::default().generation,
        );

        generator.generate("q", &[], &[], 1).await.expect("generation succeeds");
        generator.generate("q", &[], &[], 2).await.expect("generation succeeds");

        let calls = service.calls.lock().await;
        assert!((calls[0].1 - 0.7).abs() < 1e-9);
        assert!((calls[1].1 - 0.525).abs() < 1e-9);
    }

    #[tokio::test]
    async fn log_probabilities_drive_token_confidence() {
        let service = RecordingService {
            output: GenerationOutput {
                text: "Water boils.".to_string(),
                tokens: Some(vec!["Water".to_string(), "boils".to_string()]),
                log_probabilities: Some(vec![-0.05, -0.1]),
            },
            ..Default::default()
        };
        let generator =
            ResponseGenerator::new(Arc::new(service), AssayConfig::default().generation);

        let result = generator.generate("q", &[], &[], 1).await.expect("generation succeeds");
        assert_eq!(result.confidence_source, ConfidenceSource::TokenLogprobs);
        assert_eq!(result.token_confidences.len(), 2);
        assert_eq!(result.token_confidences[0].token, "Water");
        assert!(result.aggregated_confidence > 0.9 && result.aggregated_confidence < 0.96);
    }
}
