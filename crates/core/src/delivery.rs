//! Adaptive delivery: tiers, caveats and the final answer text.

use serde::{Deserialize, Serialize};

use crate::domain::confidence::{DeliveryResult, Tier};
use crate::domain::evidence::ScoredDocument;
use crate::text::sentences;

pub const VERIFICATION_CAVEAT: &str =
    "Moderate confidence: verify key facts against the listed sources.";
pub const LOW_CONFIDENCE_CAVEAT: &str =
    "Low confidence: this answer may be incomplete or inaccurate.";
pub const HUMAN_REVIEW_CAVEAT: &str = "Human review recommended.";
pub const NO_SOURCES_CAVEAT: &str = "No supporting sources were found for this answer.";
pub const UNABLE_TO_ANSWER: &str =
    "Unable to answer confidently with the information currently available.";

const MAX_LISTED_SOURCES: usize = 5;

/// Lower bounds of each tier on the calibrated overall confidence
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryThresholds {
    /// Minimum for `high` (default: 0.80)
    pub high: f64,
    /// Minimum for `medium` (default: 0.60)
    pub medium: f64,
    /// Minimum for `low` (default: 0.40)
    pub low: f64,
}

impl Default for DeliveryThresholds {
    fn default() -> Self {
        Self { high: 0.8, medium: 0.6, low: 0.4 }
    }
}

impl DeliveryThresholds {
    pub fn is_valid(&self) -> bool {
        [self.high, self.medium, self.low].iter().all(|value| (0.0..=1.0).contains(value))
            && self.low <= self.medium
            && self.medium <= self.high
    }
}

#[derive(Clone, Copy, Debug)]
pub struct DeliveryRequest<'a> {
    pub answer: &'a str,
    pub calibrated_confidence: f64,
    pub sources: &'a [ScoredDocument],
    /// Stages that failed or timed out in the delivered attempt.
    pub degraded_stages: &'a [String],
    /// Attempts or budget ran out before confidence became acceptable.
    pub forced: bool,
}

#[derive(Clone, Debug, Default)]
pub struct AdaptiveDeliveryManager {
    thresholds: DeliveryThresholds,
}

impl AdaptiveDeliveryManager {
    pub fn new(thresholds: DeliveryThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &DeliveryThresholds {
        &self.thresholds
    }

    pub fn tier_for(&self, confidence: f64) -> Tier {
        if confidence >= self.thresholds.high {
            Tier::High
        } else if confidence >= self.thresholds.medium {
            Tier::Medium
        } else if confidence >= self.thresholds.low {
            Tier::Low
        } else {
            Tier::VeryLow
        }
    }

    pub fn deliver(&self, request: &DeliveryRequest<'_>) -> DeliveryResult {
        let tier = if request.forced {
            Tier::VeryLow
        } else {
            self.tier_for(request.calibrated_confidence)
        };

        let mut caveats: Vec<String> = match tier {
            Tier::High => Vec::new(),
            Tier::Medium => vec![VERIFICATION_CAVEAT.to_owned()],
            Tier::Low => vec![LOW_CONFIDENCE_CAVEAT.to_owned(), HUMAN_REVIEW_CAVEAT.to_owned()],
            Tier::VeryLow => vec![HUMAN_REVIEW_CAVEAT.to_owned()],
        };
        if request.sources.is_empty() {
            caveats.push(NO_SOURCES_CAVEAT.to_owned());
        }
        caveats.extend(
            request
                .degraded_stages
                .iter()
                .map(|stage| format!("The {stage} stage did not complete normally.")),
        );

        let answer = request.answer.trim();
        let answer = if answer.is_empty() {
            fallback_answer(request.sources)
        } else {
            answer.to_owned()
        };

        DeliveryResult {
            formatted_text: format_answer(tier, &answer, request.sources, &caveats),
            tier,
            caveats,
        }
    }
}

/// Extractive answer from the best evidence document, used when no attempt
/// produced generated text.
pub fn fallback_answer(sources: &[ScoredDocument]) -> String {
    sources
        .iter()
        .max_by(|left, right| left.effective_score().total_cmp(&right.effective_score()))
        .and_then(|document| {
            sentences(&document.content)
                .into_iter()
                .next()
                .map(|sentence| format!("According to {}: {}", document.source, sentence))
        })
        .unwrap_or_else(|| UNABLE_TO_ANSWER.to_owned())
}

fn format_answer(
    tier: Tier,
    answer: &str,
    sources: &[ScoredDocument],
    caveats: &[String],
) -> String {
    let mut text = match tier {
        Tier::High => String::new(),
        Tier::Medium => "Based on the available sources, ".to_owned(),
        Tier::Low => "Tentatively: ".to_owned(),
        Tier::VeryLow => "Unverified: ".to_owned(),
    };
    text.push_str(answer);

    if !sources.is_empty() {
        text.push_str("\n\nSources:");
        for (index, document) in sources.iter().take(MAX_LISTED_SOURCES).enumerate() {
            text.push_str(&format!(
                "\n[{}] {} ({}, confidence {:.2})",
                index + 1,
                document.source,
                document.id,
                document.effective_score()
            ));
        }
    }

    if !caveats.is_empty() {
        text.push_str("\n\nNotes:");
        for caveat in caveats {
            text.push_str("\n- ");
            text.push_str(caveat);
        }
    }
    text
}

#[cfg(test)]
mod tests {
    use super::{
        fallback_answer, AdaptiveDeliveryManager, DeliveryRequest, DeliveryThresholds,
        UNABLE_TO_ANSWER,
    };
    use crate::domain::confidence::Tier;
    use crate::domain::evidence::ScoredDocument;

    fn source() -> Vec<ScoredDocument> {
        let mut document = ScoredDocument::new(
            "doc-1",
            "Water boils at 100 degrees Celsius at sea level. It freezes at 0 degrees.",
            "encyclopedia",
            0.95,
        );
        document.combined_confidence_score = Some(0.93);
        vec![document]
    }

    fn request<'a>(
        confidence: f64,
        sources: &'a [ScoredDocument],
        forced: bool,
    ) -> DeliveryRequest<'a> {
        DeliveryRequest {
            answer: "Water boils at 100 degrees Celsius.",
            calibrated_confidence: confidence,
            sources,
            degraded_stages: &[],
            forced,
        }
    }

    #[test]
    fn tiers_follow_thresholds() {
        let manager = AdaptiveDeliveryManager::default();
        assert_eq!(manager.tier_for(0.8), Tier::High);
        assert_eq!(manager.tier_for(0.79), Tier::Medium);
        assert_eq!(manager.tier_for(0.6), Tier::Medium);
        assert_eq!(manager.tier_for(0.45), Tier::Low);
        assert_eq!(manager.tier_for(0.1), Tier::VeryLow);
    }

    #[test]
    fn high_confidence_is_delivered_without_caveats() {
        let sources = source();
        let result = AdaptiveDeliveryManager::default().deliver(&request(0.91, &sources, false));

        assert_eq!(result.tier, Tier::High);
        assert!(result.caveats.is_empty());
        assert!(result.formatted_text.starts_with("Water boils"));
        assert!(result.formatted_text.contains("[1] encyclopedia (doc-1, confidence 0.93)"));
    }

    #[test]
    fn lower_tiers_carry_caveats() {
        let sources = source();
        let manager = AdaptiveDeliveryManager::default();

        let medium = manager.deliver(&request(0.7, &sources, false));
        assert_eq!(medium.tier, Tier::Medium);
        assert!(medium.has_caveat("verify"));

        let low = manager.deliver(&request(0.5, &sources, false));
        assert_eq!(low.tier, Tier::Low);
        assert!(low.has_caveat("low confidence"));
        assert!(low.has_caveat("human review"));

        let very_low = manager.deliver(&request(0.2, &[], false));
        assert_eq!(very_low.tier, Tier::VeryLow);
        assert!(very_low.has_caveat("human review"));
        assert!(very_low.has_caveat("no supporting sources"));
    }

    #[test]
    fn forced_delivery_is_always_very_low() {
        let sources = source();
        let result = AdaptiveDeliveryManager::default().deliver(&request(0.55, &sources, true));
        assert_eq!(result.tier, Tier::VeryLow);
        assert!(result.has_caveat("human review recommended"));
    }

    #[test]
    fn degraded_stages_are_reported() {
        let sources = source();
        let degraded = vec!["generation".to_owned()];
        let result = AdaptiveDeliveryManager::default().deliver(&DeliveryRequest {
            degraded_stages: &degraded,
            ..request(0.9, &sources, false)
        });
        assert!(result.has_caveat("generation stage"));
    }

    #[test]
    fn empty_answer_falls_back_to_evidence_or_explicit_message() {
        let sources = source();
        assert_eq!(
            fallback_answer(&sources),
            "According to encyclopedia: Water boils at 100 degrees Celsius at sea level."
        );
        assert_eq!(fallback_answer(&[]), UNABLE_TO_ANSWER);

        let result = AdaptiveDeliveryManager::default().deliver(&DeliveryRequest {
            answer: "  ",
            ..request(0.1, &[], true)
        });
        assert!(result.formatted_text.contains(UNABLE_TO_ANSWER));
    }

    #[test]
    fn thresholds_must_be_ordered() {
        assert!(DeliveryThresholds::default().is_valid());
        assert!(!DeliveryThresholds { high: 0.5, medium: 0.6, low: 0.4 }.is_valid());
    }
}
