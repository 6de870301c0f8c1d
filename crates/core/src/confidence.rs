//! Token-level confidence extraction
//!
//! Per-token confidence is `exp(log p)`. Tokens are aggregated with the
//! harmonic mean so a few weak tokens pull the whole answer down. When the
//! generation service returns no log-probabilities a heuristic based on
//! length, hedging phrases and self-contradiction is used instead.

use crate::domain::confidence::{ConfidenceSource, GenerationResult, TokenConfidence};
use crate::text::{contains_phrase, tokenize};

/// Floor applied to each token before taking its reciprocal.
pub const TOKEN_CONFIDENCE_FLOOR: f64 = 1e-6;
pub const HEURISTIC_MIN: f64 = 0.05;
pub const HEURISTIC_MAX: f64 = 0.95;

const HEDGING_PHRASES: &[&str] = &[
    "i'm not sure",
    "i am not sure",
    "not certain",
    "it seems",
    "i think",
    "could be",
    "might",
    "unclear",
    "possibly",
    "perhaps",
    "probably",
    "uncertain",
    "may or may not",
];

const CONTRADICTION_PAIRS: &[(&str, &str)] = &[
    ("always", "never"),
    ("true", "false"),
    ("correct", "incorrect"),
    ("possible", "impossible"),
    ("increases", "decreases"),
    ("safe", "unsafe"),
];

const HEDGE_PENALTY: f64 = 0.1;
const HEDGE_PENALTY_CAP: f64 = 0.4;
const CONTRADICTION_PENALTY: f64 = 0.15;

#[derive(Clone, Copy, Debug, Default)]
pub struct ConfidenceExtractor;

impl ConfidenceExtractor {
    /// Builds a generation result from whatever signals the generation
    /// service returned. `tokens` may be absent even when log-probabilities
    /// are present; positions are then used as token labels.
    pub fn extract(
        &self,
        text: &str,
        tokens: Option<&[String]>,
        log_probabilities: Option<&[f64]>,
    ) -> GenerationResult {
        let mut uncertainty_markers = hedging_markers(text);
        uncertainty_markers.extend(contradiction_markers(text));

        match log_probabilities.filter(|values| !values.is_empty()) {
            Some(values) => {
                let token_confidences: Vec<TokenConfidence> = values
                    .iter()
                    .enumerate()
                    .map(|(position, log_probability)| {
                        let token = tokens
                            .and_then(|tokens| tokens.get(position))
                            .cloned()
                            .unwrap_or_else(|| format!("<{position}>"));
                        TokenConfidence::from_log_probability(token, *log_probability, position)
                    })
                    .collect();
                let per_token: Vec<f64> =
                    token_confidences.iter().map(|token| token.confidence).collect();

                GenerationResult {
                    text: text.to_owned(),
                    aggregated_confidence: harmonic_mean(&per_token),
                    token_confidences,
                    uncertainty_markers,
                    confidence_source: ConfidenceSource::TokenLogprobs,
                }
            }
            None => GenerationResult {
                text: text.to_owned(),
                token_confidences: Vec::new(),
                aggregated_confidence: heuristic_confidence(text),
                uncertainty_markers,
                confidence_source: ConfidenceSource::Heuristic,
            },
        }
    }
}

/// Harmonic mean of per-token confidences; zero for no tokens.
pub fn harmonic_mean(confidences: &[f64]) -> f64 {
    if confidences.is_empty() {
        return 0.0;
    }
    let reciprocal_sum: f64 = confidences
        .iter()
        .map(|confidence| {
            let confidence =
                if confidence.is_nan() { TOKEN_CONFIDENCE_FLOOR } else { *confidence };
            1.0 / confidence.clamp(TOKEN_CONFIDENCE_FLOOR, 1.0)
        })
        .sum();
    (confidences.len() as f64 / reciprocal_sum).clamp(0.0, 1.0)
}

/// Confidence estimate for answers without log-probabilities, in
/// `[HEURISTIC_MIN, HEURISTIC_MAX]`.
pub fn heuristic_confidence(text: &str) -> f64 {
    let words = tokenize(text).len();
    let base = match words {
        0 => return HEURISTIC_MIN,
        1..=4 => 0.45,
        5..=14 => 0.65,
        15..=150 => 0.75,
        _ => 0.7,
    };

    let hedges = hedging_markers(text).len() as f64;
    let contradictions = contradiction_markers(text).len() as f64;
    let penalty =
        (hedges * HEDGE_PENALTY).min(HEDGE_PENALTY_CAP) + contradictions * CONTRADICTION_PENALTY;

    let score = base - penalty;
    // Penalties that consume the whole base land on the floor exactly.
    if score <= HEURISTIC_MIN + 1e-9 {
        return HEURISTIC_MIN;
    }
    score.min(HEURISTIC_MAX)
}

fn hedging_markers(text: &str) -> Vec<String> {
    HEDGING_PHRASES
        .iter()
        .filter(|phrase| contains_phrase(text, phrase))
        .map(|phrase| (*phrase).to_owned())
        .collect()
}

/// An antonym pair asserted inside the same sentence.
pub(crate) fn contradiction_markers(text: &str) -> Vec<String> {
    crate::text::sentences(text)
        .iter()
        .flat_map(|sentence| {
            CONTRADICTION_PAIRS
                .iter()
                .filter(|(left, right)| {
                    contains_phrase(sentence, left) && contains_phrase(sentence, right)
                })
                .map(|(left, right)| format!("contradiction: {left}/{right}"))
                .collect::<Vec<_>>()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{harmonic_mean, heuristic_confidence, ConfidenceExtractor, HEURISTIC_MIN};
    use crate::domain::confidence::ConfidenceSource;

    #[test]
    fn harmonic_mean_is_below_arithmetic_mean() {
        let aggregated = harmonic_mean(&[0.9, 0.8, 0.7]);
        assert!(aggregated < 0.8);
        assert!((aggregated - 0.788).abs() < 0.005);
        assert!((aggregated - 0.7916).abs() < 1e-3);
    }

    #[test]
    fn harmonic_mean_is_dominated_by_weak_tokens() {
        let aggregated = harmonic_mean(&[0.99, 0.99, 0.99, 0.05]);
        assert!(aggregated < 0.2);
        assert_eq!(harmonic_mean(&[]), 0.0);
        assert!(harmonic_mean(&[0.0, 0.9]) > 0.0);
    }

    #[test]
    fn log_probabilities_drive_confidence_when_present() {
        let tokens: Vec<String> =
            ["Water", "boils", "at", "100"].iter().map(|token| (*token).to_owned()).collect();
        let result = ConfidenceExtractor.extract(
            "Water boils at 100",
            Some(&tokens),
            Some(&[-0.01, -0.02, -0.01, -0.05]),
        );

        assert_eq!(result.confidence_source, ConfidenceSource::TokenLogprobs);
        assert_eq!(result.token_confidences.len(), 4);
        assert_eq!(result.token_confidences[1].token, "boils");
        assert!(result.aggregated_confidence > 0.95);
        assert!(result
            .token_confidences
            .iter()
            .all(|token| (0.0..=1.0).contains(&token.confidence)));
    }

    #[test]
    fn missing_log_probabilities_fall_back_to_heuristic() {
        let confident = ConfidenceExtractor.extract(
            "Water boils at 100 degrees Celsius at sea level under standard atmospheric pressure.",
            None,
            None,
        );
        assert_eq!(confident.confidence_source, ConfidenceSource::Heuristic);
        assert!(confident.token_confidences.is_empty());
        assert!(confident.uncertainty_markers.is_empty());

        let hedged = ConfidenceExtractor.extract(
            "I'm not sure, but it might possibly boil at around 100 degrees at sea level.",
            None,
            Some(&[]),
        );
        assert_eq!(hedged.confidence_source, ConfidenceSource::Heuristic);
        assert!(hedged.aggregated_confidence < confident.aggregated_confidence);
        assert!(hedged.uncertainty_markers.iter().any(|marker| marker == "i'm not sure"));
        assert!(hedged.uncertainty_markers.iter().any(|marker| marker == "might"));
    }

    #[test]
    fn self_contradiction_lowers_heuristic_confidence() {
        let plain = heuristic_confidence("The valve is always closed during the cooling phase.");
        let contradictory =
            heuristic_confidence("The valve is always closed and never closed during cooling.");
        assert!(contradictory < plain);

        let negation = heuristic_confidence("The valve is not open during the cooling phase.");
        assert_eq!(negation, plain);
    }

    #[test]
    fn heuristic_stays_within_bounds() {
        assert_eq!(heuristic_confidence(""), HEURISTIC_MIN);
        let hopeless = "I'm not sure. It might be true or false, possibly, perhaps, probably, \
                        unclear, uncertain, could be, i think, it seems, always and never.";
        let value = heuristic_confidence(hopeless);
        assert!((HEURISTIC_MIN..=0.95).contains(&value));
        assert_eq!(value, HEURISTIC_MIN);
    }

    #[test]
    fn fully_penalized_short_answer_sits_on_the_floor() {
        assert_eq!(heuristic_confidence("possibly perhaps probably unclear"), HEURISTIC_MIN);
    }
}
