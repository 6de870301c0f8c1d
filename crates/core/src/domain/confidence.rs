use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TokenConfidence {
    pub token: String,
    pub log_probability: f64,
    pub confidence: f64,
    pub position: usize,
}

impl TokenConfidence {
    pub fn from_log_probability(
        token: impl Into<String>,
        log_probability: f64,
        position: usize,
    ) -> Self {
        let log_probability =
            if log_probability.is_nan() { f64::NEG_INFINITY } else { log_probability.min(0.0) };
        Self {
            token: token.into(),
            log_probability,
            confidence: log_probability.exp().clamp(0.0, 1.0),
            position,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceSource {
    TokenLogprobs,
    Heuristic,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GenerationResult {
    pub text: String,
    pub token_confidences: Vec<TokenConfidence>,
    pub aggregated_confidence: f64,
    pub uncertainty_markers: Vec<String>,
    pub confidence_source: ConfidenceSource,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub factuality: f64,
    pub relevance: f64,
    pub coherence: f64,
    pub completeness: f64,
    pub raw_overall: f64,
}

impl EvaluationResult {
    pub fn from_scores(factuality: f64, relevance: f64, coherence: f64, completeness: f64) -> Self {
        let factuality = factuality.clamp(0.0, 1.0);
        let relevance = relevance.clamp(0.0, 1.0);
        let coherence = coherence.clamp(0.0, 1.0);
        let completeness = completeness.clamp(0.0, 1.0);
        Self {
            factuality,
            relevance,
            coherence,
            completeness,
            raw_overall: (factuality + relevance + coherence + completeness) / 4.0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalibrationMethod {
    Temperature,
    Isotonic,
    Platt,
}

impl CalibrationMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Temperature => "temperature",
            Self::Isotonic => "isotonic",
            Self::Platt => "platt",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "temperature" | "temperature_scaling" => Some(Self::Temperature),
            "isotonic" | "isotonic_regression" => Some(Self::Isotonic),
            "platt" | "platt_scaling" => Some(Self::Platt),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CalibratedConfidence {
    pub value: f64,
    pub method: CalibrationMethod,
}

/// User-facing confidence bucket, ordered from least to most confident.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Tier {
    VeryLow,
    Low,
    Medium,
    High,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
            Self::VeryLow => "veryLow",
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DeliveryResult {
    pub formatted_text: String,
    pub tier: Tier,
    pub caveats: Vec<String>,
}

impl DeliveryResult {
    pub fn has_caveat(&self, needle: &str) -> bool {
        let needle = needle.to_ascii_lowercase();
        self.caveats.iter().any(|caveat| caveat.to_ascii_lowercase().contains(&needle))
    }
}

#[cfg(test)]
mod tests {
    use super::{CalibrationMethod, EvaluationResult, Tier, TokenConfidence};

    #[test]
    fn token_confidence_is_exp_of_log_probability() {
        let token = TokenConfidence::from_log_probability("water", -0.1053605, 0);
        assert!((token.confidence - 0.9).abs() < 1e-6);

        let positive = TokenConfidence::from_log_probability("x", 0.5, 1);
        assert_eq!(positive.confidence, 1.0);

        let nan = TokenConfidence::from_log_probability("y", f64::NAN, 2);
        assert_eq!(nan.confidence, 0.0);
    }

    #[test]
    fn raw_overall_is_unweighted_mean() {
        let evaluation = EvaluationResult::from_scores(1.0, 0.5, 0.5, 0.0);
        assert!((evaluation.raw_overall - 0.5).abs() < 1e-12);
    }

    #[test]
    fn tiers_order_by_confidence() {
        assert!(Tier::High > Tier::Medium);
        assert!(Tier::Low > Tier::VeryLow);
        assert_eq!(Tier::VeryLow.as_str(), "veryLow");
    }

    #[test]
    fn calibration_method_names_parse() {
        assert_eq!(CalibrationMethod::parse("Platt"), Some(CalibrationMethod::Platt));
        assert_eq!(CalibrationMethod::parse("isotonic"), Some(CalibrationMethod::Isotonic));
        assert_eq!(CalibrationMethod::parse("beta"), None);
    }
}
