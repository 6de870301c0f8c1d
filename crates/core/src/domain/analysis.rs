use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const MIN_COMPLEXITY: u8 = 1;
pub const MAX_COMPLEXITY: u8 = 10;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceNeeds {
    pub needs_network: bool,
    pub needs_structured_store: bool,
    pub needs_vector_store: bool,
}

/// Normalized complexity factors, each in `[0, 1]`, kept alongside the score
/// so routing and logging can explain where a complexity value came from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ComplexityFactors {
    pub length: f64,
    pub technical_terms: f64,
    pub multi_intent: f64,
    pub ambiguity: f64,
    pub domain_specificity: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QueryAnalysis {
    pub intents: Vec<String>,
    pub complexity: u8,
    pub factors: ComplexityFactors,
    pub domains: Vec<String>,
    pub priority: Priority,
    pub estimated_duration_ms: u64,
    pub resource_needs: ResourceNeeds,
    pub entities: BTreeMap<String, Value>,
}

impl QueryAnalysis {
    /// Intents first, then domains, in detection order. This is the term list
    /// the router matches against capability categories.
    pub fn routing_terms(&self) -> impl Iterator<Item = &str> {
        self.intents.iter().chain(self.domains.iter()).map(String::as_str)
    }

    pub fn primary_intent(&self) -> &str {
        self.intents.first().map(String::as_str).unwrap_or("general")
    }
}
