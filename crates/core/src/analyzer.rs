//! Query analysis
//!
//! Classifies a query's intents and domains, estimates its complexity on a
//! 1..=10 scale from five weighted factors, and extracts simple entities.
//! Everything except an empty query yields a best-effort analysis.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::analysis::{
    ComplexityFactors, Priority, QueryAnalysis, ResourceNeeds, MAX_COMPLEXITY, MIN_COMPLEXITY,
};
use crate::domain::query::Query;
use crate::errors::OrchestrationError;
use crate::text::tokenize;

pub const GENERAL_LABEL: &str = "general";

const INTENT_KEYWORDS: &[(&str, &[&str])] = &[
    (
        "research",
        &[
            "what", "why", "who", "when", "where", "explain", "describe", "define", "research",
            "history", "meaning", "difference",
        ],
    ),
    (
        "code",
        &[
            "code", "function", "bug", "compile", "compiler", "debug", "refactor", "implement",
            "program", "script", "rust", "python", "javascript", "algorithm", "panic", "panics",
        ],
    ),
    (
        "data-analysis",
        &[
            "analyze", "analyse", "analysis", "data", "dataset", "statistics", "average", "trend",
            "correlation", "chart", "forecast", "regression",
        ],
    ),
    (
        "writing",
        &[
            "write", "draft", "summarize", "summarise", "summary", "essay", "email", "letter",
            "rewrite", "proofread",
        ],
    ),
    (
        "tool-execution",
        &["calculate", "convert", "compute", "fetch", "download", "execute", "lookup", "schedule"],
    ),
];

const DOMAIN_KEYWORDS: &[(&str, &[&str])] = &[
    (
        "science",
        &[
            "water", "boiling", "temperature", "physics", "chemistry", "biology", "atom", "molecule",
            "energy", "planet", "celsius", "fahrenheit", "gravity",
        ],
    ),
    (
        "software",
        &[
            "software", "rust", "python", "javascript", "compiler", "code", "function", "database",
            "server", "api", "bug",
        ],
    ),
    (
        "finance",
        &["finance", "stock", "market", "revenue", "budget", "tax", "investment", "interest", "loan"],
    ),
    ("health", &["health", "medical", "disease", "symptom", "doctor", "medicine", "vaccine", "diet"]),
    ("legal", &["legal", "law", "contract", "court", "regulation", "liability", "lawsuit"]),
    ("history", &["historical", "war", "century", "ancient", "empire", "dynasty"]),
];

const TECHNICAL_TERMS: &[&str] = &[
    "algorithm", "api", "asynchronous", "borrow", "compiler", "concurrency", "database",
    "derivative", "eigenvalue", "encryption", "entropy", "integral", "kernel", "latency",
    "lifetime", "molecule", "mutex", "neural", "polymorphism", "protocol", "quantum", "recursion",
    "regression", "thermodynamic", "thermodynamics", "variance",
];

const VAGUE_WORDS: &[&str] =
    &["something", "stuff", "thing", "things", "maybe", "somehow", "whatever", "etc"];

const DANGLING_PRONOUNS: &[&str] = &["it", "this", "that", "they", "those", "these"];

const CONJUNCTION_CUES: &[&str] = &["also", "additionally", "then", "plus", "furthermore"];

const URGENCY_CUES: &[&str] =
    &["urgent", "urgently", "asap", "immediately", "emergency", "critical"];

const FRESHNESS_CUES: &[&str] = &["latest", "current", "today", "news", "live"];

/// Weights for the complexity factors
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComplexityWeights {
    /// Weight for the token-length bucket (default: 0.20)
    pub length: f64,
    /// Weight for technical-term density (default: 0.30)
    pub technical_terms: f64,
    /// Weight for multi-intent detection (default: 0.20)
    pub multi_intent: f64,
    /// Weight for the ambiguity estimate (default: 0.15)
    pub ambiguity: f64,
    /// Weight for domain specificity (default: 0.15)
    pub domain_specificity: f64,
}

impl Default for ComplexityWeights {
    fn default() -> Self {
        Self {
            length: 0.2,
            technical_terms: 0.3,
            multi_intent: 0.2,
            ambiguity: 0.15,
            domain_specificity: 0.15,
        }
    }
}

impl ComplexityWeights {
    fn as_array(&self) -> [f64; 5] {
        [
            self.length,
            self.technical_terms,
            self.multi_intent,
            self.ambiguity,
            self.domain_specificity,
        ]
    }

    pub fn is_valid(&self) -> bool {
        let weights = self.as_array();
        weights.iter().all(|weight| weight.is_finite() && *weight >= 0.0)
            && weights.iter().sum::<f64>() > 0.0
    }
}

#[derive(Clone, Debug, Default)]
pub struct QueryAnalyzer {
    weights: ComplexityWeights,
}

impl QueryAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_weights(weights: ComplexityWeights) -> Self {
        Self { weights }
    }

    pub fn analyze(&self, query: &Query) -> Result<QueryAnalysis, OrchestrationError> {
        self.analyze_text(query.text())
    }

    pub fn analyze_text(&self, text: &str) -> Result<QueryAnalysis, OrchestrationError> {
        if text.trim().is_empty() {
            return Err(OrchestrationError::EmptyQuery);
        }

        let tokens = tokenize(text);
        let intents = detect_labels(&tokens, INTENT_KEYWORDS);
        let domains = detect_labels(&tokens, DOMAIN_KEYWORDS);
        let technical_count = tokens.iter().filter(|token| contains(TECHNICAL_TERMS, token)).count();

        let specialized_domains = domains.iter().filter(|domain| *domain != GENERAL_LABEL).count();
        let technical_factor = (technical_count as f64 / 5.0).min(1.0);
        let factors = ComplexityFactors {
            length: length_bucket(tokens.len()),
            technical_terms: technical_factor,
            multi_intent: multi_intent_factor(text, &tokens, &intents),
            ambiguity: ambiguity_factor(&tokens),
            domain_specificity: (specialized_domains as f64 * 0.35 + technical_factor * 0.3)
                .min(1.0),
        };
        let complexity = self.complexity(&factors);

        let priority = if tokens.iter().any(|token| contains(URGENCY_CUES, token)) {
            Priority::Critical
        } else if complexity >= 8 {
            Priority::High
        } else if complexity >= 5 {
            Priority::Medium
        } else {
            Priority::Low
        };

        let entities = extract_entities(text);
        let has_intent = |name: &str| intents.iter().any(|intent| intent == name);
        let resource_needs = ResourceNeeds {
            needs_network: has_intent("tool-execution")
                || entities.contains_key("urls")
                || tokens.iter().any(|token| contains(FRESHNESS_CUES, token)),
            needs_structured_store: has_intent("data-analysis")
                || domains.iter().any(|domain| domain == "finance"),
            needs_vector_store: has_intent("research")
                || has_intent("writing")
                || specialized_domains > 0,
        };

        Ok(QueryAnalysis {
            intents,
            complexity,
            factors,
            domains,
            priority,
            estimated_duration_ms: 500 + u64::from(complexity) * 1_500,
            resource_needs,
            entities,
        })
    }

    /// `clamp(round(1 + 9 · Σ wᵢfᵢ / Σ wᵢ), 1, 10)`
    pub fn complexity(&self, factors: &ComplexityFactors) -> u8 {
        let values = [
            factors.length,
            factors.technical_terms,
            factors.multi_intent,
            factors.ambiguity,
            factors.domain_specificity,
        ];
        let weights = self.weights.as_array();
        let total_weight: f64 = weights.iter().map(|weight| weight.max(0.0)).sum();
        if total_weight <= 0.0 {
            return MIN_COMPLEXITY;
        }
        let weighted: f64 = values
            .iter()
            .zip(weights.iter())
            .map(|(value, weight)| value.clamp(0.0, 1.0) * weight.max(0.0))
            .sum();
        let score = (1.0 + 9.0 * weighted / total_weight).round();
        (score as u8).clamp(MIN_COMPLEXITY, MAX_COMPLEXITY)
    }
}

fn contains(table: &[&str], token: &str) -> bool {
    table.iter().any(|entry| *entry == token)
}

/// Labels ordered by the position of their first keyword in the query.
fn detect_labels(tokens: &[String], table: &[(&str, &[&str])]) -> Vec<String> {
    let mut hits: Vec<(usize, usize, &str)> = table
        .iter()
        .enumerate()
        .filter_map(|(rank, (label, keywords))| {
            tokens
                .iter()
                .position(|token| contains(keywords, token))
                .map(|position| (position, rank, *label))
        })
        .collect();
    hits.sort_unstable();

    if hits.is_empty() {
        return vec![GENERAL_LABEL.to_owned()];
    }
    hits.into_iter().map(|(_, _, label)| label.to_owned()).collect()
}

fn length_bucket(token_count: usize) -> f64 {
    match token_count {
        0..=5 => 0.1,
        6..=15 => 0.3,
        16..=30 => 0.5,
        31..=60 => 0.75,
        _ => 1.0,
    }
}

fn multi_intent_factor(text: &str, tokens: &[String], intents: &[String]) -> f64 {
    let extra_intents =
        intents.iter().filter(|intent| *intent != GENERAL_LABEL).count().saturating_sub(1);
    let extra_questions = text.matches('?').count().saturating_sub(1);
    let conjunctions = tokens.iter().filter(|token| contains(CONJUNCTION_CUES, token)).count()
        + text.to_ascii_lowercase().matches("as well as").count();

    (extra_intents as f64 * 0.35 + extra_questions as f64 * 0.25 + conjunctions as f64 * 0.15)
        .min(1.0)
}

fn ambiguity_factor(tokens: &[String]) -> f64 {
    let vague = tokens.iter().filter(|token| contains(VAGUE_WORDS, token)).count() as f64 * 0.15;
    let short = if tokens.len() < 4 { 0.3 } else { 0.0 };
    let dangling = match tokens.first() {
        Some(first) if contains(DANGLING_PRONOUNS, first) => 0.2,
        _ => 0.0,
    };
    (vague + short + dangling).min(1.0)
}

fn extract_entities(text: &str) -> BTreeMap<String, Value> {
    let mut entities = BTreeMap::new();

    let quoted = quoted_phrases(text);
    let mut numbers = Vec::new();
    let mut urls = Vec::new();
    let mut proper_nouns = Vec::new();
    let mut sentence_start = true;

    for raw in text.split_whitespace() {
        let word = raw.trim_matches(|ch: char| !ch.is_alphanumeric() && ch != '/' && ch != ':');
        let lowered = word.to_ascii_lowercase();

        if lowered.starts_with("http://") || lowered.starts_with("https://") {
            urls.push(Value::String(raw.trim_end_matches(['.', ',', ')', '?']).to_owned()));
        } else if let Some(number) = parse_number(word) {
            numbers.push(Value::Number(number));
        } else if !sentence_start
            && word.chars().next().map(char::is_uppercase).unwrap_or(false)
            && word.len() > 1
        {
            proper_nouns.push(Value::String(word.to_owned()));
        }

        sentence_start = raw.ends_with(['.', '!', '?']);
    }

    for (key, values) in [
        ("numbers", numbers),
        ("quoted", quoted.into_iter().map(Value::String).collect()),
        ("urls", urls),
        ("proper_nouns", proper_nouns),
    ] {
        if !values.is_empty() {
            entities.insert(key.to_owned(), Value::Array(values));
        }
    }
    entities
}

fn parse_number(word: &str) -> Option<serde_json::Number> {
    if !word.chars().any(|ch| ch.is_ascii_digit()) {
        return None;
    }
    let digits = word.trim_matches(|ch: char| !ch.is_ascii_digit() && ch != '.' && ch != '-');
    digits.parse::<f64>().ok().and_then(serde_json::Number::from_f64)
}

fn quoted_phrases(text: &str) -> Vec<String> {
    let mut phrases = Vec::new();
    let mut current: Option<String> = None;
    for ch in text.chars() {
        match (ch, current.as_mut()) {
            ('"', Some(phrase)) => {
                let phrase = phrase.trim().to_owned();
                if !phrase.is_empty() {
                    phrases.push(phrase);
                }
                current = None;
            }
            ('"', None) => current = Some(String::new()),
            (other, Some(phrase)) => phrase.push(other),
            (_, None) => {}
        }
    }
    phrases
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{ComplexityWeights, QueryAnalyzer};
    use crate::domain::analysis::{ComplexityFactors, Priority};
    use crate::domain::query::Query;
    use crate::errors::OrchestrationError;

    #[test]
    fn empty_query_is_rejected() {
        let analyzer = QueryAnalyzer::new();
        let result = analyzer.analyze(&Query::new("  \n", "c"));
        assert_eq!(result, Err(OrchestrationError::EmptyQuery));
    }

    #[test]
    fn factual_science_question_is_simple_research() {
        let analysis = QueryAnalyzer::new()
            .analyze_text("What is the boiling point of water at sea level?")
            .expect("analysis");

        assert_eq!(analysis.intents, vec!["research".to_owned()]);
        assert_eq!(analysis.domains, vec!["science".to_owned()]);
        assert_eq!(analysis.complexity, 2);
        assert_eq!(analysis.priority, Priority::Low);
        assert!(analysis.resource_needs.needs_vector_store);
        assert!(!analysis.resource_needs.needs_network);
    }

    #[test]
    fn unmatched_query_falls_back_to_general_labels() {
        let analysis = QueryAnalyzer::new().analyze_text("hello there friend").expect("analysis");
        assert_eq!(analysis.intents, vec!["general".to_owned()]);
        assert_eq!(analysis.domains, vec!["general".to_owned()]);
        assert_eq!(analysis.primary_intent(), "general");
    }

    #[test]
    fn compound_technical_query_scores_higher() {
        let analyzer = QueryAnalyzer::new();
        let simple = analyzer.analyze_text("What is a mutex?").expect("analysis");
        let compound = analyzer
            .analyze_text(
                "Explain how the compiler handles recursion and lifetime analysis, then write \
                 a summary of the concurrency and mutex latency tradeoffs? Also calculate the \
                 variance of the benchmark data?",
            )
            .expect("analysis");

        assert!(compound.complexity > simple.complexity);
        assert!(compound.intents.len() >= 3);
        assert!(compound.factors.multi_intent > 0.5);
        assert!(compound.estimated_duration_ms > simple.estimated_duration_ms);
    }

    #[test]
    fn urgency_cue_sets_critical_priority() {
        let analysis =
            QueryAnalyzer::new().analyze_text("Urgent: debug the payment server").expect("analysis");
        assert_eq!(analysis.priority, Priority::Critical);
        assert_eq!(analysis.intents, vec!["code".to_owned()]);
        assert_eq!(analysis.domains, vec!["software".to_owned()]);
    }

    #[test]
    fn complexity_is_clamped_between_one_and_ten() {
        let analyzer = QueryAnalyzer::new();
        let minimum = ComplexityFactors::default();
        let maximum = ComplexityFactors {
            length: 1.0,
            technical_terms: 1.0,
            multi_intent: 1.0,
            ambiguity: 1.0,
            domain_specificity: 1.0,
        };
        assert_eq!(analyzer.complexity(&minimum), 1);
        assert_eq!(analyzer.complexity(&maximum), 10);

        let length_only = QueryAnalyzer::with_weights(ComplexityWeights {
            length: 1.0,
            technical_terms: 0.0,
            multi_intent: 0.0,
            ambiguity: 0.0,
            domain_specificity: 0.0,
        });
        assert_eq!(length_only.complexity(&ComplexityFactors { length: 0.5, ..minimum }), 6);
    }

    #[test]
    fn entities_include_numbers_quotes_urls_and_proper_nouns() {
        let analysis = QueryAnalyzer::new()
            .analyze_text(
                "Compare \"Project Gemini\" budgets from 1965 and 2.5 million at \
                 https://example.org/gemini for NASA.",
            )
            .expect("analysis");

        assert_eq!(analysis.entities.get("numbers"), Some(&json!([1965.0, 2.5])));
        assert_eq!(analysis.entities.get("quoted"), Some(&json!(["Project Gemini"])));
        assert_eq!(analysis.entities.get("urls"), Some(&json!(["https://example.org/gemini"])));
        let proper = analysis.entities.get("proper_nouns").cloned().unwrap_or_default();
        assert!(proper.as_array().map(|names| names.contains(&json!("NASA"))).unwrap_or(false));
        assert!(analysis.resource_needs.needs_network);
    }
}
