//! Multi-factor answer evaluation
//!
//! Scores a generated answer for factuality, relevance, coherence and
//! completeness. The raw overall is the unweighted mean of the four.

use std::collections::BTreeSet;

use crate::confidence::contradiction_markers;
use crate::domain::confidence::EvaluationResult;
use crate::domain::evidence::ScoredDocument;
use crate::text::{content_terms, sentences, term_coverage, tokenize};

pub const DEFAULT_SUPPORT_THRESHOLD: f64 = 0.5;

const MIN_CLAIM_TERMS: usize = 3;
const LONG_SENTENCE_WORDS: usize = 80;

/// What the evaluator needs to know about one answer.
#[derive(Clone, Copy, Debug)]
pub struct EvaluationInput<'a> {
    pub query: &'a str,
    pub answer: &'a str,
    pub evidence: &'a [ScoredDocument],
    /// Semantic similarity between query and answer from the similarity
    /// collaborator.
    pub semantic_similarity: f64,
    /// Primary intent of the query, e.g. `research` or `code`.
    pub task_type: &'a str,
}

#[derive(Clone, Debug)]
pub struct Evaluator {
    support_threshold: f64,
}

impl Default for Evaluator {
    fn default() -> Self {
        Self { support_threshold: DEFAULT_SUPPORT_THRESHOLD }
    }
}

impl Evaluator {
    pub fn new(support_threshold: f64) -> Self {
        Self { support_threshold: support_threshold.clamp(0.0, 1.0) }
    }

    pub fn evaluate(&self, input: &EvaluationInput<'_>) -> EvaluationResult {
        let query_terms = content_terms(input.query);
        EvaluationResult::from_scores(
            self.factuality(input.answer, input.evidence),
            relevance(&query_terms, input.answer, input.semantic_similarity),
            coherence(input.answer),
            completeness(&query_terms, input.answer, input.task_type),
        )
    }

    /// Mean support of the answer's claims. A claim is a sentence with at
    /// least three content terms; its support is the best evidence coverage
    /// times that document's confidence, or zero below the threshold.
    pub fn factuality(&self, answer: &str, evidence: &[ScoredDocument]) -> f64 {
        if evidence.is_empty() {
            return 0.0;
        }

        let mut claims: Vec<BTreeSet<String>> = sentences(answer)
            .iter()
            .map(|sentence| content_terms(sentence))
            .filter(|terms| terms.len() >= MIN_CLAIM_TERMS)
            .collect();
        if claims.is_empty() {
            let whole = content_terms(answer);
            if whole.is_empty() {
                return 0.0;
            }
            claims.push(whole);
        }

        let total: f64 = claims
            .iter()
            .map(|claim| {
                evidence
                    .iter()
                    .map(|document| {
                        let coverage = term_coverage(claim, &document.content);
                        if coverage < self.support_threshold {
                            0.0
                        } else {
                            coverage * document.effective_score()
                        }
                    })
                    .fold(0.0_f64, f64::max)
            })
            .sum();
        (total / claims.len() as f64).clamp(0.0, 1.0)
    }
}

pub fn relevance(query_terms: &BTreeSet<String>, answer: &str, semantic_similarity: f64) -> f64 {
    if answer.trim().is_empty() {
        return 0.0;
    }
    let similarity = if semantic_similarity.is_nan() { 0.0 } else { semantic_similarity };
    (0.6 * similarity.clamp(0.0, 1.0) + 0.4 * term_coverage(query_terms, answer)).clamp(0.0, 1.0)
}

/// One minus structural penalties.
pub fn coherence(answer: &str) -> f64 {
    let trimmed = answer.trim();
    if trimmed.is_empty() {
        return 0.0;
    }

    let mut penalty = 0.0;

    let balanced = [('(', ')'), ('[', ']'), ('{', '}')]
        .iter()
        .all(|(open, close)| trimmed.matches(*open).count() == trimmed.matches(*close).count());
    if !balanced {
        penalty += 0.2;
    }

    let split = sentences(trimmed);
    let mut seen = BTreeSet::new();
    let repeats = split
        .iter()
        .filter(|sentence| !seen.insert(tokenize(sentence).join(" ")))
        .count();
    penalty += (repeats as f64 * 0.2).min(0.4);

    if split.iter().any(|sentence| tokenize(sentence).len() > LONG_SENTENCE_WORDS) {
        penalty += 0.15;
    }

    penalty += contradiction_markers(trimmed).len() as f64 * 0.15;

    if !trimmed.ends_with(['.', '!', '?', '"', ')', '`']) {
        penalty += 0.1;
    }

    (1.0 - penalty).clamp(0.0, 1.0)
}

pub fn completeness(query_terms: &BTreeSet<String>, answer: &str, task_type: &str) -> f64 {
    if answer.trim().is_empty() {
        return 0.0;
    }
    let words = tokenize(answer).len() as f64;
    let adequacy = (words / expected_words(task_type) as f64).min(1.0);
    (0.5 * adequacy + 0.5 * term_coverage(query_terms, answer)).clamp(0.0, 1.0)
}

/// Minimum answer length, in words, considered adequate for a task type.
pub fn expected_words(task_type: &str) -> usize {
    match task_type {
        "research" => 12,
        "code" | "data-analysis" => 20,
        "writing" => 40,
        "tool-execution" => 3,
        _ => 8,
    }
}
