//! Contracts for the external services the orchestrator consumes, plus
//! in-memory implementations used by the CLI and tests.

use std::collections::BTreeMap;

use assay_core::errors::CollaboratorError;
use assay_core::text::{content_terms, lexical_similarity, sentences, term_coverage};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct GenerationOutput {
    pub text: String,
    pub tokens: Option<Vec<String>>,
    pub log_probabilities: Option<Vec<f64>>,
}

impl GenerationOutput {
    pub fn text_only(text: impl Into<String>) -> Self {
        Self { text: text.into(), tokens: None, log_probabilities: None }
    }
}

/// One candidate returned by a vector store search.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VectorHit {
    pub id: String,
    pub content: String,
    pub score: f64,
    pub source: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

#[async_trait]
pub trait GenerationService: Send + Sync {
    async fn generate(
        &self,
        prompt: &str,
        temperature: f64,
    ) -> Result<GenerationOutput, CollaboratorError>;
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn search(&self, query: &str, k: usize) -> Result<Vec<VectorHit>, CollaboratorError>;
}

#[async_trait]
pub trait SimilarityService: Send + Sync {
    /// Similarity in `[0, 1]`.
    async fn similarity(&self, left: &str, right: &str) -> Result<f64, CollaboratorError>;
}

/// A document in a JSON corpus file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CorpusDocument {
    pub id: String,
    pub content: String,
    pub source: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

/// Scores documents by the share of query terms they contain.
#[derive(Clone, Debug, Default)]
pub struct KeywordVectorStore {
    documents: Vec<CorpusDocument>,
}

impl KeywordVectorStore {
    pub fn new(documents: Vec<CorpusDocument>) -> Self {
        Self { documents }
    }

    /// Parses a JSON array of `{id, content, source, metadata?}` objects.
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str::<Vec<CorpusDocument>>(raw).map(Self::new)
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

#[async_trait]
impl VectorStore for KeywordVectorStore {
    async fn search(&self, query: &str, k: usize) -> Result<Vec<VectorHit>, CollaboratorError> {
        let terms = content_terms(query);
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        let mut hits: Vec<VectorHit> = self
            .documents
            .iter()
            .map(|document| VectorHit {
                id: document.id.clone(),
                content: document.content.clone(),
                score: term_coverage(&terms, &document.content),
                source: document.source.clone(),
                metadata: document.metadata.clone(),
            })
            .filter(|hit| hit.score > 0.0)
            .collect();
        hits.sort_by(|left, right| {
            right.score.total_cmp(&left.score).then_with(|| left.id.cmp(&right.id))
        });
        hits.truncate(k);
        Ok(hits)
    }
}

/// Term-overlap similarity. Also the fallback when a similarity service fails.
#[derive(Clone, Copy, Debug, Default)]
pub struct LexicalSimilarity;

#[async_trait]
impl SimilarityService for LexicalSimilarity {
    async fn similarity(&self, left: &str, right: &str) -> Result<f64, CollaboratorError> {
        Ok(lexical_similarity(left, right))
    }
}

/// Answers by quoting the context sentence that best covers the question.
/// Returns no log-probabilities, so callers exercise the heuristic
/// confidence path.
#[derive(Clone, Copy, Debug, Default)]
pub struct ExtractiveGenerator;

pub const NO_CONTEXT_ANSWER: &str =
    "I'm not sure. No supporting information was available, so this question might need review.";

#[async_trait]
impl GenerationService for ExtractiveGenerator {
    async fn generate(
        &self,
        prompt: &str,
        _temperature: f64,
    ) -> Result<GenerationOutput, CollaboratorError> {
        let question = prompt
            .lines()
            .find_map(|line| line.strip_prefix("Question: "))
            .unwrap_or(prompt);
        let terms = content_terms(question);

        let best = context_passages(prompt)
            .iter()
            .flat_map(|passage| sentences(passage))
            .map(|sentence| (term_coverage(&terms, &sentence), sentence))
            .filter(|(coverage, _)| *coverage > 0.0)
            .max_by(|left, right| left.0.total_cmp(&right.0));

        let text = best.map(|(_, sentence)| sentence).unwrap_or_else(|| NO_CONTEXT_ANSWER.into());
        Ok(GenerationOutput::text_only(text))
    }
}

/// Passages listed in a prompt's `Context:` section as `[n] (label) text`.
fn context_passages(prompt: &str) -> Vec<String> {
    prompt
        .lines()
        .skip_while(|line| line.trim() != "Context:")
        .skip(1)
        .take_while(|line| !line.trim().is_empty())
        .filter_map(|line| line.split_once(") ").map(|(_, passage)| passage.trim().to_owned()))
        .collect()
}
