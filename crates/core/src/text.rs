//! Tokenization helpers shared by the analyzer, evaluator and the lexical
//! similarity fallback.

use std::collections::BTreeSet;

const STOPWORDS: &[&str] = &[
    "a", "about", "after", "all", "also", "am", "an", "and", "any", "are", "as", "at", "be",
    "been", "before", "being", "but", "by", "can", "could", "did", "do", "does", "for", "from",
    "had", "has", "have", "how", "i", "if", "in", "into", "is", "it", "its", "me", "my", "of",
    "on", "or", "our", "please", "should", "so", "than", "that", "the", "their", "them", "then",
    "there", "these", "they", "this", "those", "to", "us", "was", "we", "were", "what", "when",
    "where", "which", "who", "why", "will", "with", "would", "you", "your",
];

/// Lowercased alphanumeric words, keeping inner hyphens and periods of
/// decimal numbers.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|ch: char| ch.is_whitespace() || matches!(ch, ',' | ';' | ':' | '/' | '(' | ')'))
        .map(|word| word.trim_matches(|ch: char| !ch.is_alphanumeric()).to_lowercase())
        .filter(|word| !word.is_empty())
        .collect()
}

pub fn is_stopword(word: &str) -> bool {
    STOPWORDS.binary_search(&word).is_ok()
}

/// Crude singularization so `degrees` and `degree` compare equal.
pub fn normalize_term(word: &str) -> String {
    let keeps_s = ["ss", "us", "is"].iter().any(|suffix| word.ends_with(suffix));
    if word.len() > 3 && word.ends_with('s') && !keeps_s {
        word[..word.len() - 1].to_owned()
    } else {
        word.to_owned()
    }
}

/// Distinct non-stopword terms of `text`, normalized.
pub fn content_terms(text: &str) -> BTreeSet<String> {
    tokenize(text)
        .into_iter()
        .filter(|word| !is_stopword(word))
        .map(|word| normalize_term(&word))
        .collect()
}

/// Share of `terms` that also appear in `text`. An empty term set is fully
/// covered.
pub fn term_coverage(terms: &BTreeSet<String>, text: &str) -> f64 {
    if terms.is_empty() {
        return 1.0;
    }
    let present = content_terms(text);
    let hits = terms.iter().filter(|term| present.contains(*term)).count();
    hits as f64 / terms.len() as f64
}

/// Set cosine over content terms, in `[0, 1]`.
pub fn lexical_similarity(left: &str, right: &str) -> f64 {
    let left = content_terms(left);
    let right = content_terms(right);
    if left.is_empty() || right.is_empty() {
        return 0.0;
    }
    let shared = left.intersection(&right).count() as f64;
    (shared / ((left.len() * right.len()) as f64).sqrt()).clamp(0.0, 1.0)
}

/// Sentences split on terminal punctuation; trailing text without
/// punctuation counts as a sentence.
pub fn sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        current.push(ch);
        if matches!(ch, '.' | '!' | '?') {
            let boundary = chars.peek().map(|next| next.is_whitespace()).unwrap_or(true);
            if boundary {
                let trimmed = current.trim();
                if !trimmed.is_empty() {
                    sentences.push(trimmed.to_owned());
                }
                current.clear();
            }
        }
    }

    let trimmed = current.trim();
    if !trimmed.is_empty() {
        sentences.push(trimmed.to_owned());
    }
    sentences
}

/// Case-insensitive phrase search on word boundaries.
pub fn contains_phrase(text: &str, phrase: &str) -> bool {
    let haystack = format!(" {} ", tokenize(text).join(" "));
    let needle = format!(" {} ", tokenize(phrase).join(" "));
    !needle.trim().is_empty() && haystack.contains(&needle)
}
