//! Concept extraction capability and a keyword-frequency implementation.

use std::collections::{BTreeMap, HashSet};
use std::sync::LazyLock;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::Result;

/// A candidate concept extracted from text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedConcept {
    /// Short concept name.
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// Extraction confidence in `[0, 1]`.
    pub confidence: f64,
}

/// Capability interface over the concept extraction service.
#[async_trait]
pub trait ConceptExtractor: Send + Sync {
    /// Extract concepts whose confidence is at least `min_confidence`.
    async fn extract(&self, text: &str, min_confidence: f64) -> Result<Vec<ExtractedConcept>>;

    /// Extractor name for diagnostics.
    fn name(&self) -> &str {
        "extractor"
    }
}

static STOPWORDS: LazyLock<HashSet<String>> = LazyLock::new(|| {
    stop_words::get(stop_words::LANGUAGE::English)
        .iter()
        .map(|w| w.to_string())
        .collect()
});

/// Frequency-based extractor: each significant term is a concept.
///
/// A term's confidence is its frequency relative to the most frequent term,
/// so the dominant term always scores 1.0. Words shorter than four
/// characters, numbers, and common stopwords are ignored.
pub struct KeywordConceptExtractor {
    max_concepts: usize,
    calls: AtomicUsize,
}

impl KeywordConceptExtractor {
    /// Create an extractor returning at most 10 concepts per call.
    pub fn new() -> Self {
        Self::with_max_concepts(10)
    }

    /// Create an extractor returning at most `max_concepts` per call.
    pub fn with_max_concepts(max_concepts: usize) -> Self {
        Self {
            max_concepts,
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of `extract` calls made so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for KeywordConceptExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConceptExtractor for KeywordConceptExtractor {
    async fn extract(&self, text: &str, min_confidence: f64) -> Result<Vec<ExtractedConcept>> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .map(str::to_lowercase)
            .filter(|w| w.chars().count() >= 4)
            .filter(|w| !w.chars().all(|c| c.is_ascii_digit()))
            .filter(|w| !STOPWORDS.contains(w.as_str()))
        {
            *counts.entry(word).or_default() += 1;
        }

        let Some(max) = counts.values().copied().max() else {
            return Ok(Vec::new());
        };

        let mut concepts: Vec<ExtractedConcept> = counts
            .into_iter()
            .map(|(term, count)| ExtractedConcept {
                description: format!("Term '{term}' appears {count} time(s)"),
                confidence: count as f64 / max as f64,
                name: term,
            })
            .filter(|c| c.confidence >= min_confidence)
            .collect();

        concepts.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.name.cmp(&b.name))
        });
        concepts.truncate(self.max_concepts);
        Ok(concepts)
    }

    fn name(&self) -> &str {
        "keyword"
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_extract_dominant_term_full_confidence() {
        let extractor = KeywordConceptExtractor::new();
        let concepts = extractor
            .extract("Shipping delay. Shipping refund. Shipping again", 0.0)
            .await
            .unwrap();
        assert_eq!(concepts[0].name, "shipping");
        assert_eq!(concepts[0].confidence, 1.0);
        assert!(concepts.iter().any(|c| c.name == "refund"));
    }

    #[tokio::test]
    async fn test_extract_applies_min_confidence() {
        let extractor = KeywordConceptExtractor::new();
        let concepts = extractor
            .extract("laptop laptop laptop charger", 0.5)
            .await
            .unwrap();
        assert_eq!(concepts.len(), 1);
        assert_eq!(concepts[0].name, "laptop");
    }

    #[tokio::test]
    async fn test_extract_ignores_short_words_numbers_and_stopwords() {
        let extractor = KeywordConceptExtractor::new();
        let concepts = extractor
            .extract("the cat with 12345 about", 0.0)
            .await
            .unwrap();
        assert!(concepts.is_empty());
    }

    #[tokio::test]
    async fn test_extract_skips_english_stopwords() {
        let extractor = KeywordConceptExtractor::new();
        let concepts = extractor
            .extract("we should track churn", 0.0)
            .await
            .unwrap();
        assert!(concepts.iter().all(|c| c.name != "should"));
        assert!(concepts.iter().any(|c| c.name == "churn"));
    }

    #[tokio::test]
    async fn test_extract_respects_max_and_counts_calls() {
        let extractor = KeywordConceptExtractor::with_max_concepts(2);
        let concepts = extractor
            .extract("alpha bravo charlie delta", 0.0)
            .await
            .unwrap();
        assert_eq!(concepts.len(), 2);
        extractor.extract("", 0.0).await.unwrap();
        assert_eq!(extractor.calls(), 2);
    }
}
