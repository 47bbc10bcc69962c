//! Semantic (vector) store capability and an in-memory implementation.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;

use super::embedding::cosine_similarity;
use crate::Result;

/// A single similarity search hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SemanticHit {
    /// Concept id.
    pub id: String,
    /// Similarity score (higher is more similar).
    pub score: f64,
    /// Descriptive payload stored with the vector.
    pub payload: Value,
}

/// A stored concept: vector plus payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredConcept {
    /// Concept id.
    pub id: String,
    /// Embedding vector.
    pub vector: Vec<f32>,
    /// Descriptive payload.
    pub payload: Value,
}

/// Exact-match payload filter: every listed field must equal its value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PayloadFilter(BTreeMap<String, Value>);

impl PayloadFilter {
    /// Create an empty filter (matches everything).
    pub fn new() -> Self {
        Self::default()
    }

    /// Require `field` to equal `value`.
    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(field.into(), value.into());
        self
    }

    /// Whether `payload` satisfies the filter.
    pub fn matches(&self, payload: &Value) -> bool {
        self.0
            .iter()
            .all(|(field, expected)| payload.get(field) == Some(expected))
    }
}

/// Capability interface over the semantic (vector) store.
#[async_trait]
pub trait SemanticStore: Send + Sync {
    /// Similarity search, best match first.
    async fn search(
        &self,
        vector: &[f32],
        limit: usize,
        min_score: f64,
        filter: Option<&PayloadFilter>,
    ) -> Result<Vec<SemanticHit>>;

    /// Insert or replace a concept, returning its id.
    ///
    /// A fresh id is generated when `id` is `None`.
    async fn upsert(&self, vector: Vec<f32>, payload: Value, id: Option<String>)
    -> Result<String>;

    /// Look up a concept by id.
    async fn get_by_id(&self, id: &str) -> Result<Option<StoredConcept>>;

    /// Delete concepts by id. Unknown ids are ignored.
    async fn delete(&self, ids: &[String]) -> Result<()>;

    /// Store name for diagnostics.
    fn name(&self) -> &str {
        "semantic"
    }
}

/// An in-memory semantic store ranking by cosine similarity.
#[derive(Default)]
pub struct MemorySemanticStore {
    concepts: RwLock<BTreeMap<String, StoredConcept>>,
}

impl MemorySemanticStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored concepts.
    pub async fn len(&self) -> usize {
        self.concepts.read().await.len()
    }

    /// Whether the store is empty.
    pub async fn is_empty(&self) -> bool {
        self.concepts.read().await.is_empty()
    }
}

#[async_trait]
impl SemanticStore for MemorySemanticStore {
    async fn search(
        &self,
        vector: &[f32],
        limit: usize,
        min_score: f64,
        filter: Option<&PayloadFilter>,
    ) -> Result<Vec<SemanticHit>> {
        let concepts = self.concepts.read().await;
        let mut hits: Vec<SemanticHit> = concepts
            .values()
            .filter(|c| filter.is_none_or(|f| f.matches(&c.payload)))
            .map(|c| SemanticHit {
                id: c.id.clone(),
                score: f64::from(cosine_similarity(vector, &c.vector)),
                payload: c.payload.clone(),
            })
            .filter(|hit| hit.score >= min_score)
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        hits.truncate(limit);
        Ok(hits)
    }

    async fn upsert(
        &self,
        vector: Vec<f32>,
        payload: Value,
        id: Option<String>,
    ) -> Result<String> {
        let id = id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        self.concepts.write().await.insert(
            id.clone(),
            StoredConcept {
                id: id.clone(),
                vector,
                payload,
            },
        );
        Ok(id)
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<StoredConcept>> {
        Ok(self.concepts.read().await.get(id).cloned())
    }

    async fn delete(&self, ids: &[String]) -> Result<()> {
        let mut concepts = self.concepts.write().await;
        for id in ids {
            concepts.remove(id);
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "memory-semantic"
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_upsert_generates_and_keeps_ids() {
        let store = MemorySemanticStore::new();
        let generated = store
            .upsert(vec![1.0, 0.0], json!({"name": "a"}), None)
            .await
            .unwrap();
        assert!(!generated.is_empty());

        let fixed = store
            .upsert(vec![0.0, 1.0], json!({"name": "b"}), Some("b".into()))
            .await
            .unwrap();
        assert_eq!(fixed, "b");
        assert_eq!(store.len().await, 2);

        store
            .upsert(vec![0.0, 1.0], json!({"name": "b2"}), Some("b".into()))
            .await
            .unwrap();
        assert_eq!(store.len().await, 2);
        let stored = store.get_by_id("b").await.unwrap().unwrap();
        assert_eq!(stored.payload["name"], "b2");
    }

    #[tokio::test]
    async fn test_search_orders_by_score_and_applies_min_score() {
        let store = MemorySemanticStore::new();
        store
            .upsert(vec![1.0, 0.0], json!({}), Some("x".into()))
            .await
            .unwrap();
        store
            .upsert(vec![0.7, 0.7], json!({}), Some("diag".into()))
            .await
            .unwrap();
        store
            .upsert(vec![0.0, 1.0], json!({}), Some("y".into()))
            .await
            .unwrap();

        let hits = store.search(&[1.0, 0.0], 10, 0.5, None).await.unwrap();
        let ids: Vec<_> = hits.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["x", "diag"]);

        let hits = store.search(&[1.0, 0.0], 1, 0.0, None).await.unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[tokio::test]
    async fn test_search_with_filter() {
        let store = MemorySemanticStore::new();
        store
            .upsert(vec![1.0], json!({"source_table": "orders"}), Some("o".into()))
            .await
            .unwrap();
        store
            .upsert(vec![1.0], json!({"source_table": "users"}), Some("u".into()))
            .await
            .unwrap();

        let filter = PayloadFilter::new().eq("source_table", "users");
        let hits = store
            .search(&[1.0], 10, 0.0, Some(&filter))
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "u");
    }

    #[tokio::test]
    async fn test_delete_ignores_unknown() {
        let store = MemorySemanticStore::new();
        store
            .upsert(vec![1.0], json!({}), Some("a".into()))
            .await
            .unwrap();
        store
            .delete(&["a".to_string(), "missing".to_string()])
            .await
            .unwrap();
        assert!(store.is_empty().await);
        assert!(store.get_by_id("a").await.unwrap().is_none());
    }

    #[test]
    fn test_empty_filter_matches_everything() {
        assert!(PayloadFilter::new().matches(&json!({"k": 1})));
        assert!(!PayloadFilter::new().eq("k", 2).matches(&json!({"k": 1})));
    }
}
