//! Result items and the `Both` merge.

use std::collections::HashSet;

use conceptdb_core::{Row, SemanticHit};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Which store produced a hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HitSource {
    /// The precise (relational) store.
    Precise,
    /// The semantic (vector) store.
    Semantic,
}

/// A single routed result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryHit {
    /// Identity key used for de-duplication.
    pub id: String,
    /// Producing store.
    pub source: HitSource,
    /// Similarity score (semantic hits only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    /// Row or concept payload.
    pub data: Value,
}

impl QueryHit {
    /// Wrap a precise-store row.
    pub fn from_row(row: Row) -> Self {
        Self {
            id: row.identity_key(),
            source: HitSource::Precise,
            score: None,
            data: row.into_value(),
        }
    }

    /// Wrap a semantic-store hit.
    pub fn from_semantic(hit: SemanticHit) -> Self {
        Self {
            id: hit.id,
            source: HitSource::Semantic,
            score: Some(hit.score),
            data: hit.payload,
        }
    }
}

/// Concatenate precise hits before semantic hits and drop later duplicates
/// by identity key.
pub fn merge_hits(precise: Vec<QueryHit>, semantic: Vec<QueryHit>) -> Vec<QueryHit> {
    let mut seen = HashSet::new();
    precise
        .into_iter()
        .chain(semantic)
        .filter(|hit| seen.insert(hit.id.clone()))
        .collect()
}
