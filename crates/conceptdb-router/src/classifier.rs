//! Query classification.
//!
//! A query is scored against two fixed keyword sets and a structural check
//! (does it start with a DML/DQL verb). Keyword hits are distinct keywords
//! found on word boundaries, case-insensitively. When the keyword signals
//! are inconclusive the precise store's complexity estimate decides.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Keywords indicating a structured query.
pub const SQL_KEYWORDS: &[&str] = &[
    "select", "from", "where", "insert", "update", "delete", "join", "group by", "order by",
    "having",
];

/// Keywords indicating fuzzy, meaning-based intent.
pub const SEMANTIC_KEYWORDS: &[&str] = &[
    "similar",
    "like",
    "related",
    "might",
    "could",
    "probably",
    "seems",
    "about",
    "around",
    "near",
    "suggest",
    "recommend",
    "find me",
    "show me",
];

/// Confidence assigned to structurally or lexically obvious SQL.
pub const SQL_CONFIDENCE: f64 = 0.95;

/// Confidence assigned to queries mixing both keyword sets.
pub const HYBRID_CONFIDENCE: f64 = 0.6;

/// Complexity at or below which an inconclusive query is treated as SQL.
pub const COMPLEXITY_SQL_CEILING: f64 = 0.5;

/// Complexity used when the precise store cannot estimate one.
pub const DEFAULT_COMPLEXITY: f64 = 0.5;

fn keyword_patterns(keywords: &'static [&'static str]) -> Vec<(&'static str, Regex)> {
    keywords
        .iter()
        .filter_map(|kw| {
            let body = regex::escape(kw).replace(' ', r"\s+");
            Regex::new(&format!(r"(?i)\b{body}\b"))
                .ok()
                .map(|re| (*kw, re))
        })
        .collect()
}

static SQL_PATTERNS: LazyLock<Vec<(&'static str, Regex)>> =
    LazyLock::new(|| keyword_patterns(SQL_KEYWORDS));

static SEMANTIC_PATTERNS: LazyLock<Vec<(&'static str, Regex)>> =
    LazyLock::new(|| keyword_patterns(SEMANTIC_KEYWORDS));

#[allow(clippy::expect_used)]
static SQL_STRUCTURE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(select|insert|update|delete|with)(\s+|$)")
        .expect("valid structure pattern")
});

/// The kind of query, as far as routing is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryType {
    /// Structured query for the precise store.
    Sql,
    /// Free-form, meaning-based query.
    NaturalLanguage,
    /// Mixes structured and semantic signals.
    Hybrid,
}

impl QueryType {
    /// Stable string form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sql => "sql",
            Self::NaturalLanguage => "natural_language",
            Self::Hybrid => "hybrid",
        }
    }
}

impl fmt::Display for QueryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw keyword and structure signals found in a query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Signals {
    /// Distinct SQL keywords present.
    pub sql_keywords: Vec<&'static str>,
    /// Distinct semantic keywords present.
    pub semantic_keywords: Vec<&'static str>,
    /// Whether the query starts with a DML/DQL verb.
    pub structural: bool,
}

impl Signals {
    /// Scan a query for keyword and structure signals.
    pub fn scan(query: &str) -> Self {
        let hits = |patterns: &[(&'static str, Regex)]| {
            patterns
                .iter()
                .filter(|(_, re)| re.is_match(query))
                .map(|(kw, _)| *kw)
                .collect::<Vec<_>>()
        };
        Self {
            sql_keywords: hits(&SQL_PATTERNS),
            semantic_keywords: hits(&SEMANTIC_PATTERNS),
            structural: SQL_STRUCTURE.is_match(query),
        }
    }

    /// Classify from keywords alone; `None` when a complexity estimate is
    /// needed.
    pub fn classify(&self) -> Option<Classification> {
        let sql = self.sql_keywords.len();
        let semantic = self.semantic_keywords.len();

        let (query_type, confidence) = if self.structural || sql >= 2 {
            (QueryType::Sql, SQL_CONFIDENCE)
        } else if semantic >= 2 && sql == 0 {
            (QueryType::NaturalLanguage, semantic_confidence(semantic))
        } else if sql > 0 && semantic > 0 {
            (QueryType::Hybrid, HYBRID_CONFIDENCE)
        } else {
            return None;
        };

        Some(Classification {
            query_type,
            confidence,
            signals: self.clone(),
            complexity: None,
        })
    }

    /// Classify an inconclusive query by its estimated complexity.
    pub fn classify_by_complexity(&self, complexity: f64) -> Classification {
        let complexity = if complexity.is_finite() {
            complexity.clamp(0.0, 1.0)
        } else {
            DEFAULT_COMPLEXITY
        };
        let query_type = if complexity <= COMPLEXITY_SQL_CEILING {
            QueryType::Sql
        } else {
            QueryType::NaturalLanguage
        };
        Classification {
            query_type,
            confidence: complexity,
            signals: self.clone(),
            complexity: Some(complexity),
        }
    }
}

/// `min(0.5 + 0.15 * hits, 0.95)`, computed in hundredths so that
/// two hits give exactly 0.8.
fn semantic_confidence(hits: usize) -> f64 {
    let hundredths = (50 + 15 * hits.min(100)).min(95);
    hundredths as f64 / 100.0
}

/// The classifier's verdict on a query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Classification {
    /// Query type.
    pub query_type: QueryType,
    /// Confidence in `[0, 1]`.
    pub confidence: f64,
    /// Signals the verdict was derived from.
    pub signals: Signals,
    /// Complexity estimate, when one was needed.
    pub complexity: Option<f64>,
}

impl Classification {
    /// Whether the verdict came from the complexity fallback.
    pub fn by_complexity(&self) -> bool {
        self.complexity.is_some()
    }
}
