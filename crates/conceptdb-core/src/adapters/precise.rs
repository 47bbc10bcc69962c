//! Precise (relational) store capability and an in-memory implementation.
//!
//! The precise store answers exact-match statements, exposes schema
//! introspection and sampling for concept extraction, reports rows changed
//! since a checkpoint, and records concept coverage mappings written back by
//! the sync manager.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::LazyLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::RwLock;

use crate::{Error, Result};

// ============================================================================
// Rows and columns
// ============================================================================

/// Name of the column carrying a row's modification marker.
pub const UPDATED_AT_COLUMN: &str = "updated_at";

/// A single row: column name to JSON value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Row(Map<String, Value>);

impl Row {
    /// Create an empty row.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a column value.
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(column.into(), value.into());
        self
    }

    /// Get a column value.
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.0.get(column)
    }

    /// All column values.
    pub fn values(&self) -> &Map<String, Value> {
        &self.0
    }

    /// The row's `id` column, stringified.
    pub fn id(&self) -> Option<String> {
        match self.0.get("id")? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// Identity used for de-duplication: the `id` column, or the
    /// serialized row when there is none.
    pub fn identity_key(&self) -> String {
        self.id()
            .unwrap_or_else(|| Value::Object(self.0.clone()).to_string())
    }

    /// The row's modification marker, if present and RFC 3339.
    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.0
            .get(UPDATED_AT_COLUMN)
            .and_then(Value::as_str)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
    }

    /// Text-valued columns, excluding identifiers and timestamps.
    pub fn text_fields(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().filter_map(|(k, v)| match v {
            Value::String(s) if k != "id" && k != UPDATED_AT_COLUMN && !s.is_empty() => {
                Some((k.as_str(), s.as_str()))
            }
            _ => None,
        })
    }

    /// Convert into a JSON object value.
    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

impl From<Map<String, Value>> for Row {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Column description returned by schema introspection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    /// Column name.
    pub name: String,
    /// Logical type name ("text", "number", "boolean", "json").
    pub data_type: String,
    /// Whether some row lacks a value for this column.
    pub nullable: bool,
}

/// A concept coverage mapping recorded in the precise store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageMapping {
    /// Source table.
    pub table: String,
    /// Concept id in the semantic store.
    pub concept_id: String,
    /// Extraction confidence.
    pub confidence: f64,
    /// When the mapping was last written.
    pub updated_at: DateTime<Utc>,
}

// ============================================================================
// Capability trait
// ============================================================================

/// Capability interface over the precise (relational) store.
#[async_trait]
pub trait PreciseStore: Send + Sync {
    /// Execute a statement with positional parameters (`$1`, `$2`, ...).
    async fn execute(&self, query: &str, params: &[Value]) -> Result<Vec<Row>>;

    /// Return up to `limit` rows from `table`.
    async fn sample(&self, table: &str, limit: usize) -> Result<Vec<Row>>;

    /// Describe the columns of `table`.
    async fn schema(&self, table: &str) -> Result<Vec<Column>>;

    /// Create or update the coverage mapping for `(table, concept_id)`.
    async fn upsert_coverage_mapping(
        &self,
        table: &str,
        concept_id: &str,
        confidence: f64,
    ) -> Result<()>;

    /// List user tables.
    async fn tables(&self) -> Result<Vec<String>>;

    /// Rows of `table` whose modification marker is newer than `since`.
    ///
    /// Tables without a modification marker report no changes.
    async fn changed_since(&self, table: &str, since: DateTime<Utc>) -> Result<Vec<Row>>;

    /// Estimate how complex answering `query` would be, in `[0, 1]`.
    async fn estimate_complexity(&self, query: &str) -> Result<f64>;

    /// Store name for diagnostics.
    fn name(&self) -> &str {
        "precise"
    }
}

// ============================================================================
// In-memory implementation
// ============================================================================

/// Dataset fixture: table name to rows.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Dataset {
    /// Rows per table.
    #[serde(default)]
    pub tables: BTreeMap<String, Vec<Row>>,
}

impl Dataset {
    /// Load a dataset from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| Error::io_with_path(e, path))?;
        Ok(serde_json::from_str(&json)?)
    }
}

#[allow(clippy::expect_used)]
static COUNT_STMT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*select\s+count\(\*\)\s+from\s+(?P<table>\w+)\s*;?\s*$")
        .expect("valid count pattern")
});

#[allow(clippy::expect_used)]
static SELECT_STMT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^\s*select\s+\*\s+from\s+(?P<table>\w+)(?:\s+where\s+(?P<col>\w+)\s*(?P<op>=|>|<)\s*(?P<val>'[^']*'|\$\d+|-?\d+(?:\.\d+)?))?(?:\s+limit\s+(?P<limit>\d+))?\s*;?\s*$",
    )
    .expect("valid select pattern")
});

/// An in-memory precise store.
///
/// Understands `SELECT * FROM t [WHERE c = 'v' | c > n | c < n | c = $1]
/// [LIMIT n]` and `SELECT COUNT(*) FROM t`; anything else is rejected as
/// unsupported. String equality is case-insensitive.
#[derive(Default)]
pub struct MemoryPreciseStore {
    tables: RwLock<BTreeMap<String, Vec<Row>>>,
    mappings: RwLock<BTreeMap<(String, String), CoverageMapping>>,
}

impl MemoryPreciseStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store holding the rows of `dataset`.
    pub fn from_dataset(dataset: Dataset) -> Self {
        Self {
            tables: RwLock::new(dataset.tables),
            mappings: RwLock::new(BTreeMap::new()),
        }
    }

    /// Insert a row, replacing any existing row with the same `id`.
    ///
    /// Rows without an `updated_at` marker are stamped with the current time.
    pub async fn upsert_row(&self, table: &str, mut row: Row) {
        if row.get(UPDATED_AT_COLUMN).is_none() {
            row = row.with(UPDATED_AT_COLUMN, Utc::now().to_rfc3339());
        }
        let mut tables = self.tables.write().await;
        let rows = tables.entry(table.to_string()).or_default();
        match row.id() {
            Some(id) => match rows.iter_mut().find(|r| r.id().as_deref() == Some(id.as_str())) {
                Some(existing) => *existing = row,
                None => rows.push(row),
            },
            None => rows.push(row),
        }
    }

    /// All coverage mappings written so far.
    pub async fn coverage_mappings(&self) -> Vec<CoverageMapping> {
        self.mappings.read().await.values().cloned().collect()
    }

    fn resolve_value(raw: &str, params: &[Value]) -> Result<Value> {
        if let Some(quoted) = raw.strip_prefix('\'').and_then(|s| s.strip_suffix('\'')) {
            return Ok(Value::String(quoted.to_string()));
        }
        if let Some(index) = raw.strip_prefix('$') {
            let index: usize = index
                .parse()
                .map_err(|_| Error::invalid_data(format!("bad parameter reference {raw}")))?;
            return params
                .get(index.wrapping_sub(1))
                .cloned()
                .ok_or_else(|| Error::invalid_data(format!("missing parameter {raw}")));
        }
        raw.parse::<f64>()
            .map(Value::from)
            .map_err(|_| Error::invalid_data(format!("bad literal {raw}")))
    }

    fn matches(row: &Row, column: &str, op: &str, expected: &Value) -> bool {
        let Some(actual) = row.get(column) else {
            return false;
        };
        match op {
            "=" => match (actual, expected) {
                (Value::String(a), Value::String(b)) => a.eq_ignore_ascii_case(b),
                _ => match (as_number(actual), as_number(expected)) {
                    (Some(a), Some(b)) => a == b,
                    _ => actual == expected,
                },
            },
            ">" | "<" => match (as_number(actual), as_number(expected)) {
                (Some(a), Some(b)) if op == ">" => a > b,
                (Some(a), Some(b)) => a < b,
                _ => false,
            },
            _ => false,
        }
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::String(_) => "text",
        Value::Number(_) => "number",
        Value::Bool(_) => "boolean",
        _ => "json",
    }
}

#[async_trait]
impl PreciseStore for MemoryPreciseStore {
    async fn execute(&self, query: &str, params: &[Value]) -> Result<Vec<Row>> {
        let tables = self.tables.read().await;

        if let Some(caps) = COUNT_STMT.captures(query) {
            let table = &caps["table"];
            let rows = tables
                .get(table)
                .ok_or_else(|| Error::not_found(format!("table {table}")))?;
            return Ok(vec![Row::new().with("count", rows.len())]);
        }

        let caps = SELECT_STMT
            .captures(query)
            .ok_or_else(|| Error::unsupported(format!("statement: {query}")))?;
        let table = &caps["table"];
        let rows = tables
            .get(table)
            .ok_or_else(|| Error::not_found(format!("table {table}")))?;

        let filter = match (caps.name("col"), caps.name("op"), caps.name("val")) {
            (Some(col), Some(op), Some(val)) => Some((
                col.as_str(),
                op.as_str(),
                Self::resolve_value(val.as_str(), params)?,
            )),
            _ => None,
        };
        let limit = caps
            .name("limit")
            .and_then(|m| m.as_str().parse::<usize>().ok())
            .unwrap_or(usize::MAX);

        Ok(rows
            .iter()
            .filter(|row| match &filter {
                Some((col, op, expected)) => Self::matches(row, col, op, expected),
                None => true,
            })
            .take(limit)
            .cloned()
            .collect())
    }

    async fn sample(&self, table: &str, limit: usize) -> Result<Vec<Row>> {
        let tables = self.tables.read().await;
        let rows = tables
            .get(table)
            .ok_or_else(|| Error::not_found(format!("table {table}")))?;
        Ok(rows.iter().take(limit).cloned().collect())
    }

    async fn schema(&self, table: &str) -> Result<Vec<Column>> {
        let tables = self.tables.read().await;
        let rows = tables
            .get(table)
            .ok_or_else(|| Error::not_found(format!("table {table}")))?;

        let mut columns: BTreeMap<String, (String, usize)> = BTreeMap::new();
        for row in rows {
            for (name, value) in row.values() {
                let entry = columns
                    .entry(name.clone())
                    .or_insert_with(|| (type_name(value).to_string(), 0));
                entry.1 += 1;
            }
        }

        Ok(columns
            .into_iter()
            .map(|(name, (data_type, seen))| Column {
                name,
                data_type,
                nullable: seen < rows.len(),
            })
            .collect())
    }

    async fn upsert_coverage_mapping(
        &self,
        table: &str,
        concept_id: &str,
        confidence: f64,
    ) -> Result<()> {
        let mapping = CoverageMapping {
            table: table.to_string(),
            concept_id: concept_id.to_string(),
            confidence,
            updated_at: Utc::now(),
        };
        self.mappings
            .write()
            .await
            .insert((table.to_string(), concept_id.to_string()), mapping);
        Ok(())
    }

    async fn tables(&self) -> Result<Vec<String>> {
        Ok(self.tables.read().await.keys().cloned().collect())
    }

    async fn changed_since(&self, table: &str, since: DateTime<Utc>) -> Result<Vec<Row>> {
        let tables = self.tables.read().await;
        let rows = tables
            .get(table)
            .ok_or_else(|| Error::not_found(format!("table {table}")))?;
        Ok(rows
            .iter()
            .filter(|row| row.updated_at().is_some_and(|ts| ts > since))
            .cloned()
            .collect())
    }

    async fn estimate_complexity(&self, query: &str) -> Result<f64> {
        // Longer free-form questions are more expensive to answer exactly.
        let words = query.split_whitespace().count() as f64;
        Ok((words / 12.0).min(1.0))
    }

    fn name(&self) -> &str {
        "memory-precise"
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn seeded() -> MemoryPreciseStore {
        let store = MemoryPreciseStore::new();
        store
            .upsert_row(
                "customers",
                Row::new()
                    .with("id", 1)
                    .with("name", "Ada")
                    .with("city", "Paris")
                    .with("orders", 12),
            )
            .await;
        store
            .upsert_row(
                "customers",
                Row::new()
                    .with("id", 2)
                    .with("name", "Grace")
                    .with("city", "London")
                    .with("orders", 3)
                    .with("email", "grace@example.com")
                    .with("updated_at", "2030-01-01T00:00:00Z"),
            )
            .await;
        store
    }

    #[test]
    fn test_row_identity_key() {
        let with_id = Row::new().with("id", 7).with("name", "x");
        assert_eq!(with_id.identity_key(), "7");

        let without_id = Row::new().with("name", "x");
        assert_eq!(without_id.identity_key(), r#"{"name":"x"}"#);
    }

    #[test]
    fn test_row_updated_at_parsing() {
        let row = Row::new().with("updated_at", "2024-05-01T10:00:00Z");
        assert!(row.updated_at().is_some());
        assert!(Row::new().with("updated_at", "yesterday").updated_at().is_none());
    }

    #[test]
    fn test_row_text_fields_skip_id_and_marker() {
        let row = Row::new()
            .with("id", "abc")
            .with("title", "Late delivery")
            .with("updated_at", "2024-05-01T10:00:00Z")
            .with("score", 4);
        let fields: Vec<_> = row.text_fields().collect();
        assert_eq!(fields, vec![("title", "Late delivery")]);
    }

    #[tokio::test]
    async fn test_select_all_with_limit() {
        let store = seeded().await;
        let rows = store
            .execute("SELECT * FROM customers LIMIT 1", &[])
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn test_select_where_string_case_insensitive() {
        let store = seeded().await;
        let rows = store
            .execute("select * from customers where city = 'paris'", &[])
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id().as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn test_select_where_numeric_and_param() {
        let store = seeded().await;
        let rows = store
            .execute("SELECT * FROM customers WHERE orders > 5", &[])
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);

        let rows = store
            .execute("SELECT * FROM customers WHERE name = $1", &[json!("Grace")])
            .await
            .unwrap();
        assert_eq!(rows[0].id().as_deref(), Some("2"));
    }

    #[tokio::test]
    async fn test_count() {
        let store = seeded().await;
        let rows = store
            .execute("SELECT COUNT(*) FROM customers", &[])
            .await
            .unwrap();
        assert_eq!(rows[0].get("count"), Some(&json!(2)));
    }

    #[tokio::test]
    async fn test_unsupported_and_unknown_table() {
        let store = seeded().await;
        let err = store.execute("DROP TABLE customers", &[]).await.unwrap_err();
        assert!(matches!(err, Error::Unsupported(_)));

        let err = store.execute("SELECT * FROM nope", &[]).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_missing_parameter() {
        let store = seeded().await;
        let err = store
            .execute("SELECT * FROM customers WHERE name = $2", &[json!("x")])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidData(_)));
    }

    #[tokio::test]
    async fn test_upsert_row_replaces_by_id() {
        let store = seeded().await;
        store
            .upsert_row("customers", Row::new().with("id", 1).with("name", "Ada L."))
            .await;
        let rows = store.sample("customers", 10).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("name"), Some(&json!("Ada L.")));
    }

    #[tokio::test]
    async fn test_upsert_row_stamps_missing_marker() {
        let store = seeded().await;
        let before = Utc::now() - chrono::Duration::seconds(1);
        store
            .upsert_row("orders", Row::new().with("id", 9).with("note", "rush"))
            .await;

        let changed = store.changed_since("orders", before).await.unwrap();
        assert_eq!(changed.len(), 1);
        assert!(changed[0].updated_at().is_some());

        let explicit = store.sample("customers", 10).await.unwrap();
        assert_eq!(
            explicit[1].get("updated_at"),
            Some(&json!("2030-01-01T00:00:00Z"))
        );
    }

    #[tokio::test]
    async fn test_schema_nullable() {
        let store = seeded().await;
        let schema = store.schema("customers").await.unwrap();
        let email = schema.iter().find(|c| c.name == "email").unwrap();
        assert!(email.nullable);
        let name = schema.iter().find(|c| c.name == "name").unwrap();
        assert!(!name.nullable);
        assert_eq!(name.data_type, "text");
    }

    #[tokio::test]
    async fn test_changed_since() {
        let store = seeded().await;
        let since = DateTime::parse_from_rfc3339("2029-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let changed = store.changed_since("customers", since).await.unwrap();
        assert_eq!(changed.len(), 1);
        assert_eq!(changed[0].id().as_deref(), Some("2"));
    }

    #[tokio::test]
    async fn test_coverage_mapping_upsert() {
        let store = seeded().await;
        store
            .upsert_coverage_mapping("customers", "c1", 0.4)
            .await
            .unwrap();
        store
            .upsert_coverage_mapping("customers", "c1", 0.9)
            .await
            .unwrap();
        let mappings = store.coverage_mappings().await;
        assert_eq!(mappings.len(), 1);
        assert_eq!(mappings[0].confidence, 0.9);
    }

    #[tokio::test]
    async fn test_dataset_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dataset.json");
        std::fs::write(
            &path,
            r#"{"tables": {"products": [{"id": "p1", "name": "Laptop"}]}}"#,
        )
        .unwrap();

        let store = MemoryPreciseStore::from_dataset(Dataset::load(&path).unwrap());
        assert_eq!(store.tables().await.unwrap(), vec!["products".to_string()]);
    }

    #[tokio::test]
    async fn test_estimate_complexity_bounded() {
        let store = MemoryPreciseStore::new();
        assert!(store.estimate_complexity("hi").await.unwrap() < 0.5);
        let long = "word ".repeat(40);
        assert_eq!(store.estimate_complexity(&long).await.unwrap(), 1.0);
    }
}
