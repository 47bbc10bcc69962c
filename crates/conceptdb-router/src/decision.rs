//! Routing decisions, the decision log, and routing statistics.
//!
//! Every routed query appends exactly one [`DecisionRecord`] to the
//! [`DecisionLog`]. The log keeps a bounded window of recent records for
//! windowed statistics, and lifetime totals that survive eviction for the
//! evolution metrics.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Days, NaiveDate, Utc};
use conceptdb_core::BoundedLog;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::classifier::QueryType;

// ============================================================================
// Types
// ============================================================================

/// Where a query was dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingDecision {
    /// Precise store only.
    PreciseOnly,
    /// Semantic store only.
    SemanticOnly,
    /// Both stores, merged.
    Both,
    /// Routed branches failed; the raw text was executed on the precise store.
    PreciseFallback,
    /// Every attempt failed; no results.
    Failed,
}

impl RoutingDecision {
    /// All decisions, in display order.
    pub const ALL: [RoutingDecision; 5] = [
        Self::PreciseOnly,
        Self::SemanticOnly,
        Self::Both,
        Self::PreciseFallback,
        Self::Failed,
    ];

    /// Whether this decision consulted the semantic store.
    pub fn consults_semantic(&self) -> bool {
        matches!(self, Self::SemanticOnly | Self::Both)
    }

    /// Stable string form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PreciseOnly => "precise_only",
            Self::SemanticOnly => "semantic_only",
            Self::Both => "both",
            Self::PreciseFallback => "precise_fallback",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for RoutingDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A dispatch branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Branch {
    /// Precise store call.
    Precise,
    /// Semantic store call.
    Semantic,
    /// Raw-text fallback on the precise store.
    Fallback,
}

impl fmt::Display for Branch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Precise => "precise",
            Self::Semantic => "semantic",
            Self::Fallback => "fallback",
        })
    }
}

/// A failed branch and its cause.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BranchFailure {
    /// Which branch failed.
    pub branch: Branch,
    /// Error message.
    pub error: String,
}

/// Append-only record of one routed query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionRecord {
    /// Record id.
    pub id: Uuid,
    /// Query text, truncated.
    pub query: String,
    /// Classified query type.
    pub query_type: QueryType,
    /// Final routing decision.
    pub decision: RoutingDecision,
    /// Reported confidence.
    pub confidence: f64,
    /// Number of results returned.
    pub result_count: usize,
    /// Dispatch latency in milliseconds.
    pub latency_ms: f64,
    /// Completion time.
    pub timestamp: DateTime<Utc>,
    /// Branch failures observed while answering.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<BranchFailure>,
    /// Version of the policy snapshot the query was routed against.
    pub policy_version: u64,
}

/// Cumulative counters for one decision kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DecisionTotals {
    /// Number of queries.
    pub count: u64,
    /// Sum of latencies in milliseconds.
    pub total_latency_ms: f64,
    /// Queries with at least one failed branch.
    pub failures: u64,
    /// Sum of result counts.
    pub results: u64,
}

impl DecisionTotals {
    fn add(&mut self, record: &DecisionRecord) {
        self.count += 1;
        self.total_latency_ms += record.latency_ms;
        if !record.failures.is_empty() {
            self.failures += 1;
        }
        self.results += record.result_count as u64;
    }

    /// Mean latency, if any queries were counted.
    pub fn mean_latency_ms(&self) -> Option<f64> {
        (self.count > 0).then(|| self.total_latency_ms / self.count as f64)
    }
}

/// Totals across all decisions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LifetimeTotals {
    /// Queries routed since startup.
    pub total: u64,
    /// Per-decision counters.
    pub by_decision: BTreeMap<RoutingDecision, DecisionTotals>,
}

impl LifetimeTotals {
    /// Counters for `decision` (zero when never seen).
    pub fn get(&self, decision: RoutingDecision) -> DecisionTotals {
        self.by_decision.get(&decision).cloned().unwrap_or_default()
    }

    /// Share of queries that consulted the semantic store.
    pub fn concept_usage_ratio(&self) -> f64 {
        usage_ratio(self.total, &self.by_decision)
    }
}

fn usage_ratio(total: u64, by_decision: &BTreeMap<RoutingDecision, DecisionTotals>) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let semantic: u64 = by_decision
        .iter()
        .filter(|(d, _)| d.consults_semantic())
        .map(|(_, t)| t.count)
        .sum();
    semantic as f64 / total as f64
}

/// Aggregate statistics for one decision kind within a window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionStats {
    /// Number of queries.
    pub count: u64,
    /// Mean latency in milliseconds.
    pub mean_latency_ms: f64,
    /// Queries with at least one failed branch.
    pub failures: u64,
    /// Sum of result counts.
    pub results: u64,
}

/// Routing statistics over a window plus lifetime totals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingStats {
    /// Window length, or `None` for the whole retained log.
    pub window_secs: Option<u64>,
    /// Queries within the window.
    pub total: u64,
    /// Per-decision statistics within the window.
    pub by_decision: BTreeMap<RoutingDecision, DecisionStats>,
    /// Share of windowed queries that consulted the semantic store.
    pub concept_usage_ratio: f64,
    /// Records currently retained.
    pub retained: usize,
    /// Records evicted from the retained window so far.
    pub evicted: u64,
    /// Lifetime totals.
    pub lifetime: LifetimeTotals,
}

/// Routing activity for one calendar day (UTC).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyRouting {
    /// The day.
    pub date: NaiveDate,
    /// Queries routed that day.
    pub total_queries: u64,
    /// Queries that consulted the semantic store.
    pub semantic_queries: u64,
    /// Queries answered by the precise store alone, fallbacks included.
    pub precise_queries: u64,
    /// `semantic_queries / total_queries`, 0 on days without queries.
    pub conceptualization_ratio: f64,
    /// Mean reported confidence, 0 on days without queries.
    pub avg_confidence: f64,
    /// Mean dispatch latency, 0 on days without queries.
    pub avg_latency_ms: f64,
}

impl DailyRouting {
    fn empty(date: NaiveDate) -> Self {
        Self {
            date,
            total_queries: 0,
            semantic_queries: 0,
            precise_queries: 0,
            conceptualization_ratio: 0.0,
            avg_confidence: 0.0,
            avg_latency_ms: 0.0,
        }
    }
}

/// Bucket `records` into one entry per day for the `days` days ending on
/// `today`, oldest first. Days without queries are present with zero counts.
pub fn daily_timeline<'a>(
    records: impl IntoIterator<Item = &'a DecisionRecord>,
    days: u32,
    today: NaiveDate,
) -> Vec<DailyRouting> {
    let mut buckets: BTreeMap<NaiveDate, (DailyRouting, f64, f64)> = (0..days)
        .filter_map(|back| today.checked_sub_days(Days::new(u64::from(back))))
        .map(|date| (date, (DailyRouting::empty(date), 0.0, 0.0)))
        .collect();

    for record in records {
        let Some((day, confidence, latency)) = buckets.get_mut(&record.timestamp.date_naive())
        else {
            continue;
        };
        day.total_queries += 1;
        if record.decision.consults_semantic() {
            day.semantic_queries += 1;
        } else if matches!(
            record.decision,
            RoutingDecision::PreciseOnly | RoutingDecision::PreciseFallback
        ) {
            day.precise_queries += 1;
        }
        *confidence += record.confidence;
        *latency += record.latency_ms;
    }

    buckets
        .into_values()
        .map(|(mut day, confidence, latency)| {
            if day.total_queries > 0 {
                let n = day.total_queries as f64;
                day.conceptualization_ratio = day.semantic_queries as f64 / n;
                day.avg_confidence = confidence / n;
                day.avg_latency_ms = latency / n;
            }
            day
        })
        .collect()
}

// ============================================================================
// Decision log
// ============================================================================

struct LogState {
    records: BoundedLog<DecisionRecord>,
    lifetime: LifetimeTotals,
}

/// Bounded decision log with lifetime totals.
pub struct DecisionLog {
    state: Mutex<LogState>,
}

impl DecisionLog {
    /// Create a log retaining at most `capacity` records.
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(LogState {
                records: BoundedLog::new(capacity),
                lifetime: LifetimeTotals::default(),
            }),
        }
    }

    /// Append a record.
    pub async fn append(&self, record: DecisionRecord) {
        let mut state = self.state.lock().await;
        state.lifetime.total += 1;
        state
            .lifetime
            .by_decision
            .entry(record.decision)
            .or_default()
            .add(&record);
        state.records.push(record);
    }

    /// Lifetime totals.
    pub async fn lifetime(&self) -> LifetimeTotals {
        self.state.lock().await.lifetime.clone()
    }

    /// The most recent `n` records, oldest first.
    pub async fn recent(&self, n: usize) -> Vec<DecisionRecord> {
        self.state.lock().await.records.tail(n)
    }

    /// Number of retained records.
    pub async fn len(&self) -> usize {
        self.state.lock().await.records.len()
    }

    /// Whether no records are retained.
    pub async fn is_empty(&self) -> bool {
        self.state.lock().await.records.is_empty()
    }

    /// Statistics over retained records newer than `now - window`.
    pub async fn stats(&self, window: Option<Duration>) -> RoutingStats {
        let state = self.state.lock().await;
        let cutoff = window
            .and_then(|w| chrono::Duration::from_std(w).ok())
            .and_then(|w| Utc::now().checked_sub_signed(w));

        let mut totals: BTreeMap<RoutingDecision, DecisionTotals> = BTreeMap::new();
        let mut total = 0u64;
        for record in state
            .records
            .iter()
            .filter(|r| cutoff.is_none_or(|c| r.timestamp >= c))
        {
            total += 1;
            totals.entry(record.decision).or_default().add(record);
        }

        let concept_usage_ratio = usage_ratio(total, &totals);
        let by_decision = totals
            .into_iter()
            .map(|(decision, t)| {
                (
                    decision,
                    DecisionStats {
                        count: t.count,
                        mean_latency_ms: t.mean_latency_ms().unwrap_or(0.0),
                        failures: t.failures,
                        results: t.results,
                    },
                )
            })
            .collect();

        RoutingStats {
            window_secs: window.map(|w| w.as_secs()),
            total,
            by_decision,
            concept_usage_ratio,
            retained: state.records.len(),
            evicted: state.records.evicted(),
            lifetime: state.lifetime.clone(),
        }
    }

    /// Per-day routing activity over the last `days` days, today included,
    /// computed from the retained records.
    pub async fn timeline(&self, days: u32) -> Vec<DailyRouting> {
        let state = self.state.lock().await;
        daily_timeline(state.records.iter(), days, Utc::now().date_naive())
    }
}

// ============================================================================
// Tests
// ============================================================================
