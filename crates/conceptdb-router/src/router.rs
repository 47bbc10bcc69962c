//! The query router.
//!
//! Classifies a query, picks a routing decision against a per-query policy
//! snapshot, dispatches to one or both stores under independent timeouts,
//! merges, and logs exactly one decision record. Store failures never
//! escape: they degrade to surviving-branch results, a raw-text fallback on
//! the precise store, or an empty `Failed` response.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use conceptdb_core::{
    EmbeddingProvider, Error, PreciseStore, Result, SemanticStore, truncate_chars,
};
use serde::Serialize;
use uuid::Uuid;

use crate::classifier::{Classification, DEFAULT_COMPLEXITY, QueryType, Signals};
use crate::config::RouterConfig;
use crate::decision::{
    Branch, BranchFailure, DailyRouting, DecisionLog, DecisionRecord, RoutingDecision,
    RoutingStats,
};
use crate::merge::{QueryHit, merge_hits};
use crate::nl_sql;
use crate::policy::{PolicyReader, Preference, RoutingPolicy};

// ============================================================================
// Request and response types
// ============================================================================

/// Per-request routing options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouteOptions {
    /// Truncate merged results to this many items.
    pub limit: Option<usize>,
    /// Store preference applied to this query's policy copy.
    pub prefer: Option<Preference>,
}

/// The response to a routed query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteResponse {
    /// Id of the decision record written for this query.
    pub record_id: Uuid,
    /// Final routing decision.
    pub decision: RoutingDecision,
    /// Classified query type.
    pub query_type: QueryType,
    /// Confidence; 0 for fallback and failed responses.
    pub confidence: f64,
    /// Results, precise before semantic.
    pub results: Vec<QueryHit>,
    /// Human-readable reason for the decision.
    pub explanation: String,
    /// Branch failures observed.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<BranchFailure>,
    /// Policy version the query was routed against.
    pub policy_version: u64,
    /// Dispatch latency in milliseconds.
    pub latency_ms: f64,
}

/// What the router would do with a query, without dispatching it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryExplanation {
    /// Classifier verdict.
    pub classification: Classification,
    /// Decision the query would get.
    pub decision: RoutingDecision,
    /// Human-readable reason.
    pub explanation: String,
    /// Policy copy the decision was made against.
    pub policy: RoutingPolicy,
}

// ============================================================================
// Decision
// ============================================================================

/// Routing decision for a classification under `policy`.
///
/// SQL always goes to the precise store and hybrid queries always go to
/// both. Natural language goes to the semantic store alone when its
/// confidence reaches the concrete-to-concept threshold, otherwise to both.
pub fn decide(classification: &Classification, policy: &RoutingPolicy) -> RoutingDecision {
    match classification.query_type {
        QueryType::Sql => RoutingDecision::PreciseOnly,
        QueryType::NaturalLanguage
            if classification.confidence >= policy.concrete_to_concept_threshold =>
        {
            RoutingDecision::SemanticOnly
        }
        QueryType::NaturalLanguage | QueryType::Hybrid => RoutingDecision::Both,
    }
}

fn explain_decision(
    classification: &Classification,
    decision: RoutingDecision,
    policy: &RoutingPolicy,
) -> String {
    let confidence = classification.confidence;
    match (decision, classification.query_type) {
        (RoutingDecision::PreciseOnly, _) if classification.by_complexity() => format!(
            "Low complexity ({confidence:.2}) query treated as SQL, routed to precise store"
        ),
        (RoutingDecision::PreciseOnly, _) => "Direct SQL query routed to precise store".to_string(),
        (RoutingDecision::SemanticOnly, _) => format!(
            "Natural-language query with confidence {confidence:.2} >= {:.2}, routed to semantic store",
            policy.concrete_to_concept_threshold
        ),
        (RoutingDecision::Both, QueryType::Hybrid) => {
            "Hybrid query checking both precise and semantic stores".to_string()
        }
        (RoutingDecision::Both, _) => format!(
            "Natural-language query with confidence {confidence:.2} < {:.2}, checking both stores",
            policy.concrete_to_concept_threshold
        ),
        (RoutingDecision::PreciseFallback, _) => "Precise-store fallback".to_string(),
        (RoutingDecision::Failed, _) => "Query failed".to_string(),
    }
}

async fn with_timeout<T>(
    backend: &str,
    limit: Duration,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| Error::timeout(backend, limit))?
}

fn failure(branch: Branch, error: &Error) -> BranchFailure {
    BranchFailure {
        branch,
        error: error.to_string(),
    }
}

/// What the precise branch will execute.
enum PreciseStatement {
    /// The query text itself.
    Raw,
    /// A pattern conversion of the query text.
    Converted(String),
    /// No conversion matched; the branch contributes nothing.
    Unconvertible,
}

struct Dispatched {
    decision: RoutingDecision,
    results: Vec<QueryHit>,
    failures: Vec<BranchFailure>,
    /// Set for fallback and failed outcomes.
    explanation: Option<String>,
}

impl Dispatched {
    fn answered(decision: RoutingDecision, results: Vec<QueryHit>) -> Self {
        Self {
            decision,
            results,
            failures: Vec::new(),
            explanation: None,
        }
    }
}

// ============================================================================
// Router
// ============================================================================

/// Routes queries across the precise and semantic stores.
pub struct QueryRouter {
    precise: Arc<dyn PreciseStore>,
    semantic: Arc<dyn SemanticStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    policy: PolicyReader,
    log: Arc<DecisionLog>,
    config: RouterConfig,
}

impl QueryRouter {
    /// Create a router reading policy snapshots from `policy`.
    pub fn new(
        precise: Arc<dyn PreciseStore>,
        semantic: Arc<dyn SemanticStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        policy: PolicyReader,
        config: RouterConfig,
    ) -> Self {
        let log = Arc::new(DecisionLog::new(config.decision_log_capacity));
        Self {
            precise,
            semantic,
            embedder,
            policy,
            log,
            config,
        }
    }

    /// The decision log this router appends to.
    pub fn decision_log(&self) -> Arc<DecisionLog> {
        Arc::clone(&self.log)
    }

    /// The live policy snapshot.
    pub fn policy(&self) -> Arc<RoutingPolicy> {
        self.policy.snapshot()
    }

    /// The router configuration.
    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// Route a query with default options.
    pub async fn route(&self, query: &str) -> RouteResponse {
        self.route_with(query, RouteOptions::default()).await
    }

    /// Route a query.
    pub async fn route_with(&self, query: &str, options: RouteOptions) -> RouteResponse {
        let started = Instant::now();
        let snapshot = self.policy.snapshot();
        let policy = snapshot.with_preference(options.prefer);

        let classification = self.classify(query).await;
        let planned = decide(&classification, &policy);
        log::debug!(
            "Routing {} query (confidence {:.2}) as {planned} under policy v{}",
            classification.query_type,
            classification.confidence,
            policy.version
        );

        let mut outcome = self.dispatch(query, &classification, planned, &policy).await;
        if let Some(limit) = options.limit {
            outcome.results.truncate(limit);
        }

        let (confidence, explanation) = match outcome.explanation.take() {
            Some(explanation) => (0.0, explanation),
            None => {
                let mut explanation = explain_decision(&classification, planned, &policy);
                for f in &outcome.failures {
                    explanation.push_str(&format!("; {} branch failed: {}", f.branch, f.error));
                }
                (classification.confidence, explanation)
            }
        };

        let latency_ms = started.elapsed().as_secs_f64() * 1000.0;
        let record = DecisionRecord {
            id: Uuid::new_v4(),
            query: truncate_chars(query, self.config.max_query_chars),
            query_type: classification.query_type,
            decision: outcome.decision,
            confidence,
            result_count: outcome.results.len(),
            latency_ms,
            timestamp: Utc::now(),
            failures: outcome.failures.clone(),
            policy_version: policy.version,
        };
        let record_id = record.id;
        self.log.append(record).await;

        RouteResponse {
            record_id,
            decision: outcome.decision,
            query_type: classification.query_type,
            confidence,
            results: outcome.results,
            explanation,
            failures: outcome.failures,
            policy_version: policy.version,
            latency_ms,
        }
    }

    /// Classify and decide without dispatching or logging.
    pub async fn explain(&self, query: &str, prefer: Option<Preference>) -> QueryExplanation {
        let policy = self.policy.snapshot().with_preference(prefer);
        let classification = self.classify(query).await;
        let decision = decide(&classification, &policy);
        let explanation = explain_decision(&classification, decision, &policy);
        QueryExplanation {
            classification,
            decision,
            explanation,
            policy,
        }
    }

    /// Routing statistics over `window` (whole retained log when `None`).
    pub async fn stats(&self, window: Option<Duration>) -> RoutingStats {
        self.log.stats(window).await
    }

    /// Per-day routing activity over the last `days` days.
    pub async fn timeline(&self, days: u32) -> Vec<DailyRouting> {
        self.log.timeline(days).await
    }

    async fn classify(&self, query: &str) -> Classification {
        let signals = Signals::scan(query);
        if let Some(classification) = signals.classify() {
            return classification;
        }

        let estimate = with_timeout(
            "precise",
            self.config.complexity_timeout(),
            self.precise.estimate_complexity(query),
        )
        .await;
        let complexity = match estimate {
            Ok(complexity) => complexity,
            Err(e) => {
                log::debug!("Complexity estimate unavailable ({e}); using {DEFAULT_COMPLEXITY}");
                DEFAULT_COMPLEXITY
            }
        };
        signals.classify_by_complexity(complexity)
    }

    fn precise_statement(
        &self,
        query: &str,
        classification: &Classification,
        policy: &RoutingPolicy,
    ) -> PreciseStatement {
        if classification.query_type == QueryType::Sql
            && classification.confidence >= policy.sql_confidence_threshold
        {
            return PreciseStatement::Raw;
        }
        match nl_sql::to_sql(query) {
            Some(sql) => PreciseStatement::Converted(sql),
            None => PreciseStatement::Unconvertible,
        }
    }

    async fn precise_branch(
        &self,
        query: &str,
        statement: &PreciseStatement,
    ) -> Result<Vec<QueryHit>> {
        let sql = match statement {
            PreciseStatement::Raw => query,
            PreciseStatement::Converted(sql) => sql.as_str(),
            PreciseStatement::Unconvertible => return Ok(Vec::new()),
        };
        let rows = with_timeout(
            "precise",
            self.config.precise_timeout(),
            self.precise.execute(sql, &[]),
        )
        .await?;
        Ok(rows.into_iter().map(QueryHit::from_row).collect())
    }

    async fn semantic_branch(&self, query: &str, policy: &RoutingPolicy) -> Result<Vec<QueryHit>> {
        let search = async {
            let vector = self.embedder.embed(query).await?;
            self.semantic
                .search(
                    &vector,
                    self.config.search_limit,
                    policy.semantic_confidence_threshold,
                    None,
                )
                .await
        };
        let hits = with_timeout("semantic", self.config.semantic_timeout(), search).await?;
        Ok(hits.into_iter().map(QueryHit::from_semantic).collect())
    }

    async fn dispatch(
        &self,
        query: &str,
        classification: &Classification,
        decision: RoutingDecision,
        policy: &RoutingPolicy,
    ) -> Dispatched {
        match decision {
            RoutingDecision::PreciseOnly => {
                let statement = self.precise_statement(query, classification, policy);
                match self.precise_branch(query, &statement).await {
                    Ok(results) => Dispatched::answered(decision, results),
                    Err(e) => {
                        log::warn!("Precise branch failed: {e}");
                        let failures = vec![failure(Branch::Precise, &e)];
                        if matches!(statement, PreciseStatement::Converted(_)) {
                            self.fallback(query, failures).await
                        } else {
                            Dispatched {
                                decision: RoutingDecision::Failed,
                                results: Vec::new(),
                                failures,
                                explanation: Some(format!("Query failed: {e}")),
                            }
                        }
                    }
                }
            }
            RoutingDecision::SemanticOnly => match self.semantic_branch(query, policy).await {
                Ok(results) => Dispatched::answered(decision, results),
                Err(e) => {
                    log::warn!("Semantic branch failed: {e}");
                    self.fallback(query, vec![failure(Branch::Semantic, &e)])
                        .await
                }
            },
            RoutingDecision::Both => {
                let statement = self.precise_statement(query, classification, policy);
                let (precise, semantic) = tokio::join!(
                    self.precise_branch(query, &statement),
                    self.semantic_branch(query, policy)
                );
                match (precise, semantic) {
                    (Ok(p), Ok(s)) => Dispatched::answered(decision, merge_hits(p, s)),
                    (Ok(p), Err(e)) => {
                        log::warn!("Semantic branch failed, answering from precise store: {e}");
                        Dispatched {
                            failures: vec![failure(Branch::Semantic, &e)],
                            ..Dispatched::answered(decision, p)
                        }
                    }
                    (Err(e), Ok(s)) => {
                        log::warn!("Precise branch failed, answering from semantic store: {e}");
                        Dispatched {
                            failures: vec![failure(Branch::Precise, &e)],
                            ..Dispatched::answered(decision, s)
                        }
                    }
                    (Err(pe), Err(se)) => {
                        log::warn!("Both branches failed: precise: {pe}; semantic: {se}");
                        let failures = vec![
                            failure(Branch::Precise, &pe),
                            failure(Branch::Semantic, &se),
                        ];
                        self.fallback(query, failures).await
                    }
                }
            }
            RoutingDecision::PreciseFallback | RoutingDecision::Failed => {
                self.fallback(query, Vec::new()).await
            }
        }
    }

    async fn fallback(&self, query: &str, mut failures: Vec<BranchFailure>) -> Dispatched {
        let cause = failures
            .iter()
            .map(|f| format!("{}: {}", f.branch, f.error))
            .collect::<Vec<_>>()
            .join("; ");
        log::warn!("Routing failed ({cause}); executing raw text on precise store");

        let raw = with_timeout(
            "precise",
            self.config.precise_timeout(),
            self.precise.execute(query, &[]),
        )
        .await;
        match raw {
            Ok(rows) => Dispatched {
                decision: RoutingDecision::PreciseFallback,
                results: rows.into_iter().map(QueryHit::from_row).collect(),
                failures,
                explanation: Some(format!("Routing failed ({cause}), used precise-store fallback")),
            },
            Err(e) => {
                log::warn!("Precise-store fallback failed: {e}");
                failures.push(failure(Branch::Fallback, &e));
                Dispatched {
                    decision: RoutingDecision::Failed,
                    results: Vec::new(),
                    failures,
                    explanation: Some(format!("Query failed: {cause}; fallback: {e}")),
                }
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
