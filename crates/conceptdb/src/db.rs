//! The ConceptDB facade.

use std::sync::Arc;
use std::time::Duration;

use conceptdb_evolution::{
    AccuracySummary, AccuracyTracker, EvolutionOutcome, EvolutionStatus, Phase, PhaseManager,
};
use conceptdb_router::{
    DailyRouting, Preference, QueryExplanation, QueryRouter, RouteOptions, RouteResponse,
    RoutingDecision, RoutingPolicy, RoutingStats,
};
use conceptdb_sync::{ConceptChange, SyncDirection, SyncManager, SyncManagerStatus, SyncReport};

use crate::builder::ConceptDbBuilder;

/// One router, one sync manager and one phase manager over shared stores.
///
/// The read surface (`route`, `explain`, statistics and status) and the
/// control surface (`trigger_evolution`, `trigger_sync`, feedback and the
/// semantic-side change feed) never return errors: every refusal or
/// degradation is carried in the returned value.
pub struct ConceptDb {
    router: QueryRouter,
    sync: Arc<SyncManager>,
    evolution: PhaseManager,
    accuracy: Arc<AccuracyTracker>,
}

impl ConceptDb {
    /// A builder with in-memory defaults.
    pub fn builder() -> ConceptDbBuilder {
        ConceptDbBuilder::new()
    }

    pub(crate) fn from_parts(
        router: QueryRouter,
        sync: Arc<SyncManager>,
        evolution: PhaseManager,
        accuracy: Arc<AccuracyTracker>,
    ) -> Self {
        Self {
            router,
            sync,
            evolution,
            accuracy,
        }
    }

    // ------------------------------------------------------------------------
    // Read surface
    // ------------------------------------------------------------------------

    /// Route a query.
    pub async fn route(&self, query: &str) -> RouteResponse {
        self.router.route(query).await
    }

    /// Route a query with per-request options.
    pub async fn route_with(&self, query: &str, options: RouteOptions) -> RouteResponse {
        self.router.route_with(query, options).await
    }

    /// What the router would do with `query`, without dispatching it.
    pub async fn explain(&self, query: &str, prefer: Option<Preference>) -> QueryExplanation {
        self.router.explain(query, prefer).await
    }

    /// Routing statistics over `window`; the whole retained log when `None`.
    pub async fn routing_stats(&self, window: Option<Duration>) -> RoutingStats {
        self.router.stats(window).await
    }

    /// Per-day routing activity over the last `days` days, oldest first.
    pub async fn routing_timeline(&self, days: u32) -> Vec<DailyRouting> {
        self.router.timeline(days).await
    }

    /// Phase, policy, readiness metrics and recent transitions.
    pub async fn evolution_status(&self) -> EvolutionStatus {
        self.evolution.status().await
    }

    /// Sync manager state.
    pub async fn sync_status(&self) -> SyncManagerStatus {
        self.sync.status().await
    }

    /// Answer feedback tallies.
    pub fn accuracy(&self) -> AccuracySummary {
        self.accuracy.summary()
    }

    /// The live phase.
    pub fn current_phase(&self) -> Phase {
        self.evolution.current_phase()
    }

    /// The live routing policy.
    pub fn policy(&self) -> Arc<RoutingPolicy> {
        self.router.policy()
    }

    // ------------------------------------------------------------------------
    // Control surface
    // ------------------------------------------------------------------------

    /// Move to phase `target`, or the next phase when `None`.
    pub async fn trigger_evolution(&self, target: Option<u8>, force: bool) -> EvolutionOutcome {
        self.evolution.evolve(target, force).await
    }

    /// Run one sync cycle over all tables.
    pub async fn trigger_sync(&self, direction: SyncDirection, force: bool) -> SyncReport {
        self.sync.sync(direction, None, force).await
    }

    /// Run one sync cycle limited to `tables`.
    pub async fn trigger_sync_tables(
        &self,
        direction: SyncDirection,
        tables: &[String],
        force: bool,
    ) -> SyncReport {
        self.sync.sync(direction, Some(tables), force).await
    }

    /// Record whether an answer produced under `decision` was correct.
    pub fn record_feedback(&self, decision: RoutingDecision, correct: bool) {
        self.accuracy.record(decision, correct);
    }

    /// Report a concept created or updated directly in the semantic store.
    /// Returns the change record's sequence number.
    pub async fn record_concept_change(&self, change: ConceptChange) -> u64 {
        self.sync.record_concept_change(change).await
    }

    // ------------------------------------------------------------------------
    // Components
    // ------------------------------------------------------------------------

    /// The query router.
    pub fn router(&self) -> &QueryRouter {
        &self.router
    }

    /// The sync manager.
    pub fn sync_manager(&self) -> &Arc<SyncManager> {
        &self.sync
    }

    /// The phase manager.
    pub fn phase_manager(&self) -> &PhaseManager {
        &self.evolution
    }
}
