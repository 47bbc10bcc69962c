//! The phase manager.
//!
//! Owns the live phase and the routing policy publisher. A transition is
//! guarded by its own in-flight flag, independent of the sync manager's.
//!
//! A transition runs the fallible steps first (deployment hooks, then
//! persistence) and only then commits in memory, so a failure leaves the
//! phase, the published policy and the history untouched.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;
use conceptdb_core::{BoundedLog, InFlight, Result};
use conceptdb_router::{PolicyPublisher, RoutingPolicy};
use conceptdb_sync::{SyncDirection, SyncManager};
use tokio::time::Instant;

use crate::config::EvolutionConfig;
use crate::hooks::{NoopPhaseHooks, PhaseHooks};
use crate::metrics::EvolutionMetrics;
use crate::phase::Phase;
use crate::source::MetricsSource;
use crate::store::{MemoryPhaseStore, PersistedPhase, PhaseStore};
use crate::types::{EvolutionOutcome, EvolutionRecord, EvolutionStatus};

const STATUS_HISTORY: usize = 5;

struct PhaseState {
    phase: Phase,
    history: BoundedLog<EvolutionRecord>,
}

/// Minimum extraction confidence in effect once `phase` is live.
fn extraction_confidence_for(phase: Phase) -> Option<f64> {
    Phase::ALL
        .into_iter()
        .filter(|p| *p <= phase)
        .rev()
        .find_map(Phase::extraction_confidence)
}

/// Drives the criteria-gated phase state machine.
pub struct PhaseManager {
    publisher: PolicyPublisher,
    sync: Arc<SyncManager>,
    metrics: Arc<dyn MetricsSource>,
    store: Arc<dyn PhaseStore>,
    hooks: Arc<dyn PhaseHooks>,
    config: EvolutionConfig,
    in_flight: InFlight,
    state: RwLock<PhaseState>,
    started: Instant,
}

impl PhaseManager {
    /// Create a manager at the configured initial phase, with an in-memory
    /// phase store and no-op hooks. Call [`initialize`](Self::initialize)
    /// before use.
    pub fn new(
        publisher: PolicyPublisher,
        sync: Arc<SyncManager>,
        metrics: Arc<dyn MetricsSource>,
        config: EvolutionConfig,
    ) -> Self {
        let state = PhaseState {
            phase: config.initial_phase,
            history: BoundedLog::new(config.history_capacity),
        };
        Self {
            publisher,
            sync,
            metrics,
            store: Arc::new(MemoryPhaseStore::new()),
            hooks: Arc::new(NoopPhaseHooks),
            config,
            in_flight: InFlight::new(),
            state: RwLock::new(state),
            started: Instant::now(),
        }
    }

    /// Persist the phase through `store`.
    pub fn with_store(mut self, store: Arc<dyn PhaseStore>) -> Self {
        self.store = store;
        self
    }

    /// Run `hooks` on later-phase transitions.
    pub fn with_hooks(mut self, hooks: Arc<dyn PhaseHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    fn read_state(&self) -> RwLockReadGuard<'_, PhaseState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, PhaseState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Load the persisted phase and bring the policy and sync manager in
    /// line with it. An absent or unreadable store falls back to the
    /// configured initial phase.
    pub async fn initialize(&self) -> Phase {
        let persisted = match self.store.load().await {
            Ok(persisted) => persisted,
            Err(e) => {
                log::warn!(
                    "Failed to load persisted phase, starting at {}: {e}",
                    self.config.initial_phase
                );
                None
            }
        };
        let (phase, history) = persisted
            .map(|p| (p.phase, p.history))
            .unwrap_or((self.config.initial_phase, Vec::new()));

        {
            let mut state = self.write_state();
            state.phase = phase;
            for record in history {
                state.history.push(record);
            }
        }

        self.publisher.publish(phase.policy());
        if let Some(confidence) = extraction_confidence_for(phase) {
            self.sync.set_extraction_confidence(confidence);
        }
        if phase >= Phase::HybridDatabase {
            self.start_periodic_sync();
        }

        log::info!("Evolution manager initialized at {phase}");
        phase
    }

    /// The live phase.
    pub fn current_phase(&self) -> Phase {
        self.read_state().phase
    }

    /// The live routing policy.
    pub fn policy(&self) -> Arc<RoutingPolicy> {
        self.publisher.current()
    }

    /// Whether a transition is running.
    pub fn in_progress(&self) -> bool {
        self.in_flight.is_active()
    }

    /// Retained transition history, oldest first.
    pub fn history(&self) -> Vec<EvolutionRecord> {
        self.read_state().history.iter().cloned().collect()
    }

    /// Collect metrics and evaluate them for the next phase.
    pub async fn evaluate(&self) -> Result<EvolutionMetrics> {
        let phase = self.current_phase();
        let raw = self.metrics.collect().await?;
        Ok(EvolutionMetrics::evaluate(raw, phase, phase.next()))
    }

    /// Move to phase `target` (the next phase when `None`).
    ///
    /// Without `force`, every promotion criterion of the target phase must
    /// be met. Never panics or returns an error: every way a transition can
    /// be refused is an [`EvolutionOutcome`] variant.
    pub async fn evolve(&self, target: Option<u8>, force: bool) -> EvolutionOutcome {
        let Some(_permit) = self.in_flight.try_acquire() else {
            log::info!("Evolution already in progress; rejecting request");
            return EvolutionOutcome::InProgress;
        };

        let current = self.current_phase();
        let requested = target.unwrap_or(current.number().saturating_add(1));
        if requested <= current.number() {
            log::info!("Rejected evolution to phase {requested}: already at {current}");
            return EvolutionOutcome::InvalidTarget {
                current,
                requested,
                reason: format!("Already at phase {}", current.number()),
            };
        }
        let Some(target) = Phase::from_number(requested) else {
            log::info!("Rejected evolution to phase {requested}: no such phase");
            return EvolutionOutcome::InvalidTarget {
                current,
                requested,
                reason: format!("Maximum phase is {}", Phase::PureConcept.number()),
            };
        };

        let metrics = match self.metrics.collect().await {
            Ok(raw) => Some(EvolutionMetrics::evaluate(raw, current, Some(target))),
            Err(e) if !force => {
                log::warn!("Cannot evaluate readiness for {target}: {e}");
                return EvolutionOutcome::NotReady {
                    target,
                    blocking_factors: vec![format!("Metrics unavailable: {e}")],
                    metrics: None,
                };
            }
            Err(e) => {
                log::warn!("Metrics unavailable ({e}); forcing evolution to {target} regardless");
                None
            }
        };

        if let Some(metrics) = metrics.as_ref().filter(|m| !force && !m.ready_for_next) {
            log::info!(
                "Not ready for {target}: {}",
                metrics.blocking_factors.join("; ")
            );
            return EvolutionOutcome::NotReady {
                target,
                blocking_factors: metrics.blocking_factors.clone(),
                metrics: Some(metrics.clone()),
            };
        }

        log::info!(
            "Starting evolution from {current} to {target}{}",
            if force { " (forced)" } else { "" }
        );

        for phase in current.path_to(target) {
            if let Err(e) = self.run_hooks(phase).await {
                log::warn!("Evolution to {target} aborted while entering {phase}: {e}");
                return EvolutionOutcome::Failed {
                    target,
                    reason: format!("Entering {phase} failed: {e}"),
                };
            }
        }

        let record = EvolutionRecord {
            from_phase: current,
            to_phase: target,
            timestamp: Utc::now(),
            forced: force,
            metrics,
            features: current
                .path_to(target)
                .flat_map(|p| p.features().iter().map(|f| f.to_string()))
                .collect(),
        };

        let persisted = {
            let state = self.read_state();
            let mut history: Vec<_> = state.history.iter().cloned().collect();
            history.push(record.clone());
            let excess = history.len().saturating_sub(state.history.capacity());
            history.drain(..excess);
            PersistedPhase::new(target, history)
        };
        if let Err(e) = self.store.save(&persisted).await {
            log::warn!("Evolution to {target} aborted: {e}");
            return EvolutionOutcome::Failed {
                target,
                reason: format!("Failed to persist phase: {e}"),
            };
        }

        // Commit
        let policy = self.publisher.publish(target.policy());
        {
            let mut state = self.write_state();
            state.phase = target;
            state.history.push(record.clone());
        }
        if let Some(confidence) = extraction_confidence_for(target) {
            self.sync.set_extraction_confidence(confidence);
        }
        log::info!(
            "Evolved from {current} to {target} (routing policy v{})",
            policy.version
        );

        if current < Phase::HybridDatabase {
            self.start_periodic_sync();
            self.kick_sync();
        }

        EvolutionOutcome::Evolved(record)
    }

    async fn run_hooks(&self, phase: Phase) -> Result<()> {
        match phase {
            Phase::ConceptFirst => {
                self.hooks.create_concept_indexes().await?;
                self.hooks.migrate_critical_data().await
            }
            Phase::PureConcept => self.hooks.enter_pure_concept().await,
            Phase::EnhancementLayer | Phase::HybridDatabase => Ok(()),
        }
    }

    fn start_periodic_sync(&self) {
        if self.config.periodic_sync {
            self.sync
                .schedule(self.config.sync_interval(), SyncDirection::Bidirectional);
        }
    }

    /// Run one forced bidirectional cycle in the background.
    fn kick_sync(&self) {
        let sync = Arc::clone(&self.sync);
        tokio::spawn(async move {
            let report = sync.sync(SyncDirection::Bidirectional, None, true).await;
            log::info!(
                "Post-evolution sync finished: {:?}, {} concept(s), {} mapping(s)",
                report.status,
                report.precise_to_semantic_count,
                report.semantic_to_precise_count
            );
        });
    }

    /// Status read surface: live phase and policy, fresh readiness metrics,
    /// recent history.
    pub async fn status(&self) -> EvolutionStatus {
        let (phase, history) = {
            let state = self.read_state();
            (state.phase, state.history.tail(STATUS_HISTORY))
        };
        let (metrics, metrics_error) = match self.metrics.collect().await {
            Ok(raw) => (
                Some(EvolutionMetrics::evaluate(raw, phase, phase.next())),
                None,
            ),
            Err(e) => (None, Some(e.to_string())),
        };
        EvolutionStatus {
            phase: phase.into(),
            policy: (*self.publisher.current()).clone(),
            metrics,
            metrics_error,
            history,
            in_progress: self.in_flight.is_active(),
            uptime_hours: self.started.elapsed().as_secs_f64() / 3600.0,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
