//! Assembly of a [`ConceptDb`].

use std::sync::Arc;

use conceptdb_core::adapters::{
    KeywordConceptExtractor, MemoryPreciseStore, MemorySemanticStore, MockEmbeddingProvider,
};
use conceptdb_core::{ConceptExtractor, EmbeddingProvider, PreciseStore, SemanticStore};
use conceptdb_evolution::{
    AccuracyTracker, EvolutionConfig, LiveMetricsSource, MetricsSource, PhaseHooks,
    PhaseManager, PhaseStore,
};
use conceptdb_router::{QueryRouter, RouterConfig, routing_policy_channel};
use conceptdb_sync::{SyncConfig, SyncManager};

use crate::db::ConceptDb;

/// Embedding dimension of the default mock provider.
pub const DEFAULT_EMBEDDING_DIMENSION: usize = 64;

/// Builder for [`ConceptDb`].
///
/// Every collaborator is optional; anything left unset falls back to the
/// in-memory implementation from `conceptdb-core`.
#[derive(Default)]
pub struct ConceptDbBuilder {
    precise: Option<Arc<dyn PreciseStore>>,
    semantic: Option<Arc<dyn SemanticStore>>,
    extractor: Option<Arc<dyn ConceptExtractor>>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    phase_store: Option<Arc<dyn PhaseStore>>,
    hooks: Option<Arc<dyn PhaseHooks>>,
    metrics: Option<Arc<dyn MetricsSource>>,
    router_config: RouterConfig,
    sync_config: SyncConfig,
    evolution_config: EvolutionConfig,
}

impl ConceptDbBuilder {
    /// A builder with every collaborator unset and default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `store` as the precise store.
    pub fn precise_store(mut self, store: Arc<dyn PreciseStore>) -> Self {
        self.precise = Some(store);
        self
    }

    /// Use `store` as the semantic store.
    pub fn semantic_store(mut self, store: Arc<dyn SemanticStore>) -> Self {
        self.semantic = Some(store);
        self
    }

    /// Use `extractor` for concept extraction during sync.
    pub fn concept_extractor(mut self, extractor: Arc<dyn ConceptExtractor>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    /// Use `embedder` for query and concept embeddings.
    pub fn embedding_provider(mut self, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// Persist the evolution phase through `store`.
    pub fn phase_store(mut self, store: Arc<dyn PhaseStore>) -> Self {
        self.phase_store = Some(store);
        self
    }

    /// Run `hooks` on phase 3 and 4 transitions.
    pub fn phase_hooks(mut self, hooks: Arc<dyn PhaseHooks>) -> Self {
        self.hooks = Some(hooks);
        self
    }

    /// Decide promotions from `source` instead of the live router and sync
    /// measurements.
    pub fn metrics_source(mut self, source: Arc<dyn MetricsSource>) -> Self {
        self.metrics = Some(source);
        self
    }

    /// Router configuration.
    pub fn router_config(mut self, config: RouterConfig) -> Self {
        self.router_config = config;
        self
    }

    /// Sync manager configuration.
    pub fn sync_config(mut self, config: SyncConfig) -> Self {
        self.sync_config = config;
        self
    }

    /// Phase manager configuration.
    pub fn evolution_config(mut self, config: EvolutionConfig) -> Self {
        self.evolution_config = config;
        self
    }

    /// Wire the components together and restore the persisted phase.
    ///
    /// Must run inside a tokio runtime: a restored phase 2 or later starts
    /// the periodic sync task.
    pub async fn build(self) -> ConceptDb {
        let precise = self
            .precise
            .unwrap_or_else(|| Arc::new(MemoryPreciseStore::new()));
        let semantic = self
            .semantic
            .unwrap_or_else(|| Arc::new(MemorySemanticStore::new()));
        let extractor = self
            .extractor
            .unwrap_or_else(|| Arc::new(KeywordConceptExtractor::new()));
        let embedder = self
            .embedder
            .unwrap_or_else(|| Arc::new(MockEmbeddingProvider::new(DEFAULT_EMBEDDING_DIMENSION)));

        let (publisher, reader) =
            routing_policy_channel(self.evolution_config.initial_phase.policy());

        let router = QueryRouter::new(
            Arc::clone(&precise),
            Arc::clone(&semantic),
            Arc::clone(&embedder),
            reader,
            self.router_config,
        );
        let sync = Arc::new(SyncManager::new(
            precise,
            semantic,
            extractor,
            embedder,
            self.sync_config,
        ));

        let accuracy = Arc::new(AccuracyTracker::new());
        let metrics = match self.metrics {
            Some(metrics) => metrics,
            None => Arc::new(
                LiveMetricsSource::new(
                    router.decision_log(),
                    Arc::clone(&accuracy),
                    Arc::clone(&sync),
                )
                .with_performance_baseline(self.evolution_config.performance_baseline),
            ),
        };

        let mut evolution = PhaseManager::new(
            publisher,
            Arc::clone(&sync),
            metrics,
            self.evolution_config,
        );
        if let Some(store) = self.phase_store {
            evolution = evolution.with_store(store);
        }
        if let Some(hooks) = self.hooks {
            evolution = evolution.with_hooks(hooks);
        }

        let phase = evolution.initialize().await;
        log::info!("ConceptDB ready at {phase}");

        ConceptDb::from_parts(router, sync, evolution, accuracy)
    }
}
