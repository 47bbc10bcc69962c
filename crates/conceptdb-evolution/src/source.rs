//! Where evolution metrics come from.

use std::sync::Arc;

use async_trait::async_trait;
use conceptdb_core::Result;
use conceptdb_router::{DecisionLog, RoutingDecision};
use conceptdb_sync::SyncManager;
use tokio::time::Instant;

use crate::accuracy::AccuracyTracker;
use crate::metrics::RawMetrics;

/// Supplies the raw measurements promotion is decided on.
#[async_trait]
pub trait MetricsSource: Send + Sync {
    /// Collect a fresh measurement.
    async fn collect(&self) -> Result<RawMetrics>;
}

/// Metrics derived from the running router and sync manager.
///
/// Usage and volume come from the decision log's lifetime totals, so they
/// survive ring-buffer eviction. Performance gain is the mean precise-only
/// latency divided by the mean semantic-only latency; with no samples on
/// either side the configured baseline is reported.
pub struct LiveMetricsSource {
    decisions: Arc<DecisionLog>,
    accuracy: Arc<AccuracyTracker>,
    sync: Arc<SyncManager>,
    started: Instant,
    performance_baseline: f64,
}

impl LiveMetricsSource {
    /// Create a source measuring uptime from now.
    pub fn new(
        decisions: Arc<DecisionLog>,
        accuracy: Arc<AccuracyTracker>,
        sync: Arc<SyncManager>,
    ) -> Self {
        Self {
            decisions,
            accuracy,
            sync,
            started: Instant::now(),
            performance_baseline: 1.0,
        }
    }

    /// Measure uptime from `started`.
    pub fn with_started(mut self, started: Instant) -> Self {
        self.started = started;
        self
    }

    /// Gain reported before both stores have latency samples.
    pub fn with_performance_baseline(mut self, baseline: f64) -> Self {
        self.performance_baseline = baseline;
        self
    }
}

#[async_trait]
impl MetricsSource for LiveMetricsSource {
    async fn collect(&self) -> Result<RawMetrics> {
        let lifetime = self.decisions.lifetime().await;

        let precise = lifetime.get(RoutingDecision::PreciseOnly).mean_latency_ms();
        let semantic = lifetime.get(RoutingDecision::SemanticOnly).mean_latency_ms();
        let performance_gain = match (precise, semantic) {
            (Some(precise), Some(semantic)) if semantic > 0.0 => precise / semantic,
            _ => self.performance_baseline,
        };

        Ok(RawMetrics {
            concept_usage: lifetime.concept_usage_ratio(),
            accuracy: self.accuracy.overall(),
            performance_gain,
            data_coverage: self.sync.coverage().await,
            uptime_hours: self.started.elapsed().as_secs_f64() / 3600.0,
            total_queries: lifetime.total,
        })
    }
}
