//! Evolution metrics, the composite score, and promotion readiness.

use serde::{Deserialize, Serialize};

use crate::phase::{Phase, PromotionCriteria};

// ============================================================================
// Score weights and normalization targets
// ============================================================================

const USAGE_WEIGHT: f64 = 0.30;
const ACCURACY_WEIGHT: f64 = 0.25;
const PERFORMANCE_WEIGHT: f64 = 0.15;
const COVERAGE_WEIGHT: f64 = 0.15;
const UPTIME_WEIGHT: f64 = 0.10;
const VOLUME_WEIGHT: f64 = 0.05;

const USAGE_TARGET: f64 = 0.5;
const PERFORMANCE_TARGET: f64 = 1.5;
const UPTIME_TARGET_HOURS: f64 = 720.0;
const VOLUME_TARGET: f64 = 100_000.0;

// ============================================================================
// Raw metrics
// ============================================================================

/// The six measurements promotion is decided on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RawMetrics {
    /// Share of routed queries that consulted the semantic store.
    pub concept_usage: f64,
    /// Feedback accuracy across both stores.
    pub accuracy: f64,
    /// Mean precise latency over mean semantic latency.
    pub performance_gain: f64,
    /// Share of precise tables with concept coverage.
    pub data_coverage: f64,
    /// Hours since startup.
    pub uptime_hours: f64,
    /// Lifetime routed queries.
    pub total_queries: u64,
}

fn normalize(value: f64, target: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    (value / target).clamp(0.0, 1.0)
}

/// NaN never meets a criterion.
fn below(value: f64, minimum: f64) -> bool {
    value.is_nan() || value < minimum
}

impl RawMetrics {
    /// Composite score in `[0, 1]`. Informative only; readiness is decided
    /// criterion by criterion.
    pub fn score(&self) -> f64 {
        let score = USAGE_WEIGHT * normalize(self.concept_usage, USAGE_TARGET)
            + ACCURACY_WEIGHT * normalize(self.accuracy, 1.0)
            + PERFORMANCE_WEIGHT * normalize(self.performance_gain, PERFORMANCE_TARGET)
            + COVERAGE_WEIGHT * normalize(self.data_coverage, 1.0)
            + UPTIME_WEIGHT * normalize(self.uptime_hours, UPTIME_TARGET_HOURS)
            + VOLUME_WEIGHT * normalize(self.total_queries as f64, VOLUME_TARGET);
        score.clamp(0.0, 1.0)
    }

    /// Human-readable descriptions of every unmet criterion.
    pub fn blocking_factors(&self, criteria: &PromotionCriteria) -> Vec<String> {
        let mut blocking = Vec::new();
        if below(self.concept_usage, criteria.min_concept_usage) {
            blocking.push(format!(
                "Concept usage {:.1}% < {:.1}%",
                self.concept_usage * 100.0,
                criteria.min_concept_usage * 100.0
            ));
        }
        if below(self.accuracy, criteria.min_accuracy) {
            blocking.push(format!(
                "Accuracy {:.1}% < {:.1}%",
                self.accuracy * 100.0,
                criteria.min_accuracy * 100.0
            ));
        }
        if below(self.performance_gain, criteria.min_performance_gain) {
            blocking.push(format!(
                "Performance gain {:.1}x < {:.1}x",
                self.performance_gain, criteria.min_performance_gain
            ));
        }
        if below(self.data_coverage, criteria.min_data_coverage) {
            blocking.push(format!(
                "Data coverage {:.1}% < {:.1}%",
                self.data_coverage * 100.0,
                criteria.min_data_coverage * 100.0
            ));
        }
        if below(self.uptime_hours, criteria.min_uptime_hours) {
            blocking.push(format!(
                "Uptime {:.0}h < {:.0}h",
                self.uptime_hours, criteria.min_uptime_hours
            ));
        }
        if self.total_queries < criteria.min_query_count {
            blocking.push(format!(
                "Query count {} < {}",
                self.total_queries, criteria.min_query_count
            ));
        }
        blocking
    }
}

// ============================================================================
// Evaluated metrics
// ============================================================================

/// Raw metrics evaluated against a target phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvolutionMetrics {
    /// Phase the deployment is in.
    pub current_phase: Phase,
    /// Phase evaluated for, if any phase remains.
    pub target_phase: Option<Phase>,
    /// The measurements.
    #[serde(flatten)]
    pub raw: RawMetrics,
    /// Composite score.
    pub evolution_score: f64,
    /// Whether every criterion of the target phase is met.
    pub ready_for_next: bool,
    /// Unmet criteria.
    pub blocking_factors: Vec<String>,
}

impl EvolutionMetrics {
    /// Evaluate `raw` for promotion from `current` into `target`.
    pub fn evaluate(raw: RawMetrics, current: Phase, target: Option<Phase>) -> Self {
        let blocking_factors = match target.and_then(Phase::criteria) {
            Some(criteria) => raw.blocking_factors(&criteria),
            None => vec![format!("No phase after {current}")],
        };
        Self {
            current_phase: current,
            target_phase: target,
            evolution_score: raw.score(),
            ready_for_next: blocking_factors.is_empty(),
            blocking_factors,
            raw,
        }
    }
}
