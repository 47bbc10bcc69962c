//! Transition outcomes, history, and status.

use chrono::{DateTime, Utc};
use conceptdb_router::RoutingPolicy;
use serde::{Deserialize, Serialize};

use crate::metrics::EvolutionMetrics;
use crate::phase::Phase;

/// One committed phase transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvolutionRecord {
    /// Phase before the transition.
    pub from_phase: Phase,
    /// Phase after the transition.
    pub to_phase: Phase,
    /// When the transition committed.
    pub timestamp: DateTime<Utc>,
    /// Whether the criteria were bypassed.
    pub forced: bool,
    /// Metrics at decision time, when they could be collected.
    pub metrics: Option<EvolutionMetrics>,
    /// Capabilities switched on.
    pub features: Vec<String>,
}

/// Result of an evolve request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum EvolutionOutcome {
    /// The transition committed.
    Evolved(EvolutionRecord),
    /// Criteria unmet; nothing changed.
    NotReady {
        /// Requested phase.
        target: Phase,
        /// Unmet criteria.
        blocking_factors: Vec<String>,
        /// Metrics evaluated, if they could be collected.
        metrics: Option<EvolutionMetrics>,
    },
    /// Another transition is running; nothing changed.
    InProgress,
    /// The requested phase is not ahead of the current one.
    InvalidTarget {
        /// Current phase.
        current: Phase,
        /// Requested phase number.
        requested: u8,
        /// Why the target was rejected.
        reason: String,
    },
    /// Applying the transition failed; nothing changed.
    Failed {
        /// Requested phase.
        target: Phase,
        /// Failure cause.
        reason: String,
    },
}

impl EvolutionOutcome {
    /// Whether the transition committed.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Evolved(_))
    }

    /// One-line summary.
    pub fn message(&self) -> String {
        match self {
            Self::Evolved(record) => format!("Evolved to {}", record.to_phase),
            Self::NotReady {
                target,
                blocking_factors,
                ..
            } => format!(
                "Not ready for {target}: {}",
                blocking_factors.join("; ")
            ),
            Self::InProgress => "Evolution already in progress".to_string(),
            Self::InvalidTarget { reason, .. } => reason.clone(),
            Self::Failed { target, reason } => format!("Evolution to {target} failed: {reason}"),
        }
    }
}

/// The live phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseInfo {
    /// Phase number.
    pub number: u8,
    /// Phase name.
    pub name: String,
    /// Target conceptualization ratio.
    pub target_ratio: f64,
    /// Target ratio as a percentage string.
    pub conceptualization: String,
}

impl From<Phase> for PhaseInfo {
    fn from(phase: Phase) -> Self {
        Self {
            number: phase.number(),
            name: phase.name().to_string(),
            target_ratio: phase.target_ratio(),
            conceptualization: format!("{:.0}%", phase.target_ratio() * 100.0),
        }
    }
}

/// Evolution status read surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvolutionStatus {
    /// Live phase.
    pub phase: PhaseInfo,
    /// Live routing policy.
    pub policy: RoutingPolicy,
    /// Fresh metrics evaluated for the next phase.
    pub metrics: Option<EvolutionMetrics>,
    /// Why metrics are missing, if they are.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics_error: Option<String>,
    /// Most recent transitions, oldest first.
    pub history: Vec<EvolutionRecord>,
    /// Whether a transition is running.
    pub in_progress: bool,
    /// Hours since the manager started.
    pub uptime_hours: f64,
}
