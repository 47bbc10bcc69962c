//! The evolution phase table.
//!
//! Phases are static configuration: each carries a target conceptualization
//! ratio, the routing thresholds published while it is live, and the
//! criteria a deployment must meet to enter it.

use std::fmt;

use conceptdb_core::Error;
use conceptdb_router::RoutingPolicy;
use serde::{Deserialize, Serialize};

/// Minimums a deployment must meet, all at once, to enter a phase.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PromotionCriteria {
    /// Share of queries that consulted the semantic store.
    pub min_concept_usage: f64,
    /// Feedback accuracy.
    pub min_accuracy: f64,
    /// Precise-to-semantic latency ratio.
    pub min_performance_gain: f64,
    /// Share of tables with concept coverage.
    pub min_data_coverage: f64,
    /// Process uptime in hours.
    pub min_uptime_hours: f64,
    /// Lifetime routed queries.
    pub min_query_count: u64,
}

/// An evolution phase.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(try_from = "u8", into = "u8")]
pub enum Phase {
    /// 10% conceptualization: semantics augment a relational core.
    #[default]
    EnhancementLayer = 1,
    /// 30%: both stores answer routinely.
    HybridDatabase = 2,
    /// 70%: the semantic store is consulted first.
    ConceptFirst = 3,
    /// 100%.
    PureConcept = 4,
}

impl Phase {
    /// All phases in order.
    pub const ALL: [Phase; 4] = [
        Phase::EnhancementLayer,
        Phase::HybridDatabase,
        Phase::ConceptFirst,
        Phase::PureConcept,
    ];

    /// Phase number, 1 through 4.
    pub fn number(self) -> u8 {
        self as u8
    }

    /// Look up a phase by number.
    pub fn from_number(number: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.number() == number)
    }

    /// Display name.
    pub fn name(self) -> &'static str {
        match self {
            Self::EnhancementLayer => "Enhancement Layer",
            Self::HybridDatabase => "Hybrid Database",
            Self::ConceptFirst => "Concept-First",
            Self::PureConcept => "Pure Concept",
        }
    }

    /// Target share of traffic and data served by the semantic layer.
    pub fn target_ratio(self) -> f64 {
        match self {
            Self::EnhancementLayer => 0.1,
            Self::HybridDatabase => 0.3,
            Self::ConceptFirst => 0.7,
            Self::PureConcept => 1.0,
        }
    }

    /// The following phase, if any.
    pub fn next(self) -> Option<Self> {
        Self::from_number(self.number() + 1)
    }

    /// Phases entered when moving from `self` to `target`, in order.
    pub fn path_to(self, target: Phase) -> impl Iterator<Item = Phase> {
        Self::ALL
            .into_iter()
            .filter(move |p| *p > self && *p <= target)
    }

    /// Routing policy published while this phase is live. The version is
    /// stamped on publication.
    pub fn policy(self) -> RoutingPolicy {
        let (sql, semantic, concrete_to_concept) = match self {
            Self::EnhancementLayer => (0.9, 0.7, 0.8),
            Self::HybridDatabase => (0.9, 0.6, 0.7),
            Self::ConceptFirst => (0.9, 0.5, 0.5),
            Self::PureConcept => (0.9, 0.4, 0.3),
        };
        RoutingPolicy {
            version: 0,
            phase: self.number(),
            sql_confidence_threshold: sql,
            semantic_confidence_threshold: semantic,
            concrete_to_concept_threshold: concrete_to_concept,
            target_ratio: self.target_ratio(),
        }
    }

    /// Criteria for entering this phase. The initial phase has none.
    pub fn criteria(self) -> Option<PromotionCriteria> {
        let criteria = match self {
            Self::EnhancementLayer => return None,
            Self::HybridDatabase => PromotionCriteria {
                min_concept_usage: 0.25,
                min_accuracy: 0.85,
                min_performance_gain: 1.0,
                min_data_coverage: 0.2,
                min_uptime_hours: 168.0,
                min_query_count: 10_000,
            },
            Self::ConceptFirst => PromotionCriteria {
                min_concept_usage: 0.5,
                min_accuracy: 0.9,
                min_performance_gain: 1.2,
                min_data_coverage: 0.5,
                min_uptime_hours: 720.0,
                min_query_count: 100_000,
            },
            Self::PureConcept => PromotionCriteria {
                min_concept_usage: 0.8,
                min_accuracy: 0.95,
                min_performance_gain: 1.5,
                min_data_coverage: 0.8,
                min_uptime_hours: 2160.0,
                min_query_count: 1_000_000,
            },
        };
        Some(criteria)
    }

    /// Minimum extraction confidence the sync manager uses once this phase
    /// is entered, if the phase changes it.
    pub fn extraction_confidence(self) -> Option<f64> {
        match self {
            Self::HybridDatabase => Some(0.3),
            Self::ConceptFirst => Some(0.2),
            Self::EnhancementLayer | Self::PureConcept => None,
        }
    }

    /// Capabilities switched on by entering this phase.
    pub fn features(self) -> &'static [&'static str] {
        match self {
            Self::EnhancementLayer => &[],
            Self::HybridDatabase => &[
                "Intelligent routing",
                "Periodic sync",
                "Hybrid query optimization",
            ],
            Self::ConceptFirst => &[
                "Concept-first routing",
                "Concept indexing",
                "Critical data migration",
            ],
            Self::PureConcept => &["Pure concept storage"],
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Phase {} ({})", self.number(), self.name())
    }
}

impl TryFrom<u8> for Phase {
    type Error = Error;

    fn try_from(number: u8) -> Result<Self, Self::Error> {
        Self::from_number(number)
            .ok_or_else(|| Error::invalid_data(format!("no evolution phase {number}")))
    }
}

impl From<Phase> for u8 {
    fn from(phase: Phase) -> Self {
        phase.number()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_numbering_and_next() {
        assert_eq!(Phase::from_number(2), Some(Phase::HybridDatabase));
        assert_eq!(Phase::from_number(0), None);
        assert_eq!(Phase::from_number(5), None);
        assert_eq!(Phase::ConceptFirst.next(), Some(Phase::PureConcept));
        assert_eq!(Phase::PureConcept.next(), None);
    }

    #[test]
    fn test_thresholds_fall_as_phases_advance() {
        let policies: Vec<_> = Phase::ALL.iter().map(|p| p.policy()).collect();
        for pair in policies.windows(2) {
            assert!(pair[1].semantic_confidence_threshold < pair[0].semantic_confidence_threshold);
            assert!(pair[1].concrete_to_concept_threshold < pair[0].concrete_to_concept_threshold);
            assert_eq!(pair[1].sql_confidence_threshold, 0.9);
        }
        assert_eq!(Phase::HybridDatabase.policy().semantic_confidence_threshold, 0.6);
        assert_eq!(Phase::PureConcept.policy().target_ratio, 1.0);
    }

    #[test]
    fn test_criteria() {
        assert!(Phase::EnhancementLayer.criteria().is_none());
        let c = Phase::HybridDatabase.criteria().unwrap();
        assert_eq!(c.min_query_count, 10_000);
        assert_eq!(c.min_uptime_hours, 168.0);
    }

    #[test]
    fn test_path_to() {
        let path: Vec<_> = Phase::EnhancementLayer
            .path_to(Phase::ConceptFirst)
            .collect();
        assert_eq!(path, vec![Phase::HybridDatabase, Phase::ConceptFirst]);
        assert_eq!(Phase::ConceptFirst.path_to(Phase::HybridDatabase).count(), 0);
    }

    #[test]
    fn test_serde_as_number() {
        assert_eq!(serde_json::to_string(&Phase::ConceptFirst).unwrap(), "3");
        let phase: Phase = serde_json::from_str("2").unwrap();
        assert_eq!(phase, Phase::HybridDatabase);
        assert!(serde_json::from_str::<Phase>("7").is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(Phase::HybridDatabase.to_string(), "Phase 2 (Hybrid Database)");
    }
}
