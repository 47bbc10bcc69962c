//! Answer-accuracy feedback.

use std::sync::atomic::{AtomicU64, Ordering};

use conceptdb_router::RoutingDecision;
use serde::{Deserialize, Serialize};

/// Accuracy assumed for a side with no feedback.
pub const DEFAULT_ACCURACY: f64 = 0.5;

#[derive(Debug, Default)]
struct Tally {
    correct: AtomicU64,
    total: AtomicU64,
}

impl Tally {
    fn record(&self, correct: bool) {
        if correct {
            self.correct.fetch_add(1, Ordering::Relaxed);
        }
        self.total.fetch_add(1, Ordering::Relaxed);
    }

    fn accuracy(&self) -> f64 {
        let total = self.total.load(Ordering::Relaxed);
        if total == 0 {
            return DEFAULT_ACCURACY;
        }
        self.correct.load(Ordering::Relaxed) as f64 / total as f64
    }

    fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }
}

/// Feedback counters for answers that involved the semantic store and
/// answers served by the precise store alone.
#[derive(Debug, Default)]
pub struct AccuracyTracker {
    semantic: Tally,
    precise: Tally,
}

/// Snapshot of an [`AccuracyTracker`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AccuracySummary {
    /// Accuracy of answers that consulted the semantic store.
    pub semantic: f64,
    /// Accuracy of precise-only answers.
    pub precise: f64,
    /// Mean of the two.
    pub overall: f64,
    /// Feedback received.
    pub samples: u64,
}

impl AccuracyTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record whether the answer produced under `decision` was correct.
    pub fn record(&self, decision: RoutingDecision, correct: bool) {
        if decision.consults_semantic() {
            self.semantic.record(correct);
        } else {
            self.precise.record(correct);
        }
    }

    /// Overall accuracy: the mean of both sides.
    pub fn overall(&self) -> f64 {
        (self.semantic.accuracy() + self.precise.accuracy()) / 2.0
    }

    /// Current figures.
    pub fn summary(&self) -> AccuracySummary {
        AccuracySummary {
            semantic: self.semantic.accuracy(),
            precise: self.precise.accuracy(),
            overall: self.overall(),
            samples: self.semantic.total() + self.precise.total(),
        }
    }
}
