//! Evolution configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::phase::Phase;

/// Phase manager configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvolutionConfig {
    /// Phase used when nothing is persisted.
    #[serde(default = "default_initial_phase")]
    pub initial_phase: Phase,

    /// Transition records retained.
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,

    /// Start periodic sync on entering phase 2.
    #[serde(default = "default_periodic_sync")]
    pub periodic_sync: bool,

    /// Periodic sync interval, in seconds.
    #[serde(default = "default_sync_interval_secs")]
    pub sync_interval_secs: u64,

    /// Performance gain reported before both stores have latency samples.
    #[serde(default = "default_performance_baseline")]
    pub performance_baseline: f64,
}

fn default_initial_phase() -> Phase {
    Phase::EnhancementLayer
}

fn default_history_capacity() -> usize {
    50
}

fn default_periodic_sync() -> bool {
    true
}

fn default_sync_interval_secs() -> u64 {
    15 * 60
}

fn default_performance_baseline() -> f64 {
    1.0
}

impl Default for EvolutionConfig {
    fn default() -> Self {
        Self {
            initial_phase: default_initial_phase(),
            history_capacity: default_history_capacity(),
            periodic_sync: default_periodic_sync(),
            sync_interval_secs: default_sync_interval_secs(),
            performance_baseline: default_performance_baseline(),
        }
    }
}

impl EvolutionConfig {
    /// Periodic sync interval.
    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EvolutionConfig::default();
        assert_eq!(config.initial_phase, Phase::EnhancementLayer);
        assert_eq!(config.sync_interval(), Duration::from_secs(900));
        assert!(config.periodic_sync);
    }

    #[test]
    fn test_partial_deserialize() {
        let config: EvolutionConfig =
            serde_json::from_str(r#"{"initial_phase": 2, "periodic_sync": false}"#).unwrap();
        assert_eq!(config.initial_phase, Phase::HybridDatabase);
        assert!(!config.periodic_sync);
        assert_eq!(config.history_capacity, 50);
    }
}
