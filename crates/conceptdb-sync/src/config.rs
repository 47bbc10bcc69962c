//! Sync manager configuration.

use std::sync::Arc;
use std::time::Duration;

use conceptdb_core::ConceptExtractor;
use conceptdb_core::adapters::RetryingExtractor;
use serde::{Deserialize, Serialize};

/// Sync manager configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Maximum rows sampled per table per cycle.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Change records retained.
    #[serde(default = "default_change_log_capacity")]
    pub change_log_capacity: usize,

    /// Checkpoints retained.
    #[serde(default = "default_checkpoint_retention")]
    pub checkpoint_retention: usize,

    /// Initial minimum confidence passed to concept extraction.
    #[serde(default = "default_min_extraction_confidence")]
    pub min_extraction_confidence: f64,

    /// Retries for transient extraction failures.
    #[serde(default = "default_retry_attempts")]
    pub extraction_retry_attempts: u32,

    /// Initial delay between extraction retries, in milliseconds.
    #[serde(default = "default_retry_initial_delay_ms")]
    pub extraction_retry_initial_delay_ms: u64,

    /// Maximum delay between extraction retries, in milliseconds.
    #[serde(default = "default_retry_max_delay_ms")]
    pub extraction_retry_max_delay_ms: u64,
}

fn default_batch_size() -> usize {
    100
}

fn default_change_log_capacity() -> usize {
    1_000
}

fn default_checkpoint_retention() -> usize {
    10
}

fn default_min_extraction_confidence() -> f64 {
    0.5
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_initial_delay_ms() -> u64 {
    200
}

fn default_retry_max_delay_ms() -> u64 {
    5_000
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            change_log_capacity: default_change_log_capacity(),
            checkpoint_retention: default_checkpoint_retention(),
            min_extraction_confidence: default_min_extraction_confidence(),
            extraction_retry_attempts: default_retry_attempts(),
            extraction_retry_initial_delay_ms: default_retry_initial_delay_ms(),
            extraction_retry_max_delay_ms: default_retry_max_delay_ms(),
        }
    }
}

impl SyncConfig {
    /// Wrap `extractor` with the configured retry policy.
    pub fn with_retries(&self, extractor: Arc<dyn ConceptExtractor>) -> Arc<dyn ConceptExtractor> {
        if self.extraction_retry_attempts == 0 {
            return extractor;
        }
        Arc::new(
            RetryingExtractor::new(extractor)
                .with_max_attempts(self.extraction_retry_attempts)
                .with_initial_delay(Duration::from_millis(self.extraction_retry_initial_delay_ms))
                .with_max_delay(Duration::from_millis(self.extraction_retry_max_delay_ms)),
        )
    }
}
