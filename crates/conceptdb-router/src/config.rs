//! Router configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Query router configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Timeout for a precise-store call, in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub precise_timeout_ms: u64,

    /// Timeout for a semantic-store call (embedding plus search), in
    /// milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub semantic_timeout_ms: u64,

    /// Timeout for the precise store's complexity estimate, in milliseconds.
    #[serde(default = "default_complexity_timeout_ms")]
    pub complexity_timeout_ms: u64,

    /// Maximum semantic hits requested per query.
    #[serde(default = "default_search_limit")]
    pub search_limit: usize,

    /// Query text is truncated to this many characters in decision records.
    #[serde(default = "default_max_query_chars")]
    pub max_query_chars: usize,

    /// Number of decision records retained for windowed statistics.
    #[serde(default = "default_decision_log_capacity")]
    pub decision_log_capacity: usize,
}

fn default_timeout_ms() -> u64 {
    2_000
}

fn default_complexity_timeout_ms() -> u64 {
    500
}

fn default_search_limit() -> usize {
    10
}

fn default_max_query_chars() -> usize {
    500
}

fn default_decision_log_capacity() -> usize {
    10_000
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            precise_timeout_ms: default_timeout_ms(),
            semantic_timeout_ms: default_timeout_ms(),
            complexity_timeout_ms: default_complexity_timeout_ms(),
            search_limit: default_search_limit(),
            max_query_chars: default_max_query_chars(),
            decision_log_capacity: default_decision_log_capacity(),
        }
    }
}

impl RouterConfig {
    /// Precise-store call timeout.
    pub fn precise_timeout(&self) -> Duration {
        Duration::from_millis(self.precise_timeout_ms)
    }

    /// Semantic-store call timeout.
    pub fn semantic_timeout(&self) -> Duration {
        Duration::from_millis(self.semantic_timeout_ms)
    }

    /// Complexity estimate timeout.
    pub fn complexity_timeout(&self) -> Duration {
        Duration::from_millis(self.complexity_timeout_ms)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RouterConfig::default();
        assert_eq!(config.precise_timeout(), Duration::from_secs(2));
        assert_eq!(config.search_limit, 10);
    }

    #[test]
    fn test_partial_deserialize_fills_defaults() {
        let config: RouterConfig = serde_json::from_str(r#"{"semantic_timeout_ms": 50}"#).unwrap();
        assert_eq!(config.semantic_timeout(), Duration::from_millis(50));
        assert_eq!(config.precise_timeout_ms, 2_000);
        assert_eq!(config.decision_log_capacity, 10_000);
    }
}
