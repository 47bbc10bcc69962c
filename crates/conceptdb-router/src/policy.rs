//! Routing policy snapshots.
//!
//! The live [`RoutingPolicy`] is an immutable `Arc` published through a
//! `tokio::sync::watch` channel. The phase manager holds the only
//! [`PolicyPublisher`]; routers hold [`PolicyReader`]s and take one snapshot
//! per query, so an in-flight query never sees a half-updated policy.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// Phase-dependent routing thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingPolicy {
    /// Monotonically increasing publication number.
    pub version: u64,
    /// Evolution phase (1..=4) this policy belongs to.
    pub phase: u8,
    /// Minimum SQL confidence for executing query text verbatim.
    pub sql_confidence_threshold: f64,
    /// Minimum similarity score for semantic search hits.
    pub semantic_confidence_threshold: f64,
    /// Minimum natural-language confidence for routing to the semantic
    /// store alone.
    pub concrete_to_concept_threshold: f64,
    /// Target share of traffic served by the semantic layer.
    pub target_ratio: f64,
}

impl Default for RoutingPolicy {
    fn default() -> Self {
        Self {
            version: 0,
            phase: 1,
            sql_confidence_threshold: 0.9,
            semantic_confidence_threshold: 0.7,
            concrete_to_concept_threshold: 0.8,
            target_ratio: 0.1,
        }
    }
}

/// Per-request store preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Preference {
    /// Never send natural language to the semantic store alone.
    Precise,
    /// Send all natural language to the semantic store alone.
    Semantic,
}

impl std::str::FromStr for Preference {
    type Err = conceptdb_core::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "precise" => Ok(Self::Precise),
            "semantic" => Ok(Self::Semantic),
            other => Err(conceptdb_core::Error::invalid_data(format!(
                "unknown preference '{other}' (expected precise or semantic)"
            ))),
        }
    }
}

impl RoutingPolicy {
    /// A per-query copy adjusted for `prefer`.
    pub fn with_preference(&self, prefer: Option<Preference>) -> Self {
        let mut policy = self.clone();
        match prefer {
            Some(Preference::Precise) => policy.concrete_to_concept_threshold = 1.01,
            Some(Preference::Semantic) => policy.concrete_to_concept_threshold = 0.0,
            None => {}
        }
        policy
    }
}

/// Create a policy channel seeded with `initial`.
pub fn routing_policy_channel(initial: RoutingPolicy) -> (PolicyPublisher, PolicyReader) {
    let (tx, rx) = watch::channel(Arc::new(initial));
    (PolicyPublisher { tx }, PolicyReader { rx })
}

/// Publishes new policy snapshots.
#[derive(Debug)]
pub struct PolicyPublisher {
    tx: watch::Sender<Arc<RoutingPolicy>>,
}

impl PolicyPublisher {
    /// Publish `policy` as the live snapshot, stamping the next version.
    pub fn publish(&self, mut policy: RoutingPolicy) -> Arc<RoutingPolicy> {
        policy.version = self.tx.borrow().version + 1;
        let snapshot = Arc::new(policy);
        self.tx.send_replace(Arc::clone(&snapshot));
        log::debug!(
            "Published routing policy v{} for phase {}",
            snapshot.version,
            snapshot.phase
        );
        snapshot
    }

    /// The live snapshot.
    pub fn current(&self) -> Arc<RoutingPolicy> {
        Arc::clone(&self.tx.borrow())
    }

    /// A new reader of this channel.
    pub fn subscribe(&self) -> PolicyReader {
        PolicyReader {
            rx: self.tx.subscribe(),
        }
    }
}

/// Reads policy snapshots.
#[derive(Debug, Clone)]
pub struct PolicyReader {
    rx: watch::Receiver<Arc<RoutingPolicy>>,
}

impl PolicyReader {
    /// The live snapshot.
    pub fn snapshot(&self) -> Arc<RoutingPolicy> {
        Arc::clone(&self.rx.borrow())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_phase_one() {
        let policy = RoutingPolicy::default();
        assert_eq!(policy.phase, 1);
        assert_eq!(policy.concrete_to_concept_threshold, 0.8);
    }

    #[test]
    fn test_publish_bumps_version_and_reaches_readers() {
        let (publisher, reader) = routing_policy_channel(RoutingPolicy::default());
        let before = reader.snapshot();

        let published = publisher.publish(RoutingPolicy {
            phase: 2,
            semantic_confidence_threshold: 0.6,
            ..RoutingPolicy::default()
        });
        assert_eq!(published.version, 1);

        let after = reader.snapshot();
        assert_eq!(after.phase, 2);
        assert_eq!(after.version, 1);
        // Snapshots taken earlier are untouched.
        assert_eq!(before.phase, 1);
        assert_eq!(before.version, 0);
    }

    #[test]
    fn test_subscribe_sees_current() {
        let (publisher, _reader) = routing_policy_channel(RoutingPolicy::default());
        publisher.publish(RoutingPolicy::default());
        publisher.publish(RoutingPolicy::default());
        assert_eq!(publisher.subscribe().snapshot().version, 2);
        assert_eq!(publisher.current().version, 2);
    }

    #[test]
    fn test_preference_copy_leaves_original() {
        let policy = RoutingPolicy::default();
        assert_eq!(
            policy
                .with_preference(Some(Preference::Precise))
                .concrete_to_concept_threshold,
            1.01
        );
        assert_eq!(
            policy
                .with_preference(Some(Preference::Semantic))
                .concrete_to_concept_threshold,
            0.0
        );
        assert_eq!(policy.with_preference(None), policy);
        assert_eq!(policy.concrete_to_concept_threshold, 0.8);
    }

    #[test]
    fn test_preference_from_str() {
        assert_eq!("Precise".parse::<Preference>().unwrap(), Preference::Precise);
        assert_eq!("semantic".parse::<Preference>().unwrap(), Preference::Semantic);
        assert!("both".parse::<Preference>().is_err());
    }
}
