//! Evolution phases for ConceptDB.
//!
//! A deployment starts in phase 1 and is promoted, one criteria-gated step
//! at a time, towards phase 4. Each phase publishes its own routing policy
//! and tunes the sync manager; promotion is decided from metrics derived
//! from routing decisions, answer feedback and sync coverage.
//!
//! # Modules
//!
//! - [`phase`]: The phase table, policies, and promotion criteria
//! - [`metrics`]: Raw metrics, the composite score, blocking factors
//! - [`source`]: Metrics sources, including the live router/sync source
//! - [`accuracy`]: Answer feedback tracking
//! - [`store`]: Phase persistence
//! - [`hooks`]: Extension points for phases 3 and 4
//! - [`manager`]: The phase manager
//! - [`config`]: Evolution configuration

pub mod accuracy;
pub mod config;
pub mod hooks;
pub mod manager;
pub mod metrics;
pub mod phase;
pub mod source;
pub mod store;
pub mod types;

pub use accuracy::{AccuracySummary, AccuracyTracker};
pub use config::EvolutionConfig;
pub use hooks::{NoopPhaseHooks, PhaseHooks};
pub use manager::PhaseManager;
pub use metrics::{EvolutionMetrics, RawMetrics};
pub use phase::{Phase, PromotionCriteria};
pub use source::{LiveMetricsSource, MetricsSource};
pub use store::{JsonPhaseStore, MemoryPhaseStore, PersistedPhase, PhaseStore};
pub use types::{EvolutionOutcome, EvolutionRecord, EvolutionStatus, PhaseInfo};
