//! Query routing for ConceptDB.
//!
//! This crate decides, per query, whether the precise store, the semantic
//! store, or both should answer it, and records every decision.
//!
//! # Modules
//!
//! - [`classifier`]: Keyword and structure based query classification
//! - [`policy`]: Versioned routing policy snapshots
//! - [`router`]: Dispatch, merge, fallback
//! - [`decision`]: Decision records, the decision log, routing statistics
//! - [`merge`]: Result items and ordered de-duplication
//! - [`nl_sql`]: Pattern-based natural language to SQL conversion
//! - [`config`]: Router configuration

pub mod classifier;
pub mod config;
pub mod decision;
pub mod merge;
pub mod nl_sql;
pub mod policy;
pub mod router;

pub use classifier::{Classification, QueryType, Signals};
pub use config::RouterConfig;
pub use decision::{
    Branch, BranchFailure, DailyRouting, DecisionLog, DecisionRecord, DecisionStats, DecisionTotals,
    LifetimeTotals, RoutingDecision, RoutingStats, daily_timeline,
};
pub use merge::{HitSource, QueryHit};
pub use policy::{PolicyPublisher, PolicyReader, Preference, RoutingPolicy, routing_policy_channel};
pub use router::{QueryExplanation, QueryRouter, RouteOptions, RouteResponse, decide};
