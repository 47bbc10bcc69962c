//! ConceptDB: phase-evolving query routing over a precise store and a
//! semantic store.
//!
//! [`ConceptDb`] wires one query router, one sync manager and one phase
//! manager over shared collaborator implementations. The component crates
//! are re-exported for callers that need their types directly.
//!
//! ```no_run
//! # async fn demo() {
//! use conceptdb::ConceptDb;
//!
//! let db = ConceptDb::builder().build().await;
//! let response = db.route("select * from products").await;
//! println!("{} results via {}", response.results.len(), response.decision);
//! # }
//! ```

pub mod builder;
pub mod db;

pub use builder::{ConceptDbBuilder, DEFAULT_EMBEDDING_DIMENSION};
pub use db::ConceptDb;

pub use conceptdb_core;
pub use conceptdb_evolution;
pub use conceptdb_router;
pub use conceptdb_sync;

pub use conceptdb_core::{Error, Result};
pub use conceptdb_evolution::{EvolutionOutcome, EvolutionStatus, Phase};
pub use conceptdb_router::{
    DailyRouting, Preference, RouteOptions, RouteResponse, RoutingDecision,
};
pub use conceptdb_sync::{ConceptChange, SyncDirection, SyncReport, SyncStatus};
