//! ConceptDB Core: shared types, collaborator traits, errors, and utilities.
//!
//! This crate provides the foundational types used across all ConceptDB
//! crates. It has no internal ConceptDB dependencies (dependency level 0).
//!
//! # Modules
//!
//! - [`error`]: Error types and Result alias
//! - [`adapters`]: Precise store, semantic store, extraction, and embedding
//!   capability traits with in-memory implementations
//! - [`guard`]: Single-flight mutual-exclusion flag
//! - [`ids`]: Stable identifiers and text helpers
//! - [`ring`]: Bounded append-only log

pub mod adapters;
pub mod error;
pub mod guard;
pub mod ids;
pub mod ring;

// Re-export key types at crate root for convenience
pub use error::{Error, Result};
pub use guard::{InFlight, InFlightPermit};
pub use ids::{stable_id, truncate_chars};
pub use ring::BoundedLog;

pub use adapters::{
    ConceptExtractor, EmbeddingProvider, ExtractedConcept, PreciseStore, Row, SemanticHit,
    SemanticStore,
};
