//! Bidirectional synchronization between ConceptDB's stores.
//!
//! The [`SyncManager`] turns precise-store rows into semantic concepts,
//! writes concept coverage back to the precise store, resolves conflicting
//! edits last-write-wins, and checkpoints after every cycle.

pub mod config;
pub mod manager;
mod schedule;
pub mod types;

pub use config::SyncConfig;
pub use manager::SyncManager;
pub use types::{
    ChangeDirection, ChangeKind, ChangeOutcome, ChangeRecord, Checkpoint, ConceptChange,
    EntityRef, SyncDirection, SyncError, SyncManagerStatus, SyncReport, SyncStatus,
};
