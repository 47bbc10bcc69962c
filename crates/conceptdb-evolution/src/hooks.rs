//! Extension points for later-phase transitions.
//!
//! Phases 3 and 4 have deployment-specific meaning. Each hook runs before a
//! transition commits; an error aborts the transition with nothing changed.
//! The defaults do nothing.

use async_trait::async_trait;
use conceptdb_core::Result;

/// Deployment-specific work for later phases.
#[async_trait]
pub trait PhaseHooks: Send + Sync {
    /// Entering phase 3: build concept-based indexes.
    async fn create_concept_indexes(&self) -> Result<()> {
        log::debug!("No concept index hook configured");
        Ok(())
    }

    /// Entering phase 3: move critical data into the concept layer.
    async fn migrate_critical_data(&self) -> Result<()> {
        log::debug!("No critical data migration hook configured");
        Ok(())
    }

    /// Entering phase 4.
    async fn enter_pure_concept(&self) -> Result<()> {
        log::debug!("No pure concept hook configured");
        Ok(())
    }
}

/// Hooks that do nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopPhaseHooks;

impl PhaseHooks for NoopPhaseHooks {}
