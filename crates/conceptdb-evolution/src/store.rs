//! Phase persistence.
//!
//! The live phase survives restarts through a [`PhaseStore`]. The JSON store
//! writes to a temporary file and renames it into place, so a crash never
//! leaves a half-written phase file behind.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use conceptdb_core::{Error, Result};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::phase::Phase;
use crate::types::EvolutionRecord;

/// File name used by [`JsonPhaseStore::in_dir`].
pub const PHASE_FILE: &str = "phase.json";

/// Persisted phase state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedPhase {
    /// Live phase.
    pub phase: Phase,
    /// Its conceptualization ratio.
    pub conceptualization_ratio: f64,
    /// When the phase last changed.
    pub updated_at: DateTime<Utc>,
    /// Transition history, oldest first.
    #[serde(default)]
    pub history: Vec<EvolutionRecord>,
}

impl PersistedPhase {
    /// State for `phase` as of now.
    pub fn new(phase: Phase, history: Vec<EvolutionRecord>) -> Self {
        Self {
            phase,
            conceptualization_ratio: phase.target_ratio(),
            updated_at: Utc::now(),
            history,
        }
    }
}

/// Loads and saves the live phase.
#[async_trait]
pub trait PhaseStore: Send + Sync {
    /// Load the persisted state; `None` when nothing was saved yet.
    async fn load(&self) -> Result<Option<PersistedPhase>>;

    /// Replace the persisted state.
    async fn save(&self, state: &PersistedPhase) -> Result<()>;
}

// ============================================================================
// JSON file
// ============================================================================

/// Phase state in a pretty-printed JSON file.
#[derive(Debug, Clone)]
pub struct JsonPhaseStore {
    path: PathBuf,
}

impl JsonPhaseStore {
    /// Store at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at `<dir>/phase.json`.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Self::new(dir.as_ref().join(PHASE_FILE))
    }

    /// File path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl PhaseStore for JsonPhaseStore {
    async fn load(&self) -> Result<Option<PersistedPhase>> {
        let json = match tokio::fs::read_to_string(&self.path).await {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::io_with_path(e, &self.path)),
        };
        let state = serde_json::from_str(&json).map_err(|e| {
            Error::invalid_data(format!(
                "Failed to parse phase file {}: {e}",
                self.path.display()
            ))
        })?;
        Ok(Some(state))
    }

    async fn save(&self, state: &PersistedPhase) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::io_with_path(e, parent))?;
        }

        let json = serde_json::to_string_pretty(state)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| Error::io_with_path(e, &tmp))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| Error::io_with_path(e, &self.path))?;

        log::debug!("Persisted {} to {}", state.phase, self.path.display());
        Ok(())
    }
}

// ============================================================================
// Memory
// ============================================================================

/// Phase state held in memory.
#[derive(Debug, Default)]
pub struct MemoryPhaseStore {
    state: Mutex<Option<PersistedPhase>>,
}

impl MemoryPhaseStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// A store already holding `phase`.
    pub fn with_phase(phase: Phase) -> Self {
        Self {
            state: Mutex::new(Some(PersistedPhase::new(phase, Vec::new()))),
        }
    }
}

#[async_trait]
impl PhaseStore for MemoryPhaseStore {
    async fn load(&self) -> Result<Option<PersistedPhase>> {
        Ok(self.state.lock().await.clone())
    }

    async fn save(&self, state: &PersistedPhase) -> Result<()> {
        *self.state.lock().await = Some(state.clone());
        Ok(())
    }
}
