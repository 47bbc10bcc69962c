//! The sync manager.
//!
//! A cycle detects changes on both sides since the current checkpoint,
//! propagates rows into concepts (precise to semantic), resolves conflicts
//! last-write-wins, writes concept coverage mappings back (semantic to
//! precise), and checkpoints. Only one cycle runs at a time; a second caller
//! gets [`SyncStatus::InProgress`] immediately.
//!
//! Per-item failures never abort a cycle: they are collected into the report
//! and the change log, and the cycle still checkpoints.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use chrono::{DateTime, Utc};
use conceptdb_core::{
    BoundedLog, ConceptExtractor, EmbeddingProvider, InFlight, PreciseStore, Result, Row,
    SemanticStore, stable_id,
};
use futures::future::join_all;
use serde_json::{Value, json};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::config::SyncConfig;
use crate::types::{
    ChangeDirection, ChangeKind, ChangeOutcome, ChangeRecord, Checkpoint, ConceptChange,
    EntityRef, SyncDirection, SyncError, SyncManagerStatus, SyncReport, SyncStatus,
};

const RECENT_ERRORS: usize = 5;

// ============================================================================
// State
// ============================================================================

struct SyncState {
    checkpoints: BoundedLog<Checkpoint>,
    change_log: BoundedLog<ChangeRecord>,
    next_seq: u64,
    last_sync: Option<DateTime<Utc>>,
    total_synced: u64,
    covered_tables: BTreeSet<String>,
    recent_errors: BoundedLog<SyncError>,
}

impl SyncState {
    fn log_change(&mut self, mut record: ChangeRecord) -> u64 {
        record.seq = self.next_seq;
        self.next_seq += 1;
        self.change_log.push(record);
        self.next_seq - 1
    }
}

fn change(
    direction: ChangeDirection,
    kind: ChangeKind,
    entity: EntityRef,
    outcome: ChangeOutcome,
) -> ChangeRecord {
    ChangeRecord {
        seq: 0,
        direction,
        kind,
        entity,
        timestamp: Utc::now(),
        outcome,
        confidence: None,
        detail: None,
    }
}

fn outcome_of<T>(result: &Result<T>) -> ChangeOutcome {
    match result {
        Ok(_) => ChangeOutcome::Success,
        Err(e) => ChangeOutcome::Error(e.to_string()),
    }
}

/// Rows of one table considered by a cycle.
struct TableDelta {
    table: String,
    /// Rows to extract concepts from.
    rows: Vec<Row>,
    /// Rows modified since the checkpoint.
    changed: Vec<Row>,
}

/// A concept destined for a coverage mapping.
struct MappingCandidate {
    table: String,
    concept_id: String,
    confidence: f64,
}

// ============================================================================
// Manager
// ============================================================================

/// Keeps the precise and semantic stores consistent.
pub struct SyncManager {
    precise: Arc<dyn PreciseStore>,
    semantic: Arc<dyn SemanticStore>,
    extractor: Arc<dyn ConceptExtractor>,
    embedder: Arc<dyn EmbeddingProvider>,
    config: SyncConfig,
    in_flight: InFlight,
    min_confidence: AtomicU64,
    state: Mutex<SyncState>,
    pub(crate) schedule: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl SyncManager {
    /// Create a manager. The extractor is wrapped with the configured
    /// retry policy.
    pub fn new(
        precise: Arc<dyn PreciseStore>,
        semantic: Arc<dyn SemanticStore>,
        extractor: Arc<dyn ConceptExtractor>,
        embedder: Arc<dyn EmbeddingProvider>,
        config: SyncConfig,
    ) -> Self {
        let state = SyncState {
            checkpoints: BoundedLog::new(config.checkpoint_retention),
            change_log: BoundedLog::new(config.change_log_capacity),
            next_seq: 0,
            last_sync: None,
            total_synced: 0,
            covered_tables: BTreeSet::new(),
            recent_errors: BoundedLog::new(RECENT_ERRORS),
        };
        Self {
            precise,
            semantic,
            extractor: config.with_retries(extractor),
            embedder,
            min_confidence: AtomicU64::new(config.min_extraction_confidence.to_bits()),
            config,
            in_flight: InFlight::new(),
            state: Mutex::new(state),
            schedule: std::sync::Mutex::new(None),
        }
    }

    /// Minimum confidence passed to concept extraction.
    pub fn extraction_confidence(&self) -> f64 {
        f64::from_bits(self.min_confidence.load(Ordering::Acquire))
    }

    /// Change the minimum extraction confidence. A running cycle keeps the
    /// value it started with.
    pub fn set_extraction_confidence(&self, confidence: f64) {
        let confidence = confidence.clamp(0.0, 1.0);
        self.min_confidence
            .store(confidence.to_bits(), Ordering::Release);
        log::info!("Extraction minimum confidence set to {confidence:.2}");
    }

    /// Whether a cycle is running.
    pub fn in_progress(&self) -> bool {
        self.in_flight.is_active()
    }

    /// Report a concept created or updated directly in the semantic store.
    ///
    /// The change becomes input to the next semantic-to-precise pass.
    /// Returns the change record's sequence number.
    pub async fn record_concept_change(&self, change: ConceptChange) -> u64 {
        let record = ChangeRecord {
            seq: 0,
            direction: ChangeDirection::SemanticToPrecise,
            kind: ChangeKind::Observed,
            entity: EntityRef {
                table: change.source_table,
                row_id: change.source_row,
                concept_id: Some(change.concept_id),
            },
            timestamp: change.updated_at,
            outcome: ChangeOutcome::Success,
            confidence: Some(change.confidence),
            detail: None,
        };
        self.state.lock().await.log_change(record)
    }

    /// Run one sync cycle.
    ///
    /// `scope` limits the precise-side tables considered; `None` means all
    /// tables. Without `force`, a cycle that detects no changes returns
    /// [`SyncStatus::NoChanges`] without extracting or checkpointing.
    pub async fn sync(
        &self,
        direction: SyncDirection,
        scope: Option<&[String]>,
        force: bool,
    ) -> SyncReport {
        let Some(_permit) = self.in_flight.try_acquire() else {
            log::info!("Sync already in progress; rejecting {direction} request");
            return SyncReport::empty(SyncStatus::InProgress, direction, force);
        };

        let started = Instant::now();
        let started_at = Utc::now();
        let min_confidence = self.extraction_confidence();
        let mut report = SyncReport::empty(SyncStatus::Completed, direction, force);
        report.started_at = started_at;

        let (previous, seq_mark, observed) = {
            let state = self.state.lock().await;
            let previous = state.checkpoints.latest().cloned();
            let since_seq = previous.as_ref().map_or(0, |c| c.change_seq);
            let observed: Vec<ChangeRecord> = if direction.semantic_to_precise() {
                state
                    .change_log
                    .iter()
                    .filter(|r| r.kind == ChangeKind::Observed && r.seq >= since_seq)
                    .cloned()
                    .collect()
            } else {
                Vec::new()
            };
            (previous, state.next_seq, observed)
        };
        let rows_since = previous.as_ref().and_then(|c| c.rows_since);

        // Delta detection
        let (deltas, mut precise_complete) = if direction.precise_to_semantic() {
            self.detect_precise_changes(scope, rows_since, force, &mut report.errors)
                .await
        } else {
            (Vec::new(), true)
        };
        let precise_changed = direction.precise_to_semantic()
            && (rows_since.is_none() || deltas.iter().any(|d| !d.changed.is_empty()));

        if !force && !precise_changed && observed.is_empty() {
            log::info!("No changes detected since last checkpoint; skipping {direction} sync");
            let mut report = SyncReport::empty(SyncStatus::NoChanges, direction, force);
            report.started_at = started_at;
            report.duration_ms = started.elapsed().as_millis() as u64;
            return report;
        }

        log::info!(
            "Starting {direction} sync ({} table(s), {} observed concept change(s){})",
            deltas.len(),
            observed.len(),
            if force { ", forced" } else { "" }
        );

        // Precise to semantic
        let mut created = Vec::new();
        for delta in deltas.iter().filter(|d| !d.rows.is_empty()) {
            let result = self.propagate_table(delta, min_confidence).await;
            let mut record = change(
                ChangeDirection::PreciseToSemantic,
                ChangeKind::Propagated,
                EntityRef {
                    table: Some(delta.table.clone()),
                    ..EntityRef::default()
                },
                outcome_of(&result),
            );
            match result {
                Ok(concepts) => {
                    record.detail = Some(format!("{} concept(s)", concepts.len()));
                    report.precise_to_semantic_count += concepts.len();
                    created.extend(concepts);
                }
                Err(e) => {
                    log::warn!("Concept propagation failed for table {}: {e}", delta.table);
                    report.errors.push(SyncError::new(Some(delta.table.as_str()), &e));
                    precise_complete = false;
                }
            }
            self.state.lock().await.log_change(record);
        }

        // Conflicts
        let mut settled = HashSet::new();
        if direction == SyncDirection::Bidirectional {
            for observation in &observed {
                if let Some(resolved) = self
                    .resolve_conflict(observation, &deltas, &mut report.errors)
                    .await
                {
                    settled.insert(resolved);
                    report.conflicts_resolved += 1;
                }
            }
        }

        // Semantic to precise
        if direction.semantic_to_precise() {
            let candidates = observed
                .iter()
                .filter(|r| !settled.contains(&r.seq))
                .filter_map(|r| {
                    Some(MappingCandidate {
                        table: r.entity.table.clone()?,
                        concept_id: r.entity.concept_id.clone()?,
                        confidence: r.confidence.unwrap_or(0.5),
                    })
                })
                .chain(created.iter().filter_map(|c| {
                    Some(MappingCandidate {
                        table: c.source_table.clone()?,
                        concept_id: c.concept_id.clone(),
                        confidence: c.confidence,
                    })
                }));
            for candidate in candidates {
                if self.write_mapping(&candidate, &mut report.errors).await {
                    report.semantic_to_precise_count += 1;
                }
            }
        }

        // Checkpoint
        let completed_at = Utc::now();
        let checkpoint = Checkpoint {
            id: stable_id(&[&started_at.to_rfc3339(), &seq_mark.to_string()]),
            as_of: started_at,
            // A failed table keeps the old marker so its rows are retried.
            rows_since: if direction.precise_to_semantic() && precise_complete {
                Some(started_at)
            } else {
                rows_since
            },
            change_seq: if direction.semantic_to_precise() {
                seq_mark
            } else {
                previous.as_ref().map_or(0, |c| c.change_seq)
            },
            completed_at,
            direction,
            precise_to_semantic: report.precise_to_semantic_count,
            semantic_to_precise: report.semantic_to_precise_count,
            conflicts_resolved: report.conflicts_resolved,
            errors: report.errors.len(),
        };
        report.checkpoint = Some(checkpoint.id.clone());

        {
            let mut state = self.state.lock().await;
            state.checkpoints.push(checkpoint);
            state.last_sync = Some(completed_at);
            state.total_synced +=
                (report.precise_to_semantic_count + report.semantic_to_precise_count) as u64;
            for error in &report.errors {
                state.recent_errors.push(error.clone());
            }
        }

        report.duration_ms = started.elapsed().as_millis() as u64;
        log::info!(
            "Sync completed: {} concept(s), {} mapping(s), {} conflict(s), {} error(s)",
            report.precise_to_semantic_count,
            report.semantic_to_precise_count,
            report.conflicts_resolved,
            report.errors.len()
        );
        report
    }

    async fn detect_precise_changes(
        &self,
        scope: Option<&[String]>,
        since: Option<DateTime<Utc>>,
        force: bool,
        errors: &mut Vec<SyncError>,
    ) -> (Vec<TableDelta>, bool) {
        let tables = match scope {
            Some(tables) => tables.to_vec(),
            None => match self.precise.tables().await {
                Ok(tables) => tables,
                Err(e) => {
                    log::warn!("Failed to list tables: {e}");
                    errors.push(SyncError::new(None, &e));
                    return (Vec::new(), false);
                }
            },
        };

        let scans = join_all(
            tables
                .iter()
                .map(|table| self.scan_table(table, since, force)),
        )
        .await;

        let mut complete = true;
        let deltas = tables
            .into_iter()
            .zip(scans)
            .filter_map(|(table, scan)| match scan {
                Ok(delta) => Some(delta),
                Err(e) => {
                    log::warn!("Failed to detect changes in {table}: {e}");
                    errors.push(SyncError::new(Some(table.as_str()), &e));
                    complete = false;
                    None
                }
            })
            .collect();
        (deltas, complete)
    }

    async fn scan_table(
        &self,
        table: &str,
        since: Option<DateTime<Utc>>,
        force: bool,
    ) -> Result<TableDelta> {
        let changed = match since {
            Some(since) => self.precise.changed_since(table, since).await?,
            None => Vec::new(),
        };
        let rows = if force || since.is_none() {
            self.precise.sample(table, self.config.batch_size).await?
        } else {
            changed
                .iter()
                .take(self.config.batch_size)
                .cloned()
                .collect()
        };
        Ok(TableDelta {
            table: table.to_string(),
            rows,
            changed,
        })
    }

    /// Extract concepts from a table's rows and upsert them.
    ///
    /// Concept ids derive from table and concept name, so re-extraction
    /// overwrites. Concepts are embedded by name.
    async fn propagate_table(
        &self,
        delta: &TableDelta,
        min_confidence: f64,
    ) -> Result<Vec<ConceptChange>> {
        let text = delta
            .rows
            .iter()
            .flat_map(|row| row.text_fields().map(|(_, value)| value))
            .collect::<Vec<_>>()
            .join(". ");
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }

        let concepts = self.extractor.extract(&text, min_confidence).await?;
        if concepts.is_empty() {
            return Ok(Vec::new());
        }

        let names: Vec<&str> = concepts.iter().map(|c| c.name.as_str()).collect();
        let vectors = self.embedder.embed_batch(&names).await?;
        let extracted_at = Utc::now();

        let mut created = Vec::with_capacity(concepts.len());
        for (concept, vector) in concepts.iter().zip(vectors) {
            let payload = json!({
                "name": concept.name,
                "description": concept.description,
                "confidence": concept.confidence,
                "source_table": delta.table,
                "extracted_at": extracted_at.to_rfc3339(),
            });
            let id = stable_id(&[&delta.table, &concept.name]);
            let id = self.semantic.upsert(vector, payload, Some(id)).await?;
            created.push(ConceptChange {
                concept_id: id,
                source_table: Some(delta.table.clone()),
                source_row: None,
                confidence: concept.confidence,
                updated_at: extracted_at,
            });
        }
        log::debug!(
            "Upserted {} concept(s) from table {}",
            created.len(),
            delta.table
        );
        Ok(created)
    }

    /// Resolve a conflict between an observed concept change and precise
    /// rows changed for the same entity. Returns the observation's sequence
    /// number when a conflict was resolved.
    async fn resolve_conflict(
        &self,
        observation: &ChangeRecord,
        deltas: &[TableDelta],
        errors: &mut Vec<SyncError>,
    ) -> Option<u64> {
        let table = observation.entity.table.as_deref()?;
        let concept_id = observation.entity.concept_id.as_deref()?;
        let delta = deltas.iter().find(|d| d.table == table)?;

        let precise_at = delta
            .changed
            .iter()
            .filter(|row| match &observation.entity.row_id {
                Some(row_id) => row.id().as_deref() == Some(row_id.as_str()),
                None => true,
            })
            .filter_map(Row::updated_at)
            .max()?;
        let semantic_at = observation.timestamp;
        if precise_at == semantic_at {
            return None;
        }

        let precise_wins = precise_at > semantic_at;
        let (direction, resolution, result) = if precise_wins {
            (
                ChangeDirection::PreciseToSemantic,
                "precise_wins",
                self.overwrite_concept(concept_id, precise_at).await,
            )
        } else {
            let confidence = observation.confidence.unwrap_or(0.5);
            let result = self
                .precise
                .upsert_coverage_mapping(table, concept_id, confidence)
                .await;
            (ChangeDirection::SemanticToPrecise, "semantic_wins", result)
        };

        log::info!(
            "Resolved conflict on {table}/{concept_id}: {resolution} (precise {precise_at}, semantic {semantic_at})"
        );

        let mut record = change(
            direction,
            ChangeKind::Resolved,
            observation.entity.clone(),
            outcome_of(&result),
        );
        record.confidence = observation.confidence;
        record.detail = Some(resolution.to_string());

        let mut state = self.state.lock().await;
        match &result {
            Ok(()) if !precise_wins => {
                state.covered_tables.insert(table.to_string());
            }
            Ok(()) => {}
            Err(e) => errors.push(SyncError::new(Some(table), e)),
        }
        state.log_change(record);
        Some(observation.seq)
    }

    async fn overwrite_concept(&self, concept_id: &str, precise_at: DateTime<Utc>) -> Result<()> {
        let Some(stored) = self.semantic.get_by_id(concept_id).await? else {
            log::debug!("Concept {concept_id} no longer exists; nothing to overwrite");
            return Ok(());
        };
        let mut payload = stored.payload;
        if let Value::Object(fields) = &mut payload {
            fields.insert(
                "source_updated_at".to_string(),
                Value::String(precise_at.to_rfc3339()),
            );
            fields.insert("resolution".to_string(), json!("precise_wins"));
        }
        self.semantic
            .upsert(stored.vector, payload, Some(stored.id))
            .await?;
        Ok(())
    }

    async fn write_mapping(
        &self,
        candidate: &MappingCandidate,
        errors: &mut Vec<SyncError>,
    ) -> bool {
        let result = self
            .precise
            .upsert_coverage_mapping(
                &candidate.table,
                &candidate.concept_id,
                candidate.confidence,
            )
            .await;

        let mut record = change(
            ChangeDirection::SemanticToPrecise,
            ChangeKind::Propagated,
            EntityRef {
                table: Some(candidate.table.clone()),
                row_id: None,
                concept_id: Some(candidate.concept_id.clone()),
            },
            outcome_of(&result),
        );
        record.confidence = Some(candidate.confidence);

        let mut state = self.state.lock().await;
        state.log_change(record);
        match result {
            Ok(()) => {
                state.covered_tables.insert(candidate.table.clone());
                true
            }
            Err(e) => {
                log::warn!(
                    "Coverage mapping failed for {}/{}: {e}",
                    candidate.table,
                    candidate.concept_id
                );
                errors.push(SyncError::new(Some(candidate.table.as_str()), &e));
                false
            }
        }
    }

    /// Share of precise-store tables with at least one coverage mapping.
    pub async fn coverage(&self) -> f64 {
        let tables = match self.precise.tables().await {
            Ok(tables) => tables,
            Err(e) => {
                log::warn!("Failed to list tables for coverage: {e}");
                return 0.0;
            }
        };
        if tables.is_empty() {
            return 0.0;
        }
        let state = self.state.lock().await;
        let covered = tables
            .iter()
            .filter(|t| state.covered_tables.contains(*t))
            .count();
        covered as f64 / tables.len() as f64
    }

    /// Retained checkpoints, oldest first.
    pub async fn checkpoints(&self) -> Vec<Checkpoint> {
        self.state.lock().await.checkpoints.iter().cloned().collect()
    }

    /// The most recent `n` change records, oldest first.
    pub async fn recent_changes(&self, n: usize) -> Vec<ChangeRecord> {
        self.state.lock().await.change_log.tail(n)
    }

    /// Current manager status.
    pub async fn status(&self) -> SyncManagerStatus {
        let state = self.state.lock().await;
        SyncManagerStatus {
            last_sync: state.last_sync,
            in_progress: self.in_flight.is_active(),
            total_synced: state.total_synced,
            checkpoints: state.checkpoints.len(),
            current_checkpoint: state.checkpoints.latest().cloned(),
            change_log_len: state.change_log.len(),
            recent_errors: state.recent_errors.iter().cloned().collect(),
            extraction_min_confidence: self.extraction_confidence(),
            scheduled: self.is_scheduled(),
        }
    }
}

impl Drop for SyncManager {
    fn drop(&mut self) {
        self.unschedule();
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Duration as ChronoDuration;
    use conceptdb_core::adapters::{
        Column, KeywordConceptExtractor, MemoryPreciseStore, MemorySemanticStore,
        MockEmbeddingProvider,
    };
    use conceptdb_core::{Error, ExtractedConcept};

    struct Fixture {
        precise: Arc<MemoryPreciseStore>,
        semantic: Arc<MemorySemanticStore>,
        extractor: Arc<KeywordConceptExtractor>,
        manager: SyncManager,
    }

    async fn seed(precise: &MemoryPreciseStore) {
        precise
            .upsert_row(
                "tickets",
                Row::new()
                    .with("id", "t1")
                    .with("subject", "Late shipping for order")
                    .with("body", "Customer says shipping was late and shipping cost too high"),
            )
            .await;
        precise
            .upsert_row(
                "tickets",
                Row::new()
                    .with("id", "t2")
                    .with("subject", "Refund request")
                    .with("body", "Refund for damaged laptop"),
            )
            .await;
        precise
            .upsert_row(
                "products",
                Row::new()
                    .with("id", "p1")
                    .with("name", "Laptop")
                    .with("description", "Lightweight laptop with long battery"),
            )
            .await;
    }

    async fn fixture(config: SyncConfig) -> Fixture {
        let precise = Arc::new(MemoryPreciseStore::new());
        seed(&precise).await;
        let semantic = Arc::new(MemorySemanticStore::new());
        let extractor = Arc::new(KeywordConceptExtractor::new());
        let manager = SyncManager::new(
            precise.clone(),
            semantic.clone(),
            extractor.clone(),
            Arc::new(MockEmbeddingProvider::new(32)),
            config,
        );
        Fixture {
            precise,
            semantic,
            extractor,
            manager,
        }
    }

    fn observed(concept_id: &str, table: &str, row: Option<&str>, at: DateTime<Utc>) -> ConceptChange {
        ConceptChange {
            concept_id: concept_id.to_string(),
            source_table: Some(table.to_string()),
            source_row: row.map(str::to_string),
            confidence: 0.9,
            updated_at: at,
        }
    }

    // ------------------------------------------------------------------------
    // Cycles
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_first_sync_treats_everything_as_changed() {
        let f = fixture(SyncConfig::default()).await;
        let report = f.manager.sync(SyncDirection::Bidirectional, None, false).await;

        assert_eq!(report.status, SyncStatus::Completed);
        assert!(report.precise_to_semantic_count > 0);
        assert_eq!(report.precise_to_semantic_count, f.semantic.len().await);
        // Every created concept is mapped back in the same cycle.
        assert_eq!(
            report.semantic_to_precise_count,
            report.precise_to_semantic_count
        );
        assert!(report.errors.is_empty());
        assert!(report.checkpoint.is_some());
        assert_eq!(f.extractor.calls(), 2);
        assert_eq!(f.manager.coverage().await, 1.0);

        let shipping = f
            .semantic
            .get_by_id(&stable_id(&["tickets", "shipping"]))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(shipping.payload["source_table"], "tickets");
        assert_eq!(shipping.payload["confidence"], 1.0);
    }

    #[tokio::test]
    async fn test_no_changes_skips_extraction_and_checkpoint() {
        let f = fixture(SyncConfig::default()).await;
        f.manager.sync(SyncDirection::Bidirectional, None, false).await;
        let calls = f.extractor.calls();

        let report = f.manager.sync(SyncDirection::Bidirectional, None, false).await;
        assert_eq!(report.status, SyncStatus::NoChanges);
        assert!(report.checkpoint.is_none());
        assert_eq!(f.extractor.calls(), calls);
        assert_eq!(f.manager.checkpoints().await.len(), 1);
    }

    #[tokio::test]
    async fn test_force_runs_without_changes() {
        let f = fixture(SyncConfig::default()).await;
        f.manager.sync(SyncDirection::Bidirectional, None, false).await;
        let calls = f.extractor.calls();

        let report = f.manager.sync(SyncDirection::Bidirectional, None, true).await;
        assert_eq!(report.status, SyncStatus::Completed);
        assert!(report.forced);
        assert_eq!(f.extractor.calls(), calls + 2);
        assert_eq!(f.manager.checkpoints().await.len(), 2);
    }

    #[tokio::test]
    async fn test_only_changed_tables_reprocessed() {
        let f = fixture(SyncConfig::default()).await;
        f.manager.sync(SyncDirection::PreciseToSemantic, None, false).await;
        let calls = f.extractor.calls();

        let later = (Utc::now() + ChronoDuration::hours(1)).to_rfc3339();
        f.precise
            .upsert_row(
                "tickets",
                Row::new()
                    .with("id", "t3")
                    .with("subject", "Warehouse warehouse delays")
                    .with("updated_at", later),
            )
            .await;

        let report = f.manager.sync(SyncDirection::PreciseToSemantic, None, false).await;
        assert_eq!(report.status, SyncStatus::Completed);
        assert_eq!(f.extractor.calls(), calls + 1);
        assert!(
            f.semantic
                .get_by_id(&stable_id(&["tickets", "warehouse"]))
                .await
                .unwrap()
                .is_some()
        );
    }

    #[tokio::test]
    async fn test_scope_limits_tables() {
        let f = fixture(SyncConfig::default()).await;
        let scope = vec!["products".to_string()];
        let report = f
            .manager
            .sync(SyncDirection::PreciseToSemantic, Some(scope.as_slice()), false)
            .await;
        assert_eq!(report.status, SyncStatus::Completed);
        assert_eq!(f.extractor.calls(), 1);
    }

    #[tokio::test]
    async fn test_observed_change_mapped_once() {
        let f = fixture(SyncConfig::default()).await;
        f.manager.sync(SyncDirection::PreciseToSemantic, None, false).await;
        assert!(f.precise.coverage_mappings().await.is_empty());

        f.manager
            .record_concept_change(observed("c-manual", "products", None, Utc::now()))
            .await;
        let report = f.manager.sync(SyncDirection::SemanticToPrecise, None, false).await;
        assert_eq!(report.status, SyncStatus::Completed);
        assert_eq!(report.semantic_to_precise_count, 1);

        let mappings = f.precise.coverage_mappings().await;
        assert_eq!(mappings.len(), 1);
        assert_eq!(mappings[0].concept_id, "c-manual");
        assert_eq!(mappings[0].confidence, 0.9);
        assert_eq!(f.manager.coverage().await, 0.5);

        // Records the manager wrote itself are not changes.
        let report = f.manager.sync(SyncDirection::SemanticToPrecise, None, false).await;
        assert_eq!(report.status, SyncStatus::NoChanges);
    }

    #[tokio::test]
    async fn test_semantic_only_cycle_keeps_precise_marker() {
        let f = fixture(SyncConfig::default()).await;
        f.manager
            .record_concept_change(observed("c1", "products", None, Utc::now()))
            .await;
        f.manager.sync(SyncDirection::SemanticToPrecise, None, false).await;

        // The precise side has never been scanned, so it is still all new.
        let report = f.manager.sync(SyncDirection::PreciseToSemantic, None, false).await;
        assert_eq!(report.status, SyncStatus::Completed);
        assert_eq!(f.extractor.calls(), 2);
    }

    // ------------------------------------------------------------------------
    // Conflicts
    // ------------------------------------------------------------------------

    async fn conflict_fixture(semantic_offset_hours: i64) -> Fixture {
        let f = fixture(SyncConfig::default()).await;
        f.manager.sync(SyncDirection::Bidirectional, None, false).await;

        f.semantic
            .upsert(vec![1.0; 32], json!({"name": "manual"}), Some("manual".into()))
            .await
            .unwrap();

        let now = Utc::now();
        f.precise
            .upsert_row(
                "tickets",
                Row::new()
                    .with("id", "t1")
                    .with("subject", "Late shipping for order")
                    .with("updated_at", (now + ChronoDuration::hours(2)).to_rfc3339()),
            )
            .await;
        f.manager
            .record_concept_change(observed(
                "manual",
                "tickets",
                Some("t1"),
                now + ChronoDuration::hours(semantic_offset_hours),
            ))
            .await;
        f
    }

    fn has_mapping(mappings: &[conceptdb_core::adapters::CoverageMapping], id: &str) -> bool {
        mappings
            .iter()
            .any(|m| m.table == "tickets" && m.concept_id == id)
    }

    #[tokio::test]
    async fn test_conflict_precise_wins() {
        let f = conflict_fixture(1).await;
        let report = f.manager.sync(SyncDirection::Bidirectional, None, false).await;
        assert_eq!(report.conflicts_resolved, 1);

        let concept = f.semantic.get_by_id("manual").await.unwrap().unwrap();
        assert_eq!(concept.payload["resolution"], "precise_wins");
        assert!(concept.payload["source_updated_at"].is_string());
        assert!(!has_mapping(&f.precise.coverage_mappings().await, "manual"));

        let resolved: Vec<_> = f
            .manager
            .recent_changes(1_000)
            .await
            .into_iter()
            .filter(|r| r.kind == ChangeKind::Resolved)
            .collect();
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].detail.as_deref(), Some("precise_wins"));
        assert!(resolved[0].outcome.is_success());
    }

    #[tokio::test]
    async fn test_conflict_semantic_wins() {
        let f = conflict_fixture(3).await;
        let report = f.manager.sync(SyncDirection::Bidirectional, None, false).await;
        assert_eq!(report.conflicts_resolved, 1);

        assert!(has_mapping(&f.precise.coverage_mappings().await, "manual"));
        let concept = f.semantic.get_by_id("manual").await.unwrap().unwrap();
        assert!(concept.payload.get("resolution").is_none());
    }

    #[tokio::test]
    async fn test_conflicts_only_in_bidirectional_cycles() {
        let f = conflict_fixture(3).await;
        let report = f.manager.sync(SyncDirection::SemanticToPrecise, None, false).await;
        assert_eq!(report.conflicts_resolved, 0);
        assert_eq!(report.semantic_to_precise_count, 1);
    }

    // ------------------------------------------------------------------------
    // Guards, bounds, failures
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_concurrent_sync_rejected() {
        let f = fixture(SyncConfig::default()).await;
        let _held = f.manager.in_flight.try_acquire().unwrap();
        assert!(f.manager.in_progress());

        let report = f.manager.sync(SyncDirection::Bidirectional, None, true).await;
        assert_eq!(report.status, SyncStatus::InProgress);
        assert_eq!(f.extractor.calls(), 0);
        assert!(f.manager.checkpoints().await.is_empty());
    }

    #[tokio::test]
    async fn test_change_log_is_bounded() {
        let config = SyncConfig {
            change_log_capacity: 3,
            ..SyncConfig::default()
        };
        let f = fixture(config).await;
        for i in 0..5 {
            f.manager
                .record_concept_change(observed(&format!("c{i}"), "tickets", None, Utc::now()))
                .await;
        }
        let status = f.manager.status().await;
        assert_eq!(status.change_log_len, 3);
        let seqs: Vec<_> = f
            .manager
            .recent_changes(10)
            .await
            .iter()
            .map(|r| r.seq)
            .collect();
        assert_eq!(seqs, vec![2, 3, 4]);
    }

    #[tokio::test]
    async fn test_checkpoint_retention() {
        let config = SyncConfig {
            checkpoint_retention: 2,
            ..SyncConfig::default()
        };
        let f = fixture(config).await;
        for _ in 0..3 {
            f.manager.sync(SyncDirection::PreciseToSemantic, None, true).await;
        }
        assert_eq!(f.manager.checkpoints().await.len(), 2);
        assert_eq!(f.manager.status().await.checkpoints, 2);
    }

    struct BrokenExtractor;

    #[async_trait]
    impl ConceptExtractor for BrokenExtractor {
        async fn extract(&self, _text: &str, _min: f64) -> Result<Vec<ExtractedConcept>> {
            Err(Error::invalid_data("model returned garbage"))
        }
    }

    #[tokio::test]
    async fn test_extraction_failures_still_checkpoint() {
        let precise = Arc::new(MemoryPreciseStore::new());
        seed(&precise).await;
        let manager = SyncManager::new(
            precise,
            Arc::new(MemorySemanticStore::new()),
            Arc::new(BrokenExtractor),
            Arc::new(MockEmbeddingProvider::new(8)),
            SyncConfig::default(),
        );

        let report = manager.sync(SyncDirection::Bidirectional, None, false).await;
        assert_eq!(report.status, SyncStatus::Completed);
        assert_eq!(report.errors.len(), 2);
        assert!(report.checkpoint.is_some());

        let failed = manager
            .recent_changes(10)
            .await
            .into_iter()
            .filter(|r| !r.outcome.is_success())
            .count();
        assert_eq!(failed, 2);

        let status = manager.status().await;
        assert_eq!(status.recent_errors.len(), 2);
        assert!(status.last_sync.is_some());
    }

    /// Delegates to an in-memory store; `changed_since` fails while
    /// `failures_left` is non-zero.
    struct FlakyScanStore {
        inner: Arc<MemoryPreciseStore>,
        failures_left: std::sync::atomic::AtomicUsize,
    }

    #[async_trait]
    impl PreciseStore for FlakyScanStore {
        async fn execute(&self, query: &str, params: &[Value]) -> Result<Vec<Row>> {
            self.inner.execute(query, params).await
        }

        async fn sample(&self, table: &str, limit: usize) -> Result<Vec<Row>> {
            self.inner.sample(table, limit).await
        }

        async fn schema(&self, table: &str) -> Result<Vec<Column>> {
            self.inner.schema(table).await
        }

        async fn upsert_coverage_mapping(
            &self,
            table: &str,
            concept_id: &str,
            confidence: f64,
        ) -> Result<()> {
            self.inner
                .upsert_coverage_mapping(table, concept_id, confidence)
                .await
        }

        async fn tables(&self) -> Result<Vec<String>> {
            self.inner.tables().await
        }

        async fn changed_since(&self, table: &str, since: DateTime<Utc>) -> Result<Vec<Row>> {
            let failing = self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if failing {
                return Err(Error::backend("precise", "connection reset"));
            }
            self.inner.changed_since(table, since).await
        }

        async fn estimate_complexity(&self, query: &str) -> Result<f64> {
            self.inner.estimate_complexity(query).await
        }
    }

    #[tokio::test]
    async fn test_failed_scan_is_retried_next_cycle() {
        let inner = Arc::new(MemoryPreciseStore::new());
        inner
            .upsert_row(
                "products",
                Row::new()
                    .with("id", "p1")
                    .with("description", "Laptop battery")
                    .with("updated_at", "2024-01-01T00:00:00Z"),
            )
            .await;
        let precise = Arc::new(FlakyScanStore {
            inner: inner.clone(),
            failures_left: std::sync::atomic::AtomicUsize::new(0),
        });
        let semantic = Arc::new(MemorySemanticStore::new());
        let manager = SyncManager::new(
            precise.clone(),
            semantic.clone(),
            Arc::new(KeywordConceptExtractor::new()),
            Arc::new(MockEmbeddingProvider::new(8)),
            SyncConfig::default(),
        );
        manager.sync(SyncDirection::PreciseToSemantic, None, false).await;
        let first = manager.checkpoints().await[0].rows_since;
        assert!(first.is_some());

        let later = (Utc::now() + ChronoDuration::hours(1)).to_rfc3339();
        inner
            .upsert_row(
                "products",
                Row::new()
                    .with("id", "p2")
                    .with("description", "Wireless headphones")
                    .with("updated_at", later),
            )
            .await;

        precise.failures_left.store(1, Ordering::SeqCst);
        let failed = manager.sync(SyncDirection::PreciseToSemantic, None, true).await;
        assert_eq!(failed.errors.len(), 1);
        assert_eq!(manager.checkpoints().await[1].rows_since, first);

        let retried = manager.sync(SyncDirection::PreciseToSemantic, None, false).await;
        assert_eq!(retried.status, SyncStatus::Completed);
        assert!(retried.errors.is_empty());
        assert!(
            semantic
                .get_by_id(&stable_id(&["products", "headphones"]))
                .await
                .unwrap()
                .is_some()
        );
        assert!(manager.checkpoints().await[2].rows_since > first);
    }

    #[tokio::test]
    async fn test_extraction_confidence_is_used() {
        let f = fixture(SyncConfig::default()).await;
        f.manager.set_extraction_confidence(0.3);
        assert_eq!(f.manager.status().await.extraction_min_confidence, 0.3);

        let report = f.manager.sync(SyncDirection::PreciseToSemantic, None, false).await;
        // At 0.3, single-mention ticket terms (1/3 of the top term) qualify.
        assert!(
            f.semantic
                .get_by_id(&stable_id(&["tickets", "customer"]))
                .await
                .unwrap()
                .is_some()
        );
        assert!(report.precise_to_semantic_count > 7);
    }

    #[tokio::test]
    async fn test_coverage_without_tables() {
        let manager = SyncManager::new(
            Arc::new(MemoryPreciseStore::new()),
            Arc::new(MemorySemanticStore::new()),
            Arc::new(KeywordConceptExtractor::new()),
            Arc::new(MockEmbeddingProvider::new(8)),
            SyncConfig::default(),
        );
        assert_eq!(manager.coverage().await, 0.0);
        let report = manager.sync(SyncDirection::Bidirectional, None, false).await;
        assert_eq!(report.status, SyncStatus::Completed);
        assert_eq!(report.precise_to_semantic_count, 0);
    }
}
