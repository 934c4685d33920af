//! Partitioned download state.
//!
//! This module provides a pure state machine over the four partitions
//! (pending / active / completed / failed). No I/O is performed here; the
//! orchestrator (`DownloadCoordinator`) handles transfers, persistence and
//! events.
//!
//! # Design
//!
//! - Pure synchronous state machine (no async, no IO, no tracing)
//! - Operations return results the caller turns into side effects or logs
//! - Deterministic: same inputs always produce same outputs
//!
//! # Slot Semantics
//!
//! A record in the active partition occupies one of the `max_concurrent`
//! slots whether it is downloading or paused. Only removal (cancel,
//! completion, failure) frees a slot.

use std::collections::HashSet;
use std::collections::VecDeque;
use std::path::Path;

use chrono::Utc;
use indexmap::IndexMap;

use kino_core::download::{
    DownloadError, DownloadId, DownloadRecord, DownloadState, DownloadSummary, PartitionState,
    PauseReason, QueueSnapshot,
};

/// Result of inserting a new record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Admission {
    /// A slot was free; the record went straight to `Downloading`.
    Started,
    /// All slots busy; the record joined the pending FIFO.
    Queued {
        /// 1-based overall position (active slots first).
        position: u32,
    },
}

/// What `restore` did with the loaded state.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RestoreReport {
    /// Completed records evicted because their artifact is gone.
    pub evicted: Vec<DownloadId>,
    /// Orphaned `Downloading` records demoted to `Paused { Restart }`.
    pub demoted: Vec<DownloadId>,
    /// Active records beyond the concurrency limit, moved back to pending.
    pub requeued: Vec<DownloadId>,
    /// Records dropped because an earlier partition already claimed the ID.
    pub dropped_duplicates: Vec<DownloadId>,
}

/// Manages the four download partitions.
///
/// This is a sync type with no internal locking - the caller
/// (`DownloadCoordinator`) is responsible for synchronization.
pub struct PartitionStore {
    pending: VecDeque<DownloadRecord>,
    active: IndexMap<DownloadId, DownloadRecord>,
    completed: Vec<DownloadRecord>,
    failed: Vec<DownloadRecord>,
    max_concurrent: u32,
}

impl PartitionStore {
    /// Create an empty store with the given concurrency limit (min 1).
    #[must_use]
    pub fn new(max_concurrent: u32) -> Self {
        Self {
            pending: VecDeque::new(),
            active: IndexMap::new(),
            completed: Vec::new(),
            failed: Vec::new(),
            max_concurrent: max_concurrent.max(1),
        }
    }

    /// Get the concurrency limit.
    pub const fn max_concurrent(&self) -> u32 {
        self.max_concurrent
    }

    /// Number of records occupying active slots (downloading or paused).
    pub fn active_len(&self) -> usize {
        self.active.len()
    }

    /// Number of records waiting in the pending FIFO.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Number of completed records.
    pub fn completed_len(&self) -> usize {
        self.completed.len()
    }

    /// Number of failed records.
    pub fn failed_len(&self) -> usize {
        self.failed.len()
    }

    /// Number of free active slots.
    pub fn slots_free(&self) -> usize {
        (self.max_concurrent as usize).saturating_sub(self.active.len())
    }

    /// Check whether any partition tracks this ID.
    pub fn contains(&self, id: &DownloadId) -> bool {
        self.active.contains_key(id)
            || self.pending.iter().any(|r| &r.id == id)
            || self.completed.iter().any(|r| &r.id == id)
            || self.failed.iter().any(|r| &r.id == id)
    }

    /// Get an active record by ID.
    pub fn get_active(&self, id: &DownloadId) -> Option<&DownloadRecord> {
        self.active.get(id)
    }

    /// Insert a new record.
    ///
    /// Admits straight into an active slot when one is free, otherwise
    /// appends to the pending FIFO. Rejects IDs already tracked anywhere.
    pub fn insert(&mut self, mut record: DownloadRecord) -> Result<Admission, DownloadError> {
        if self.contains(&record.id) {
            return Err(DownloadError::duplicate(record.id));
        }

        if self.slots_free() > 0 {
            record.state = DownloadState::Downloading;
            record.touch();
            self.active.insert(record.id, record);
            Ok(Admission::Started)
        } else {
            record.state = DownloadState::Pending;
            record.touch();
            self.pending.push_back(record);
            #[allow(clippy::cast_possible_truncation)]
            let position = (self.active.len() + self.pending.len()) as u32;
            Ok(Admission::Queued { position })
        }
    }

    /// Pause an active download.
    ///
    /// Returns `Ok(true)` when the record changed, `Ok(false)` for a
    /// redundant pause (idempotent). An explicit user pause upgrades a
    /// policy/restart pause so auto-resume won't undo what the user asked
    /// for; the reverse downgrade never happens.
    pub fn pause(&mut self, id: &DownloadId, reason: PauseReason) -> Result<bool, DownloadError> {
        let record = self
            .active
            .get_mut(id)
            .ok_or_else(|| DownloadError::not_found(id))?;

        match record.state {
            DownloadState::Downloading => {
                record.state = DownloadState::Paused { reason };
                record.touch();
                Ok(true)
            }
            DownloadState::Paused { reason: current } => {
                if reason == PauseReason::User && current != PauseReason::User {
                    record.state = DownloadState::Paused { reason };
                    record.touch();
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
            _ => Ok(false),
        }
    }

    /// Resume a paused download.
    ///
    /// Returns the prior pause reason, or `None` when the record was
    /// already downloading (idempotent no-op). The caller needs the reason:
    /// a `Restart` pause has no live transfer behind it and must be
    /// restarted rather than resumed.
    pub fn resume(&mut self, id: &DownloadId) -> Result<Option<PauseReason>, DownloadError> {
        let record = self
            .active
            .get_mut(id)
            .ok_or_else(|| DownloadError::not_found(id))?;

        match record.state {
            DownloadState::Paused { reason } => {
                record.state = DownloadState::Downloading;
                record.touch();
                Ok(Some(reason))
            }
            _ => Ok(None),
        }
    }

    /// Remove a record from the active partition, freeing its slot.
    pub fn remove_active(&mut self, id: &DownloadId) -> Option<DownloadRecord> {
        self.active.shift_remove(id)
    }

    /// Remove a record from the pending FIFO without disturbing the
    /// relative order of the remaining queue.
    pub fn remove_pending(&mut self, id: &DownloadId) -> Option<DownloadRecord> {
        let idx = self.pending.iter().position(|r| &r.id == id)?;
        self.pending.remove(idx)
    }

    /// Move an active record to the completed partition.
    pub fn complete(
        &mut self,
        id: &DownloadId,
        artifact_path: impl Into<std::path::PathBuf>,
    ) -> Result<(), DownloadError> {
        let mut record = self
            .active
            .shift_remove(id)
            .ok_or_else(|| DownloadError::not_found(id))?;

        record.state = DownloadState::Completed;
        record.progress = 1.0;
        record.local_artifact_path = Some(artifact_path.into());
        record.completed_at = Some(Utc::now());
        record.error = None;
        record.touch();
        self.completed.push(record);
        Ok(())
    }

    /// Move an active record to the failed partition. Progress is left as
    /// last reported.
    pub fn fail(&mut self, id: &DownloadId, error: impl Into<String>) -> Result<(), DownloadError> {
        let mut record = self
            .active
            .shift_remove(id)
            .ok_or_else(|| DownloadError::not_found(id))?;

        record.state = DownloadState::Failed;
        record.error = Some(error.into());
        record.touch();
        self.failed.push(record);
        Ok(())
    }

    /// Put a record that never reached an active slot straight into the
    /// failed partition (promotion fast-fail).
    pub fn fail_record(&mut self, mut record: DownloadRecord, error: impl Into<String>) {
        record.state = DownloadState::Failed;
        record.error = Some(error.into());
        record.touch();
        self.failed.push(record);
    }

    /// Remove a record from the completed partition.
    pub fn delete_completed(&mut self, id: &DownloadId) -> Option<DownloadRecord> {
        let idx = self.completed.iter().position(|r| &r.id == id)?;
        Some(self.completed.remove(idx))
    }

    /// Remove a record from the failed partition.
    pub fn delete_failed(&mut self, id: &DownloadId) -> Option<DownloadRecord> {
        let idx = self.failed.iter().position(|r| &r.id == id)?;
        Some(self.failed.remove(idx))
    }

    /// Move a failed record back to the pending FIFO tail.
    ///
    /// Progress, error and the stale source are cleared; the source is
    /// re-resolved on admission.
    #[allow(clippy::cast_possible_truncation)]
    pub fn retry_failed(&mut self, id: &DownloadId) -> Result<u32, DownloadError> {
        let idx = self
            .failed
            .iter()
            .position(|r| &r.id == id)
            .ok_or_else(|| DownloadError::not_found(id))?;

        let mut record = self.failed.remove(idx);
        record.state = DownloadState::Pending;
        record.progress = 0.0;
        record.error = None;
        record.source = None;
        record.touch();
        self.pending.push_back(record);

        Ok((self.active.len() + self.pending.len()) as u32)
    }

    /// Update progress for an active, downloading record.
    ///
    /// Returns `Ok(true)` when progress changed. Regressions and updates
    /// for paused records are ignored (`Ok(false)`); unknown IDs are
    /// `Err(NotFound)` so the caller can log late signals.
    pub fn set_progress(&mut self, id: &DownloadId, fraction: f64) -> Result<bool, DownloadError> {
        let record = self
            .active
            .get_mut(id)
            .ok_or_else(|| DownloadError::not_found(id))?;

        if record.state != DownloadState::Downloading {
            return Ok(false);
        }

        // Full progress (1.0) is recorded by completion, never by a
        // progress signal: only completed records read 100%.
        let fraction = fraction.clamp(0.0, 1.0);
        if fraction >= 1.0 || fraction <= record.progress {
            return Ok(false);
        }

        record.progress = fraction;
        record.touch();
        Ok(true)
    }

    /// Pop the pending head if a slot is free.
    ///
    /// The record is handed back still in `Pending` state; the caller
    /// must re-insert it via [`Self::admit`] (or fail it) promptly.
    pub fn next_admittable(&mut self) -> Option<DownloadRecord> {
        if self.slots_free() > 0 {
            self.pending.pop_front()
        } else {
            None
        }
    }

    /// Place a record into an active slot in `Downloading` state.
    pub fn admit(&mut self, mut record: DownloadRecord) {
        record.state = DownloadState::Downloading;
        record.touch();
        self.active.insert(record.id, record);
    }

    /// Update the stored source of an active record.
    pub fn set_source(
        &mut self,
        id: &DownloadId,
        source: kino_core::download::StreamSource,
    ) -> Result<(), DownloadError> {
        let record = self
            .active
            .get_mut(id)
            .ok_or_else(|| DownloadError::not_found(id))?;
        record.source = Some(source);
        record.touch();
        Ok(())
    }

    /// Pause every downloading record with the given reason.
    ///
    /// Already-paused records are untouched. Returns the IDs actually
    /// transitioned, so calling this with nothing eligible is a no-op.
    pub fn pause_all_downloading(&mut self, reason: PauseReason) -> Vec<DownloadId> {
        let mut transitioned = Vec::new();
        for (id, record) in &mut self.active {
            if record.state == DownloadState::Downloading {
                record.state = DownloadState::Paused { reason };
                record.touch();
                transitioned.push(*id);
            }
        }
        transitioned
    }

    /// IDs of paused records eligible for automatic resumption (paused by
    /// policy or restart, never by the user).
    pub fn auto_resumable(&self) -> Vec<DownloadId> {
        self.active
            .iter()
            .filter_map(|(id, record)| match record.state {
                DownloadState::Paused { reason } if reason != PauseReason::User => Some(*id),
                _ => None,
            })
            .collect()
    }

    /// Build a snapshot of all four partitions.
    #[allow(clippy::cast_possible_truncation)]
    pub fn snapshot(&self) -> QueueSnapshot {
        let mut items = Vec::with_capacity(self.active.len() + self.pending.len());
        let mut position = 1u32;

        for record in self.active.values() {
            items.push(DownloadSummary::from_record(record, position));
            position += 1;
        }
        for record in &self.pending {
            items.push(DownloadSummary::from_record(record, position));
            position += 1;
        }

        QueueSnapshot {
            items,
            completed: self
                .completed
                .iter()
                .map(|r| DownloadSummary::from_record(r, 0))
                .collect(),
            failed: self
                .failed
                .iter()
                .map(|r| DownloadSummary::from_record(r, 0))
                .collect(),
            active_count: self.active.len() as u32,
            pending_count: self.pending.len() as u32,
            max_concurrent: self.max_concurrent,
        }
    }

    /// Ordered view of the partitions for persistence.
    pub fn to_partition_state(&self) -> PartitionState {
        PartitionState {
            queued: self.pending.iter().cloned().collect(),
            active: self.active.values().cloned().collect(),
            completed: self.completed.clone(),
            failed: self.failed.clone(),
        }
    }

    /// Replace all partitions with loaded state.
    ///
    /// - Completed records whose artifact no longer resolves are evicted.
    /// - Orphaned `Downloading` records are demoted to `Paused { Restart }`
    ///   (no live transfer backs them); an explicit `resume_pending`
    ///   restarts them.
    /// - Active records beyond `max_concurrent` (state saved under a larger
    ///   limit, or edited by hand) are moved to the head of the pending
    ///   FIFO so the slot bound holds.
    /// - A record whose ID was already claimed by an earlier partition is
    ///   dropped, preserving the one-partition-per-ID invariant.
    pub fn restore(
        &mut self,
        state: PartitionState,
        artifact_exists: &dyn Fn(&Path) -> bool,
    ) -> RestoreReport {
        let mut report = RestoreReport::default();
        let mut seen: HashSet<DownloadId> = HashSet::new();

        self.pending.clear();
        self.active.clear();
        self.completed.clear();
        self.failed.clear();

        for mut record in state.active {
            if !seen.insert(record.id) {
                report.dropped_duplicates.push(record.id);
                continue;
            }
            if self.active.len() >= self.max_concurrent as usize {
                // Saved under a larger limit (or edited by hand); overflow
                // rejoins the queue ahead of persisted pending records.
                record.state = DownloadState::Pending;
                record.touch();
                report.requeued.push(record.id);
                self.pending.push_back(record);
                continue;
            }
            if record.state == DownloadState::Downloading {
                record.state = DownloadState::Paused {
                    reason: PauseReason::Restart,
                };
                record.touch();
                report.demoted.push(record.id);
            }
            self.active.insert(record.id, record);
        }

        for mut record in state.queued {
            if !seen.insert(record.id) {
                report.dropped_duplicates.push(record.id);
                continue;
            }
            record.state = DownloadState::Pending;
            self.pending.push_back(record);
        }

        for record in state.completed {
            if !seen.insert(record.id) {
                report.dropped_duplicates.push(record.id);
                continue;
            }
            let present = record
                .local_artifact_path
                .as_deref()
                .is_some_and(artifact_exists);
            if present {
                self.completed.push(record);
            } else {
                report.evicted.push(record.id);
            }
        }

        for record in state.failed {
            if !seen.insert(record.id) {
                report.dropped_duplicates.push(record.id);
                continue;
            }
            self.failed.push(record);
        }

        report
    }
}
