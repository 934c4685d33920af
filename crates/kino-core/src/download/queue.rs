//! Queue DTOs for snapshots and API responses.
//!
//! These types are "UI safe" - Clone + Debug + Serialize + Deserialize with
//! no infrastructure dependencies. Callers read coordinator state through
//! them instead of touching the partitions directly.

use super::types::{DownloadRecord, DownloadState, Quality};
use serde::{Deserialize, Serialize};

/// A single download as seen by observers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DownloadSummary {
    /// Stable record ID as a string.
    pub id: String,
    /// Title of the underlying content item.
    pub title: String,
    /// Selected quality.
    pub quality: Quality,
    /// Current lifecycle state.
    pub state: DownloadState,
    /// Fractional completion in `[0.0, 1.0]`.
    pub progress: f64,
    /// 1-based position among scheduled items (active first, then pending).
    /// Zero for completed/failed records.
    pub position: u32,
    /// Failure message for failed records.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DownloadSummary {
    /// Build a summary from a record at the given queue position.
    #[must_use]
    pub fn from_record(record: &DownloadRecord, position: u32) -> Self {
        Self {
            id: record.id.to_string(),
            title: record.content.title.clone(),
            quality: record.quality,
            state: record.state,
            progress: record.progress,
            position,
            error: record.error.clone(),
        }
    }
}

/// Snapshot of all four partitions for observers.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct QueueSnapshot {
    /// Scheduled items: active slots first (1-based positions), then the
    /// pending FIFO in order.
    pub items: Vec<DownloadSummary>,
    /// Finished downloads.
    pub completed: Vec<DownloadSummary>,
    /// Failed downloads.
    pub failed: Vec<DownloadSummary>,
    /// Number of records occupying active slots (downloading or paused).
    pub active_count: u32,
    /// Number of records waiting in the pending FIFO.
    pub pending_count: u32,
    /// Configured concurrency limit.
    pub max_concurrent: u32,
}

impl QueueSnapshot {
    /// Check if nothing is scheduled.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.items.is_empty()
    }

    /// Find a scheduled item by its ID string.
    pub fn get(&self, id: &str) -> Option<&DownloadSummary> {
        self.items.iter().find(|item| item.id == id)
    }
}
