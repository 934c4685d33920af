//! Download events - discriminated union for all download state changes.

use super::queue::DownloadSummary;
use super::types::PauseReason;
use serde::{Deserialize, Serialize};

/// Single discriminated union for all download events.
///
/// Frontends consume this as a tagged union; every state change the
/// coordinator applies is observable either through a targeted variant or
/// the full `QueueSnapshot`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DownloadEvent {
    /// Snapshot of the scheduled queue after a structural change.
    QueueSnapshot {
        /// Active and pending items in position order.
        items: Vec<DownloadSummary>,
        /// Configured concurrency limit.
        max_concurrent: u32,
    },

    /// A transfer was handed to the download engine.
    DownloadStarted {
        /// Record ID.
        id: String,
    },

    /// Progress update for an active download.
    DownloadProgress {
        /// Record ID.
        id: String,
        /// Fractional completion in `[0.0, 1.0]`.
        fraction: f64,
    },

    /// A download was paused.
    DownloadPaused {
        /// Record ID.
        id: String,
        /// Why it was paused.
        reason: PauseReason,
    },

    /// A paused download went back to downloading.
    DownloadResumed {
        /// Record ID.
        id: String,
    },

    /// A download finished and its artifact is on disk.
    DownloadCompleted {
        /// Record ID.
        id: String,
        /// Where the artifact was written.
        artifact_path: String,
    },

    /// A download failed terminally.
    DownloadFailed {
        /// Record ID.
        id: String,
        /// Failure message.
        error: String,
    },

    /// A download was cancelled and removed.
    DownloadCancelled {
        /// Record ID.
        id: String,
    },
}

impl DownloadEvent {
    /// Convenience constructor for progress events.
    pub fn progress(id: impl ToString, fraction: f64) -> Self {
        Self::DownloadProgress {
            id: id.to_string(),
            fraction,
        }
    }

    /// Convenience constructor for started events.
    pub fn started(id: impl ToString) -> Self {
        Self::DownloadStarted { id: id.to_string() }
    }

    /// Convenience constructor for completed events.
    pub fn completed(id: impl ToString, artifact_path: impl Into<String>) -> Self {
        Self::DownloadCompleted {
            id: id.to_string(),
            artifact_path: artifact_path.into(),
        }
    }

    /// Convenience constructor for failed events.
    pub fn failed(id: impl ToString, error: impl Into<String>) -> Self {
        Self::DownloadFailed {
            id: id.to_string(),
            error: error.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_are_tagged_unions() {
        let event = DownloadEvent::progress("abc", 0.5);
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"download_progress""#));

        let parsed: DownloadEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, event);
    }

    #[test]
    fn paused_event_carries_reason() {
        let event = DownloadEvent::DownloadPaused {
            id: "abc".to_string(),
            reason: PauseReason::CellularPolicy,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("cellular_policy"));
    }
}
