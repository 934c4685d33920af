//! Download coordinator port definition.
//!
//! This port is the public interface of the download subsystem. Feature
//! layers (UI screens, CLI commands) depend on it; the implementation in
//! `kino-download` stays swappable.
//!
//! # Semantics
//!
//! All control operations are fire-and-forget with idempotent-control
//! semantics: referencing an unknown ID, or repeating an operation that is
//! already in effect, is a logged no-op - never an error to the caller.
//! Observable effects surface through [`QueueSnapshot`] reads and the
//! event emitter, not through return values.

use async_trait::async_trait;
use std::time::Duration;

use crate::download::{ContentRef, DownloadId, Quality, QueueSnapshot, StreamSource};

/// Request to enqueue a new download.
#[derive(Debug, Clone)]
pub struct DownloadRequest {
    /// Caller-supplied record ID. When `None` the coordinator generates
    /// one; callers that pre-allocate IDs (optimistic UI rows) pass theirs.
    pub id: Option<DownloadId>,
    /// The catalog item to download.
    pub content: ContentRef,
    /// Selected quality tag.
    pub quality: Quality,
    /// Stream source resolved by the caller, if it already has one.
    pub source: Option<StreamSource>,
}

impl DownloadRequest {
    /// Create a request with required fields.
    #[must_use]
    pub const fn new(content: ContentRef, quality: Quality) -> Self {
        Self {
            id: None,
            content,
            quality,
            source: None,
        }
    }

    /// Use a pre-allocated record ID.
    #[must_use]
    pub const fn with_id(mut self, id: DownloadId) -> Self {
        self.id = Some(id);
        self
    }

    /// Attach an already-resolved stream source.
    #[must_use]
    pub fn with_source(mut self, source: StreamSource) -> Self {
        self.source = Some(source);
        self
    }
}

/// Configuration for creating a download coordinator.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Maximum number of records occupying active slots (`K`). Paused
    /// downloads keep their slot.
    pub max_concurrent: u32,
    /// Minimum interval between persistence snapshots triggered by
    /// progress signals. Structural mutations persist immediately.
    pub persist_min_interval: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 3,
            persist_min_interval: Duration::from_secs(1),
        }
    }
}

impl CoordinatorConfig {
    /// Set the concurrency limit (clamped to at least 1).
    #[must_use]
    pub fn with_max_concurrent(mut self, max: u32) -> Self {
        self.max_concurrent = max.max(1);
        self
    }

    /// Set the progress-persist coalescing window.
    #[must_use]
    pub const fn with_persist_min_interval(mut self, interval: Duration) -> Self {
        self.persist_min_interval = interval;
        self
    }
}

/// Port for the download queue coordinator.
///
/// # Usage
///
/// ```ignore
/// let coordinator: Arc<dyn DownloadCoordinatorPort> = /* ... */;
///
/// let request = DownloadRequest::new(content, Quality::P1080).with_source(source);
/// let id = coordinator.enqueue(request).await;
///
/// coordinator.pause(&id).await;
/// let snapshot = coordinator.snapshot().await;
/// ```
#[async_trait]
pub trait DownloadCoordinatorPort: Send + Sync {
    /// Add a download. Admitted straight to an active slot when one is
    /// free, otherwise appended to the pending FIFO. Returns the record ID
    /// (the existing one when the request duplicates a tracked ID).
    async fn enqueue(&self, request: DownloadRequest) -> DownloadId;

    /// Pause an active download. The paused record keeps its slot; no
    /// pending item is promoted.
    async fn pause(&self, id: &DownloadId);

    /// Resume a paused download.
    async fn resume(&self, id: &DownloadId);

    /// Cancel a download. Active records free their slot and the next
    /// pending item (if any) is promoted; pending records are removed
    /// without disturbing the remaining FIFO order.
    async fn cancel(&self, id: &DownloadId);

    /// Remove a finished (completed or failed) download record. Physical
    /// artifact deletion is the caller's filesystem concern.
    async fn delete(&self, id: &DownloadId);

    /// Re-enqueue a failed download with a fresh source resolution.
    async fn retry(&self, id: &DownloadId);

    /// Pause every currently-downloading record because cellular transfer
    /// is disallowed. Idempotent.
    async fn pause_all_for_cellular_restriction(&self);

    /// Fill free slots from the pending FIFO and auto-resume records that
    /// were paused by policy or restart (never user pauses). Invoked on
    /// app foreground or when the network recovers.
    async fn resume_pending(&self);

    /// Read the current state of all four partitions.
    async fn snapshot(&self) -> QueueSnapshot;
}
