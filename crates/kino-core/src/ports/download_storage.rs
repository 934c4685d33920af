//! Download state storage port definition.
//!
//! This port defines the interface for persisting the four partitions so
//! they survive application restarts.
//!
//! # Design
//!
//! - Persists partition membership and terminal results only
//! - Fine-grained progress stays in-memory (high churn); the coordinator
//!   snapshots it on a throttled schedule, not per signal
//! - Best-effort semantics: persistence failure never invalidates the
//!   in-memory mutation that triggered it

use async_trait::async_trait;

use super::StorageError;
use crate::download::PartitionState;

/// Port for persisting download partition state.
///
/// Implemented by `kino-store` and injected into the coordinator.
///
/// # Degradation contract
///
/// - `save` serializes each partition independently; a failure on one
///   partition must not corrupt or block saving the others. The first
///   failure is returned for observability, but callers proceed regardless.
/// - `load` yields an empty collection for any missing or corrupt
///   partition rather than failing the whole load.
#[async_trait]
pub trait DownloadStoragePort: Send + Sync {
    /// Durably store a snapshot of all four partitions.
    async fn save(&self, state: &PartitionState) -> Result<(), StorageError>;

    /// Restore the partitions recorded by the last successful save.
    async fn load(&self) -> Result<PartitionState, StorageError>;
}
