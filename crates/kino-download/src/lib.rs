//! Download queue coordination for kino.
//!
//! This crate implements the download side of the hexagon: a
//! bounded-concurrency scheduler over four partitions (pending, active,
//! completed, failed) with crash-safe persistence and event emission
//! through injected ports.
//!
//! - `store` - pure partition state machine
//! - `manager` - async coordinator implementing `DownloadCoordinatorPort`
//! - `persist` - write coalescing for the progress hot path

// Re-export core types for convenience
pub use kino_core::download::{
    DownloadError, DownloadEvent, DownloadId, DownloadRecord, DownloadState, DownloadSummary,
    PauseReason, Quality, QueueSnapshot,
};
pub use kino_core::ports::{
    CoordinatorConfig, DownloadCoordinatorPort, DownloadRequest, DownloadStoragePort,
    DownloaderPort, SourceResolverPort, TransferJob, TransferOutcome, TransferSignal,
};

pub(crate) mod persist;
pub(crate) mod store;

// Re-export the throttle for adapters with their own hot paths
pub use persist::PersistThrottle;

// Re-export store types needed by consumers
pub use store::{Admission, PartitionStore, RestoreReport};

// Public API - the coordinator
mod manager;

pub use manager::{CoordinatorDeps, DownloadCoordinator, build_coordinator};
