//! Core domain types and port definitions for the kino download subsystem.
//!
//! This crate is pure: domain types carry no I/O, and infrastructure is
//! reached only through the traits in [`ports`]. The coordinator
//! implementation lives in `kino-download`; the JSON persistence adapter
//! in `kino-store`.

pub mod download;
pub mod ports;

// Re-export commonly used types for convenience
pub use download::{
    ContentRef, DownloadError, DownloadEvent, DownloadId, DownloadRecord, DownloadResult,
    DownloadState, DownloadSummary, PartitionState, PauseReason, Quality, QueueSnapshot,
    StreamSource,
};
pub use ports::{
    CoordinatorConfig, DownloadCoordinatorPort, DownloadEventEmitterPort, DownloadRequest,
    DownloadStoragePort, DownloaderPort, NoopDownloadEmitter, SourceResolverPort, StorageError,
    TransferJob, TransferOutcome, TransferSignal,
};
