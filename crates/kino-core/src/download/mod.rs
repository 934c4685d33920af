//! Download domain: records, states, partitions, errors, events.
//!
//! Pure domain types only - no I/O, no locking, no runtime dependencies.
//! The coordinator implementation lives in `kino-download`; persistence
//! adapters in `kino-store`.

mod errors;
mod events;
mod queue;
mod types;

pub use errors::{DownloadError, DownloadResult};
pub use events::DownloadEvent;
pub use queue::{DownloadSummary, QueueSnapshot};
pub use types::{
    ContentRef, DownloadId, DownloadRecord, DownloadState, PartitionState, PauseReason, Quality,
    StreamSource,
};
