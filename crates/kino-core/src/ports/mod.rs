//! Port definitions (trait abstractions) for external systems.
//!
//! Ports define the interfaces that the download core expects from
//! infrastructure. They contain no implementation details and use only
//! domain types.
//!
//! # Design Rules
//!
//! - No filesystem or transport implementation details in signatures
//! - Control methods toward the transfer engine are advisory
//! - Engine-to-coordinator reporting is message-passing, not callbacks

pub mod coordinator;
pub mod download_storage;
pub mod downloader;
pub mod event_emitter;
pub mod source_resolver;

use thiserror::Error;

pub use coordinator::{CoordinatorConfig, DownloadCoordinatorPort, DownloadRequest};
pub use download_storage::DownloadStoragePort;
pub use downloader::{DownloaderPort, TransferJob, TransferOutcome, TransferSignal};
pub use event_emitter::{DownloadEventEmitterPort, NoopDownloadEmitter};
pub use source_resolver::SourceResolverPort;

/// Errors surfaced by storage adapters.
///
/// Persistence is best-effort from the coordinator's perspective: these
/// errors are logged and never propagated into partition state.
#[derive(Debug, Error)]
pub enum StorageError {
    /// I/O error reading or writing a partition file.
    #[error("I/O error ({kind}): {message}")]
    Io {
        /// The kind of I/O error (e.g. "NotFound", "PermissionDenied").
        kind: String,
        /// Detailed error message.
        message: String,
    },

    /// Serialization or deserialization failed.
    #[error("Serialization error: {message}")]
    Serialization {
        /// Detailed error message.
        message: String,
    },

    /// A stored partition could not be decoded.
    #[error("Corrupt partition '{partition}': {message}")]
    Corrupt {
        /// Partition key (`queued`, `active`, `completed`, `failed`).
        partition: String,
        /// Detailed error message.
        message: String,
    },
}

impl StorageError {
    /// Capture a `std::io::Error` as kind and message strings.
    #[must_use]
    pub fn from_io(err: &std::io::Error) -> Self {
        Self::Io {
            kind: format!("{:?}", err.kind()),
            message: err.to_string(),
        }
    }

    /// Create a serialization error.
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Create a corrupt-partition error.
    pub fn corrupt(partition: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Corrupt {
            partition: partition.into(),
            message: message.into(),
        }
    }
}
