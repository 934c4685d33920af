//! Download error types.
//!
//! These errors are designed to be serializable and not depend on external
//! error types like `std::io::Error`. Expected conditions (duplicate,
//! not-found) are reported here but never surfaced as hard errors to
//! callers; the coordinator degrades them to logged no-ops.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for coordinator and store operations.
///
/// Serializable across FFI boundaries (event streams, CLI output) without
/// depending on non-serializable types.
#[derive(Clone, Debug, Error, Serialize, Deserialize, PartialEq, Eq)]
pub enum DownloadError {
    /// A record with this ID is already tracked in some partition.
    #[error("Duplicate download: {id}")]
    Duplicate {
        /// The ID that already exists.
        id: String,
    },

    /// No record with this ID exists in the expected partition.
    #[error("Download not found: {id}")]
    NotFound {
        /// The ID that wasn't found.
        id: String,
    },

    /// A pending item's stream source lapsed before admission.
    #[error("Stream source expired for {id}")]
    SourceExpired {
        /// The affected download ID.
        id: String,
    },

    /// Re-resolving a stream source failed.
    #[error("Source resolution failed: {message}")]
    ResolutionFailed {
        /// Detailed error message.
        message: String,
    },

    /// The transfer engine reported a failure.
    #[error("Transfer failed: {message}")]
    Transfer {
        /// Detailed error message.
        message: String,
    },

    /// The transfer was cancelled.
    #[error("Transfer cancelled")]
    Cancelled,

    /// General/uncategorized error.
    #[error("{message}")]
    Other {
        /// Error message.
        message: String,
    },
}

impl DownloadError {
    /// Create a duplicate error.
    pub fn duplicate(id: impl ToString) -> Self {
        Self::Duplicate { id: id.to_string() }
    }

    /// Create a not found error.
    pub fn not_found(id: impl ToString) -> Self {
        Self::NotFound { id: id.to_string() }
    }

    /// Create a source expired error.
    pub fn source_expired(id: impl ToString) -> Self {
        Self::SourceExpired { id: id.to_string() }
    }

    /// Create a resolution failed error.
    pub fn resolution_failed(message: impl Into<String>) -> Self {
        Self::ResolutionFailed {
            message: message.into(),
        }
    }

    /// Create a transfer error.
    pub fn transfer(message: impl Into<String>) -> Self {
        Self::Transfer {
            message: message.into(),
        }
    }

    /// Create a generic error.
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            message: message.into(),
        }
    }

    /// Check if this error is an expected control condition rather than a
    /// genuine failure (the coordinator treats these as no-ops).
    #[must_use]
    pub const fn is_expected(&self) -> bool {
        matches!(self, Self::Duplicate { .. } | Self::NotFound { .. })
    }

    /// Check if a retry could plausibly succeed.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Transfer { .. } | Self::ResolutionFailed { .. } | Self::SourceExpired { .. }
        )
    }
}

/// Convenience result type for download operations.
pub type DownloadResult<T> = Result<T, DownloadError>;
