//! Downloader capability port.
//!
//! The byte-transfer engine is an external collaborator; the coordinator
//! only ever talks to it through this interface. Progress and completion
//! do not come back as callbacks: the engine sends [`TransferSignal`]
//! messages into an mpsc channel that the coordinator's single-owner loop
//! consumes, so engine-side concurrency never races coordinator state.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::sync::mpsc;

use crate::download::{DownloadId, Quality, StreamSource};

/// Terminal result of one transfer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum TransferOutcome {
    /// Transfer finished; the artifact was written to `artifact_path`.
    Success {
        /// Path of the finished artifact.
        artifact_path: PathBuf,
    },
    /// Transfer failed.
    Failure {
        /// Engine-reported failure message.
        message: String,
    },
}

/// Message sent by the transfer engine toward the coordinator.
///
/// # Contract
///
/// - `Progress` may arrive zero or more times per transfer with
///   monotonically non-decreasing fractions in `[0, 1]`.
/// - `Finished` arrives exactly once per successful `start`, after which no
///   further signals are sent for that ID.
/// - Signals for an ID the coordinator no longer tracks (cancelled
///   concurrently) are tolerated and dropped silently.
#[derive(Clone, Debug, PartialEq)]
pub enum TransferSignal {
    /// Progress update for an in-flight transfer.
    Progress {
        /// Record ID the signal belongs to.
        id: DownloadId,
        /// Fractional completion in `[0.0, 1.0]`.
        fraction: f64,
    },
    /// Terminal report for a transfer.
    Finished {
        /// Record ID the signal belongs to.
        id: DownloadId,
        /// How the transfer ended.
        outcome: TransferOutcome,
    },
}

/// Everything the engine needs to run one transfer.
#[derive(Clone, Debug)]
pub struct TransferJob {
    /// Record ID, echoed back in every signal.
    pub id: DownloadId,
    /// Resolved stream source to fetch.
    pub source: StreamSource,
    /// Selected quality/format tag.
    pub quality: Quality,
    /// Channel for progress and completion signals.
    pub signals: mpsc::Sender<TransferSignal>,
}

/// Port for the external byte-transfer engine.
///
/// All control methods are advisory: the coordinator updates its own state
/// optimistically and never blocks waiting for the engine to comply. A
/// transfer that ignores `cancel` will have its late signals dropped as
/// no-ops on the coordinator side.
#[async_trait]
pub trait DownloaderPort: Send + Sync {
    /// Begin a transfer. `Finished` must eventually be sent exactly once.
    async fn start(&self, job: TransferJob);

    /// Suspend an in-flight transfer.
    async fn pause(&self, id: &DownloadId);

    /// Resume a previously paused transfer.
    async fn resume(&self, id: &DownloadId);

    /// Abort a transfer. The engine may take arbitrary time to stop; it
    /// must not send further signals once it has.
    async fn cancel(&self, id: &DownloadId);
}
