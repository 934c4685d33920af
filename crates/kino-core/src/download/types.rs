//! Core domain types for downloads.
//!
//! Pure data types with no I/O dependencies.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use uuid::Uuid;

/// Opaque identifier for a download record.
///
/// Assigned once at record creation and stable across process restarts.
/// A record keeps its ID as it moves between partitions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DownloadId(Uuid);

impl DownloadId {
    /// Generate a fresh download ID.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID (used by persistence and tests).
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Access the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for DownloadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for DownloadId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Value-type reference to a catalog item.
///
/// The content catalog owns this metadata; the coordinator copies it into
/// the record for display purposes and never mutates it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentRef {
    /// Catalog identifier of the content item.
    pub content_id: String,
    /// Human-readable title.
    pub title: String,
    /// Poster/thumbnail URL if the catalog provided one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub poster_url: Option<String>,
}

impl ContentRef {
    /// Create a content reference without a poster.
    pub fn new(content_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            content_id: content_id.into(),
            title: title.into(),
            poster_url: None,
        }
    }

    /// Attach a poster URL.
    #[must_use]
    pub fn with_poster(mut self, url: impl Into<String>) -> Self {
        self.poster_url = Some(url.into());
        self
    }
}

/// Selected resolution tag for a download.
///
/// Immutable once the download has started.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Quality {
    P360,
    P480,
    #[default]
    P720,
    P1080,
    P2160,
}

impl Quality {
    /// Get the canonical string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::P360 => "360p",
            Self::P480 => "480p",
            Self::P720 => "720p",
            Self::P1080 => "1080p",
            Self::P2160 => "2160p",
        }
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Quality {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "360p" | "360" => Ok(Self::P360),
            "480p" | "480" => Ok(Self::P480),
            "720p" | "720" => Ok(Self::P720),
            "1080p" | "1080" => Ok(Self::P1080),
            "2160p" | "2160" | "4k" => Ok(Self::P2160),
            _ => Err(()),
        }
    }
}

/// A resolved stream source for a transfer.
///
/// Scraped stream URLs are typically temporary. A pending item's source may
/// lapse before the item is admitted, in which case it must be re-resolved.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamSource {
    /// Direct URL of the stream.
    pub url: String,
    /// Expiry of the URL if the scraper reported one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl StreamSource {
    /// Create a source with no known expiry.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            expires_at: None,
        }
    }

    /// Attach an expiry timestamp.
    #[must_use]
    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Check whether the source has lapsed at the given instant.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Why a download is paused.
///
/// User pauses are never auto-resumed; policy and restart pauses are
/// candidates for automatic resumption on `resume_pending`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PauseReason {
    /// The user explicitly paused this download.
    User,
    /// Paused because cellular transfer is currently disallowed.
    CellularPolicy,
    /// Found in `Downloading` state at load time with no live transfer
    /// backing it (process restarted mid-transfer).
    Restart,
}

impl PauseReason {
    /// String form for logging.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::CellularPolicy => "cellular_policy",
            Self::Restart => "restart",
        }
    }
}

/// Lifecycle state of a download record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DownloadState {
    /// Waiting in the pending FIFO for a free slot.
    Pending,
    /// Transfer in flight (occupies a concurrency slot).
    Downloading,
    /// Transfer suspended (still occupies its concurrency slot).
    Paused {
        /// Why the download was paused.
        reason: PauseReason,
    },
    /// Transfer finished, artifact on disk.
    Completed,
    /// Transfer failed terminally (retry re-enqueues).
    Failed,
}

impl DownloadState {
    /// String form for logging and storage.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Downloading => "downloading",
            Self::Paused { .. } => "paused",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Check if this state is paused, regardless of reason.
    #[must_use]
    pub const fn is_paused(&self) -> bool {
        matches!(self, Self::Paused { .. })
    }

    /// Check if this state is terminal for the record instance.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for DownloadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The central download entity.
///
/// A record belongs to exactly one partition at a time and is mutated only
/// through the coordinator's operations.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DownloadRecord {
    /// Stable unique identifier.
    pub id: DownloadId,
    /// Referenced catalog item.
    pub content: ContentRef,
    /// Selected resolution, immutable once the download starts.
    pub quality: Quality,
    /// Resolved stream source, if one is currently known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<StreamSource>,
    /// Current lifecycle state.
    pub state: DownloadState,
    /// Fractional completion in `[0.0, 1.0]`, meaningful while downloading.
    pub progress: f64,
    /// Path of the finished artifact, set only when `Completed`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_artifact_path: Option<PathBuf>,
    /// Failure message, set only when `Failed`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// When the record was created.
    pub created_at: DateTime<Utc>,
    /// Refreshed on every mutation.
    pub updated_at: DateTime<Utc>,
    /// When the transfer completed successfully.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl DownloadRecord {
    /// Create a new record in `Pending` state with a fresh ID.
    #[must_use]
    pub fn new(content: ContentRef, quality: Quality, source: Option<StreamSource>) -> Self {
        Self::with_id(DownloadId::generate(), content, quality, source)
    }

    /// Create a new record with a caller-supplied ID.
    #[must_use]
    pub fn with_id(
        id: DownloadId,
        content: ContentRef,
        quality: Quality,
        source: Option<StreamSource>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            content,
            quality,
            source,
            state: DownloadState::Pending,
            progress: 0.0,
            local_artifact_path: None,
            error: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    /// Refresh `updated_at`.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Check whether this record needs its source re-resolved before a
    /// transfer can start.
    #[must_use]
    pub fn needs_source_resolution(&self, now: DateTime<Utc>) -> bool {
        match &self.source {
            None => true,
            Some(source) => source.is_expired(now),
        }
    }
}

/// The four persisted partitions, each an ordered sequence of records.
///
/// Every field defaults independently so a missing or newly added partition
/// deserializes as empty (forward-compatible layout).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PartitionState {
    /// Pending FIFO, head first.
    pub queued: Vec<DownloadRecord>,
    /// Active slots (downloading and paused), admission order.
    pub active: Vec<DownloadRecord>,
    /// Finished downloads with artifacts on disk.
    pub completed: Vec<DownloadRecord>,
    /// Terminally failed downloads awaiting retry or deletion.
    pub failed: Vec<DownloadRecord>,
}

impl PartitionState {
    /// Total number of records across all partitions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.queued.len() + self.active.len() + self.completed.len() + self.failed.len()
    }

    /// Check if every partition is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn download_id_round_trips_through_display() {
        let id = DownloadId::generate();
        let parsed: DownloadId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn quality_parse_and_display() {
        assert_eq!("1080p".parse::<Quality>().unwrap(), Quality::P1080);
        assert_eq!("4k".parse::<Quality>().unwrap(), Quality::P2160);
        assert_eq!(Quality::P720.to_string(), "720p");
        assert!("potato".parse::<Quality>().is_err());
    }

    #[test]
    fn stream_source_expiry() {
        let now = Utc::now();
        let fresh = StreamSource::new("https://cdn.example/a.m3u8");
        assert!(!fresh.is_expired(now));

        let lapsed = StreamSource::new("https://cdn.example/b.m3u8")
            .with_expiry(now - chrono::Duration::seconds(1));
        assert!(lapsed.is_expired(now));
    }

    #[test]
    fn new_record_is_pending_with_zero_progress() {
        let record = DownloadRecord::new(
            ContentRef::new("tt0133093", "The Matrix"),
            Quality::P1080,
            Some(StreamSource::new("https://cdn.example/matrix.m3u8")),
        );
        assert_eq!(record.state, DownloadState::Pending);
        assert_eq!(record.progress, 0.0);
        assert!(record.local_artifact_path.is_none());
        assert!(record.completed_at.is_none());
    }

    #[test]
    fn needs_resolution_when_source_missing_or_expired() {
        let now = Utc::now();
        let mut record =
            DownloadRecord::new(ContentRef::new("c1", "Title"), Quality::P720, None);
        assert!(record.needs_source_resolution(now));

        record.source = Some(StreamSource::new("https://cdn.example/x"));
        assert!(!record.needs_source_resolution(now));

        record.source =
            Some(StreamSource::new("https://cdn.example/x")
                .with_expiry(now - chrono::Duration::minutes(5)));
        assert!(record.needs_source_resolution(now));
    }

    #[test]
    fn state_serialization_is_tagged() {
        let paused = DownloadState::Paused {
            reason: PauseReason::CellularPolicy,
        };
        let json = serde_json::to_string(&paused).unwrap();
        assert!(json.contains("paused"));
        assert!(json.contains("cellular_policy"));

        let parsed: DownloadState = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, paused);
    }

    #[test]
    fn partition_state_defaults_missing_fields() {
        let state: PartitionState = serde_json::from_str(r#"{"queued": []}"#).unwrap();
        assert!(state.is_empty());
    }
}
