//! Download coordinator implementation.
//!
//! This module provides the concrete implementation of
//! `DownloadCoordinatorPort`: a bounded-concurrency scheduler over the four
//! partitions with persistence and event emission at the edges.
//!
//! # Architecture
//!
//! - **Coordinator**: owns the partition store behind one `RwLock` and runs
//!   every mutation through it
//! - **Signal pump**: a single long-lived task drains the engine's
//!   `TransferSignal` channel, so engine concurrency never races
//!   coordinator state
//! - **Adapters**: the transfer engine, state store, source resolver and
//!   event emitter are all injected ports
//!
//! # Concurrency Model
//!
//! - Single long-lived pump (never resets `pump_started`)
//! - Minimal lock scopes; never await the resolver or engine while holding
//!   the store lock
//! - Structural mutations persist immediately; progress persists through
//!   the throttle

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, RwLock, mpsc};

use kino_core::download::{
    DownloadEvent, DownloadId, DownloadRecord, PauseReason, QueueSnapshot,
};
use kino_core::ports::{
    CoordinatorConfig, DownloadCoordinatorPort, DownloadEventEmitterPort, DownloadRequest,
    DownloadStoragePort, DownloaderPort, SourceResolverPort, TransferJob, TransferOutcome,
    TransferSignal,
};

use crate::persist::PersistThrottle;
use crate::store::{Admission, PartitionStore};

/// Capacity of the engine-to-coordinator signal channel.
const SIGNAL_BUFFER: usize = 256;

/// Dependencies for creating a download coordinator.
///
/// This struct bundles all the ports and configuration needed to
/// construct a `DownloadCoordinator`.
pub struct CoordinatorDeps<D, S, R, E>
where
    D: DownloaderPort + 'static,
    S: DownloadStoragePort + 'static,
    R: SourceResolverPort + 'static,
    E: DownloadEventEmitterPort + 'static,
{
    /// Port for the byte-transfer engine.
    pub downloader: Arc<D>,
    /// Port for persisting partition state.
    pub storage: Arc<S>,
    /// Port for re-resolving stale stream sources.
    pub resolver: Arc<R>,
    /// Port for emitting download events.
    pub event_emitter: Arc<E>,
    /// Configuration for the coordinator.
    pub config: CoordinatorConfig,
}

/// Build a download coordinator from its dependencies.
///
/// Spawns the signal pump, so this must be called from within a Tokio
/// runtime. Returns an `Arc` that can be stored as
/// `Arc<dyn DownloadCoordinatorPort>` in adapters.
pub fn build_coordinator<D, S, R, E>(deps: CoordinatorDeps<D, S, R, E>) -> Arc<DownloadCoordinator>
where
    D: DownloaderPort + 'static,
    S: DownloadStoragePort + 'static,
    R: SourceResolverPort + 'static,
    E: DownloadEventEmitterPort + 'static,
{
    let coordinator = Arc::new(DownloadCoordinator::new(
        deps.downloader,
        deps.storage,
        deps.resolver,
        deps.event_emitter,
        deps.config,
    ));
    coordinator.ensure_pump();
    coordinator
}

/// Concrete implementation of the download coordinator.
///
/// This struct is public but adapters should typically use
/// `Arc<dyn DownloadCoordinatorPort>` instead of depending on this type
/// directly.
pub struct DownloadCoordinator {
    /// Partition state (protected by `RwLock` for async access).
    store: RwLock<PartitionStore>,
    /// The byte-transfer engine.
    downloader: Arc<dyn DownloaderPort>,
    /// State store for crash recovery.
    storage: Arc<dyn DownloadStoragePort>,
    /// Resolver for stale or missing stream sources.
    resolver: Arc<dyn SourceResolverPort>,
    /// Event emitter for download events.
    event_emitter: Arc<dyn DownloadEventEmitterPort>,
    /// Coalescing window for progress-driven saves.
    persist_gate: Mutex<PersistThrottle>,
    /// Sender handed to every transfer job.
    signal_tx: mpsc::Sender<TransferSignal>,
    /// Receiver taken by the pump on first start.
    signal_rx: Mutex<Option<mpsc::Receiver<TransferSignal>>>,
    /// Whether the pump has been started (never reset).
    pump_started: AtomicBool,
}

impl DownloadCoordinator {
    /// Create a new coordinator.
    fn new<D, S, R, E>(
        downloader: Arc<D>,
        storage: Arc<S>,
        resolver: Arc<R>,
        event_emitter: Arc<E>,
        config: CoordinatorConfig,
    ) -> Self
    where
        D: DownloaderPort + 'static,
        S: DownloadStoragePort + 'static,
        R: SourceResolverPort + 'static,
        E: DownloadEventEmitterPort + 'static,
    {
        let (signal_tx, signal_rx) = mpsc::channel(SIGNAL_BUFFER);

        Self {
            store: RwLock::new(PartitionStore::new(config.max_concurrent)),
            downloader,
            storage,
            resolver,
            event_emitter,
            persist_gate: Mutex::new(PersistThrottle::new(config.persist_min_interval)),
            signal_tx,
            signal_rx: Mutex::new(Some(signal_rx)),
            pump_started: AtomicBool::new(false),
        }
    }

    /// Ensure the signal pump is started.
    ///
    /// This method is idempotent: calling it multiple times has no effect
    /// after the first call. The pump runs for the lifetime of the
    /// coordinator.
    pub fn ensure_pump(self: &Arc<Self>) {
        if self
            .pump_started
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            let coordinator = Arc::clone(self);
            tokio::spawn(async move {
                coordinator.pump_loop().await;
            });
        }
    }

    /// Load persisted partition state and adopt it.
    ///
    /// Called once at startup, before any enqueue. Interrupted downloads
    /// come back parked (`Paused { Restart }`) and stay parked until
    /// `resume_pending`; completed records whose artifact disappeared are
    /// evicted. Load failure degrades to an empty queue.
    pub async fn restore_from_storage(&self) {
        let state = match self.storage.load().await {
            Ok(state) => state,
            Err(e) => {
                tracing::warn!(error = %e, "Could not load download state; starting empty");
                return;
            }
        };

        let report = {
            let mut store = self.store.write().await;
            store.restore(state, &|path| path.exists())
        };

        if !report.evicted.is_empty() {
            tracing::info!(
                count = report.evicted.len(),
                "Evicted completed downloads with missing artifacts"
            );
        }
        if !report.demoted.is_empty() {
            tracing::info!(
                count = report.demoted.len(),
                "Parked interrupted downloads pending restart"
            );
        }
        if !report.requeued.is_empty() {
            tracing::info!(
                count = report.requeued.len(),
                "Re-queued active downloads beyond the concurrency limit"
            );
        }
        if !report.dropped_duplicates.is_empty() {
            tracing::warn!(
                count = report.dropped_duplicates.len(),
                "Dropped duplicate records while restoring state"
            );
        }

        // Write the cleaned state back immediately
        self.persist_now().await;
        self.emit_snapshot().await;
    }

    /// The signal pump loop.
    ///
    /// Runs for the lifetime of the coordinator; the channel never closes
    /// because the coordinator itself holds a sender.
    async fn pump_loop(&self) {
        let Some(mut rx) = self.signal_rx.lock().await.take() else {
            return;
        };

        while let Some(signal) = rx.recv().await {
            self.handle_signal(signal).await;
        }
    }

    /// Apply one engine signal.
    async fn handle_signal(&self, signal: TransferSignal) {
        match signal {
            TransferSignal::Progress { id, fraction } => self.report_progress(id, fraction).await,
            TransferSignal::Finished { id, outcome } => self.finish_transfer(id, outcome).await,
        }
    }

    /// Apply a progress signal.
    ///
    /// Signals for IDs no longer in an active slot (cancelled while the
    /// engine was still sending) are dropped.
    async fn report_progress(&self, id: DownloadId, fraction: f64) {
        let changed = {
            let mut store = self.store.write().await;
            store.set_progress(&id, fraction)
        };

        match changed {
            Ok(true) => {
                self.event_emitter
                    .emit(DownloadEvent::progress(id, fraction.clamp(0.0, 1.0)));
                self.persist_throttled().await;
            }
            Ok(false) => {}
            Err(_) => {
                tracing::debug!(id = %id, "Dropping progress signal for untracked download");
            }
        }
    }

    /// Apply a terminal signal, then refill freed slots.
    async fn finish_transfer(&self, id: DownloadId, outcome: TransferOutcome) {
        match outcome {
            TransferOutcome::Success { artifact_path } => {
                let completed = {
                    let mut store = self.store.write().await;
                    store.complete(&id, &artifact_path)
                };
                if completed.is_err() {
                    tracing::debug!(id = %id, "Dropping completion for untracked download");
                    return;
                }
                tracing::info!(id = %id, path = %artifact_path.display(), "Download completed");
                self.event_emitter.emit(DownloadEvent::completed(
                    id,
                    artifact_path.display().to_string(),
                ));
            }
            TransferOutcome::Failure { message } => {
                let failed = {
                    let mut store = self.store.write().await;
                    store.fail(&id, &message)
                };
                if failed.is_err() {
                    tracing::debug!(id = %id, "Dropping failure for untracked download");
                    return;
                }
                tracing::warn!(id = %id, error = %message, "Download failed");
                self.event_emitter.emit(DownloadEvent::failed(id, message));
            }
        }

        self.fill_free_slots().await;
        self.persist_now().await;
        self.emit_snapshot().await;
    }

    /// Promote pending items while active slots are free.
    ///
    /// Returns the number of records admitted. Each record is moved into
    /// its slot under the lock before any await, so it is never observable
    /// outside a partition.
    async fn fill_free_slots(&self) -> usize {
        let mut started = 0;
        loop {
            let record = {
                let mut store = self.store.write().await;
                let Some(record) = store.next_admittable() else {
                    break;
                };
                store.admit(record.clone());
                record
            };
            self.start_transfer(record).await;
            started += 1;
        }
        started
    }

    /// Hand an admitted record to the transfer engine.
    ///
    /// Re-resolves the stream source first when it is missing or expired;
    /// resolution failure fast-fails the record instead of starting a
    /// doomed transfer. The record must already occupy an active slot.
    async fn start_transfer(&self, record: DownloadRecord) {
        let id = record.id;

        let source = if record.needs_source_resolution(Utc::now()) {
            match self.resolver.resolve(&record.content, record.quality).await {
                Ok(source) => {
                    let mut store = self.store.write().await;
                    if store.set_source(&id, source.clone()).is_err() {
                        // Cancelled while the resolver was running
                        tracing::debug!(id = %id, "Download vanished during source resolution");
                        return;
                    }
                    source
                }
                Err(e) => {
                    tracing::warn!(id = %id, error = %e, "Source resolution failed");
                    {
                        let mut store = self.store.write().await;
                        if let Some(rec) = store.remove_active(&id) {
                            store.fail_record(rec, e.to_string());
                        }
                    }
                    self.event_emitter
                        .emit(DownloadEvent::failed(id, e.to_string()));
                    return;
                }
            }
        } else {
            // needs_source_resolution is true whenever the source is absent
            let Some(source) = record.source else { return };
            source
        };

        self.downloader
            .start(TransferJob {
                id,
                source,
                quality: record.quality,
                signals: self.signal_tx.clone(),
            })
            .await;

        tracing::info!(id = %id, "Transfer started");
        self.event_emitter.emit(DownloadEvent::started(id));
    }

    /// Persist the partitions now, bypassing the throttle.
    ///
    /// Persistence is best-effort: failure is logged and the in-memory
    /// state stands.
    async fn persist_now(&self) {
        let state = {
            let store = self.store.read().await;
            store.to_partition_state()
        };

        if let Err(e) = self.storage.save(&state).await {
            tracing::warn!(error = %e, "Failed to persist download state");
        }

        // Restart the coalescing window so the next progress tick doesn't
        // write again immediately.
        self.persist_gate.lock().await.reset();
    }

    /// Persist the partitions if the coalescing window has elapsed.
    async fn persist_throttled(&self) {
        let due = self.persist_gate.lock().await.should_write();
        if !due {
            return;
        }

        let state = {
            let store = self.store.read().await;
            store.to_partition_state()
        };

        if let Err(e) = self.storage.save(&state).await {
            tracing::warn!(error = %e, "Failed to persist download state");
        }
    }

    /// Emit a queue snapshot event.
    async fn emit_snapshot(&self) {
        let snapshot = {
            let store = self.store.read().await;
            store.snapshot()
        };

        self.event_emitter.emit(DownloadEvent::QueueSnapshot {
            items: snapshot.items,
            max_concurrent: snapshot.max_concurrent,
        });
    }
}

#[async_trait]
impl DownloadCoordinatorPort for DownloadCoordinator {
    async fn enqueue(&self, request: DownloadRequest) -> DownloadId {
        let id = request.id.unwrap_or_else(DownloadId::generate);
        let record = DownloadRecord::with_id(id, request.content, request.quality, request.source);

        // Minimal lock scope: admit or queue
        let admission = {
            let mut store = self.store.write().await;
            store.insert(record.clone())
        };

        match admission {
            Ok(Admission::Started) => {
                tracing::info!(id = %id, "Download admitted to a free slot");
                self.start_transfer(record).await;
            }
            Ok(Admission::Queued { position }) => {
                tracing::info!(id = %id, position, "Download queued");
            }
            Err(e) => {
                tracing::warn!(id = %id, error = %e, "Duplicate enqueue ignored");
                return id;
            }
        }

        self.persist_now().await;
        self.emit_snapshot().await;
        id
    }

    async fn pause(&self, id: &DownloadId) {
        let changed = {
            let mut store = self.store.write().await;
            store.pause(id, PauseReason::User)
        };

        match changed {
            Ok(true) => {
                self.downloader.pause(id).await;
                tracing::info!(id = %id, "Download paused");
                self.event_emitter.emit(DownloadEvent::DownloadPaused {
                    id: id.to_string(),
                    reason: PauseReason::User,
                });
                self.persist_now().await;
                self.emit_snapshot().await;
            }
            Ok(false) => tracing::debug!(id = %id, "Pause ignored; already paused"),
            Err(e) => tracing::debug!(id = %id, error = %e, "Pause ignored"),
        }
    }

    async fn resume(&self, id: &DownloadId) {
        let prior = {
            let mut store = self.store.write().await;
            store.resume(id)
        };

        match prior {
            Ok(Some(reason)) => {
                tracing::info!(id = %id, reason = reason.as_str(), "Download resumed");
                self.event_emitter.emit(DownloadEvent::DownloadResumed {
                    id: id.to_string(),
                });

                if reason == PauseReason::Restart {
                    // No live transfer behind a restart pause; start fresh
                    let record = {
                        let store = self.store.read().await;
                        store.get_active(id).cloned()
                    };
                    if let Some(record) = record {
                        self.start_transfer(record).await;
                    }
                } else {
                    self.downloader.resume(id).await;
                }

                self.persist_now().await;
                self.emit_snapshot().await;
            }
            Ok(None) => tracing::debug!(id = %id, "Resume ignored; already downloading"),
            Err(e) => tracing::debug!(id = %id, error = %e, "Resume ignored"),
        }
    }

    async fn cancel(&self, id: &DownloadId) {
        let removed_active = {
            let mut store = self.store.write().await;
            store.remove_active(id)
        };

        if removed_active.is_some() {
            // Advisory: the engine may stop late; its stragglers are dropped
            self.downloader.cancel(id).await;
            tracing::info!(id = %id, "Cancelled active download");
            self.event_emitter.emit(DownloadEvent::DownloadCancelled {
                id: id.to_string(),
            });
            self.fill_free_slots().await;
        } else {
            let removed_pending = {
                let mut store = self.store.write().await;
                store.remove_pending(id)
            };
            if removed_pending.is_none() {
                tracing::debug!(id = %id, "Cancel ignored; download not tracked");
                return;
            }
            tracing::info!(id = %id, "Removed pending download");
            self.event_emitter.emit(DownloadEvent::DownloadCancelled {
                id: id.to_string(),
            });
        }

        self.persist_now().await;
        self.emit_snapshot().await;
    }

    async fn delete(&self, id: &DownloadId) {
        // Delete targets finished records; pending and active go through cancel
        let removed = {
            let mut store = self.store.write().await;
            store.delete_completed(id).or_else(|| store.delete_failed(id))
        };

        if removed.is_none() {
            tracing::debug!(id = %id, "Delete ignored; no finished record");
            return;
        }

        tracing::info!(id = %id, "Deleted finished download record");
        self.persist_now().await;
        self.emit_snapshot().await;
    }

    async fn retry(&self, id: &DownloadId) {
        let requeued = {
            let mut store = self.store.write().await;
            store.retry_failed(id)
        };

        match requeued {
            Ok(position) => {
                tracing::info!(id = %id, position, "Retrying failed download");
                self.fill_free_slots().await;
                self.persist_now().await;
                self.emit_snapshot().await;
            }
            Err(e) => tracing::debug!(id = %id, error = %e, "Retry ignored"),
        }
    }

    async fn pause_all_for_cellular_restriction(&self) {
        let paused = {
            let mut store = self.store.write().await;
            store.pause_all_downloading(PauseReason::CellularPolicy)
        };

        if paused.is_empty() {
            tracing::debug!("Cellular restriction pause; nothing downloading");
            return;
        }

        for id in &paused {
            self.downloader.pause(id).await;
            self.event_emitter.emit(DownloadEvent::DownloadPaused {
                id: id.to_string(),
                reason: PauseReason::CellularPolicy,
            });
        }

        tracing::info!(count = paused.len(), "Paused all downloads for cellular restriction");
        self.persist_now().await;
        self.emit_snapshot().await;
    }

    async fn resume_pending(&self) {
        // Resume policy/restart pauses; user pauses stay put
        let resumable = {
            let store = self.store.read().await;
            store.auto_resumable()
        };

        let mut restarts = Vec::new();
        for id in &resumable {
            let prior = {
                let mut store = self.store.write().await;
                store.resume(id)
            };
            let Ok(Some(reason)) = prior else { continue };

            self.event_emitter.emit(DownloadEvent::DownloadResumed {
                id: id.to_string(),
            });

            if reason == PauseReason::Restart {
                let record = {
                    let store = self.store.read().await;
                    store.get_active(id).cloned()
                };
                if let Some(record) = record {
                    restarts.push(record);
                }
            } else {
                self.downloader.resume(id).await;
            }
        }

        for record in restarts {
            self.start_transfer(record).await;
        }

        let admitted = self.fill_free_slots().await;
        if resumable.is_empty() && admitted == 0 {
            tracing::debug!("Resume pending; nothing eligible");
            return;
        }

        tracing::info!(
            resumed = resumable.len(),
            admitted,
            "Resumed pending downloads"
        );
        self.persist_now().await;
        self.emit_snapshot().await;
    }

    async fn snapshot(&self) -> QueueSnapshot {
        let store = self.store.read().await;
        store.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    use kino_core::download::{
        ContentRef, DownloadError, DownloadState, PartitionState, Quality, StreamSource,
    };
    use kino_core::ports::StorageError;

    // --- fakes -----------------------------------------------------------

    #[derive(Default)]
    struct RecordingDownloader {
        jobs: StdMutex<Vec<TransferJob>>,
        paused: StdMutex<Vec<DownloadId>>,
        resumed: StdMutex<Vec<DownloadId>>,
        cancelled: StdMutex<Vec<DownloadId>>,
    }

    impl RecordingDownloader {
        fn started_ids(&self) -> Vec<DownloadId> {
            self.jobs.lock().unwrap().iter().map(|j| j.id).collect()
        }
    }

    #[async_trait]
    impl DownloaderPort for RecordingDownloader {
        async fn start(&self, job: TransferJob) {
            self.jobs.lock().unwrap().push(job);
        }

        async fn pause(&self, id: &DownloadId) {
            self.paused.lock().unwrap().push(*id);
        }

        async fn resume(&self, id: &DownloadId) {
            self.resumed.lock().unwrap().push(*id);
        }

        async fn cancel(&self, id: &DownloadId) {
            self.cancelled.lock().unwrap().push(*id);
        }
    }

    #[derive(Default)]
    struct MemoryStorage {
        saved: StdMutex<Option<PartitionState>>,
        save_count: StdMutex<usize>,
    }

    impl MemoryStorage {
        fn with_state(state: PartitionState) -> Self {
            Self {
                saved: StdMutex::new(Some(state)),
                save_count: StdMutex::new(0),
            }
        }

        fn saves(&self) -> usize {
            *self.save_count.lock().unwrap()
        }
    }

    #[async_trait]
    impl DownloadStoragePort for MemoryStorage {
        async fn save(&self, state: &PartitionState) -> Result<(), StorageError> {
            *self.saved.lock().unwrap() = Some(state.clone());
            *self.save_count.lock().unwrap() += 1;
            Ok(())
        }

        async fn load(&self) -> Result<PartitionState, StorageError> {
            Ok(self.saved.lock().unwrap().clone().unwrap_or_default())
        }
    }

    struct FixedResolver {
        outcome: Result<StreamSource, DownloadError>,
        calls: StdMutex<usize>,
    }

    impl FixedResolver {
        fn ok() -> Self {
            Self {
                outcome: Ok(StreamSource::new("https://cdn.example/resolved")),
                calls: StdMutex::new(0),
            }
        }

        fn failing(message: &str) -> Self {
            Self {
                outcome: Err(DownloadError::resolution_failed(message)),
                calls: StdMutex::new(0),
            }
        }

        fn calls(&self) -> usize {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl SourceResolverPort for FixedResolver {
        async fn resolve(
            &self,
            _content: &ContentRef,
            _quality: Quality,
        ) -> Result<StreamSource, DownloadError> {
            *self.calls.lock().unwrap() += 1;
            self.outcome.clone()
        }
    }

    #[derive(Clone, Default)]
    struct CapturingEmitter {
        events: Arc<StdMutex<Vec<DownloadEvent>>>,
    }

    impl DownloadEventEmitterPort for CapturingEmitter {
        fn emit(&self, event: DownloadEvent) {
            self.events.lock().unwrap().push(event);
        }

        fn clone_box(&self) -> Box<dyn DownloadEventEmitterPort> {
            Box::new(self.clone())
        }
    }

    // --- harness ---------------------------------------------------------

    struct Harness {
        coordinator: Arc<DownloadCoordinator>,
        downloader: Arc<RecordingDownloader>,
        storage: Arc<MemoryStorage>,
        resolver: Arc<FixedResolver>,
        events: Arc<StdMutex<Vec<DownloadEvent>>>,
    }

    impl Harness {
        fn new(config: CoordinatorConfig) -> Self {
            Self::with_parts(config, MemoryStorage::default(), FixedResolver::ok())
        }

        fn with_parts(
            config: CoordinatorConfig,
            storage: MemoryStorage,
            resolver: FixedResolver,
        ) -> Self {
            let downloader = Arc::new(RecordingDownloader::default());
            let storage = Arc::new(storage);
            let resolver = Arc::new(resolver);
            let emitter = Arc::new(CapturingEmitter::default());
            let events = Arc::clone(&emitter.events);

            let coordinator = build_coordinator(CoordinatorDeps {
                downloader: Arc::clone(&downloader),
                storage: Arc::clone(&storage),
                resolver: Arc::clone(&resolver),
                event_emitter: emitter,
                config,
            });

            Self {
                coordinator,
                downloader,
                storage,
                resolver,
                events,
            }
        }

        async fn enqueue_with_source(&self, label: &str) -> DownloadId {
            let request = DownloadRequest::new(
                ContentRef::new(label, label.to_uppercase()),
                Quality::P720,
            )
            .with_source(StreamSource::new(format!("https://cdn.example/{label}")));
            self.coordinator.enqueue(request).await
        }

        async fn succeed(&self, id: DownloadId, path: &str) {
            self.coordinator
                .handle_signal(TransferSignal::Finished {
                    id,
                    outcome: TransferOutcome::Success {
                        artifact_path: PathBuf::from(path),
                    },
                })
                .await;
        }

        async fn fail(&self, id: DownloadId, message: &str) {
            self.coordinator
                .handle_signal(TransferSignal::Finished {
                    id,
                    outcome: TransferOutcome::Failure {
                        message: message.to_string(),
                    },
                })
                .await;
        }

        async fn progress(&self, id: DownloadId, fraction: f64) {
            self.coordinator
                .handle_signal(TransferSignal::Progress { id, fraction })
                .await;
        }
    }

    fn config(k: u32) -> CoordinatorConfig {
        // Zero window so progress-driven persistence happens in tests too
        CoordinatorConfig::default()
            .with_max_concurrent(k)
            .with_persist_min_interval(Duration::ZERO)
    }

    // --- tests -----------------------------------------------------------

    #[tokio::test]
    async fn enqueue_starts_transfer_when_slot_free() {
        let h = Harness::new(config(1));
        let id = h.enqueue_with_source("a").await;

        assert_eq!(h.downloader.started_ids(), vec![id]);
        let snapshot = h.coordinator.snapshot().await;
        assert_eq!(snapshot.items[0].state, DownloadState::Downloading);
    }

    #[tokio::test]
    async fn enqueue_queues_beyond_limit() {
        let h = Harness::new(config(1));
        let a = h.enqueue_with_source("a").await;
        let _b = h.enqueue_with_source("b").await;

        assert_eq!(h.downloader.started_ids(), vec![a]);
        let snapshot = h.coordinator.snapshot().await;
        assert_eq!(snapshot.active_count, 1);
        assert_eq!(snapshot.pending_count, 1);
    }

    #[tokio::test]
    async fn completion_records_artifact_and_promotes_next() {
        let h = Harness::new(config(1));
        let a = h.enqueue_with_source("a").await;
        let b = h.enqueue_with_source("b").await;

        h.succeed(a, "/data/a.mp4").await;

        let snapshot = h.coordinator.snapshot().await;
        assert_eq!(snapshot.completed.len(), 1);
        assert_eq!(snapshot.completed[0].progress, 1.0);
        assert_eq!(h.downloader.started_ids(), vec![a, b]);
    }

    #[tokio::test]
    async fn failure_moves_to_failed_and_promotes_next() {
        let h = Harness::new(config(1));
        let a = h.enqueue_with_source("a").await;
        let b = h.enqueue_with_source("b").await;

        h.fail(a, "connection reset").await;

        let snapshot = h.coordinator.snapshot().await;
        assert_eq!(snapshot.failed.len(), 1);
        assert_eq!(snapshot.failed[0].error.as_deref(), Some("connection reset"));
        assert_eq!(h.downloader.started_ids(), vec![a, b]);
    }

    #[tokio::test]
    async fn pause_advises_engine_and_keeps_slot() {
        let h = Harness::new(config(1));
        let a = h.enqueue_with_source("a").await;
        let _b = h.enqueue_with_source("b").await;

        h.coordinator.pause(&a).await;

        assert_eq!(*h.downloader.paused.lock().unwrap(), vec![a]);
        // the paused record still holds the slot; "b" is not promoted
        assert_eq!(h.downloader.started_ids(), vec![a]);
        let snapshot = h.coordinator.snapshot().await;
        assert!(snapshot.items[0].state.is_paused());
        assert_eq!(snapshot.pending_count, 1);
    }

    #[tokio::test]
    async fn resume_after_user_pause_advises_engine() {
        let h = Harness::new(config(1));
        let a = h.enqueue_with_source("a").await;

        h.coordinator.pause(&a).await;
        h.coordinator.resume(&a).await;

        assert_eq!(*h.downloader.resumed.lock().unwrap(), vec![a]);
        let snapshot = h.coordinator.snapshot().await;
        assert_eq!(snapshot.items[0].state, DownloadState::Downloading);
    }

    #[tokio::test]
    async fn repeated_pause_is_silent_noop() {
        let h = Harness::new(config(1));
        let a = h.enqueue_with_source("a").await;

        h.coordinator.pause(&a).await;
        h.coordinator.pause(&a).await;

        // the engine was only advised once
        assert_eq!(h.downloader.paused.lock().unwrap().len(), 1);
        let paused_events = h
            .events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| matches!(e, DownloadEvent::DownloadPaused { .. }))
            .count();
        assert_eq!(paused_events, 1);
    }

    #[tokio::test]
    async fn cancel_active_promotes_pending() {
        let h = Harness::new(config(2));
        let a = h.enqueue_with_source("a").await;
        let _b = h.enqueue_with_source("b").await;
        let c = h.enqueue_with_source("c").await;

        h.coordinator.cancel(&a).await;

        assert_eq!(*h.downloader.cancelled.lock().unwrap(), vec![a]);
        assert!(h.downloader.started_ids().contains(&c));
        let snapshot = h.coordinator.snapshot().await;
        assert_eq!(snapshot.active_count, 2);
        assert_eq!(snapshot.pending_count, 0);
        assert!(snapshot.get(&a.to_string()).is_none());
    }

    #[tokio::test]
    async fn cancel_pending_preserves_queue_order() {
        let h = Harness::new(config(1));
        let _a = h.enqueue_with_source("a").await;
        let b = h.enqueue_with_source("b").await;
        let c = h.enqueue_with_source("c").await;

        h.coordinator.cancel(&b).await;

        // pending item never reached the engine, so no advisory cancel
        assert!(h.downloader.cancelled.lock().unwrap().is_empty());
        let snapshot = h.coordinator.snapshot().await;
        assert_eq!(snapshot.pending_count, 1);
        assert_eq!(snapshot.items[1].id, c.to_string());
    }

    #[tokio::test]
    async fn cancel_unknown_id_is_noop() {
        let h = Harness::new(config(1));
        let _a = h.enqueue_with_source("a").await;
        let saves_before = h.storage.saves();

        h.coordinator.cancel(&DownloadId::generate()).await;

        assert_eq!(h.storage.saves(), saves_before);
        assert_eq!(h.coordinator.snapshot().await.items.len(), 1);
    }

    #[tokio::test]
    async fn late_signals_after_cancel_are_dropped() {
        let h = Harness::new(config(1));
        let a = h.enqueue_with_source("a").await;
        h.coordinator.cancel(&a).await;

        h.progress(a, 0.5).await;
        h.succeed(a, "/data/a.mp4").await;

        let snapshot = h.coordinator.snapshot().await;
        assert!(snapshot.is_idle());
        assert!(snapshot.completed.is_empty());
    }

    #[tokio::test]
    async fn cellular_pause_spares_user_pause_and_resume_pending_restores() {
        let h = Harness::new(config(2));
        let x = h.enqueue_with_source("x").await;
        let y = h.enqueue_with_source("y").await;

        h.coordinator.pause(&x).await;
        h.coordinator.pause_all_for_cellular_restriction().await;
        h.coordinator.resume_pending().await;

        let snapshot = h.coordinator.snapshot().await;
        let x_item = snapshot.get(&x.to_string()).unwrap();
        let y_item = snapshot.get(&y.to_string()).unwrap();
        assert!(x_item.state.is_paused());
        assert_eq!(y_item.state, DownloadState::Downloading);
        assert_eq!(*h.downloader.resumed.lock().unwrap(), vec![y]);
    }

    #[tokio::test]
    async fn pause_all_with_nothing_downloading_is_noop() {
        let h = Harness::new(config(2));
        let saves_before = h.storage.saves();

        h.coordinator.pause_all_for_cellular_restriction().await;

        assert_eq!(h.storage.saves(), saves_before);
    }

    #[tokio::test]
    async fn missing_source_is_resolved_before_start() {
        let h = Harness::new(config(1));
        let request = DownloadRequest::new(ContentRef::new("a", "A"), Quality::P1080);
        let id = h.coordinator.enqueue(request).await;

        assert_eq!(h.resolver.calls(), 1);
        let jobs = h.downloader.jobs.lock().unwrap();
        assert_eq!(jobs[0].id, id);
        assert_eq!(jobs[0].source.url, "https://cdn.example/resolved");
    }

    #[tokio::test]
    async fn expired_source_is_re_resolved_on_promotion() {
        let h = Harness::new(config(1));
        let _a = h.enqueue_with_source("a").await;

        let expired = StreamSource::new("https://cdn.example/b")
            .with_expiry(Utc::now() - chrono::Duration::hours(1));
        let request =
            DownloadRequest::new(ContentRef::new("b", "B"), Quality::P720).with_source(expired);
        let b = h.coordinator.enqueue(request).await;
        assert_eq!(h.resolver.calls(), 0);

        h.coordinator.cancel(&DownloadId::generate()).await; // noop, b stays queued
        h.succeed(h.downloader.started_ids()[0], "/data/a.mp4").await;

        assert_eq!(h.resolver.calls(), 1);
        let jobs = h.downloader.jobs.lock().unwrap();
        assert_eq!(jobs[1].id, b);
        assert_eq!(jobs[1].source.url, "https://cdn.example/resolved");
    }

    #[tokio::test]
    async fn resolution_failure_fast_fails_record() {
        let h = Harness::with_parts(
            config(1),
            MemoryStorage::default(),
            FixedResolver::failing("stream gone"),
        );
        let request = DownloadRequest::new(ContentRef::new("a", "A"), Quality::P720);
        let id = h.coordinator.enqueue(request).await;

        assert!(h.downloader.started_ids().is_empty());
        let snapshot = h.coordinator.snapshot().await;
        assert_eq!(snapshot.failed.len(), 1);
        assert_eq!(snapshot.failed[0].id, id.to_string());
        let failed_event = h
            .events
            .lock()
            .unwrap()
            .iter()
            .any(|e| matches!(e, DownloadEvent::DownloadFailed { .. }));
        assert!(failed_event);
    }

    #[tokio::test]
    async fn retry_requeues_with_fresh_resolution() {
        let h = Harness::new(config(1));
        let a = h.enqueue_with_source("a").await;
        h.fail(a, "boom").await;

        h.coordinator.retry(&a).await;

        // stale source cleared, so the retry went through the resolver
        assert_eq!(h.resolver.calls(), 1);
        assert_eq!(h.downloader.started_ids(), vec![a, a]);
        let snapshot = h.coordinator.snapshot().await;
        assert!(snapshot.failed.is_empty());
    }

    #[tokio::test]
    async fn delete_removes_completed_record() {
        let h = Harness::new(config(1));
        let a = h.enqueue_with_source("a").await;
        h.succeed(a, "/data/a.mp4").await;

        h.coordinator.delete(&a).await;

        let snapshot = h.coordinator.snapshot().await;
        assert!(snapshot.completed.is_empty());

        // deleting again is a silent no-op
        let saves_before = h.storage.saves();
        h.coordinator.delete(&a).await;
        assert_eq!(h.storage.saves(), saves_before);
    }

    #[tokio::test]
    async fn structural_changes_persist_immediately() {
        let h = Harness::new(config(1));
        assert_eq!(h.storage.saves(), 0);

        let a = h.enqueue_with_source("a").await;
        assert_eq!(h.storage.saves(), 1);

        h.coordinator.pause(&a).await;
        assert_eq!(h.storage.saves(), 2);

        let saved = h.storage.saved.lock().unwrap().clone().unwrap();
        assert_eq!(saved.active.len(), 1);
        assert!(saved.active[0].state.is_paused());
    }

    #[tokio::test]
    async fn progress_persistence_is_throttled() {
        let h = Harness::new(
            CoordinatorConfig::default()
                .with_max_concurrent(1)
                .with_persist_min_interval(Duration::from_secs(3600)),
        );
        let a = h.enqueue_with_source("a").await;
        let saves_after_enqueue = h.storage.saves();

        h.progress(a, 0.1).await;
        h.progress(a, 0.2).await;
        h.progress(a, 0.3).await;

        // inside the window, progress never hits storage
        assert_eq!(h.storage.saves(), saves_after_enqueue);

        // but every tick still reaches subscribers
        let progress_events = h
            .events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| matches!(e, DownloadEvent::DownloadProgress { .. }))
            .count();
        assert_eq!(progress_events, 3);
    }

    #[tokio::test]
    async fn restore_parks_interrupted_and_evicts_missing_artifacts() {
        let artifact = tempfile::NamedTempFile::new().unwrap();

        let interrupted = {
            let mut r = DownloadRecord::new(
                ContentRef::new("a", "A"),
                Quality::P720,
                Some(StreamSource::new("https://cdn.example/a")),
            );
            r.state = DownloadState::Downloading;
            r.progress = 0.4;
            r
        };
        let kept = {
            let mut r = DownloadRecord::new(ContentRef::new("b", "B"), Quality::P720, None);
            r.state = DownloadState::Completed;
            r.local_artifact_path = Some(artifact.path().to_path_buf());
            r
        };
        let gone = {
            let mut r = DownloadRecord::new(ContentRef::new("c", "C"), Quality::P720, None);
            r.state = DownloadState::Completed;
            r.local_artifact_path = Some(PathBuf::from("/nonexistent/c.mp4"));
            r
        };
        let interrupted_id = interrupted.id;
        let kept_id = kept.id;

        let state = PartitionState {
            active: vec![interrupted],
            completed: vec![kept, gone],
            ..PartitionState::default()
        };

        let h = Harness::with_parts(config(1), MemoryStorage::with_state(state), FixedResolver::ok());
        h.coordinator.restore_from_storage().await;

        let snapshot = h.coordinator.snapshot().await;
        assert_eq!(snapshot.completed.len(), 1);
        assert_eq!(snapshot.completed[0].id, kept_id.to_string());
        let parked = snapshot.get(&interrupted_id.to_string()).unwrap();
        assert!(parked.state.is_paused());
        // parked records stay parked until explicitly resumed
        assert!(h.downloader.started_ids().is_empty());

        h.coordinator.resume_pending().await;
        assert_eq!(h.downloader.started_ids(), vec![interrupted_id]);
    }

    #[tokio::test]
    async fn restore_under_smaller_limit_respects_slot_bound() {
        // Two downloads were mid-transfer when the state was saved; the
        // coordinator comes back with K=1, so only one may restart.
        let make = |label: &str| {
            let mut r = DownloadRecord::new(
                ContentRef::new(label, label.to_uppercase()),
                Quality::P720,
                Some(StreamSource::new(format!("https://cdn.example/{label}"))),
            );
            r.state = DownloadState::Downloading;
            r
        };
        let first = make("a");
        let second = make("b");
        let first_id = first.id;
        let second_id = second.id;

        let state = PartitionState {
            active: vec![first, second],
            ..PartitionState::default()
        };

        let h = Harness::with_parts(config(1), MemoryStorage::with_state(state), FixedResolver::ok());
        h.coordinator.restore_from_storage().await;
        h.coordinator.resume_pending().await;

        assert_eq!(h.downloader.started_ids(), vec![first_id]);
        let snapshot = h.coordinator.snapshot().await;
        let downloading = snapshot
            .items
            .iter()
            .filter(|s| s.state == DownloadState::Downloading)
            .count();
        assert_eq!(downloading, 1);
        assert_eq!(
            snapshot.get(&second_id.to_string()).unwrap().state,
            DownloadState::Pending
        );
    }
}
