//! Download event emitter port.
//!
//! This port abstracts download event emission, allowing the coordinator
//! to emit events without coupling to transport details (SSE, UI bridges,
//! CLI output).

use crate::download::DownloadEvent;

/// Port for emitting download events.
///
/// Implementations handle the actual event delivery (channels, SSE, UI
/// event buses). `emit` must not block; implementations buffer or drop.
pub trait DownloadEventEmitterPort: Send + Sync {
    /// Emit a download event.
    fn emit(&self, event: DownloadEvent);

    /// Clone this emitter into a boxed trait object.
    ///
    /// This enables cloning of `Arc<dyn DownloadEventEmitterPort>` without
    /// requiring the underlying type to implement Clone.
    fn clone_box(&self) -> Box<dyn DownloadEventEmitterPort>;
}

/// A no-op download event emitter for tests and headless contexts.
#[derive(Debug, Clone, Default)]
pub struct NoopDownloadEmitter;

impl NoopDownloadEmitter {
    /// Create a new no-op download emitter.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl DownloadEventEmitterPort for NoopDownloadEmitter {
    fn emit(&self, _event: DownloadEvent) {
        // Intentionally do nothing
    }

    fn clone_box(&self) -> Box<dyn DownloadEventEmitterPort> {
        Box::new(self.clone())
    }
}
