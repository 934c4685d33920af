//! Stream source resolver port.
//!
//! Scraped stream URLs are temporary. A download queued behind others may
//! outlive its source; before promoting such an item the coordinator asks
//! this port for a fresh source. Resolution failure fast-fails the item
//! into the failed partition instead of starting a doomed transfer.

use async_trait::async_trait;

use crate::download::{ContentRef, DownloadError, Quality, StreamSource};

/// Port for (re-)resolving a playable stream source for a content item.
///
/// Implementations typically re-run the scraper/extractor that produced
/// the original source.
#[async_trait]
pub trait SourceResolverPort: Send + Sync {
    /// Resolve a fresh stream source for the given content at the given
    /// quality.
    async fn resolve(
        &self,
        content: &ContentRef,
        quality: Quality,
    ) -> Result<StreamSource, DownloadError>;
}
