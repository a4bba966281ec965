use std::sync::Arc;

use crate::{
    db::AlbumStore,
    error::{AppError, AppResult},
    models::{AlbumId, CatalogAlbum},
    services::catalog::CatalogClient,
};

/// Outcome of ensuring one candidate album
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ensured {
    /// Already stored locally, or stored by a concurrent writer
    Cached,
    /// Fetched from the catalog and stored by this call
    Enriched,
    /// The catalog no longer knows the album or describes it unusably
    Dropped,
}

impl Ensured {
    pub fn is_present(self) -> bool {
        !matches!(self, Ensured::Dropped)
    }
}

/// Read-through catalog cache with conflict-tolerant writes.
///
/// The local album store is consulted first; on a miss the album is fetched
/// and inserted with "insert or do nothing", so concurrent runs asking for
/// the same album never fail or duplicate.
pub struct CatalogUpsert {
    catalog: Arc<dyn CatalogClient>,
    albums: Arc<dyn AlbumStore>,
}

impl CatalogUpsert {
    pub fn new(catalog: Arc<dyn CatalogClient>, albums: Arc<dyn AlbumStore>) -> Self {
        Self { catalog, albums }
    }

    pub async fn ensure_album(&self, album_id: &AlbumId) -> AppResult<Ensured> {
        if self.albums.find_album(album_id).await?.is_some() {
            return Ok(Ensured::Cached);
        }

        let summary = match self.catalog.album_by_id(album_id).await {
            Ok(summary) => summary,
            Err(AppError::NotFound(reason)) => {
                tracing::info!(album_id = %album_id, reason = %reason, "Album delisted, dropping");
                return Ok(Ensured::Dropped);
            }
            Err(e) => return Err(e),
        };

        let mut album = match CatalogAlbum::from_summary(&summary) {
            Ok(album) => album,
            Err(e) => {
                tracing::warn!(album_id = %album_id, error = %e, "Unusable catalog record, dropping");
                return Ok(Ensured::Dropped);
            }
        };
        // Relinked records may carry a different id; the candidate's id is the key
        album.album_id = album_id.clone();

        if self.albums.insert_album(&album).await? {
            tracing::debug!(album_id = %album_id, "Stored catalog album");
            Ok(Ensured::Enriched)
        } else {
            Ok(Ensured::Cached)
        }
    }

    /// Local-only presence check, used once a run may no longer call the catalog.
    pub async fn resolve_local(&self, album_id: &AlbumId) -> AppResult<bool> {
        Ok(self.albums.find_album(album_id).await?.is_some())
    }
}
