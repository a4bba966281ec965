//! Direct catalog imports, outside the scheduled pipeline.
//!
//! Operators use these to seed the local catalog with an artist's
//! discography or a single album by name. Writes go through the same
//! conflict-tolerant insert the pipeline uses.

use serde::Serialize;
use std::sync::Arc;

use crate::{
    db::AlbumStore,
    error::{AppError, AppResult},
    models::{ArtistId, CatalogAlbum},
    services::catalog::CatalogClient,
};

/// Outcome of importing an artist's albums
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtistImport {
    pub artist_id: ArtistId,
    /// Albums the catalog listed
    pub listed: usize,
    /// Albums newly stored
    pub inserted: usize,
    /// Albums skipped as malformed
    pub skipped: usize,
}

pub struct CatalogSearch {
    catalog: Arc<dyn CatalogClient>,
    albums: Arc<dyn AlbumStore>,
}

impl CatalogSearch {
    pub fn new(catalog: Arc<dyn CatalogClient>, albums: Arc<dyn AlbumStore>) -> Self {
        Self { catalog, albums }
    }

    /// Stores every album the catalog lists for the best-matching artist.
    pub async fn import_artist_albums(&self, artist_name: &str) -> AppResult<ArtistImport> {
        let artist_id = self.catalog.lookup_artist_id(artist_name).await?;
        let summaries = self.catalog.albums_by_artist(&artist_id).await?;

        let mut report = ArtistImport {
            artist_id,
            listed: summaries.len(),
            inserted: 0,
            skipped: 0,
        };

        for summary in &summaries {
            match CatalogAlbum::from_summary(summary) {
                Ok(album) => {
                    if self.albums.insert_album(&album).await? {
                        report.inserted += 1;
                    }
                }
                Err(e) => {
                    tracing::warn!(album_id = %summary.album_id, error = %e, "Skipping album");
                    report.skipped += 1;
                }
            }
        }

        tracing::info!(
            artist = %artist_name,
            artist_id = %report.artist_id,
            listed = report.listed,
            inserted = report.inserted,
            "Imported artist albums"
        );

        Ok(report)
    }

    /// Returns the stored album with this exact name, importing the catalog's
    /// best match when none is stored yet.
    pub async fn find_or_import_album(&self, album_name: &str) -> AppResult<CatalogAlbum> {
        if album_name.trim().is_empty() {
            return Err(AppError::InvalidInput(
                "Album name cannot be empty".to_string(),
            ));
        }

        if let Some(album) = self
            .albums
            .find_albums_by_name(album_name)
            .await?
            .into_iter()
            .next()
        {
            return Ok(album);
        }

        let summary = self.catalog.search_album(album_name).await?;
        let album = CatalogAlbum::from_summary(&summary)?;

        if self.albums.insert_album(&album).await? {
            tracing::info!(album_id = %album.album_id, album = %album.album_name, "Imported album");
        }

        // A concurrent writer may have won; the stored row is authoritative
        Ok(self
            .albums
            .find_album(&album.album_id)
            .await?
            .unwrap_or(album))
    }
}
