/// External music catalog abstraction
///
/// The catalog is a pure I/O boundary: it resolves artists, lists their albums
/// and fetches album metadata. Every implementation applies its own timeout,
/// retry and token handling so callers only see classified [`AppError`]s.
///
/// [`AppError`]: crate::error::AppError
use crate::{
    error::AppResult,
    models::{AlbumId, AlbumSummary, ArtistId, ArtistSummary},
};

pub mod memo;
pub mod retry;
pub mod spotify;
pub mod token;

pub use memo::MemoizedCatalog;
pub use retry::RetryPolicy;
pub use spotify::SpotifyCatalog;
pub use token::{AuthToken, ClientCredentials, TokenCache, TokenSource};

/// Trait for external catalog clients
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait CatalogClient: Send + Sync {
    /// Obtains a catalog access token up front.
    ///
    /// Fails with `Auth` when the catalog rejects the configured credentials.
    async fn authenticate(&self) -> AppResult<()>;

    /// Best match for an artist name; `NotFound` when the search is empty.
    async fn lookup_artist_id(&self, artist_name: &str) -> AppResult<ArtistId>;

    /// Every album released by the artist, across all result pages.
    async fn albums_by_artist(&self, artist_id: &ArtistId) -> AppResult<Vec<AlbumSummary>>;

    /// Full record for one album; `NotFound` when the catalog no longer lists it.
    async fn album_by_id(&self, album_id: &AlbumId) -> AppResult<AlbumSummary>;

    async fn related_artists(&self, artist_id: &ArtistId) -> AppResult<Vec<ArtistSummary>>;

    /// Best match for an album name; `NotFound` when the search is empty.
    async fn search_album(&self, album_name: &str) -> AppResult<AlbumSummary>;

    /// Catalog name for logging and debugging
    fn name(&self) -> &'static str;
}
