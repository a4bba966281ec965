/// Storage seams used by the recommendation pipeline.
///
/// Every write is conflict tolerant ("insert or do nothing") so concurrent
/// runs rely on the store's uniqueness constraints instead of locking.
use crate::{
    error::AppResult,
    models::{AlbumId, Candidate, CatalogAlbum, Signal, UserId},
};

/// Read-only access to ratings
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait RatingStore: Send + Sync {
    /// Ratings at or above `threshold`, joined to their album's artist.
    async fn positive_signals(&self, threshold: i32) -> AppResult<Vec<Signal>>;

    /// Albums positively rated by up to `co_rater_cap` other users who also
    /// positively rated `album_id`, excluding `album_id` itself.
    async fn co_rated_albums(
        &self,
        user_id: UserId,
        album_id: &AlbumId,
        threshold: i32,
        co_rater_cap: i64,
    ) -> AppResult<Vec<AlbumId>>;
}

/// Local catalog cache
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait AlbumStore: Send + Sync {
    async fn find_album(&self, album_id: &AlbumId) -> AppResult<Option<CatalogAlbum>>;

    async fn find_albums_by_name(&self, album_name: &str) -> AppResult<Vec<CatalogAlbum>>;

    /// Returns `true` when the row was created, `false` when it already existed.
    async fn insert_album(&self, album: &CatalogAlbum) -> AppResult<bool>;
}

/// Recommendation pairs
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait RecommendationStore: Send + Sync {
    /// Returns `true` when a new row was written. Pairs whose album is not in
    /// the local catalog are never written.
    async fn insert_recommendation(&self, candidate: &Candidate) -> AppResult<bool>;

    /// Set-based variant of [`insert_recommendation`](Self::insert_recommendation);
    /// returns the number of new rows.
    async fn insert_recommendations(&self, candidates: &[Candidate]) -> AppResult<u64>;

    /// Up to `limit` recommended albums for a user, in random order.
    async fn recommendations_for(&self, user_id: UserId, limit: i64)
        -> AppResult<Vec<CatalogAlbum>>;
}
