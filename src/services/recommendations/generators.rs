//! Candidate generation strategies.
//!
//! Every strategy turns one positive signal into candidate albums for the
//! signal's user and never proposes the signal's own album.

use std::sync::Arc;

use crate::{
    db::RatingStore,
    error::AppResult,
    models::{AlbumSummary, ArtistId, Candidate, Signal},
    services::catalog::CatalogClient,
};

/// A candidate generation strategy
#[async_trait::async_trait]
pub trait CandidateGenerator: Send + Sync {
    /// Strategy name for logging and run accounting
    fn name(&self) -> &'static str;

    async fn generate(&self, signal: &Signal) -> AppResult<Vec<Candidate>>;
}

/// Resolves the signal's artist, searching by name when the local album row
/// carries no artist id.
async fn resolve_artist(catalog: &dyn CatalogClient, signal: &Signal) -> AppResult<ArtistId> {
    match &signal.artist_id {
        Some(artist_id) => Ok(artist_id.clone()),
        None => catalog.lookup_artist_id(&signal.artist_name).await,
    }
}

fn candidates_from(signal: &Signal, albums: Vec<AlbumSummary>) -> Vec<Candidate> {
    albums
        .into_iter()
        .filter(|album| album.album_id != signal.album_id)
        .map(|album| Candidate::new(signal.user_id, album.album_id))
        .collect()
}

/// Other albums by the signal's artist
pub struct ArtistCatalogExpansion {
    catalog: Arc<dyn CatalogClient>,
}

impl ArtistCatalogExpansion {
    pub fn new(catalog: Arc<dyn CatalogClient>) -> Self {
        Self { catalog }
    }
}

#[async_trait::async_trait]
impl CandidateGenerator for ArtistCatalogExpansion {
    fn name(&self) -> &'static str {
        "artist_catalog"
    }

    async fn generate(&self, signal: &Signal) -> AppResult<Vec<Candidate>> {
        let artist_id = resolve_artist(self.catalog.as_ref(), signal).await?;
        let albums = self.catalog.albums_by_artist(&artist_id).await?;

        Ok(candidates_from(signal, albums))
    }
}

/// Albums by artists related to the signal's artist.
///
/// Only the first `cap` related artists are expanded. A related artist whose
/// listing fails is skipped and the remaining branches still contribute;
/// fatal errors stop the whole expansion.
pub struct RelatedArtistExpansion {
    catalog: Arc<dyn CatalogClient>,
    cap: usize,
}

impl RelatedArtistExpansion {
    pub fn new(catalog: Arc<dyn CatalogClient>, cap: usize) -> Self {
        Self { catalog, cap }
    }
}

#[async_trait::async_trait]
impl CandidateGenerator for RelatedArtistExpansion {
    fn name(&self) -> &'static str {
        "related_artist"
    }

    async fn generate(&self, signal: &Signal) -> AppResult<Vec<Candidate>> {
        let artist_id = resolve_artist(self.catalog.as_ref(), signal).await?;
        let related = self.catalog.related_artists(&artist_id).await?;

        if related.len() > self.cap {
            tracing::debug!(
                artist_id = %artist_id,
                related = related.len(),
                cap = self.cap,
                "Capping related artist fan-out"
            );
        }

        let mut candidates = Vec::new();
        for artist in related.into_iter().take(self.cap) {
            match self.catalog.albums_by_artist(&artist.artist_id).await {
                Ok(albums) => candidates.extend(candidates_from(signal, albums)),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    tracing::warn!(
                        user_id = signal.user_id,
                        related_artist = %artist.artist_id,
                        error = %e,
                        "Skipping related artist"
                    );
                }
            }
        }

        Ok(candidates)
    }
}

/// Albums liked by other users who liked the signal's album.
///
/// One set-based query per signal; co-raters are capped so a popular album
/// cannot explode the candidate set.
pub struct CoRatingExpansion {
    ratings: Arc<dyn RatingStore>,
    threshold: i32,
    co_rater_cap: i64,
}

impl CoRatingExpansion {
    pub fn new(ratings: Arc<dyn RatingStore>, threshold: i32, co_rater_cap: i64) -> Self {
        Self {
            ratings,
            threshold,
            co_rater_cap,
        }
    }
}

#[async_trait::async_trait]
impl CandidateGenerator for CoRatingExpansion {
    fn name(&self) -> &'static str {
        "co_rating"
    }

    async fn generate(&self, signal: &Signal) -> AppResult<Vec<Candidate>> {
        let albums = self
            .ratings
            .co_rated_albums(
                signal.user_id,
                &signal.album_id,
                self.threshold,
                self.co_rater_cap,
            )
            .await?;

        Ok(albums
            .into_iter()
            .filter(|album_id| *album_id != signal.album_id)
            .map(|album_id| Candidate::new(signal.user_id, album_id))
            .collect())
    }
}
