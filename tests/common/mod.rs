#![allow(dead_code)]

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::NaiveDate;
use vinyl_recs::{
    db::{AlbumStore, RatingStore, RecommendationStore},
    error::{AppError, AppResult},
    models::{
        AlbumId, AlbumSummary, ArtistId, ArtistSummary, Candidate, CatalogAlbum, Signal, UserId,
    },
    services::{
        catalog::CatalogClient,
        recommendations::{PipelineSettings, PipelineStores, RecommendationPipeline},
    },
};

// ============================================================================
// In-memory store
// ============================================================================

#[derive(Default)]
struct StoreState {
    albums: HashMap<AlbumId, CatalogAlbum>,
    reviews: Vec<(UserId, AlbumId, i32)>,
    recommendations: BTreeSet<Candidate>,
}

/// Store with the same conflict semantics as the PostgreSQL schema
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<StoreState>,
    pub album_inserts: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_album(&self, album: CatalogAlbum) {
        let mut state = self.state.lock().unwrap();
        state.albums.insert(album.album_id.clone(), album);
    }

    pub fn rate(&self, user_id: UserId, album_id: &str, rating: i32) {
        let mut state = self.state.lock().unwrap();
        let album_id = AlbumId::from(album_id);
        state
            .reviews
            .retain(|(user, album, _)| !(*user == user_id && *album == album_id));
        state.reviews.push((user_id, album_id, rating));
    }

    pub fn recommendations(&self) -> BTreeSet<(UserId, String)> {
        let state = self.state.lock().unwrap();
        state
            .recommendations
            .iter()
            .map(|c| (c.user_id, c.album_id.as_str().to_string()))
            .collect()
    }

    pub fn has_album(&self, album_id: &str) -> bool {
        let state = self.state.lock().unwrap();
        state.albums.contains_key(&AlbumId::from(album_id))
    }

    pub fn album_count(&self) -> usize {
        self.state.lock().unwrap().albums.len()
    }

    /// Every recommendation points at a stored album
    pub fn is_referentially_sound(&self) -> bool {
        let state = self.state.lock().unwrap();
        state
            .recommendations
            .iter()
            .all(|c| state.albums.contains_key(&c.album_id))
    }

    fn insert_pair(state: &mut StoreState, candidate: &Candidate) -> bool {
        if !state.albums.contains_key(&candidate.album_id) {
            return false;
        }
        state.recommendations.insert(candidate.clone())
    }
}

#[async_trait::async_trait]
impl RatingStore for MemoryStore {
    async fn positive_signals(&self, threshold: i32) -> AppResult<Vec<Signal>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .reviews
            .iter()
            .filter(|(_, _, rating)| *rating >= threshold)
            .filter_map(|(user_id, album_id, _)| {
                state.albums.get(album_id).map(|album| Signal {
                    user_id: *user_id,
                    album_id: album_id.clone(),
                    artist_name: album.artist_name.clone(),
                    artist_id: Some(album.artist_id.clone()).filter(|id| !id.as_str().is_empty()),
                })
            })
            .collect())
    }

    async fn co_rated_albums(
        &self,
        user_id: UserId,
        album_id: &AlbumId,
        threshold: i32,
        co_rater_cap: i64,
    ) -> AppResult<Vec<AlbumId>> {
        let state = self.state.lock().unwrap();

        let co_raters: BTreeSet<UserId> = state
            .reviews
            .iter()
            .filter(|(user, album, rating)| {
                album == album_id && *user != user_id && *rating >= threshold
            })
            .map(|(user, _, _)| *user)
            .collect();
        let co_raters: HashSet<UserId> = co_raters
            .into_iter()
            .take(co_rater_cap.max(0) as usize)
            .collect();

        let albums: BTreeSet<AlbumId> = state
            .reviews
            .iter()
            .filter(|(user, album, rating)| {
                co_raters.contains(user) && *rating >= threshold && album != album_id
            })
            .map(|(_, album, _)| album.clone())
            .collect();

        Ok(albums.into_iter().collect())
    }
}

#[async_trait::async_trait]
impl AlbumStore for MemoryStore {
    async fn find_album(&self, album_id: &AlbumId) -> AppResult<Option<CatalogAlbum>> {
        Ok(self.state.lock().unwrap().albums.get(album_id).cloned())
    }

    async fn find_albums_by_name(&self, album_name: &str) -> AppResult<Vec<CatalogAlbum>> {
        let state = self.state.lock().unwrap();
        let mut albums: Vec<CatalogAlbum> = state
            .albums
            .values()
            .filter(|album| album.album_name == album_name)
            .cloned()
            .collect();
        albums.sort_by(|a, b| a.album_id.cmp(&b.album_id));
        Ok(albums)
    }

    async fn insert_album(&self, album: &CatalogAlbum) -> AppResult<bool> {
        let mut state = self.state.lock().unwrap();
        if state.albums.contains_key(&album.album_id) {
            return Ok(false);
        }
        state.albums.insert(album.album_id.clone(), album.clone());
        self.album_inserts.fetch_add(1, Ordering::SeqCst);
        Ok(true)
    }
}

#[async_trait::async_trait]
impl RecommendationStore for MemoryStore {
    async fn insert_recommendation(&self, candidate: &Candidate) -> AppResult<bool> {
        let mut state = self.state.lock().unwrap();
        Ok(Self::insert_pair(&mut state, candidate))
    }

    async fn insert_recommendations(&self, candidates: &[Candidate]) -> AppResult<u64> {
        let mut state = self.state.lock().unwrap();
        Ok(candidates
            .iter()
            .filter(|candidate| Self::insert_pair(&mut state, candidate))
            .count() as u64)
    }

    async fn recommendations_for(
        &self,
        user_id: UserId,
        limit: i64,
    ) -> AppResult<Vec<CatalogAlbum>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .recommendations
            .iter()
            .filter(|c| c.user_id == user_id)
            .filter_map(|c| state.albums.get(&c.album_id).cloned())
            .take(limit.max(0) as usize)
            .collect())
    }
}

// ============================================================================
// Scripted catalog
// ============================================================================

/// Catalog answering from in-memory fixtures
#[derive(Default)]
pub struct FakeCatalog {
    artists_by_name: HashMap<String, ArtistId>,
    discographies: HashMap<ArtistId, Vec<AlbumSummary>>,
    related: HashMap<ArtistId, Vec<ArtistSummary>>,
    /// Albums whose single lookup answers NotFound
    delisted: HashSet<AlbumId>,
    /// Albums whose single lookup keeps failing transiently
    flaky: HashSet<AlbumId>,
    /// Albums whose single lookup never answers
    stalled: HashSet<AlbumId>,
    reject_credentials: bool,
    latency: Duration,
    pub authentications: AtomicUsize,
    pub album_lookups: AtomicUsize,
    pub listings: AtomicUsize,
    pub related_lookups: AtomicUsize,
}

impl FakeCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an artist and its albums
    pub fn artist(mut self, artist_id: &str, name: &str, album_ids: &[&str]) -> Self {
        let id = ArtistId::from(artist_id);
        self.artists_by_name.insert(name.to_string(), id.clone());
        self.discographies.insert(
            id,
            album_ids
                .iter()
                .map(|album_id| summary(album_id, artist_id, name))
                .collect(),
        );
        self
    }

    pub fn related(mut self, artist_id: &str, related: &[&str]) -> Self {
        self.related.insert(
            ArtistId::from(artist_id),
            related
                .iter()
                .map(|id| ArtistSummary {
                    artist_id: ArtistId::from(*id),
                    name: id.to_string(),
                })
                .collect(),
        );
        self
    }

    pub fn delisted(mut self, album_id: &str) -> Self {
        self.delisted.insert(AlbumId::from(album_id));
        self
    }

    pub fn flaky(mut self, album_id: &str) -> Self {
        self.flaky.insert(AlbumId::from(album_id));
        self
    }

    pub fn stalled(mut self, album_id: &str) -> Self {
        self.stalled.insert(AlbumId::from(album_id));
        self
    }

    pub fn rejecting_credentials(mut self) -> Self {
        self.reject_credentials = true;
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    fn find_summary(&self, album_id: &AlbumId) -> Option<AlbumSummary> {
        self.discographies
            .values()
            .flatten()
            .find(|album| album.album_id == *album_id)
            .cloned()
    }
}

#[async_trait::async_trait]
impl CatalogClient for FakeCatalog {
    async fn authenticate(&self) -> AppResult<()> {
        self.authentications.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.latency).await;
        if self.reject_credentials {
            return Err(AppError::Auth("invalid_client".to_string()));
        }
        Ok(())
    }

    async fn lookup_artist_id(&self, artist_name: &str) -> AppResult<ArtistId> {
        self.artists_by_name
            .get(artist_name)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("artist '{}'", artist_name)))
    }

    async fn albums_by_artist(&self, artist_id: &ArtistId) -> AppResult<Vec<AlbumSummary>> {
        self.listings.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.latency).await;
        self.discographies
            .get(artist_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("artist {}", artist_id)))
    }

    async fn album_by_id(&self, album_id: &AlbumId) -> AppResult<AlbumSummary> {
        self.album_lookups.fetch_add(1, Ordering::SeqCst);
        if self.stalled.contains(album_id) {
            std::future::pending::<()>().await;
        }
        if self.flaky.contains(album_id) {
            return Err(AppError::transient("catalog returned 503"));
        }
        if self.delisted.contains(album_id) {
            return Err(AppError::NotFound(format!("album {}", album_id)));
        }
        self.find_summary(album_id)
            .ok_or_else(|| AppError::NotFound(format!("album {}", album_id)))
    }

    async fn related_artists(&self, artist_id: &ArtistId) -> AppResult<Vec<ArtistSummary>> {
        self.related_lookups.fetch_add(1, Ordering::SeqCst);
        Ok(self.related.get(artist_id).cloned().unwrap_or_default())
    }

    async fn search_album(&self, album_name: &str) -> AppResult<AlbumSummary> {
        self.discographies
            .values()
            .flatten()
            .find(|album| album.album_name == album_name)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("album '{}'", album_name)))
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}

// ============================================================================
// Fixtures
// ============================================================================

pub fn summary(album_id: &str, artist_id: &str, artist_name: &str) -> AlbumSummary {
    AlbumSummary {
        album_id: AlbumId::from(album_id),
        album_name: album_id.to_uppercase(),
        artists: vec![ArtistSummary {
            artist_id: ArtistId::from(artist_id),
            name: artist_name.to_string(),
        }],
        release_date: Some("2020-01-01".to_string()),
        cover_url: Some(format!("https://img/{}", album_id)),
    }
}

pub fn album(album_id: &str, artist_id: &str, artist_name: &str) -> CatalogAlbum {
    CatalogAlbum {
        album_id: AlbumId::from(album_id),
        album_name: album_id.to_uppercase(),
        artist_name: artist_name.to_string(),
        artist_id: ArtistId::from(artist_id),
        release_date: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
        cover_url: format!("https://img/{}", album_id),
    }
}

pub fn pipeline(catalog: Arc<FakeCatalog>, store: Arc<MemoryStore>) -> RecommendationPipeline {
    pipeline_with(catalog, store, PipelineSettings::default())
}

pub fn pipeline_with(
    catalog: Arc<FakeCatalog>,
    store: Arc<MemoryStore>,
    settings: PipelineSettings,
) -> RecommendationPipeline {
    RecommendationPipeline::new(
        catalog,
        PipelineStores {
            ratings: store.clone(),
            albums: store.clone(),
            recommendations: store,
        },
        settings,
    )
}

pub fn pairs(items: &[(UserId, &str)]) -> BTreeSet<(UserId, String)> {
    items
        .iter()
        .map(|(user, album)| (*user, album.to_string()))
        .collect()
}
