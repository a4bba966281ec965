//! Per-run memo of artist-level catalog answers.
//!
//! Many signals share an artist, so within one run every artist lookup,
//! listing and related-artist answer is fetched once and shared by all
//! workers. Concurrent callers for the same key wait for the first fetch.
//! Failures are not remembered; the next caller fetches again.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};

use crate::{
    error::AppResult,
    models::{AlbumId, AlbumSummary, ArtistId, ArtistSummary},
    services::catalog::CatalogClient,
};

type Slots<K, V> = Mutex<HashMap<K, Arc<OnceCell<V>>>>;

pub struct MemoizedCatalog {
    inner: Arc<dyn CatalogClient>,
    artist_ids: Slots<String, ArtistId>,
    listings: Slots<ArtistId, Vec<AlbumSummary>>,
    related: Slots<ArtistId, Vec<ArtistSummary>>,
}

impl MemoizedCatalog {
    pub fn new(inner: Arc<dyn CatalogClient>) -> Self {
        Self {
            inner,
            artist_ids: Mutex::default(),
            listings: Mutex::default(),
            related: Mutex::default(),
        }
    }

    /// Forgets every memoized answer. Called at run boundaries.
    pub async fn clear(&self) {
        self.artist_ids.lock().await.clear();
        self.listings.lock().await.clear();
        self.related.lock().await.clear();
    }
}

async fn memoized<K, V, F, Fut>(slots: &Slots<K, V>, key: K, fetch: F) -> AppResult<V>
where
    K: Eq + Hash,
    V: Clone,
    F: FnOnce() -> Fut,
    Fut: Future<Output = AppResult<V>>,
{
    let slot = slots.lock().await.entry(key).or_default().clone();
    slot.get_or_try_init(fetch).await.cloned()
}

#[async_trait::async_trait]
impl CatalogClient for MemoizedCatalog {
    async fn authenticate(&self) -> AppResult<()> {
        self.inner.authenticate().await
    }

    async fn lookup_artist_id(&self, artist_name: &str) -> AppResult<ArtistId> {
        memoized(&self.artist_ids, artist_name.to_string(), || {
            self.inner.lookup_artist_id(artist_name)
        })
        .await
    }

    async fn albums_by_artist(&self, artist_id: &ArtistId) -> AppResult<Vec<AlbumSummary>> {
        memoized(&self.listings, artist_id.clone(), || {
            self.inner.albums_by_artist(artist_id)
        })
        .await
    }

    // Enrichment already asks for each distinct album once per run
    async fn album_by_id(&self, album_id: &AlbumId) -> AppResult<AlbumSummary> {
        self.inner.album_by_id(album_id).await
    }

    async fn related_artists(&self, artist_id: &ArtistId) -> AppResult<Vec<ArtistSummary>> {
        memoized(&self.related, artist_id.clone(), || {
            self.inner.related_artists(artist_id)
        })
        .await
    }

    async fn search_album(&self, album_name: &str) -> AppResult<AlbumSummary> {
        self.inner.search_album(album_name).await
    }

    fn name(&self) -> &'static str {
        self.inner.name()
    }
}
