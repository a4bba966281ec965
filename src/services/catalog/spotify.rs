/// Spotify Web API catalog
///
/// API Flow:
/// 1. Token: client-credentials exchange against the accounts service
/// 2. Artist lookup: /search?type=artist → best-match artist id
/// 3. Listing: /artists/{id}/albums (paged via `next`) and /artists/{id}/related-artists
/// 4. Enrichment: /albums/{id}
///
/// Search, listing and related-artist responses go through the Redis cache;
/// single-album lookups do not, since enrichment stores them locally anyway.
use reqwest::{header::RETRY_AFTER, Client as HttpClient, StatusCode};
use serde::de::DeserializeOwned;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::{
    cached,
    config::Config,
    db::{Cache, CacheKey},
    error::{AppError, AppResult},
    models::{
        AlbumId, AlbumSummary, ApiAlbum, ApiAlbumSearchResponse, ApiArtistSearchResponse,
        ApiPaging, ApiRelatedArtistsResponse, ArtistId, ArtistSummary,
    },
    services::catalog::{CatalogClient, ClientCredentials, RetryPolicy, TokenCache, TokenSource},
};

const SEARCH_CACHE_TTL: u64 = 86_400; // 1 day
const ARTIST_ALBUMS_CACHE_TTL: u64 = 604_800; // 1 week
const RELATED_CACHE_TTL: u64 = 604_800; // 1 week

const PAGE_SIZE: &str = "50";
/// Stops runaway pagination on a misbehaving `next` link
const MAX_PAGES: usize = 20;

pub struct SpotifyCatalog {
    http_client: HttpClient,
    api_url: String,
    tokens: TokenCache,
    retry: RetryPolicy,
    cache: Cache,
}

impl SpotifyCatalog {
    pub fn new(
        http_client: HttpClient,
        api_url: String,
        tokens: TokenCache,
        retry: RetryPolicy,
        cache: Cache,
    ) -> Self {
        Self {
            http_client,
            api_url: api_url.trim_end_matches('/').to_string(),
            tokens,
            retry,
            cache,
        }
    }

    /// Builds the client from configuration, sharing one HTTP connection pool
    /// between the token exchange and the API calls.
    pub fn from_config(config: &Config, cache: Cache) -> AppResult<Self> {
        let http_client = HttpClient::builder()
            .timeout(config.request_timeout())
            .build()?;

        let credentials: Arc<dyn TokenSource> = Arc::new(ClientCredentials::new(
            http_client.clone(),
            config.catalog_auth_url.clone(),
            config.catalog_client_id.clone(),
            config.catalog_client_secret.clone(),
        ));

        Ok(Self::new(
            http_client,
            config.catalog_api_url.clone(),
            TokenCache::new(credentials),
            RetryPolicy::new(config),
            cache,
        ))
    }

    /// GET with bearer token, retry and classification.
    ///
    /// A 401 drops the cached token and the request is replayed once with a
    /// fresh one; a second 401 means the credentials themselves are no good.
    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> AppResult<T> {
        let replayed = AtomicBool::new(false);
        let replayed = &replayed;

        self.retry
            .run(url, move || self.send_once(url, query, replayed))
            .await
    }

    async fn send_once<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, &str)],
        replayed: &AtomicBool,
    ) -> AppResult<T> {
        let token = self.tokens.get().await?;

        let response = self
            .http_client
            .get(url)
            .bearer_auth(token.access_token())
            .query(query)
            .send()
            .await?;

        let status = response.status();

        if status == StatusCode::UNAUTHORIZED {
            self.tokens.invalidate(&token).await;
            if replayed.swap(true, Ordering::SeqCst) {
                return Err(AppError::Auth(
                    "catalog rejected a freshly issued access token".to_string(),
                ));
            }
            return Err(AppError::transient("catalog rejected access token"));
        }

        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, retry_after, &body));
        }

        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes)
            .map_err(|e| AppError::Malformed(format!("{}: {}", url, e)))
    }

    async fn fetch_artist_id(&self, artist_name: &str) -> AppResult<ArtistId> {
        let url = format!("{}/search", self.api_url);
        let response: ApiArtistSearchResponse = self
            .get_json(
                &url,
                &[("q", artist_name), ("type", "artist"), ("limit", "1")],
            )
            .await?;

        response
            .artists
            .items
            .into_iter()
            .next()
            .map(|artist| ArtistId(artist.id))
            .ok_or_else(|| AppError::NotFound(format!("artist '{}'", artist_name)))
    }

    async fn fetch_albums_by_artist(&self, artist_id: &ArtistId) -> AppResult<Vec<AlbumSummary>> {
        let first_url = format!("{}/artists/{}/albums", self.api_url, artist_id);
        let mut page: ApiPaging<ApiAlbum> = self
            .get_json(
                &first_url,
                &[("include_groups", "album"), ("limit", PAGE_SIZE)],
            )
            .await?;

        let mut albums: Vec<AlbumSummary> = Vec::new();
        let mut pages = 1;

        loop {
            albums.extend(page.items.into_iter().map(AlbumSummary::from));

            let Some(next) = page.next else {
                break;
            };

            if pages >= MAX_PAGES {
                tracing::warn!(
                    artist_id = %artist_id,
                    pages,
                    "Album listing exceeded page limit, truncating"
                );
                break;
            }

            // `next` already carries the paging query
            page = self.get_json(&next, &[]).await?;
            pages += 1;
        }

        tracing::debug!(artist_id = %artist_id, pages, count = albums.len(), "Listed artist albums");

        Ok(albums)
    }

    async fn fetch_related_artists(&self, artist_id: &ArtistId) -> AppResult<Vec<ArtistSummary>> {
        let url = format!("{}/artists/{}/related-artists", self.api_url, artist_id);
        let response: ApiRelatedArtistsResponse = self.get_json(&url, &[]).await?;

        Ok(response
            .artists
            .into_iter()
            .map(ArtistSummary::from)
            .collect())
    }

    async fn fetch_album_search(&self, album_name: &str) -> AppResult<AlbumSummary> {
        let url = format!("{}/search", self.api_url);
        let response: ApiAlbumSearchResponse = self
            .get_json(
                &url,
                &[("q", album_name), ("type", "album"), ("limit", "1")],
            )
            .await?;

        response
            .albums
            .items
            .into_iter()
            .next()
            .map(AlbumSummary::from)
            .ok_or_else(|| AppError::NotFound(format!("album '{}'", album_name)))
    }
}

/// Maps a non-success, non-401 catalog status onto the error taxonomy
fn classify_status(status: StatusCode, retry_after: Option<Duration>, body: &str) -> AppError {
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        return AppError::Transient {
            message: format!("catalog returned {}", status),
            retry_after,
        };
    }

    match status {
        // The catalog answers 400 for ids it has never issued
        StatusCode::NOT_FOUND | StatusCode::BAD_REQUEST => {
            AppError::NotFound(format!("catalog returned {}: {}", status, body))
        }
        _ => AppError::ExternalApi(format!("catalog returned {}: {}", status, body)),
    }
}

fn require_name(kind: &str, name: &str) -> AppResult<()> {
    if name.trim().is_empty() {
        return Err(AppError::InvalidInput(format!("{} name cannot be empty", kind)));
    }
    Ok(())
}

#[async_trait::async_trait]
impl CatalogClient for SpotifyCatalog {
    async fn authenticate(&self) -> AppResult<()> {
        self.retry
            .run("token", move || async move { self.tokens.get().await.map(|_| ()) })
            .await
    }

    #[tracing::instrument(skip(self), fields(catalog = "spotify"))]
    async fn lookup_artist_id(&self, artist_name: &str) -> AppResult<ArtistId> {
        require_name("artist", artist_name)?;

        cached!(
            self.cache,
            CacheKey::ArtistSearch(artist_name.to_string()),
            SEARCH_CACHE_TTL,
            self.fetch_artist_id(artist_name)
        )
    }

    #[tracing::instrument(skip(self), fields(catalog = "spotify", artist_id = %artist_id))]
    async fn albums_by_artist(&self, artist_id: &ArtistId) -> AppResult<Vec<AlbumSummary>> {
        cached!(
            self.cache,
            CacheKey::ArtistAlbums(artist_id.clone()),
            ARTIST_ALBUMS_CACHE_TTL,
            self.fetch_albums_by_artist(artist_id)
        )
    }

    #[tracing::instrument(skip(self), fields(catalog = "spotify", album_id = %album_id))]
    async fn album_by_id(&self, album_id: &AlbumId) -> AppResult<AlbumSummary> {
        let url = format!("{}/albums/{}", self.api_url, album_id);
        let album: ApiAlbum = self.get_json(&url, &[]).await?;
        Ok(AlbumSummary::from(album))
    }

    #[tracing::instrument(skip(self), fields(catalog = "spotify", artist_id = %artist_id))]
    async fn related_artists(&self, artist_id: &ArtistId) -> AppResult<Vec<ArtistSummary>> {
        cached!(
            self.cache,
            CacheKey::RelatedArtists(artist_id.clone()),
            RELATED_CACHE_TTL,
            self.fetch_related_artists(artist_id)
        )
    }

    #[tracing::instrument(skip(self), fields(catalog = "spotify"))]
    async fn search_album(&self, album_name: &str) -> AppResult<AlbumSummary> {
        require_name("album", album_name)?;

        cached!(
            self.cache,
            CacheKey::AlbumSearch(album_name.to_string()),
            SEARCH_CACHE_TTL,
            self.fetch_album_search(album_name)
        )
    }

    fn name(&self) -> &'static str {
        "spotify"
    }
}
