use redis::AsyncCommands;
use redis::Client;
use std::fmt::Display;
use tokio::sync::mpsc;

use crate::error::AppError;
use crate::error::AppResult;
use crate::models::ArtistId;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    ArtistSearch(String),
    ArtistAlbums(ArtistId),
    RelatedArtists(ArtistId),
    AlbumSearch(String),
}

impl Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheKey::ArtistSearch(name) => write!(f, "artist:search:{}", name.to_lowercase()),
            CacheKey::ArtistAlbums(id) => write!(f, "artist:albums:{}", id),
            CacheKey::RelatedArtists(id) => write!(f, "artist:related:{}", id),
            CacheKey::AlbumSearch(name) => write!(f, "album:search:{}", name.to_lowercase()),
        }
    }
}

/// Creates a Redis client for caching
pub fn create_redis_client(redis_url: &str) -> anyhow::Result<Client> {
    let client = Client::open(redis_url)?;
    Ok(client)
}

/// Message for asynchronous cache writes
struct CacheWriteMessage {
    key: String,
    value: String,
    ttl: u64,
}

/// Read-through cache for catalog responses, backed by Redis.
///
/// A disabled cache always misses and drops writes. Redis failures on read
/// are logged and treated as misses so a cache outage never fails a catalog
/// call.
#[derive(Clone)]
pub struct Cache {
    redis_client: Option<Client>,
    write_tx: Option<mpsc::UnboundedSender<CacheWriteMessage>>,
}

/// Handle for gracefully shutting down the cache writer
pub struct CacheWriterHandle {
    shutdown_tx: mpsc::Sender<()>,
}

impl CacheWriterHandle {
    /// Initiates a graceful shutdown of the cache writer
    ///
    /// Sends a shutdown signal to the writer task, which flushes pending
    /// writes to Redis before stopping.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
        tracing::info!("Cache writer shutdown signal sent");
    }
}

impl Cache {
    /// Creates a new Cache instance with an async write background task
    pub async fn new(redis_client: Client) -> (Self, CacheWriterHandle) {
        let (write_tx, write_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let client = redis_client.clone();
        tokio::spawn(async move {
            Self::cache_writer_task(client, write_rx, shutdown_rx).await;
        });

        let cache = Self {
            redis_client: Some(redis_client),
            write_tx: Some(write_tx),
        };

        let handle = CacheWriterHandle { shutdown_tx };

        (cache, handle)
    }

    /// A cache that never stores anything
    pub fn disabled() -> Self {
        Self {
            redis_client: None,
            write_tx: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.redis_client.is_some()
    }

    /// Background task that processes cache write messages
    ///
    /// On shutdown signal, flushes all remaining messages before exiting.
    async fn cache_writer_task(
        client: Client,
        mut write_rx: mpsc::UnboundedReceiver<CacheWriteMessage>,
        mut shutdown_rx: mpsc::Receiver<()>,
    ) {
        tracing::info!("Cache writer task started");

        loop {
            tokio::select! {
                Some(msg) = write_rx.recv() => {
                    if let Err(e) = Self::write_to_redis(&client, msg).await {
                        tracing::error!(error = %e, "Failed to write to Redis cache");
                    }
                }
                _ = shutdown_rx.recv() => {
                    tracing::info!("Cache writer shutting down, flushing remaining writes");

                    write_rx.close();
                    while let Some(msg) = write_rx.recv().await {
                        if let Err(e) = Self::write_to_redis(&client, msg).await {
                            tracing::error!(error = %e, "Failed to flush cache write during shutdown");
                        }
                    }

                    tracing::info!("Cache writer task stopped");
                    break;
                }
            }
        }
    }

    async fn write_to_redis(client: &Client, msg: CacheWriteMessage) -> AppResult<()> {
        let mut conn = client.get_multiplexed_async_connection().await?;
        let _: () = conn.set_ex(msg.key, msg.value, msg.ttl).await?;
        Ok(())
    }

    async fn read_from_redis(client: &Client, key: &CacheKey) -> AppResult<Option<String>> {
        let mut conn = client.get_multiplexed_async_connection().await?;
        let cached: Option<String> = conn.get(format!("{}", key)).await?;
        Ok(cached)
    }

    /// Retrieves a value from the cache by key
    pub async fn get_from_cache<T: serde::de::DeserializeOwned>(
        &self,
        key: &CacheKey,
    ) -> AppResult<Option<T>> {
        let Some(client) = &self.redis_client else {
            return Ok(None);
        };

        let cached = match Self::read_from_redis(client, key).await {
            Ok(cached) => cached,
            Err(e) => {
                tracing::warn!(error = %e, key = %key, "Redis read failed, treating as miss");
                return Ok(None);
            }
        };

        match cached {
            Some(json) => {
                let data = serde_json::from_str(&json).map_err(|e| {
                    AppError::Internal(format!("Cache deserialization error: {}", e))
                })?;
                tracing::debug!(key = %key, "Cache hit");
                Ok(Some(data))
            }
            None => Ok(None),
        }
    }

    /// Stores a value in the cache asynchronously without blocking
    ///
    /// The value is serialized here and handed to the background writer; the
    /// Redis write happens later and its failure is only logged.
    pub fn set_in_background<T: serde::Serialize>(&self, key: &CacheKey, value: &T, ttl: u64) {
        let Some(write_tx) = &self.write_tx else {
            return;
        };

        let json = match serde_json::to_string(value) {
            Ok(j) => j,
            Err(e) => {
                tracing::error!(error = %e, "Cache serialization error");
                return;
            }
        };

        let msg = CacheWriteMessage {
            key: format!("{}", key),
            value: json,
            ttl,
        };

        if let Err(e) = write_tx.send(msg) {
            tracing::error!(error = %e, "Failed to send cache write message");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_key_display_artist_search_lowercase() {
        let key = CacheKey::ArtistSearch("Daft Punk".to_string());
        assert_eq!(format!("{}", key), "artist:search:daft punk");
    }

    #[test]
    fn test_cache_key_display_artist_albums() {
        let key = CacheKey::ArtistAlbums(ArtistId::from("4tZwfgrHOc3mvqYlEYSvVi"));
        assert_eq!(format!("{}", key), "artist:albums:4tZwfgrHOc3mvqYlEYSvVi");
    }

    #[test]
    fn test_cache_key_display_related_artists() {
        let key = CacheKey::RelatedArtists(ArtistId::from("4tZwfgrHOc3mvqYlEYSvVi"));
        assert_eq!(format!("{}", key), "artist:related:4tZwfgrHOc3mvqYlEYSvVi");
    }

    #[test]
    fn test_cache_key_display_album_search() {
        let key = CacheKey::AlbumSearch("DISCOVERY".to_string());
        assert_eq!(format!("{}", key), "album:search:discovery");
    }

    #[tokio::test]
    async fn test_disabled_cache_always_misses() {
        let cache = Cache::disabled();
        let key = CacheKey::ArtistSearch("nova".to_string());

        cache.set_in_background(&key, &vec!["ignored".to_string()], 60);
        let retrieved: Option<Vec<String>> = cache.get_from_cache(&key).await.unwrap();

        assert!(!cache.is_enabled());
        assert_eq!(retrieved, None);
    }

    #[tokio::test]
    async fn test_unreachable_redis_degrades_to_miss() {
        // Nothing listens on port 1
        let client = create_redis_client("redis://127.0.0.1:1").unwrap();
        let (cache, _handle) = Cache::new(client).await;

        let key = CacheKey::ArtistSearch("nova".to_string());
        let retrieved: Option<Vec<String>> = cache.get_from_cache(&key).await.unwrap();

        assert_eq!(retrieved, None);
    }

    #[tokio::test]
    #[ignore = "requires a running Redis"]
    async fn test_set_in_background_writes_to_cache() {
        let redis_url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());

        let client = create_redis_client(&redis_url).unwrap();
        let (cache, _handle) = Cache::new(client.clone()).await;

        let key = CacheKey::ArtistSearch("test_async_write".to_string());
        let value = vec!["item1".to_string(), "item2".to_string()];

        cache.set_in_background(&key, &value, 60);

        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;

        let retrieved: Option<Vec<String>> = cache.get_from_cache(&key).await.unwrap();
        assert_eq!(retrieved, Some(value));

        let mut conn = client.get_multiplexed_async_connection().await.unwrap();
        let _: () = conn.del(format!("{}", key)).await.unwrap();
    }

    #[tokio::test]
    #[ignore = "requires a running Redis"]
    async fn test_cache_writer_graceful_shutdown() {
        let redis_url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());

        let client = create_redis_client(&redis_url).unwrap();
        let (cache, handle) = Cache::new(client.clone()).await;

        let key = CacheKey::ArtistSearch("test_shutdown".to_string());
        let value = vec!["shutdown_test".to_string()];

        cache.set_in_background(&key, &value, 60);
        handle.shutdown().await;

        tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;

        let retrieved: Option<Vec<String>> = cache.get_from_cache(&key).await.unwrap();
        assert_eq!(retrieved, Some(value));

        let mut conn = client.get_multiplexed_async_connection().await.unwrap();
        let _: () = conn.del(format!("{}", key)).await.unwrap();
    }
}
