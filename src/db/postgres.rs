use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;

use crate::{
    db::store::{AlbumStore, RatingStore, RecommendationStore},
    error::AppResult,
    models::{AlbumId, Candidate, CatalogAlbum, Signal, UserId},
};

const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(10);

const ALBUM_COLUMNS: &str =
    "album_id, album_name, artist_name, artist_id, release_date, cover AS cover_url";

/// Creates a PostgreSQL connection pool
///
/// Establishes a pool of database connections for efficient reuse.
/// Acquiring a connection never waits longer than [`ACQUIRE_TIMEOUT`].
pub async fn create_pool(database_url: &str, max_connections: u32) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(ACQUIRE_TIMEOUT)
        .connect(database_url)
        .await?;

    Ok(pool)
}

/// Applies the embedded schema migrations
pub async fn run_migrations(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// PostgreSQL-backed implementation of every pipeline store
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl RatingStore for PgStore {
    async fn positive_signals(&self, threshold: i32) -> AppResult<Vec<Signal>> {
        let signals = sqlx::query_as::<_, Signal>(
            r#"
            SELECT r.user_id, r.album_id, a.artist_name, NULLIF(a.artist_id, '') AS artist_id
            FROM reviews r
            JOIN albums a ON a.album_id = r.album_id
            WHERE r.rating >= $1
            "#,
        )
        .bind(threshold)
        .fetch_all(&self.pool)
        .await?;

        Ok(signals)
    }

    async fn co_rated_albums(
        &self,
        user_id: UserId,
        album_id: &AlbumId,
        threshold: i32,
        co_rater_cap: i64,
    ) -> AppResult<Vec<AlbumId>> {
        let albums = sqlx::query_scalar::<_, AlbumId>(
            r#"
            WITH co_raters AS (
                SELECT user_id
                FROM reviews
                WHERE album_id = $1 AND user_id <> $2 AND rating >= $3
                ORDER BY user_id
                LIMIT $4
            )
            SELECT DISTINCT r.album_id
            FROM reviews r
            JOIN co_raters c ON c.user_id = r.user_id
            WHERE r.rating >= $3 AND r.album_id <> $1
            ORDER BY r.album_id
            "#,
        )
        .bind(album_id)
        .bind(user_id)
        .bind(threshold)
        .bind(co_rater_cap)
        .fetch_all(&self.pool)
        .await?;

        Ok(albums)
    }
}

#[async_trait::async_trait]
impl AlbumStore for PgStore {
    async fn find_album(&self, album_id: &AlbumId) -> AppResult<Option<CatalogAlbum>> {
        let query = format!("SELECT {} FROM albums WHERE album_id = $1", ALBUM_COLUMNS);
        let album = sqlx::query_as::<_, CatalogAlbum>(&query)
            .bind(album_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(album)
    }

    async fn find_albums_by_name(&self, album_name: &str) -> AppResult<Vec<CatalogAlbum>> {
        let query = format!(
            "SELECT {} FROM albums WHERE album_name = $1 ORDER BY album_id",
            ALBUM_COLUMNS
        );
        let albums = sqlx::query_as::<_, CatalogAlbum>(&query)
            .bind(album_name)
            .fetch_all(&self.pool)
            .await?;

        Ok(albums)
    }

    async fn insert_album(&self, album: &CatalogAlbum) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO albums (album_id, album_name, artist_name, artist_id, release_date, cover)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (album_id) DO NOTHING
            "#,
        )
        .bind(&album.album_id)
        .bind(&album.album_name)
        .bind(&album.artist_name)
        .bind(&album.artist_id)
        .bind(album.release_date)
        .bind(&album.cover_url)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}

#[async_trait::async_trait]
impl RecommendationStore for PgStore {
    async fn insert_recommendation(&self, candidate: &Candidate) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO recommendations (user_id, album_id)
            SELECT $1::BIGINT, $2::TEXT
            WHERE EXISTS (SELECT 1 FROM albums WHERE album_id = $2::TEXT)
            ON CONFLICT (user_id, album_id) DO NOTHING
            "#,
        )
        .bind(candidate.user_id)
        .bind(&candidate.album_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn insert_recommendations(&self, candidates: &[Candidate]) -> AppResult<u64> {
        if candidates.is_empty() {
            return Ok(0);
        }

        let user_ids: Vec<i64> = candidates.iter().map(|c| c.user_id).collect();
        let album_ids: Vec<String> = candidates
            .iter()
            .map(|c| c.album_id.as_str().to_string())
            .collect();

        let result = sqlx::query(
            r#"
            INSERT INTO recommendations (user_id, album_id)
            SELECT p.user_id, p.album_id
            FROM UNNEST($1::BIGINT[], $2::TEXT[]) AS p(user_id, album_id)
            WHERE EXISTS (SELECT 1 FROM albums a WHERE a.album_id = p.album_id)
            ON CONFLICT (user_id, album_id) DO NOTHING
            "#,
        )
        .bind(&user_ids)
        .bind(&album_ids)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn recommendations_for(
        &self,
        user_id: UserId,
        limit: i64,
    ) -> AppResult<Vec<CatalogAlbum>> {
        let albums = sqlx::query_as::<_, CatalogAlbum>(
            r#"
            SELECT a.album_id, a.album_name, a.artist_name, a.artist_id, a.release_date,
                   a.cover AS cover_url
            FROM recommendations r
            JOIN albums a ON a.album_id = r.album_id
            WHERE r.user_id = $1
            ORDER BY RANDOM()
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(albums)
    }
}
