use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt::Display;

use crate::error::{AppError, AppResult};

pub mod run;

pub use run::{RunStatus, RunSummary};

/// Identifier of a rating user
pub type UserId = i64;

/// Catalog album identifier (external, stable)
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type,
)]
#[serde(transparent)]
#[sqlx(transparent)]
pub struct AlbumId(pub String);

/// Catalog artist identifier (external, stable)
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type,
)]
#[serde(transparent)]
#[sqlx(transparent)]
pub struct ArtistId(pub String);

impl AlbumId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl ArtistId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for AlbumId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Display for ArtistId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for AlbumId {
    fn from(id: &str) -> Self {
        AlbumId(id.to_string())
    }
}

impl From<&str> for ArtistId {
    fn from(id: &str) -> Self {
        ArtistId(id.to_string())
    }
}

/// Album row cached locally from the catalog. Never updated once stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct CatalogAlbum {
    pub album_id: AlbumId,
    pub album_name: String,
    pub artist_name: String,
    pub artist_id: ArtistId,
    pub release_date: NaiveDate,
    pub cover_url: String,
}

impl CatalogAlbum {
    /// Maps a catalog record onto the local album row.
    ///
    /// The first listed artist is the album's artist and the first image is the
    /// cover. Records without an artist or with an unreadable release date are
    /// rejected as malformed.
    pub fn from_summary(summary: &AlbumSummary) -> AppResult<Self> {
        let artist = summary.artists.first().ok_or_else(|| {
            AppError::Malformed(format!("album {} has no artists", summary.album_id))
        })?;

        let raw_date = summary.release_date.as_deref().ok_or_else(|| {
            AppError::Malformed(format!("album {} has no release date", summary.album_id))
        })?;

        Ok(CatalogAlbum {
            album_id: summary.album_id.clone(),
            album_name: summary.album_name.clone(),
            artist_name: artist.name.clone(),
            artist_id: artist.artist_id.clone(),
            release_date: parse_release_date(raw_date)?,
            cover_url: summary.cover_url.clone().unwrap_or_default(),
        })
    }
}

/// Parses a catalog release date of year, month or day precision
/// (`1981`, `1981-12`, `1981-12-01`), filling missing parts with the first
/// month or day.
pub fn parse_release_date(raw: &str) -> AppResult<NaiveDate> {
    let malformed = || AppError::Malformed(format!("unreadable release date '{}'", raw));

    let parts: Vec<&str> = raw.trim().split('-').collect();
    let number = |index: usize, fallback: u32| -> AppResult<u32> {
        match parts.get(index) {
            Some(part) => part.parse::<u32>().map_err(|_| malformed()),
            None => Ok(fallback),
        }
    };

    if parts.is_empty() || parts.len() > 3 {
        return Err(malformed());
    }

    let year = parts[0].parse::<i32>().map_err(|_| malformed())?;
    let month = number(1, 1)?;
    let day = number(2, 1)?;

    NaiveDate::from_ymd_opt(year, month, day).ok_or_else(malformed)
}

/// Artist reference as listed by the catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtistSummary {
    pub artist_id: ArtistId,
    pub name: String,
}

/// Album record as the catalog reports it.
///
/// Listings, searches and single-album lookups all return these fields, so
/// one shape serves every catalog call. Fields stay optional here; strictness
/// is applied when mapping into [`CatalogAlbum`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlbumSummary {
    pub album_id: AlbumId,
    pub album_name: String,
    pub artists: Vec<ArtistSummary>,
    pub release_date: Option<String>,
    pub cover_url: Option<String>,
}

/// A user's positively rated album, the seed for generation
#[derive(Debug, Clone, PartialEq, Eq, Hash, sqlx::FromRow)]
pub struct Signal {
    pub user_id: UserId,
    pub album_id: AlbumId,
    pub artist_name: String,
    pub artist_id: Option<ArtistId>,
}

/// A proposed recommendation, not yet confirmed in the catalog or the sink
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Candidate {
    pub user_id: UserId,
    pub album_id: AlbumId,
}

impl Candidate {
    pub fn new(user_id: UserId, album_id: AlbumId) -> Self {
        Self { user_id, album_id }
    }
}

// ============================================================================
// Catalog Web API Types
// ============================================================================

/// Client-credentials token response
#[derive(Debug, Clone, Deserialize)]
pub struct ApiTokenResponse {
    pub access_token: String,
    #[serde(default = "default_expires_in")]
    pub expires_in: u64,
}

fn default_expires_in() -> u64 {
    3600
}

/// Paged listing envelope
#[derive(Debug, Clone, Deserialize)]
pub struct ApiPaging<T> {
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
    #[serde(default)]
    pub next: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiArtistSearchResponse {
    pub artists: ApiPaging<ApiArtist>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiAlbumSearchResponse {
    pub albums: ApiPaging<ApiAlbum>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiRelatedArtistsResponse {
    #[serde(default)]
    pub artists: Vec<ApiArtist>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiArtist {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiAlbum {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub artists: Vec<ApiArtist>,
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default)]
    pub images: Vec<ApiImage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiImage {
    pub url: String,
}

impl From<ApiArtist> for ArtistSummary {
    fn from(artist: ApiArtist) -> Self {
        ArtistSummary {
            artist_id: ArtistId(artist.id),
            name: artist.name,
        }
    }
}

impl From<ApiAlbum> for AlbumSummary {
    fn from(album: ApiAlbum) -> Self {
        // Images are listed widest first
        let cover_url = album.images.into_iter().next().map(|image| image.url);

        AlbumSummary {
            album_id: AlbumId(album.id),
            album_name: album.name,
            artists: album.artists.into_iter().map(ArtistSummary::from).collect(),
            release_date: album.release_date,
            cover_url,
        }
    }
}
