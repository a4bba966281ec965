use reqwest::{Client as HttpClient, StatusCode};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};

use crate::{
    error::{AppError, AppResult},
    models::ApiTokenResponse,
};

/// Tokens are refreshed this long before the catalog would reject them
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// Time-bounded catalog access token
#[derive(Clone, PartialEq, Eq)]
pub struct AuthToken {
    access_token: String,
    expires_at: Instant,
}

impl AuthToken {
    pub fn new(access_token: impl Into<String>, expires_in: Duration) -> Self {
        Self {
            access_token: access_token.into(),
            expires_at: Instant::now() + expires_in,
        }
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    /// Whether the token stays valid for at least [`EXPIRY_MARGIN`].
    pub fn is_fresh(&self) -> bool {
        Instant::now() + EXPIRY_MARGIN < self.expires_at
    }
}

impl std::fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthToken")
            .field("access_token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Performs the credential exchange behind a [`TokenCache`]
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait TokenSource: Send + Sync {
    async fn exchange(&self) -> AppResult<AuthToken>;
}

/// OAuth client-credentials grant against the catalog's token endpoint
pub struct ClientCredentials {
    http_client: HttpClient,
    auth_url: String,
    client_id: String,
    client_secret: String,
}

impl ClientCredentials {
    pub fn new(
        http_client: HttpClient,
        auth_url: String,
        client_id: String,
        client_secret: String,
    ) -> Self {
        Self {
            http_client,
            auth_url,
            client_id,
            client_secret,
        }
    }
}

#[async_trait::async_trait]
impl TokenSource for ClientCredentials {
    #[tracing::instrument(skip(self), fields(auth_url = %self.auth_url))]
    async fn exchange(&self) -> AppResult<AuthToken> {
        let response = self
            .http_client
            .post(&self.auth_url)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(match status {
                StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                    AppError::Auth(format!("token endpoint returned {}: {}", status, body))
                }
                s if s == StatusCode::TOO_MANY_REQUESTS || s.is_server_error() => {
                    AppError::transient(format!("token endpoint returned {}", status))
                }
                _ => AppError::ExternalApi(format!(
                    "token endpoint returned {}: {}",
                    status, body
                )),
            });
        }

        let bytes = response.bytes().await?;
        let token: ApiTokenResponse = serde_json::from_slice(&bytes)
            .map_err(|e| AppError::Malformed(format!("token response: {}", e)))?;

        tracing::info!(expires_in = token.expires_in, "Obtained catalog access token");

        Ok(AuthToken::new(
            token.access_token,
            Duration::from_secs(token.expires_in),
        ))
    }
}

/// Shared catalog token with single-flight refresh.
///
/// Readers take the fast path while the token is fresh. When it is missing or
/// stale, callers queue on `refresh_lock`; the first one performs the exchange
/// and the rest find the new token when they re-check under the lock.
pub struct TokenCache {
    source: Arc<dyn TokenSource>,
    current: RwLock<Option<AuthToken>>,
    refresh_lock: Mutex<()>,
}

impl TokenCache {
    pub fn new(source: Arc<dyn TokenSource>) -> Self {
        Self {
            source,
            current: RwLock::new(None),
            refresh_lock: Mutex::new(()),
        }
    }

    /// Returns a fresh token, exchanging credentials at most once for any
    /// number of concurrent callers.
    pub async fn get(&self) -> AppResult<AuthToken> {
        if let Some(token) = self.fresh_token().await {
            return Ok(token);
        }

        let _guard = self.refresh_lock.lock().await;

        if let Some(token) = self.fresh_token().await {
            return Ok(token);
        }

        tracing::debug!("Catalog token missing or expiring, refreshing");
        let token = self.source.exchange().await?;
        *self.current.write().await = Some(token.clone());

        Ok(token)
    }

    /// Drops `stale` after the catalog rejected it. A token that has already
    /// been replaced by another caller is left alone.
    pub async fn invalidate(&self, stale: &AuthToken) {
        let mut current = self.current.write().await;
        if current.as_ref() == Some(stale) {
            tracing::warn!("Catalog rejected access token, invalidating");
            *current = None;
        }
    }

    async fn fresh_token(&self) -> Option<AuthToken> {
        self.current
            .read()
            .await
            .as_ref()
            .filter(|token| token.is_fresh())
            .cloned()
    }
}
