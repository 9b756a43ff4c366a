//! Scoped credential acquisition for remote backends.
//!
//! Every backend call acquires a [`CredentialLease`] from [`ScopedCredentials`]
//! and holds it for the duration of that call. The cached token is refreshed
//! on acquisition when it expires within the configured refresh margin, and
//! dropped when a backend rejects it. Refreshing is an ordinary part of a
//! call, not an error path.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use log::debug;
use reqwest::RequestBuilder;
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::error::{ComputeError, ComputeResult};

/// A bearer secret with an optional expiry.
#[derive(Debug, Clone, PartialEq)]
pub struct AccessToken {
    pub secret: String,
    pub expires_at: Option<DateTime<Utc>>,
}

impl AccessToken {
    /// Token that never expires (plain API keys).
    pub fn permanent(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            expires_at: None,
        }
    }

    pub fn expiring(secret: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            secret: secret.into(),
            expires_at: Some(expires_at),
        }
    }

    /// True when the token is expired or will be within `margin` of `now`.
    pub fn needs_refresh(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        match self.expires_at {
            Some(expires_at) => now + margin >= expires_at,
            None => false,
        }
    }
}

/// Source of fresh tokens.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn fetch_token(&self) -> ComputeResult<AccessToken>;
}

/// Hands out a fixed API key.
pub struct StaticTokenProvider {
    secret: String,
}

impl StaticTokenProvider {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn fetch_token(&self) -> ComputeResult<AccessToken> {
        Ok(AccessToken::permanent(self.secret.clone()))
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

/// Exchanges an API key for a short-lived access token.
pub struct ClientCredentialsProvider {
    client: reqwest::Client,
    token_url: String,
    api_key: String,
}

impl ClientCredentialsProvider {
    pub fn new(client: reqwest::Client, token_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client,
            token_url: token_url.into(),
            api_key: api_key.into(),
        }
    }
}

#[async_trait]
impl TokenProvider for ClientCredentialsProvider {
    async fn fetch_token(&self) -> ComputeResult<AccessToken> {
        let response = self
            .client
            .post(&self.token_url)
            .json(&serde_json::json!({ "api_key": self.api_key }))
            .send()
            .await
            .map_err(|e| ComputeError::Credentials(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ComputeError::Credentials(format!(
                "token endpoint returned {}",
                response.status()
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| ComputeError::Credentials(format!("invalid token response: {}", e)))?;
        Ok(AccessToken::expiring(
            token.access_token,
            Utc::now() + Duration::seconds(token.expires_in),
        ))
    }
}

/// Credentials held for the duration of one backend call.
#[derive(Debug, Clone)]
pub struct CredentialLease {
    token: Option<String>,
}

impl CredentialLease {
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Attach the token as `Authorization: Bearer`.
    pub fn bearer(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Attach the token as an `x-api-key` header.
    pub fn api_key(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.header("x-api-key", token),
            None => request,
        }
    }
}

/// Token cache with an explicit refresh policy.
pub struct ScopedCredentials {
    provider: Option<Arc<dyn TokenProvider>>,
    cached: Mutex<Option<AccessToken>>,
    refresh_margin: Duration,
}

impl ScopedCredentials {
    pub fn new(provider: Arc<dyn TokenProvider>, refresh_margin: Duration) -> Self {
        Self {
            provider: Some(provider),
            cached: Mutex::new(None),
            refresh_margin,
        }
    }

    /// No credentials; leases carry no token.
    pub fn anonymous() -> Self {
        Self {
            provider: None,
            cached: Mutex::new(None),
            refresh_margin: Duration::zero(),
        }
    }

    /// Static API key, or anonymous when the key is empty.
    pub fn from_api_key(api_key: Option<&str>) -> Self {
        match api_key.filter(|k| !k.is_empty()) {
            Some(key) => Self::new(Arc::new(StaticTokenProvider::new(key)), Duration::zero()),
            None => Self::anonymous(),
        }
    }

    /// Acquire credentials for one call, refreshing the token if needed.
    pub async fn acquire(&self) -> ComputeResult<CredentialLease> {
        let Some(provider) = &self.provider else {
            return Ok(CredentialLease { token: None });
        };

        let mut cached = self.cached.lock().await;
        let stale = cached
            .as_ref()
            .map(|token| token.needs_refresh(Utc::now(), self.refresh_margin))
            .unwrap_or(true);
        if stale {
            debug!("Refreshing backend access token");
            *cached = Some(provider.fetch_token().await?);
        }

        Ok(CredentialLease {
            token: cached.as_ref().map(|t| t.secret.clone()),
        })
    }

    /// Forget the cached token, e.g. after the backend rejected it.
    pub async fn invalidate(&self) {
        *self.cached.lock().await = None;
    }
}
