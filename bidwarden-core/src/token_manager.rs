//! Refresh-token grant implementation of the [`TokenManager`] trait.
//!
//! This module provides [`RefreshTokenManager`], which keeps one provider's
//! access token alive, and [`TokenManagers`], which wires both providers over
//! a shared credential store.
//!
//! # Refresh protocol
//!
//! 1. A cached token outside the 60 second expiry buffer is returned as is.
//! 2. Otherwise the current refresh token is decrypted from the store and
//!    exchanged at the provider's token endpoint.
//! 3. The new access token replaces the cache. A non-positive or
//!    overflowing `expires_in` is a malformed response. A positive lifetime
//!    shorter than the buffer is still returned once, since it has not
//!    expired, and the next call refreshes again.
//! 4. If the response carries a refresh token different from the one sent,
//!    it is encrypted and saved before the call returns. Providers with
//!    single-use refresh tokens have already invalidated the old one.
//!
//! Refreshes are serialized per manager: concurrent callers that find the
//! cache expired wait for the in-flight refresh and share its result,
//! success or failure, so one refresh token is never sent twice.
//!
//! # Example
//!
//! ```rust,no_run
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! use std::sync::Arc;
//! use bidwarden_core::{
//!     CredentialStore, FileBackend, ProviderConfig, ProviderKind,
//!     RefreshTokenManager, TokenManager,
//! };
//!
//! let store = Arc::new(CredentialStore::new(FileBackend::new("auth/tokens.json")));
//! let config = ProviderConfig::new(ProviderKind::Autodesk, "client-id", "client-secret", "key");
//! let manager = RefreshTokenManager::new(config, store);
//!
//! let token = manager.get_access_token().await?;
//! println!("Bearer {}", token.expose());
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;

use crate::config::{BidwardenConfig, ConfigError};
use crate::model::{ProviderId, Secret};
use crate::provider::{ProviderConfig, ProviderKind};
use crate::store::{CredentialStore, FileBackend, StorageBackend};
use crate::token::{
    CacheState, CachedToken, EXPIRY_BUFFER_MS, RefreshError, TokenError, TokenManager,
};

/// Lifetime assumed when the token endpoint omits `expires_in`.
pub const DEFAULT_EXPIRES_IN_SECS: i64 = 3600;

/// Timeout for a single token endpoint request.
pub const REFRESH_TIMEOUT: Duration = Duration::from_secs(30);

/// Body of a successful token endpoint response.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    refresh_token: Option<String>,
}

/// What happened to the refresh token during a refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rotation {
    /// The provider returned no refresh token, or the same one.
    Unchanged,

    /// The provider issued a new refresh token.
    Rotated {
        /// Whether the new token reached the credential store.
        persisted: bool,
    },
}

/// Result of a completed refresh.
#[derive(Debug, Clone)]
pub struct RefreshOutcome {
    pub access_token: Secret,

    /// Expiry as Unix epoch milliseconds.
    pub expires_at: i64,

    pub rotation: Rotation,
}

/// Result of the last completed refresh, handed to callers that waited on it.
type LastRefresh = Option<Result<CachedToken, RefreshError>>;

/// Expiry in epoch milliseconds for a token issued at `now_ms`.
///
/// A missing `expires_in` means one hour. Non-positive or overflowing values
/// are malformed responses.
fn expiry_from(now_ms: i64, expires_in: Option<i64>) -> Result<i64, RefreshError> {
    let expires_in = expires_in.unwrap_or(DEFAULT_EXPIRES_IN_SECS);
    if expires_in <= 0 {
        return Err(RefreshError::MalformedResponse {
            message: format!("expires_in must be positive, got {}", expires_in),
        });
    }

    expires_in
        .checked_mul(1000)
        .and_then(|lifetime_ms| now_ms.checked_add(lifetime_ms))
        .ok_or_else(|| RefreshError::MalformedResponse {
            message: format!("expires_in {} is out of range", expires_in),
        })
}

/// Token manager for one provider using the refresh-token grant.
///
/// # Type Parameters
///
/// * `B` - Storage backend of the shared credential store
pub struct RefreshTokenManager<B: StorageBackend> {
    config: ProviderConfig,
    store: Arc<CredentialStore<B>>,
    http_client: reqwest::Client,
    timeout: Duration,
    expiry_buffer_ms: i64,
    cache: RwLock<Option<CachedToken>>,
    refresh_lock: Mutex<LastRefresh>,
    completed_refreshes: AtomicU64,
}

impl<B: StorageBackend> RefreshTokenManager<B> {
    /// Create a manager with the default expiry buffer and request timeout.
    pub fn new(config: ProviderConfig, store: Arc<CredentialStore<B>>) -> Self {
        Self::with_http_client(config, store, reqwest::Client::new())
    }

    /// Create a manager that sends requests through `http_client`.
    pub fn with_http_client(
        config: ProviderConfig,
        store: Arc<CredentialStore<B>>,
        http_client: reqwest::Client,
    ) -> Self {
        Self {
            config,
            store,
            http_client,
            timeout: REFRESH_TIMEOUT,
            expiry_buffer_ms: EXPIRY_BUFFER_MS,
            cache: RwLock::new(None),
            refresh_lock: Mutex::new(None),
            completed_refreshes: AtomicU64::new(0),
        }
    }

    /// Override the token endpoint request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Provider configuration.
    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    /// The shared credential store.
    pub fn store(&self) -> &Arc<CredentialStore<B>> {
        &self.store
    }

    /// Refresh now regardless of cache state.
    ///
    /// Used to pre-rotate ahead of a scheduled run. Serialized with
    /// [`get_access_token`](TokenManager::get_access_token).
    pub async fn force_refresh(&self) -> Result<RefreshOutcome, TokenError> {
        let mut last = self.refresh_lock.lock().await;
        self.clear_cache();
        self.refresh_and_record(&mut last).await
    }

    fn clear_cache(&self) {
        *self.cache.write() = None;
    }

    fn cached_if_valid(&self) -> Option<CachedToken> {
        let now = Utc::now().timestamp_millis();
        self.cache
            .read()
            .as_ref()
            .filter(|token| token.is_valid_at(now, self.expiry_buffer_ms))
            .cloned()
    }

    /// Run one refresh and record its result for waiting callers.
    ///
    /// `last` is the contents of `refresh_lock`, which the caller holds.
    async fn refresh_and_record(
        &self,
        last: &mut LastRefresh,
    ) -> Result<RefreshOutcome, TokenError> {
        let result = self.refresh().await;
        *last = match &result {
            Ok(outcome) => Some(Ok(CachedToken {
                access_token: outcome.access_token.clone(),
                expires_at: outcome.expires_at,
                refresh_token: None,
            })),
            Err(TokenError::Refresh { source, .. }) => Some(Err(source.clone())),
            // Failures before any request was sent are safe to retry.
            Err(_) => None,
        };
        self.completed_refreshes.fetch_add(1, Ordering::SeqCst);
        result
    }

    /// Run one refresh. Callers must hold `refresh_lock`.
    async fn refresh(&self) -> Result<RefreshOutcome, TokenError> {
        let provider = &self.config.id;
        tracing::info!(provider = %provider, "Refreshing access token");

        let info = self.store.get_info(provider).await?;
        if info.exists {
            tracing::debug!(
                provider = %provider,
                last_updated = ?info.last_updated,
                token_length = info.plaintext_length,
                "Current stored refresh token"
            );
        }

        let refresh_token = self
            .store
            .load(provider, self.config.encryption_secret.expose())
            .await?
            .ok_or_else(|| TokenError::CredentialAbsent {
                provider: provider.to_string(),
            })?;

        let response = self
            .request_token(&refresh_token)
            .await
            .map_err(|source| TokenError::Refresh {
                provider: provider.to_string(),
                source,
            })?;

        let now = Utc::now().timestamp_millis();
        let expiry = expiry_from(now, response.expires_in);
        let access_token = Secret::new(response.access_token);
        let new_refresh_token = response.refresh_token.map(Secret::new);

        if let Ok(expires_at) = expiry {
            *self.cache.write() = Some(CachedToken {
                access_token: access_token.clone(),
                expires_at,
                refresh_token: new_refresh_token.clone(),
            });
            tracing::info!(
                provider = %provider,
                expires_in = ?response.expires_in,
                "Access token refreshed"
            );
            if expires_at - now <= self.expiry_buffer_ms {
                tracing::warn!(
                    provider = %provider,
                    lifetime_ms = expires_at - now,
                    "Access token lifetime is inside the expiry buffer"
                );
            }
        }

        // Persist a rotated refresh token even if the expiry is unusable.
        let rotation = match new_refresh_token {
            Some(new_token) if new_token != refresh_token => {
                let persisted = self.persist_rotation(&refresh_token, &new_token).await;
                Rotation::Rotated { persisted }
            }
            Some(_) => {
                tracing::debug!(provider = %provider, "Same refresh token returned, no rotation");
                Rotation::Unchanged
            }
            None => {
                if self.config.kind.rotates_refresh_token() {
                    tracing::warn!(
                        provider = %provider,
                        "Provider normally rotates refresh tokens but returned none"
                    );
                }
                Rotation::Unchanged
            }
        };

        let expires_at = expiry.map_err(|source| {
            tracing::error!(
                provider = %provider,
                "Token endpoint returned an unusable expiry: {}",
                source
            );
            TokenError::Refresh {
                provider: provider.to_string(),
                source,
            }
        })?;

        Ok(RefreshOutcome {
            access_token,
            expires_at,
            rotation,
        })
    }

    /// POST the refresh-token grant and parse the response.
    async fn request_token(
        &self,
        refresh_token: &Secret,
    ) -> Result<TokenResponse, RefreshError> {
        let params = [
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.expose()),
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token.expose()),
            ("scope", self.config.scope.as_str()),
        ];

        tracing::debug!(
            provider = %self.config.id,
            token_url = %self.config.token_url,
            scope = %self.config.scope,
            "Sending refresh grant"
        );

        let response = self
            .http_client
            .post(&self.config.token_url)
            .timeout(self.timeout)
            .form(&params)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| self.transport_error(e))?;

        if status != reqwest::StatusCode::OK {
            tracing::error!(
                provider = %self.config.id,
                status = status.as_u16(),
                "Token endpoint rejected refresh: {}",
                body
            );
            return Err(RefreshError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: TokenResponse =
            serde_json::from_str(&body).map_err(|e| RefreshError::MalformedResponse {
                message: e.to_string(),
            })?;
        if parsed.access_token.trim().is_empty() {
            return Err(RefreshError::MalformedResponse {
                message: "empty access_token".to_string(),
            });
        }

        Ok(parsed)
    }

    fn transport_error(&self, error: reqwest::Error) -> RefreshError {
        let timeout = error.is_timeout();
        tracing::warn!(
            provider = %self.config.id,
            timeout,
            "Network error contacting token endpoint: {}",
            error
        );
        RefreshError::Transport {
            message: error.to_string(),
            timeout,
        }
    }

    /// Save a rotated refresh token and verify it reads back.
    ///
    /// Failure is logged, never returned: the access token already obtained
    /// is valid and must still reach the caller.
    async fn persist_rotation(&self, old_token: &Secret, new_token: &Secret) -> bool {
        let provider = &self.config.id;
        let secret = self.config.encryption_secret.expose();

        tracing::info!(
            provider = %provider,
            old = %old_token.preview(),
            new = %new_token.preview(),
            new_length = new_token.char_len(),
            "Refresh token rotated, persisting"
        );

        if let Err(e) = self.store.save(provider, new_token.expose(), secret).await {
            tracing::error!(
                critical = true,
                provider = %provider,
                "Failed to persist rotated refresh token; re-authorization needed: {}",
                e
            );
            return false;
        }

        match self.store.load(provider, secret).await {
            Ok(Some(stored)) if stored == *new_token => {
                tracing::debug!(provider = %provider, "Rotated refresh token verified");
                true
            }
            Ok(stored) => {
                tracing::error!(
                    critical = true,
                    provider = %provider,
                    expected_length = new_token.char_len(),
                    stored_length = stored.as_ref().map(Secret::char_len),
                    "Rotated refresh token did not read back as written"
                );
                false
            }
            Err(e) => {
                tracing::error!(
                    critical = true,
                    provider = %provider,
                    "Rotated refresh token could not be read back: {}",
                    e
                );
                false
            }
        }
    }
}

#[async_trait]
impl<B: StorageBackend> TokenManager for RefreshTokenManager<B> {
    fn provider(&self) -> &ProviderId {
        &self.config.id
    }

    async fn get_access_token(&self) -> Result<Secret, TokenError> {
        if let Some(token) = self.cached_if_valid() {
            tracing::debug!(provider = %self.config.id, "Using cached access token");
            return Ok(token.access_token);
        }

        let observed = self.completed_refreshes.load(Ordering::SeqCst);
        let mut last = self.refresh_lock.lock().await;

        // Another caller may have refreshed while we waited.
        if let Some(token) = self.cached_if_valid() {
            tracing::debug!(
                provider = %self.config.id,
                "Using access token from concurrent refresh"
            );
            return Ok(token.access_token);
        }

        // A refresh finished while we waited: take its result instead of
        // sending the same refresh token again.
        if self.completed_refreshes.load(Ordering::SeqCst) != observed {
            match last.as_ref() {
                Some(Ok(token)) if token.expires_at > Utc::now().timestamp_millis() => {
                    return Ok(token.access_token.clone());
                }
                Some(Err(source)) => {
                    tracing::debug!(
                        provider = %self.config.id,
                        "Sharing failure of concurrent refresh"
                    );
                    return Err(TokenError::Refresh {
                        provider: self.config.id.to_string(),
                        source: source.clone(),
                    });
                }
                _ => {}
            }
        }

        Ok(self.refresh_and_record(&mut last).await?.access_token)
    }

    fn invalidate_cache(&self) {
        self.clear_cache();
    }

    fn cache_state(&self) -> CacheState {
        let now = Utc::now().timestamp_millis();
        match self.cache.read().as_ref() {
            None => CacheState::NoCache,
            Some(token) if token.is_valid_at(now, self.expiry_buffer_ms) => CacheState::Valid {
                expires_at: token.expires_at,
            },
            Some(token) => CacheState::Expired {
                expires_at: token.expires_at,
            },
        }
    }
}

impl<B: StorageBackend> std::fmt::Debug for RefreshTokenManager<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshTokenManager")
            .field("provider", &self.config.id)
            .field("token_url", &self.config.token_url)
            .field("cached", &self.cache.read().is_some())
            .finish()
    }
}

/// Token managers for every configured provider over one credential store.
pub struct TokenManagers<B: StorageBackend> {
    store: Arc<CredentialStore<B>>,
    managers: BTreeMap<ProviderKind, Arc<RefreshTokenManager<B>>>,
    missing: BTreeMap<ProviderKind, Vec<&'static str>>,
}

impl TokenManagers<FileBackend> {
    /// Build managers over the configured credential file.
    pub fn from_config(config: &BidwardenConfig) -> Self {
        let store = Arc::new(CredentialStore::new(FileBackend::new(
            config.credentials_path.clone(),
        )));
        Self::with_store(config, store)
    }
}

impl<B: StorageBackend> TokenManagers<B> {
    /// Build managers over an existing store.
    ///
    /// Providers with incomplete settings are recorded and reported when
    /// requested, so one unconfigured provider does not block the other.
    pub fn with_store(config: &BidwardenConfig, store: Arc<CredentialStore<B>>) -> Self {
        let mut managers = BTreeMap::new();
        let mut missing = BTreeMap::new();

        for kind in ProviderKind::ALL {
            match config.provider(kind) {
                Ok(provider_config) => {
                    managers.insert(
                        kind,
                        Arc::new(RefreshTokenManager::new(provider_config, Arc::clone(&store))),
                    );
                }
                Err(ConfigError::MissingFields { fields, .. }) => {
                    tracing::debug!(provider = %kind, ?fields, "Provider not configured");
                    missing.insert(kind, fields);
                }
                Err(e) => {
                    tracing::warn!(provider = %kind, "Provider configuration unusable: {}", e);
                    missing.insert(kind, Vec::new());
                }
            }
        }

        Self {
            store,
            managers,
            missing,
        }
    }

    /// The manager for `kind`.
    pub fn get(&self, kind: ProviderKind) -> Result<Arc<RefreshTokenManager<B>>, TokenError> {
        self.managers.get(&kind).cloned().ok_or_else(|| {
            TokenError::NotConfigured(ConfigError::MissingFields {
                provider: kind,
                fields: self.missing.get(&kind).cloned().unwrap_or_default(),
            })
        })
    }

    /// Kinds with a usable configuration.
    pub fn configured(&self) -> impl Iterator<Item = ProviderKind> + '_ {
        self.managers.keys().copied()
    }

    /// The shared credential store.
    pub fn store(&self) -> &Arc<CredentialStore<B>> {
        &self.store
    }
}
