//! Access-token types and the token manager contract.
//!
//! This module provides:
//! - [`CachedToken`] - The in-memory access token held by a manager
//! - [`CacheState`] - Observable state of a manager's cache
//! - [`TokenManager`] - Trait consumed by API clients
//! - [`TokenError`] / [`RefreshError`] - Failure taxonomy

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::cipher::DecryptionError;
use crate::config::ConfigError;
use crate::model::{ProviderId, Secret};
use crate::store::StoreError;

/// Tokens are treated as expired this long before their actual expiry.
pub const EXPIRY_BUFFER_MS: i64 = 60_000;

/// Why a refresh-token grant failed.
///
/// All variants surface to callers as [`TokenError::Refresh`]; the
/// distinction exists for logs and operator messages.
#[derive(Debug, Clone, Error)]
pub enum RefreshError {
    /// The token endpoint answered with a non-200 status.
    #[error("token endpoint returned HTTP {status}: {body}")]
    Rejected { status: u16, body: String },

    /// The request never got a response (DNS, connect, timeout).
    #[error("network error: {message}")]
    Transport { message: String, timeout: bool },

    /// The endpoint answered 200 with a body that is not a token response.
    #[error("malformed token response: {message}")]
    MalformedResponse { message: String },
}

impl RefreshError {
    /// Whether the provider reported the refresh token as unusable.
    pub fn is_invalid_grant(&self) -> bool {
        matches!(self, Self::Rejected { body, .. } if body.contains("invalid_grant"))
    }
}

/// Error type for token operations.
#[derive(Debug, Error)]
pub enum TokenError {
    /// No refresh token has been stored for this provider yet.
    #[error("no refresh token stored for {provider}")]
    CredentialAbsent { provider: String },

    /// The stored refresh token could not be decrypted.
    #[error("stored refresh token for {provider} could not be decrypted: {source}")]
    Decryption {
        provider: String,
        #[source]
        source: DecryptionError,
    },

    /// The provider rejected the refresh or could not be reached.
    #[error("token refresh for {provider} failed: {source}")]
    Refresh {
        provider: String,
        #[source]
        source: RefreshError,
    },

    /// The credential store could not be read.
    #[error("credential store error: {0}")]
    Store(#[source] StoreError),

    /// The provider has no usable configuration.
    #[error("{0}")]
    NotConfigured(#[from] ConfigError),
}

impl From<StoreError> for TokenError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::Decryption { provider, source } => Self::Decryption { provider, source },
            other => Self::Store(other),
        }
    }
}

/// Operator-facing classification of a [`TokenError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Credentials or settings were never provided.
    NotConfigured,

    /// Stored credential is corrupt or the encryption secret is wrong.
    Corrupted,

    /// Provider rejected the refresh token; interactive authorization is needed.
    RefreshRejected,

    /// Network trouble or a provider-side fault; a later attempt may succeed.
    Transient,
}

impl FailureKind {
    /// What the operator should do about it.
    pub fn remedy(self) -> &'static str {
        match self {
            Self::NotConfigured => "run setup to configure and import credentials",
            Self::Corrupted => "check the encryption secret, or re-import the refresh token",
            Self::RefreshRejected => {
                "redo interactive authorization and import the new refresh token"
            }
            Self::Transient => "retry later",
        }
    }
}

impl TokenError {
    /// Classify the error for user-facing reporting.
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            Self::CredentialAbsent { .. } | Self::NotConfigured(_) => FailureKind::NotConfigured,
            Self::Decryption { .. } => FailureKind::Corrupted,
            Self::Store(StoreError::Corrupt { .. }) => FailureKind::Corrupted,
            Self::Store(_) => FailureKind::Transient,
            Self::Refresh { source, .. } => match source {
                RefreshError::Rejected { status, .. } if *status >= 500 => FailureKind::Transient,
                RefreshError::Rejected { .. } => FailureKind::RefreshRejected,
                RefreshError::Transport { .. } | RefreshError::MalformedResponse { .. } => {
                    FailureKind::Transient
                }
            },
        }
    }
}

/// The access token a manager currently holds.
///
/// Replaced wholesale on every refresh and never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedToken {
    pub access_token: Secret,

    /// Expiry as Unix epoch milliseconds.
    pub expires_at: i64,

    /// Refresh token returned alongside the access token, if any.
    pub refresh_token: Option<Secret>,
}

impl CachedToken {
    /// Whether the token may still be used at `now_ms`, leaving `buffer_ms`
    /// of headroom before expiry.
    pub fn is_valid_at(&self, now_ms: i64, buffer_ms: i64) -> bool {
        now_ms < self.expires_at - buffer_ms
    }

    /// Expiry as a timestamp.
    pub fn expires_at_utc(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.expires_at)
    }
}

/// Observable state of a manager's cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    /// Nothing cached yet, or the cache was invalidated.
    NoCache,

    /// A token is cached and usable.
    Valid { expires_at: i64 },

    /// A token is cached but inside the expiry buffer or past expiry.
    Expired { expires_at: i64 },
}

/// Source of access tokens for one provider.
///
/// API clients call [`get_access_token`](TokenManager::get_access_token)
/// before every request and must not keep the token beyond that request.
///
/// # Example
///
/// ```rust,ignore
/// use bidwarden_core::{TokenManager, TokenError};
///
/// async fn auth_header(manager: &dyn TokenManager) -> Result<String, TokenError> {
///     let token = manager.get_access_token().await?;
///     Ok(format!("Bearer {}", token.expose()))
/// }
/// ```
#[async_trait]
pub trait TokenManager: Send + Sync {
    /// Credential entry this manager reads and rotates.
    fn provider(&self) -> &ProviderId;

    /// Get a valid access token, refreshing if necessary.
    ///
    /// Never returns a token inside the expiry buffer.
    async fn get_access_token(&self) -> Result<Secret, TokenError>;

    /// Drop the cached token so the next call refreshes.
    fn invalidate_cache(&self);

    /// Current cache state, without side effects.
    fn cache_state(&self) -> CacheState;
}
