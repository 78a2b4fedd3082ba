//! # Bidwarden Core
//!
//! Core library for keeping the bid reminder system's OAuth2 access tokens
//! alive without an operator in the loop.
//!
//! This crate provides:
//! - AES-256-CBC encryption of refresh tokens at rest
//! - A credential store that replaces its file atomically on every write
//! - Token managers for Autodesk (BuildingConnected) and Microsoft Graph
//!   that cache access tokens, refresh them behind a 60 second buffer, and
//!   persist rotated refresh tokens before handing out the new access token
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use bidwarden_core::{BidwardenConfig, ProviderKind, TokenManager, TokenManagers};
//!
//! async fn bearer() -> Result<String, Box<dyn std::error::Error>> {
//!     let config = BidwardenConfig::load(None)?;
//!     let managers = TokenManagers::from_config(&config);
//!     let token = managers.get(ProviderKind::Autodesk)?.get_access_token().await?;
//!     Ok(format!("Bearer {}", token.expose()))
//! }
//! ```

pub mod cipher;
pub mod config;
pub mod error;
pub mod model;
pub mod provider;
pub mod store;
pub mod token;
pub mod token_manager;

// Re-export commonly used types at crate root
pub use model::{
    ProviderId,
    Secret,
};

pub use cipher::{
    DecryptionError,
    decrypt,
    encrypt,
    generate_secret,
};

pub use config::{
    BidwardenConfig,
    ConfigError,
};

pub use provider::{
    ProviderConfig,
    ProviderKind,
};

pub use store::{
    CredentialInfo,
    CredentialStore,
    FileBackend,
    MemoryBackend,
    StorageBackend,
    StoreError,
};

pub use token::{
    CacheState,
    CachedToken,
    FailureKind,
    RefreshError,
    TokenError,
    TokenManager,
};

pub use token_manager::{
    RefreshOutcome,
    RefreshTokenManager,
    Rotation,
    TokenManagers,
};

pub use error::BidwardenError;
