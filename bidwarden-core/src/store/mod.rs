//! Encrypted refresh-token storage.
//!
//! This module provides:
//! - [`CredentialStore`] - Keyed storage of encrypted refresh tokens
//! - [`StorageBackend`] - Trait for where the credential document lives
//! - [`FileBackend`] - JSON file with atomic replace-on-write
//! - [`MemoryBackend`] - In-memory implementation for testing
//!
//! # Document Format
//!
//! The whole store is one JSON document keyed by provider, plus a reserved
//! `_metadata` entry:
//!
//! ```json
//! {
//!   "autodesk": {
//!     "encrypted_refresh_token": "9f2c...:41ab...",
//!     "last_updated": "2024-05-01T12:00:00+00:00",
//!     "token_length": 64
//!   },
//!   "_metadata": { "last_updated": "2024-05-01T12:00:00+00:00", "version": "1.0" }
//! }
//! ```
//!
//! Entries are replaced wholesale on every save and never partially updated.
//! The store assumes a single writing process; concurrent writers in other
//! processes race last-writer-wins.
//!
//! # Example
//!
//! ```rust,ignore
//! use bidwarden_core::store::{CredentialStore, MemoryBackend};
//! use bidwarden_core::ProviderId;
//!
//! let store = CredentialStore::new(MemoryBackend::new());
//! let provider = ProviderId::new("msgraph");
//!
//! store.save(&provider, "refresh-token-abc123", "test-key").await?;
//! let token = store.load(&provider, "test-key").await?;
//! assert_eq!(token.unwrap().expose(), "refresh-token-abc123");
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::cipher::{self, DecryptionError};
use crate::model::{ProviderId, Secret};

mod file;
mod memory;

pub use file::FileBackend;
pub use memory::MemoryBackend;

/// Version written into the document metadata.
pub const FORMAT_VERSION: &str = "1.0";

/// Error type for credential store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Reading or writing the backing storage failed.
    #[error("I/O error on {location}: {source}")]
    Io {
        location: String,
        #[source]
        source: std::io::Error,
    },

    /// The stored document exists but cannot be parsed.
    #[error("credential document at {location} is corrupt: {source}")]
    Corrupt {
        location: String,
        #[source]
        source: serde_json::Error,
    },

    /// The document could not be serialized.
    #[error("failed to serialize credential document: {0}")]
    Serialize(#[source] serde_json::Error),

    /// A stored blob is present but does not decrypt.
    #[error("stored credential for {provider} could not be decrypted: {source}")]
    Decryption {
        provider: String,
        #[source]
        source: DecryptionError,
    },
}

/// Persisted state for one provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoredCredential {
    /// `iv:ciphertext` blob of the refresh token.
    #[serde(rename = "encrypted_refresh_token", default)]
    pub encrypted_blob: String,

    /// When this entry was last written.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,

    /// Length of the plaintext token in characters.
    #[serde(rename = "token_length", default)]
    pub plaintext_length: usize,
}

impl StoredCredential {
    /// Whether the entry carries a non-blank encrypted blob.
    pub fn has_content(&self) -> bool {
        !self.encrypted_blob.trim().is_empty()
    }
}

/// Metadata for the whole document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub last_updated: DateTime<Utc>,
    pub version: String,
}

/// The full credential document as stored by a backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CredentialDocument {
    #[serde(rename = "_metadata", default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<DocumentMetadata>,

    #[serde(flatten)]
    pub entries: BTreeMap<String, StoredCredential>,
}

/// Metadata-only view of a stored credential. Never carries token material.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CredentialInfo {
    /// True only if a non-blank encrypted blob is stored.
    pub exists: bool,

    pub last_updated: Option<DateTime<Utc>>,

    pub plaintext_length: usize,

    pub encrypted_length: usize,
}

impl From<&StoredCredential> for CredentialInfo {
    fn from(entry: &StoredCredential) -> Self {
        Self {
            exists: entry.has_content(),
            last_updated: entry.last_updated,
            plaintext_length: entry.plaintext_length,
            encrypted_length: entry.encrypted_blob.len(),
        }
    }
}

/// Where the serialized credential document lives.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Read the raw document.
    ///
    /// Returns `Ok(None)` if nothing has been written yet.
    async fn read(&self) -> Result<Option<String>, StoreError>;

    /// Replace the raw document.
    ///
    /// Implementations must never leave a partially written document behind.
    async fn write(&self, contents: &str) -> Result<(), StoreError>;

    /// Human-readable location used in logs and errors.
    fn location(&self) -> String;
}

/// Keyed storage of encrypted refresh tokens.
///
/// Load-modify-write cycles are serialized within the process, so two saves
/// for different providers never drop each other's entry.
pub struct CredentialStore<B: StorageBackend> {
    backend: B,
    write_lock: Mutex<()>,
}

impl<B: StorageBackend> CredentialStore<B> {
    /// Create a store over the given backend.
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            write_lock: Mutex::new(()),
        }
    }

    /// The underlying backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Encrypt `plaintext` and replace the entry for `provider`.
    ///
    /// Failure leaves the previous document intact. Callers holding a token
    /// obtained in the same call should keep using it and alert on the error.
    pub async fn save(
        &self,
        provider: &ProviderId,
        plaintext: &str,
        secret: &str,
    ) -> Result<(), StoreError> {
        let encrypted_blob = cipher::encrypt(plaintext, secret);
        let entry = StoredCredential {
            encrypted_blob,
            last_updated: Some(Utc::now()),
            plaintext_length: plaintext.chars().count(),
        };

        let _guard = self.write_lock.lock().await;
        let result = self.replace_entry(provider, entry).await;

        match &result {
            Ok(()) => tracing::info!(
                provider = %provider,
                token_length = plaintext.chars().count(),
                "Saved encrypted refresh token to {}",
                self.backend.location()
            ),
            Err(e) => tracing::error!(
                provider = %provider,
                "Failed to save refresh token to {}: {}",
                self.backend.location(),
                e
            ),
        }

        result
    }

    /// Load and decrypt the refresh token for `provider`.
    ///
    /// Returns `Ok(None)` when the provider has no entry or a blank one. A
    /// blob that fails to decrypt is [`StoreError::Decryption`], never `None`.
    pub async fn load(
        &self,
        provider: &ProviderId,
        secret: &str,
    ) -> Result<Option<Secret>, StoreError> {
        let document = self.load_document().await?;

        let Some(entry) = document.entries.get(provider.as_str()) else {
            tracing::warn!(provider = %provider, "No stored refresh token");
            return Ok(None);
        };

        if !entry.has_content() {
            tracing::warn!(provider = %provider, "Stored refresh token is empty");
            return Ok(None);
        }

        let plaintext = cipher::decrypt(entry.encrypted_blob.trim(), secret).map_err(|source| {
            StoreError::Decryption {
                provider: provider.to_string(),
                source,
            }
        })?;

        tracing::debug!(
            provider = %provider,
            token_length = plaintext.chars().count(),
            last_updated = ?entry.last_updated,
            "Loaded refresh token"
        );

        Ok(Some(Secret::new(plaintext)))
    }

    /// Metadata for `provider` without decrypting anything.
    pub async fn get_info(&self, provider: &ProviderId) -> Result<CredentialInfo, StoreError> {
        let document = self.load_document().await?;
        Ok(document
            .entries
            .get(provider.as_str())
            .map(CredentialInfo::from)
            .unwrap_or_default())
    }

    /// Metadata for every stored provider, skipping reserved keys.
    pub async fn list(&self) -> Result<BTreeMap<ProviderId, CredentialInfo>, StoreError> {
        let document = self.load_document().await?;
        Ok(document
            .entries
            .iter()
            .filter(|(key, _)| !key.starts_with('_'))
            .map(|(key, entry)| (ProviderId::new(key.as_str()), CredentialInfo::from(entry)))
            .collect())
    }

    /// Remove the entry for `provider`.
    ///
    /// Returns `Ok(())` even if the entry didn't exist.
    pub async fn delete(&self, provider: &ProviderId) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut document = self.load_document().await?;

        if document.entries.remove(provider.as_str()).is_none() {
            tracing::debug!(provider = %provider, "No stored credential to delete");
            return Ok(());
        }

        self.write_document(&mut document).await?;
        tracing::info!(provider = %provider, "Deleted stored credential");
        Ok(())
    }

    async fn replace_entry(
        &self,
        provider: &ProviderId,
        entry: StoredCredential,
    ) -> Result<(), StoreError> {
        let mut document = self.load_document().await?;
        document.entries.insert(provider.as_str().to_string(), entry);
        self.write_document(&mut document).await
    }

    async fn load_document(&self) -> Result<CredentialDocument, StoreError> {
        let Some(contents) = self.backend.read().await? else {
            return Ok(CredentialDocument::default());
        };
        if contents.trim().is_empty() {
            return Ok(CredentialDocument::default());
        }

        serde_json::from_str(&contents).map_err(|source| StoreError::Corrupt {
            location: self.backend.location(),
            source,
        })
    }

    async fn write_document(&self, document: &mut CredentialDocument) -> Result<(), StoreError> {
        document.metadata = Some(DocumentMetadata {
            last_updated: Utc::now(),
            version: FORMAT_VERSION.to_string(),
        });
        let contents = serde_json::to_string_pretty(document).map_err(StoreError::Serialize)?;
        self.backend.write(&contents).await
    }
}

impl<B: StorageBackend + std::fmt::Debug> std::fmt::Debug for CredentialStore<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialStore")
            .field("backend", &self.backend)
            .finish()
    }
}
