//! Top-level error types for bidwarden.

use thiserror::Error;

use crate::cipher::DecryptionError;
use crate::config::ConfigError;
use crate::store::StoreError;
use crate::token::{FailureKind, TokenError};

/// Top-level error type encompassing all bidwarden errors.
#[derive(Debug, Error)]
pub enum BidwardenError {
    /// Error from decrypting a credential blob.
    #[error("decryption error: {0}")]
    Decryption(#[from] DecryptionError),

    /// Error from credential store operations.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Error from token operations.
    #[error("token error: {0}")]
    Token(#[from] TokenError),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl BidwardenError {
    /// Classify the error for operator-facing reporting.
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            Self::Decryption(_) => FailureKind::Corrupted,
            Self::Store(StoreError::Corrupt { .. } | StoreError::Decryption { .. }) => {
                FailureKind::Corrupted
            }
            Self::Store(_) => FailureKind::Transient,
            Self::Token(e) => e.failure_kind(),
            Self::Config(_) => FailureKind::NotConfigured,
        }
    }
}
