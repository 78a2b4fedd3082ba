//! Provider kinds and per-provider token-endpoint configuration.
//!
//! This module provides:
//! - [`ProviderKind`] - The two fixed OAuth providers and their defaults
//! - [`ProviderConfig`] - Everything a token manager needs for one provider
//!
//! Only the refresh-token grant is supported, against exactly these two
//! token endpoints.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::model::{ProviderId, Secret};

/// Default Autodesk token endpoint.
pub const AUTODESK_TOKEN_URL: &str = "https://developer.api.autodesk.com/authentication/v2/token";

/// Scope sent with Autodesk refresh grants.
pub const AUTODESK_REFRESH_SCOPE: &str = "data:read data:write";

/// Default Microsoft identity platform token endpoint.
pub const MICROSOFT_TOKEN_URL: &str = "https://login.microsoftonline.com/common/oauth2/v2.0/token";

/// Scope sent with Microsoft refresh grants.
pub const MICROSOFT_SCOPE: &str = "Mail.Read Mail.Send Mail.ReadWrite";

/// The OAuth providers bidwarden knows how to refresh against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Autodesk Platform Services, which fronts the BuildingConnected
    /// construction-bidding API. Refresh tokens are single-use.
    Autodesk,

    /// Microsoft identity platform for Graph mail. Refresh tokens are
    /// reusable.
    Microsoft,
}

impl ProviderKind {
    /// All supported providers.
    pub const ALL: [ProviderKind; 2] = [ProviderKind::Autodesk, ProviderKind::Microsoft];

    /// Key of this provider's entry in the credential file.
    pub fn storage_key(self) -> &'static str {
        match self {
            Self::Autodesk => "autodesk",
            Self::Microsoft => "microsoft",
        }
    }

    /// Human-readable name.
    pub fn display_name(self) -> &'static str {
        match self {
            Self::Autodesk => "Autodesk (BuildingConnected)",
            Self::Microsoft => "Microsoft Graph",
        }
    }

    pub fn default_token_url(self) -> &'static str {
        match self {
            Self::Autodesk => AUTODESK_TOKEN_URL,
            Self::Microsoft => MICROSOFT_TOKEN_URL,
        }
    }

    pub fn default_scope(self) -> &'static str {
        match self {
            Self::Autodesk => AUTODESK_REFRESH_SCOPE,
            Self::Microsoft => MICROSOFT_SCOPE,
        }
    }

    /// Whether the provider invalidates a refresh token once it is used.
    pub fn rotates_refresh_token(self) -> bool {
        matches!(self, Self::Autodesk)
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.storage_key())
    }
}

/// Error returned when parsing an unknown provider name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown provider '{0}' (expected autodesk or microsoft)")]
pub struct ParseProviderError(String);

impl FromStr for ProviderKind {
    type Err = ParseProviderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "autodesk" | "buildingconnected" | "bc" => Ok(Self::Autodesk),
            "microsoft" | "msgraph" | "graph" | "ms" => Ok(Self::Microsoft),
            other => Err(ParseProviderError(other.to_string())),
        }
    }
}

/// Configuration for one provider's token manager.
///
/// Built once at startup from [`crate::config::BidwardenConfig`] and passed
/// to the manager's constructor.
///
/// # Example
///
/// ```
/// use bidwarden_core::provider::{ProviderConfig, ProviderKind, AUTODESK_TOKEN_URL};
///
/// let config = ProviderConfig::new(ProviderKind::Autodesk, "client-id", "client-secret", "key");
/// assert_eq!(config.id.as_str(), "autodesk");
/// assert_eq!(config.token_url, AUTODESK_TOKEN_URL);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderConfig {
    /// Key of the credential entry this manager reads and rotates.
    pub id: ProviderId,

    pub kind: ProviderKind,

    /// OAuth token endpoint URL.
    pub token_url: String,

    /// Scope sent with each refresh grant.
    pub scope: String,

    pub client_id: String,

    pub client_secret: Secret,

    /// Secret the stored refresh token is encrypted under.
    pub encryption_secret: Secret,
}

impl ProviderConfig {
    /// Create a configuration with the provider's default endpoint and scope.
    pub fn new(
        kind: ProviderKind,
        client_id: impl Into<String>,
        client_secret: impl Into<Secret>,
        encryption_secret: impl Into<Secret>,
    ) -> Self {
        Self {
            id: ProviderId::new(kind.storage_key()),
            kind,
            token_url: kind.default_token_url().to_string(),
            scope: kind.default_scope().to_string(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            encryption_secret: encryption_secret.into(),
        }
    }

    /// Set the token URL.
    pub fn with_token_url(mut self, url: impl Into<String>) -> Self {
        self.token_url = url.into();
        self
    }

    /// Set the refresh scope.
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = scope.into();
        self
    }

    /// Use a different credential entry key.
    pub fn with_id(mut self, id: impl Into<ProviderId>) -> Self {
        self.id = id.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_kind_parsing() {
        assert_eq!("autodesk".parse::<ProviderKind>().unwrap(), ProviderKind::Autodesk);
        assert_eq!("BuildingConnected".parse::<ProviderKind>().unwrap(), ProviderKind::Autodesk);
        assert_eq!("msgraph".parse::<ProviderKind>().unwrap(), ProviderKind::Microsoft);
        assert_eq!(" Microsoft ".parse::<ProviderKind>().unwrap(), ProviderKind::Microsoft);
        assert!("github".parse::<ProviderKind>().is_err());
    }

    #[test]
    fn test_provider_defaults() {
        let autodesk = ProviderConfig::new(ProviderKind::Autodesk, "id", "secret", "key");
        assert_eq!(autodesk.id.as_str(), "autodesk");
        assert_eq!(autodesk.token_url, AUTODESK_TOKEN_URL);
        assert_eq!(autodesk.scope, "data:read data:write");
        assert!(autodesk.kind.rotates_refresh_token());

        let microsoft = ProviderConfig::new(ProviderKind::Microsoft, "id", "secret", "key");
        assert_eq!(microsoft.id.as_str(), "microsoft");
        assert_eq!(microsoft.token_url, MICROSOFT_TOKEN_URL);
        assert_eq!(microsoft.scope, "Mail.Read Mail.Send Mail.ReadWrite");
        assert!(!microsoft.kind.rotates_refresh_token());
    }

    #[test]
    fn test_provider_config_builders() {
        let config = ProviderConfig::new(ProviderKind::Microsoft, "id", "secret", "key")
            .with_token_url("http://localhost/token")
            .with_scope("offline_access")
            .with_id("msgraph");

        assert_eq!(config.token_url, "http://localhost/token");
        assert_eq!(config.scope, "offline_access");
        assert_eq!(config.id.as_str(), "msgraph");
    }

    #[test]
    fn test_provider_config_debug_redacts_secrets() {
        let config = ProviderConfig::new(ProviderKind::Autodesk, "id", "hunter2", "passphrase");
        let debug = format!("{:?}", config);
        assert!(!debug.contains("hunter2"));
        assert!(!debug.contains("passphrase"));
    }
}
