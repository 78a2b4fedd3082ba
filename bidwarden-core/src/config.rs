//! Configuration loading.
//!
//! Configuration is assembled once at process startup from, in increasing
//! precedence: built-in defaults, an optional TOML file, and environment
//! variables. Library code never reads the environment on its own; the
//! resulting [`BidwardenConfig`] is turned into one [`ProviderConfig`] per
//! provider and handed to the token managers.
//!
//! # File format
//!
//! ```toml
//! credentials_path = "/var/lib/bidwarden/tokens.json"
//!
//! [autodesk]
//! client_id = "..."
//! client_secret = "..."
//! encryption_secret = "..."
//!
//! [microsoft]
//! client_id = "..."
//! client_secret = "..."
//! encryption_secret = "..."
//! scope = "Mail.Read Mail.Send Mail.ReadWrite"
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::model::Secret;
use crate::provider::{ProviderConfig, ProviderKind};
use crate::store::FileBackend;

/// Environment variable overriding the credential file location.
pub const CREDENTIALS_FILE_VAR: &str = "BIDWARDEN_CREDENTIALS_FILE";

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read config from {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid TOML.
    #[error("failed to parse config from {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// A provider is missing required settings.
    #[error("{provider} is not configured; missing {}", fields.join(", "))]
    MissingFields {
        provider: ProviderKind,
        fields: Vec<&'static str>,
    },
}

/// Environment variable names for one provider.
#[derive(Debug, Clone, Copy)]
pub struct EnvVars {
    pub client_id: &'static str,
    pub client_secret: &'static str,
    pub encryption_secret: &'static str,
    pub token_url: &'static str,
    pub scope: &'static str,
}

impl EnvVars {
    /// Variable names recognized for `kind`.
    pub fn for_provider(kind: ProviderKind) -> Self {
        match kind {
            ProviderKind::Autodesk => Self {
                client_id: "AUTODESK_CLIENT_ID",
                client_secret: "AUTODESK_CLIENT_SECRET",
                encryption_secret: "AUTODESK_ENCRYPTION_KEY",
                token_url: "AUTODESK_TOKEN_URL",
                scope: "AUTODESK_REFRESH_SCOPE",
            },
            ProviderKind::Microsoft => Self {
                client_id: "MS_CLIENT_ID",
                client_secret: "MS_CLIENT_SECRET",
                encryption_secret: "ENCRYPTION_KEY",
                token_url: "MICROSOFT_TOKEN_URL",
                scope: "MICROSOFT_SCOPE",
            },
        }
    }
}

/// Settings for one provider as read from file and environment.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderSettings {
    pub client_id: Option<String>,
    pub client_secret: Option<Secret>,
    pub encryption_secret: Option<Secret>,
    pub token_url: Option<String>,
    pub scope: Option<String>,
}

impl ProviderSettings {
    /// Overlay non-empty values from the environment.
    fn apply_env(&mut self, vars: EnvVars, lookup: &impl Fn(&str) -> Option<String>) {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(v) = get(vars.client_id) {
            self.client_id = Some(v);
        }
        if let Some(v) = get(vars.client_secret) {
            self.client_secret = Some(Secret::new(v));
        }
        if let Some(v) = get(vars.encryption_secret) {
            self.encryption_secret = Some(Secret::new(v));
        }
        if let Some(v) = get(vars.token_url) {
            self.token_url = Some(v);
        }
        if let Some(v) = get(vars.scope) {
            self.scope = Some(v);
        }
    }

    /// Names of the required settings that are absent or blank.
    fn missing_fields(&self, vars: EnvVars) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.client_id.as_deref().is_none_or(|v| v.trim().is_empty()) {
            missing.push(vars.client_id);
        }
        if self.client_secret.as_ref().is_none_or(Secret::is_blank) {
            missing.push(vars.client_secret);
        }
        if self.encryption_secret.as_ref().is_none_or(Secret::is_blank) {
            missing.push(vars.encryption_secret);
        }
        missing
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BidwardenConfig {
    /// Path of the encrypted credential file.
    #[serde(default = "default_credentials_path")]
    pub credentials_path: PathBuf,

    #[serde(default)]
    pub autodesk: ProviderSettings,

    #[serde(default)]
    pub microsoft: ProviderSettings,

    /// Path to the configuration file that was loaded, if any.
    #[serde(skip)]
    pub config_path: Option<PathBuf>,
}

fn default_credentials_path() -> PathBuf {
    FileBackend::default_path().unwrap_or_else(|| PathBuf::from("auth/tokens.json"))
}

impl Default for BidwardenConfig {
    fn default() -> Self {
        Self {
            credentials_path: default_credentials_path(),
            autodesk: ProviderSettings::default(),
            microsoft: ProviderSettings::default(),
            config_path: None,
        }
    }
}

impl BidwardenConfig {
    /// Default configuration file location.
    pub fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "bidwarden", "bidwarden")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Load configuration from the process environment and a config file.
    ///
    /// An explicit `path` must exist. Without one, the default location is
    /// used if present.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_config_path().filter(|p| p.exists()) {
                Some(default) => Self::from_file(&default)?,
                None => Self::default(),
            },
        };
        config.apply_env(|name| std::env::var(name).ok());
        Ok(config)
    }

    /// Read configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: Self = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.config_path = Some(path.to_path_buf());
        Ok(config)
    }

    /// Overlay environment variables, looked up through `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(path) = lookup(CREDENTIALS_FILE_VAR).filter(|v| !v.trim().is_empty()) {
            self.credentials_path = PathBuf::from(path);
        }
        for kind in ProviderKind::ALL {
            self.settings_mut(kind)
                .apply_env(EnvVars::for_provider(kind), &lookup);
        }
    }

    /// Raw settings for `kind`.
    pub fn settings(&self, kind: ProviderKind) -> &ProviderSettings {
        match kind {
            ProviderKind::Autodesk => &self.autodesk,
            ProviderKind::Microsoft => &self.microsoft,
        }
    }

    fn settings_mut(&mut self, kind: ProviderKind) -> &mut ProviderSettings {
        match kind {
            ProviderKind::Autodesk => &mut self.autodesk,
            ProviderKind::Microsoft => &mut self.microsoft,
        }
    }

    /// Whether every required setting for `kind` is present.
    pub fn is_configured(&self, kind: ProviderKind) -> bool {
        self.settings(kind)
            .missing_fields(EnvVars::for_provider(kind))
            .is_empty()
    }

    /// Build the token manager configuration for `kind`.
    pub fn provider(&self, kind: ProviderKind) -> Result<ProviderConfig, ConfigError> {
        let settings = self.settings(kind);
        let missing = settings.missing_fields(EnvVars::for_provider(kind));
        if !missing.is_empty() {
            return Err(ConfigError::MissingFields {
                provider: kind,
                fields: missing,
            });
        }

        let mut config = ProviderConfig::new(
            kind,
            settings.client_id.clone().unwrap_or_default(),
            settings.client_secret.clone().unwrap_or_default(),
            settings.encryption_secret.clone().unwrap_or_default(),
        );
        if let Some(url) = settings.token_url.as_deref().filter(|v| !v.trim().is_empty()) {
            config = config.with_token_url(url);
        }
        if let Some(scope) = settings.scope.as_deref().filter(|v| !v.trim().is_empty()) {
            config = config.with_scope(scope);
        }
        Ok(config)
    }

    /// The encryption secret for `kind`, if set.
    pub fn encryption_secret(&self, kind: ProviderKind) -> Option<&Secret> {
        self.settings(kind)
            .encryption_secret
            .as_ref()
            .filter(|s| !s.is_blank())
    }
}
