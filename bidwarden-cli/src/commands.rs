//! Command implementations.
//!
//! Each command writes its normal output to the supplied writer and returns
//! errors to the caller, which decides how to report them.

use anyhow::{Context, Result, bail};
use bidwarden_core::config::EnvVars;
use bidwarden_core::{
    BidwardenConfig, ConfigError, CredentialInfo, CredentialStore, FileBackend, ProviderId,
    ProviderKind, Rotation, TokenError, TokenManager, TokenManagers, generate_secret,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::io::{BufRead, Read, Write};

use crate::cli::OutputFormat;

/// Open the credential store named by `config`.
pub fn open_store(config: &BidwardenConfig) -> CredentialStore<FileBackend> {
    CredentialStore::new(FileBackend::new(config.credentials_path.clone()))
}

/// Read a refresh token from `input`.
///
/// Surrounding whitespace is dropped; an empty token is an error.
pub fn read_token(mut input: impl BufRead) -> Result<String> {
    let mut token = String::new();
    input
        .read_to_string(&mut token)
        .context("failed to read refresh token from stdin")?;

    let token = token.trim();
    if token.is_empty() {
        bail!("no refresh token provided on stdin");
    }
    Ok(token.to_string())
}

/// Encrypt and store an initial refresh token for `kind`.
pub async fn import(
    config: &BidwardenConfig,
    kind: ProviderKind,
    token: &str,
    out: &mut impl Write,
) -> Result<()> {
    let secret = config.encryption_secret(kind).ok_or_else(|| ConfigError::MissingFields {
        provider: kind,
        fields: vec![EnvVars::for_provider(kind).encryption_secret],
    })?;

    let store = open_store(config);
    let provider = ProviderId::new(kind.storage_key());
    store
        .save(&provider, token, secret.expose())
        .await
        .with_context(|| format!("failed to store refresh token for {}", kind))?;

    // Read back before declaring success.
    let stored = store
        .load(&provider, secret.expose())
        .await
        .context("stored refresh token could not be read back")?;
    if stored.as_ref().map(|s| s.expose()) != Some(token) {
        bail!("stored refresh token for {} did not read back as written", kind);
    }

    writeln!(
        out,
        "Stored refresh token for {} ({} chars) in {}",
        kind.display_name(),
        token.chars().count(),
        config.credentials_path.display()
    )?;
    Ok(())
}

#[derive(Debug, Serialize)]
struct StatusReport {
    credentials_path: String,
    providers: Vec<ProviderStatus>,
}

#[derive(Debug, Serialize)]
struct ProviderStatus {
    provider: String,
    configured: bool,
    stored: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_updated: Option<DateTime<Utc>>,
    token_length: usize,
}

impl ProviderStatus {
    fn new(provider: String, configured: bool, info: &CredentialInfo) -> Self {
        Self {
            provider,
            configured,
            stored: info.exists,
            last_updated: info.last_updated,
            token_length: info.plaintext_length,
        }
    }
}

/// Report stored credential metadata and provider configuration.
///
/// Never decrypts anything, so it works without encryption secrets.
pub async fn status(
    config: &BidwardenConfig,
    format: OutputFormat,
    out: &mut impl Write,
) -> Result<()> {
    let store = open_store(config);
    let mut stored = store.list().await.context("failed to read credential store")?;

    let mut providers = Vec::new();
    for kind in ProviderKind::ALL {
        let info = stored
            .remove(&ProviderId::new(kind.storage_key()))
            .unwrap_or_default();
        providers.push(ProviderStatus::new(
            kind.storage_key().to_string(),
            config.is_configured(kind),
            &info,
        ));
    }
    // Entries written under other keys.
    for (id, info) in &stored {
        providers.push(ProviderStatus::new(id.to_string(), false, info));
    }

    let report = StatusReport {
        credentials_path: config.credentials_path.display().to_string(),
        providers,
    };

    match format {
        OutputFormat::Json => {
            serde_json::to_writer_pretty(&mut *out, &report)?;
            writeln!(out)?;
        }
        OutputFormat::Text => {
            writeln!(out, "Credential file: {}", report.credentials_path)?;
            for provider in &report.providers {
                let stored = if provider.stored {
                    format!(
                        "stored ({} chars, updated {})",
                        provider.token_length,
                        provider
                            .last_updated
                            .map(|t| t.to_rfc3339())
                            .unwrap_or_else(|| "unknown".to_string())
                    )
                } else {
                    "no refresh token".to_string()
                };
                let configured = if provider.configured {
                    "configured"
                } else {
                    "not configured"
                };
                writeln!(out, "  {:<10} {:<15} {}", provider.provider, configured, stored)?;
            }
        }
    }
    Ok(())
}

/// Print a valid access token for `kind`.
pub async fn token(
    managers: &TokenManagers<FileBackend>,
    kind: ProviderKind,
    out: &mut impl Write,
) -> Result<()> {
    let manager = managers.get(kind)?;
    let token = manager.get_access_token().await?;
    writeln!(out, "{}", token.expose())?;
    Ok(())
}

/// Force a refresh for `kind` and report what happened to the refresh token.
pub async fn refresh(
    managers: &TokenManagers<FileBackend>,
    kind: ProviderKind,
    out: &mut impl Write,
) -> Result<()> {
    let manager = managers.get(kind)?;
    let outcome = manager.force_refresh().await?;

    let expires = DateTime::from_timestamp_millis(outcome.expires_at)
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| outcome.expires_at.to_string());
    writeln!(out, "{}: access token valid until {}", kind.display_name(), expires)?;

    match outcome.rotation {
        Rotation::Unchanged => writeln!(out, "  refresh token unchanged")?,
        Rotation::Rotated { persisted: true } => {
            writeln!(out, "  refresh token rotated and saved")?
        }
        Rotation::Rotated { persisted: false } => {
            bail!(
                "refresh token for {} rotated but could not be saved; re-import it",
                kind
            )
        }
    }
    Ok(())
}

/// Refresh every provider and report each outcome.
///
/// Returns `true` only if every provider refreshed successfully. A provider
/// without configuration counts as a failure.
pub async fn preflight(
    managers: &TokenManagers<FileBackend>,
    out: &mut impl Write,
) -> Result<bool> {
    let mut all_ok = true;

    for kind in ProviderKind::ALL {
        let result = match managers.get(kind) {
            Ok(manager) => manager.force_refresh().await,
            Err(e) => Err(e),
        };

        match result {
            Ok(outcome) => {
                let rotation = match outcome.rotation {
                    Rotation::Unchanged => "",
                    Rotation::Rotated { persisted: true } => ", refresh token rotated",
                    Rotation::Rotated { persisted: false } => {
                        all_ok = false;
                        ", refresh token rotated but NOT saved"
                    }
                };
                writeln!(out, "[ok]   {}{}", kind.display_name(), rotation)?;
            }
            Err(e) => {
                all_ok = false;
                writeln!(out, "[fail] {}: authentication failed: {}", kind.display_name(), e)?;
                writeln!(out, "       {}", e.failure_kind().remedy())?;
            }
        }
    }

    Ok(all_ok)
}

/// Remove the stored credential for `kind`.
///
/// Without `force`, asks for confirmation on `confirm`.
pub async fn delete(
    config: &BidwardenConfig,
    kind: ProviderKind,
    force: bool,
    confirm: impl BufRead,
    out: &mut impl Write,
) -> Result<()> {
    if !force {
        write!(out, "Delete stored refresh token for {}? [y/N] ", kind.display_name())?;
        out.flush()?;

        let mut answer = String::new();
        confirm.take(64).read_line(&mut answer)?;
        if !matches!(answer.trim().to_lowercase().as_str(), "y" | "yes") {
            writeln!(out, "Aborted")?;
            return Ok(());
        }
    }

    open_store(config)
        .delete(&ProviderId::new(kind.storage_key()))
        .await
        .with_context(|| format!("failed to delete credential for {}", kind))?;
    writeln!(out, "Deleted stored refresh token for {}", kind.display_name())?;
    Ok(())
}

/// Print a new encryption secret.
pub fn generate(out: &mut impl Write) -> Result<()> {
    writeln!(out, "{}", generate_secret())?;
    Ok(())
}

/// Operator-facing message for a failed command.
///
/// Token failures are reported as `authentication failed` with a remedy.
pub fn failure_message(err: &anyhow::Error) -> String {
    let token_error = err.chain().find_map(|e| e.downcast_ref::<TokenError>());
    match token_error {
        Some(e) => format!(
            "authentication failed: {}\n  {}",
            e,
            e.failure_kind().remedy()
        ),
        None => format!("error: {:#}", err),
    }
}
