//! bidwarden CLI
//!
//! Operator tooling for the bid reminder system's OAuth credentials.
//!
//! # Usage
//!
//! ```bash
//! # Store the refresh token obtained from interactive authorization
//! bidwarden import autodesk --token-stdin < refresh_token.txt
//!
//! # Show what is stored and configured
//! bidwarden status
//!
//! # Refresh both providers ahead of a scheduled run
//! bidwarden preflight
//! ```

use anyhow::{Context, Result};
use bidwarden_cli::commands;
use bidwarden_cli::{Cli, Command};
use bidwarden_core::{BidwardenConfig, TokenManagers};
use clap::Parser;
use std::io::{self, IsTerminal, Write};
use std::process::ExitCode;
use tracing_subscriber::{EnvFilter, fmt};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));
    fmt().with_env_filter(filter).with_writer(io::stderr).init();

    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("{}", commands::failure_message(&e));
            ExitCode::FAILURE
        }
    }
}

/// Run the command. `Ok(false)` means it completed but reported failures.
async fn run(cli: Cli) -> Result<bool> {
    let mut config =
        BidwardenConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
    if let Some(path) = cli.credentials {
        config.credentials_path = path;
    }
    tracing::debug!(
        credentials = %config.credentials_path.display(),
        config_file = ?config.config_path,
        "Configuration loaded"
    );

    let mut out = io::stdout().lock();

    match cli.command {
        Command::Import { provider, token_stdin } => {
            let stdin = io::stdin();
            if !token_stdin && stdin.is_terminal() {
                eprint!("Paste the {} refresh token, then press Ctrl-D: ", provider.display_name());
                io::stderr().flush()?;
            }
            let token = commands::read_token(stdin.lock())?;
            commands::import(&config, provider, &token, &mut out).await?;
        }
        Command::Status { format } => {
            commands::status(&config, format, &mut out).await?;
        }
        Command::Token { provider } => {
            let managers = TokenManagers::from_config(&config);
            commands::token(&managers, provider, &mut out).await?;
        }
        Command::Refresh { provider } => {
            let managers = TokenManagers::from_config(&config);
            commands::refresh(&managers, provider, &mut out).await?;
        }
        Command::Preflight => {
            let managers = TokenManagers::from_config(&config);
            return commands::preflight(&managers, &mut out).await;
        }
        Command::Delete { provider, force } => {
            commands::delete(&config, provider, force, io::stdin().lock(), &mut out).await?;
        }
        Command::GenerateSecret => {
            commands::generate(&mut out)?;
        }
    }

    Ok(true)
}
