//! Command-line argument definitions.

use bidwarden_core::ProviderKind;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "bidwarden")]
#[command(about = "OAuth token lifecycle tooling for the bid reminder system")]
#[command(version)]
pub struct Cli {
    /// Configuration file (defaults to the platform config directory)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Encrypted credential file, overriding config and environment
    #[arg(long, global = true, value_name = "PATH")]
    pub credentials: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Encrypt and store an initial refresh token read from stdin
    Import {
        /// Provider (autodesk, microsoft)
        provider: ProviderKind,

        /// Read the token from stdin without prompting
        #[arg(long)]
        token_stdin: bool,
    },

    /// Show stored credentials and provider configuration
    Status {
        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Print a valid access token
    Token {
        /// Provider (autodesk, microsoft)
        provider: ProviderKind,
    },

    /// Refresh now, rotating the stored refresh token if the provider does
    Refresh {
        /// Provider (autodesk, microsoft)
        provider: ProviderKind,
    },

    /// Refresh every provider and report which ones are usable
    Preflight,

    /// Remove a stored credential
    Delete {
        /// Provider (autodesk, microsoft)
        provider: ProviderKind,

        /// Skip confirmation prompt
        #[arg(short, long)]
        force: bool,
    },

    /// Print a new random encryption secret
    GenerateSecret,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}
