//! Operator tooling for bidwarden.
//!
//! The binary in `main.rs` only parses arguments, installs logging and
//! dispatches; everything it runs lives here so it can be tested against a
//! temporary credential file and a mock token endpoint.

pub mod cli;
pub mod commands;

pub use cli::{Cli, Command, OutputFormat};
