//! Configuration module for Socksd
//!
//! This module provides configuration types and parsing for the server.

mod server;
mod suggest;

pub use server::{Config, ServerConfig, TcpConfig, MAX_RELAY_BUFFER_SIZE, MIN_RELAY_BUFFER_SIZE};
pub use suggest::Suggestion;

use anyhow::{Context, Result};
use std::path::Path;

/// Load configuration from a TOML file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let content = std::fs::read_to_string(path.as_ref())
        .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

    parse_config(&content)
}

/// Parse configuration from a TOML string
///
/// The result is validated; a config that parses but violates an invariant
/// (for example a username without a password) is rejected here.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse configuration")?;
    config.server.validate()?;
    Ok(config)
}
