//! Configuration loading and management.
//!
//! Loads pipe valves from `./pipes.toml` (or `$SEIPIPE_CONFIG_PATH`).
//! Environment variables override file values; file values override
//! defaults.
//!
//! Precedence: env vars > config file > defaults.

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::pipe::defi::DefiValves;
use crate::pipe::flow::FlowValves;
use crate::pipe::messaging::MessagingValves;

/// Top-level configuration: one valves block per pipe.
///
/// Path: `./pipes.toml` or `$SEIPIPE_CONFIG_PATH`.
/// Env vars override file values; file values override defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PipesConfig {
    /// DeFi agent pipe valves (`[defi]`).
    pub defi: DefiValves,
    /// Messaging pipe valves (`[messaging]`).
    pub messaging: MessagingValves,
    /// Agent-flow pipe valves (`[flow]`).
    pub flow: FlowValves,
}

impl PipesConfig {
    /// Load configuration with precedence: env vars > TOML file > defaults.
    ///
    /// If the file does not exist, returns defaults.
    ///
    /// # Errors
    ///
    /// Returns an error when the file exists but cannot be read or parsed.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from_file()?;
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Load from TOML file only, no env overrides.
    fn load_from_file() -> Result<Self> {
        let path = Self::config_path_with(|key| std::env::var(key).ok());
        match std::fs::read_to_string(&path) {
            Ok(contents) => {
                tracing::info!(path = %path.display(), "loading config from file");
                let config: PipesConfig =
                    toml::from_str(&contents).context("failed to parse config TOML")?;
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("no config file found, using defaults");
                Ok(PipesConfig::default())
            }
            Err(e) => Err(anyhow::anyhow!("failed to read config file: {e}")),
        }
    }

    /// Resolve the config path using a custom env resolver (for testing).
    fn config_path_with(env: impl Fn(&str) -> Option<String>) -> PathBuf {
        if let Some(p) = env("SEIPIPE_CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("pipes.toml")
    }

    /// Apply environment variable overrides (env > config > defaults).
    ///
    /// Takes a resolver function for testability.
    fn apply_overrides(&mut self, env: impl Fn(&str) -> Option<String>) {
        // DeFi agent.
        if let Some(v) = env("SEIPIPE_DEFI_URL") {
            self.defi.url = v;
        }

        // Messaging server.
        if let Some(v) = env("SEIPIPE_MESSAGING_URL") {
            self.messaging.url = v;
        }
        if let Some(v) = env("SEIPIPE_MESSAGING_CHANNEL") {
            self.messaging.channel_name = v;
        }
        if let Some(v) = env("SEIPIPE_MESSAGING_WAIT_SECS") {
            match v.parse() {
                Ok(n) => self.messaging.wait_time_seconds = n,
                Err(_) => tracing::warn!(
                    var = "SEIPIPE_MESSAGING_WAIT_SECS",
                    value = %v,
                    "ignoring invalid env override"
                ),
            }
        }

        // Flow server.
        if let Some(v) = env("SEIPIPE_FLOW_URL") {
            self.flow.url = v;
        }
        if let Some(v) = env("SEIPIPE_FLOW_INPUT_FIELD") {
            self.flow.input_field = v;
        }
        if let Some(v) = env("SEIPIPE_FLOW_RESPONSE_FIELD") {
            self.flow.response_field = v;
        }
    }

    /// Parse a TOML string into config (for testing).
    ///
    /// # Errors
    ///
    /// Returns an error when the TOML cannot be parsed.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: PipesConfig =
            toml::from_str(toml_str).context("failed to parse config TOML")?;
        Ok(config)
    }
}

// ── Tests ───────────────────────────────────────────────────────
