//! # Configuration
//!
//! Runtime settings for the request core and the server binary.
//!
//! Values are resolved in three layers, later layers winning:
//!
//! 1. Built-in defaults
//! 2. An optional YAML file (`gebeta serve --config gebeta.yaml`)
//! 3. Environment variables
//!
//! ## Environment Variables
//!
//! | Variable                 | Meaning                                    | Default                 |
//! |--------------------------|--------------------------------------------|-------------------------|
//! | `GEBETA_MAX_BODY_BYTES`  | JSON body limit, decimal or `0x` hex       | `1048576` (1 MiB)       |
//! | `GEBETA_ALLOWED_ORIGINS` | Comma-separated CORS allow-list            | localhost:3000 / :5173  |
//! | `GEBETA_ENV`             | `production` hides stack traces            | unset (development)     |
//! | `GEBETA_STACK_SIZE`      | Coroutine stack size, decimal or `0x` hex  | `0x10000` (64 KB)       |
//! | `GEBETA_ADDR`            | Listen address for `gebeta serve`          | `127.0.0.1:5000`        |
//!
//! An invalid value is logged and the previous layer's value is kept.
//!
//! ## Example File
//!
//! ```yaml
//! max_body_bytes: 0x100000
//! allowed_origins:
//!   - https://gebeta.example
//! is_production: true
//! addr: 0.0.0.0:8080
//! ```

use std::env;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::warn;

use crate::middleware::DEFAULT_MAX_BODY_BYTES;

/// Default coroutine stack size (64 KB).
pub const DEFAULT_STACK_SIZE: usize = 0x10000;

/// Default listen address of the server binary.
pub const DEFAULT_ADDR: &str = "127.0.0.1:5000";

/// Origins allowed when nothing else is configured (local dev frontends).
pub const DEFAULT_ALLOWED_ORIGINS: [&str; 2] = ["http://localhost:3000", "http://localhost:5173"];

/// Settings consumed by [`crate::App::with_defaults`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreConfig {
    /// Maximum accepted JSON body in bytes
    pub max_body_bytes: usize,
    /// Exact-match CORS allow-list
    pub allowed_origins: Vec<String>,
    /// Omit `stack` from error envelopes
    pub is_production: bool,
    /// Stack size for request coroutines in bytes
    pub stack_size: usize,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            allowed_origins: DEFAULT_ALLOWED_ORIGINS.iter().map(ToString::to_string).collect(),
            is_production: false,
            stack_size: DEFAULT_STACK_SIZE,
        }
    }
}

/// [`CoreConfig`] plus where to listen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub core: CoreConfig,
    pub addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            core: CoreConfig::default(),
            addr: DEFAULT_ADDR.to_string(),
        }
    }
}

/// On-disk shape; every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    max_body_bytes: Option<SizeValue>,
    allowed_origins: Option<Vec<String>>,
    is_production: Option<bool>,
    stack_size: Option<SizeValue>,
    addr: Option<String>,
}

/// A byte count written as an integer or as a `0x` hex string.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SizeValue {
    Number(usize),
    Text(String),
}

impl SizeValue {
    fn resolve(&self) -> Option<usize> {
        match self {
            SizeValue::Number(n) => Some(*n),
            SizeValue::Text(s) => parse_size(s),
        }
    }
}

/// Parse a byte count given in decimal or `0x`-prefixed hex.
///
/// Zero is rejected: neither the body limit nor the stack size can be 0.
#[must_use]
pub fn parse_size(raw: &str) -> Option<usize> {
    let raw = raw.trim();
    let parsed = match raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        Some(hex) => usize::from_str_radix(hex, 16).ok(),
        None => raw.parse().ok(),
    };
    parsed.filter(|n| *n > 0)
}

/// Split a comma-separated origin list, dropping empty entries.
#[must_use]
pub fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect()
}

impl ServerConfig {
    /// Defaults overlaid with the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env(|key| env::var(key).ok());
        config
    }

    /// Defaults, then the optional YAML file, then the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid YAML for
    /// the expected keys.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = Self::default();
        if let Some(path) = path {
            config.apply_file(path)?;
        }
        config.apply_env(|key| env::var(key).ok());
        Ok(config)
    }

    /// Overlay values from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn apply_file(&mut self, path: &Path) -> Result<()> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let file: FileConfig = serde_yaml::from_str(&text)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        if let Some(v) = file.max_body_bytes {
            match v.resolve() {
                Some(n) => self.core.max_body_bytes = n,
                None => warn!(key = "max_body_bytes", value = ?v, "Invalid config value - keeping default"),
            }
        }
        if let Some(origins) = file.allowed_origins {
            self.core.allowed_origins = origins;
        }
        if let Some(p) = file.is_production {
            self.core.is_production = p;
        }
        if let Some(v) = file.stack_size {
            match v.resolve() {
                Some(n) => self.core.stack_size = n,
                None => warn!(key = "stack_size", value = ?v, "Invalid config value - keeping default"),
            }
        }
        if let Some(addr) = file.addr {
            self.addr = addr;
        }
        Ok(())
    }

    /// Overlay values from an environment lookup. Tests pass a closure over
    /// a map instead of touching the process environment.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup("GEBETA_MAX_BODY_BYTES") {
            match parse_size(&raw) {
                Some(n) => self.core.max_body_bytes = n,
                None => warn!(key = "GEBETA_MAX_BODY_BYTES", value = %raw, "Invalid value - keeping default"),
            }
        }
        if let Some(raw) = lookup("GEBETA_ALLOWED_ORIGINS") {
            let origins = parse_origins(&raw);
            if origins.is_empty() {
                warn!(key = "GEBETA_ALLOWED_ORIGINS", "Empty origin list - keeping default");
            } else {
                self.core.allowed_origins = origins;
            }
        }
        if let Some(raw) = lookup("GEBETA_ENV") {
            self.core.is_production = raw.trim().eq_ignore_ascii_case("production");
        }
        if let Some(raw) = lookup("GEBETA_STACK_SIZE") {
            match parse_size(&raw) {
                Some(n) => self.core.stack_size = n,
                None => warn!(key = "GEBETA_STACK_SIZE", value = %raw, "Invalid value - keeping default"),
            }
        }
        if let Some(raw) = lookup("GEBETA_ADDR") {
            let raw = raw.trim();
            if !raw.is_empty() {
                self.addr = raw.to_string();
            }
        }
    }
}
