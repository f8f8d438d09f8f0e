//! Shroud Configuration
//!
//! Shared configuration crate for all Shroud components.
//!
//! Handles loading configuration from:
//! 1. SHROUD_CONFIG env var (explicit path)
//! 2. ./config.toml (current directory)
//! 3. ~/.shroud/config.toml (user home)
//!
//! Environment variables take precedence over TOML config.

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::{env, fs};

const CONFIG_FILE_NAME: &str = "config.toml";
const CONFIG_DIR_NAME: &str = ".shroud";

// ============================================================================
// Default Constants
// ============================================================================

const DEFAULT_DB_PATH: &str = "./shroud-db";
const DEFAULT_TREE_HEIGHT: usize = 26;
const DEFAULT_ROOT_HISTORY: usize = 100;
const DEFAULT_RESYNC_INTERVAL_SECS: u64 = 60;
const DEFAULT_COMMAND_BUFFER: usize = 1000;

// ============================================================================
// Config Structs
// ============================================================================

/// Root configuration structure (matches TOML layout)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShroudConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub pool: PoolConfig,
    #[serde(default)]
    pub mirror: MirrorTomlConfig,
    #[serde(default)]
    pub verifier: VerifierConfig,
    #[serde(default)]
    pub features: FeatureFlags,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: DEFAULT_DB_PATH.into(),
        }
    }
}

fn default_db_path() -> String {
    DEFAULT_DB_PATH.into()
}

/// Pool identity and accumulator shape
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Base58 pool authority
    #[serde(default)]
    pub authority: Option<String>,
    /// Base58 asset identifier the pool custodies
    #[serde(default)]
    pub asset: Option<String>,
    #[serde(default = "default_tree_height")]
    pub height: usize,
    #[serde(default = "default_root_history")]
    pub root_history_size: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            authority: None,
            asset: None,
            height: DEFAULT_TREE_HEIGHT,
            root_history_size: DEFAULT_ROOT_HISTORY,
        }
    }
}

fn default_tree_height() -> usize {
    DEFAULT_TREE_HEIGHT
}
fn default_root_history() -> usize {
    DEFAULT_ROOT_HISTORY
}

/// Mirror service configuration (TOML format)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MirrorTomlConfig {
    #[serde(default = "default_resync_interval")]
    pub resync_interval_secs: u64,
    #[serde(default = "default_command_buffer")]
    pub command_buffer: usize,
}

impl Default for MirrorTomlConfig {
    fn default() -> Self {
        Self {
            resync_interval_secs: DEFAULT_RESYNC_INTERVAL_SECS,
            command_buffer: DEFAULT_COMMAND_BUFFER,
        }
    }
}

fn default_resync_interval() -> u64 {
    DEFAULT_RESYNC_INTERVAL_SECS
}
fn default_command_buffer() -> usize {
    DEFAULT_COMMAND_BUFFER
}

/// Proof verifier mode for TOML config
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum VerifierMode {
    #[default]
    Mock,
    Groth16,
}

impl FromStr for VerifierMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "mock" => Ok(Self::Mock),
            "groth16" => Ok(Self::Groth16),
            other => bail!("unknown verifier mode {:?} (expected mock or groth16)", other),
        }
    }
}

/// Proof verifier configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VerifierConfig {
    #[serde(default)]
    pub mode: VerifierMode,
    #[serde(default)]
    pub verifying_key_path: Option<String>,
}

/// Feature flags
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeatureFlags {
    /// Create the configured pool on startup if it does not exist
    #[serde(default)]
    pub dev_mode: bool,
}

// ============================================================================
// Override Helpers
// ============================================================================

/// Variable lookup; `env::var` in production, a map in tests
type Lookup<'a> = &'a dyn Fn(&str) -> Option<String>;

/// Set Option<String> from the variable if present
fn var_option_string(lookup: Lookup, key: &str, field: &mut Option<String>) {
    if let Some(v) = lookup(key) {
        *field = Some(v);
    }
}

/// Set field from the variable if present
fn var_string(lookup: Lookup, key: &str, field: &mut String) {
    if let Some(v) = lookup(key) {
        *field = v;
    }
}

/// Set field from the variable if present; a value that does not parse is an error
fn var_parse<T>(lookup: Lookup, key: &str, field: &mut T) -> Result<()>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    if let Some(v) = lookup(key) {
        *field = v
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid {}={:?}: {}", key, v, e))?;
    }
    Ok(())
}

/// Check if the variable is set to a truthy value ("1" or "true")
fn var_bool(lookup: Lookup, key: &str) -> Option<bool> {
    lookup(key).map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
}

// ============================================================================
// Implementation
// ============================================================================

impl ShroudConfig {
    /// Load configuration from config file with env var overrides
    pub fn load() -> Result<Self> {
        let mut config = match Self::find_config_file() {
            Some(path) => {
                log::info!("Loading config from: {}", path.display());
                Self::read_file(&path)?
            }
            None => {
                log::info!("No config file found, using defaults and environment variables");
                Self::default()
            }
        };

        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Load configuration from a specific file path
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        let mut config = Self::read_file(path)?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    fn read_file(path: &std::path::Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Find the config file path
    fn find_config_file() -> Option<PathBuf> {
        // 1. Check SHROUD_CONFIG env var
        if let Ok(path) = env::var("SHROUD_CONFIG") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        // 2. Check ./config.toml (current directory)
        let local_path = PathBuf::from(CONFIG_FILE_NAME);
        if local_path.exists() {
            return Some(local_path);
        }

        // 3. Check ~/.shroud/config.toml
        Self::default_config_path().filter(|p| p.exists())
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(&|key: &str| env::var(key).ok())
    }

    fn apply_overrides(&mut self, lookup: Lookup) -> Result<()> {
        var_string(lookup, "SHROUD_DB_PATH", &mut self.database.path);

        var_option_string(lookup, "SHROUD_AUTHORITY", &mut self.pool.authority);
        var_option_string(lookup, "SHROUD_ASSET", &mut self.pool.asset);
        var_parse(lookup, "SHROUD_TREE_HEIGHT", &mut self.pool.height)?;
        var_parse(lookup, "SHROUD_ROOT_HISTORY", &mut self.pool.root_history_size)?;

        var_parse(lookup, "SHROUD_RESYNC_SECS", &mut self.mirror.resync_interval_secs)?;

        var_parse(lookup, "SHROUD_VERIFIER_MODE", &mut self.verifier.mode)?;
        var_option_string(lookup, "SHROUD_VERIFYING_KEY", &mut self.verifier.verifying_key_path);

        if let Some(v) = var_bool(lookup, "SHROUD_DEV_MODE") {
            self.features.dev_mode = v;
        }
        Ok(())
    }

    /// Reject combinations the node must not run with.
    ///
    /// The mock verifier accepts proofs anyone can compute, so it is only
    /// allowed together with `features.dev_mode`.
    pub fn validate(&self) -> Result<()> {
        if self.verifier.mode == VerifierMode::Mock && !self.features.dev_mode {
            bail!("verifier.mode = \"mock\" requires features.dev_mode");
        }
        Ok(())
    }

    /// Get the default config file path
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    /// Generate a sample config file
    pub fn generate_sample() -> String {
        let mut sample = Self::default();
        sample.features.dev_mode = true;
        sample.pool.authority = Some("11111111111111111111111111111111".into());
        sample.pool.asset = Some("11111111111111111111111111111111".into());
        toml::to_string_pretty(&sample).unwrap_or_default()
    }
}

// ============================================================================
// Tests
// ============================================================================
