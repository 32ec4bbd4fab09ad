//! Configuration loading and credential resolution
//!
//! Config file discovery follows this priority order:
//! 1. Command-line argument (highest priority)
//! 2. `SPICE_CONFIG` environment variable
//! 3. Per-user config file (`~/.config/spice/<module>.toml`)
//! 4. Compiled defaults (fallback)
//!
//! A missing or unreadable config file never terminates startup: the caller
//! gets compiled defaults plus the reason, and logs it once tracing is up.
//!
//! Secrets resolve ENV → TOML, see [`resolve_setting`].

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Environment variable naming an explicit config file
pub const CONFIG_PATH_ENV: &str = "SPICE_CONFIG";

/// Top-level TOML configuration file model
///
/// Every section is optional; absent values fall back to compiled defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub lastfm: LastfmConfig,
    pub spotify: SpotifyConfig,
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1".to_string(),
            port: 3000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive; `RUST_LOG` overrides it
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LastfmConfig {
    pub api_key: Option<String>,
    pub shared_secret: Option<String>,
    pub application_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpotifyConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Concurrent upstream calls per pipeline stage
    pub worker_count: usize,
    /// Per-call timeout applied by every catalog HTTP client
    pub upstream_timeout_secs: u64,
    /// Upper bound on the whole recommendation pipeline
    pub pipeline_deadline_secs: u64,
    /// Catalog used for cross-catalog id resolution ("deezer" or "spotify")
    pub resolution_catalog: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            worker_count: 4,
            upstream_timeout_secs: 10,
            pipeline_deadline_secs: 60,
            resolution_catalog: "deezer".to_string(),
        }
    }
}

/// Where the effective configuration came from
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigSource {
    /// Parsed from this file
    File(PathBuf),
    /// No usable file; compiled defaults in effect
    Defaults { reason: String },
}

/// Configuration plus its provenance
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: TomlConfig,
    pub source: ConfigSource,
}

/// Parse a TOML config file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))
}

/// Default per-user config file path for a module
pub fn default_config_path(module_name: &str) -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("spice").join(format!("{}.toml", module_name)))
}

/// Discover and load configuration with graceful degradation
///
/// An explicitly requested file (CLI or env) that fails to load is reported as
/// an error: the operator asked for it. The implicit per-user file falls back
/// to defaults when missing.
pub fn discover_config(cli_path: Option<&Path>, module_name: &str) -> Result<LoadedConfig> {
    let explicit = cli_path
        .map(Path::to_path_buf)
        .or_else(|| std::env::var(CONFIG_PATH_ENV).ok().map(PathBuf::from));

    if let Some(path) = explicit {
        let config = load_toml_config(&path)?;
        return Ok(LoadedConfig {
            config,
            source: ConfigSource::File(path),
        });
    }

    match default_config_path(module_name) {
        Some(path) if path.exists() => {
            let config = load_toml_config(&path)?;
            Ok(LoadedConfig {
                config,
                source: ConfigSource::File(path),
            })
        }
        Some(path) => Ok(LoadedConfig {
            config: TomlConfig::default(),
            source: ConfigSource::Defaults {
                reason: format!("{} not found", path.display()),
            },
        }),
        None => Ok(LoadedConfig {
            config: TomlConfig::default(),
            source: ConfigSource::Defaults {
                reason: "could not determine config directory".to_string(),
            },
        }),
    }
}

// ============================================================================
// Setting resolution
// ============================================================================

/// Source a resolved setting was taken from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingSource {
    Environment,
    Toml,
}

/// A setting value together with its source
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedSetting {
    pub value: String,
    pub source: SettingSource,
}

/// Resolve a setting from ENV → TOML
///
/// Blank values are treated as absent. Warns when both sources carry a value,
/// since that usually means a stale override.
pub fn resolve_setting(env_var: &str, toml_value: Option<&str>) -> Option<ResolvedSetting> {
    let env_value = std::env::var(env_var).ok().filter(|v| is_valid_key(v));
    let toml_value = toml_value.filter(|v| is_valid_key(v));

    if env_value.is_some() && toml_value.is_some() {
        warn!(
            setting = env_var,
            "Setting found in environment and TOML config. Using environment (highest priority)."
        );
    }

    env_value
        .map(|value| ResolvedSetting {
            value,
            source: SettingSource::Environment,
        })
        .or_else(|| {
            toml_value.map(|value| ResolvedSetting {
                value: value.to_string(),
                source: SettingSource::Toml,
            })
        })
}

/// Like [`resolve_setting`] but fails with a message naming both sources
pub fn require_setting(
    env_var: &str,
    toml_value: Option<&str>,
    toml_key: &str,
) -> Result<ResolvedSetting> {
    resolve_setting(env_var, toml_value).ok_or_else(|| {
        Error::Config(format!(
            "{} not configured. Please configure using one of:\n\
             1. Environment: {}=your-value\n\
             2. TOML config: {} = \"your-value\"",
            env_var, env_var, toml_key
        ))
    })
}

/// Validate key (non-empty, non-whitespace)
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}
