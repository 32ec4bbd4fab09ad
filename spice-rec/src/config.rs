//! Configuration resolution for spice-rec
//!
//! Builds the effective [`ServiceConfig`] from the TOML file model, the
//! process environment and command-line overrides.
//!
//! **Priority:** CLI → ENV → TOML → compiled defaults

use crate::models::CatalogKind;
use crate::services::PipelineSettings;
use spice_common::config::{require_setting, resolve_setting, SettingSource, TomlConfig};
use spice_common::{Error, Result};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

pub const LASTFM_API_KEY_ENV: &str = "LASTFM_API_KEY";
pub const LASTFM_SHARED_SECRET_ENV: &str = "LASTFM_SHARED_SECRET";
pub const LASTFM_APPLICATION_NAME_ENV: &str = "LASTFM_APPLICATION_NAME";
pub const SPOTIFY_CLIENT_ID_ENV: &str = "SPOTIFY_CLIENT_ID";
pub const SPOTIFY_CLIENT_SECRET_ENV: &str = "SPOTIFY_CLIENT_SECRET";

/// Last.fm API credentials
#[derive(Clone, PartialEq)]
pub struct LastfmCredentials {
    pub api_key: String,
    pub shared_secret: String,
    pub application_name: Option<String>,
}

/// Spotify client-credentials pair
#[derive(Clone, PartialEq)]
pub struct SpotifyCredentials {
    pub client_id: String,
    pub client_secret: String,
}

// Secrets stay out of logs
impl fmt::Debug for LastfmCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LastfmCredentials")
            .field("api_key", &"<redacted>")
            .field("shared_secret", &"<redacted>")
            .field("application_name", &self.application_name)
            .finish()
    }
}

impl fmt::Debug for SpotifyCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpotifyCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

/// Alternate catalog backing cross-catalog id resolution
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ResolutionCatalog {
    #[default]
    Deezer,
    Spotify,
}

impl ResolutionCatalog {
    pub fn kind(self) -> CatalogKind {
        match self {
            ResolutionCatalog::Deezer => CatalogKind::Deezer,
            ResolutionCatalog::Spotify => CatalogKind::Spotify,
        }
    }
}

impl FromStr for ResolutionCatalog {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "deezer" => Ok(ResolutionCatalog::Deezer),
            "spotify" => Ok(ResolutionCatalog::Spotify),
            other => Err(Error::Config(format!(
                "Unknown resolution_catalog '{}' (expected \"deezer\" or \"spotify\")",
                other
            ))),
        }
    }
}

/// Command-line values that take precedence over every other source
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub port: Option<u16>,
    pub bind_address: Option<String>,
}

/// Effective service configuration
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub bind_address: String,
    pub port: u16,
    pub log_level: String,
    pub lastfm: LastfmCredentials,
    pub spotify: Option<SpotifyCredentials>,
    pub pipeline: PipelineSettings,
    pub resolution_catalog: ResolutionCatalog,
}

fn describe(source: SettingSource) -> &'static str {
    match source {
        SettingSource::Environment => "environment variable",
        SettingSource::Toml => "TOML config",
    }
}

impl ServiceConfig {
    /// Resolve the effective configuration
    ///
    /// Fails when Last.fm credentials are missing, when Spotify is selected
    /// for resolution without credentials, or when a numeric limit is zero.
    pub fn resolve(toml: &TomlConfig, overrides: &CliOverrides) -> Result<Self> {
        let api_key = require_setting(
            LASTFM_API_KEY_ENV,
            toml.lastfm.api_key.as_deref(),
            "[lastfm] api_key",
        )?;
        info!("Last.fm API key loaded from {}", describe(api_key.source));

        let shared_secret = require_setting(
            LASTFM_SHARED_SECRET_ENV,
            toml.lastfm.shared_secret.as_deref(),
            "[lastfm] shared_secret",
        )?;

        let application_name = resolve_setting(
            LASTFM_APPLICATION_NAME_ENV,
            toml.lastfm.application_name.as_deref(),
        )
        .map(|s| s.value);

        let client_id = resolve_setting(SPOTIFY_CLIENT_ID_ENV, toml.spotify.client_id.as_deref());
        let client_secret = resolve_setting(
            SPOTIFY_CLIENT_SECRET_ENV,
            toml.spotify.client_secret.as_deref(),
        );

        let spotify = match (client_id, client_secret) {
            (Some(id), Some(secret)) => {
                info!("Spotify credentials loaded from {}", describe(id.source));
                Some(SpotifyCredentials {
                    client_id: id.value,
                    client_secret: secret.value,
                })
            }
            (None, None) => None,
            (Some(_), None) => {
                return Err(Error::Config(format!(
                    "{} is set but {} is missing",
                    SPOTIFY_CLIENT_ID_ENV, SPOTIFY_CLIENT_SECRET_ENV
                )))
            }
            (None, Some(_)) => {
                return Err(Error::Config(format!(
                    "{} is set but {} is missing",
                    SPOTIFY_CLIENT_SECRET_ENV, SPOTIFY_CLIENT_ID_ENV
                )))
            }
        };

        let resolution_catalog: ResolutionCatalog = toml.pipeline.resolution_catalog.parse()?;
        if resolution_catalog == ResolutionCatalog::Spotify && spotify.is_none() {
            return Err(Error::Config(format!(
                "resolution_catalog = \"spotify\" requires {} and {}",
                SPOTIFY_CLIENT_ID_ENV, SPOTIFY_CLIENT_SECRET_ENV
            )));
        }

        let pipeline = &toml.pipeline;
        if pipeline.worker_count == 0 {
            return Err(Error::Config("[pipeline] worker_count must be at least 1".to_string()));
        }
        if pipeline.upstream_timeout_secs == 0 || pipeline.pipeline_deadline_secs == 0 {
            return Err(Error::Config(
                "[pipeline] timeouts must be at least 1 second".to_string(),
            ));
        }

        Ok(Self {
            bind_address: overrides
                .bind_address
                .clone()
                .unwrap_or_else(|| toml.server.bind_address.clone()),
            port: overrides.port.unwrap_or(toml.server.port),
            log_level: toml.logging.level.clone(),
            lastfm: LastfmCredentials {
                api_key: api_key.value,
                shared_secret: shared_secret.value,
                application_name,
            },
            spotify,
            pipeline: PipelineSettings {
                worker_count: pipeline.worker_count,
                upstream_timeout: Duration::from_secs(pipeline.upstream_timeout_secs),
                deadline_ceiling: Duration::from_secs(pipeline.pipeline_deadline_secs),
            },
            resolution_catalog,
        })
    }

    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }
}
