//! Application-level configuration loading: catalog endpoint, session limits and transport sizing.

use std::{env, fs, io::ErrorKind, path::PathBuf};

use serde::Deserialize;
use tracing::{info, warn};

use crate::state::room::Song;

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "NEON_GUESS_BACK_CONFIG_PATH";
/// Environment variable overriding the catalog search endpoint.
const CATALOG_ENDPOINT_ENV: &str = "PREVIEW_API";
/// Song search endpoint used when nothing else is configured.
const DEFAULT_CATALOG_ENDPOINT: &str = "https://itunes.apple.com/search?media=music&entity=song";
const DEFAULT_PORT: u16 = 8080;
/// Longest round a configuration may allow, in seconds.
const ROUND_DURATION_CEILING_SECS: u64 = 24 * 60 * 60;

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    /// Song catalog provider settings.
    pub catalog: CatalogConfig,
    /// Bounds applied to participant input and connections.
    pub limits: Limits,
    /// Send a rejection notice to the originating participant when an action is refused.
    pub notify_rejections: bool,
    /// HTTP listening port.
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
/// Where songs for new rooms come from.
pub struct CatalogConfig {
    /// Search endpoint queried with `term` and `limit` parameters.
    pub endpoint: String,
    /// Search term used when the creator names no artist.
    pub default_term: String,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
    /// Shuffle candidates before picking the songs of a room.
    pub shuffle: bool,
    /// Fixed song list; when non-empty the HTTP endpoint is not used.
    pub songs: Vec<Song>,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_CATALOG_ENDPOINT.into(),
            default_term: "pop".into(),
            timeout_secs: 10,
            shuffle: true,
            songs: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
/// Bounds applied to room creation and connections.
pub struct Limits {
    /// Maximum number of rounds a room can be created with.
    pub max_rounds: u32,
    /// Maximum round duration in seconds.
    pub max_round_duration_secs: u64,
    /// Frames buffered per participant before new ones are dropped.
    pub outbound_capacity: usize,
    /// Largest inbound WebSocket message accepted, in bytes.
    pub max_message_size: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_rounds: 50,
            max_round_duration_secs: 600,
            outbound_capacity: 256,
            max_message_size: 512,
        }
    }
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to built-in defaults,
    /// then apply environment overrides.
    pub fn load() -> Self {
        let path = resolve_config_path();
        let config = match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    info!(path = %path.display(), "loaded configuration file");
                    raw.into()
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        };

        config.with_env_overrides(|key| env::var(key).ok())
    }

    /// Apply `PREVIEW_API` and `PORT`/`SERVER_PORT` overrides read through `lookup`.
    fn with_env_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(endpoint) = lookup(CATALOG_ENDPOINT_ENV).filter(|value| !value.is_empty()) {
            self.catalog.endpoint = endpoint;
        }

        if let Some(port) = lookup("PORT")
            .or_else(|| lookup("SERVER_PORT"))
            .and_then(|value| value.parse::<u16>().ok())
        {
            self.port = port;
        }

        self
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            catalog: CatalogConfig::default(),
            limits: Limits::default(),
            notify_rejections: false,
            port: DEFAULT_PORT,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    catalog: Option<CatalogConfig>,
    limits: Option<Limits>,
    notify_rejections: Option<bool>,
    port: Option<u16>,
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        let defaults = Self::default();
        Self {
            catalog: value.catalog.unwrap_or(defaults.catalog),
            limits: value.limits.unwrap_or(defaults.limits).clamped(),
            notify_rejections: value.notify_rejections.unwrap_or(defaults.notify_rejections),
            port: value.port.unwrap_or(defaults.port),
        }
    }
}

impl Limits {
    /// Cap values that would otherwise let a single request overflow round deadlines.
    fn clamped(mut self) -> Self {
        if self.max_round_duration_secs > ROUND_DURATION_CEILING_SECS {
            warn!(
                configured = self.max_round_duration_secs,
                ceiling = ROUND_DURATION_CEILING_SECS,
                "maxRoundDurationSecs above ceiling; clamping"
            );
            self.max_round_duration_secs = ROUND_DURATION_CEILING_SECS;
        }
        self
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}
