//! Application-level configuration loading for the recalculation and cache tunables.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "LEADERBOARD_BACK_CONFIG_PATH";

const DEFAULT_RECALCULATION_INTERVAL_SECS: u64 = 180;
const DEFAULT_TOP_LIMIT: usize = 10;
const DEFAULT_MAX_TOP_LIMIT: usize = 100;
const DEFAULT_CACHE_TTL_SECS: u64 = 3600;
const DEFAULT_CACHE_PURGE_INTERVAL_SECS: u64 = 60;
/// Upper bound applied to every configured duration.
const MAX_DURATION_SECS: u64 = 7 * 24 * 3600;

#[derive(Debug, Clone, PartialEq, Eq)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    /// Delay between two scheduled rank recalculations.
    pub recalculation_interval: Duration,
    /// Size of the top leaderboard served when no limit is requested.
    pub top_limit: usize,
    /// Largest top leaderboard a client may request.
    pub max_top_limit: usize,
    /// Lifetime of cached leaderboard projections.
    pub cache_ttl: Duration,
    /// Delay between two sweeps of expired cache entries.
    pub cache_purge_interval: Duration,
    /// Skip scheduled recalculations when no score was submitted since the last run.
    pub recalculate_only_when_dirty: bool,
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match Self::from_json(&contents) {
                Ok(app_config) => {
                    info!(
                        path = %path.display(),
                        interval_secs = app_config.recalculation_interval.as_secs(),
                        top_limit = app_config.top_limit,
                        "loaded leaderboard config"
                    );
                    app_config
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
        }
    }

    /// Parse a JSON document, keeping defaults for omitted or zero values.
    pub fn from_json(contents: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str::<RawConfig>(contents).map(Into::into)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            recalculation_interval: Duration::from_secs(DEFAULT_RECALCULATION_INTERVAL_SECS),
            top_limit: DEFAULT_TOP_LIMIT,
            max_top_limit: DEFAULT_MAX_TOP_LIMIT,
            cache_ttl: Duration::from_secs(DEFAULT_CACHE_TTL_SECS),
            cache_purge_interval: Duration::from_secs(DEFAULT_CACHE_PURGE_INTERVAL_SECS),
            recalculate_only_when_dirty: false,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    recalculation_interval_secs: Option<u64>,
    top_limit: Option<usize>,
    max_top_limit: Option<usize>,
    cache_ttl_secs: Option<u64>,
    cache_purge_interval_secs: Option<u64>,
    recalculate_only_when_dirty: Option<bool>,
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        let defaults = Self::default();
        let secs = |raw: Option<u64>, fallback: Duration| {
            raw.filter(|secs| *secs > 0)
                .map(|secs| Duration::from_secs(secs.min(MAX_DURATION_SECS)))
                .unwrap_or(fallback)
        };

        let top_limit = value
            .top_limit
            .filter(|limit| *limit > 0)
            .unwrap_or(defaults.top_limit);
        let max_top_limit = value
            .max_top_limit
            .filter(|limit| *limit > 0)
            .unwrap_or(defaults.max_top_limit)
            .max(top_limit);

        Self {
            recalculation_interval: secs(
                value.recalculation_interval_secs,
                defaults.recalculation_interval,
            ),
            top_limit,
            max_top_limit,
            cache_ttl: secs(value.cache_ttl_secs, defaults.cache_ttl),
            cache_purge_interval: secs(
                value.cache_purge_interval_secs,
                defaults.cache_purge_interval,
            ),
            recalculate_only_when_dirty: value
                .recalculate_only_when_dirty
                .unwrap_or(defaults.recalculate_only_when_dirty),
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}
