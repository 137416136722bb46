//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (SHULBOARD_*)
//! 2. TOML config file (if SHULBOARD_CONFIG_FILE set)
//! 3. Built-in defaults
//!
//! One flat config covers both binaries: the kiosk gateway reads the
//! `listen_addr`/`upstream_origin`/cache fields, the content backend reads
//! the `content_*` fields. Unused fields are harmless in either process.

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

mod validation;

pub use validation::ConfigError;

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (SHULBOARD_*)
/// 2. TOML config file (if SHULBOARD_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Address the gateway listens on.
    ///
    /// Set via SHULBOARD_LISTEN_ADDR environment variable.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Origin the board is served from; origin-form requests are rebased
    /// onto it and responses whose final URL leaves it are stored opaque.
    ///
    /// Set via SHULBOARD_UPSTREAM_ORIGIN environment variable.
    #[serde(default = "default_upstream_origin")]
    pub upstream_origin: String,

    /// Path to the gateway's SQLite cache database.
    ///
    /// Set via SHULBOARD_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Version tag partitioning all cache tiers. Bumping it on deploy is
    /// the sole supported mechanism for forced cache invalidation.
    ///
    /// Set via SHULBOARD_CACHE_VERSION environment variable.
    #[serde(default = "default_cache_version")]
    pub cache_version: String,

    /// Routes primed into the static tier at install time. The first entry
    /// is also the navigation fallback page.
    ///
    /// Set via SHULBOARD_SHELL_ROUTES environment variable.
    #[serde(default = "default_shell_routes")]
    pub shell_routes: Vec<String>,

    /// Max age for cached images (runtime tier), in seconds.
    ///
    /// Set via SHULBOARD_MAX_AGE_IMAGE_SECS environment variable.
    #[serde(default = "default_max_age_image_secs")]
    pub max_age_image_secs: u64,

    /// Max age for cached scripts/styles/fonts (static tier), in seconds.
    ///
    /// Set via SHULBOARD_MAX_AGE_STATIC_SECS environment variable.
    #[serde(default = "default_max_age_static_secs")]
    pub max_age_static_secs: u64,

    /// Max age for cached data/API responses (runtime tier), in seconds.
    ///
    /// Set via SHULBOARD_MAX_AGE_DATA_SECS environment variable.
    #[serde(default = "default_max_age_data_secs")]
    pub max_age_data_secs: u64,

    /// Upstream fetch timeout in milliseconds. Bounds how long a hung
    /// origin can stall a request before the cached fallback takes over.
    ///
    /// Set via SHULBOARD_FETCH_TIMEOUT_MS environment variable.
    #[serde(default = "default_fetch_timeout_ms")]
    pub fetch_timeout_ms: u64,

    /// Maximum bytes to fetch per upstream response.
    ///
    /// Set via SHULBOARD_MAX_BYTES environment variable.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,

    /// User-Agent string for upstream requests.
    ///
    /// Set via SHULBOARD_USER_AGENT environment variable.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Address the content backend listens on.
    ///
    /// Set via SHULBOARD_CONTENT_LISTEN_ADDR environment variable.
    #[serde(default = "default_content_listen_addr")]
    pub content_listen_addr: String,

    /// Path to the content backend's SQLite database.
    ///
    /// Set via SHULBOARD_CONTENT_DB_PATH environment variable.
    #[serde(default = "default_content_db_path")]
    pub content_db_path: PathBuf,

    /// Optional HTML file served as the app shell root page; the built-in
    /// placeholder is used when unset.
    ///
    /// Set via SHULBOARD_SHELL_FILE environment variable.
    #[serde(default)]
    pub shell_file: Option<PathBuf>,
}

fn default_listen_addr() -> String {
    "127.0.0.1:8080".into()
}

fn default_upstream_origin() -> String {
    "http://127.0.0.1:9090".into()
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./shulboard-cache.sqlite")
}

fn default_cache_version() -> String {
    "v1".into()
}

fn default_shell_routes() -> Vec<String> {
    vec!["/".into()]
}

fn default_max_age_image_secs() -> u64 {
    604_800 // 7 days
}

fn default_max_age_static_secs() -> u64 {
    2_592_000 // 30 days
}

fn default_max_age_data_secs() -> u64 {
    7_200 // 2 hours
}

fn default_fetch_timeout_ms() -> u64 {
    20_000
}

fn default_max_bytes() -> usize {
    5_242_880 // 5MB
}

fn default_user_agent() -> String {
    "shulboard-gateway/0.1".into()
}

fn default_content_listen_addr() -> String {
    "127.0.0.1:9090".into()
}

fn default_content_db_path() -> PathBuf {
    PathBuf::from("./shulboard-content.sqlite")
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            upstream_origin: default_upstream_origin(),
            db_path: default_db_path(),
            cache_version: default_cache_version(),
            shell_routes: default_shell_routes(),
            max_age_image_secs: default_max_age_image_secs(),
            max_age_static_secs: default_max_age_static_secs(),
            max_age_data_secs: default_max_age_data_secs(),
            fetch_timeout_ms: default_fetch_timeout_ms(),
            max_bytes: default_max_bytes(),
            user_agent: default_user_agent(),
            content_listen_addr: default_content_listen_addr(),
            content_db_path: default_content_db_path(),
            shell_file: None,
        }
    }
}

impl AppConfig {
    /// Fetch timeout as Duration for use with reqwest/tokio.
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    /// Max age for the image request class.
    pub fn max_age_image(&self) -> Duration {
        Duration::from_secs(self.max_age_image_secs)
    }

    /// Max age for the script/style/font request class.
    pub fn max_age_static(&self) -> Duration {
        Duration::from_secs(self.max_age_static_secs)
    }

    /// Max age for the data/API request class (and the default class).
    pub fn max_age_data(&self) -> Duration {
        Duration::from_secs(self.max_age_data_secs)
    }

    /// The navigation fallback route (first shell route).
    pub fn shell_root(&self) -> &str {
        self.shell_routes.first().map(String::as_str).unwrap_or("/")
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `SHULBOARD_`
    /// 2. TOML file from `SHULBOARD_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("SHULBOARD_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("SHULBOARD_")
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}
