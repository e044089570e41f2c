//! Application configuration with layered loading.
//!
//! Configuration is loaded once at startup with figment, from:
//!
//! 1. Environment variables (SHELTER_*)
//! 2. TOML config file (if SHELTER_CONFIG_FILE set)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::canonical;
use crate::classify::StaticRules;
use crate::model::Destination;

mod validation;

pub use validation::ConfigError;

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (SHELTER_*)
/// 2. TOML config file (if SHELTER_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Version name of the generation this build installs.
    ///
    /// Changing it on a new deployment replaces every older generation at
    /// activation. Set via SHELTER_GENERATION.
    #[serde(default = "default_generation")]
    pub generation: String,

    /// Base URL of the origin; relative manifest entries resolve against it.
    ///
    /// Set via SHELTER_ORIGIN.
    #[serde(default = "default_origin")]
    pub origin: String,

    /// Resources that must be cached before the generation can activate.
    ///
    /// Set via SHELTER_PRECACHE (e.g. `["./", "./index.html"]`).
    #[serde(default = "default_precache")]
    pub precache: Vec<String>,

    /// Documents served, in order, when a navigation fails offline.
    #[serde(default = "default_navigation_fallbacks")]
    pub navigation_fallbacks: Vec<String>,

    /// Hosts whose responses are treated as immutable static assets.
    #[serde(default = "default_static_hosts")]
    pub static_hosts: Vec<String>,

    /// Request destinations treated as immutable static assets.
    #[serde(default = "default_static_destinations")]
    pub static_destinations: Vec<Destination>,

    /// Path to SQLite cache database.
    ///
    /// Set via SHELTER_DB_PATH.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// User-Agent string for origin requests.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Maximum response body size in bytes.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,

    /// Origin request timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Maximum number of redirects followed per origin request.
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,
}

fn default_generation() -> String {
    "app-shell-v1".into()
}

fn default_origin() -> String {
    "http://localhost:5173/".into()
}

fn default_precache() -> Vec<String> {
    vec![
        "./".into(),
        "./index.html".into(),
        "./manifest.json".into(),
        "https://cdn.tailwindcss.com".into(),
        "https://fonts.googleapis.com/css2?family=Inter:wght@300;400;500;600;700&display=swap".into(),
        "https://cdn-icons-png.flaticon.com/512/10042/10042167.png".into(),
    ]
}

fn default_navigation_fallbacks() -> Vec<String> {
    vec!["./index.html".into(), "./".into()]
}

fn default_static_hosts() -> Vec<String> {
    vec!["cdn.tailwindcss.com".into(), "fonts.googleapis.com".into(), "fonts.gstatic.com".into()]
}

fn default_static_destinations() -> Vec<Destination> {
    vec![Destination::Font, Destination::Image]
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./shelter-cache.sqlite")
}

fn default_user_agent() -> String {
    "shelter/0.1".into()
}

fn default_max_bytes() -> usize {
    5_242_880 // 5MB
}

fn default_timeout_ms() -> u64 {
    20_000
}

fn default_max_redirects() -> usize {
    5
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            generation: default_generation(),
            origin: default_origin(),
            precache: default_precache(),
            navigation_fallbacks: default_navigation_fallbacks(),
            static_hosts: default_static_hosts(),
            static_destinations: default_static_destinations(),
            db_path: default_db_path(),
            user_agent: default_user_agent(),
            max_bytes: default_max_bytes(),
            timeout_ms: default_timeout_ms(),
            max_redirects: default_max_redirects(),
        }
    }
}

impl AppConfig {
    /// Timeout as Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let config: Self = Self::figment()
            .extract()
            .map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }

    fn figment() -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("SHELTER_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment.merge(
            Env::prefixed("SHELTER_")
                .ignore(&["CONFIG_FILE"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        )
    }

    /// The origin as a parsed URL.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if the origin is not an absolute
    /// http(s) URL.
    pub fn origin_url(&self) -> Result<Url, ConfigError> {
        let url = Url::parse(&self.origin).map_err(|e| ConfigError::Invalid {
            field: "origin".into(),
            reason: e.to_string(),
        })?;

        match url.scheme() {
            "http" | "https" => Ok(url),
            scheme => Err(ConfigError::Invalid {
                field: "origin".into(),
                reason: format!("unsupported scheme: {scheme}"),
            }),
        }
    }

    /// Resolve a manifest or fallback entry against the origin.
    ///
    /// Uses the same canonicalization as request handling, so an entry that
    /// passes validation is exactly the URL the proxy precaches.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` naming `field` if the entry is empty,
    /// malformed or not http(s).
    pub fn resolve(&self, field: &str, entry: &str) -> Result<Url, ConfigError> {
        let origin = self.origin_url()?;
        canonical::resolve(&origin, entry).map_err(|e| ConfigError::Invalid {
            field: field.into(),
            reason: format!("{entry}: {e}"),
        })
    }

    /// The precache manifest as absolute URLs.
    pub fn manifest_urls(&self) -> Result<Vec<Url>, ConfigError> {
        self.precache.iter().map(|entry| self.resolve("precache", entry)).collect()
    }

    /// Offline shell documents as absolute URLs, in fallback order.
    pub fn fallback_urls(&self) -> Result<Vec<Url>, ConfigError> {
        self.navigation_fallbacks
            .iter()
            .map(|entry| self.resolve("navigation_fallbacks", entry))
            .collect()
    }

    /// Static-asset rules for the request classifier.
    pub fn static_rules(&self) -> StaticRules {
        StaticRules::new(&self.static_hosts, self.static_destinations.iter().copied())
    }
}
