use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use std::{fs, path::PathBuf};
use tracing::debug;

use crate::core::performance::DEFAULT_MAX_CONCURRENT_FETCHES;

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct YahooProviderConfig {
    pub base_url: String,
    /// Appended to local tickers to form the provider symbol.
    pub market_suffix: String,
}

impl Default for YahooProviderConfig {
    fn default() -> Self {
        YahooProviderConfig {
            base_url: "https://query1.finance.yahoo.com".to_string(),
            market_suffix: ".SA".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct BcbProviderConfig {
    pub base_url: String,
}

impl Default for BcbProviderConfig {
    fn default() -> Self {
        BcbProviderConfig {
            base_url: "https://api.bcb.gov.br".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct ProvidersConfig {
    pub yahoo: YahooProviderConfig,
    pub bcb: BcbProviderConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq)]
pub struct CacheConfig {
    pub max_entries: u64,
    pub ttl_secs: u64,
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(from = "CachesOverrides")]
pub struct CachesConfig {
    /// Quotes, price history and dividends.
    pub volatile: CacheConfig,
    /// The benchmark rate.
    pub slow: CacheConfig,
}

impl Default for CachesConfig {
    fn default() -> Self {
        CachesConfig {
            volatile: CacheConfig {
                max_entries: 512,
                ttl_secs: 15 * 60,
            },
            slow: CacheConfig {
                max_entries: 128,
                ttl_secs: 4 * 60 * 60,
            },
        }
    }
}

// Each cache has its own defaults, so keys left out of a section fall back
// per instance rather than to a shared `CacheConfig::default()`.
#[derive(Deserialize, Default)]
#[serde(default)]
struct CachesOverrides {
    volatile: CacheOverrides,
    slow: CacheOverrides,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct CacheOverrides {
    max_entries: Option<u64>,
    ttl_secs: Option<u64>,
}

impl CacheOverrides {
    fn apply(self, base: CacheConfig) -> CacheConfig {
        CacheConfig {
            max_entries: self.max_entries.unwrap_or(base.max_entries),
            ttl_secs: self.ttl_secs.unwrap_or(base.ttl_secs),
        }
    }
}

impl From<CachesOverrides> for CachesConfig {
    fn from(overrides: CachesOverrides) -> Self {
        let defaults = CachesConfig::default();
        CachesConfig {
            volatile: overrides.volatile.apply(defaults.volatile),
            slow: overrides.slow.apply(defaults.slow),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub providers: ProvidersConfig,
    pub cache: CachesConfig,
    pub request_timeout_secs: u64,
    pub max_concurrent_fetches: usize,
    pub data_path: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            providers: ProvidersConfig::default(),
            cache: CachesConfig::default(),
            request_timeout_secs: 10,
            max_concurrent_fetches: DEFAULT_MAX_CONCURRENT_FETCHES,
            data_path: None,
        }
    }
}

fn project_dirs() -> Result<ProjectDirs> {
    ProjectDirs::from("br", "carteira", "carteira")
        .context("Could not determine project directories")
}

impl AppConfig {
    /// Loads the config from the default location, falling back to defaults when it doesn't exist.
    pub fn load() -> Result<Self> {
        debug!("Loading default config");
        let config_path = Self::default_config_path()?;
        if !config_path.exists() {
            debug!(
                "No config file at {}, using defaults",
                config_path.display()
            );
            return Ok(Self::default());
        }
        Self::load_from_path(&config_path)
    }

    pub fn default_config_path() -> Result<PathBuf> {
        Ok(project_dirs()?.config_dir().join("config.yaml"))
    }

    pub fn default_data_path(&self) -> Result<PathBuf> {
        if let Some(custom_path) = &self.data_path {
            return Ok(PathBuf::from(custom_path));
        }
        Ok(project_dirs()?.data_dir().to_path_buf())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let config_str = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        // An empty or comment-only file means "all defaults".
        if config_str.lines().all(|line| {
            let line = line.trim();
            line.is_empty() || line.starts_with('#') || line == "---"
        }) {
            return Ok(Self::default());
        }

        let config: Self = serde_yaml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;
        debug!("Successfully loaded config");
        Ok(config)
    }
}
