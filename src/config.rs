use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::duration::{deserialize_duration, serialize_duration};
use crate::rates::AssetCurrencies;

/// Environment variable consulted when no config path is given explicitly.
pub const CONFIG_ENV: &str = "DEX_ANALYTICS_CONFIG";

const CONFIG_FILE_NAME: &str = "dex-analytics.toml";

fn default_refresh_interval() -> Duration {
    Duration::from_secs(5 * 60)
}

fn default_calls_per_minute() -> u32 {
    50
}

fn default_wait_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_fiat_refresh_interval() -> Duration {
    Duration::from_secs(24 * 60 * 60)
}

fn default_crypto_base_url() -> String {
    "https://api.coingecko.com/api/v3".to_string()
}

fn default_fiat_base_url() -> String {
    "https://api.frankfurter.app".to_string()
}

/// External exchange-rate source settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RatesConfig {
    /// How long a crypto quote or coin list stays fresh.
    #[serde(
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub refresh_interval: Duration,

    /// Token-bucket replenishment rate for the crypto price API.
    pub calls_per_minute: u32,

    /// Token-bucket capacity. Defaults to `calls_per_minute` when unset.
    pub burst: Option<u32>,

    /// How long a caller may wait for a token before giving up.
    #[serde(
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub wait_timeout: Duration,

    /// How long a fiat rate table stays fresh.
    #[serde(
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub fiat_refresh_interval: Duration,

    pub crypto_base_url: String,
    pub fiat_base_url: String,
}

impl Default for RatesConfig {
    fn default() -> Self {
        Self {
            refresh_interval: default_refresh_interval(),
            calls_per_minute: default_calls_per_minute(),
            burst: None,
            wait_timeout: default_wait_timeout(),
            fiat_refresh_interval: default_fiat_refresh_interval(),
            crypto_base_url: default_crypto_base_url(),
            fiat_base_url: default_fiat_base_url(),
        }
    }
}

impl RatesConfig {
    pub fn effective_burst(&self) -> u32 {
        self.burst.unwrap_or(self.calls_per_minute)
    }
}

/// Periodic job cadence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JobsConfig {
    #[serde(
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub balance_interval: Duration,

    #[serde(
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub price_interval: Duration,

    #[serde(
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub discovery_interval: Duration,

    /// Upper bound on in-flight per-market fetch tasks.
    pub max_concurrent_fetches: usize,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            balance_interval: Duration::from_secs(5 * 60),
            price_interval: Duration::from_secs(5 * 60),
            discovery_interval: Duration::from_secs(60 * 60),
            max_concurrent_fetches: 16,
        }
    }
}

/// Remote market data fetcher settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetcherConfig {
    /// JSON registry listing `{name, endpoint}` providers.
    pub registry_url: Option<String>,

    /// SOCKS5 proxy used for `.onion` endpoints.
    pub onion_proxy: String,

    #[serde(
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub request_timeout: Duration,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            registry_url: None,
            onion_proxy: "socks5h://127.0.0.1:9050".to_string(),
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Path to data directory. If relative, resolved from config file location.
    pub data_dir: Option<PathBuf>,

    pub rates: RatesConfig,
    pub jobs: JobsConfig,
    pub fetcher: FetcherConfig,

    /// Asset hash to currency ticker.
    pub assets: AssetCurrencies,
}

impl Config {
    /// Load config from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Load config from a file, or return default config if file doesn't exist.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn resolve_data_dir(&self, config_dir: &Path) -> PathBuf {
        match &self.data_dir {
            Some(data_dir) if data_dir.is_absolute() => data_dir.clone(),
            Some(data_dir) => config_dir.join(data_dir),
            None => config_dir.join("data"),
        }
    }
}

/// Loaded configuration with the data directory made absolute.
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedConfig {
    pub data_dir: PathBuf,
    pub rates: RatesConfig,
    pub jobs: JobsConfig,
    pub fetcher: FetcherConfig,
    pub assets: AssetCurrencies,
}

impl ResolvedConfig {
    fn from_config(config: Config, config_dir: &Path) -> Self {
        Self {
            data_dir: config.resolve_data_dir(config_dir),
            rates: config.rates,
            jobs: config.jobs,
            fetcher: config.fetcher,
            assets: config.assets,
        }
    }

    /// Load and resolve config from a file path.
    pub fn load(config_path: &Path) -> Result<Self> {
        let config_path = config_path
            .canonicalize()
            .with_context(|| format!("Config file not found: {}", config_path.display()))?;

        let config_dir = config_path
            .parent()
            .context("Config file has no parent directory")?;

        let config = Config::load(&config_path)?;
        Ok(Self::from_config(config, config_dir))
    }

    /// Load config, falling back to defaults rooted next to the intended file.
    pub fn load_or_default(config_path: &Path) -> Result<Self> {
        if config_path.exists() {
            return Self::load(config_path);
        }

        let config_path = if config_path.is_relative() {
            std::env::current_dir()
                .context("Failed to get current directory")?
                .join(config_path)
        } else {
            config_path.to_path_buf()
        };

        let config_dir = config_path
            .parent()
            .context("Config path has no parent directory")?;

        Ok(Self::from_config(Config::default(), config_dir))
    }
}

/// Returns the default config file path.
///
/// Resolution order:
/// 1. `$DEX_ANALYTICS_CONFIG` if set
/// 2. `./dex-analytics.toml` if it exists in current directory
/// 3. `~/.config/dex-analytics/dex-analytics.toml`
pub fn default_config_path() -> PathBuf {
    if let Some(path) = std::env::var_os(CONFIG_ENV).filter(|p| !p.is_empty()) {
        return PathBuf::from(path);
    }

    let local_config = PathBuf::from(CONFIG_FILE_NAME);
    if local_config.exists() {
        return local_config;
    }

    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("dex-analytics").join(CONFIG_FILE_NAME);
    }

    local_config
}
