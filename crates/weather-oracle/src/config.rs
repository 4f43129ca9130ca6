//! Configuration loading for the oracle process.
//!
//! Configuration is read from YAML; every field has a default so an empty
//! file (or no file) is valid. A handful of `ORACLE_*` environment variables
//! override the file.

use oracle_ledger::{Address, LedgerConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Environment variable carrying the relayer key.
pub const ENV_RELAYER_KEY: &str = "ORACLE_RELAYER_KEY";
/// Environment variable overriding the ledger contract address.
pub const ENV_LEDGER_ADDRESS: &str = "ORACLE_LEDGER_ADDRESS";
/// Environment variable overriding the RPC endpoint.
pub const ENV_RPC_URL: &str = "ORACLE_RPC_URL";
/// Environment variable overriding the request fee.
pub const ENV_FEE: &str = "ORACLE_FEE";
/// Environment variable overriding the weather endpoint.
pub const ENV_WEATHER_URL: &str = "ORACLE_WEATHER_URL";

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),
    #[error("Parse error: {0}")]
    ParseError(String),
    #[error("Invalid value for {var}: {message}")]
    Env { var: &'static str, message: String },
    #[error("Invalid config: {0}")]
    Invalid(String),
    #[error("relayer key not set (use ledger.relayer_key or ORACLE_RELAYER_KEY)")]
    MissingRelayerKey,
}

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub ledger: LedgerSection,
    #[serde(default)]
    pub rpc: RpcConfig,
    #[serde(default)]
    pub weather: WeatherConfig,
    #[serde(default)]
    pub relay: RelayConfig,
}

/// Ledger deployment parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerSection {
    /// Contract address
    #[serde(default = "default_ledger_address")]
    pub address: Address,

    /// Minimum payment per request
    #[serde(default)]
    pub fee: u64,

    /// Secret the relayer signs completions with
    #[serde(default, skip_serializing)]
    pub relayer_key: Option<String>,
}

impl Default for LedgerSection {
    fn default() -> Self {
        Self {
            address: default_ledger_address(),
            fee: 0,
            relayer_key: None,
        }
    }
}

/// Consumer-facing RPC endpoint served by the local chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcConfig {
    #[serde(default = "default_rpc_url")]
    pub url: String,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            url: default_rpc_url(),
        }
    }
}

impl RpcConfig {
    /// Socket address to bind, with any `http://` scheme and trailing path removed.
    pub fn listen_addr(&self) -> String {
        let without_scheme = self
            .url
            .strip_prefix("http://")
            .or_else(|| self.url.strip_prefix("https://"))
            .unwrap_or(&self.url);
        without_scheme
            .split('/')
            .next()
            .unwrap_or(without_scheme)
            .to_string()
    }
}

/// Weather provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherConfig {
    /// Forecast endpoint receiving `latitude`/`longitude` query parameters
    #[serde(default = "default_weather_url")]
    pub base_url: String,

    /// Upper bound on one HTTP exchange
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            base_url: default_weather_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl WeatherConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Relay loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Fetch attempts per request, first try included
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Fixed pause between attempts
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Value submitted when every attempt fails
    #[serde(default = "default_sentinel")]
    pub sentinel: String,

    /// Requests processed concurrently; 1 processes events strictly in order
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,

    /// Process requests already Pending on the ledger at startup
    #[serde(default = "default_sweep_pending")]
    pub sweep_pending: bool,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
            sentinel: default_sentinel(),
            max_in_flight: default_max_in_flight(),
            sweep_pending: default_sweep_pending(),
        }
    }
}

impl RelayConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

fn default_ledger_address() -> Address {
    Address::new([0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0x0a, 0x11])
}

fn default_rpc_url() -> String {
    "http://127.0.0.1:8545".to_string()
}

fn default_weather_url() -> String {
    "https://api.open-meteo.com/v1/forecast".to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    500
}

fn default_sentinel() -> String {
    "0".to_string()
}

fn default_max_in_flight() -> usize {
    1
}

fn default_sweep_pending() -> bool {
    true
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(format!("Failed to read {}: {}", path.display(), e)))?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(yaml).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Load from `path` if given and present, defaults otherwise.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(p) if p.exists() => Self::from_file(p),
            Some(p) => {
                log::info!("Config file not found, using defaults: {}", p.display());
                Ok(Self::default())
            }
            None => Ok(Self::default()),
        }
    }

    /// Apply `ORACLE_*` overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|var| std::env::var(var).ok())
    }

    /// Apply overrides from an arbitrary variable lookup.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup(ENV_RELAYER_KEY) {
            self.ledger.relayer_key = Some(key);
        }
        if let Some(raw) = lookup(ENV_LEDGER_ADDRESS) {
            self.ledger.address = raw.parse().map_err(|e| ConfigError::Env {
                var: ENV_LEDGER_ADDRESS,
                message: format!("{}", e),
            })?;
        }
        if let Some(url) = lookup(ENV_RPC_URL) {
            self.rpc.url = url;
        }
        if let Some(raw) = lookup(ENV_FEE) {
            self.ledger.fee = raw.trim().parse().map_err(|e| ConfigError::Env {
                var: ENV_FEE,
                message: format!("{}", e),
            })?;
        }
        if let Some(url) = lookup(ENV_WEATHER_URL) {
            self.weather.base_url = url;
        }
        Ok(())
    }

    /// Reject settings the relay cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.relay.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "relay.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.relay.max_in_flight == 0 {
            return Err(ConfigError::Invalid(
                "relay.max_in_flight must be at least 1".to_string(),
            ));
        }
        if self.weather.timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "weather.timeout_secs must be at least 1".to_string(),
            ));
        }
        if self.weather.base_url.trim().is_empty() {
            return Err(ConfigError::Invalid("weather.base_url is empty".to_string()));
        }
        Ok(())
    }

    /// The relayer key, required to run the relay.
    pub fn relayer_key(&self) -> Result<&str, ConfigError> {
        match self.ledger.relayer_key.as_deref() {
            Some(key) if !key.is_empty() => Ok(key),
            _ => Err(ConfigError::MissingRelayerKey),
        }
    }

    /// Ledger deployment parameters with the relayer address derived from the key.
    pub fn ledger_config(&self) -> Result<LedgerConfig, ConfigError> {
        let key = self.relayer_key()?;
        Ok(LedgerConfig {
            address: self.ledger.address,
            relayer: Address::from_key(key),
            fee: u128::from(self.ledger.fee),
        })
    }
}
