use std::env;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use crate::chain::{is_address, Network};

fn get_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn get_env_bool(key: &str, default: bool) -> bool {
    match get_env(key) {
        None => default,
        Some(v) => matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "y" | "on"),
    }
}

fn get_env_u64(key: &str, default: u64) -> Result<u64> {
    match get_env(key) {
        None => Ok(default),
        Some(v) => Ok(v
            .parse::<u64>()
            .map_err(|e| anyhow!("{key} invalid int: {e}"))?),
    }
}

fn get_env_string(key: &str, default: &str) -> String {
    get_env(key).unwrap_or_else(|| default.to_string())
}

/// How `spent_pct_30d` is stored in `metrics.json`. Revisions of the data
/// pipeline disagree, so it is a setting rather than a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpendScale {
    /// 0..1, multiplied by 100 for display.
    Fraction,
    /// Already 0..100.
    Percent,
}

impl SpendScale {
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "fraction" | "ratio" => Ok(Self::Fraction),
            "percent" | "pct" => Ok(Self::Percent),
            other => Err(anyhow!("SPEND_PCT_SCALE must be fraction|percent (got {other})")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    // Data
    pub data_source: String, // directory path or http(s) base URL
    pub spend_scale: SpendScale,
    pub fetch_timeout_secs: u64,

    // Snapshot cache
    pub cache_enabled: bool,
    pub cache_path: String,

    // Dashboard
    pub dashboard_host: String,
    pub dashboard_port: u16,
    pub dashboard_open_browser: bool,

    // Chain
    pub network: Network,
    pub rpc_url: String,
    pub token_address: String,
    pub token_decimals: u32,
    pub token_symbol: String,
    pub treasury_wallet: String,

    // Updater
    pub etherscan_api_key: Option<String>,
    pub etherscan_base_url: String,
    pub treasury_address: Option<String>,
    pub price_base_url: String,
    pub series_max_points: usize,
}

impl Settings {
    pub fn load() -> Result<Self> {
        let network = Network::parse(&get_env_string("NETWORK", "alkebuleum"))?;
        let rpc_url = get_env_string("RPC_URL", network.default_rpc_url());

        let s = Self {
            data_source: get_env_string("DATA_SOURCE", "./data"),
            spend_scale: SpendScale::parse(&get_env_string("SPEND_PCT_SCALE", "fraction"))?,
            fetch_timeout_secs: get_env_u64("FETCH_TIMEOUT_SECS", 15)?,
            cache_enabled: get_env_bool("CACHE_ENABLED", true),
            cache_path: get_env_string("CACHE_PATH", "./data/.snapshot_cache.sqlite"),
            dashboard_host: get_env_string("DASHBOARD_HOST", "127.0.0.1"),
            dashboard_port: get_env_u64("DASHBOARD_PORT", 8000)? as u16,
            dashboard_open_browser: get_env_bool("DASHBOARD_OPEN_BROWSER", false),
            network,
            rpc_url,
            token_address: get_env_string(
                "TOKEN_ADDRESS",
                "0xdf7ce67dB19142672c4193d969cdD9975A5A6038",
            ),
            token_decimals: get_env_u64("TOKEN_DECIMALS", 18)? as u32,
            token_symbol: get_env_string("TOKEN_SYMBOL", "7TRB"),
            treasury_wallet: get_env_string(
                "TREASURY_WALLET",
                "0x26B0cA2C767758Fc3E34e0481065a55521E42BaB",
            ),
            etherscan_api_key: get_env("ETHERSCAN_API_KEY"),
            etherscan_base_url: get_env_string("ETHERSCAN_BASE_URL", "https://api.etherscan.io/api"),
            treasury_address: get_env("TREASURY_ADDRESS"),
            price_base_url: get_env_string("PRICE_BASE_URL", "https://api.coingecko.com/api/v3"),
            series_max_points: get_env_u64("SERIES_MAX_POINTS", 120)? as usize,
        };

        s.validate()?;
        Ok(s)
    }

    pub fn data_is_remote(&self) -> bool {
        let d = self.data_source.to_lowercase();
        d.starts_with("http://") || d.starts_with("https://")
    }

    pub fn validate(&self) -> Result<()> {
        if self.data_source.trim().is_empty() {
            return Err(anyhow!("DATA_SOURCE is empty"));
        }
        if self.fetch_timeout_secs < 1 {
            return Err(anyhow!(
                "FETCH_TIMEOUT_SECS must be >= 1 (got {})",
                self.fetch_timeout_secs
            ));
        }
        if self.dashboard_port == 0 {
            return Err(anyhow!("DASHBOARD_PORT must be > 0"));
        }
        if !is_address(&self.token_address) {
            return Err(anyhow!("TOKEN_ADDRESS is not a 0x address (got {})", self.token_address));
        }
        if !is_address(&self.treasury_wallet) {
            return Err(anyhow!(
                "TREASURY_WALLET is not a 0x address (got {})",
                self.treasury_wallet
            ));
        }
        if self.token_decimals > 36 {
            return Err(anyhow!("TOKEN_DECIMALS must be <= 36 (got {})", self.token_decimals));
        }
        if self.series_max_points < 1 {
            return Err(anyhow!(
                "SERIES_MAX_POINTS must be >= 1 (got {})",
                self.series_max_points
            ));
        }
        Ok(())
    }
}

impl Default for Settings {
    fn default() -> Self {
        let network = Network::Alkebuleum;
        Self {
            data_source: "./data".to_string(),
            spend_scale: SpendScale::Fraction,
            fetch_timeout_secs: 15,
            cache_enabled: false,
            cache_path: "./data/.snapshot_cache.sqlite".to_string(),
            dashboard_host: "127.0.0.1".to_string(),
            dashboard_port: 8000,
            dashboard_open_browser: false,
            network,
            rpc_url: network.default_rpc_url().to_string(),
            token_address: "0xdf7ce67dB19142672c4193d969cdD9975A5A6038".to_string(),
            token_decimals: 18,
            token_symbol: "7TRB".to_string(),
            treasury_wallet: "0x26B0cA2C767758Fc3E34e0481065a55521E42BaB".to_string(),
            etherscan_api_key: None,
            etherscan_base_url: "https://api.etherscan.io/api".to_string(),
            treasury_address: None,
            price_base_url: "https://api.coingecko.com/api/v3".to_string(),
            series_max_points: 120,
        }
    }
}
