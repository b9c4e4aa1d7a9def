//! Read-only token balance lookups over Ethereum-style JSON-RPC.

use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};

use crate::config::Settings;

/// `balanceOf(address)`.
const BALANCE_OF_SELECTOR: &str = "70a08231";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Alkebuleum,
    Ethereum,
    Bsc,
    Sepolia,
}

impl Network {
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "alkebuleum" | "alke" => Ok(Self::Alkebuleum),
            "ethereum" | "mainnet" | "eth" => Ok(Self::Ethereum),
            "bsc" | "bnb" => Ok(Self::Bsc),
            "sepolia" => Ok(Self::Sepolia),
            other => Err(anyhow!(
                "NETWORK must be alkebuleum|ethereum|bsc|sepolia (got {other})"
            )),
        }
    }

    pub fn chain_id(self) -> u64 {
        match self {
            Self::Alkebuleum => 0x39F8E,
            Self::Ethereum => 0x1,
            Self::Bsc => 0x38,
            Self::Sepolia => 0xaa36a7,
        }
    }

    pub fn default_rpc_url(self) -> &'static str {
        match self {
            Self::Alkebuleum => "https://rpc.alkebuleum.com",
            Self::Ethereum => "https://cloudflare-eth.com",
            Self::Bsc => "https://bsc-dataseed.binance.org/",
            Self::Sepolia => "https://rpc.sepolia.org",
        }
    }

    pub fn native_symbol(self) -> &'static str {
        match self {
            Self::Alkebuleum => "AKE",
            Self::Ethereum | Self::Sepolia => "ETH",
            Self::Bsc => "BNB",
        }
    }
}

pub fn is_address(s: &str) -> bool {
    let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) else {
        return false;
    };
    hex.len() == 40 && hex.chars().all(|c| c.is_ascii_hexdigit())
}

/// `0x26B0cA2C...2BaB` style: first 6 and last 4 characters.
pub fn short_address(s: &str) -> String {
    if s.len() <= 10 || !s.is_ascii() {
        return s.to_string();
    }
    format!("{}...{}", &s[..6], &s[s.len() - 4..])
}

pub fn encode_balance_of(account: &str) -> Result<String> {
    if !is_address(account) {
        bail!("not an address: {account}");
    }
    let hex = account[2..].to_lowercase();
    Ok(format!("0x{BALANCE_OF_SELECTOR}{hex:0>64}"))
}

/// Parses a `0x`-prefixed quantity or 32-byte word. Values wider than 128 bits are rejected.
pub fn parse_quantity(s: &str) -> Result<u128> {
    let hex = s
        .strip_prefix("0x")
        .ok_or_else(|| anyhow!("quantity missing 0x prefix: {s}"))?;
    let digits = hex.trim_start_matches('0');
    if digits.is_empty() {
        return Ok(0);
    }
    if digits.len() > 32 {
        bail!("quantity exceeds 128 bits: {s}");
    }
    u128::from_str_radix(digits, 16).with_context(|| format!("invalid hex quantity {s}"))
}

/// Parses a full uint256 word (up to 64 hex digits) into its approximate value.
pub fn parse_word(s: &str) -> Result<f64> {
    let hex = s
        .strip_prefix("0x")
        .ok_or_else(|| anyhow!("word missing 0x prefix: {s}"))?;
    let digits = hex.trim_start_matches('0');
    if digits.len() > 64 {
        bail!("word exceeds 256 bits: {s}");
    }
    let split = digits.len().saturating_sub(32);
    let (high, low) = digits.split_at(split);
    let limb = |d: &str| -> Result<f64> {
        if d.is_empty() {
            return Ok(0.0);
        }
        let v = u128::from_str_radix(d, 16).with_context(|| format!("invalid hex word {s}"))?;
        Ok(v as f64)
    };
    Ok(limb(high)? * 2f64.powi(128) + limb(low)?)
}

pub fn format_units(raw: f64, decimals: u32) -> f64 {
    raw / 10f64.powi(decimals as i32)
}

#[derive(Debug, Clone, Serialize)]
pub struct AccountSummary {
    pub account: String,
    pub short: String,
    pub symbol: String,
    pub balance: f64,
    pub native_balance: f64,
    pub native_symbol: String,
    pub treasury: String,
    pub treasury_balance: f64,
}

impl AccountSummary {
    pub fn lines(&self) -> [String; 3] {
        [
            format!("Your {}: {:.3} {}", self.symbol, self.balance, self.symbol),
            format!("Gas: {:.6} {}", self.native_balance, self.native_symbol),
            format!(
                "Treasury {} (on-chain): {:.3} {}",
                self.symbol, self.treasury_balance, self.symbol
            ),
        ]
    }
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    result: Option<JsonValue>,
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

/// One ERC-20 contract on one RPC endpoint.
#[derive(Clone)]
pub struct TokenReader {
    client: reqwest::Client,
    rpc_url: String,
    network: Network,
    token: String,
    decimals: u32,
    symbol: String,
    treasury: String,
}

impl TokenReader {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.fetch_timeout_secs))
            .build()
            .context("build rpc client")?;
        Ok(Self {
            client,
            rpc_url: settings.rpc_url.clone(),
            network: settings.network,
            token: settings.token_address.clone(),
            decimals: settings.token_decimals,
            symbol: settings.token_symbol.clone(),
            treasury: settings.treasury_wallet.clone(),
        })
    }

    async fn call(&self, method: &str, params: JsonValue) -> Result<JsonValue> {
        let body = json!({ "jsonrpc": "2.0", "id": 1, "method": method, "params": params });
        let resp = self
            .client
            .post(&self.rpc_url)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("rpc {method} {}", self.rpc_url))?;
        let status = resp.status();
        if !status.is_success() {
            bail!("rpc {method} http status {status}");
        }
        let parsed: RpcResponse = resp
            .json()
            .await
            .with_context(|| format!("rpc {method} decode"))?;
        if let Some(e) = parsed.error {
            bail!("rpc {method} error {}: {}", e.code, e.message);
        }
        parsed
            .result
            .ok_or_else(|| anyhow!("rpc {method} returned no result"))
    }

    async fn call_quantity(&self, method: &str, params: JsonValue) -> Result<u128> {
        let v = self.call(method, params).await?;
        let s = v
            .as_str()
            .ok_or_else(|| anyhow!("rpc {method} result is not a string"))?;
        parse_quantity(s)
    }

    async fn call_word(&self, method: &str, params: JsonValue) -> Result<f64> {
        let v = self.call(method, params).await?;
        let s = v
            .as_str()
            .ok_or_else(|| anyhow!("rpc {method} result is not a string"))?;
        parse_word(s)
    }

    pub async fn chain_id(&self) -> Result<u64> {
        let id = self.call_quantity("eth_chainId", json!([])).await?;
        u64::try_from(id).context("chain id out of range")
    }

    /// Raw token units; uint256 balances beyond `u128` keep their magnitude.
    pub async fn balance_of(&self, account: &str) -> Result<f64> {
        let data = encode_balance_of(account)?;
        self.call_word(
            "eth_call",
            json!([{ "to": self.token, "data": data }, "latest"]),
        )
        .await
    }

    pub async fn native_balance(&self, account: &str) -> Result<f64> {
        if !is_address(account) {
            bail!("not an address: {account}");
        }
        self.call_word("eth_getBalance", json!([account, "latest"]))
            .await
    }

    pub async fn account_summary(&self, account: &str) -> Result<AccountSummary> {
        if !is_address(account) {
            bail!("not an address: {account}");
        }
        match self.chain_id().await {
            Ok(id) if id != self.network.chain_id() => log::warn!(
                "chain.mismatch rpc={} got={:#x} want={:#x}",
                self.rpc_url,
                id,
                self.network.chain_id()
            ),
            Ok(_) => {}
            Err(e) => log::warn!("chain.id.failed rpc={} err={:#}", self.rpc_url, e),
        }

        let (user, native, treasury) = tokio::join!(
            self.balance_of(account),
            self.native_balance(account),
            self.balance_of(&self.treasury),
        );
        Ok(AccountSummary {
            account: account.to_string(),
            short: short_address(account),
            symbol: self.symbol.clone(),
            balance: format_units(user?, self.decimals),
            native_balance: format_units(native?, 18),
            native_symbol: self.network.native_symbol().to_string(),
            treasury: self.treasury.clone(),
            treasury_balance: format_units(treasury?, self.decimals),
        })
    }
}
