//! Refreshes `metrics.json` with the treasury's current USD value.

use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value as JsonValue};

use crate::{config::Settings, utils::iso_seconds};

const WEI_PER_ETH: f64 = 1e18;

pub fn default_metrics(now: DateTime<Utc>) -> JsonValue {
    json!({
        "updated_at": iso_seconds(now),
        "holders": 0,
        "active_wallets_30d": 0,
        "treasury_usd": 0,
        "treasury_series": [],
        "spent_pct_30d": 0,
        "projects": { "proposed": 0, "approved": 0, "funded": 0, "delivered": 0 },
        "merchants": 0
    })
}

/// Falls back to `default` when the file is missing, unreadable, or not a JSON object.
pub fn read_metrics_or_default(path: &Path, now: DateTime<Utc>) -> JsonValue {
    match std::fs::read(path) {
        Ok(bytes) => match serde_json::from_slice::<JsonValue>(&bytes) {
            Ok(v) if v.is_object() => return v,
            Ok(_) => log::warn!("updater.metrics.not_object path={}", path.display()),
            Err(e) => log::warn!("updater.metrics.invalid path={} err={}", path.display(), e),
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => log::warn!("updater.metrics.read_failed path={} err={}", path.display(), e),
    }
    default_metrics(now)
}

pub fn count_merchants(path: &Path) -> usize {
    std::fs::read(path)
        .ok()
        .and_then(|b| serde_json::from_slice::<JsonValue>(&b).ok())
        .and_then(|v| v.as_array().map(|a| a.len()))
        .unwrap_or(0)
}

/// Replaces today's point or appends a new one, then keeps the newest `max_points`.
pub fn upsert_series_point(series: &mut Vec<JsonValue>, today: &str, amount: i64, max_points: usize) {
    let last_is_today = series
        .last()
        .and_then(|p| p.get(0))
        .and_then(|d| d.as_str())
        == Some(today);
    if last_is_today {
        if let Some(JsonValue::Array(p)) = series.last_mut() {
            if p.len() > 1 {
                p[1] = json!(amount);
            } else {
                p.push(json!(amount));
            }
        }
    } else {
        series.push(json!([today, amount]));
    }
    if series.len() > max_points {
        let excess = series.len() - max_points;
        series.drain(..excess);
    }
}

/// Writes the refreshed fields into `metrics`, leaving everything else untouched.
pub fn apply_update(
    metrics: &mut JsonValue,
    treasury_usd: i64,
    merchants: usize,
    now: DateTime<Utc>,
    max_points: usize,
) {
    if !metrics.is_object() {
        *metrics = JsonValue::Object(Map::new());
    }
    let today = now.format("%Y-%m-%d").to_string();
    let mut series = metrics
        .get("treasury_series")
        .and_then(|s| s.as_array())
        .cloned()
        .unwrap_or_default();
    upsert_series_point(&mut series, &today, treasury_usd, max_points);

    if let Some(obj) = metrics.as_object_mut() {
        obj.insert("updated_at".into(), json!(iso_seconds(now)));
        obj.insert("treasury_usd".into(), json!(treasury_usd));
        obj.insert("merchants".into(), json!(merchants));
        obj.insert("treasury_series".into(), JsonValue::Array(series));
    }
}

pub fn parse_etherscan_balance(v: &JsonValue) -> Result<u128> {
    if v.get("status").and_then(|s| s.as_str()) != Some("1") {
        bail!("etherscan error: {v}");
    }
    let result = v
        .get("result")
        .and_then(|r| r.as_str())
        .ok_or_else(|| anyhow!("etherscan result missing: {v}"))?;
    result
        .trim()
        .parse::<u128>()
        .with_context(|| format!("etherscan balance not an integer: {result}"))
}

pub fn parse_eth_usd(v: &JsonValue) -> f64 {
    v.get("ethereum")
        .and_then(|e| e.get("usd"))
        .and_then(|u| u.as_f64())
        .unwrap_or(0.0)
}

pub fn treasury_usd(balance_wei: u128, eth_usd: f64) -> i64 {
    let eth = balance_wei as f64 / WEI_PER_ETH;
    (eth * eth_usd).round() as i64
}

async fn get_json(client: &reqwest::Client, url: &str) -> Result<JsonValue> {
    let resp = client
        .get(url)
        .send()
        .await
        .with_context(|| format!("GET {url}"))?;
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        bail!("HTTP {status} from {url}: {body}");
    }
    resp.json().await.with_context(|| format!("invalid json from {url}"))
}

#[derive(Debug, Clone)]
pub struct UpdateReport {
    pub treasury_usd: i64,
    pub balance_eth: f64,
    pub eth_usd: f64,
    pub merchants: usize,
    pub updated_at: String,
}

pub async fn run(settings: &Settings) -> Result<UpdateReport> {
    let (Some(api_key), Some(treasury)) = (
        settings.etherscan_api_key.as_deref(),
        settings.treasury_address.as_deref(),
    ) else {
        bail!("Missing ETHERSCAN_API_KEY or TREASURY_ADDRESS environment variables.");
    };
    if settings.data_is_remote() {
        bail!("update needs a local DATA_SOURCE directory (got {})", settings.data_source);
    }

    let dir = Path::new(&settings.data_source);
    let metrics_path = dir.join("metrics.json");
    let now = Utc::now();
    let mut metrics = read_metrics_or_default(&metrics_path, now);
    let merchants = count_merchants(&dir.join("merchants.json"));

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(settings.fetch_timeout_secs))
        .user_agent(concat!("tribeboard/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("build http client")?;

    let bal_url = format!(
        "{}?module=account&action=balance&address={}&tag=latest&apikey={}",
        settings.etherscan_base_url, treasury, api_key
    );
    let price_url = format!(
        "{}/simple/price?ids=ethereum&vs_currencies=usd",
        settings.price_base_url.trim_end_matches('/')
    );
    let (bal, price) = tokio::join!(get_json(&client, &bal_url), get_json(&client, &price_url));
    let balance_wei = parse_etherscan_balance(&bal?)?;
    let eth_usd = parse_eth_usd(&price?);
    let usd = treasury_usd(balance_wei, eth_usd);

    apply_update(&mut metrics, usd, merchants, now, settings.series_max_points);

    std::fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
    let mut out = serde_json::to_string_pretty(&metrics)?;
    out.push('\n');
    std::fs::write(&metrics_path, out)
        .with_context(|| format!("write {}", metrics_path.display()))?;

    Ok(UpdateReport {
        treasury_usd: usd,
        balance_eth: balance_wei as f64 / WEI_PER_ETH,
        eth_usd,
        merchants,
        updated_at: iso_seconds(now),
    })
}
