//! Typed views over the four snapshot documents.
//!
//! Parsing is two-level: the top-level shape must match (object or array),
//! otherwise the whole document is [`Doc::Malformed`]. Inside a document every
//! field is optional and a wrongly-typed field reads as unset.

use std::collections::HashMap;

use serde::Serialize;
use serde_json::Value as JsonValue;

/// Result of loading one document.
#[derive(Debug, Clone, PartialEq)]
pub enum Doc<T> {
    Present(T),
    Absent,
    Malformed(String),
}

impl<T> Doc<T> {
    /// Absent and malformed are indistinguishable to consumers.
    pub fn present(&self) -> Option<&T> {
        match self {
            Doc::Present(v) => Some(v),
            _ => None,
        }
    }

    pub fn status(&self) -> &'static str {
        match self {
            Doc::Present(_) => "present",
            Doc::Absent => "absent",
            Doc::Malformed(_) => "malformed",
        }
    }
}

/// Implemented by each document type: build from a parsed JSON value, or
/// explain why the shape is wrong.
pub trait FromSnapshot: Sized {
    const FILE_NAME: &'static str;

    fn from_json(v: &JsonValue) -> Result<Self, String>;

    fn parse(bytes: &[u8]) -> Doc<Self> {
        match serde_json::from_slice::<JsonValue>(bytes) {
            Ok(v) => match Self::from_json(&v) {
                Ok(doc) => Doc::Present(doc),
                Err(e) => Doc::Malformed(e),
            },
            Err(e) => Doc::Malformed(format!("invalid json: {e}")),
        }
    }
}

fn num(v: &JsonValue, key: &str) -> Option<f64> {
    v.get(key).and_then(|x| x.as_f64()).filter(|x| x.is_finite())
}

fn text(v: &JsonValue, key: &str) -> Option<String> {
    v.get(key).and_then(|x| x.as_str()).map(|s| s.to_string())
}

fn count(v: &JsonValue, key: &str) -> Option<i64> {
    v.get(key)
        .and_then(|x| x.as_i64().or_else(|| x.as_f64().map(|f| f as i64)))
}

fn shape(v: &JsonValue) -> &'static str {
    match v {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "bool",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Projects {
    pub proposed: Option<i64>,
    pub approved: Option<i64>,
    pub funded: Option<i64>,
    pub delivered: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesPoint {
    pub date: String,
    pub amount: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Metrics {
    pub updated_at: Option<String>,
    pub holders: Option<i64>,
    pub active_wallets_30d: Option<i64>,
    pub treasury_usd: Option<f64>,
    pub spent_pct_30d: Option<f64>,
    pub projects: Projects,
    pub treasury_series: Vec<SeriesPoint>,

    // Filled in from merchants.json after load.
    pub merchant_count: Option<usize>,
    pub merchant_cities: Option<usize>,
    pub merchant_volume: Option<f64>,
}

impl FromSnapshot for Metrics {
    const FILE_NAME: &'static str = "metrics.json";

    fn from_json(v: &JsonValue) -> Result<Self, String> {
        if !v.is_object() {
            return Err(format!("metrics: expected object, got {}", shape(v)));
        }
        let projects = v
            .get("projects")
            .filter(|p| p.is_object())
            .map(|p| Projects {
                proposed: count(p, "proposed"),
                approved: count(p, "approved"),
                funded: count(p, "funded"),
                delivered: count(p, "delivered"),
            })
            .unwrap_or_default();

        // Only [date, amount] pairs survive; anything else in the series is dropped.
        let treasury_series = v
            .get("treasury_series")
            .and_then(|s| s.as_array())
            .map(|rows| {
                rows.iter()
                    .filter_map(|row| {
                        let pair = row.as_array()?;
                        let date = pair.first()?.as_str()?;
                        let amount = pair.get(1)?.as_f64()?;
                        Some(SeriesPoint {
                            date: date.to_string(),
                            amount,
                        })
                    })
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        Ok(Self {
            updated_at: text(v, "updated_at"),
            holders: count(v, "holders"),
            active_wallets_30d: count(v, "active_wallets_30d"),
            treasury_usd: num(v, "treasury_usd"),
            spent_pct_30d: num(v, "spent_pct_30d"),
            projects,
            treasury_series,
            merchant_count: None,
            merchant_cities: None,
            merchant_volume: None,
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct GoalPair {
    pub goal: Option<f64>,
    pub stretch: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Goals {
    pub targets: HashMap<String, GoalPair>,
}

impl Goals {
    pub fn get(&self, metric: &str) -> Option<&GoalPair> {
        self.targets.get(metric)
    }
}

impl FromSnapshot for Goals {
    const FILE_NAME: &'static str = "goals.json";

    fn from_json(v: &JsonValue) -> Result<Self, String> {
        let obj = v
            .as_object()
            .ok_or_else(|| format!("goals: expected object, got {}", shape(v)))?;
        let targets = obj
            .iter()
            .filter(|(_, pair)| pair.is_object())
            .map(|(name, pair)| {
                (
                    name.clone(),
                    GoalPair {
                        goal: num(pair, "goal"),
                        stretch: num(pair, "stretch"),
                    },
                )
            })
            .collect();
        Ok(Self { targets })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Merchant {
    pub name: Option<String>,
    pub url: Option<String>,
    pub city: Option<String>,
    pub since: Option<String>,
    pub monthly_volume: Option<f64>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
}

impl Merchant {
    pub fn from_json(v: &JsonValue) -> Self {
        // `since` shows up both as "2024-05" and as a bare year.
        let since = v.get("since").and_then(|x| match x {
            JsonValue::String(s) => Some(s.clone()),
            JsonValue::Number(n) => Some(n.to_string()),
            _ => None,
        });
        Self {
            name: text(v, "name").filter(|s| !s.is_empty()),
            url: text(v, "url").filter(|s| !s.trim().is_empty()),
            city: text(v, "city"),
            since,
            monthly_volume: num(v, "monthly_volume"),
            lat: num(v, "lat"),
            lng: num(v, "lng"),
        }
    }

    pub fn geo(&self) -> Option<(f64, f64)> {
        match (self.lat, self.lng) {
            (Some(lat), Some(lng)) => Some((lat, lng)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Merchants {
    pub entries: Vec<Merchant>,
}

impl FromSnapshot for Merchants {
    const FILE_NAME: &'static str = "merchants.json";

    fn from_json(v: &JsonValue) -> Result<Self, String> {
        let rows = v
            .as_array()
            .ok_or_else(|| format!("merchants: expected array, got {}", shape(v)))?;
        Ok(Self {
            entries: rows
                .iter()
                .filter(|r| r.is_object())
                .map(Merchant::from_json)
                .collect(),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Referrals {
    /// `None` when `items` is missing or not a list.
    pub counts: Option<Vec<f64>>,
}

impl FromSnapshot for Referrals {
    const FILE_NAME: &'static str = "referrals.json";

    fn from_json(v: &JsonValue) -> Result<Self, String> {
        if !v.is_object() {
            return Err(format!("referrals: expected object, got {}", shape(v)));
        }
        let counts = v.get("items").and_then(|x| x.as_array()).map(|items| {
            items
                .iter()
                .map(|it| num(it, "count").unwrap_or(0.0))
                .collect()
        });
        Ok(Self { counts })
    }
}

/// One render pass worth of documents.
#[derive(Debug, Clone)]
pub struct Inputs {
    pub goals: Doc<Goals>,
    pub metrics: Doc<Metrics>,
    pub merchants: Doc<Merchants>,
    pub referrals: Doc<Referrals>,
}

impl Inputs {
    pub fn statuses(&self) -> JsonValue {
        let mut out = serde_json::Map::new();
        for (name, status) in [
            (Goals::FILE_NAME, self.goals.status()),
            (Metrics::FILE_NAME, self.metrics.status()),
            (Merchants::FILE_NAME, self.merchants.status()),
            (Referrals::FILE_NAME, self.referrals.status()),
        ] {
            out.insert(name.to_string(), JsonValue::from(status));
        }
        JsonValue::Object(out)
    }
}
