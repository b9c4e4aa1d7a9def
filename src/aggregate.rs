//! Derives every display value of the dashboard from the loaded documents.
//!
//! Nothing here fails: each value falls back to zero/blank independently, and
//! a missing metrics document turns the whole pass into a placeholder.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{
    config::SpendScale,
    documents::{Doc, GoalPair, Goals, Merchant, Merchants, Metrics, Projects, Referrals},
    utils::{clamp, fmt_number, fmt_thousands, parse_timestamp, round_half_up},
};

pub const PLACEHOLDER_TEXT: &str = "— (awaiting data/metrics.json)";
pub const UNKNOWN_TIME: &str = "—";
pub const SINGLE_POINT_ZOOM: u8 = 13;
pub const FIT_PADDING_PX: u32 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Freshness {
    Fresh,
    Stale,
    Old,
}

impl Freshness {
    pub fn classify(age_hours: f64) -> Self {
        if age_hours <= 24.0 {
            Self::Fresh
        } else if age_hours <= 72.0 {
            Self::Stale
        } else {
            Self::Old
        }
    }

    pub fn color(self) -> &'static str {
        match self {
            Self::Fresh => "#22c55e",
            Self::Stale => "#f59e0b",
            Self::Old => "#ef4444",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FreshnessView {
    pub updated_text: String,
    pub band: Option<Freshness>,
    pub color: Option<&'static str>,
    pub title: Option<String>,
}

pub fn freshness(updated_at: Option<&str>, now: DateTime<Utc>) -> FreshnessView {
    let Some(ts) = updated_at.and_then(parse_timestamp) else {
        return FreshnessView {
            updated_text: UNKNOWN_TIME.to_string(),
            band: None,
            color: None,
            title: None,
        };
    };
    let hours = (now - ts).num_milliseconds() as f64 / 3_600_000.0;
    let band = Freshness::classify(hours);
    FreshnessView {
        updated_text: ts.format("%Y-%m-%d %H:%M UTC").to_string(),
        band: Some(band),
        color: Some(band.color()),
        title: Some(format!("Data age: {hours:.1}h")),
    }
}

fn denominator(g: &GoalPair) -> Option<f64> {
    match (g.stretch, g.goal) {
        (Some(s), _) if s != 0.0 => Some(s),
        (_, Some(goal)) if goal != 0.0 => Some(goal),
        (None, None) => Some(1.0),
        _ => None,
    }
}

/// Percent of the stretch target (or the plain goal), clamped to 0..=100.
pub fn progress_pct(value: f64, goal: Option<&GoalPair>) -> u8 {
    let Some(d) = goal.and_then(denominator) else {
        return 0;
    };
    let p = round_half_up(value / d * 100.0);
    if !p.is_finite() {
        return 0;
    }
    clamp(p, 0.0, 100.0) as u8
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SpendSplit {
    pub spent: u8,
    pub saved: u8,
}

impl SpendSplit {
    pub fn label(&self) -> String {
        format!("{}% spent / {}% saved", self.spent, self.saved)
    }
}

pub fn spend_split(raw: Option<f64>, scale: SpendScale) -> SpendSplit {
    let raw = raw.unwrap_or(0.0);
    let scaled = match scale {
        SpendScale::Fraction => raw * 100.0,
        SpendScale::Percent => raw,
    };
    let spent = clamp(round_half_up(scaled), 0.0, 100.0) as u8;
    SpendSplit {
        spent,
        saved: 100 - spent,
    }
}

pub fn referral_total(referrals: &Doc<Referrals>) -> f64 {
    referrals
        .present()
        .and_then(|r| r.counts.as_ref())
        .map(|counts| counts.iter().sum())
        .unwrap_or(0.0)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct MerchantStats {
    pub count: usize,
    pub cities: usize,
    pub volume: f64,
}

pub fn merchant_stats(merchants: &[Merchant]) -> MerchantStats {
    let cities = merchants
        .iter()
        .filter_map(|m| m.city.as_deref())
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .collect::<HashSet<_>>();
    MerchantStats {
        count: merchants.len(),
        cities: cities.len(),
        volume: merchants.iter().map(|m| m.monthly_volume.unwrap_or(0.0)).sum(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectRow {
    pub label: &'static str,
    pub value: i64,
}

pub fn project_rows(p: &Projects) -> [ProjectRow; 4] {
    [
        ("Proposed", p.proposed),
        ("Approved", p.approved),
        ("Funded", p.funded),
        ("Delivered", p.delivered),
    ]
    .map(|(label, v)| ProjectRow {
        label,
        value: v.unwrap_or(0),
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MerchantRow {
    pub name: String,
    pub url: Option<String>,
    pub city: String,
    pub since: String,
    pub volume: f64,
}

pub fn merchant_rows(merchants: &[Merchant]) -> Vec<MerchantRow> {
    merchants
        .iter()
        .map(|m| MerchantRow {
            name: m.name.clone().unwrap_or_else(|| "—".to_string()),
            url: m.url.clone(),
            city: m.city.clone().unwrap_or_default(),
            since: m.since.clone().unwrap_or_default(),
            volume: m.monthly_volume.unwrap_or(0.0),
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartSeries {
    pub labels: Vec<String>,
    pub values: Vec<f64>,
}

pub fn treasury_chart(metrics: &Metrics) -> Option<ChartSeries> {
    if metrics.treasury_series.is_empty() {
        return None;
    }
    Some(ChartSeries {
        labels: metrics.treasury_series.iter().map(|p| p.date.clone()).collect(),
        values: metrics.treasury_series.iter().map(|p| p.amount).collect(),
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapMarker {
    pub lat: f64,
    pub lng: f64,
    pub name: String,
    pub city: String,
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Camera {
    Center { lat: f64, lng: f64, zoom: u8 },
    /// `[[south, west], [north, east]]`.
    Fit { bounds: [[f64; 2]; 2], padding: [u32; 2] },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapView {
    pub markers: Vec<MapMarker>,
    pub camera: Camera,
}

/// `None` means no merchant carries usable coordinates.
pub fn map_view(merchants: &[Merchant]) -> Option<MapView> {
    let markers = merchants
        .iter()
        .filter_map(|m| {
            let (lat, lng) = m.geo()?;
            Some(MapMarker {
                lat,
                lng,
                name: m.name.clone().unwrap_or_else(|| "Merchant".to_string()),
                city: m.city.clone().unwrap_or_default(),
                url: m.url.clone(),
            })
        })
        .collect::<Vec<_>>();

    let camera = match markers.as_slice() {
        [] => return None,
        [only] => Camera::Center {
            lat: only.lat,
            lng: only.lng,
            zoom: SINGLE_POINT_ZOOM,
        },
        many => {
            let mut south = f64::INFINITY;
            let mut west = f64::INFINITY;
            let mut north = f64::NEG_INFINITY;
            let mut east = f64::NEG_INFINITY;
            for p in many {
                south = south.min(p.lat);
                north = north.max(p.lat);
                west = west.min(p.lng);
                east = east.max(p.lng);
            }
            Camera::Fit {
                bounds: [[south, west], [north, east]],
                padding: [FIT_PADDING_PX, FIT_PADDING_PX],
            }
        }
    };
    Some(MapView { markers, camera })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Kpi {
    pub text: String,
    pub bar_pct: u8,
}

/// Everything the page shows, one field per slot group.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardView {
    pub freshness: FreshnessView,
    pub holders: Kpi,
    pub active: Kpi,
    pub treasury: Kpi,
    pub merchants: Kpi,
    pub spend: SpendSplit,
    pub referrals_total: String,
    pub referrals_note: &'static str,
    pub merchant_stats: MerchantStats,
    pub projects: [ProjectRow; 4],
    pub merchant_rows: Vec<MerchantRow>,
    pub chart: Option<ChartSeries>,
    pub map: Option<MapView>,
    /// The metrics record with merchant statistics folded in.
    pub metrics: Metrics,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RenderPass {
    Placeholder,
    Dashboard(Box<DashboardView>),
}

pub fn build_view(
    goals: &Doc<Goals>,
    metrics: &Doc<Metrics>,
    merchants: &Doc<Merchants>,
    referrals: &Doc<Referrals>,
    scale: SpendScale,
    now: DateTime<Utc>,
) -> RenderPass {
    let Some(metrics) = metrics.present() else {
        return RenderPass::Placeholder;
    };
    let goal = |name: &str| goals.present().and_then(|g| g.get(name));
    let merchant_list: &[Merchant] = merchants
        .present()
        .map(|m| m.entries.as_slice())
        .unwrap_or(&[]);

    let stats = merchant_stats(merchant_list);
    let mut metrics = metrics.clone();
    if merchants.present().is_some() {
        metrics.merchant_count = Some(stats.count);
        metrics.merchant_cities = Some(stats.cities);
        metrics.merchant_volume = Some(stats.volume);
    }

    let holders = metrics.holders.unwrap_or(0);
    let active = metrics.active_wallets_30d.unwrap_or(0);
    let treasury_usd = round_half_up(metrics.treasury_usd.unwrap_or(0.0));

    RenderPass::Dashboard(Box::new(DashboardView {
        freshness: freshness(metrics.updated_at.as_deref(), now),
        holders: Kpi {
            text: fmt_thousands(holders),
            bar_pct: progress_pct(holders as f64, goal("holders")),
        },
        active: Kpi {
            text: fmt_thousands(active),
            bar_pct: progress_pct(active as f64, goal("active_wallets_30d")),
        },
        treasury: Kpi {
            text: format!("${}", fmt_thousands(treasury_usd as i64)),
            bar_pct: progress_pct(treasury_usd, goal("treasury_usd")),
        },
        merchants: Kpi {
            text: fmt_thousands(stats.count as i64),
            bar_pct: progress_pct(stats.count as f64, goal("merchants")),
        },
        spend: spend_split(metrics.spent_pct_30d, scale),
        referrals_total: fmt_number(referral_total(referrals)),
        referrals_note: "from tracked sources",
        merchant_stats: stats,
        projects: project_rows(&metrics.projects),
        merchant_rows: merchant_rows(merchant_list),
        chart: treasury_chart(&metrics),
        map: map_view(merchant_list),
        metrics,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn pair(goal: Option<f64>, stretch: Option<f64>) -> GoalPair {
        GoalPair { goal, stretch }
    }

    fn merchant(name: &str, city: Option<&str>, geo: Option<(f64, f64)>) -> Merchant {
        Merchant {
            name: Some(name.to_string()),
            city: city.map(|c| c.to_string()),
            lat: geo.map(|g| g.0),
            lng: geo.map(|g| g.1),
            ..Merchant::default()
        }
    }

    #[test]
    fn progress_uses_stretch_then_goal() {
        assert_eq!(progress_pct(250.0, Some(&pair(Some(500.0), Some(1000.0)))), 25);
        assert_eq!(progress_pct(250.0, Some(&pair(Some(500.0), None))), 50);
        assert_eq!(progress_pct(250.0, Some(&pair(Some(500.0), Some(0.0)))), 50);
        assert_eq!(progress_pct(5000.0, Some(&pair(Some(500.0), None))), 100);
        assert_eq!(progress_pct(-10.0, Some(&pair(Some(500.0), None))), 0);
    }

    #[test]
    fn progress_without_usable_goal_is_zero() {
        assert_eq!(progress_pct(250.0, None), 0);
        assert_eq!(progress_pct(250.0, Some(&pair(Some(0.0), None))), 0);
        assert_eq!(progress_pct(250.0, Some(&pair(Some(0.0), Some(0.0)))), 0);
    }

    #[test]
    fn progress_matches_clamped_rounding_for_many_goals() {
        for g in [1.0, 3.0, 7.5, 120.0, 999.0] {
            for v in [0.0, 0.4, 1.0, 2.5, 60.0, 500.0, 10_000.0] {
                let expected = clamp(round_half_up(v / g * 100.0), 0.0, 100.0) as u8;
                assert_eq!(progress_pct(v, Some(&pair(Some(g), None))), expected, "v={v} g={g}");
            }
        }
    }

    #[test]
    fn spend_split_by_scale() {
        let s = spend_split(Some(0.375), SpendScale::Fraction);
        assert_eq!((s.spent, s.saved), (38, 62));
        assert_eq!(s.label(), "38% spent / 62% saved");
        let s = spend_split(Some(37.5), SpendScale::Percent);
        assert_eq!((s.spent, s.saved), (38, 62));
        let s = spend_split(Some(1.7), SpendScale::Fraction);
        assert_eq!((s.spent, s.saved), (100, 0));
        let s = spend_split(None, SpendScale::Percent);
        assert_eq!((s.spent, s.saved), (0, 100));
    }

    #[test]
    fn referral_totals() {
        let present = Doc::Present(Referrals {
            counts: Some(vec![3.0, 5.0]),
        });
        assert_eq!(referral_total(&present), 8.0);
        assert_eq!(referral_total(&Doc::Absent), 0.0);
        assert_eq!(referral_total(&Doc::Malformed("x".into())), 0.0);
        assert_eq!(referral_total(&Doc::Present(Referrals { counts: None })), 0.0);
    }

    #[test]
    fn distinct_cities_ignore_blank_and_whitespace() {
        let list = vec![
            merchant("a", Some("Detroit"), None),
            merchant("b", Some(" Detroit "), None),
            merchant("c", Some("  "), None),
            merchant("d", None, None),
            merchant("e", Some("Accra"), None),
        ];
        let s = merchant_stats(&list);
        assert_eq!(s.count, 5);
        assert_eq!(s.cities, 2);
        assert!(s.cities <= s.count);
        assert_eq!(merchant_stats(&[]), MerchantStats::default());
    }

    #[test]
    fn merchant_volume_sums_numbers_only() {
        let mut a = merchant("a", None, None);
        a.monthly_volume = Some(120.5);
        let b = merchant("b", None, None);
        let mut c = merchant("c", None, None);
        c.monthly_volume = Some(30.0);
        assert_eq!(merchant_stats(&[a, b, c]).volume, 150.5);
    }

    #[test]
    fn projects_always_four_rows() {
        let rows = project_rows(&Projects {
            proposed: Some(2),
            ..Projects::default()
        });
        let flat = rows.iter().map(|r| (r.label, r.value)).collect::<Vec<_>>();
        assert_eq!(
            flat,
            vec![("Proposed", 2), ("Approved", 0), ("Funded", 0), ("Delivered", 0)]
        );
    }

    #[test]
    fn merchant_rows_default_blank_columns() {
        let mut linked = merchant("Shop", None, None);
        linked.url = Some("https://shop.example".into());
        let rows = merchant_rows(&[linked, Merchant::default()]);
        assert_eq!(rows[0].url.as_deref(), Some("https://shop.example"));
        assert_eq!(rows[1].name, "—");
        assert_eq!(rows[1].city, "");
        assert_eq!(rows[1].since, "");
        assert_eq!(rows[1].volume, 0.0);
    }

    #[test]
    fn map_hidden_without_geodata() {
        assert!(map_view(&[]).is_none());
        assert!(map_view(&[merchant("a", Some("X"), None)]).is_none());
    }

    #[test]
    fn single_merchant_centers_at_close_zoom() {
        let v = map_view(&[merchant("Cafe", Some("Detroit"), Some((42.33, -83.05)))]).unwrap();
        assert_eq!(
            v.camera,
            Camera::Center {
                lat: 42.33,
                lng: -83.05,
                zoom: SINGLE_POINT_ZOOM
            }
        );
        assert_eq!(v.markers.len(), 1);
    }

    #[test]
    fn several_merchants_fit_bounds() {
        let list = vec![
            merchant("a", None, Some((42.33, -83.05))),
            merchant("b", None, None),
            merchant("c", None, Some((5.6, -0.19))),
            merchant("d", None, Some((40.71, -74.0))),
        ];
        let v = map_view(&list).unwrap();
        assert_eq!(v.markers.len(), 3);
        match v.camera {
            Camera::Fit { bounds, padding } => {
                assert_eq!(bounds, [[5.6, -83.05], [42.33, -0.19]]);
                assert_eq!(padding, [20, 20]);
                for m in &v.markers {
                    assert!(m.lat >= bounds[0][0] && m.lat <= bounds[1][0]);
                    assert!(m.lng >= bounds[0][1] && m.lng <= bounds[1][1]);
                }
            }
            other => panic!("expected fit, got {other:?}"),
        }
    }

    #[test]
    fn freshness_bands() {
        let now = Utc::now();
        let at = |h: i64| (now - Duration::hours(h)).to_rfc3339();
        assert_eq!(freshness(Some(at(10).as_str()), now).band, Some(Freshness::Fresh));
        assert_eq!(freshness(Some(at(48).as_str()), now).band, Some(Freshness::Stale));
        assert_eq!(freshness(Some(at(100).as_str()), now).band, Some(Freshness::Old));
        assert_eq!(freshness(Some(at(48).as_str()), now).color, Some("#f59e0b"));
        assert_eq!(freshness(Some(at(10).as_str()), now).title.as_deref(), Some("Data age: 10.0h"));
    }

    #[test]
    fn unparseable_timestamp_skips_coloring() {
        let f = freshness(Some("last tuesday"), Utc::now());
        assert_eq!(f.updated_text, UNKNOWN_TIME);
        assert_eq!(f.band, None);
        assert_eq!(f.color, None);
        assert_eq!(freshness(None, Utc::now()).band, None);
    }

    #[test]
    fn missing_metrics_is_placeholder() {
        let pass = build_view(
            &Doc::Absent,
            &Doc::Malformed("expected object".into()),
            &Doc::Absent,
            &Doc::Absent,
            SpendScale::Fraction,
            Utc::now(),
        );
        assert_eq!(pass, RenderPass::Placeholder);
    }

    #[test]
    fn full_view_from_documents() {
        let metrics = Metrics {
            updated_at: Some(Utc::now().to_rfc3339()),
            holders: Some(1250),
            treasury_usd: Some(45_210.4),
            spent_pct_30d: Some(0.25),
            ..Metrics::default()
        };
        let mut goals = Goals::default();
        goals.targets.insert("holders".into(), pair(Some(1000.0), Some(5000.0)));
        goals.targets.insert("treasury_usd".into(), pair(Some(100_000.0), None));
        let merchants = Merchants {
            entries: vec![merchant("a", Some("Detroit"), Some((42.33, -83.05)))],
        };

        let pass = build_view(
            &Doc::Present(goals),
            &Doc::Present(metrics),
            &Doc::Present(merchants),
            &Doc::Present(Referrals {
                counts: Some(vec![3.0, 5.0]),
            }),
            SpendScale::Fraction,
            Utc::now(),
        );
        let RenderPass::Dashboard(v) = pass else {
            panic!("expected dashboard");
        };
        assert_eq!(v.holders.text, "1,250");
        assert_eq!(v.holders.bar_pct, 25);
        assert_eq!(v.treasury.text, "$45,210");
        assert_eq!(v.treasury.bar_pct, 45);
        assert_eq!(v.active.text, "0");
        assert_eq!(v.active.bar_pct, 0);
        assert_eq!(v.spend.label(), "25% spent / 75% saved");
        assert_eq!(v.referrals_total, "8");
        assert_eq!(v.metrics.merchant_count, Some(1));
        assert_eq!(v.metrics.merchant_cities, Some(1));
        assert_eq!(v.freshness.band, Some(Freshness::Fresh));
        assert!(v.chart.is_none());
        assert!(v.map.is_some());
    }
}
