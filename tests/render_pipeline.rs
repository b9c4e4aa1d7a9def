use chrono::{Duration, Utc};
use tribeboard::{
    aggregate::{build_view, Camera, Freshness, RenderPass},
    config::SpendScale,
    loader::Loader,
    render::{render_page, PageOptions},
};

fn write(dir: &std::path::Path, name: &str, body: &str) {
    std::fs::write(dir.join(name), body).unwrap();
}

async fn pass_for(dir: &std::path::Path, scale: SpendScale) -> RenderPass {
    let loader = Loader::dir(dir.to_str().unwrap());
    let inputs = loader.load_all().await;
    build_view(
        &inputs.goals,
        &inputs.metrics,
        &inputs.merchants,
        &inputs.referrals,
        scale,
        Utc::now(),
    )
}

#[tokio::test]
async fn full_dataset_renders_every_slot() {
    let dir = tempfile::tempdir().unwrap();
    let updated = (Utc::now() - Duration::hours(48)).to_rfc3339();
    write(
        dir.path(),
        "metrics.json",
        &format!(
            r#"{{
  "updated_at": "{updated}",
  "holders": 1250,
  "active_wallets_30d": 310,
  "treasury_usd": 45210.4,
  "spent_pct_30d": 0.4,
  "projects": {{"proposed": 5, "approved": 3, "funded": 2}},
  "treasury_series": [["2025-02-01", 40000], ["2025-03-01", 45210]]
}}"#
        ),
    );
    write(
        dir.path(),
        "goals.json",
        r#"{"holders": {"goal": 1000, "stretch": 2500}, "treasury_usd": {"goal": 90000}}"#,
    );
    write(
        dir.path(),
        "merchants.json",
        r#"[
  {"name": "Ubuntu Cafe", "url": "https://ubuntu.example", "city": "Detroit", "since": "2024-05", "monthly_volume": 1200, "lat": 42.33, "lng": -83.05},
  {"name": "Kente Corner", "city": "Accra", "monthly_volume": "n/a", "lat": 5.6, "lng": -0.19},
  {"name": "Pop-up", "city": " Detroit "}
]"#,
    );
    write(dir.path(), "referrals.json", r#"{"items": [{"count": 3}, {"count": 5}]}"#);

    let RenderPass::Dashboard(view) = pass_for(dir.path(), SpendScale::Fraction).await else {
        panic!("expected a dashboard");
    };
    assert_eq!(view.freshness.band, Some(Freshness::Stale));
    assert_eq!(view.holders.bar_pct, 50);
    assert_eq!(view.treasury.bar_pct, 50);
    assert_eq!(view.spend.label(), "40% spent / 60% saved");
    assert_eq!(view.referrals_total, "8");
    assert_eq!(view.merchant_stats.count, 3);
    assert_eq!(view.merchant_stats.cities, 2);
    assert_eq!(view.merchant_stats.volume, 1200.0);
    assert_eq!(view.metrics.merchant_count, Some(3));
    assert_eq!(view.projects[2].value, 2);
    assert_eq!(view.projects[3].value, 0);
    assert_eq!(view.chart.as_ref().unwrap().values, vec![40000.0, 45210.0]);
    assert!(matches!(view.map.as_ref().unwrap().camera, Camera::Fit { .. }));

    let html = render_page(&RenderPass::Dashboard(view), &PageOptions::default());
    for slot in [
        "updatedAt", "freshDot", "holdersBar", "treasuryBar", "spendBar", "referralsNote",
        "projRows", "merchRows", "treasuryChart", "mapNotice",
    ] {
        assert!(html.contains(&format!(r#"id="{slot}""#)), "missing slot {slot}");
    }
    assert!(html.contains("#f59e0b"));
    assert!(html.contains(r#"id="holdersBar" style="width: 50%""#));
}

#[tokio::test]
async fn percent_scale_is_not_multiplied() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "metrics.json", r#"{"spent_pct_30d": 40}"#);
    let RenderPass::Dashboard(view) = pass_for(dir.path(), SpendScale::Percent).await else {
        panic!("expected a dashboard");
    };
    assert_eq!((view.spend.spent, view.spend.saved), (40, 60));
}

#[tokio::test]
async fn only_metrics_present_degrades_other_sections() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "metrics.json", r#"{"holders": 9, "updated_at": "garbage"}"#);
    write(dir.path(), "goals.json", r#"["not", "an", "object"]"#);

    let RenderPass::Dashboard(view) = pass_for(dir.path(), SpendScale::Fraction).await else {
        panic!("expected a dashboard");
    };
    assert_eq!(view.holders.text, "9");
    assert_eq!(view.holders.bar_pct, 0);
    assert_eq!(view.freshness.band, None);
    assert_eq!(view.referrals_total, "0");
    assert!(view.merchant_rows.is_empty());
    assert!(view.map.is_none());
    assert!(view.chart.is_none());
    assert_eq!(view.metrics.merchant_count, None);
    assert_eq!(view.projects.len(), 4);
}

#[tokio::test]
async fn missing_metrics_renders_placeholder() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "goals.json", r#"{"holders": {"goal": 10}}"#);
    let pass = pass_for(dir.path(), SpendScale::Fraction).await;
    assert_eq!(pass, RenderPass::Placeholder);
    let html = render_page(&pass, &PageOptions::default());
    assert!(html.contains("— (awaiting data/metrics.json)"));
}
