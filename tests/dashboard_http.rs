use serde_json::Value as JsonValue;
use tribeboard::{
    chain::TokenReader,
    config::Settings,
    dashboard::{router, DashboardState},
    loader::Loader,
};

async fn spawn(dir: &std::path::Path) -> String {
    let settings = Settings {
        data_source: dir.to_str().unwrap().to_string(),
        ..Settings::default()
    };
    let loader = Loader::from_settings(&settings).unwrap();
    let reader = TokenReader::from_settings(&settings).unwrap();
    let app = router(DashboardState::new(settings, loader, reader));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn serves_page_view_health_and_data() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("metrics.json"), r#"{"holders": 77}"#).unwrap();
    let base = spawn(dir.path()).await;
    let client = reqwest::Client::new();

    let html = client.get(format!("{base}/")).send().await.unwrap().text().await.unwrap();
    assert!(html.contains(r#"<div class="val" id="holders">77</div>"#));
    assert!(html.contains(r#"id="connectBtn""#));

    let view: JsonValue = client
        .get(format!("{base}/api/view"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(view["placeholder"], false);
    assert_eq!(view["view"]["holders"]["text"], "77");
    assert_eq!(view["view"]["projects"].as_array().unwrap().len(), 4);

    let health: JsonValue = client
        .get(format!("{base}/api/health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["renders"], 2);
    assert_eq!(health["documents"]["metrics.json"], "present");
    assert_eq!(health["documents"]["goals.json"], "absent");

    let raw = client
        .get(format!("{base}/data/metrics.json"))
        .send()
        .await
        .unwrap();
    assert!(raw.status().is_success());
    assert_eq!(raw.text().await.unwrap(), r#"{"holders": 77}"#);
}

#[tokio::test]
async fn placeholder_when_metrics_missing() {
    let dir = tempfile::tempdir().unwrap();
    let base = spawn(dir.path()).await;
    let view: JsonValue = reqwest::get(format!("{base}/api/view"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(view["placeholder"], true);

    let html = reqwest::get(format!("{base}/")).await.unwrap().text().await.unwrap();
    assert!(html.contains("— (awaiting data/metrics.json)"));
    assert!(!html.contains("connectBtn"));
}

#[tokio::test]
async fn balance_rejects_bad_address() {
    let dir = tempfile::tempdir().unwrap();
    let base = spawn(dir.path()).await;
    let resp = reqwest::get(format!("{base}/api/balance/0xnothex")).await.unwrap();
    assert_eq!(resp.status().as_u16(), 400);
    let body: JsonValue = resp.json().await.unwrap();
    assert_eq!(body["ok"], false);
    assert_eq!(body["error"], "invalid_address");
}
