use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{Html, IntoResponse, Json},
    routing::get,
    Router,
};
use chrono::Utc;
use parking_lot::Mutex;
use serde_json::Value as JsonValue;
use tower_http::{cors::CorsLayer, services::ServeDir};

use crate::{
    aggregate::{build_view, RenderPass},
    chain::{is_address, TokenReader},
    config::Settings,
    documents::Inputs,
    loader::{Loader, Source},
    render::{render_page, PageOptions},
    utils::now_ts,
};

#[derive(Debug, Default)]
struct Health {
    renders: u64,
    last_render_ts: Option<f64>,
    last_statuses: Option<JsonValue>,
    last_placeholder: bool,
}

#[derive(Clone)]
pub struct DashboardState {
    pub settings: Settings,
    pub loader: Loader,
    pub reader: TokenReader,
    health: Arc<Mutex<Health>>,
}

impl DashboardState {
    pub fn new(settings: Settings, loader: Loader, reader: TokenReader) -> Self {
        Self {
            settings,
            loader,
            reader,
            health: Arc::new(Mutex::new(Health::default())),
        }
    }

    /// Load, aggregate, record. Each call is an independent pass.
    async fn render_pass(&self) -> RenderPass {
        let inputs: Inputs = self.loader.load_all().await;
        let pass = build_view(
            &inputs.goals,
            &inputs.metrics,
            &inputs.merchants,
            &inputs.referrals,
            self.settings.spend_scale,
            Utc::now(),
        );
        let mut h = self.health.lock();
        h.renders += 1;
        h.last_render_ts = Some(now_ts());
        h.last_statuses = Some(inputs.statuses());
        h.last_placeholder = matches!(pass, RenderPass::Placeholder);
        pass
    }
}

pub fn router(state: DashboardState) -> Router {
    let data_dir = match state.loader.source() {
        Source::Dir(dir) => Some(dir.clone()),
        Source::Http { .. } => None,
    };

    let mut app = Router::new()
        .route("/", get(index))
        .route("/api/view", get(api_view))
        .route("/api/health", get(api_health))
        .route("/api/balance/{address}", get(api_balance));
    if let Some(dir) = data_dir {
        app = app.nest_service("/data", ServeDir::new(dir));
    }
    app.layer(CorsLayer::permissive()).with_state(state)
}

pub async fn serve_dashboard(state: DashboardState) -> Result<()> {
    let addr: SocketAddr = format!(
        "{}:{}",
        state.settings.dashboard_host, state.settings.dashboard_port
    )
    .parse()
    .context("dashboard addr parse")?;

    let app = router(state);
    log::info!("dashboard.start url=http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("bind {addr}"))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            log::info!("dashboard.shutdown");
        })
        .await?;
    Ok(())
}

async fn index(State(st): State<DashboardState>) -> impl IntoResponse {
    let pass = st.render_pass().await;
    let opts = PageOptions {
        wallet_symbol: Some(st.settings.token_symbol.clone()),
        ..PageOptions::default()
    };
    Html(render_page(&pass, &opts))
}

async fn api_view(State(st): State<DashboardState>) -> impl IntoResponse {
    match st.render_pass().await {
        RenderPass::Placeholder => Json(serde_json::json!({ "placeholder": true })),
        RenderPass::Dashboard(view) => Json(serde_json::json!({
            "placeholder": false,
            "view": view,
        })),
    }
}

async fn api_health(State(st): State<DashboardState>) -> impl IntoResponse {
    let h = st.health.lock();
    Json(serde_json::json!({
        "ts": now_ts(),
        "renders": h.renders,
        "last_render_ts": h.last_render_ts,
        "last_placeholder": h.last_placeholder,
        "documents": h.last_statuses,
        "cache": st.loader.cache().map(|c| c.path().to_string()),
    }))
}

async fn api_balance(
    State(st): State<DashboardState>,
    Path(address): Path<String>,
) -> impl IntoResponse {
    if !is_address(&address) {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"ok": false, "error": "invalid_address"})),
        )
            .into_response();
    }
    match st.reader.account_summary(&address).await {
        Ok(summary) => Json(serde_json::json!({
            "ok": true,
            "lines": summary.lines(),
            "summary": summary,
        }))
        .into_response(),
        Err(e) => {
            log::error!("balance.failed account={} err={:#}", address, e);
            (
                StatusCode::BAD_GATEWAY,
                Json(serde_json::json!({"ok": false, "error": e.to_string()})),
            )
                .into_response()
        }
    }
}
