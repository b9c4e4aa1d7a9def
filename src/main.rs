use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};

use tribeboard::{
    aggregate::{build_view, RenderPass},
    chain::TokenReader,
    config::{Settings, SpendScale},
    dashboard::{self, DashboardState},
    loader::Loader,
    render::{render_page, PageOptions},
    updater,
};

#[derive(Debug, Parser)]
#[command(name = "tribeboard", version)]
struct Cli {
    /// Override DATA_SOURCE (directory or http(s) base URL)
    #[arg(long, global = true)]
    data: Option<String>,

    /// Override SPEND_PCT_SCALE (fraction|percent)
    #[arg(long, global = true)]
    spend_scale: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Serve the live dashboard (default)
    Serve {
        #[arg(long, env = "DASHBOARD_PORT")]
        port: Option<u16>,
        /// Drop every cached snapshot before starting
        #[arg(long)]
        reset_cache: bool,
    },
    /// Write the dashboard once as a static HTML file
    Render {
        #[arg(long, default_value = "dashboard.html")]
        out: PathBuf,
    },
    /// Refresh metrics.json from the chain explorer and price feed
    Update,
    /// Print token balances for an account
    Balance { address: String },
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let mut settings = Settings::load()?;
    if let Some(d) = cli.data {
        settings.data_source = d;
    }
    if let Some(s) = cli.spend_scale {
        settings.spend_scale = SpendScale::parse(&s)?;
    }
    settings.validate()?;

    log::info!(
        "app.start data={} remote={} spend_scale={:?} network={:?}",
        settings.data_source,
        settings.data_is_remote(),
        settings.spend_scale,
        settings.network
    );

    match cli.command.unwrap_or(Command::Serve {
        port: None,
        reset_cache: false,
    }) {
        Command::Serve { port, reset_cache } => {
            if let Some(p) = port {
                settings.dashboard_port = p;
            }
            let loader = Loader::from_settings(&settings)?;
            if reset_cache {
                if let Some(cache) = loader.cache() {
                    cache.clear()?;
                    log::warn!("cache.reset path={}", cache.path());
                }
            }
            let reader = TokenReader::from_settings(&settings)?;
            if settings.dashboard_open_browser {
                let url = format!("http://{}:{}/", settings.dashboard_host, settings.dashboard_port);
                tokio::spawn(async move {
                    tokio::time::sleep(std::time::Duration::from_millis(650)).await;
                    let _ = std::process::Command::new("xdg-open").arg(&url).spawn();
                });
            }
            dashboard::serve_dashboard(DashboardState::new(settings, loader, reader)).await?;
        }
        Command::Render { out } => {
            let loader = Loader::from_settings(&settings)?;
            let inputs = loader.load_all().await;
            let pass = build_view(
                &inputs.goals,
                &inputs.metrics,
                &inputs.merchants,
                &inputs.referrals,
                settings.spend_scale,
                Utc::now(),
            );
            if matches!(pass, RenderPass::Placeholder) {
                log::warn!("render.placeholder metrics={}", inputs.metrics.status());
            }
            let html = render_page(&pass, &PageOptions::default());
            std::fs::write(&out, html).with_context(|| format!("write {}", out.display()))?;
            log::info!("render.done out={} documents={}", out.display(), inputs.statuses());
        }
        Command::Update => {
            let r = updater::run(&settings).await?;
            log::info!(
                "update.done updated_at={} treasury_usd={} eth={:.4} eth_usd={} merchants={}",
                r.updated_at,
                r.treasury_usd,
                r.balance_eth,
                r.eth_usd,
                r.merchants
            );
        }
        Command::Balance { address } => {
            let reader = TokenReader::from_settings(&settings)?;
            let summary = reader.account_summary(&address).await?;
            for line in summary.lines() {
                println!("{line}");
            }
        }
    }
    Ok(())
}
