use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::header::CACHE_CONTROL;

use crate::{
    config::Settings,
    documents::{Doc, FromSnapshot, Goals, Inputs, Merchants, Metrics, Referrals},
    store::SnapshotCache,
    utils::now_ts,
};

#[derive(Clone)]
pub enum Source {
    Dir(PathBuf),
    Http { base: String, client: reqwest::Client },
}

impl Source {
    fn describe(&self, file: &str) -> String {
        match self {
            Source::Dir(dir) => dir.join(file).display().to_string(),
            Source::Http { base, .. } => join_url(base, file),
        }
    }
}

fn join_url(base: &str, file: &str) -> String {
    if base.ends_with('/') {
        format!("{base}{file}")
    } else {
        format!("{base}/{file}")
    }
}

/// Fetches the four snapshot documents. Remote fetches are network-first and
/// fall back to the last cached copy when the network is unreachable.
#[derive(Clone)]
pub struct Loader {
    source: Source,
    cache: Option<SnapshotCache>,
}

impl Loader {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        if !settings.data_is_remote() {
            return Ok(Self::dir(&settings.data_source));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.fetch_timeout_secs))
            .user_agent(concat!("tribeboard/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("build http client")?;
        let cache = if settings.cache_enabled {
            let cache = SnapshotCache::new(&settings.cache_path)?;
            let purged = cache.init_db()?;
            if purged > 0 {
                log::info!("cache.purge stale_rows={} path={}", purged, cache.path());
            }
            Some(cache)
        } else {
            None
        };
        Ok(Self::http(&settings.data_source, client, cache))
    }

    pub fn dir(path: &str) -> Self {
        Self {
            source: Source::Dir(PathBuf::from(path)),
            cache: None,
        }
    }

    pub fn http(base: &str, client: reqwest::Client, cache: Option<SnapshotCache>) -> Self {
        Self {
            source: Source::Http {
                base: base.to_string(),
                client,
            },
            cache,
        }
    }

    pub fn source(&self) -> &Source {
        &self.source
    }

    pub fn cache(&self) -> Option<&SnapshotCache> {
        self.cache.as_ref()
    }

    /// Every document is requested concurrently; none of them can fail the pass.
    pub async fn load_all(&self) -> Inputs {
        let (goals, metrics, merchants, referrals) = tokio::join!(
            self.load::<Goals>(),
            self.load::<Metrics>(),
            self.load::<Merchants>(),
            self.load::<Referrals>(),
        );
        Inputs {
            goals,
            metrics,
            merchants,
            referrals,
        }
    }

    pub async fn load<T: FromSnapshot>(&self) -> Doc<T> {
        let Some(bytes) = self.read_bytes(T::FILE_NAME).await else {
            return Doc::Absent;
        };
        let doc = T::parse(&bytes);
        if let Doc::Malformed(reason) = &doc {
            log::warn!(
                "loader.malformed file={} reason={}",
                self.source.describe(T::FILE_NAME),
                reason
            );
        }
        doc
    }

    async fn read_bytes(&self, file: &str) -> Option<Vec<u8>> {
        match &self.source {
            Source::Dir(dir) => {
                let path = dir.join(file);
                match tokio::fs::read(&path).await {
                    Ok(b) => Some(b),
                    Err(e) => {
                        log::warn!("loader.fetch.failed path={} err={}", path.display(), e);
                        None
                    }
                }
            }
            Source::Http { base, client } => {
                let url = join_url(base, file);
                match fetch_url(client, &url).await {
                    Ok(FetchOutcome::Body(b)) => {
                        self.store(&url, &b).await;
                        Some(b)
                    }
                    Ok(FetchOutcome::Status(code)) => {
                        log::warn!("loader.fetch.failed url={} status={}", url, code);
                        None
                    }
                    Err(e) => {
                        log::warn!("loader.fetch.failed url={} err={:#}", url, e);
                        self.cached(&url).await
                    }
                }
            }
        }
    }

    // SQLite calls are blocking; keep them off the runtime workers.
    async fn store(&self, url: &str, body: &[u8]) {
        let Some(cache) = self.cache.clone() else {
            return;
        };
        let (key, body) = (url.to_string(), body.to_vec());
        let res = tokio::task::spawn_blocking(move || cache.put(&key, &body, now_ts()))
            .await
            .map_err(anyhow::Error::from)
            .and_then(|r| r);
        if let Err(e) = res {
            log::warn!("cache.put.failed url={} err={:#}", url, e);
        }
    }

    async fn cached(&self, url: &str) -> Option<Vec<u8>> {
        let cache = self.cache.clone()?;
        let key = url.to_string();
        let res = tokio::task::spawn_blocking(move || cache.get(&key))
            .await
            .map_err(anyhow::Error::from)
            .and_then(|r| r);
        match res {
            Ok(Some(doc)) => {
                log::info!(
                    "loader.cache.hit url={} age_secs={:.0}",
                    url,
                    now_ts() - doc.fetched_ts
                );
                Some(doc.body)
            }
            Ok(None) => None,
            Err(e) => {
                log::warn!("cache.get.failed url={} err={:#}", url, e);
                None
            }
        }
    }
}

enum FetchOutcome {
    Body(Vec<u8>),
    Status(u16),
}

/// Transport errors are `Err`; a reachable server answering non-2xx is `Status`.
async fn fetch_url(client: &reqwest::Client, url: &str) -> Result<FetchOutcome> {
    let resp = client
        .get(url)
        .header(CACHE_CONTROL, "no-store")
        .send()
        .await
        .with_context(|| format!("GET {url}"))?;
    let status = resp.status();
    if !status.is_success() {
        return Ok(FetchOutcome::Status(status.as_u16()));
    }
    let body = resp.bytes().await.with_context(|| format!("read body {url}"))?;
    Ok(FetchOutcome::Body(body.to_vec()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_base_with_or_without_slash() {
        assert_eq!(join_url("https://x.org/data", "goals.json"), "https://x.org/data/goals.json");
        assert_eq!(join_url("https://x.org/data/", "goals.json"), "https://x.org/data/goals.json");
    }

    #[tokio::test]
    async fn directory_source_loads_and_degrades_per_document() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("metrics.json"), br#"{"holders": 7}"#).unwrap();
        std::fs::write(dir.path().join("merchants.json"), br#"{"oops": true}"#).unwrap();

        let loader = Loader::dir(dir.path().to_str().unwrap());
        let inputs = loader.load_all().await;
        assert_eq!(inputs.metrics.present().unwrap().holders, Some(7));
        assert_eq!(inputs.goals, Doc::Absent);
        assert!(matches!(inputs.merchants, Doc::Malformed(_)));
        assert_eq!(inputs.referrals, Doc::Absent);
    }

    #[tokio::test]
    async fn unreachable_remote_falls_back_to_cache() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SnapshotCache::new(dir.path().join("c.sqlite").to_str().unwrap()).unwrap();
        cache.init_db().unwrap();

        // Port 9 on loopback: nothing listens, the connect fails fast.
        let base = "http://127.0.0.1:9/data";
        cache
            .put(&join_url(base, "metrics.json"), br#"{"holders": 42}"#, now_ts())
            .unwrap();
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(2))
            .build()
            .unwrap();

        let loader = Loader::http(base, client, Some(cache));
        let inputs = loader.load_all().await;
        assert_eq!(inputs.metrics.present().unwrap().holders, Some(42));
        assert_eq!(inputs.goals, Doc::Absent);
    }

    /// Serves `metrics.json` only; every other path is axum's default 404.
    async fn spawn_data_server() -> String {
        let app = axum::Router::new().route(
            "/data/metrics.json",
            axum::routing::get(|| async { r#"{"holders": 5}"# }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/data")
    }

    #[tokio::test]
    async fn error_status_is_absent_and_success_is_cached() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SnapshotCache::new(dir.path().join("c.sqlite").to_str().unwrap()).unwrap();
        cache.init_db().unwrap();

        let base = spawn_data_server().await;
        let goals_url = join_url(&base, "goals.json");
        let metrics_url = join_url(&base, "metrics.json");
        cache
            .put(&goals_url, br#"{"holders": {"goal": 10}}"#, now_ts())
            .unwrap();
        assert!(cache.get(&metrics_url).unwrap().is_none());

        let loader = Loader::http(&base, reqwest::Client::new(), Some(cache.clone()));
        let inputs = loader.load_all().await;

        // The server answered 404, so the cached copy is not used.
        assert_eq!(inputs.goals, Doc::Absent);
        assert_eq!(inputs.metrics.present().unwrap().holders, Some(5));
        let stored = cache.get(&metrics_url).unwrap().unwrap();
        assert_eq!(stored.body, br#"{"holders": 5}"#.to_vec());
        assert!(cache.get(&join_url(&base, "referrals.json")).unwrap().is_none());
    }
}
