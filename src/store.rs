use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};

/// Bumped whenever the cached payload format changes; older rows are purged on init.
pub const CACHE_VERSION: &str = "runtime-v1";

/// Last-good copies of remotely fetched snapshot documents, keyed by URL.
#[derive(Clone)]
pub struct SnapshotCache {
    path: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CachedDocument {
    pub body: Vec<u8>,
    pub fetched_ts: f64,
}

impl SnapshotCache {
    pub fn new(path: &str) -> Result<Self> {
        if path.trim().is_empty() {
            anyhow::bail!("CACHE_PATH is empty");
        }
        if path != ":memory:" && !path.starts_with("file:") {
            if let Some(parent) = Path::new(path).parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("create cache parent dir for {path}"))?;
            }
        }
        // Short-lived connection per operation; Connection is not Sync.
        Ok(Self { path: path.to_string() })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    fn open_conn(&self) -> Result<Connection> {
        let conn = Connection::open(&self.path).with_context(|| format!("open sqlite {}", self.path))?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        Ok(conn)
    }

    /// Creates the table and drops entries written under any other cache version.
    /// Returns how many stale rows were removed.
    pub fn init_db(&self) -> Result<usize> {
        let conn = self.open_conn()?;
        conn.execute_batch(
            r#"
CREATE TABLE IF NOT EXISTS snapshots (
  version TEXT NOT NULL,
  url TEXT NOT NULL,
  body BLOB NOT NULL,
  fetched_ts REAL NOT NULL,
  PRIMARY KEY (version, url)
);
"#,
        )?;
        let purged = conn.execute("DELETE FROM snapshots WHERE version <> ?", params![CACHE_VERSION])?;
        Ok(purged)
    }

    pub fn put(&self, url: &str, body: &[u8], fetched_ts: f64) -> Result<()> {
        let conn = self.open_conn()?;
        conn.execute(
            r#"
INSERT INTO snapshots(version, url, body, fetched_ts)
VALUES(?,?,?,?)
ON CONFLICT(version, url) DO UPDATE SET
  body=excluded.body,
  fetched_ts=excluded.fetched_ts
"#,
            params![CACHE_VERSION, url, body, fetched_ts],
        )?;
        Ok(())
    }

    pub fn get(&self, url: &str) -> Result<Option<CachedDocument>> {
        let conn = self.open_conn()?;
        let row = conn
            .query_row(
                "SELECT body, fetched_ts FROM snapshots WHERE version=? AND url=?",
                params![CACHE_VERSION, url],
                |r| {
                    Ok(CachedDocument {
                        body: r.get(0)?,
                        fetched_ts: r.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    pub fn clear(&self) -> Result<()> {
        let conn = self.open_conn()?;
        conn.execute("DELETE FROM snapshots", [])?;
        Ok(())
    }
}
