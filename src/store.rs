use std::path::Path;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value as JsonValue;
use tokio::sync::{mpsc, oneshot};

use crate::{packet::JobIds, utils::now_ts};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoragePermission {
    Private,
    PublicRead,
}

impl StoragePermission {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoragePermission::Private => "private",
            StoragePermission::PublicRead => "public-read",
        }
    }
}

/// Durable object storage. `run_async` selects whether the caller waits for completion;
/// an async write reports failures through the log only.
pub trait ObjectStore: Send + Sync {
    fn store(
        &self,
        payload: Vec<u8>,
        key: &str,
        permission: StoragePermission,
        run_async: bool,
    ) -> Result<()>;
}

fn key_prefix(job: &JobIds, date: NaiveDate) -> String {
    format!(
        "live/{}/{}/{}-{}",
        job.user_id,
        job.project_id,
        job.deploy_id,
        date.format("%Y-%m-%d")
    )
}

pub fn result_key(job: &JobIds, date: NaiveDate) -> String {
    format!("{}.json", key_prefix(job, date))
}

pub fn log_key(job: &JobIds, date: NaiveDate) -> String {
    format!("{}-log.txt", key_prefix(job, date))
}

struct WriteJob {
    key: String,
    payload: Vec<u8>,
    permission: StoragePermission,
    done: Option<oneshot::Sender<Result<()>>>,
}

/// SQLite-backed object store. Every write, async or not, goes through one writer thread
/// in submission order, so a synchronous write is never overtaken by an older async one.
#[derive(Clone)]
pub struct SqliteStore {
    path: String,
    writer: mpsc::UnboundedSender<WriteJob>,
}

fn open_conn_at(path: &str) -> Result<Connection> {
    let conn = Connection::open(path).with_context(|| format!("open sqlite {path}"))?;
    conn.busy_timeout(std::time::Duration::from_secs(5))?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
    Ok(conn)
}

fn write_object(path: &str, key: &str, payload: &[u8], permission: StoragePermission) -> Result<()> {
    let conn = open_conn_at(path)?;
    conn.execute(
        r#"
INSERT INTO objects(key, payload, permission, size, updated_ts)
VALUES(?,?,?,?,?)
ON CONFLICT(key) DO UPDATE SET
  payload=excluded.payload,
  permission=excluded.permission,
  size=excluded.size,
  updated_ts=excluded.updated_ts
"#,
        params![key, payload, permission.as_str(), payload.len() as i64, now_ts()],
    )?;
    Ok(())
}

impl SqliteStore {
    pub fn new(path: &str) -> Result<Self> {
        if path.trim().is_empty() {
            anyhow::bail!("SQLITE_PATH is empty");
        }
        if path != ":memory:" && !path.starts_with("file:") {
            if let Some(parent) = Path::new(path).parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("create sqlite parent dir for {path}"))?;
            }
        }

        // rusqlite::Connection is not Send/Sync. Keep only the path and open a
        // short-lived connection per operation; WAL keeps concurrent readers cheap.
        let (writer, mut jobs) = mpsc::unbounded_channel::<WriteJob>();
        let db_path = path.to_string();
        std::thread::Builder::new()
            .name("store-write".to_string())
            .spawn(move || {
                // Exits once every store handle is dropped.
                while let Some(job) = jobs.blocking_recv() {
                    let res = write_object(&db_path, &job.key, &job.payload, job.permission);
                    match job.done {
                        Some(done) => {
                            let _ = done.send(res);
                        }
                        None => {
                            if let Err(e) = res {
                                log::error!("store.write_failed key={} err={:#}", job.key, e);
                            }
                        }
                    }
                }
            })
            .context("spawn store writer")?;

        Ok(Self {
            path: path.to_string(),
            writer,
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    fn open_conn(&self) -> Result<Connection> {
        open_conn_at(&self.path)
    }

    pub fn init_db(&self) -> Result<()> {
        let conn = self.open_conn()?;
        conn.execute_batch(
            r#"
CREATE TABLE IF NOT EXISTS objects (
  key TEXT PRIMARY KEY,
  payload BLOB,
  permission TEXT,
  size INTEGER,
  updated_ts REAL
);

CREATE INDEX IF NOT EXISTS idx_objects_ts ON objects(updated_ts);
"#,
        )?;
        Ok(())
    }


    pub fn fetch_object(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let conn = self.open_conn()?;
        let row = conn
            .query_row("SELECT payload FROM objects WHERE key = ?", params![key], |r| {
                r.get::<_, Vec<u8>>(0)
            })
            .optional()?;
        Ok(row)
    }

    // ---- Dashboard queries (read-only) ----

    pub fn list_objects(&self, limit: usize) -> Result<Vec<JsonValue>> {
        let conn = self.open_conn()?;
        let mut stmt = conn.prepare(
            r#"
SELECT key, permission, size, updated_ts
FROM objects
ORDER BY updated_ts DESC
LIMIT ?
"#,
        )?;
        let mut rows = stmt.query(params![limit as i64])?;
        let mut out = vec![];
        while let Some(r) = rows.next()? {
            out.push(serde_json::json!({
                "key": r.get::<_, String>(0)?,
                "permission": r.get::<_, String>(1)?,
                "size": r.get::<_, i64>(2)?,
                "updated_ts": r.get::<_, f64>(3)?,
            }));
        }
        Ok(out)
    }
}

impl ObjectStore for SqliteStore {
    fn store(
        &self,
        payload: Vec<u8>,
        key: &str,
        permission: StoragePermission,
        run_async: bool,
    ) -> Result<()> {
        let (done, wait) = if run_async {
            (None, None)
        } else {
            let (tx, rx) = oneshot::channel();
            (Some(tx), Some(rx))
        };
        self.writer
            .send(WriteJob {
                key: key.to_string(),
                payload,
                permission,
                done,
            })
            .map_err(|_| anyhow::anyhow!("store writer stopped"))?;
        match wait {
            Some(rx) => rx
                .blocking_recv()
                .map_err(|_| anyhow::anyhow!("store writer dropped {key}"))?,
            None => Ok(()),
        }
    }
}
