//! Ordered key/value store, one SQLite file per store name.
//!
//! Each handle owns a single connection, so inserts through one handle are
//! serialized.

use std::path::{Path, PathBuf};

use common::Pair;
use futures::{stream::BoxStream, StreamExt};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow},
    Row,
};
use thiserror::Error;
use tracing::warn;

const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS pairs (key TEXT, value TEXT)";
const INSERT: &str = "INSERT INTO pairs (key, value) VALUES (?, ?)";
const SCAN_ALL: &str = "SELECT key, value FROM pairs";
const SCAN_ORDERED: &str = "SELECT key, value FROM pairs ORDER BY key, value";

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store {} does not exist", .0.display())]
    NotFound(PathBuf),

    #[error("malformed record in {}: {reason}", .path.display())]
    Malformed { path: PathBuf, reason: String },
}

impl StoreError {
    /// Record-level error: the row is unusable but the store is still
    /// readable.
    pub fn is_malformed(&self) -> bool {
        matches!(self, StoreError::Malformed { .. })
    }
}

#[derive(Debug)]
pub struct Store {
    pool: SqlitePool,
    path: PathBuf,
}

impl Store {
    /// Empty store at `path`, discarding anything already there.
    pub async fn create(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        match tokio::fs::remove_file(path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        Self::connect(path, true).await
    }

    /// Existing store at `path`.
    pub async fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        if !tokio::fs::try_exists(path).await? {
            return Err(StoreError::NotFound(path.to_path_buf()));
        }
        Self::connect(path, false).await
    }

    pub async fn open_or_create(path: impl AsRef<Path>) -> StoreResult<Self> {
        Self::connect(path.as_ref(), true).await
    }

    async fn connect(path: &Path, create: bool) -> StoreResult<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(create);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        sqlx::query(CREATE_TABLE).execute(&pool).await?;
        Ok(Self {
            pool,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn insert(&self, pair: &Pair) -> StoreResult<()> {
        sqlx::query(INSERT)
            .bind(&pair.key)
            .bind(&pair.value)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Inserts `pairs` in one transaction; durable once this returns.
    pub async fn insert_batch(&self, pairs: &[Pair]) -> StoreResult<()> {
        if pairs.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await?;
        for pair in pairs {
            sqlx::query(INSERT)
                .bind(&pair.key)
                .bind(&pair.value)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Commits and empties `batch`, returning how many pairs it held.
    pub async fn append(&self, batch: &mut Vec<Pair>) -> StoreResult<u64> {
        self.insert_batch(batch).await?;
        let n = batch.len() as u64;
        batch.clear();
        Ok(n)
    }

    /// Every pair, in no particular order.
    pub fn scan_all(&self) -> BoxStream<'_, StoreResult<Pair>> {
        self.scan(SCAN_ALL)
    }

    /// Every pair, sorted by key then value.
    pub fn scan_ordered(&self) -> BoxStream<'_, StoreResult<Pair>> {
        self.scan(SCAN_ORDERED)
    }

    fn scan(&self, sql: &'static str) -> BoxStream<'_, StoreResult<Pair>> {
        let path = &self.path;
        sqlx::query(sql)
            .fetch(&self.pool)
            .map(move |row| decode(path, row?))
            .boxed()
    }

    pub async fn count(&self) -> StoreResult<u64> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM pairs")
            .fetch_one(&self.pool)
            .await?;
        Ok(n as u64)
    }

    pub async fn close(self) {
        self.pool.close().await;
    }
}

fn decode(path: &Path, row: SqliteRow) -> StoreResult<Pair> {
    let malformed = |reason: String| StoreError::Malformed {
        path: path.to_path_buf(),
        reason,
    };
    let key: Option<String> = row.try_get(0).map_err(|e| malformed(e.to_string()))?;
    let value: Option<String> = row.try_get(1).map_err(|e| malformed(e.to_string()))?;
    match (key, value) {
        (Some(key), Some(value)) => Ok(Pair { key, value }),
        (None, _) => Err(malformed("null key".to_string())),
        (Some(key), None) => Err(malformed(format!("null value for key `{key}`"))),
    }
}

/// Drops malformed records from a scan, logging each one. Fatal errors pass
/// through.
pub fn skip_malformed<'a>(
    scan: BoxStream<'a, StoreResult<Pair>>,
) -> BoxStream<'a, StoreResult<Pair>> {
    scan.filter(|item| {
        let keep = match item {
            Err(e) if e.is_malformed() => {
                warn!("skipping record: {e}");
                false
            }
            _ => true,
        };
        futures::future::ready(keep)
    })
    .boxed()
}

/// Writes rows as-is, NULL values included, bypassing `Store`.
#[cfg(test)]
pub(crate) async fn raw_rows(path: &Path, rows: &[(&str, Option<&str>)]) {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true);
    let pool = SqlitePool::connect_with(options).await.unwrap();
    sqlx::query(CREATE_TABLE).execute(&pool).await.unwrap();
    for (k, v) in rows {
        sqlx::query(INSERT)
            .bind(*k)
            .bind(*v)
            .execute(&pool)
            .await
            .unwrap();
    }
    pool.close().await;
}
