//! Full-text search indexing.
//!
//! The pipeline depends only on the [`Indexer`] trait; the SQLite FTS5
//! store is one implementation, and [`NoopIndexer`] stands in when
//! indexing is disabled (tests, single-package runs).
//!
//! # Schema
//!
//! | Table | Purpose |
//! |-------|---------|
//! | `manpages` | One row per fragment, keyed by site path |
//! | `manpages_fts` | FTS5 index over `(title, content)`, kept in sync via triggers |
//!
//! The schema is dropped and recreated on construction: the index is
//! rebuilt from scratch on each ingest, so no migrations exist.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Rows buffered per transaction before a commit, amortizing fsync cost.
const BATCH_SIZE: usize = 500;

/// A manpage document to be indexed for search.
#[derive(Debug, Clone)]
pub struct Document {
    pub title: String,
    /// Site-absolute fragment path, e.g. `/manpages/noble/man1/ls.1.html`.
    pub path: String,
    pub section: u32,
    pub distro: String,
    pub language: String,
    /// Tag-stripped fragment body.
    pub content: String,
}

/// Search indexing abstraction so the pipeline does not depend on a
/// specific store.
#[async_trait]
pub trait Indexer: Send + Sync {
    async fn index_manpage(&self, doc: Document) -> Result<()>;
    /// Flushes any buffered writes and closes the store.
    async fn close(&self) -> Result<()>;
}

/// Indexer that drops every document. Simplifies tests and runs where
/// search is not wanted.
pub struct NoopIndexer;

#[async_trait]
impl Indexer for NoopIndexer {
    async fn index_manpage(&self, _doc: Document) -> Result<()> {
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

const SCHEMA: &str = r#"
DROP TRIGGER IF EXISTS manpages_au;
DROP TRIGGER IF EXISTS manpages_ad;
DROP TRIGGER IF EXISTS manpages_ai;
DROP TABLE IF EXISTS manpages_fts;
DROP TABLE IF EXISTS manpages;

CREATE TABLE manpages (
    path TEXT PRIMARY KEY,
    title TEXT NOT NULL,
    section INTEGER NOT NULL,
    distro TEXT NOT NULL,
    language TEXT NOT NULL DEFAULT '',
    content TEXT NOT NULL
);

CREATE VIRTUAL TABLE manpages_fts USING fts5(
    title, content,
    content='manpages',
    content_rowid='rowid'
);

CREATE TRIGGER manpages_ai AFTER INSERT ON manpages BEGIN
    INSERT INTO manpages_fts(rowid, title, content)
    VALUES (new.rowid, new.title, new.content);
END;

CREATE TRIGGER manpages_ad AFTER DELETE ON manpages BEGIN
    INSERT INTO manpages_fts(manpages_fts, rowid, title, content)
    VALUES ('delete', old.rowid, old.title, old.content);
END;

CREATE TRIGGER manpages_au AFTER UPDATE ON manpages BEGIN
    INSERT INTO manpages_fts(manpages_fts, rowid, title, content)
    VALUES ('delete', old.rowid, old.title, old.content);
    INSERT INTO manpages_fts(rowid, title, content)
    VALUES (new.rowid, new.title, new.content);
END;
"#;

/// Opens the search database, creating parent directories (and optionally
/// the file) as needed. A single connection serializes all access.
pub async fn open_search_pool(path: &Path, create: bool) -> Result<SqlitePool> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).context("create db dir")?;
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))
        .context("parse db path")?
        .create_if_missing(create)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5));

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .context("open search db")?;

    Ok(pool)
}

struct Batch {
    tx: Option<sqlx::Transaction<'static, sqlx::Sqlite>>,
    count: usize,
}

/// Single-writer batched indexer over SQLite FTS5.
///
/// Writes accumulate in one open transaction of up to [`BATCH_SIZE`] rows;
/// the mutex around the batch makes the writer concurrency-safe by
/// construction.
pub struct SqliteIndexer {
    pool: SqlitePool,
    batch: tokio::sync::Mutex<Batch>,
}

impl SqliteIndexer {
    /// Opens (or creates) the index database and recreates the schema.
    pub async fn new(path: &Path) -> Result<SqliteIndexer> {
        let pool = open_search_pool(path, true).await?;
        sqlx::raw_sql(SCHEMA)
            .execute(&pool)
            .await
            .context("create schema")?;

        Ok(SqliteIndexer {
            pool,
            batch: tokio::sync::Mutex::new(Batch { tx: None, count: 0 }),
        })
    }

    async fn flush(&self, batch: &mut Batch) -> Result<()> {
        if let Some(tx) = batch.tx.take() {
            batch.count = 0;
            tx.commit().await.context("commit batch")?;
        }
        Ok(())
    }
}

#[async_trait]
impl Indexer for SqliteIndexer {
    async fn index_manpage(&self, doc: Document) -> Result<()> {
        let mut batch = self.batch.lock().await;

        if batch.tx.is_none() {
            batch.tx = Some(self.pool.begin().await.context("begin tx")?);
        }

        let tx = batch.tx.as_mut().expect("transaction just opened");
        sqlx::query(
            "INSERT OR REPLACE INTO manpages (path, title, section, distro, language, content) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&doc.path)
        .bind(&doc.title)
        .bind(i64::from(doc.section))
        .bind(&doc.distro)
        .bind(&doc.language)
        .bind(&doc.content)
        .execute(&mut **tx)
        .await
        .with_context(|| format!("index manpage {}", doc.path))?;

        batch.count += 1;
        if batch.count >= BATCH_SIZE {
            self.flush(&mut batch).await?;
        }
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let mut batch = self.batch.lock().await;
        self.flush(&mut batch).await?;
        self.pool.close().await;
        Ok(())
    }
}
