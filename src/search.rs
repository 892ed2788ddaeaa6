//! Query side of the search index, exposed to the serving layer.

use anyhow::{Context, Result};
use serde::Serialize;
use sqlx::sqlite::SqlitePool;
use sqlx::Row;
use std::path::Path;

use crate::index::open_search_pool;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SearchResult {
    pub title: String,
    pub path: String,
    pub distro: String,
    pub section: i64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SearchResponse {
    pub total: u64,
    pub results: Vec<SearchResult>,
}

pub struct Searcher {
    pool: SqlitePool,
}

impl Searcher {
    pub async fn open(path: &Path) -> Result<Searcher> {
        let pool = open_search_pool(path, false).await?;
        Ok(Searcher { pool })
    }

    pub async fn close(self) {
        self.pool.close().await;
    }

    /// Runs a prefix-phrase search over `(title, content)`.
    ///
    /// Results are filtered to one language (empty string means English),
    /// optionally to one distro, ordered by FTS rank. `total` counts all
    /// matches regardless of `limit`/`offset`.
    pub async fn search(
        &self,
        query: &str,
        distro: &str,
        language: &str,
        limit: i64,
        offset: i64,
    ) -> Result<SearchResponse> {
        let query = sanitize_query(query);
        if query.is_empty() {
            return Ok(SearchResponse::default());
        }
        let limit = if limit <= 0 { 50 } else { limit };

        let mut sql = String::from(
            "SELECT m.title, m.path, m.distro, m.section, COUNT(*) OVER () AS total \
             FROM manpages_fts f \
             JOIN manpages m ON m.rowid = f.rowid \
             WHERE manpages_fts MATCH ? \
               AND m.language = ?",
        );
        if !distro.is_empty() {
            sql.push_str(" AND m.distro = ?");
        }
        sql.push_str(" ORDER BY f.rank LIMIT ? OFFSET ?");

        let mut db_query = sqlx::query(&sql).bind(&query).bind(language);
        if !distro.is_empty() {
            db_query = db_query.bind(distro);
        }
        let rows = db_query
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .context("search query")?;

        let mut response = SearchResponse::default();
        for row in rows {
            let total: i64 = row.get("total");
            response.total = total as u64;
            response.results.push(SearchResult {
                title: row.get("title"),
                path: row.get("path"),
                distro: row.get("distro"),
                section: row.get("section"),
            });
        }
        Ok(response)
    }
}

/// Reduces user input to a safe FTS5 prefix-phrase query: keeps
/// `[A-Za-z0-9 _.-]`, drops SQL-reserved AND/OR/NOT terms, and wraps each
/// remaining token as `"token"*`.
fn sanitize_query(query: &str) -> String {
    let cleaned: String = query
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, ' ' | '-' | '_' | '.') {
                c
            } else {
                ' '
            }
        })
        .collect();

    let terms: Vec<String> = cleaned
        .split_whitespace()
        .filter(|term| {
            let upper = term.to_uppercase();
            upper != "AND" && upper != "OR" && upper != "NOT"
        })
        .map(|term| format!("\"{}\"*", term))
        .collect();

    terms.join(" ")
}
