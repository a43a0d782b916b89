use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::Connection;

use crate::parser::extract::HookRecord;

pub fn connect(path: &str) -> Result<Connection> {
    if let Some(parent) = Path::new(path).parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let conn = Connection::open(path).with_context(|| format!("Failed to open {}", path))?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS posts (
            id           INTEGER PRIMARY KEY,
            url          TEXT UNIQUE NOT NULL,
            listing_page INTEGER,
            visited      BOOLEAN NOT NULL DEFAULT 0,
            visited_at   TEXT,
            created_at   TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_posts_visited ON posts(visited);

        CREATE TABLE IF NOT EXISTS post_data (
            id           INTEGER PRIMARY KEY,
            post_id      INTEGER NOT NULL REFERENCES posts(id),
            url          TEXT NOT NULL,
            html         TEXT,
            status       INTEGER,
            error        TEXT,
            latency_ms   INTEGER,
            fetched_at   TEXT NOT NULL,
            processed_at TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_post_data_url ON post_data(url);

        CREATE TABLE IF NOT EXISTS hooks (
            id            INTEGER PRIMARY KEY,
            post_data_id  INTEGER NOT NULL REFERENCES post_data(id),
            post_url      TEXT NOT NULL,
            position      INTEGER NOT NULL,
            section_title TEXT NOT NULL,
            title         TEXT NOT NULL,
            framework     TEXT NOT NULL,
            hook_score    TEXT,
            rationale     TEXT NOT NULL,
            UNIQUE(post_url, position)
        );
        CREATE INDEX IF NOT EXISTS idx_hooks_framework ON hooks(framework);
        ",
    )?;
    Ok(())
}

// ── Crawling ──

pub fn insert_posts(conn: &Connection, posts: &[(String, usize)]) -> Result<usize> {
    let tx = conn.unchecked_transaction()?;
    let mut count = 0;
    {
        let mut stmt =
            tx.prepare("INSERT OR IGNORE INTO posts (url, listing_page) VALUES (?1, ?2)")?;
        for (url, page) in posts {
            count += stmt.execute(rusqlite::params![url, *page as i64])?;
        }
    }
    tx.commit()?;
    Ok(count)
}

pub fn fetch_unvisited(conn: &Connection, limit: Option<usize>) -> Result<Vec<(i64, String)>> {
    let sql = match limit {
        Some(n) => format!("SELECT id, url FROM posts WHERE visited = 0 ORDER BY id LIMIT {}", n),
        None => "SELECT id, url FROM posts WHERE visited = 0 ORDER BY id".to_string(),
    };
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ── Scraping ──

pub struct ScrapeRow {
    pub post_id: i64,
    pub url: String,
    pub html: Option<String>,
    pub status: Option<i32>,
    pub error: Option<String>,
    pub latency_ms: Option<i64>,
    pub fetched_at: String,
}

pub fn save_scrape(conn: &Connection, row: &ScrapeRow) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT INTO post_data (post_id, url, html, status, error, latency_ms, fetched_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        rusqlite::params![
            row.post_id, row.url, row.html, row.status, row.error, row.latency_ms, row.fetched_at,
        ],
    )?;
    tx.execute(
        "UPDATE posts SET visited = 1, visited_at = datetime('now') WHERE id = ?1",
        rusqlite::params![row.post_id],
    )?;
    tx.commit()?;
    Ok(())
}

// ── Processing ──

pub struct FetchedPost {
    pub post_data_id: i64,
    pub url: String,
    pub html: String,
}

pub fn fetch_unprocessed(conn: &Connection, limit: Option<usize>) -> Result<Vec<FetchedPost>> {
    let sql = format!(
        "SELECT id, url, html
         FROM post_data
         WHERE html IS NOT NULL AND processed_at IS NULL
         ORDER BY id{}",
        match limit {
            Some(n) => format!(" LIMIT {}", n),
            None => String::new(),
        }
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], |row| {
            Ok(FetchedPost {
                post_data_id: row.get(0)?,
                url: row.get(1)?,
                html: row.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Replace each post's hooks and mark it processed, all in one transaction.
pub fn save_hooks(conn: &Connection, processed: &[(i64, Vec<HookRecord>)]) -> Result<usize> {
    let tx = conn.unchecked_transaction()?;
    let mut count = 0;
    {
        let mut delete_stmt = tx.prepare("DELETE FROM hooks WHERE post_data_id = ?1")?;
        let mut insert_stmt = tx.prepare(
            "INSERT INTO hooks
             (post_data_id, post_url, position, section_title, title, framework, hook_score, rationale)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )?;
        let mut mark_stmt = tx.prepare(
            "UPDATE post_data SET processed_at = datetime('now') WHERE id = ?1",
        )?;

        for (post_data_id, records) in processed {
            delete_stmt.execute(rusqlite::params![post_data_id])?;
            for (position, r) in records.iter().enumerate() {
                count += insert_stmt.execute(rusqlite::params![
                    post_data_id,
                    r.source_url,
                    position as i64,
                    r.section_title,
                    r.title,
                    r.framework,
                    r.hook_score,
                    r.rationale,
                ])?;
            }
            mark_stmt.execute(rusqlite::params![post_data_id])?;
        }
    }
    tx.commit()?;
    Ok(count)
}

// ── Hooks ──

/// Hooks in post order, optionally filtered by a case-insensitive framework substring.
pub fn fetch_hooks(
    conn: &Connection,
    framework: Option<&str>,
    limit: Option<usize>,
) -> Result<Vec<HookRecord>> {
    let mut sql = "SELECT post_url, section_title, title, framework, hook_score, rationale
                   FROM hooks"
        .to_string();
    let mut params: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

    if let Some(f) = framework {
        sql.push_str(" WHERE framework LIKE ?1");
        params.push(Box::new(format!("%{}%", f)));
    }
    sql.push_str(" ORDER BY post_data_id, position");
    if let Some(n) = limit {
        sql.push_str(&format!(" LIMIT {}", n));
    }

    let mut stmt = conn.prepare(&sql)?;
    let param_refs: Vec<&dyn rusqlite::types::ToSql> = params.iter().map(|p| p.as_ref()).collect();
    let rows = stmt
        .query_map(param_refs.as_slice(), |row| {
            Ok(HookRecord {
                source_url: row.get(0)?,
                section_title: row.get(1)?,
                title: row.get(2)?,
                framework: row.get(3)?,
                hook_score: row.get(4)?,
                rationale: row.get(5)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ── Stats ──

pub struct Stats {
    pub total: usize,
    pub visited: usize,
    pub unvisited: usize,
    pub fetched: usize,
    pub errors: usize,
    pub processed: usize,
    pub hooks: usize,
}

pub fn get_stats(conn: &Connection) -> Result<Stats> {
    let total: usize = conn.query_row("SELECT COUNT(*) FROM posts", [], |r| r.get(0))?;
    let visited: usize =
        conn.query_row("SELECT COUNT(*) FROM posts WHERE visited = 1", [], |r| r.get(0))?;
    let fetched: usize = conn.query_row("SELECT COUNT(*) FROM post_data", [], |r| r.get(0))?;
    let errors: usize = conn.query_row(
        "SELECT COUNT(*) FROM post_data WHERE error IS NOT NULL",
        [],
        |r| r.get(0),
    )?;
    let processed: usize = conn.query_row(
        "SELECT COUNT(*) FROM post_data WHERE processed_at IS NOT NULL",
        [],
        |r| r.get(0),
    )?;
    let hooks: usize = conn.query_row("SELECT COUNT(*) FROM hooks", [], |r| r.get(0))?;
    Ok(Stats {
        total,
        visited,
        unvisited: total.saturating_sub(visited),
        fetched,
        errors,
        processed,
        hooks,
    })
}
