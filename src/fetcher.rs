use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use rusqlite::Connection;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::db::{self, ScrapeRow};
use crate::settings::Settings;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected status {0}")]
    Status(u16),
    #[error("empty response body")]
    EmptyBody,
}

impl FetchError {
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Http(e) => {
                e.is_timeout() || e.is_connect() || e.is_request() || e.is_body()
            }
            FetchError::Status(code) => *code == 429 || *code >= 500,
            FetchError::EmptyBody => false,
        }
    }

    fn status(&self) -> Option<i32> {
        match self {
            FetchError::Status(code) => Some(i32::from(*code)),
            FetchError::Http(e) => e.status().map(|s| i32::from(s.as_u16())),
            FetchError::EmptyBody => None,
        }
    }
}

/// Scrape stats returned after completion.
pub struct ScrapeStats {
    pub total: usize,
    pub ok: usize,
    pub errors: usize,
}

pub fn build_client(settings: &Settings) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .user_agent(settings.user_agent.as_str())
        .timeout(Duration::from_secs(30))
        .build()?)
}

/// Fetch posts concurrently, saving each result to DB as it arrives.
pub async fn scrape_posts_streaming(
    conn: &Connection,
    settings: &Settings,
    posts: Vec<(i64, String)>,
) -> Result<ScrapeStats> {
    let client = build_client(settings)?;
    let settings = Arc::new(settings.clone());
    let semaphore = Arc::new(Semaphore::new(settings.concurrency.max(1)));
    let total = posts.len();

    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")?
            .progress_chars("=> "),
    );

    // Channel: workers send results, main loop saves to DB
    let (tx, mut rx) = tokio::sync::mpsc::channel::<ScrapeRow>(settings.concurrency.max(1) * 2);

    for (post_id, url) in posts {
        let client = client.clone();
        let settings = Arc::clone(&settings);
        let sem = Arc::clone(&semaphore);
        let tx = tx.clone();

        tokio::spawn(async move {
            let Ok(_permit) = sem.acquire().await else {
                return;
            };
            let row = scrape_one(&client, &settings, post_id, &url).await;
            let _ = tx.send(row).await;
            tokio::time::sleep(Duration::from_millis(settings.request_delay_ms)).await;
        });
    }

    // Drop our copy of tx so rx closes when all spawned tasks finish
    drop(tx);

    let mut ok = 0usize;
    let mut errors = 0usize;

    while let Some(row) = rx.recv().await {
        if let Some(e) = &row.error {
            warn!("Failed to fetch {}: {}", row.url, e);
            errors += 1;
        } else {
            ok += 1;
        }
        db::save_scrape(conn, &row)?;
        pb.inc(1);
    }

    pb.finish_and_clear();
    info!("Scraped {} posts ({} ok, {} errors)", total, ok, errors);

    Ok(ScrapeStats { total, ok, errors })
}

async fn scrape_one(
    client: &reqwest::Client,
    settings: &Settings,
    post_id: i64,
    url: &str,
) -> ScrapeRow {
    let start = Instant::now();
    let result = fetch_with_retry(client, settings, url).await;
    let latency_ms = Some(start.elapsed().as_millis() as i64);
    let fetched_at = chrono::Utc::now().to_rfc3339();

    match result {
        Ok((status, html)) => ScrapeRow {
            post_id,
            url: url.to_string(),
            html: Some(html),
            status: Some(i32::from(status)),
            error: None,
            latency_ms,
            fetched_at,
        },
        Err(e) => ScrapeRow {
            post_id,
            url: url.to_string(),
            html: None,
            status: e.status(),
            error: Some(e.to_string()),
            latency_ms,
            fetched_at,
        },
    }
}

/// GET a page, retrying throttling and server errors with exponential backoff.
pub async fn fetch_with_retry(
    client: &reqwest::Client,
    settings: &Settings,
    url: &str,
) -> Result<(u16, String), FetchError> {
    let mut attempt = 0u32;
    loop {
        match fetch_html(client, url).await {
            Err(e) if e.is_retryable() && attempt < settings.max_retries => {
                let backoff = backoff_ms(settings.retry_backoff_ms, attempt);
                warn!(
                    "Retry {}/{} for {} after {}ms: {}",
                    attempt + 1,
                    settings.max_retries,
                    url,
                    backoff,
                    e
                );
                tokio::time::sleep(Duration::from_millis(backoff)).await;
                attempt += 1;
            }
            other => return other,
        }
    }
}

/// Doubles per attempt, saturating at `u64::MAX`.
fn backoff_ms(base: u64, attempt: u32) -> u64 {
    base.saturating_mul(2u64.saturating_pow(attempt))
}

async fn fetch_html(client: &reqwest::Client, url: &str) -> Result<(u16, String), FetchError> {
    let response = client.get(url).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::Status(status.as_u16()));
    }
    let body = response.text().await?;
    if body.trim().is_empty() {
        return Err(FetchError::EmptyBody);
    }
    Ok((status.as_u16(), body))
}

/// Fetch a single post and return its HTML.
pub async fn fetch_single_post(settings: &Settings, url: &str) -> Result<String> {
    let client = build_client(settings)?;
    let (_, html) = fetch_with_retry(&client, settings, url)
        .await
        .with_context(|| format!("Fetching {} failed", url))?;
    Ok(html)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    const POST_HTML: &str =
        r#"<html><body><div class="entry-content"><h1>Issue</h1></div></body></html>"#;

    fn test_settings() -> Settings {
        Settings {
            request_delay_ms: 0,
            max_retries: 2,
            retry_backoff_ms: 1,
            ..Settings::default()
        }
    }

    async fn mount(server: &MockServer, route: &str, template: ResponseTemplate) {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(template)
            .mount(server)
            .await;
    }

    async fn request_count(server: &MockServer) -> usize {
        server.received_requests().await.map_or(0, |r| r.len())
    }

    #[test]
    fn retryable_statuses() {
        assert!(FetchError::Status(429).is_retryable());
        assert!(FetchError::Status(503).is_retryable());
        assert!(!FetchError::Status(404).is_retryable());
        assert!(!FetchError::EmptyBody.is_retryable());
    }

    #[test]
    fn status_is_kept_for_error_rows() {
        assert_eq!(FetchError::Status(404).status(), Some(404));
        assert_eq!(FetchError::EmptyBody.status(), None);
    }

    #[test]
    fn backoff_doubles_and_saturates() {
        assert_eq!(backoff_ms(2000, 0), 2000);
        assert_eq!(backoff_ms(2000, 3), 16000);
        assert_eq!(backoff_ms(2000, 64), u64::MAX);
        assert_eq!(backoff_ms(u64::MAX, 1), u64::MAX);
    }

    #[tokio::test]
    async fn throttling_and_server_errors_are_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/post/"))
            .respond_with(ResponseTemplate::new(429))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/post/"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        mount(&server, "/post/", ResponseTemplate::new(200).set_body_string(POST_HTML)).await;

        let settings = test_settings();
        let client = build_client(&settings).unwrap();
        let url = format!("{}/post/", server.uri());
        let (status, body) = fetch_with_retry(&client, &settings, &url).await.unwrap();
        assert_eq!(status, 200);
        assert_eq!(body, POST_HTML);
        assert_eq!(request_count(&server).await, 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        let server = MockServer::start().await;
        mount(&server, "/post/", ResponseTemplate::new(500)).await;

        let settings = test_settings();
        let client = build_client(&settings).unwrap();
        let url = format!("{}/post/", server.uri());
        let err = fetch_with_retry(&client, &settings, &url).await.unwrap_err();
        assert!(matches!(err, FetchError::Status(500)));
        assert_eq!(request_count(&server).await, 3);
    }

    #[tokio::test]
    async fn client_errors_and_empty_bodies_are_not_retried() {
        let server = MockServer::start().await;
        mount(&server, "/blank/", ResponseTemplate::new(200).set_body_string("  \n")).await;

        let settings = test_settings();
        let client = build_client(&settings).unwrap();

        let missing = format!("{}/missing/", server.uri());
        let err = fetch_with_retry(&client, &settings, &missing).await.unwrap_err();
        assert!(matches!(err, FetchError::Status(404)));

        let blank = format!("{}/blank/", server.uri());
        let err = fetch_with_retry(&client, &settings, &blank).await.unwrap_err();
        assert!(matches!(err, FetchError::EmptyBody));

        assert_eq!(request_count(&server).await, 2);
    }

    #[tokio::test]
    async fn dropped_connections_are_retried() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accepted = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&accepted);
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                drop(socket);
            }
        });

        let settings = test_settings();
        let client = build_client(&settings).unwrap();
        let url = format!("http://{}/post/", addr);
        let err = fetch_with_retry(&client, &settings, &url).await.unwrap_err();
        assert!(matches!(err, FetchError::Http(_)));
        assert!(err.is_retryable());
        assert_eq!(accepted.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn single_post_error_keeps_its_cause() {
        let server = MockServer::start().await;
        mount(&server, "/gone/", ResponseTemplate::new(410)).await;

        let url = format!("{}/gone/", server.uri());
        let err = fetch_single_post(&test_settings(), &url).await.unwrap_err();
        assert_eq!(err.to_string(), format!("Fetching {} failed", url));
        assert!(matches!(err.downcast_ref::<FetchError>(), Some(FetchError::Status(410))));
    }

    #[tokio::test]
    async fn streaming_scrape_stores_successes_and_failures() {
        let server = MockServer::start().await;
        mount(&server, "/ok/", ResponseTemplate::new(200).set_body_string(POST_HTML)).await;
        mount(&server, "/missing/", ResponseTemplate::new(404)).await;

        let conn = Connection::open_in_memory().unwrap();
        db::init_schema(&conn).unwrap();
        let ok_url = format!("{}/ok/", server.uri());
        let missing_url = format!("{}/missing/", server.uri());
        db::insert_posts(&conn, &[(ok_url.clone(), 1), (missing_url.clone(), 1)]).unwrap();
        let posts = db::fetch_unvisited(&conn, None).unwrap();

        let stats = scrape_posts_streaming(&conn, &test_settings(), posts).await.unwrap();
        assert_eq!((stats.total, stats.ok, stats.errors), (2, 1, 1));
        assert!(db::fetch_unvisited(&conn, None).unwrap().is_empty());

        let fetched = db::fetch_unprocessed(&conn, None).unwrap();
        assert_eq!(fetched.len(), 1);
        assert_eq!(fetched[0].url, ok_url);
        assert_eq!(fetched[0].html, POST_HTML);

        let (status, error): (Option<i32>, Option<String>) = conn
            .query_row(
                "SELECT status, error FROM post_data WHERE url = ?1",
                [&missing_url],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!(status, Some(404));
        assert_eq!(error.as_deref(), Some("unexpected status 404"));

        let db_stats = db::get_stats(&conn).unwrap();
        assert_eq!(db_stats.visited, 2);
        assert_eq!(db_stats.errors, 1);
    }
}
