use std::sync::LazyLock;
use std::time::Duration;

use anyhow::Result;
use scraper::{Html, Selector};
use tracing::{info, warn};
use url::Url;

use crate::fetcher::{build_client, fetch_with_retry};
use crate::settings::Settings;

static POST_LINK_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("article h2.entry-title a").unwrap());
static NAV_PREVIOUS_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(".nav-previous a").unwrap());
static ANCHOR_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a").unwrap());

const NEXT_LINK_TEXTS: &[&str] = &["Next", "Older posts"];

#[derive(Debug, Default)]
pub struct ListingPage {
    pub post_urls: Vec<String>,
    pub has_next_page: bool,
}

/// Walk the paginated newsletter archive and return (post url, listing page) pairs.
pub async fn fetch_post_urls(settings: &Settings) -> Result<Vec<(String, usize)>> {
    let client = build_client(settings)?;
    let mut found = Vec::new();
    let mut page = 1;

    loop {
        if settings.max_listing_pages.is_some_and(|max| page > max) {
            info!("Reached listing page limit ({})", page - 1);
            break;
        }

        let url = settings.listing_url(page);
        info!("Fetching listing page {}: {}", page, url);

        let html = match fetch_with_retry(&client, settings, &url).await {
            Ok((_, html)) => html,
            Err(e) => {
                warn!("Listing page {} failed: {}", page, e);
                break;
            }
        };

        let listing = parse_listing(&html, &url);
        info!("Found {} posts on page {}", listing.post_urls.len(), page);
        if listing.post_urls.is_empty() {
            break;
        }
        found.extend(listing.post_urls.into_iter().map(|u| (u, page)));

        if !listing.has_next_page {
            info!("No next page after page {}", page);
            break;
        }
        page += 1;
        tokio::time::sleep(Duration::from_millis(settings.request_delay_ms)).await;
    }

    info!("Total posts found: {}", found.len());
    Ok(found)
}

/// Extract post links and the "older posts" signal from one listing page.
pub fn parse_listing(html: &str, page_url: &str) -> ListingPage {
    let doc = Html::parse_document(html);
    let base = Url::parse(page_url).ok();

    let post_urls = doc
        .select(&POST_LINK_SEL)
        .filter_map(|a| a.value().attr("href"))
        .filter_map(|href| match &base {
            Some(base) => base.join(href).ok().map(String::from),
            None => Some(href.to_string()),
        })
        .collect();

    let has_next_page = doc.select(&NAV_PREVIOUS_SEL).next().is_some()
        || doc.select(&ANCHOR_SEL).any(|a| {
            let text = a.text().collect::<String>();
            NEXT_LINK_TEXTS.iter().any(|t| text.contains(t))
        });

    ListingPage {
        post_urls,
        has_next_page,
    }
}
