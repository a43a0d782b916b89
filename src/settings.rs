use anyhow::{Context, Result};
use serde::Deserialize;

const CONFIG_FILE: &str = "hooks";
const ENV_PREFIX: &str = "HOOKS";

/// Runtime settings: `hooks.toml` if present, then `HOOKS_*` env vars.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub db_path: String,
    pub base_url: String,
    pub user_agent: String,
    pub max_listing_pages: Option<usize>,
    pub concurrency: usize,
    pub request_delay_ms: u64,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            db_path: "data/hooks.sqlite".to_string(),
            base_url: "https://creatorhooks.com/past-creator-hooks-newsletters/".to_string(),
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36"
                .to_string(),
            max_listing_pages: None,
            concurrency: 4,
            request_delay_ms: 1500,
            max_retries: 3,
            retry_backoff_ms: 2000,
        }
    }
}

impl Settings {
    pub fn load() -> Result<Self> {
        config::Config::builder()
            .add_source(config::File::with_name(CONFIG_FILE).required(false))
            .add_source(config::Environment::with_prefix(ENV_PREFIX))
            .build()
            .context("Failed to read settings")?
            .try_deserialize()
            .context("Invalid settings")
    }

    /// Listing page `n` (1-based); page 1 is the base URL itself.
    pub fn listing_url(&self, page: usize) -> String {
        if page <= 1 {
            self.base_url.clone()
        } else {
            format!("{}page/{}/", self.base_url, page)
        }
    }
}
