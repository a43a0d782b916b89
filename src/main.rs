mod db;
mod export;
mod fetcher;
mod listing;
mod parser;
mod settings;

use std::path::PathBuf;
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand};

use parser::extract::HookRecord;
use settings::Settings;

#[derive(Parser)]
#[command(name = "hook_scraper", about = "Creator Hooks newsletter scraper")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Crawl the newsletter archive and populate the post queue
    Init {
        /// Max listing pages to crawl (overrides HOOKS_MAX_LISTING_PAGES)
        #[arg(long)]
        pages: Option<usize>,
    },
    /// Fetch unvisited posts
    Scrape {
        /// Max posts to fetch (default: all unvisited)
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Extract hooks from fetched posts
    Process {
        /// Max posts to process (default: all unprocessed)
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Scrape + process in one pipeline
    Run {
        /// Max posts to scrape+process
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Show scraping statistics
    Stats,
    /// Extracted hooks overview table
    Hooks {
        /// Filter by framework (substring, case-insensitive)
        #[arg(short, long)]
        framework: Option<String>,
        /// Max rows to display
        #[arg(short = 'n', long, default_value = "50")]
        limit: usize,
    },
    /// Write every extracted hook to a file
    Export {
        #[arg(short, long, value_enum, default_value = "csv")]
        format: export::Format,
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Extract hooks from a local .html or .md file and print them as JSON
    Parse {
        path: PathBuf,
        /// Source URL recorded on each hook
        #[arg(long, default_value = "")]
        url: String,
    },
    /// Fetch one post and print its hooks
    Post { url: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let settings = Settings::load()?;

    let result = match cli.command {
        Commands::Init { pages } => {
            let conn = open_db(&settings)?;
            let settings = Settings {
                max_listing_pages: pages.or(settings.max_listing_pages),
                ..settings
            };
            let posts = listing::fetch_post_urls(&settings).await?;
            let inserted = db::insert_posts(&conn, &posts)?;
            println!("Inserted {} new post URLs ({} total found)", inserted, posts.len());
            Ok(())
        }
        Commands::Scrape { limit } => {
            let conn = open_db(&settings)?;
            let posts = db::fetch_unvisited(&conn, limit)?;
            if posts.is_empty() {
                println!("No unvisited posts. Run 'init' first or all posts are scraped.");
                return Ok(());
            }
            println!("Scraping {} posts (streaming to DB)...", posts.len());
            let stats = fetcher::scrape_posts_streaming(&conn, &settings, posts).await?;
            println!(
                "Done: {} scraped ({} ok, {} errors).",
                stats.total, stats.ok, stats.errors
            );
            Ok(())
        }
        Commands::Process { limit } => {
            let conn = open_db(&settings)?;
            let posts = db::fetch_unprocessed(&conn, limit)?;
            if posts.is_empty() {
                println!("No unprocessed posts. Run 'scrape' first.");
                return Ok(());
            }
            println!("Processing {} posts...", posts.len());
            let counts = process_posts(&conn, &posts)?;
            counts.print();
            Ok(())
        }
        Commands::Run { limit } => {
            let conn = open_db(&settings)?;
            let posts = db::fetch_unvisited(&conn, limit)?;
            if posts.is_empty() {
                println!("No unvisited posts. Run 'init' first.");
                return Ok(());
            }

            // Phase 1: Scrape (streaming to DB)
            let t_scrape = Instant::now();
            println!("Pipeline: scraping {} posts (streaming to DB)...", posts.len());
            let stats = fetcher::scrape_posts_streaming(&conn, &settings, posts).await?;
            println!(
                "Scraped {} posts ({} ok, {} errors) in {:.1}s",
                stats.total, stats.ok, stats.errors, t_scrape.elapsed().as_secs_f64()
            );

            // Phase 2: Process
            let t_process = Instant::now();
            let unprocessed = db::fetch_unprocessed(&conn, None)?;
            if unprocessed.is_empty() {
                println!("Nothing to process (all fetched posts had errors).");
                return Ok(());
            }
            println!("Processing {} posts...", unprocessed.len());
            let counts = process_posts(&conn, &unprocessed)?;
            println!("Processed in {:.1}s", t_process.elapsed().as_secs_f64());
            counts.print();
            Ok(())
        }
        Commands::Stats => {
            let conn = open_db(&settings)?;
            let s = db::get_stats(&conn)?;
            println!("Total:     {}", s.total);
            println!("Visited:   {}", s.visited);
            println!("Unvisited: {}", s.unvisited);
            println!("Fetched:   {}", s.fetched);
            println!("Errors:    {}", s.errors);
            println!("Processed: {}", s.processed);
            println!("Hooks:     {}", s.hooks);
            Ok(())
        }
        Commands::Hooks { framework, limit } => {
            let conn = open_db(&settings)?;
            let hooks = db::fetch_hooks(&conn, framework.as_deref(), Some(limit))?;
            if hooks.is_empty() {
                println!("No hooks found.");
                return Ok(());
            }
            print_hooks_table(&hooks);
            println!("\n{} hooks", hooks.len());
            Ok(())
        }
        Commands::Export { format, output } => {
            let conn = open_db(&settings)?;
            let hooks = db::fetch_hooks(&conn, None, None)?;
            export::write_records(&output, format, &hooks)?;
            println!("Saved {} hooks to {}", hooks.len(), output.display());
            Ok(())
        }
        Commands::Parse { path, url } => {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let blocks = match path.extension().and_then(|e| e.to_str()) {
                Some("md") | Some("markdown") => parser::blocks::from_markdown(&content),
                _ => parser::blocks::from_html(&content),
            };
            let records = parser::extract::extract_records(&url, &blocks);
            println!("{}", serde_json::to_string_pretty(&records)?);
            Ok(())
        }
        Commands::Post { url } => {
            let html = fetcher::fetch_single_post(&settings, &url).await?;
            let blocks = parser::blocks::from_html(&html);
            let records = parser::extract::extract_records(&url, &blocks);
            println!("Found {} hooks:\n", records.len());
            for (i, r) in records.iter().enumerate() {
                println!("--- Hook {} ---", i + 1);
                println!("Section:    {}", r.section_title);
                println!("Title:      {}", r.title);
                println!("Framework:  {}", r.framework);
                println!("Hook Score: {}", r.hook_score.as_deref().unwrap_or("-"));
                println!("Why:        {}\n", truncate(&r.rationale, 100));
            }
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn open_db(settings: &Settings) -> anyhow::Result<rusqlite::Connection> {
    let conn = db::connect(&settings.db_path)?;
    db::init_schema(&conn)?;
    Ok(conn)
}

struct ProcessCounts {
    posts: usize,
    hooks: usize,
    empty: usize,
}

impl ProcessCounts {
    fn print(&self) {
        println!(
            "Saved {} hooks from {} posts ({} posts without hooks).",
            self.hooks, self.posts, self.empty,
        );
    }
}

fn process_posts(
    conn: &rusqlite::Connection,
    posts: &[db::FetchedPost],
) -> anyhow::Result<ProcessCounts> {
    use indicatif::{ProgressBar, ProgressStyle};
    use rayon::prelude::*;

    let pb = ProgressBar::new(posts.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec})")?
            .progress_chars("#>-"),
    );

    let mut counts = ProcessCounts {
        posts: 0,
        hooks: 0,
        empty: 0,
    };

    for chunk in posts.chunks(500) {
        let results: Vec<(i64, Vec<HookRecord>)> = chunk
            .par_iter()
            .map(|post| (post.post_data_id, parser::process_post(post)))
            .collect();

        counts.posts += results.len();
        counts.empty += results.iter().filter(|(_, r)| r.is_empty()).count();
        counts.hooks += db::save_hooks(conn, &results)?;
        pb.inc(chunk.len() as u64);
    }

    pb.finish_and_clear();
    Ok(counts)
}

fn print_hooks_table(hooks: &[HookRecord]) {
    println!(
        "{:>3} | {:<40} | {:<24} | {:>5} | {:<40}",
        "#", "Title", "Framework", "Score", "Why"
    );
    println!("{}", "-".repeat(124));

    for (i, h) in hooks.iter().enumerate() {
        println!(
            "{:>3} | {:<40} | {:<24} | {:>5} | {:<40}",
            i + 1,
            truncate(&h.title, 37),
            truncate(&h.framework, 21),
            h.hook_score.as_deref().unwrap_or("-"),
            truncate(&h.rationale, 37),
        );
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max).collect();
        format!("{}...", truncated)
    }
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
