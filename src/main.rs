//! # News Capture
//!
//! Drives a real browser through a news site's search results, keeps the
//! articles published within a recency window, then enriches and exports
//! them.
//!
//! ## Usage
//!
//! ```sh
//! news_capture capture -i items.json -o captured.json
//! news_capture enrich  -i captured.json -o enriched.json --output-dir ./output
//! news_capture export  -i enriched.json --output-dir ./output
//! ```
//!
//! ## Architecture
//!
//! 1. **Capture**: per work item, open a browser session, search, page through
//!    results until the cutoff, close the session (retried as a unit)
//! 2. **Enrich**: count phrase occurrences, flag money amounts, download pictures
//! 3. **Export**: one article table per work item

use clap::Parser;
use std::error::Error;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info, instrument};
use tracing_subscriber::{EnvFilter, fmt as tfmt};
use url::Url;

mod browser;
mod cli;
mod config;
mod cursor;
mod enrich;
mod errors;
mod images;
mod locator;
mod models;
mod orchestrator;
mod outputs;
mod retry;
mod sites;
mod utils;
mod workitems;

use cli::{Cli, Command};
use config::CaptureConfig;
use images::ImagePool;
use orchestrator::{Orchestrator, WebDriverSessions};
use outputs::json;
use retry::RetryPolicy;
use sites::NewsSite;
use sites::aljazeera::Aljazeera;
use utils::ensure_writable_dir;
use workitems::{WorkItemOutcome, read_items};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = Instant::now();
    info!("news_capture starting up");

    let args = Cli::parse();
    debug!(?args.command, "Parsed CLI arguments");

    let mut config = CaptureConfig::load(args.config.as_deref())?;
    config.apply_cli(&args);
    debug!(?config, "Effective configuration");

    let outcomes = match &args.command {
        Command::Capture { input, output } => capture(&config, input, output).await?,
        Command::Enrich {
            input,
            output,
            output_dir,
        } => enrich(&config, input, output, output_dir).await?,
        Command::Export { input, output_dir } => export(input, output_dir).await?,
    };

    let failed = outcomes.iter().filter(|o| !o.is_done()).count();
    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        items = outcomes.len(),
        done = outcomes.len() - failed,
        failed,
        "Execution complete"
    );
    Ok(())
}

#[instrument(level = "info", skip(config))]
async fn capture(
    config: &CaptureConfig,
    input: &Path,
    output: &Path,
) -> Result<Vec<WorkItemOutcome>, Box<dyn Error>> {
    let items = read_items(input).await?;
    let sessions = WebDriverSessions::new(config.browser.clone(), Aljazeera::BASE_URL);
    let policy = RetryPolicy::new(config.max_retries).with_base_delay(config.retry_backoff());
    let orchestrator: Orchestrator<_, Aljazeera> = Orchestrator::new(sessions, policy);

    let outcomes = orchestrator.capture_all(items, config.parallel_items).await;
    json::write_outcomes(&outcomes, output).await?;
    Ok(outcomes)
}

#[instrument(level = "info", skip(config))]
async fn enrich(
    config: &CaptureConfig,
    input: &Path,
    output: &Path,
    output_dir: &Path,
) -> Result<Vec<WorkItemOutcome>, Box<dyn Error>> {
    ensure_writable_dir(output_dir).await?;
    let items = read_items(input).await?;
    let pool = ImagePool::new(output_dir, config.image_workers)
        .await?
        .with_base_url(Url::parse(Aljazeera::BASE_URL)?);

    let outcomes = enrich::enrich_all(items, &pool).await;
    json::write_outcomes(&outcomes, output).await?;
    Ok(outcomes)
}

#[instrument(level = "info")]
async fn export(input: &Path, output_dir: &Path) -> Result<Vec<WorkItemOutcome>, Box<dyn Error>> {
    ensure_writable_dir(output_dir).await?;
    let items = read_items(input).await?;
    Ok(json::export_all(items, output_dir).await)
}
