//! Command-line interface definitions for News Capture.
//!
//! The pipeline is split into three stages that exchange JSON work-item
//! files, so each stage can be re-run on its own:
//!
//! ```sh
//! news_capture capture -i items.json -o captured.json
//! news_capture enrich  -i captured.json -o enriched.json --output-dir ./output
//! news_capture export  -i enriched.json --output-dir ./output
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Command-line arguments for the News Capture application.
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Optional path to a config.yaml file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// WebDriver server address (overrides the config file)
    #[arg(long, env = "WEBDRIVER_URL", global = true)]
    pub webdriver_url: Option<String>,

    /// Show the browser window instead of running headless
    #[arg(long, global = true)]
    pub headful: bool,

    /// Retries per work item after the first failed attempt
    #[arg(long, global = true)]
    pub max_retries: Option<usize>,

    /// Work items captured concurrently (each gets its own browser)
    #[arg(long, global = true)]
    pub parallel: Option<usize>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Search the news site for every work item and attach the results
    Capture {
        /// JSON array of work-item payloads
        #[arg(short, long)]
        input: PathBuf,
        /// Where to write the work-item outcomes
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Count phrase occurrences, flag money amounts and download pictures
    Enrich {
        #[arg(short, long)]
        input: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        /// Directory that receives the `images/` folder
        #[arg(long, default_value = "output")]
        output_dir: PathBuf,
    },
    /// Write one flattened article table per work item
    Export {
        #[arg(short, long)]
        input: PathBuf,
        #[arg(long, default_value = "output")]
        output_dir: PathBuf,
    },
}
