//! Command-line interface definitions for the news importer.
//!
//! Every setting can come from a flag, an environment variable, or the
//! optional YAML file named by `--config`. Flags and environment variables
//! win over the file; the file wins over built-in defaults. Resolution and
//! validation live in [`crate::config`].

use clap::Parser;
use std::path::PathBuf;

/// Command-line arguments for the news importer.
///
/// # Examples
///
/// ```sh
/// # Everything from the environment
/// GOOGLE_API_KEY=… NEWS_API_BASE_URL=https://news.example.com NEWS_API_KEY=… news_ingest
///
/// # Settings from a file, output next to it
/// news_ingest --config ./importer.yaml -o ./out
/// ```
#[derive(Parser, Debug, Default)]
#[command(author, version, about)]
pub struct Cli {
    /// Optional path to a YAML settings file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Google AI (Gemini) API key
    #[arg(long, env = "GOOGLE_API_KEY", hide_env_values = true)]
    pub google_api_key: Option<String>,

    /// Gemini model name
    #[arg(long, env = "GEMINI_MODEL")]
    pub model: Option<String>,

    /// Base URL of the news aggregation API
    #[arg(long, env = "NEWS_API_BASE_URL")]
    pub api_base_url: Option<String>,

    /// Key sent to the news aggregation API in the X-Api-Key header
    #[arg(long, env = "NEWS_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Render timeout for source listing pages, in milliseconds
    #[arg(long)]
    pub page_load_timeout_ms: Option<u64>,

    /// Render timeout for article pages, in milliseconds
    #[arg(long)]
    pub article_load_timeout_ms: Option<u64>,

    /// Days subtracted from each source's watermark before filtering
    #[arg(long)]
    pub grace_days: Option<i64>,

    /// Language articles are translated into
    #[arg(long)]
    pub target_language: Option<String>,

    /// Watermark table file
    #[arg(short, long)]
    pub sources_file: Option<PathBuf>,

    /// Directory for result.json and exceptions.txt
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,
}
