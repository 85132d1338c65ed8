//! # News Ingest
//!
//! An incremental news importer. It reads a catalog of news sources from an
//! aggregation API, extracts new articles from each source with an LLM,
//! translates them, and publishes them back to the API together with every
//! failure encountered along the way.
//!
//! ## Usage
//!
//! ```sh
//! news_ingest --config importer.yaml -o ./out
//! ```
//!
//! ## Architecture
//!
//! 1. **Sources**: the catalog is reconciled into a local watermark table
//!    (`sources.txt`) recording how far each source has been read
//! 2. **Extraction**: for each source, the listing page is rendered, cleaned,
//!    converted to Markdown, and mined for candidate items; new candidates
//!    have their article pages fetched and localized
//! 3. **Output**: `result.json` and, when anything failed, `exceptions.txt`
//! 4. **Publish**: articles and failures go to the aggregation API
//!
//! Only missing settings, an unwritable output directory, or having no
//! sources at all stop the run; everything else is recorded and reported.

use clap::Parser;
use std::process::ExitCode;
use tracing::{debug, error, info};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod api;
mod cli;
mod config;
mod error;
mod error_sink;
mod models;
mod orchestrator;
mod outputs;
mod pipeline;
mod publish;
mod render;
mod runner;
mod sources;
mod utils;

use api::GeminiClient;
use cli::Cli;
use config::Settings;
use error::FatalError;
use publish::AggregatorClient;
use render::HttpRenderer;
use runner::{RunController, RunSummary};
use sources::SourceStore;
use utils::ensure_writable_dir;

#[tokio::main]
async fn main() -> ExitCode {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "news_ingest starting up");

    match run(Cli::parse()).await {
        Ok(summary) => {
            info!(
                sources = summary.sources,
                articles = summary.articles,
                errors = summary.errors,
                result = ?summary.result_path,
                diagnostics = ?summary.diagnostics_path,
                secs = summary.elapsed.as_secs(),
                millis = summary.elapsed.subsec_millis(),
                "Execution complete"
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "Fatal error; aborting run");
            let mut cause = std::error::Error::source(&e);
            while let Some(inner) = cause {
                error!(cause = %inner, "Caused by");
                cause = inner.source();
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Cli) -> Result<RunSummary, FatalError> {
    let settings = Settings::resolve(args)?;
    debug!(?settings, "Resolved settings");

    // Early check: fail before any network work if results cannot be saved
    ensure_writable_dir(&settings.output_dir)
        .await
        .map_err(|source| FatalError::OutputDir {
            path: settings.output_dir.display().to_string(),
            source,
        })?;

    let renderer = HttpRenderer::new().map_err(FatalError::HttpClient)?;
    let ai = GeminiClient::new(
        settings.gemini_base_url.as_str(),
        settings.model.as_str(),
        settings.google_api_key.as_str(),
    )
    .map_err(FatalError::HttpClient)?;
    let aggregator = AggregatorClient::new(&settings.api_base_url, &settings.api_key)?;

    let controller = RunController {
        store: SourceStore::new(settings.sources_file.clone()),
        catalog: &aggregator,
        publisher: &aggregator,
        renderer: &renderer,
        ai: &ai,
        settings: settings.orchestrator(),
        output_dir: settings.output_dir.clone(),
    };
    controller.run().await
}
