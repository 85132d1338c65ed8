//! One complete ingestion run.
//!
//! The [`RunController`] sequences the stages:
//!
//! 1. **Sources**: fetch the catalog and reconcile it into the watermark
//!    table. If the catalog is unreachable, fall back to the persisted table.
//!    No sources at all is fatal.
//! 2. **Extraction**: hand every source to the [`ExtractionOrchestrator`].
//! 3. **Output**: write `result.json`.
//! 4. **Publish**: send articles, drain the error sink, send the failures.
//! 5. **Diagnostics**: write `exceptions.txt` when anything failed.
//!
//! Only step 1 can abort the run. Everything after it is recorded and logged.

use crate::api::AskAsync;
use crate::error::FatalError;
use crate::error_sink::{ErrorSink, Failure};
use crate::models::{RunResult, SourceRecord};
use crate::orchestrator::{ExtractionOrchestrator, OrchestratorSettings};
use crate::outputs::{diagnostics, json};
use crate::publish::{Publisher, SourceCatalog};
use crate::render::RenderPage;
use crate::sources::SourceStore;
use chrono::{Local, NaiveDate};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{error, info, instrument, warn};

/// Counts reported at the end of a run.
#[derive(Debug)]
pub struct RunSummary {
    pub sources: usize,
    pub articles: usize,
    pub errors: usize,
    pub result_path: Option<PathBuf>,
    pub diagnostics_path: Option<PathBuf>,
    pub elapsed: Duration,
}

/// Collaborators and settings for one run.
pub struct RunController<'a, C, P, R, A> {
    pub store: SourceStore,
    pub catalog: &'a C,
    pub publisher: &'a P,
    pub renderer: &'a R,
    pub ai: &'a A,
    pub settings: OrchestratorSettings,
    pub output_dir: PathBuf,
}

impl<'a, C, P, R, A> RunController<'a, C, P, R, A>
where
    C: SourceCatalog,
    P: Publisher,
    R: RenderPage,
    A: AskAsync,
{
    pub async fn run(&self) -> Result<RunSummary, FatalError> {
        self.run_on(Local::now().date_naive()).await
    }

    /// Run with `today` as the date given to sources first seen in the catalog.
    #[instrument(level = "info", skip_all, fields(%today, output_dir = %self.output_dir.display()))]
    pub async fn run_on(&self, today: NaiveDate) -> Result<RunSummary, FatalError> {
        let t0 = Instant::now();
        let mut sink = ErrorSink::new();

        let sources = self.load_sources(today, &mut sink).await?;
        info!(count = sources.len(), "Loaded news sources");

        let orchestrator =
            ExtractionOrchestrator::new(self.renderer, self.ai, self.settings.clone());
        let articles = orchestrator.run(&sources, &mut sink).await;

        let result_path = match json::write_result(&articles, &self.output_dir).await {
            Ok(path) => Some(path),
            Err(e) => {
                error!(error = %e, "Failed to write result file");
                sink.record(Failure::new(e).context("write result file"));
                None
            }
        };

        if let Err(e) = self.publisher.publish_articles(&articles).await {
            error!(error = %e, "Failed to publish articles");
            sink.record(Failure::new(e).context("publish articles"));
        }

        if !sink.is_empty() {
            warn!(count = sink.len(), "Run recorded non-fatal failures");
        }
        let mut result = RunResult {
            articles,
            errors: sink.drain(),
        };
        if let Err(e) = self.publisher.publish_errors(&result.errors).await {
            error!(error = %e, "Failed to publish errors");
            result
                .errors
                .push(Failure::new(e).context("publish errors").into_record());
        }

        let diagnostics_path =
            match diagnostics::write_diagnostics(&result.errors, &self.output_dir).await {
                Ok(path) => path,
                Err(e) => {
                    error!(error = %e, "Failed to write diagnostics file");
                    None
                }
            };

        let summary = RunSummary {
            sources: sources.len(),
            articles: result.articles.len(),
            errors: result.errors.len(),
            result_path,
            diagnostics_path,
            elapsed: t0.elapsed(),
        };
        info!(
            sources = summary.sources,
            articles = summary.articles,
            errors = summary.errors,
            elapsed_ms = summary.elapsed.as_millis() as u64,
            "Run complete"
        );
        Ok(summary)
    }

    async fn load_sources(
        &self,
        today: NaiveDate,
        sink: &mut ErrorSink,
    ) -> Result<Vec<SourceRecord>, FatalError> {
        let table = match self.catalog.fetch_sources().await {
            Ok(catalog) => self.store.reconcile(&catalog.sources, today, sink).await,
            Err(e) => {
                warn!(error = %e, "Source catalog unavailable; using the local watermark table");
                sink.record(Failure::new(e).context("fetch source catalog"));
                self.store.load(sink).await
            }
        };

        if table.is_empty() {
            return Err(FatalError::NoSources {
                path: self.store.path().display().to_string(),
            });
        }
        Ok(table.into_values().collect())
    }
}
