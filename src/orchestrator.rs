//! Per-source extraction: listing page → candidates → resolved articles.
//!
//! For each source the orchestrator walks a small state machine:
//!
//! 1. **List extract**: render the listing page, run it through the content
//!    pipeline, ask the model for candidate items.
//! 2. **Dedup**: keep the first candidate per title.
//! 3. **Incremental filter, pass 1**: drop candidates dated before the cutoff.
//! 4. **URL normalization**: resolve candidate urls against the source url.
//! 5. **Detail extract**: render, transform and localize each candidate.
//! 6. **Incremental filter, pass 2**: drop details dated before the cutoff,
//!    and candidates whose date is unknown at both stages.
//! 7. **Materialize** a [`ResolvedArticle`].
//!
//! The cutoff is `last_fetched - grace`. Failures for one candidate are
//! recorded and the next candidate is processed; failures for a whole source
//! are recorded and the next source is processed. Sources and candidates are
//! handled strictly one at a time.

use crate::api::{AskAsync, detail_directive, list_directive, parse_candidates, parse_detail};
use crate::error::IngestError;
use crate::error_sink::{ErrorSink, Failure};
use crate::models::{CandidateItem, ResolvedArticle, SourceRecord};
use crate::pipeline::to_portable_document;
use crate::render::RenderPage;
use crate::utils::resolve_url;
use chrono::{Duration, Local, NaiveDate};
use itertools::Itertools;
use std::time::Duration as StdDuration;
use tracing::{debug, error, info, instrument, warn};

/// Knobs for one orchestrator run.
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    /// Render timeout for source listing pages.
    pub page_timeout: StdDuration,
    /// Render timeout for article pages.
    pub article_timeout: StdDuration,
    /// Grace window subtracted from a source's watermark.
    pub grace: Duration,
    /// Language articles are translated into.
    pub target_language: String,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            page_timeout: StdDuration::from_millis(5000),
            article_timeout: StdDuration::from_millis(10_000),
            grace: Duration::days(1),
            target_language: "Czech".to_string(),
        }
    }
}

/// How processing of one source ended, when it did not fail.
#[derive(Debug)]
pub enum SourceOutcome {
    Done(Vec<ResolvedArticle>),
    SkippedEmpty,
}

/// Keep the first item per title, preserving order.
pub fn dedup_by_title<T, F>(items: Vec<T>, title: F) -> Vec<T>
where
    F: Fn(&T) -> String,
{
    items.into_iter().unique_by(|item| title(item)).collect()
}

/// Oldest publication date still considered new for a source.
pub fn watermark_cutoff(last_fetched: NaiveDate, grace: Duration) -> NaiveDate {
    last_fetched - grace
}

/// `true` when `date` is known and strictly older than `cutoff`.
pub fn is_stale(date: Option<NaiveDate>, cutoff: NaiveDate) -> bool {
    date.is_some_and(|d| d < cutoff)
}

/// Drives the render → pipeline → model flow for every source.
pub struct ExtractionOrchestrator<'a, R, A> {
    renderer: &'a R,
    ai: &'a A,
    settings: OrchestratorSettings,
}

impl<'a, R, A> ExtractionOrchestrator<'a, R, A>
where
    R: RenderPage,
    A: AskAsync,
{
    pub fn new(renderer: &'a R, ai: &'a A, settings: OrchestratorSettings) -> Self {
        Self {
            renderer,
            ai,
            settings,
        }
    }

    /// Process every source in order and return the deduplicated articles.
    #[instrument(level = "info", skip_all, fields(sources = sources.len()))]
    pub async fn run(&self, sources: &[SourceRecord], sink: &mut ErrorSink) -> Vec<ResolvedArticle> {
        let total = sources.len();
        let mut articles = Vec::new();

        for (index, source) in sources.iter().enumerate() {
            info!(
                position = index + 1,
                total,
                url = %source.url,
                last_fetched = %source.last_fetched,
                "Processing source"
            );
            match self.process_source(source, sink).await {
                Ok(SourceOutcome::Done(found)) => {
                    info!(url = %source.url, articles = found.len(), "Source done");
                    articles.extend(found);
                }
                Ok(SourceOutcome::SkippedEmpty) => {
                    info!(url = %source.url, "No candidate items found");
                }
                Err(e) => {
                    error!(url = %source.url, error = %e, "Source failed");
                    sink.record(
                        Failure::new(e)
                            .context(format!("source {}", source.url))
                            .source_id(source.id),
                    );
                }
            }
        }

        let before = articles.len();
        let articles = dedup_by_title(articles, |a| a.title.clone());
        info!(
            total = articles.len(),
            duplicates = before - articles.len(),
            errors = sink.len(),
            "All sources processed"
        );
        articles
    }

    /// Run the whole state machine for one source.
    ///
    /// An `Err` means the source as a whole failed. Candidate-level failures
    /// are recorded in `sink` and never surface here.
    #[instrument(level = "info", skip_all, fields(url = %source.url))]
    pub async fn process_source(
        &self,
        source: &SourceRecord,
        sink: &mut ErrorSink,
    ) -> Result<SourceOutcome, IngestError> {
        let candidates = match self.extract_candidates(source).await {
            Ok(candidates) => candidates,
            Err(e @ IngestError::Parse { .. }) => {
                sink.record(
                    Failure::new(e)
                        .context(format!("source {}", source.url))
                        .source_id(source.id),
                );
                return Ok(SourceOutcome::SkippedEmpty);
            }
            Err(e) => return Err(e),
        };
        if candidates.is_empty() {
            return Ok(SourceOutcome::SkippedEmpty);
        }

        let found = candidates.len();
        let candidates = dedup_by_title(candidates, |c| c.title.clone());
        let cutoff = watermark_cutoff(source.last_fetched, self.settings.grace);
        let candidates: Vec<CandidateItem> = candidates
            .into_iter()
            .filter(|c| {
                let stale = is_stale(c.published_date, cutoff);
                if stale {
                    debug!(title = %c.title, date = ?c.published_date, %cutoff, "Skipping already seen candidate");
                }
                !stale
            })
            .collect();
        info!(found, fresh = candidates.len(), %cutoff, "Filtered candidate items");

        let mut articles = Vec::new();
        for mut candidate in candidates {
            let resolved = match resolve_url(&source.url, &candidate.url) {
                Ok(url) => url,
                Err(e) => {
                    sink.record(
                        Failure::new(e)
                            .context(candidate.title.clone())
                            .source_id(source.id),
                    );
                    continue;
                }
            };
            candidate.url = resolved;

            match self.resolve_candidate(source, &candidate, cutoff).await {
                Ok(Some(article)) => {
                    info!(title = %article.title, "Accepted article");
                    articles.push(article);
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(title = %candidate.title, error = %e, "Candidate failed");
                    sink.record(
                        Failure::new(e)
                            .context(candidate.title.clone())
                            .source_id(source.id),
                    );
                }
            }
        }

        Ok(SourceOutcome::Done(articles))
    }

    /// Render the listing page and ask the model for candidate items.
    async fn extract_candidates(&self, source: &SourceRecord) -> Result<Vec<CandidateItem>, IngestError> {
        let raw = self
            .renderer
            .render(&source.url, self.settings.page_timeout)
            .await?;
        let document = to_portable_document(&raw);
        let reply = self.ai.ask(list_directive(), &document).await?;
        let candidates = parse_candidates(&reply)?;

        let (usable, unusable): (Vec<_>, Vec<_>) = candidates
            .into_iter()
            .partition(|c| !c.title.trim().is_empty() && !c.url.trim().is_empty());
        if !unusable.is_empty() {
            debug!(count = unusable.len(), "Dropped candidates without title or url");
        }
        Ok(usable)
    }

    /// Fetch, localize and filter one candidate whose url is already absolute.
    ///
    /// `Ok(None)` is a filter decision, not a failure.
    #[instrument(level = "info", skip_all, fields(title = %candidate.title, url = %candidate.url))]
    async fn resolve_candidate(
        &self,
        source: &SourceRecord,
        candidate: &CandidateItem,
        cutoff: NaiveDate,
    ) -> Result<Option<ResolvedArticle>, IngestError> {
        let raw = self
            .renderer
            .render(&candidate.url, self.settings.article_timeout)
            .await?;
        let document = to_portable_document(&raw);
        let directive = detail_directive(&candidate.title, &self.settings.target_language);
        let reply = self.ai.ask(&directive, &document).await?;
        let detail = parse_detail(&reply)?;

        if is_stale(detail.publish_date, cutoff) {
            info!(date = ?detail.publish_date, %cutoff, "Article is older than the watermark; skipping");
            return Ok(None);
        }
        if candidate.published_date.is_none() && detail.publish_date.is_none() {
            info!("Article has no known publication date; skipping");
            return Ok(None);
        }

        Ok(Some(ResolvedArticle {
            title: candidate.title.clone(),
            title_localized: detail.title_localized,
            url: candidate.url.clone(),
            published_date: candidate.published_date.or(detail.publish_date),
            image_url: candidate.image_url.clone(),
            body_localized: detail.body_localized,
            summary_original: detail
                .summary_original
                .or_else(|| candidate.summary_text.clone()),
            summary_localized: detail.summary_localized,
            source_url: source.url.clone(),
            imported_at: Local::now(),
        }))
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted collaborators shared by the orchestrator and runner tests.

    use super::*;
    use std::cell::RefCell;
    use std::collections::HashMap;

    /// Serves fixed markup per url; unknown urls fail like an HTTP 404.
    #[derive(Default)]
    pub struct FakeRenderer {
        pages: HashMap<String, String>,
        pub requested: RefCell<Vec<String>>,
    }

    impl FakeRenderer {
        pub fn page(mut self, url: &str, markup: &str) -> Self {
            self.pages.insert(url.to_string(), markup.to_string());
            self
        }
    }

    impl RenderPage for FakeRenderer {
        async fn render(&self, url: &str, _timeout: StdDuration) -> Result<String, IngestError> {
            self.requested.borrow_mut().push(url.to_string());
            self.pages
                .get(url)
                .cloned()
                .ok_or_else(|| IngestError::Status {
                    url: url.to_string(),
                    status: 404,
                    body: String::new(),
                })
        }
    }

    /// Answers by looking for a marker in the document.
    ///
    /// Each page's markup carries a unique marker word; the reply registered
    /// for that marker is returned.
    #[derive(Default)]
    pub struct FakeAi {
        replies: Vec<(String, String)>,
    }

    impl FakeAi {
        pub fn reply(mut self, marker: &str, reply: &str) -> Self {
            self.replies.push((marker.to_string(), reply.to_string()));
            self
        }
    }

    impl AskAsync for FakeAi {
        async fn ask(&self, _directive: &str, document: &str) -> Result<String, IngestError> {
            self.replies
                .iter()
                .find(|(marker, _)| document.contains(marker.as_str()))
                .map(|(_, reply)| reply.clone())
                .ok_or_else(|| IngestError::Extraction("model returned no text".to_string()))
        }
    }

    pub fn page(marker: &str) -> String {
        format!("<html><body><main><p>{marker}</p></main></body></html>")
    }

    pub fn detail_reply(date: Option<&str>) -> String {
        let date = date.map_or("null".to_string(), |d| format!("\"{d}\""));
        format!(
            r#"```json
{{"titleLocalized": "Přeloženo", "bodyLocalized": "Tělo", "summaryOriginal": "Summary", "summaryLocalized": "Souhrn", "publishDate": {date}}}
```"#
        )
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use crate::models::SourceKind;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn source(url: &str, last_fetched: NaiveDate) -> SourceRecord {
        SourceRecord {
            url: url.to_string(),
            kind: SourceKind::Web,
            last_fetched,
            id: Some(42),
        }
    }

    #[test]
    fn test_dedup_keeps_first_per_title() {
        let items = vec![("A", 1), ("B", 2), ("A", 3), ("C", 4), ("B", 5)];
        let kept = dedup_by_title(items, |(t, _)| t.to_string());
        assert_eq!(kept, vec![("A", 1), ("B", 2), ("C", 4)]);
    }

    #[test]
    fn test_watermark_cutoff_and_staleness() {
        let cutoff = watermark_cutoff(date(2024, 1, 10), Duration::days(1));
        assert_eq!(cutoff, date(2024, 1, 9));
        assert!(is_stale(Some(date(2024, 1, 8)), cutoff));
        assert!(!is_stale(Some(date(2024, 1, 9)), cutoff));
        assert!(!is_stale(None, cutoff));
    }

    #[tokio::test]
    async fn test_end_to_end_incremental_filtering() {
        let listing = r#"[
            {"title": "A", "url": "/a", "date": "2024-01-08"},
            {"title": "B", "url": "/b", "date": null},
            {"title": "C", "url": "/c", "date": null},
            {"title": "D", "url": "/d", "date": "2024-01-09"}
        ]"#;
        let renderer = FakeRenderer::default()
            .page("https://example.com/news/", &page("LISTING"))
            .page("https://example.com/a", &page("DETAILA"))
            .page("https://example.com/b", &page("DETAILB"))
            .page("https://example.com/c", &page("DETAILC"))
            .page("https://example.com/d", &page("DETAILD"));
        let ai = FakeAi::default()
            .reply("LISTING", listing)
            .reply("DETAILA", &detail_reply(Some("2024-01-08")))
            .reply("DETAILB", &detail_reply(Some("2024-01-09")))
            .reply("DETAILC", &detail_reply(None))
            .reply("DETAILD", &detail_reply(None));
        let orchestrator = ExtractionOrchestrator::new(&renderer, &ai, OrchestratorSettings::default());
        let mut sink = ErrorSink::new();

        let src = source("https://example.com/news/", date(2024, 1, 10));
        let articles = orchestrator.run(&[src], &mut sink).await;

        // A is dropped before its detail page is ever fetched.
        assert!(!renderer.requested.borrow().contains(&"https://example.com/a".to_string()));
        let titles: Vec<&str> = articles.iter().map(|a| a.title.as_str()).collect();
        assert_eq!(titles, vec!["B", "D"]);
        assert_eq!(articles[0].published_date, Some(date(2024, 1, 9)));
        assert_eq!(articles[0].url, "https://example.com/b");
        assert_eq!(articles[0].title_localized.as_deref(), Some("Přeloženo"));
        assert_eq!(articles[0].source_url, "https://example.com/news/");
        assert_eq!(articles[1].published_date, Some(date(2024, 1, 9)));
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn test_stale_detail_date_is_dropped() {
        let renderer = FakeRenderer::default()
            .page("https://example.com/news/", &page("LISTING"))
            .page("https://example.com/b", &page("DETAILB"));
        let ai = FakeAi::default()
            .reply("LISTING", r#"[{"title": "B", "url": "/b", "date": null}]"#)
            .reply("DETAILB", &detail_reply(Some("2024-01-08")));
        let orchestrator = ExtractionOrchestrator::new(&renderer, &ai, OrchestratorSettings::default());
        let mut sink = ErrorSink::new();

        let articles = orchestrator
            .run(&[source("https://example.com/news/", date(2024, 1, 10))], &mut sink)
            .await;
        assert!(articles.is_empty());
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn test_list_date_wins_over_detail_date() {
        let renderer = FakeRenderer::default()
            .page("https://example.com/news/", &page("LISTING"))
            .page("https://example.com/news/x", &page("DETAILX"));
        let ai = FakeAi::default()
            .reply("LISTING", r#"[{"title": "X", "url": "x", "date": "2024-01-12"}]"#)
            .reply("DETAILX", &detail_reply(Some("2024-01-11")));
        let orchestrator = ExtractionOrchestrator::new(&renderer, &ai, OrchestratorSettings::default());
        let mut sink = ErrorSink::new();

        let articles = orchestrator
            .run(&[source("https://example.com/news/", date(2024, 1, 10))], &mut sink)
            .await;
        assert_eq!(articles.len(), 1);
        assert_eq!(articles[0].url, "https://example.com/news/x");
        assert_eq!(articles[0].published_date, Some(date(2024, 1, 12)));
    }

    #[tokio::test]
    async fn test_list_text_fills_missing_summary() {
        let renderer = FakeRenderer::default()
            .page("https://example.com/news/", &page("LISTING"))
            .page("https://example.com/y", &page("DETAILY"));
        let ai = FakeAi::default()
            .reply(
                "LISTING",
                r#"[{"title": "Y", "url": "/y", "date": "2024-01-12", "text": "Teaser"}]"#,
            )
            .reply("DETAILY", r#"{"titleLocalized": "Ypsilon", "bodyLocalized": "Tělo"}"#);
        let orchestrator = ExtractionOrchestrator::new(&renderer, &ai, OrchestratorSettings::default());
        let mut sink = ErrorSink::new();

        let articles = orchestrator
            .run(&[source("https://example.com/news/", date(2024, 1, 10))], &mut sink)
            .await;
        assert_eq!(articles.len(), 1);
        assert_eq!(articles[0].summary_original.as_deref(), Some("Teaser"));
        assert_eq!(articles[0].summary_localized, None);
    }

    #[tokio::test]
    async fn test_failed_candidate_does_not_stop_the_next_one() {
        let listing = r#"[
            {"title": "B", "url": "/b", "date": "2024-01-11"},
            {"title": "C", "url": "/c", "date": "2024-01-11"}
        ]"#;
        // No page registered for /b: its detail fetch fails.
        let renderer = FakeRenderer::default()
            .page("https://example.com/news/", &page("LISTING"))
            .page("https://example.com/c", &page("DETAILC"));
        let ai = FakeAi::default()
            .reply("LISTING", listing)
            .reply("DETAILC", &detail_reply(None));
        let orchestrator = ExtractionOrchestrator::new(&renderer, &ai, OrchestratorSettings::default());
        let mut sink = ErrorSink::new();

        let articles = orchestrator
            .run(&[source("https://example.com/news/", date(2024, 1, 10))], &mut sink)
            .await;
        assert_eq!(articles.len(), 1);
        assert_eq!(articles[0].title, "C");

        let failures = sink.drain();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].detail.as_deref(), Some("B"));
        assert_eq!(failures[0].source_id, Some(42));
        assert_eq!(failures[0].category, "HTTP");
    }

    #[tokio::test]
    async fn test_unparseable_detail_is_recorded() {
        let renderer = FakeRenderer::default()
            .page("https://example.com/news/", &page("LISTING"))
            .page("https://example.com/b", &page("DETAILB"));
        let ai = FakeAi::default()
            .reply("LISTING", r#"[{"title": "B", "url": "/b", "date": "2024-01-11"}]"#)
            .reply("DETAILB", "I could not find that article.");
        let orchestrator = ExtractionOrchestrator::new(&renderer, &ai, OrchestratorSettings::default());
        let mut sink = ErrorSink::new();

        let articles = orchestrator
            .run(&[source("https://example.com/news/", date(2024, 1, 10))], &mut sink)
            .await;
        assert!(articles.is_empty());
        let failures = sink.drain();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].category, "Parser");
    }

    #[tokio::test]
    async fn test_empty_or_unparseable_listing_skips_source() {
        let renderer = FakeRenderer::default()
            .page("https://empty.example/", &page("EMPTY"))
            .page("https://garbled.example/", &page("GARBLED"));
        let ai = FakeAi::default()
            .reply("EMPTY", "```json\n[]\n```")
            .reply("GARBLED", "Sorry, no news today.");
        let orchestrator = ExtractionOrchestrator::new(&renderer, &ai, OrchestratorSettings::default());
        let mut sink = ErrorSink::new();

        let empty = orchestrator
            .process_source(&source("https://empty.example/", date(2024, 1, 10)), &mut sink)
            .await
            .unwrap();
        assert!(matches!(empty, SourceOutcome::SkippedEmpty));
        assert!(sink.is_empty());

        let garbled = orchestrator
            .process_source(&source("https://garbled.example/", date(2024, 1, 10)), &mut sink)
            .await
            .unwrap();
        assert!(matches!(garbled, SourceOutcome::SkippedEmpty));
        assert_eq!(sink.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_source_does_not_stop_the_next_one() {
        let renderer = FakeRenderer::default()
            .page("https://good.example/", &page("GOOD"))
            .page("https://good.example/x", &page("DETAILX"));
        let ai = FakeAi::default()
            .reply("GOOD", r#"[{"title": "X", "url": "/x", "date": "2024-01-11"}]"#)
            .reply("DETAILX", &detail_reply(None));
        let orchestrator = ExtractionOrchestrator::new(&renderer, &ai, OrchestratorSettings::default());
        let mut sink = ErrorSink::new();

        let sources = [
            source("https://down.example/", date(2024, 1, 10)),
            source("https://good.example/", date(2024, 1, 10)),
        ];
        let articles = orchestrator.run(&sources, &mut sink).await;
        assert_eq!(articles.len(), 1);

        let failures = sink.drain();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].detail.as_deref(), Some("source https://down.example/"));
    }

    #[tokio::test]
    async fn test_duplicate_titles_within_listing_fetch_once() {
        let listing = r#"[
            {"title": "X", "url": "/x1", "date": "2024-01-11"},
            {"title": "X", "url": "/x2", "date": "2024-01-11"}
        ]"#;
        let renderer = FakeRenderer::default()
            .page("https://example.com/", &page("LISTING"))
            .page("https://example.com/x1", &page("DETAILX"))
            .page("https://example.com/x2", &page("DETAILX"));
        let ai = FakeAi::default()
            .reply("LISTING", listing)
            .reply("DETAILX", &detail_reply(None));
        let orchestrator = ExtractionOrchestrator::new(&renderer, &ai, OrchestratorSettings::default());
        let mut sink = ErrorSink::new();

        let articles = orchestrator
            .run(&[source("https://example.com/", date(2024, 1, 10))], &mut sink)
            .await;
        assert_eq!(articles.len(), 1);
        assert_eq!(articles[0].url, "https://example.com/x1");
        assert!(!renderer.requested.borrow().contains(&"https://example.com/x2".to_string()));
    }

    #[tokio::test]
    async fn test_same_title_across_sources_survives_once() {
        let renderer = FakeRenderer::default()
            .page("https://one.example/", &page("ONE"))
            .page("https://two.example/", &page("TWO"))
            .page("https://one.example/x", &page("DETAILONE"))
            .page("https://two.example/x", &page("DETAILTWO"));
        let ai = FakeAi::default()
            .reply("DETAILONE", &detail_reply(None))
            .reply("DETAILTWO", &detail_reply(None))
            .reply("ONE", r#"[{"title": "X", "url": "/x", "date": "2024-01-11"}]"#)
            .reply("TWO", r#"[{"title": "X", "url": "/x", "date": "2024-01-11"}]"#);
        let orchestrator = ExtractionOrchestrator::new(&renderer, &ai, OrchestratorSettings::default());
        let mut sink = ErrorSink::new();

        let sources = [
            source("https://one.example/", date(2024, 1, 10)),
            source("https://two.example/", date(2024, 1, 10)),
        ];
        let articles = orchestrator.run(&sources, &mut sink).await;
        assert_eq!(articles.len(), 1);
        assert_eq!(articles[0].source_url, "https://one.example/");
    }
}
