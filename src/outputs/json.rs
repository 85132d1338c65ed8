//! JSON output of the run's articles.

use crate::error::IngestError;
use crate::utils::write_atomic;
use crate::models::ResolvedArticle;
use std::path::{Path, PathBuf};
use tracing::{info, instrument};

pub const RESULT_FILE: &str = "result.json";

/// Serialize `articles` as a pretty-printed array to `{output_dir}/result.json`.
///
/// The file is always written, even when there are no articles.
#[instrument(level = "info", skip_all, fields(output_dir = %output_dir.display(), count = articles.len()))]
pub async fn write_result(
    articles: &[ResolvedArticle],
    output_dir: &Path,
) -> Result<PathBuf, IngestError> {
    let json = serde_json::to_string_pretty(articles).map_err(|source| IngestError::Serialize {
        what: "articles",
        source,
    })?;

    let path = output_dir.join(RESULT_FILE);
    info!(path = %path.display(), "Writing JSON");
    write_atomic(&path, json.as_bytes()).await?;
    info!(path = %path.display(), "Wrote result file");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Local, NaiveDate};

    #[tokio::test]
    async fn test_write_result_round_trips_fields() {
        let dir = tempfile::tempdir().unwrap();
        let article = ResolvedArticle {
            title: "A".to_string(),
            title_localized: Some("Á".to_string()),
            url: "https://example.com/a".to_string(),
            published_date: NaiveDate::from_ymd_opt(2024, 1, 9),
            image_url: None,
            body_localized: "Text".to_string(),
            summary_original: None,
            summary_localized: None,
            source_url: "https://example.com/".to_string(),
            imported_at: Local::now(),
        };

        let path = write_result(&[article], dir.path()).await.unwrap();
        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written[0]["title"], "A");
        assert_eq!(written[0]["titleLocalized"], "Á");
        assert_eq!(written[0]["publishedDate"], "2024-01-09");
        assert_eq!(written[0]["sourceUrl"], "https://example.com/");
        assert!(!dir.path().join("result.tmp").exists());
    }

    #[tokio::test]
    async fn test_write_result_empty_batch() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_result(&[], dir.path()).await.unwrap();
        assert_eq!(std::fs::read_to_string(path).unwrap(), "[]");
    }

    #[tokio::test]
    async fn test_write_result_missing_dir_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = write_result(&[], &dir.path().join("missing")).await.unwrap_err();
        assert_eq!(err.category(), "IO");
    }
}
