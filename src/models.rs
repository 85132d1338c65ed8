//! Data models for sources, candidate items, and resolved articles.
//!
//! This module defines the core data structures used throughout the run:
//! - [`SourceRecord`]: one row of the watermark table
//! - [`SourceCatalogEntry`] / [`SourceCatalogResponse`]: the remote source catalog
//! - [`CandidateItem`]: a tentative article found on a source's listing page
//! - [`ArticleDetail`]: the localized content extracted from an article page
//! - [`ResolvedArticle`]: the final record written to `result.json` and published
//! - [`FailureRecord`] / [`RunResult`]: the aggregate output of one run
//!
//! Model replies and the catalog use camelCase field names, hence the serde
//! `rename_all` attributes.

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

/// How a source publishes its news.
///
/// Every kind goes through the same render → extract flow; the kind is kept
/// because the catalog owns it and the watermark file persists it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    Rss,
    Web,
    Api,
}

impl SourceKind {
    const ALL: [SourceKind; 3] = [SourceKind::Rss, SourceKind::Web, SourceKind::Api];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Rss => "RSS",
            SourceKind::Web => "WEB",
            SourceKind::Api => "API",
        }
    }

    /// Map the catalog's numeric enum value onto a kind.
    pub fn from_index(index: u64) -> Option<Self> {
        Self::ALL.get(index as usize).copied()
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a kind name matches none of the known kinds.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown source kind `{0}`")]
pub struct UnknownSourceKind(pub String);

impl FromStr for SourceKind {
    type Err = UnknownSourceKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| UnknownSourceKind(trimmed.to_string()))
    }
}

impl Serialize for SourceKind {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// One row of the watermark table.
///
/// Identity is `url`. `id` is only known when the row came from the remote
/// catalog during this run; it is never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRecord {
    pub url: String,
    pub kind: SourceKind,
    pub last_fetched: NaiveDate,
    pub id: Option<i64>,
}

/// One source as described by the remote catalog.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceCatalogEntry {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub url: String,
    /// `None` when the catalog sends a kind this importer does not know.
    #[serde(default, alias = "type", deserialize_with = "lenient_kind")]
    pub kind: Option<SourceKind>,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default, deserialize_with = "lenient_date")]
    pub last_fetched: Option<NaiveDate>,
    #[serde(default)]
    pub parameters: Option<String>,
}

/// Body of `GET api/ainews/sources`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceCatalogResponse {
    #[serde(default)]
    pub sources: Vec<SourceCatalogEntry>,
    #[serde(default)]
    pub total_count: i64,
}

/// A tentative article reference found on a listing page.
///
/// Field names follow the list directive sent to the model.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateItem {
    #[serde(default, deserialize_with = "string_or_null")]
    pub title: String,
    #[serde(default, deserialize_with = "string_or_null")]
    pub url: String,
    #[serde(default, rename = "date", deserialize_with = "lenient_date")]
    pub published_date: Option<NaiveDate>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default, rename = "text")]
    pub summary_text: Option<String>,
}

/// Localized content extracted from a single article page.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticleDetail {
    #[serde(default, alias = "TitleCz", alias = "titleCz")]
    pub title_localized: Option<String>,
    #[serde(
        default,
        alias = "ContentCz",
        alias = "contentCz",
        deserialize_with = "string_or_null"
    )]
    pub body_localized: String,
    #[serde(default, alias = "SummaryEn", alias = "summaryEn")]
    pub summary_original: Option<String>,
    #[serde(default, alias = "SummaryCz", alias = "summaryCz")]
    pub summary_localized: Option<String>,
    #[serde(
        default,
        alias = "PublishDate",
        alias = "publishedDate",
        deserialize_with = "lenient_date"
    )]
    pub publish_date: Option<NaiveDate>,
}

/// A fully processed article. Identity is `title` within one run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedArticle {
    pub title: String,
    pub title_localized: Option<String>,
    pub url: String,
    pub published_date: Option<NaiveDate>,
    pub image_url: Option<String>,
    pub body_localized: String,
    pub summary_original: Option<String>,
    pub summary_localized: Option<String>,
    pub source_url: String,
    pub imported_at: DateTime<Local>,
}

/// A non-fatal failure as reported to the errors endpoint and the diagnostic file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureRecord {
    pub message: String,
    pub stack_context: Option<String>,
    pub source_id: Option<i64>,
    pub category: String,
    pub detail: Option<String>,
}

/// Everything one run produced.
#[derive(Debug, Default)]
pub struct RunResult {
    pub articles: Vec<ResolvedArticle>,
    pub errors: Vec<FailureRecord>,
}

/// Parse a date the way models and the catalog tend to write them.
///
/// Accepts RFC 3339 timestamps, naive date-times and plain `YYYY-MM-DD`
/// dates. Anything else is `None`: an unknown date, not an error.
pub fn parse_date_lenient(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.date_naive());
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(dt.date());
        }
    }
    raw.get(..10)
        .and_then(|prefix| NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok())
}

fn lenient_date<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => parse_date_lenient(&s),
        _ => None,
    })
}

fn lenient_kind<'de, D>(deserializer: D) -> Result<Option<SourceKind>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => s.parse().ok(),
        Some(serde_json::Value::Number(n)) => n.as_u64().and_then(SourceKind::from_index),
        _ => None,
    })
}

fn string_or_null<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}
