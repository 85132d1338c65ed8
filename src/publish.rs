//! Client for the remote news aggregation API.
//!
//! The run talks to the aggregator three times:
//!
//! | Call | Endpoint | Purpose |
//! |------|----------|---------|
//! | [`SourceCatalog::fetch_sources`] | `GET api/ainews/sources` | the authoritative source list |
//! | [`Publisher::publish_articles`] | `POST api/ainews/items` | the run's resolved articles |
//! | [`Publisher::publish_errors`] | `POST api/ainews/errors` | the run's drained failures |
//!
//! Every request carries the API key in an `X-Api-Key` header. Publishing is
//! best-effort: callers record a failed publish and carry on. Text fields are
//! cut to the lengths the API accepts before they are sent.

use crate::error::{FatalError, IngestError};
use crate::models::{FailureRecord, ResolvedArticle, SourceCatalogResponse};
use crate::utils::{truncate_chars, truncate_for_log};
use chrono::NaiveDate;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::Serialize;
use tracing::{info, instrument};
use url::Url;

const SOURCES_PATH: &str = "api/ainews/sources";
const ITEMS_PATH: &str = "api/ainews/items";
const ERRORS_PATH: &str = "api/ainews/errors";

const MAX_TITLE: usize = 200;
const MAX_SUMMARY: usize = 1000;
const MAX_URL: usize = 500;
const MAX_MESSAGE: usize = 500;
const MAX_DETAILS: usize = 2000;
const MAX_CATEGORY: usize = 50;

/// Where the run's sources come from.
pub trait SourceCatalog {
    async fn fetch_sources(&self) -> Result<SourceCatalogResponse, IngestError>;
}

/// Where the run's results go.
pub trait Publisher {
    async fn publish_articles(&self, articles: &[ResolvedArticle]) -> Result<(), IngestError>;
    async fn publish_errors(&self, errors: &[FailureRecord]) -> Result<(), IngestError>;
}

/// Item payload as the aggregator expects it.
#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
struct ItemPayload {
    title_en: String,
    title_cz: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content_en: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    content_cz: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary_en: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary_cz: Option<String>,
    url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    image_url: Option<String>,
    source_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    published_date: Option<NaiveDate>,
}

impl From<&ResolvedArticle> for ItemPayload {
    fn from(article: &ResolvedArticle) -> Self {
        let title_localized = article
            .title_localized
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or(&article.title);
        Self {
            title_en: truncate_chars(&article.title, MAX_TITLE),
            title_cz: truncate_chars(title_localized, MAX_TITLE),
            content_en: None,
            content_cz: Some(article.body_localized.clone()).filter(|b| !b.is_empty()),
            summary_en: article
                .summary_original
                .as_deref()
                .map(|s| truncate_chars(s, MAX_SUMMARY)),
            summary_cz: article
                .summary_localized
                .as_deref()
                .map(|s| truncate_chars(s, MAX_SUMMARY)),
            url: truncate_chars(&article.url, MAX_URL),
            image_url: article.image_url.as_deref().map(|u| truncate_chars(u, MAX_URL)),
            source_name: truncate_chars(&article.source_url, MAX_TITLE),
            published_date: article.published_date,
        }
    }
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
struct ErrorPayload {
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    stack_trace: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    source_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    category: Option<String>,
}

impl From<&FailureRecord> for ErrorPayload {
    fn from(record: &FailureRecord) -> Self {
        Self {
            message: truncate_chars(&record.message, MAX_MESSAGE),
            stack_trace: record.stack_context.clone(),
            source_id: record.source_id,
            details: record.detail.as_deref().map(|d| truncate_chars(d, MAX_DETAILS)),
            category: Some(truncate_chars(&record.category, MAX_CATEGORY)),
        }
    }
}

/// HTTP client for the aggregation API.
#[derive(Debug, Clone)]
pub struct AggregatorClient {
    client: reqwest::Client,
    base_url: Url,
}

impl AggregatorClient {
    pub fn new(base_url: &str, api_key: &str) -> Result<Self, FatalError> {
        // Without a trailing slash `join` would replace the last path segment.
        let normalized = format!("{}/", base_url.trim_end_matches('/'));
        let base_url = Url::parse(&normalized).map_err(|e| FatalError::InvalidSetting {
            name: "api_base_url",
            reason: e.to_string(),
        })?;

        let mut key = HeaderValue::from_str(api_key).map_err(|e| FatalError::InvalidSetting {
            name: "api_key",
            reason: e.to_string(),
        })?;
        key.set_sensitive(true);
        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", key);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(FatalError::HttpClient)?;
        Ok(Self { client, base_url })
    }

    fn endpoint(&self, path: &str) -> Result<Url, IngestError> {
        self.base_url.join(path).map_err(|source| IngestError::Url {
            url: path.to_string(),
            source,
        })
    }

    async fn post<T: Serialize>(&self, path: &str, body: &T) -> Result<(), IngestError> {
        let url = self.endpoint(path)?;
        let response = self
            .client
            .post(url.clone())
            .json(body)
            .send()
            .await
            .map_err(|source| IngestError::Http {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(IngestError::Status {
                url: url.to_string(),
                status: status.as_u16(),
                body: truncate_for_log(&body, 500),
            });
        }
        Ok(())
    }
}

impl SourceCatalog for AggregatorClient {
    #[instrument(level = "info", skip_all)]
    async fn fetch_sources(&self) -> Result<SourceCatalogResponse, IngestError> {
        let url = self.endpoint(SOURCES_PATH)?;
        let http_err = |source| IngestError::Http {
            url: url.to_string(),
            source,
        };

        let response = self.client.get(url.clone()).send().await.map_err(http_err)?;
        let status = response.status();
        let body = response.text().await.map_err(http_err)?;
        if !status.is_success() {
            return Err(IngestError::Status {
                url: url.to_string(),
                status: status.as_u16(),
                body: truncate_for_log(&body, 500),
            });
        }

        let catalog: SourceCatalogResponse =
            serde_json::from_str(&body).map_err(|source| IngestError::Parse {
                what: "source catalog",
                source,
            })?;
        info!(
            sources = catalog.sources.len(),
            total_count = catalog.total_count,
            "Fetched source catalog"
        );
        Ok(catalog)
    }
}

impl Publisher for AggregatorClient {
    #[instrument(level = "info", skip_all, fields(count = articles.len()))]
    async fn publish_articles(&self, articles: &[ResolvedArticle]) -> Result<(), IngestError> {
        if articles.is_empty() {
            info!("No articles to publish");
            return Ok(());
        }
        let payload: Vec<ItemPayload> = articles.iter().map(ItemPayload::from).collect();
        self.post(ITEMS_PATH, &payload).await?;
        info!("Published articles");
        Ok(())
    }

    #[instrument(level = "info", skip_all, fields(count = errors.len()))]
    async fn publish_errors(&self, errors: &[FailureRecord]) -> Result<(), IngestError> {
        if errors.is_empty() {
            info!("No errors to publish");
            return Ok(());
        }
        let payload: Vec<ErrorPayload> = errors.iter().map(ErrorPayload::from).collect();
        self.post(ERRORS_PATH, &payload).await?;
        info!("Published errors");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Local;

    fn article() -> ResolvedArticle {
        ResolvedArticle {
            title: "Original".to_string(),
            title_localized: None,
            url: "https://example.com/a".to_string(),
            published_date: NaiveDate::from_ymd_opt(2024, 1, 9),
            image_url: None,
            body_localized: "Tělo článku".to_string(),
            summary_original: Some("s".repeat(1500)),
            summary_localized: None,
            source_url: "https://example.com/news/".to_string(),
            imported_at: Local::now(),
        }
    }

    #[test]
    fn test_item_payload_mapping() {
        let payload = ItemPayload::from(&article());
        assert_eq!(payload.title_en, "Original");
        assert_eq!(payload.title_cz, "Original");
        assert_eq!(payload.content_cz.as_deref(), Some("Tělo článku"));
        assert_eq!(payload.summary_en.as_ref().map(|s| s.chars().count()), Some(1000));
        assert_eq!(payload.source_name, "https://example.com/news/");

        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["titleEn"], "Original");
        assert_eq!(json["publishedDate"], "2024-01-09");
        assert!(json.get("contentEn").is_none());
        assert!(json.get("imageUrl").is_none());
    }

    #[test]
    fn test_item_payload_prefers_localized_title() {
        let mut a = article();
        a.title_localized = Some("Přeložený titulek".to_string());
        assert_eq!(ItemPayload::from(&a).title_cz, "Přeložený titulek");
    }

    #[test]
    fn test_error_payload_truncates_fields() {
        let record = FailureRecord {
            message: "m".repeat(800),
            stack_context: Some("caused by: x".to_string()),
            source_id: Some(7),
            category: "HTTP".to_string(),
            detail: Some("d".repeat(3000)),
        };
        let payload = ErrorPayload::from(&record);
        assert_eq!(payload.message.len(), 500);
        assert_eq!(payload.details.as_ref().map(String::len), Some(2000));

        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["sourceId"], 7);
        assert_eq!(json["stackTrace"], "caused by: x");
        assert_eq!(json["category"], "HTTP");
    }

    #[test]
    fn test_endpoints_keep_base_path() {
        let client = AggregatorClient::new("https://api.example.com/v2", "secret").unwrap();
        assert_eq!(
            client.endpoint(ITEMS_PATH).unwrap().as_str(),
            "https://api.example.com/v2/api/ainews/items"
        );
        let client = AggregatorClient::new("https://api.example.com/", "secret").unwrap();
        assert_eq!(
            client.endpoint(SOURCES_PATH).unwrap().as_str(),
            "https://api.example.com/api/ainews/sources"
        );
    }

    #[test]
    fn test_invalid_base_url_is_fatal() {
        let err = AggregatorClient::new("not a url", "secret").unwrap_err();
        assert!(matches!(err, FatalError::InvalidSetting { name: "api_base_url", .. }));
    }

    #[tokio::test]
    async fn test_empty_batches_are_not_sent() {
        // Port 9 is discard; nothing should ever be dialed.
        let client = AggregatorClient::new("http://127.0.0.1:9/", "secret").unwrap();
        client.publish_articles(&[]).await.unwrap();
        client.publish_errors(&[]).await.unwrap();
    }
}
