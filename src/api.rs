//! LLM interaction for semantic extraction.
//!
//! This module owns every conversation with the model:
//! - [`AskAsync`]: the trait the orchestrator depends on
//! - [`GeminiClient`]: the production implementation (Google Gemini `generateContent`)
//! - [`list_directive`] / [`detail_directive`]: the two prompts the run uses
//! - [`normalize_reply`]: the one place that unwraps fenced or chatty replies
//! - [`parse_candidates`] / [`parse_detail`]: structured parsing after normalization
//!
//! Calls are made exactly once; there is no retry.

use crate::error::IngestError;
use crate::models::{ArticleDetail, CandidateItem};
use crate::utils::{looks_truncated, truncate_for_log};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

/// Trait for async LLM interaction.
///
/// `directive` tells the model what to do; `document` is the Markdown it
/// should do it on. The reply is the model's raw text.
pub trait AskAsync {
    async fn ask(&self, directive: &str, document: &str) -> Result<String, IngestError>;
}

/// Directive for the listing page of a source.
pub fn list_directive() -> &'static str {
    "Find all news items about AI in the Markdown text below. \
     Return them as a JSON array of objects with the properties \
     'title', 'url', 'date', 'imageUrl' and 'text': the item's title, the URL of its detail page, \
     its publication date as a JSON date (YYYY-MM-DD) or null when unknown, the URL of its image \
     or null, and its short text. Return only the JSON array."
}

/// Directive for one article page, translating into `language`.
pub fn detail_directive(title: &str, language: &str) -> String {
    format!(
        "Below is a Markdown document. Find the complete text of the news item '{title}' and \
         translate it into {language}. Also try to find the publication date of the item in the \
         document. Return a JSON object with the properties 'titleLocalized', 'bodyLocalized', \
         'summaryOriginal', 'summaryLocalized' and 'publishDate': the title in {language}, the \
         full {language} translation, a short summary in the original language, the same summary \
         in {language}, and the publication date as a JSON date (YYYY-MM-DD) or null when \
         unknown. Return only the JSON object."
    )
}

/// Strip Markdown code fences and surrounding chatter from a model reply.
///
/// Models often wrap JSON in ```` ```json ```` fences or add a sentence
/// before it. The result starts at the first `[` or `{` and ends at the
/// matching last `]` or `}` when such a span exists.
pub fn normalize_reply(raw: &str) -> &str {
    let mut text = raw.trim();
    if let Some(rest) = strip_prefix_ignore_case(text, "```json") {
        text = rest;
    } else if let Some(rest) = text.strip_prefix("```") {
        text = rest;
    }
    if let Some(rest) = text.trim_end().strip_suffix("```") {
        text = rest;
    }
    let text = text.trim();

    let start = text.find(['[', '{']);
    let end = text.rfind([']', '}']);
    match (start, end) {
        (Some(start), Some(end)) if start < end => &text[start..=end],
        _ => text,
    }
}

fn strip_prefix_ignore_case<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    let head = text.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix)
        .then(|| &text[prefix.len()..])
}

/// Parse the reply to [`list_directive`].
pub fn parse_candidates(reply: &str) -> Result<Vec<CandidateItem>, IngestError> {
    let json = normalize_reply(reply);
    serde_json::from_str::<Vec<CandidateItem>>(json).map_err(|source| {
        if looks_truncated(&source) {
            warn!(error = %source, "Candidate list looks truncated");
        }
        debug!(reply = %truncate_for_log(reply, 300), "Unparseable candidate list");
        IngestError::Parse {
            what: "candidate list",
            source,
        }
    })
}

/// Parse the reply to [`detail_directive`].
pub fn parse_detail(reply: &str) -> Result<ArticleDetail, IngestError> {
    let json = normalize_reply(reply);
    serde_json::from_str::<ArticleDetail>(json).map_err(|source| {
        if looks_truncated(&source) {
            warn!(error = %source, "Article detail looks truncated");
        }
        debug!(reply = %truncate_for_log(reply, 300), "Unparseable article detail");
        IngestError::Parse {
            what: "article detail",
            source,
        }
    })
}

#[derive(Debug, Serialize)]
struct GenerateContentRequest<'a> {
    contents: [Content<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: [Part<'a>; 2],
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<ResponseCandidate>,
}

#[derive(Debug, Deserialize)]
struct ResponseCandidate {
    content: Option<ResponseContent>,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

impl GenerateContentResponse {
    fn first_text(self) -> Option<String> {
        self.candidates
            .into_iter()
            .next()?
            .content?
            .parts
            .into_iter()
            .next()?
            .text
    }
}

/// Client for the Gemini `generateContent` endpoint.
#[derive(Clone)]
pub struct GeminiClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
}

impl std::fmt::Debug for GeminiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiClient")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl GeminiClient {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: reqwest::Client::builder().build()?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            api_key: api_key.into(),
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.base_url,
            urlencoding::encode(&self.model)
        )
    }
}

impl AskAsync for GeminiClient {
    #[instrument(level = "info", skip_all, fields(model = %self.model, document_bytes = document.len()))]
    async fn ask(&self, directive: &str, document: &str) -> Result<String, IngestError> {
        let t0 = Instant::now();
        let url = self.endpoint();
        let request = GenerateContentRequest {
            contents: [Content {
                parts: [Part { text: directive }, Part { text: document }],
            }],
        };

        let response = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&request)
            .send()
            .await
            .map_err(|source| IngestError::Http {
                url: url.clone(),
                source,
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|source| IngestError::Http {
            url: url.clone(),
            source,
        })?;
        if !status.is_success() {
            return Err(IngestError::Status {
                url,
                status: status.as_u16(),
                body: truncate_for_log(&body, 500),
            });
        }

        let parsed: GenerateContentResponse =
            serde_json::from_str(&body).map_err(|source| IngestError::Parse {
                what: "generateContent response",
                source,
            })?;
        let text = parsed
            .first_text()
            .filter(|text| !text.trim().is_empty())
            .ok_or_else(|| IngestError::Extraction("model returned no text".to_string()))?;

        info!(
            elapsed_ms = t0.elapsed().as_millis() as u64,
            reply_bytes = text.len(),
            "Model replied"
        );
        Ok(text)
    }
}
