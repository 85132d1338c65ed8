//! Page rendering: URL → raw markup.
//!
//! [`RenderPage`] is the seam the orchestrator depends on. [`HttpRenderer`]
//! is the production implementation: a plain HTTP fetch with browser-like
//! headers. It does not execute JavaScript.
//!
//! # Deadline
//!
//! Each call gets a timeout. If no response arrives in time the call fails
//! with [`IngestError::RenderTimeout`]. If the body is still streaming when
//! the deadline passes, the bytes received so far are returned: partial
//! markup is still worth extracting from.
//!
//! # Charset
//!
//! The body is decoded with the `charset` named in the `Content-Type`
//! header, falling back to UTF-8 when it is missing or unknown. A byte order
//! mark overrides both.

use crate::error::IngestError;
use encoding_rs::{Encoding, UTF_8};
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, CONTENT_TYPE, HeaderMap, HeaderValue};
use std::time::Duration;
use tokio::time::{Instant, timeout_at};
use tracing::{info, instrument, warn};

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36";

/// The encoding named by a `Content-Type` value such as
/// `text/html; charset=windows-1250`.
fn charset_of(content_type: &str) -> Option<&'static Encoding> {
    content_type
        .split(';')
        .filter_map(|param| param.split_once('='))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("charset"))
        .and_then(|(_, label)| Encoding::for_label(label.trim().trim_matches('"').as_bytes()))
}

/// Turns a URL into raw markup.
pub trait RenderPage {
    async fn render(&self, url: &str, timeout: Duration) -> Result<String, IngestError>;
}

#[derive(Debug, Clone)]
pub struct HttpRenderer {
    client: reqwest::Client,
}

impl HttpRenderer {
    pub fn new() -> Result<Self, reqwest::Error> {
        let client = client_builder().build()?;
        Ok(Self { client })
    }
}

fn client_builder() -> reqwest::ClientBuilder {
    let mut headers = HeaderMap::new();
    headers.insert(
        ACCEPT,
        HeaderValue::from_static(
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
        ),
    );
    headers.insert(
        ACCEPT_LANGUAGE,
        HeaderValue::from_static("cs-CZ,cs;q=0.9,en-US;q=0.8,en;q=0.7"),
    );

    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .default_headers(headers)
        .redirect(reqwest::redirect::Policy::limited(5))
}

impl RenderPage for HttpRenderer {
    #[instrument(level = "info", skip_all, fields(%url, timeout_ms = timeout.as_millis() as u64))]
    async fn render(&self, url: &str, timeout: Duration) -> Result<String, IngestError> {
        let deadline = Instant::now() + timeout;
        let timed_out = || IngestError::RenderTimeout {
            url: url.to_string(),
            timeout_ms: timeout.as_millis() as u64,
        };

        let mut response = timeout_at(deadline, self.client.get(url).send())
            .await
            .map_err(|_| timed_out())?
            .map_err(|source| IngestError::Http {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(IngestError::Status {
                url: url.to_string(),
                status: status.as_u16(),
                body: String::new(),
            });
        }

        let encoding = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(charset_of)
            .unwrap_or(UTF_8);

        let mut body = Vec::new();
        loop {
            match timeout_at(deadline, response.chunk()).await {
                Ok(Ok(Some(chunk))) => body.extend_from_slice(&chunk),
                Ok(Ok(None)) => break,
                Ok(Err(source)) => {
                    return Err(IngestError::Http {
                        url: url.to_string(),
                        source,
                    });
                }
                Err(_) => {
                    warn!(bytes = body.len(), "Render deadline passed; using partial content");
                    break;
                }
            }
        }

        let (markup, used, had_errors) = encoding.decode(&body);
        if had_errors {
            warn!(charset = used.name(), "Body contained malformed sequences");
        }
        info!(bytes = body.len(), charset = used.name(), "Rendered page");
        Ok(markup.into_owned())
    }
}
