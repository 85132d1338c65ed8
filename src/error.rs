//! Error types for the ingestion run.
//!
//! Two families exist:
//! - [`IngestError`]: non-fatal failures. They are recorded in the
//!   [`ErrorSink`](crate::error_sink::ErrorSink) and the run carries on.
//! - [`FatalError`]: broken preconditions (configuration, no sources, an
//!   unwritable output directory). These abort the run with a non-zero exit.

use std::error::Error as StdError;
use thiserror::Error;

/// A failure that costs one item, one source, or one publish call, but never the run.
#[derive(Error, Debug)]
pub enum IngestError {
    /// The request never produced a response.
    #[error("HTTP request to {url} failed")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The server answered with a non-success status.
    #[error("HTTP {status} from {url}: {body}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },

    /// The render deadline passed before the page sent any response.
    #[error("rendering {url} timed out after {timeout_ms} ms")]
    RenderTimeout { url: String, timeout_ms: u64 },

    /// The semantic-extraction service answered without usable text.
    #[error("semantic extraction failed: {0}")]
    Extraction(String),

    /// A model reply could not be parsed into the expected structure.
    #[error("could not parse {what} from model reply")]
    Parse {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid url {url}")]
    Url {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("I/O error on {path}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("could not serialize {what}")]
    Serialize {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

impl IngestError {
    /// Stable category label reported alongside each failure.
    pub fn category(&self) -> &'static str {
        match self {
            IngestError::Http { .. } | IngestError::Status { .. } => "HTTP",
            IngestError::RenderTimeout { .. } => "Render",
            IngestError::Extraction(_) => "Extraction",
            IngestError::Parse { .. } => "Parser",
            IngestError::Url { .. } => "Url",
            IngestError::Io { .. } => "IO",
            IngestError::Serialize { .. } => "Serialization",
        }
    }

    /// Flatten the `source()` chain into one line per cause, or `None` when there is none.
    pub fn cause_chain(&self) -> Option<String> {
        let mut causes = Vec::new();
        let mut current = self.source();
        while let Some(cause) = current {
            causes.push(format!("caused by: {cause}"));
            current = cause.source();
        }
        if causes.is_empty() {
            None
        } else {
            Some(causes.join("\n"))
        }
    }
}

/// A broken precondition. The run stops before producing any artifact.
#[derive(Error, Debug)]
pub enum FatalError {
    #[error("missing required setting `{0}`")]
    MissingSetting(&'static str),

    #[error("invalid setting `{name}`: {reason}")]
    InvalidSetting { name: &'static str, reason: String },

    #[error("could not read config file {path}")]
    ConfigRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("could not parse config file {path}")]
    ConfigParse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("no news sources available from the catalog or from {path}")]
    NoSources { path: String },

    #[error("output directory {path} is not writable")]
    OutputDir {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("could not build HTTP client")]
    HttpClient(#[source] reqwest::Error),
}
