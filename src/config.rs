//! Settings resolution.
//!
//! Settings come from three layers, highest precedence first:
//!
//! 1. command-line flags and environment variables ([`Cli`])
//! 2. the optional YAML file named by `--config` ([`FileSettings`])
//! 3. built-in defaults
//!
//! The result is validated once. Anything missing or malformed is a
//! [`FatalError`] and the run never starts.
//!
//! # Example file
//!
//! ```yaml
//! google_api_key: "…"
//! api_base_url: https://news.example.com
//! api_key: "…"
//! page_load_timeout_ms: 8000
//! target_language: Czech
//! ```

use crate::cli::Cli;
use crate::error::FatalError;
use crate::orchestrator::OrchestratorSettings;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;
use url::Url;

pub const DEFAULT_MODEL: &str = "gemini-2.0-flash-lite";
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1";
pub const DEFAULT_PAGE_LOAD_TIMEOUT_MS: u64 = 5000;
pub const DEFAULT_ARTICLE_LOAD_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_GRACE_DAYS: i64 = 1;
const MAX_GRACE_DAYS: i64 = 3650;
pub const DEFAULT_TARGET_LANGUAGE: &str = "Czech";
pub const DEFAULT_SOURCES_FILE: &str = "sources.txt";

/// The YAML file layer. Every field is optional.
#[derive(Debug, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct FileSettings {
    pub google_api_key: Option<String>,
    pub model: Option<String>,
    pub gemini_base_url: Option<String>,
    pub api_base_url: Option<String>,
    pub api_key: Option<String>,
    pub page_load_timeout_ms: Option<u64>,
    pub article_load_timeout_ms: Option<u64>,
    pub grace_days: Option<i64>,
    pub target_language: Option<String>,
    pub sources_file: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
}

impl FileSettings {
    pub fn load(path: &Path) -> Result<Self, FatalError> {
        let raw = std::fs::read_to_string(path).map_err(|source| FatalError::ConfigRead {
            path: path.display().to_string(),
            source,
        })?;
        serde_yaml::from_str(&raw).map_err(|source| FatalError::ConfigParse {
            path: path.display().to_string(),
            source,
        })
    }
}

/// Fully resolved, validated settings for one run.
#[derive(Clone, PartialEq)]
pub struct Settings {
    pub google_api_key: String,
    pub model: String,
    pub gemini_base_url: String,
    pub api_base_url: String,
    pub api_key: String,
    pub page_load_timeout_ms: u64,
    pub article_load_timeout_ms: u64,
    pub grace_days: i64,
    pub target_language: String,
    pub sources_file: PathBuf,
    pub output_dir: PathBuf,
}

impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("model", &self.model)
            .field("gemini_base_url", &self.gemini_base_url)
            .field("api_base_url", &self.api_base_url)
            .field("page_load_timeout_ms", &self.page_load_timeout_ms)
            .field("article_load_timeout_ms", &self.article_load_timeout_ms)
            .field("grace_days", &self.grace_days)
            .field("target_language", &self.target_language)
            .field("sources_file", &self.sources_file)
            .field("output_dir", &self.output_dir)
            .finish_non_exhaustive()
    }
}

fn required(value: Option<String>, name: &'static str) -> Result<String, FatalError> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or(FatalError::MissingSetting(name))
}

impl Settings {
    /// Load the file named by `cli.config`, if any, and merge.
    pub fn resolve(cli: Cli) -> Result<Self, FatalError> {
        let file = match &cli.config {
            Some(path) => {
                info!(path = %path.display(), "Loading settings file");
                FileSettings::load(path)?
            }
            None => FileSettings::default(),
        };
        Self::merge(cli, file)
    }

    /// Merge the CLI layer over the file layer over defaults, then validate.
    pub fn merge(cli: Cli, file: FileSettings) -> Result<Self, FatalError> {
        let settings = Settings {
            google_api_key: required(cli.google_api_key.or(file.google_api_key), "google_api_key")?,
            model: cli
                .model
                .or(file.model)
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            gemini_base_url: file
                .gemini_base_url
                .unwrap_or_else(|| DEFAULT_GEMINI_BASE_URL.to_string()),
            api_base_url: required(cli.api_base_url.or(file.api_base_url), "api_base_url")?,
            api_key: required(cli.api_key.or(file.api_key), "api_key")?,
            page_load_timeout_ms: cli
                .page_load_timeout_ms
                .or(file.page_load_timeout_ms)
                .unwrap_or(DEFAULT_PAGE_LOAD_TIMEOUT_MS),
            article_load_timeout_ms: cli
                .article_load_timeout_ms
                .or(file.article_load_timeout_ms)
                .unwrap_or(DEFAULT_ARTICLE_LOAD_TIMEOUT_MS),
            grace_days: cli
                .grace_days
                .or(file.grace_days)
                .unwrap_or(DEFAULT_GRACE_DAYS),
            target_language: cli
                .target_language
                .or(file.target_language)
                .unwrap_or_else(|| DEFAULT_TARGET_LANGUAGE.to_string()),
            sources_file: cli
                .sources_file
                .or(file.sources_file)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_SOURCES_FILE)),
            output_dir: cli
                .output_dir
                .or(file.output_dir)
                .unwrap_or_else(|| PathBuf::from(".")),
        };
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), FatalError> {
        for (name, url) in [
            ("api_base_url", &self.api_base_url),
            ("gemini_base_url", &self.gemini_base_url),
        ] {
            Url::parse(url).map_err(|e| FatalError::InvalidSetting {
                name,
                reason: format!("{url}: {e}"),
            })?;
        }
        if self.page_load_timeout_ms == 0 {
            return Err(FatalError::InvalidSetting {
                name: "page_load_timeout_ms",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.article_load_timeout_ms == 0 {
            return Err(FatalError::InvalidSetting {
                name: "article_load_timeout_ms",
                reason: "must be greater than zero".to_string(),
            });
        }
        if !(0..=MAX_GRACE_DAYS).contains(&self.grace_days) {
            return Err(FatalError::InvalidSetting {
                name: "grace_days",
                reason: format!("must be between 0 and {MAX_GRACE_DAYS}"),
            });
        }
        if self.target_language.trim().is_empty() {
            return Err(FatalError::MissingSetting("target_language"));
        }
        Ok(())
    }

    pub fn orchestrator(&self) -> OrchestratorSettings {
        OrchestratorSettings {
            page_timeout: Duration::from_millis(self.page_load_timeout_ms),
            article_timeout: Duration::from_millis(self.article_load_timeout_ms),
            grace: chrono::Duration::days(self.grace_days),
            target_language: self.target_language.clone(),
        }
    }
}
