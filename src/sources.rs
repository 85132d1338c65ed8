//! The persisted watermark table.
//!
//! The table maps a source url to its kind and the date it was last fetched.
//! On disk it is a newline-delimited file:
//!
//! ```text
//! # url;kind;yyyyMMdd
//! https://example.com/news/;WEB;20240110
//! ```
//!
//! Blank lines and `#` comments are ignored; malformed lines are skipped with
//! a warning. The store is the only writer of the file.

use crate::error::IngestError;
use crate::error_sink::ErrorSink;
use crate::utils::write_atomic;
use crate::models::{SourceCatalogEntry, SourceKind, SourceRecord, UnknownSourceKind};
use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tracing::{debug, info, instrument, warn};

/// Date format of the third column.
const DATE_FORMAT: &str = "%Y%m%d";

/// url → record, ordered by url so the file and the processing order are stable.
pub type WatermarkTable = BTreeMap<String, SourceRecord>;

/// Why a persisted line was skipped.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LineError {
    #[error("expected 3 `;`-separated fields, found {0}")]
    FieldCount(usize),
    #[error("empty url")]
    EmptyUrl,
    #[error(transparent)]
    Kind(#[from] UnknownSourceKind),
    #[error("invalid date `{0}`, expected yyyyMMdd")]
    Date(String),
}

/// Parse one `url;kind;yyyyMMdd` line.
pub fn parse_line(line: &str) -> Result<SourceRecord, LineError> {
    let parts: Vec<&str> = line.split(';').collect();
    if parts.len() != 3 {
        return Err(LineError::FieldCount(parts.len()));
    }

    let url = parts[0].trim();
    if url.is_empty() {
        return Err(LineError::EmptyUrl);
    }
    let kind: SourceKind = parts[1].parse()?;
    let date = parts[2].trim();
    let last_fetched = NaiveDate::parse_from_str(date, DATE_FORMAT)
        .map_err(|_| LineError::Date(date.to_string()))?;

    Ok(SourceRecord {
        url: url.to_string(),
        kind,
        last_fetched,
        id: None,
    })
}

pub fn format_line(record: &SourceRecord) -> String {
    format!(
        "{};{};{}",
        record.url,
        record.kind,
        record.last_fetched.format(DATE_FORMAT)
    )
}

/// Parse a whole file body. Bad lines are logged and skipped.
pub fn parse_table(body: &str) -> WatermarkTable {
    let mut table = WatermarkTable::new();
    for (index, line) in body.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        match parse_line(trimmed) {
            Ok(record) => {
                table.insert(record.url.clone(), record);
            }
            Err(e) => warn!(line = index + 1, content = %trimmed, error = %e, "Skipping malformed watermark line"),
        }
    }
    table
}

/// Merge a freshly fetched catalog into `table`.
///
/// The catalog is authoritative for the kind and the id. A url that is new to
/// the table takes the catalog's date, or `today` when the catalog has none.
/// A known url takes the catalog's date only when it is not older than the
/// stored one: a watermark never moves backwards, even when the catalog
/// reports an earlier date. Entries with an empty url or an unknown kind are
/// skipped.
pub fn merge_catalog(table: &mut WatermarkTable, catalog: &[SourceCatalogEntry], today: NaiveDate) {
    for entry in catalog {
        let url = entry.url.trim();
        if url.is_empty() {
            debug!(id = entry.id, name = %entry.name, "Skipping catalog entry without url");
            continue;
        }
        let Some(kind) = entry.kind else {
            warn!(id = entry.id, %url, "Skipping catalog entry with unknown kind");
            continue;
        };
        let catalog_date = entry.last_fetched.unwrap_or(today);
        debug!(
            id = entry.id,
            name = %entry.name,
            active = entry.is_active,
            parameters = ?entry.parameters,
            %url,
            "Merging catalog entry"
        );

        table
            .entry(url.to_string())
            .and_modify(|record| {
                if catalog_date < record.last_fetched {
                    debug!(
                        %url,
                        stored = %record.last_fetched,
                        catalog = %catalog_date,
                        "Catalog date is older than the stored watermark; keeping stored date"
                    );
                } else {
                    record.last_fetched = catalog_date;
                }
                record.kind = kind;
                record.id = Some(entry.id);
            })
            .or_insert_with(|| SourceRecord {
                url: url.to_string(),
                kind,
                last_fetched: catalog_date,
                id: Some(entry.id),
            });
    }
}

/// Loads, reconciles and persists the watermark table at one path.
#[derive(Debug, Clone)]
pub struct SourceStore {
    path: PathBuf,
}

impl SourceStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the persisted table.
    ///
    /// A missing file is an empty table. Any other I/O error is recorded in
    /// `sink` and also yields an empty table.
    #[instrument(level = "info", skip_all, fields(path = %self.path.display()))]
    pub async fn load(&self, sink: &mut ErrorSink) -> WatermarkTable {
        match fs::read_to_string(&self.path).await {
            Ok(body) => {
                let table = parse_table(&body);
                info!(count = table.len(), "Loaded watermark table");
                table
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!("Watermark file does not exist yet");
                WatermarkTable::new()
            }
            Err(e) => {
                sink.record(IngestError::Io {
                    path: self.path.display().to_string(),
                    source: e,
                });
                WatermarkTable::new()
            }
        }
    }

    /// Write the table, replacing the file atomically.
    ///
    /// An empty table is not written, so a run that finds no sources leaves
    /// no file behind.
    pub async fn save(&self, table: &WatermarkTable) -> Result<(), IngestError> {
        if table.is_empty() {
            debug!(path = %self.path.display(), "Watermark table is empty; nothing to save");
            return Ok(());
        }
        let mut body = table.values().map(format_line).collect::<Vec<_>>().join("\n");
        body.push('\n');

        write_atomic(&self.path, body.as_bytes()).await?;
        debug!(path = %self.path.display(), count = table.len(), "Saved watermark table");
        Ok(())
    }

    /// Merge `catalog` into the persisted table, persist it, and return it.
    ///
    /// A failed save is recorded in `sink`; the merged table is still returned.
    #[instrument(level = "info", skip_all, fields(path = %self.path.display(), catalog = catalog.len()))]
    pub async fn reconcile(
        &self,
        catalog: &[SourceCatalogEntry],
        today: NaiveDate,
        sink: &mut ErrorSink,
    ) -> WatermarkTable {
        let mut table = self.load(sink).await;
        merge_catalog(&mut table, catalog, today);
        if let Err(e) = self.save(&table).await {
            sink.record(e);
        }
        info!(count = table.len(), "Reconciled watermark table with catalog");
        table
    }
}
