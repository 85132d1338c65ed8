//! Human-readable dump of the run's failures.

use crate::error::IngestError;
use crate::utils::write_atomic;
use crate::models::FailureRecord;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tracing::{info, instrument};

pub const DIAGNOSTICS_FILE: &str = "exceptions.txt";

/// Render failures as numbered blocks, one per record.
pub fn render(errors: &[FailureRecord]) -> String {
    let mut out = format!("{} error(s) occurred during the run.\n", errors.len());
    for (i, record) in errors.iter().enumerate() {
        let _ = write!(out, "\n({}) [{}] {}\n", i + 1, record.category, record.message);
        if let Some(detail) = &record.detail {
            let _ = writeln!(out, "    context: {detail}");
        }
        if let Some(id) = record.source_id {
            let _ = writeln!(out, "    source id: {id}");
        }
        if let Some(chain) = &record.stack_context {
            for line in chain.lines() {
                let _ = writeln!(out, "    {line}");
            }
        }
    }
    out
}

/// Write `{output_dir}/exceptions.txt` when `errors` is non-empty.
///
/// Returns `Ok(None)` without touching the file system for an empty list.
#[instrument(level = "info", skip_all, fields(output_dir = %output_dir.display(), count = errors.len()))]
pub async fn write_diagnostics(
    errors: &[FailureRecord],
    output_dir: &Path,
) -> Result<Option<PathBuf>, IngestError> {
    if errors.is_empty() {
        return Ok(None);
    }
    let path = output_dir.join(DIAGNOSTICS_FILE);
    write_atomic(&path, render(errors).as_bytes()).await?;
    info!(path = %path.display(), "Wrote diagnostics file");
    Ok(Some(path))
}
