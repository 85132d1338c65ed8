//! Run-scoped collector of non-fatal failures.
//!
//! One [`ErrorSink`] is created by the run controller and handed by `&mut` to
//! every stage that can fail without stopping the run. Entries are never
//! removed or deduplicated. [`ErrorSink::drain`] consumes the sink, so the
//! failures are turned into [`FailureRecord`]s exactly once.

use crate::error::IngestError;
use crate::models::FailureRecord;
use tracing::warn;

/// A recorded failure plus whatever context the recording stage knew.
#[derive(Debug)]
pub struct Failure {
    error: IngestError,
    context: Option<String>,
    source_id: Option<i64>,
}

impl Failure {
    pub fn new(error: IngestError) -> Self {
        Self {
            error,
            context: None,
            source_id: None,
        }
    }

    /// Attach a human-readable context, e.g. the article title or source url.
    pub fn context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn source_id(mut self, source_id: Option<i64>) -> Self {
        self.source_id = source_id;
        self
    }

    pub fn into_record(self) -> FailureRecord {
        FailureRecord {
            message: self.error.to_string(),
            stack_context: self.error.cause_chain(),
            source_id: self.source_id,
            category: self.error.category().to_string(),
            detail: self.context,
        }
    }
}

impl From<IngestError> for Failure {
    fn from(error: IngestError) -> Self {
        Failure::new(error)
    }
}

#[derive(Debug, Default)]
pub struct ErrorSink {
    entries: Vec<Failure>,
}

impl ErrorSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, failure: impl Into<Failure>) {
        let failure = failure.into();
        warn!(
            category = failure.error.category(),
            context = failure.context.as_deref().unwrap_or("-"),
            error = %failure.error,
            "Recorded non-fatal failure"
        );
        self.entries.push(failure);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Convert every recorded failure into a [`FailureRecord`], in recording order.
    pub fn drain(self) -> Vec<FailureRecord> {
        self.entries.into_iter().map(Failure::into_record).collect()
    }
}
