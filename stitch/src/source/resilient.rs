use std::time::Duration;

use stitch_config::SourceRetryConfig;
use tracing::{debug, info, warn};

use crate::error::{ErrorKind, StitchError, StitchResult};
use crate::source::RowSource;
use crate::types::{Row, SortKey};

/// One live cursor over an ordered query.
pub trait RowCursor {
    /// Fetches the next row, or `None` when this cursor is exhausted.
    fn fetch(&mut self) -> StitchResult<Option<Row>>;
}

/// A tabular backend that can (re)issue its ordered query from a watermark.
///
/// `resume_after` restricts the result to rows strictly greater than the
/// given key under lexicographic vector comparison; `limit` bounds the
/// number of rows of this open for memory-predictable pagination.
pub trait QueryBackend {
    fn open(
        &mut self,
        resume_after: Option<&SortKey>,
        limit: Option<u64>,
    ) -> StitchResult<Box<dyn RowCursor>>;
}

/// Retry behavior of a [`ResilientCursor`], resolved from configuration.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum transient-fault retries per fetch before giving up.
    pub max_attempts: u32,
    /// Fixed delay between attempts.
    pub delay: Duration,
    /// Emit a warning every this many consecutive failures.
    pub warn_every: u32,
}

impl From<&SourceRetryConfig> for RetryPolicy {
    fn from(config: &SourceRetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            delay: config.retry_delay(),
            warn_every: config.warn_every.max(1),
        }
    }
}

/// A [`RowSource`] that survives transient backend failures without
/// skipping or duplicating rows.
///
/// The cursor holds a watermark: the sort-key projection of the last row
/// successfully returned. Every reconnect reissues the backend query
/// filtered to rows strictly greater than the watermark, so a broken
/// connection resumes exactly where it left off. The watermark is updated
/// before a row is handed out.
///
/// With a `page_size`, each open is bounded to that many rows and the
/// cursor reopens transparently at page exhaustion; an immediately-empty
/// reopen signals true end of stream.
pub struct ResilientCursor {
    backend: Box<dyn QueryBackend>,
    cursor: Option<Box<dyn RowCursor>>,
    watermark: Option<SortKey>,
    sort_positions: Vec<usize>,
    page_size: Option<u64>,
    retry: RetryPolicy,
    label: String,
}

impl ResilientCursor {
    /// Creates a resilient cursor over `backend`.
    ///
    /// `sort_positions` are the positions of the sort key columns within the
    /// rows the backend yields; `label` names the stream in log output.
    pub fn new(
        backend: Box<dyn QueryBackend>,
        sort_positions: Vec<usize>,
        retry: RetryPolicy,
        page_size: Option<u64>,
        label: impl Into<String>,
    ) -> Self {
        Self {
            backend,
            cursor: None,
            watermark: None,
            sort_positions,
            page_size,
            retry,
            label: label.into(),
        }
    }

    /// Returns the current watermark, if any row has been returned yet.
    pub fn watermark(&self) -> Option<&SortKey> {
        self.watermark.as_ref()
    }

    /// Records a transient fault, sleeps, and decides whether the budget
    /// allows another attempt.
    fn note_transient(&self, attempts: &mut u32, fault: StitchError) -> StitchResult<()> {
        *attempts += 1;

        if *attempts >= self.retry.max_attempts {
            return Err(StitchError::from((
                ErrorKind::RetryBudgetExhausted,
                "source retry budget exhausted",
                format!(
                    "stream `{}` gave up after {} attempts",
                    self.label, *attempts
                ),
            ))
            .with_source(fault));
        }

        if *attempts % self.retry.warn_every == 0 {
            warn!(
                stream = %self.label,
                attempt = *attempts,
                error = %fault,
                "lost source connection, trying to re-establish"
            );
        }

        std::thread::sleep(self.retry.delay);
        Ok(())
    }
}

impl RowSource for ResilientCursor {
    fn next_row(&mut self) -> StitchResult<Option<Row>> {
        let mut attempts: u32 = 0;
        let mut empty_opens: u32 = 0;

        loop {
            if self.cursor.is_none() {
                match self.backend.open(self.watermark.as_ref(), self.page_size) {
                    Ok(cursor) => {
                        if attempts > 0 {
                            info!(
                                stream = %self.label,
                                attempts,
                                watermark = ?self.watermark,
                                "source connection re-established, resuming"
                            );
                        }
                        self.cursor = Some(cursor);
                    }
                    Err(err) if err.kind().is_transient() => {
                        self.note_transient(&mut attempts, err)?;
                        continue;
                    }
                    Err(err) => return Err(err),
                }
            }

            let cursor = match self.cursor.as_mut() {
                Some(cursor) => cursor,
                None => continue,
            };

            match cursor.fetch() {
                Ok(Some(row)) => {
                    self.watermark = Some(SortKey::project(&row, &self.sort_positions));
                    return Ok(Some(row));
                }
                Ok(None) => {
                    // A bounded page may have ended short of the true end of
                    // the source; reopen once from the watermark. Two
                    // consecutive empty opens are the real end.
                    if self.page_size.is_some() && empty_opens == 0 {
                        empty_opens += 1;
                        self.cursor = None;
                        continue;
                    }
                    debug!(stream = %self.label, "source exhausted");
                    return Ok(None);
                }
                Err(err) if err.kind().is_transient() => {
                    self.cursor = None;
                    self.note_transient(&mut attempts, err)?;
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn close(&mut self) -> StitchResult<()> {
        self.cursor = None;
        debug!(stream = %self.label, "closed resilient cursor");
        Ok(())
    }
}
