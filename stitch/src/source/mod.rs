//! Physical row sources and the source protocol consumed by simple readers.
//!
//! A [`SourceProvider`] names the physical inputs backing one entity type;
//! the simple reader opens them lazily, in declared order, and concatenates
//! them transparently. A [`RowSource`] yields raw, un-decoded rows; end of
//! stream is a value, never an error.

mod csv;
mod postgres;
mod resilient;

pub use self::csv::{CsvFileSource, CsvSourceProvider};
pub use self::postgres::{PgQueryBackend, PgSourceProvider, PgTable};
pub use self::resilient::{QueryBackend, ResilientCursor, RetryPolicy, RowCursor};

use crate::error::StitchResult;
use crate::types::Row;

/// One open physical input: an open file, a live database cursor.
pub trait RowSource {
    /// Returns the next raw row, or `None` at end of stream.
    fn next_row(&mut self) -> StitchResult<Option<Row>>;

    /// Releases the underlying resource. Called once; the source is not
    /// used afterwards.
    fn close(&mut self) -> StitchResult<()>;
}

/// Factory for the physical inputs backing one entity type.
///
/// Providers describe how many physical sources exist and open them on
/// demand; each opened source is owned by exactly one reader.
pub trait SourceProvider {
    /// The number of physical sources, opened in order `0..source_count()`.
    fn source_count(&self) -> usize;

    /// Opens the physical source at `index`.
    fn open_source(&self, index: usize) -> StitchResult<Box<dyn RowSource>>;
}
