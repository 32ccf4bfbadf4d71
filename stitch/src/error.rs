//! Error types and result definitions for stitch operations.
//!
//! Provides a kind-classified error system for the read, merge and sort
//! paths. The [`ErrorKind`] enumeration is the closed taxonomy that drives
//! propagation: transient source faults are retried by the resilient cursor,
//! row-translation failures are skipped with a warning by the readers, and
//! everything else surfaces immediately with the originating error attached.

use std::borrow::Cow;
use std::error;
use std::fmt;
use std::panic::Location;
use std::sync::Arc;

/// Convenient result type for stitch operations using [`StitchError`] as the error type.
pub type StitchResult<T> = Result<T, StitchError>;

/// Main error type for stitch operations.
///
/// Carries a [`ErrorKind`] for classification, a static description, optional
/// dynamic detail, an optional source error and the callsite that created it.
#[derive(Debug, Clone)]
pub struct StitchError {
    kind: ErrorKind,
    description: Cow<'static, str>,
    detail: Option<Cow<'static, str>>,
    source: Option<Arc<dyn error::Error + Send + Sync>>,
    location: &'static Location<'static>,
}

/// Specific categories of errors that can occur while reading, merging or
/// sorting streams.
#[derive(PartialEq, Eq, Copy, Clone, Debug, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    // Transient source faults, retried by the resilient cursor.
    SourceConnectionFailed,
    SourceIoError,

    // Database failures that retrying will not fix.
    SourceQueryFailed,

    /// The retry budget of a resilient cursor was spent; wraps the last
    /// transient fault as its source.
    RetryBudgetExhausted,

    // Per-row decode failures, skipped with a warning by the readers.
    RowTranslationFailed,
    InvalidData,

    /// A merged child entity matched no declared relationship of its parent
    /// type. Indicates a schema/config mismatch, raised immediately.
    StructuralViolation,

    // Schema and configuration errors.
    MissingSchema,
    MissingSourceBinding,
    ConfigError,
    InvalidState,

    // Local I/O outside a source connection.
    IoError,
}

impl ErrorKind {
    /// Returns whether a fault of this kind may be healed by reconnecting
    /// and resuming from the watermark.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ErrorKind::SourceConnectionFailed | ErrorKind::SourceIoError
        )
    }

    /// Returns whether a failure of this kind affects a single row and the
    /// stream should continue without it.
    pub fn is_row_skippable(&self) -> bool {
        matches!(
            self,
            ErrorKind::RowTranslationFailed | ErrorKind::InvalidData
        )
    }
}

impl StitchError {
    /// Creates a [`StitchError`] from its components.
    #[track_caller]
    fn from_components(
        kind: ErrorKind,
        description: Cow<'static, str>,
        detail: Option<Cow<'static, str>>,
        source: Option<Arc<dyn error::Error + Send + Sync>>,
    ) -> Self {
        StitchError {
            kind,
            description,
            detail,
            source,
            location: Location::caller(),
        }
    }

    /// Returns the [`ErrorKind`] of this error.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the detailed error information if available.
    pub fn detail(&self) -> Option<&str> {
        self.detail.as_deref()
    }

    /// Returns the captured callsite location for this error.
    pub fn location(&self) -> &'static Location<'static> {
        self.location
    }

    /// Attaches an originating [`error::Error`] to this error and returns the
    /// modified instance. The stored source is preserved across clones and
    /// exposed via [`error::Error::source`].
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: error::Error + Send + Sync + 'static,
    {
        self.source = Some(Arc::new(source));
        self
    }
}

impl fmt::Display for StitchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{:?}] {} @ {}:{}:{}",
            self.kind,
            self.description,
            self.location.file(),
            self.location.line(),
            self.location.column()
        )?;

        if let Some(detail) = self.detail.as_deref() {
            write!(f, "\n  Detail: {detail}")?;
        }

        Ok(())
    }
}

impl error::Error for StitchError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|source| source as &(dyn error::Error + 'static))
    }
}

/// Creates a [`StitchError`] from an error kind and static description.
impl From<(ErrorKind, &'static str)> for StitchError {
    #[track_caller]
    fn from((kind, desc): (ErrorKind, &'static str)) -> StitchError {
        StitchError::from_components(kind, Cow::Borrowed(desc), None, None)
    }
}

/// Creates a [`StitchError`] from an error kind, static description, and
/// dynamic detail.
impl<D> From<(ErrorKind, &'static str, D)> for StitchError
where
    D: Into<Cow<'static, str>>,
{
    #[track_caller]
    fn from((kind, desc, detail): (ErrorKind, &'static str, D)) -> StitchError {
        StitchError::from_components(kind, Cow::Borrowed(desc), Some(detail.into()), None)
    }
}

/// Converts [`std::io::Error`] to [`StitchError`] with [`ErrorKind::IoError`].
impl From<std::io::Error> for StitchError {
    #[track_caller]
    fn from(err: std::io::Error) -> StitchError {
        let detail = err.to_string();
        StitchError::from_components(
            ErrorKind::IoError,
            Cow::Borrowed("I/O operation failed"),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

/// Converts [`csv::Error`] to [`StitchError`].
///
/// Underlying I/O failures are fatal; malformed records (bad UTF-8, ragged
/// field counts) are row-translation failures that the readers skip.
impl From<csv::Error> for StitchError {
    #[track_caller]
    fn from(err: csv::Error) -> StitchError {
        let (kind, description) = match err.kind() {
            csv::ErrorKind::Io(_) => (ErrorKind::IoError, "CSV I/O operation failed"),
            csv::ErrorKind::Utf8 { .. } => (
                ErrorKind::RowTranslationFailed,
                "CSV record is not valid UTF-8",
            ),
            csv::ErrorKind::UnequalLengths { .. } => (
                ErrorKind::RowTranslationFailed,
                "CSV record has an unexpected field count",
            ),
            _ => (ErrorKind::InvalidData, "CSV parsing failed"),
        };

        let detail = err.to_string();
        StitchError::from_components(
            kind,
            Cow::Borrowed(description),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

/// Converts [`postgres::Error`] to [`StitchError`] with the appropriate
/// error kind.
///
/// Connection-class SQLSTATEs (and errors with no SQLSTATE at all, which the
/// driver produces when the socket drops) map to the transient
/// [`ErrorKind::SourceConnectionFailed`]; everything else maps to
/// [`ErrorKind::SourceQueryFailed`] and fails fast instead of burning the
/// retry budget.
impl From<postgres::Error> for StitchError {
    #[track_caller]
    fn from(err: postgres::Error) -> StitchError {
        use postgres::error::SqlState;

        let (kind, description) = match err.code() {
            Some(sqlstate) => match *sqlstate {
                // Connection errors (08xxx)
                SqlState::CONNECTION_EXCEPTION
                | SqlState::CONNECTION_DOES_NOT_EXIST
                | SqlState::CONNECTION_FAILURE
                | SqlState::SQLCLIENT_UNABLE_TO_ESTABLISH_SQLCONNECTION
                | SqlState::SQLSERVER_REJECTED_ESTABLISHMENT_OF_SQLCONNECTION => (
                    ErrorKind::SourceConnectionFailed,
                    "PostgreSQL connection failed",
                ),

                // Resource errors (53xxx)
                SqlState::INSUFFICIENT_RESOURCES
                | SqlState::OUT_OF_MEMORY
                | SqlState::TOO_MANY_CONNECTIONS => (
                    ErrorKind::SourceConnectionFailed,
                    "PostgreSQL resource limitation",
                ),

                // Operator intervention (57xxx): restarts and failovers.
                SqlState::OPERATOR_INTERVENTION
                | SqlState::ADMIN_SHUTDOWN
                | SqlState::CRASH_SHUTDOWN
                | SqlState::CANNOT_CONNECT_NOW
                | SqlState::IDLE_SESSION_TIMEOUT => (
                    ErrorKind::SourceConnectionFailed,
                    "PostgreSQL server unavailable",
                ),

                SqlState::IO_ERROR => (ErrorKind::SourceIoError, "PostgreSQL I/O error"),

                _ => (ErrorKind::SourceQueryFailed, "PostgreSQL query failed"),
            },
            // No SQL state means the connection itself broke.
            None => (
                ErrorKind::SourceConnectionFailed,
                "PostgreSQL connection failed",
            ),
        };

        let detail = err.to_string();
        StitchError::from_components(
            kind,
            Cow::Borrowed(description),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

/// Converts [`chrono::ParseError`] to [`StitchError`] with
/// [`ErrorKind::RowTranslationFailed`].
impl From<chrono::ParseError> for StitchError {
    #[track_caller]
    fn from(err: chrono::ParseError) -> StitchError {
        let detail = err.to_string();
        StitchError::from_components(
            ErrorKind::RowTranslationFailed,
            Cow::Borrowed("Datetime parsing failed"),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

/// Converts [`std::num::ParseIntError`] to [`StitchError`] with
/// [`ErrorKind::RowTranslationFailed`].
impl From<std::num::ParseIntError> for StitchError {
    #[track_caller]
    fn from(err: std::num::ParseIntError) -> StitchError {
        let detail = err.to_string();
        StitchError::from_components(
            ErrorKind::RowTranslationFailed,
            Cow::Borrowed("Integer parsing failed"),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

/// Converts [`std::num::ParseFloatError`] to [`StitchError`] with
/// [`ErrorKind::RowTranslationFailed`].
impl From<std::num::ParseFloatError> for StitchError {
    #[track_caller]
    fn from(err: std::num::ParseFloatError) -> StitchError {
        let detail = err.to_string();
        StitchError::from_components(
            ErrorKind::RowTranslationFailed,
            Cow::Borrowed("Float parsing failed"),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_classification() {
        assert!(ErrorKind::SourceConnectionFailed.is_transient());
        assert!(ErrorKind::SourceIoError.is_transient());
        assert!(!ErrorKind::SourceQueryFailed.is_transient());
        assert!(!ErrorKind::RetryBudgetExhausted.is_transient());

        assert!(ErrorKind::RowTranslationFailed.is_row_skippable());
        assert!(ErrorKind::InvalidData.is_row_skippable());
        assert!(!ErrorKind::StructuralViolation.is_row_skippable());
    }

    #[test]
    fn test_source_is_preserved() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe closed");
        let err = StitchError::from((ErrorKind::SourceConnectionFailed, "connection lost"))
            .with_source(io);

        let source = std::error::Error::source(&err).expect("source should be attached");
        assert!(source.to_string().contains("pipe closed"));
    }

    #[test]
    fn test_display_includes_kind_and_detail() {
        let err = StitchError::from((
            ErrorKind::RowTranslationFailed,
            "row decode failed",
            "column `amount`",
        ));
        let rendered = err.to_string();

        assert!(rendered.contains("RowTranslationFailed"));
        assert!(rendered.contains("row decode failed"));
        assert!(rendered.contains("column `amount`"));
    }
}
