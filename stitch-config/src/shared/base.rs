use thiserror::Error;

/// Errors raised when validating configuration values.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// Retry attempts cannot be zero.
    #[error("`max_attempts` cannot be zero")]
    MaxAttemptsZero,
    /// Sort chunk size cannot be zero.
    #[error("`chunk_rows` cannot be zero")]
    ChunkRowsZero,
    /// A page size, when set, cannot be zero.
    #[error("`page_size` cannot be zero when set")]
    PageSizeZero,
    /// The streaming fetch size cannot be zero.
    #[error("`fetch_size` cannot be zero")]
    FetchSizeZero,
    /// A source table name is required.
    #[error("source `table` cannot be empty")]
    EmptyTableName,
    /// CSV dialect characters must be single-byte.
    #[error("CSV `delimiter` and `quote` must be ASCII characters")]
    NonAsciiCsvDialect,
}
