//! Shared configuration types for stitch pipelines.

mod base;
mod connection;
mod csv;
mod retry;
mod sort;
mod source;

pub use base::ValidationError;
pub use connection::PgConnectionConfig;
pub use csv::CsvFormatConfig;
pub use retry::SourceRetryConfig;
pub use sort::SortFileConfig;
pub use source::PgSourceConfig;
