use std::fs::File;
use std::path::{Path, PathBuf};

use stitch_config::CsvFormatConfig;
use tracing::debug;

use crate::error::StitchResult;
use crate::source::{RowSource, SourceProvider};
use crate::types::{Cell, Row};

/// File-backed source provider: N CSV files read in sequence.
///
/// Each file is opened lazily when the previous one is exhausted. The
/// configured dialect applies to every file, including the optional header
/// row skip and any additional fixed row skip.
pub struct CsvSourceProvider {
    files: Vec<PathBuf>,
    format: CsvFormatConfig,
}

impl CsvSourceProvider {
    /// Creates a provider over the given files with the given dialect.
    pub fn new<I, P>(files: I, format: CsvFormatConfig) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            files: files.into_iter().map(Into::into).collect(),
            format,
        }
    }
}

impl SourceProvider for CsvSourceProvider {
    fn source_count(&self) -> usize {
        self.files.len()
    }

    fn open_source(&self, index: usize) -> StitchResult<Box<dyn RowSource>> {
        let source = CsvFileSource::open(&self.files[index], &self.format)?;
        Ok(Box::new(source))
    }
}

/// One open CSV file yielding raw rows of text cells.
pub struct CsvFileSource {
    path: PathBuf,
    reader: csv::Reader<File>,
}

impl CsvFileSource {
    /// Opens a CSV file with the given dialect, skipping the header row and
    /// any configured fixed prefix.
    pub fn open(path: &Path, format: &CsvFormatConfig) -> StitchResult<CsvFileSource> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .delimiter(format.delimiter as u8)
            .quote(format.quote as u8)
            .from_path(path)?;

        let mut skip = format.skip_rows + u64::from(format.has_header);
        let mut record = csv::StringRecord::new();
        while skip > 0 {
            if !reader.read_record(&mut record)? {
                break;
            }
            skip -= 1;
        }

        debug!(path = %path.display(), "opened csv source");

        Ok(CsvFileSource {
            path: path.to_path_buf(),
            reader,
        })
    }
}

impl RowSource for CsvFileSource {
    fn next_row(&mut self) -> StitchResult<Option<Row>> {
        let mut record = csv::StringRecord::new();
        if !self.reader.read_record(&mut record)? {
            return Ok(None);
        }

        let row = record
            .iter()
            .map(|field| Cell::Text(field.to_string()))
            .collect();
        Ok(Some(row))
    }

    fn close(&mut self) -> StitchResult<()> {
        debug!(path = %self.path.display(), "closed csv source");
        Ok(())
    }
}
