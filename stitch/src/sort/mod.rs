//! External merge sort: imposes the sortedness precondition on inputs that
//! cannot supply pre-sorted output.
//!
//! The input is streamed and split into chunks bounded by a configured row
//! count; each chunk is sorted in memory by the declared composite key and
//! spilled to a temporary file; a k-way merge across the chunk files writes
//! the globally sorted output. Memory use is bounded by the chunk size,
//! independent of the input size, and temporary files are removed on both
//! success and failure.

use std::fs::File;
use std::path::{Path, PathBuf};

use stitch_config::{CsvFormatConfig, SortFileConfig};
use tracing::debug;

use crate::bail;
use crate::error::{ErrorKind, StitchResult};
use crate::schema::ColumnType;
use crate::types::{Cell, SortKey};

/// Addresses one key column of the input, by header name or position.
#[derive(Debug, Clone)]
pub enum ColumnRef {
    Name(String),
    Index(usize),
}

/// One column of the composite sort key, with its per-column comparator.
#[derive(Debug, Clone)]
pub struct SortColumn {
    pub column: ColumnRef,
    /// Comparator type: values are decoded with it before comparison, so
    /// numbers sort numerically, dates chronologically, and NULL/empty
    /// fields first.
    pub comparator: ColumnType,
}

impl SortColumn {
    /// Keys on the column with this header name.
    pub fn by_name(name: impl Into<String>, comparator: ColumnType) -> SortColumn {
        Self {
            column: ColumnRef::Name(name.into()),
            comparator,
        }
    }

    /// Keys on the column at this position.
    pub fn by_index(index: usize, comparator: ColumnType) -> SortColumn {
        Self {
            column: ColumnRef::Index(index),
            comparator,
        }
    }
}

/// Sorts `input` into `output` by the declared composite key.
///
/// Fails if the output path already exists. Sorting already-sorted input
/// reproduces it unchanged, so the transform is idempotent.
pub fn sort_file(
    input: &Path,
    output: &Path,
    key: &[SortColumn],
    format: &CsvFormatConfig,
    config: &SortFileConfig,
) -> StitchResult<()> {
    if key.is_empty() {
        bail!(ErrorKind::ConfigError, "sort key must name at least one column");
    }
    if config.chunk_rows == 0 {
        bail!(ErrorKind::ConfigError, "sort chunk size must be greater than zero");
    }
    if output.exists() {
        bail!(
            ErrorKind::InvalidState,
            "output path already exists",
            format!("{}", output.display())
        );
    }

    let mut reader = csv_reader(input, format)?;

    let header = if format.has_header {
        let mut record = csv::StringRecord::new();
        if reader.read_record(&mut record)? {
            Some(record)
        } else {
            None
        }
    } else {
        None
    };

    let key = resolve_key(key, header.as_ref())?;

    let tmp_dir = match &config.tmp_dir {
        Some(dir) => dir.clone(),
        None => output.parent().unwrap_or(Path::new(".")).to_path_buf(),
    };
    let mut cleanup = TempCleanup::new();
    if !tmp_dir.exists() {
        std::fs::create_dir_all(&tmp_dir)?;
        cleanup.created_dir = Some(tmp_dir.clone());
    }

    split_into_sorted_chunks(&mut reader, &key, format, config, &tmp_dir, &mut cleanup)?;
    debug!(
        input = %input.display(),
        chunks = cleanup.files.len(),
        "split input into sorted chunks"
    );

    merge_chunks(
        &cleanup.files,
        output,
        &key,
        format,
        header.filter(|_| config.write_header).as_ref(),
    )?;

    Ok(())
}

/// Removes spilled chunk files (and a temp dir the sort itself created) when
/// the sort finishes or unwinds.
struct TempCleanup {
    files: Vec<PathBuf>,
    created_dir: Option<PathBuf>,
}

impl TempCleanup {
    fn new() -> Self {
        Self {
            files: Vec::new(),
            created_dir: None,
        }
    }
}

impl Drop for TempCleanup {
    fn drop(&mut self) {
        for file in &self.files {
            let _ = std::fs::remove_file(file);
        }
        if let Some(dir) = &self.created_dir {
            let _ = std::fs::remove_dir(dir);
        }
    }
}

fn csv_reader(path: &Path, format: &CsvFormatConfig) -> StitchResult<csv::Reader<File>> {
    Ok(csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(format.delimiter as u8)
        .quote(format.quote as u8)
        .from_path(path)?)
}

fn csv_writer(path: &Path, format: &CsvFormatConfig) -> StitchResult<csv::Writer<File>> {
    Ok(csv::WriterBuilder::new()
        .delimiter(format.delimiter as u8)
        .quote(format.quote as u8)
        .from_path(path)?)
}

/// Resolves key columns to positions, by header name where the input has a
/// header row.
fn resolve_key(
    key: &[SortColumn],
    header: Option<&csv::StringRecord>,
) -> StitchResult<Vec<(usize, ColumnType)>> {
    key.iter()
        .map(|column| {
            let position = match &column.column {
                ColumnRef::Index(index) => *index,
                ColumnRef::Name(name) => match header {
                    Some(header) => match header.iter().position(|field| field == name) {
                        Some(position) => position,
                        None => bail!(
                            ErrorKind::ConfigError,
                            "sort key column not present in header",
                            format!("column `{name}`")
                        ),
                    },
                    None => bail!(
                        ErrorKind::ConfigError,
                        "sort key columns can only be named when the input has a header",
                        format!("column `{name}`")
                    ),
                },
            };
            Ok((position, column.comparator.clone()))
        })
        .collect()
}

/// Extracts the comparison key of one record. A missing field compares as
/// NULL, like an empty one.
fn record_key(
    record: &csv::StringRecord,
    key: &[(usize, ColumnType)],
) -> StitchResult<SortKey> {
    let mut cells = Vec::with_capacity(key.len());
    for (position, comparator) in key {
        let field = record.get(*position).unwrap_or("");
        cells.push(comparator.convert(Cell::Text(field.to_string()))?);
    }
    Ok(SortKey(cells))
}

fn split_into_sorted_chunks(
    reader: &mut csv::Reader<File>,
    key: &[(usize, ColumnType)],
    format: &CsvFormatConfig,
    config: &SortFileConfig,
    tmp_dir: &Path,
    cleanup: &mut TempCleanup,
) -> StitchResult<()> {
    let mut chunk: Vec<(SortKey, csv::StringRecord)> = Vec::new();
    let mut record = csv::StringRecord::new();

    while reader.read_record(&mut record)? {
        chunk.push((record_key(&record, key)?, record.clone()));
        if chunk.len() >= config.chunk_rows {
            spill_chunk(&mut chunk, format, tmp_dir, cleanup)?;
        }
    }
    if !chunk.is_empty() {
        spill_chunk(&mut chunk, format, tmp_dir, cleanup)?;
    }

    Ok(())
}

fn spill_chunk(
    chunk: &mut Vec<(SortKey, csv::StringRecord)>,
    format: &CsvFormatConfig,
    tmp_dir: &Path,
    cleanup: &mut TempCleanup,
) -> StitchResult<()> {
    let path = tmp_dir.join(format!("sort_chunk_{}.csv", cleanup.files.len()));
    if path.exists() {
        bail!(
            ErrorKind::InvalidState,
            "temporary chunk path already exists",
            format!("{}", path.display())
        );
    }
    cleanup.files.push(path.clone());

    chunk.sort_by(|a, b| a.0.cmp(&b.0));

    let mut writer = csv_writer(&path, format)?;
    for (_, record) in chunk.drain(..) {
        writer.write_record(&record)?;
    }
    writer.flush()?;

    Ok(())
}

/// K-way merge of the sorted chunk files into the output: one buffered row
/// per chunk, repeatedly emit the globally smallest, refill that chunk.
/// Ties go to the lowest chunk index, keeping the merge stable.
fn merge_chunks(
    chunks: &[PathBuf],
    output: &Path,
    key: &[(usize, ColumnType)],
    format: &CsvFormatConfig,
    header: Option<&csv::StringRecord>,
) -> StitchResult<()> {
    let mut writer = csv_writer(output, format)?;
    if let Some(header) = header {
        writer.write_record(header)?;
    }

    let mut readers = Vec::with_capacity(chunks.len());
    let mut buffered: Vec<Option<(SortKey, csv::StringRecord)>> =
        Vec::with_capacity(chunks.len());
    for chunk in chunks {
        let mut reader = csv_reader(chunk, format)?;
        buffered.push(read_keyed(&mut reader, key)?);
        readers.push(reader);
    }

    loop {
        let mut least: Option<usize> = None;
        for (index, slot) in buffered.iter().enumerate() {
            let Some((candidate, _)) = slot else { continue };
            match least {
                None => least = Some(index),
                Some(current) => {
                    let (incumbent, _) = buffered[current]
                        .as_ref()
                        .expect("least always points at a buffered chunk");
                    if candidate < incumbent {
                        least = Some(index);
                    }
                }
            }
        }

        let Some(index) = least else { break };
        let (_, record) = buffered[index]
            .take()
            .expect("selected chunk is buffered");
        writer.write_record(&record)?;
        buffered[index] = read_keyed(&mut readers[index], key)?;
    }

    writer.flush()?;
    Ok(())
}

fn read_keyed(
    reader: &mut csv::Reader<File>,
    key: &[(usize, ColumnType)],
) -> StitchResult<Option<(SortKey, csv::StringRecord)>> {
    let mut record = csv::StringRecord::new();
    if !reader.read_record(&mut record)? {
        return Ok(None);
    }
    let key = record_key(&record, key)?;
    Ok(Some((key, record)))
}
