//! Row sinks: the flat outputs the write-side serializers produce to.

use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;

use stitch_config::CsvFormatConfig;
use tracing::debug;

use crate::error::StitchResult;
use crate::schema::EntitySchema;
use crate::types::Entity;

/// One open flat output for a single entity type.
pub trait EntitySink {
    /// Prepares the sink for writing.
    fn open(&mut self) -> StitchResult<()>;

    /// Flattens one entity's own columns to a row.
    fn write(&mut self, entity: &Entity) -> StitchResult<()>;

    /// Flushes and releases the sink.
    fn close(&mut self) -> StitchResult<()>;
}

/// Factory for the sink backing one entity type.
pub trait SinkProvider {
    fn start_sink(&self, schema: &Arc<EntitySchema>) -> StitchResult<Box<dyn EntitySink>>;
}

/// File-backed sink provider writing one CSV file per type.
pub struct CsvSinkProvider {
    path: PathBuf,
    format: CsvFormatConfig,
}

impl CsvSinkProvider {
    /// Creates a provider writing to `path` with the given dialect. A header
    /// row is written when the dialect declares one.
    pub fn new(path: impl Into<PathBuf>, format: CsvFormatConfig) -> Self {
        Self {
            path: path.into(),
            format,
        }
    }
}

impl SinkProvider for CsvSinkProvider {
    fn start_sink(&self, schema: &Arc<EntitySchema>) -> StitchResult<Box<dyn EntitySink>> {
        Ok(Box::new(CsvFileSink {
            path: self.path.clone(),
            format: self.format.clone(),
            schema: Arc::clone(schema),
            writer: None,
        }))
    }
}

struct CsvFileSink {
    path: PathBuf,
    format: CsvFormatConfig,
    schema: Arc<EntitySchema>,
    writer: Option<csv::Writer<File>>,
}

impl EntitySink for CsvFileSink {
    fn open(&mut self) -> StitchResult<()> {
        let mut writer = csv::WriterBuilder::new()
            .delimiter(self.format.delimiter as u8)
            .quote(self.format.quote as u8)
            .from_path(&self.path)?;

        if self.format.has_header {
            writer.write_record(self.schema.header())?;
        }

        debug!(path = %self.path.display(), "opened csv sink");
        self.writer = Some(writer);
        Ok(())
    }

    fn write(&mut self, entity: &Entity) -> StitchResult<()> {
        let Some(writer) = &mut self.writer else {
            crate::bail!(
                crate::error::ErrorKind::InvalidState,
                "csv sink written before it was opened",
                format!("{}", self.path.display())
            );
        };

        let row = self.schema.encode_row(entity.values());
        writer.write_record(&row)?;
        Ok(())
    }

    fn close(&mut self) -> StitchResult<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
        }
        debug!(path = %self.path.display(), "closed csv sink");
        Ok(())
    }
}
