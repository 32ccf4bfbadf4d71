use std::sync::Arc;

use tracing::warn;

use crate::error::StitchResult;
use crate::reader::EntityReader;
use crate::schema::EntitySchema;
use crate::source::{RowSource, SourceProvider};
use crate::types::Entity;

/// Decodes a provider's physical sources directly into typed entities, one
/// row at a time, with no joining.
///
/// Sources are opened lazily and concatenated transparently: exhausting one
/// closes it and opens the next until all are exhausted. A row that fails to
/// decode is logged and skipped; source faults propagate.
pub struct SimpleReader {
    schema: Arc<EntitySchema>,
    provider: Arc<dyn SourceProvider>,
    next_source: usize,
    current: Option<Box<dyn RowSource>>,
    buffered: Option<Entity>,
    rows_read: u64,
}

impl SimpleReader {
    /// Creates the reader and buffers the first entity.
    pub fn new(
        schema: Arc<EntitySchema>,
        provider: Arc<dyn SourceProvider>,
    ) -> StitchResult<SimpleReader> {
        let mut reader = SimpleReader {
            schema,
            provider,
            next_source: 0,
            current: None,
            buffered: None,
            rows_read: 0,
        };
        reader.update()?;
        Ok(reader)
    }

    /// Pulls the next raw row, moving to the next physical source when the
    /// current one is exhausted.
    fn next_raw(&mut self) -> StitchResult<Option<crate::types::Row>> {
        loop {
            match &mut self.current {
                Some(source) => match source.next_row()? {
                    Some(row) => return Ok(Some(row)),
                    None => {
                        source.close()?;
                        self.current = None;
                    }
                },
                None => {
                    if self.next_source >= self.provider.source_count() {
                        return Ok(None);
                    }
                    self.current = Some(self.provider.open_source(self.next_source)?);
                    self.next_source += 1;
                }
            }
        }
    }

    /// Refreshes the buffered entity, skipping rows that fail to decode.
    fn update(&mut self) -> StitchResult<()> {
        loop {
            let Some(raw) = self.next_raw()? else {
                self.buffered = None;
                return Ok(());
            };
            self.rows_read += 1;

            match self.schema.decode_row(raw) {
                Ok(entity) => {
                    self.buffered = Some(entity);
                    return Ok(());
                }
                Err(err) if err.kind().is_row_skippable() => {
                    warn!(
                        entity = self.schema.name(),
                        row = self.rows_read,
                        error = %err,
                        "skipping row that failed to decode"
                    );
                }
                Err(err) => return Err(err),
            }
        }
    }
}

impl EntityReader for SimpleReader {
    fn peek(&self) -> Option<&Entity> {
        self.buffered.as_ref()
    }

    fn next(&mut self) -> StitchResult<Option<Entity>> {
        let out = self.buffered.take();
        if out.is_some() {
            self.update()?;
        }
        Ok(out)
    }

    fn close(&mut self) -> StitchResult<()> {
        if let Some(source) = &mut self.current {
            source.close()?;
            self.current = None;
        }
        Ok(())
    }
}
