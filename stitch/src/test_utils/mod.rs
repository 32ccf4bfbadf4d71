//! Shared helpers for unit tests: in-memory sources and schema fixtures.

use std::collections::VecDeque;
use std::sync::Arc;

use crate::error::StitchResult;
use crate::reader::EntityReader;
use crate::schema::{ColumnSchema, ColumnType, EntitySchema};
use crate::source::{RowSource, SourceProvider};
use crate::types::{Cell, Entity, Row};

/// A reader over a fixed list of pre-built entities.
pub struct VecReader {
    buffered: Option<Entity>,
    remaining: VecDeque<Entity>,
}

impl VecReader {
    pub fn new(entities: Vec<Entity>) -> Self {
        let mut remaining: VecDeque<Entity> = entities.into();
        let buffered = remaining.pop_front();
        Self {
            buffered,
            remaining,
        }
    }
}

impl EntityReader for VecReader {
    fn peek(&self) -> Option<&Entity> {
        self.buffered.as_ref()
    }

    fn next(&mut self) -> StitchResult<Option<Entity>> {
        let out = self.buffered.take();
        self.buffered = self.remaining.pop_front();
        Ok(out)
    }

    fn close(&mut self) -> StitchResult<()> {
        Ok(())
    }
}

/// A source provider over in-memory raw rows, one physical source per
/// row batch.
pub struct VecSourceProvider {
    batches: Vec<Vec<Row>>,
}

impl VecSourceProvider {
    /// A provider with a single physical source yielding `rows`.
    pub fn single(rows: Vec<Row>) -> Self {
        Self {
            batches: vec![rows],
        }
    }

    /// A provider whose physical sources yield one batch each, in order.
    pub fn batches(batches: Vec<Vec<Row>>) -> Self {
        Self { batches }
    }
}

impl SourceProvider for VecSourceProvider {
    fn source_count(&self) -> usize {
        self.batches.len()
    }

    fn open_source(&self, index: usize) -> StitchResult<Box<dyn RowSource>> {
        Ok(Box::new(VecSource {
            rows: self.batches[index].clone().into(),
        }))
    }
}

struct VecSource {
    rows: VecDeque<Row>,
}

impl RowSource for VecSource {
    fn next_row(&mut self) -> StitchResult<Option<Row>> {
        Ok(self.rows.pop_front())
    }

    fn close(&mut self) -> StitchResult<()> {
        Ok(())
    }
}

/// A single-integer-column schema named `name`, keyed and sorted on `id`.
pub fn int_schema(name: &str) -> Arc<EntitySchema> {
    Arc::new(
        EntitySchema::builder(name)
            .column(ColumnSchema::new("id", ColumnType::Integer))
            .identity_key(["id"])
            .container_key(["id"])
            .sort_key(["id"])
            .build()
            .expect("fixture schema builds"),
    )
}

/// Entities of [`int_schema`] with the given ids, in the given order.
pub fn int_entities(name: &str, values: &[i64]) -> Vec<Entity> {
    let schema = int_schema(name);
    values
        .iter()
        .map(|&value| {
            schema
                .decode_row(vec![Cell::Int(value)])
                .expect("fixture row decodes")
        })
        .collect()
}

/// Raw integer rows for in-memory sources.
pub fn int_rows(columns: &[&[i64]]) -> Vec<Row> {
    columns
        .iter()
        .map(|row| row.iter().map(|&v| Cell::Int(v)).collect())
        .collect()
}
