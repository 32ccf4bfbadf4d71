use std::sync::Arc;

use crate::error::StitchResult;
use crate::merge::MergeSet;
use crate::reader::{EntityReader, ReaderBindings, build_reader};
use crate::schema::SchemaRegistry;
use crate::types::Entity;

/// Reads an abstract type by merging one reader per concrete leaf type.
///
/// The registry's leaf enumeration is resolved at construction; each leaf
/// gets its own reader (recursively, so a leaf may itself be compound) and
/// the registration index serves as the merge rank, giving equal-keyed
/// entities of different subtypes a deterministic order.
pub struct PolymorphicReader {
    merge: MergeSet,
    buffered: Option<Entity>,
}

impl PolymorphicReader {
    pub(crate) fn new(
        registry: &Arc<SchemaRegistry>,
        bindings: &ReaderBindings,
        type_name: &str,
    ) -> StitchResult<PolymorphicReader> {
        let leaves = registry.leaf_types(type_name);

        let mut members = Vec::with_capacity(leaves.len());
        for (rank, leaf) in leaves.into_iter().enumerate() {
            let reader = build_reader(registry, bindings, &leaf)?;
            members.push((leaf, rank as u32, reader));
        }

        let mut reader = PolymorphicReader {
            merge: MergeSet::new(members)?,
            buffered: None,
        };
        reader.update()?;
        Ok(reader)
    }

    fn update(&mut self) -> StitchResult<()> {
        self.buffered = self.merge.next()?;
        Ok(())
    }
}

impl EntityReader for PolymorphicReader {
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
        self.merge.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::schema::{ColumnSchema, ColumnType, EntitySchema, SchemaRegistry};
    use crate::test_utils::{VecSourceProvider, int_rows};
    use crate::types::Cell;

    fn employee_schema(name: &str) -> EntitySchema {
        EntitySchema::builder(name)
            .column(ColumnSchema::new("school_id", ColumnType::Integer))
            .column(ColumnSchema::new("id", ColumnType::Integer))
            .identity_key(["school_id", "id"])
            .container_key(["school_id"])
            .sort_key(["school_id", "id"])
            .build()
            .unwrap()
    }

    fn registry() -> Arc<SchemaRegistry> {
        Arc::new(
            SchemaRegistry::builder()
                .schema(employee_schema("teacher"))
                .schema(employee_schema("administrator"))
                .abstract_type("employee", ["teacher", "administrator"])
                .finalize()
                .unwrap(),
        )
    }

    #[test]
    fn test_interleaves_leaf_types_in_key_order() {
        let registry = registry();
        let bindings = ReaderBindings::new()
            .bind(
                "teacher",
                VecSourceProvider::single(int_rows(&[&[1, 1], &[1, 4], &[2, 2]])),
            )
            .bind(
                "administrator",
                VecSourceProvider::single(int_rows(&[&[1, 2], &[2, 1]])),
            );

        let mut reader = build_reader(&registry, &bindings, "employee").unwrap();

        let mut seen = Vec::new();
        while let Some(entity) = reader.next().unwrap() {
            seen.push((
                entity.type_name().to_string(),
                entity.value("school_id").cloned().unwrap(),
                entity.value("id").cloned().unwrap(),
            ));
        }

        assert_eq!(
            seen,
            vec![
                ("teacher".into(), Cell::Int(1), Cell::Int(1)),
                ("administrator".into(), Cell::Int(1), Cell::Int(2)),
                ("teacher".into(), Cell::Int(1), Cell::Int(4)),
                ("administrator".into(), Cell::Int(2), Cell::Int(1)),
                ("teacher".into(), Cell::Int(2), Cell::Int(2)),
            ]
        );
    }

    #[test]
    fn test_equal_keys_emerge_in_declared_leaf_order() {
        let registry = registry();
        let bindings = ReaderBindings::new()
            .bind("teacher", VecSourceProvider::single(int_rows(&[&[1, 1]])))
            .bind(
                "administrator",
                VecSourceProvider::single(int_rows(&[&[1, 1]])),
            );

        let mut reader = build_reader(&registry, &bindings, "employee").unwrap();

        let first = reader.next().unwrap().unwrap();
        let second = reader.next().unwrap().unwrap();
        assert_eq!(first.type_name(), "teacher");
        assert_eq!(second.type_name(), "administrator");
    }

    #[test]
    fn test_abstract_type_cannot_be_bound() {
        let registry = registry();
        let bindings = ReaderBindings::new()
            .bind("employee", VecSourceProvider::single(Vec::new()))
            .bind("teacher", VecSourceProvider::single(Vec::new()))
            .bind(
                "administrator",
                VecSourceProvider::single(Vec::new()),
            );

        let err = build_reader(&registry, &bindings, "employee").err().unwrap();
        assert_eq!(err.kind(), ErrorKind::ConfigError);
    }
}
