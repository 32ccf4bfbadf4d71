//! Entity schemas, relationship descriptors and the type registry.
//!
//! Schemas are ordinary data built once at startup: column lists with
//! conversion behavior, identity / container / sort key projections resolved
//! to column positions, and an immutable relationship descriptor table per
//! type. Abstract types are registered explicitly with their subtypes; leaf
//! enumeration and subtype tests are registry lookups.

mod column;

pub use column::{
    ColumnSchema, ColumnType, DEFAULT_DATE_FORMAT, DEFAULT_TIMESTAMP_FORMAT,
};

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;

use crate::error::{ErrorKind, StitchResult};
use crate::types::{Cell, Entity, Row, SortKey};

/// Errors that can occur while building schemas or the registry.
#[derive(Debug, Error)]
pub enum SchemaBuildError {
    #[error("duplicate column `{column}` in schema `{schema}`")]
    DuplicateColumn { schema: String, column: String },
    #[error("key column `{column}` is not declared in schema `{schema}`")]
    UnknownKeyColumn { schema: String, column: String },
    #[error("duplicate relationship `{relationship}` in schema `{schema}`")]
    DuplicateRelationship { schema: String, relationship: String },
    #[error("schema `{0}` is registered twice")]
    DuplicateSchema(String),
    #[error("abstract type `{0}` is also registered as a concrete schema")]
    AbstractTypeHasSchema(String),
    #[error("type `{target}` referenced by relationship `{relationship}` of `{schema}` is not registered")]
    UnknownRelationshipTarget {
        schema: String,
        relationship: String,
        target: String,
    },
    #[error("subtype `{subtype}` of abstract type `{parent}` is not registered")]
    UnknownSubtype { parent: String, subtype: String },
    #[error("subtype cycle detected at `{0}`")]
    SubtypeCycle(String),
    #[error("abstract type `{0}` has no concrete leaf types")]
    NoLeafTypes(String),
    #[error(
        "container key of `{child}` has {child_len} columns but the identity key of `{parent}` has {parent_len}"
    )]
    ContainerKeyMismatch {
        parent: String,
        child: String,
        parent_len: usize,
        child_len: usize,
    },
}

/// Describes one relationship from a parent type to a child type.
///
/// Immutable once the registry is finalized. The target may be a concrete
/// type or an abstract type, in which case any of its leaf types satisfies
/// the relationship.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relationship {
    /// The relationship's name, unique within its schema.
    pub name: String,
    /// The target type's name.
    pub target: String,
    /// Whether the relationship holds an ordered list (`true`) or a single
    /// optional child (`false`).
    pub to_many: bool,
}

impl Relationship {
    /// Declares a to-many relationship.
    pub fn to_many(name: impl Into<String>, target: impl Into<String>) -> Relationship {
        Self {
            name: name.into(),
            target: target.into(),
            to_many: true,
        }
    }

    /// Declares a to-one relationship.
    pub fn to_one(name: impl Into<String>, target: impl Into<String>) -> Relationship {
        Self {
            name: name.into(),
            target: target.into(),
            to_many: false,
        }
    }
}

/// The complete schema of one concrete entity type.
#[derive(Debug)]
pub struct EntitySchema {
    name: String,
    columns: Vec<ColumnSchema>,
    column_positions: HashMap<String, usize>,
    identity_key: Vec<usize>,
    container_key: Vec<usize>,
    sort_key: Vec<usize>,
    relationships: Vec<Relationship>,
    relationship_positions: HashMap<String, usize>,
}

impl EntitySchema {
    /// Starts building a schema for the named type.
    pub fn builder(name: impl Into<String>) -> EntitySchemaBuilder {
        EntitySchemaBuilder {
            name: name.into(),
            columns: Vec::new(),
            identity_key: Vec::new(),
            container_key: Vec::new(),
            sort_key: Vec::new(),
            relationships: Vec::new(),
        }
    }

    /// Returns the type name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the columns in declared order.
    pub fn columns(&self) -> &[ColumnSchema] {
        &self.columns
    }

    /// Returns the column names in declared order, e.g. for a header row.
    pub fn header(&self) -> Vec<&str> {
        self.columns.iter().map(|col| col.name.as_str()).collect()
    }

    /// Returns the position of the named column.
    pub fn column_position(&self, name: &str) -> Option<usize> {
        self.column_positions.get(name).copied()
    }

    /// Column positions of the identity key.
    pub fn identity_key_positions(&self) -> &[usize] {
        &self.identity_key
    }

    /// Column positions of the container key.
    pub fn container_key_positions(&self) -> &[usize] {
        &self.container_key
    }

    /// Column positions of the sort key.
    pub fn sort_key_positions(&self) -> &[usize] {
        &self.sort_key
    }

    /// Column names of the sort key, in key order.
    pub fn sort_key_columns(&self) -> Vec<&str> {
        self.sort_key
            .iter()
            .map(|&i| self.columns[i].name.as_str())
            .collect()
    }

    /// Returns the relationship descriptors in declared order.
    pub fn relationships(&self) -> &[Relationship] {
        &self.relationships
    }

    /// Returns the position of the named relationship.
    pub fn relationship_position(&self, name: &str) -> Option<usize> {
        self.relationship_positions.get(name).copied()
    }

    /// Decodes a raw row into an entity, converting each cell to its
    /// declared column type.
    ///
    /// Arity mismatches and conversion failures are row-translation errors;
    /// the readers log and skip them.
    pub fn decode_row(self: &Arc<Self>, raw: Row) -> StitchResult<Entity> {
        if raw.len() != self.columns.len() {
            return Err(crate::stitch_error!(
                ErrorKind::RowTranslationFailed,
                "row field count does not match the schema",
                format!(
                    "schema `{}` declares {} columns, row has {}",
                    self.name,
                    self.columns.len(),
                    raw.len()
                )
            ));
        }

        let mut values = Vec::with_capacity(raw.len());
        for (column, cell) in self.columns.iter().zip(raw) {
            let value = column.typ.convert(cell).map_err(|err| {
                crate::error::StitchError::from((
                    err.kind(),
                    "row value does not fit its declared column",
                    format!("column `{}` of `{}`", column.name, self.name),
                ))
                .with_source(err)
            })?;
            values.push(value);
        }

        Ok(Entity::new(Arc::clone(self), values))
    }

    /// Synthesizes an entity whose identity columns are filled positionally
    /// from the given key; every other column is NULL.
    ///
    /// Used by the implicit reader, where a parent exists only as an
    /// aggregation point for its children.
    pub fn entity_from_identity_key(self: &Arc<Self>, key: &SortKey) -> StitchResult<Entity> {
        if key.len() != self.identity_key.len() {
            return Err(crate::stitch_error!(
                ErrorKind::InvalidState,
                "key length does not match the identity key",
                format!(
                    "schema `{}` identity key has {} columns, received {}",
                    self.name,
                    self.identity_key.len(),
                    key.len()
                )
            ));
        }

        let mut values = vec![Cell::Null; self.columns.len()];
        for (&position, cell) in self.identity_key.iter().zip(key.cells()) {
            values[position] = cell.clone();
        }

        Ok(Entity::new(Arc::clone(self), values))
    }

    /// Renders decoded values back to their text form, one field per column.
    pub fn encode_row(&self, values: &[Cell]) -> Vec<String> {
        self.columns
            .iter()
            .zip(values)
            .map(|(column, value)| column.typ.unconvert(value))
            .collect()
    }
}

/// Builder for [`EntitySchema`].
pub struct EntitySchemaBuilder {
    name: String,
    columns: Vec<ColumnSchema>,
    identity_key: Vec<String>,
    container_key: Vec<String>,
    sort_key: Vec<String>,
    relationships: Vec<Relationship>,
}

impl EntitySchemaBuilder {
    /// Appends a column.
    pub fn column(mut self, column: ColumnSchema) -> Self {
        self.columns.push(column);
        self
    }

    /// Declares the identity key as an ordered list of column names.
    pub fn identity_key<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.identity_key = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Declares the container key as an ordered list of column names.
    pub fn container_key<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.container_key = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Declares the sort key as an ordered list of column names.
    pub fn sort_key<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sort_key = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Appends a relationship descriptor.
    pub fn relationship(mut self, relationship: Relationship) -> Self {
        self.relationships.push(relationship);
        self
    }

    /// Resolves key columns to positions and finishes the schema.
    pub fn build(self) -> Result<EntitySchema, SchemaBuildError> {
        let mut column_positions = HashMap::new();
        for (position, column) in self.columns.iter().enumerate() {
            if column_positions
                .insert(column.name.clone(), position)
                .is_some()
            {
                return Err(SchemaBuildError::DuplicateColumn {
                    schema: self.name,
                    column: column.name.clone(),
                });
            }
        }

        let resolve = |names: &[String]| -> Result<Vec<usize>, SchemaBuildError> {
            names
                .iter()
                .map(|name| {
                    column_positions.get(name).copied().ok_or_else(|| {
                        SchemaBuildError::UnknownKeyColumn {
                            schema: self.name.clone(),
                            column: name.clone(),
                        }
                    })
                })
                .collect()
        };

        let identity_key = resolve(&self.identity_key)?;
        let container_key = resolve(&self.container_key)?;
        let sort_key = resolve(&self.sort_key)?;

        let mut relationship_positions = HashMap::new();
        for (position, relationship) in self.relationships.iter().enumerate() {
            if relationship_positions
                .insert(relationship.name.clone(), position)
                .is_some()
            {
                return Err(SchemaBuildError::DuplicateRelationship {
                    schema: self.name,
                    relationship: relationship.name.clone(),
                });
            }
        }

        Ok(EntitySchema {
            name: self.name,
            columns: self.columns,
            column_positions,
            identity_key,
            container_key,
            sort_key,
            relationships: self.relationships,
            relationship_positions,
        })
    }
}

/// All registered schemas plus the abstract-type table.
///
/// Built once through [`SchemaRegistry::builder`] and shared by reference;
/// nothing in it changes per entity instance.
#[derive(Debug)]
pub struct SchemaRegistry {
    schemas: HashMap<String, Arc<EntitySchema>>,
    subtypes: HashMap<String, Vec<String>>,
}

impl SchemaRegistry {
    /// Starts building a registry.
    pub fn builder() -> SchemaRegistryBuilder {
        SchemaRegistryBuilder {
            schemas: Vec::new(),
            subtypes: Vec::new(),
        }
    }

    /// Returns the schema of the named concrete type.
    pub fn schema(&self, name: &str) -> Option<&Arc<EntitySchema>> {
        self.schemas.get(name)
    }

    /// Returns whether the named type is abstract (has registered subtypes).
    pub fn is_abstract(&self, name: &str) -> bool {
        self.subtypes.contains_key(name)
    }

    /// Returns the direct subtypes of an abstract type, empty for concrete
    /// types.
    pub fn subtypes(&self, name: &str) -> &[String] {
        self.subtypes.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Returns the concrete leaf types reachable from the named type, in
    /// registration order. A concrete type is its own single leaf.
    pub fn leaf_types(&self, name: &str) -> Vec<String> {
        let mut leaves = Vec::new();
        self.collect_leaves(name, &mut leaves);
        leaves
    }

    fn collect_leaves(&self, name: &str, leaves: &mut Vec<String>) {
        match self.subtypes.get(name) {
            Some(subs) => {
                for sub in subs {
                    self.collect_leaves(sub, leaves);
                }
            }
            None => leaves.push(name.to_string()),
        }
    }

    /// Returns whether `candidate` satisfies the declared type `declared`:
    /// either the same type, or a descendant of it.
    pub fn matches_type(&self, candidate: &str, declared: &str) -> bool {
        if candidate == declared {
            return true;
        }
        self.subtypes(declared)
            .iter()
            .any(|sub| self.matches_type(candidate, sub))
    }
}

/// Builder for [`SchemaRegistry`].
pub struct SchemaRegistryBuilder {
    schemas: Vec<EntitySchema>,
    subtypes: Vec<(String, Vec<String>)>,
}

impl SchemaRegistryBuilder {
    /// Registers a concrete type's schema.
    pub fn schema(mut self, schema: EntitySchema) -> Self {
        self.schemas.push(schema);
        self
    }

    /// Registers an abstract type with its direct subtypes.
    pub fn abstract_type<I, S>(mut self, name: impl Into<String>, subtypes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.subtypes.push((
            name.into(),
            subtypes.into_iter().map(Into::into).collect(),
        ));
        self
    }

    /// Validates the type graph and finalizes the registry.
    pub fn finalize(self) -> Result<SchemaRegistry, SchemaBuildError> {
        let mut schemas = HashMap::new();
        for schema in self.schemas {
            let name = schema.name().to_string();
            if schemas.insert(name.clone(), Arc::new(schema)).is_some() {
                return Err(SchemaBuildError::DuplicateSchema(name));
            }
        }

        let mut subtypes: HashMap<String, Vec<String>> = HashMap::new();
        for (name, subs) in self.subtypes {
            if schemas.contains_key(&name) {
                return Err(SchemaBuildError::AbstractTypeHasSchema(name));
            }
            if subtypes.insert(name.clone(), subs).is_some() {
                return Err(SchemaBuildError::DuplicateSchema(name));
            }
        }

        let registry = SchemaRegistry { schemas, subtypes };

        for (name, subs) in &registry.subtypes {
            for sub in subs {
                if !registry.schemas.contains_key(sub) && !registry.subtypes.contains_key(sub) {
                    return Err(SchemaBuildError::UnknownSubtype {
                        parent: name.clone(),
                        subtype: sub.clone(),
                    });
                }
            }
            let leaves = registry.checked_leaves(name)?;
            if leaves.is_empty() {
                return Err(SchemaBuildError::NoLeafTypes(name.clone()));
            }
        }

        for schema in registry.schemas.values() {
            for relationship in schema.relationships() {
                let target = relationship.target.as_str();
                if !registry.schemas.contains_key(target) && !registry.subtypes.contains_key(target)
                {
                    return Err(SchemaBuildError::UnknownRelationshipTarget {
                        schema: schema.name().to_string(),
                        relationship: relationship.name.clone(),
                        target: target.to_string(),
                    });
                }

                // Container/identity correspondence is positional; lengths
                // must line up for every concrete leaf of the target.
                for leaf in registry.leaf_types(target) {
                    let child = registry
                        .schemas
                        .get(&leaf)
                        .expect("leaves of a validated type graph are concrete");
                    if child.container_key_positions().len()
                        != schema.identity_key_positions().len()
                    {
                        return Err(SchemaBuildError::ContainerKeyMismatch {
                            parent: schema.name().to_string(),
                            child: leaf,
                            parent_len: schema.identity_key_positions().len(),
                            child_len: child.container_key_positions().len(),
                        });
                    }
                }
            }
        }

        Ok(registry)
    }
}

impl SchemaRegistry {
    /// Leaf enumeration with cycle detection, used during finalization.
    fn checked_leaves(&self, name: &str) -> Result<Vec<String>, SchemaBuildError> {
        fn walk(
            registry: &SchemaRegistry,
            name: &str,
            trail: &mut Vec<String>,
            leaves: &mut Vec<String>,
        ) -> Result<(), SchemaBuildError> {
            if trail.iter().any(|seen| seen == name) {
                return Err(SchemaBuildError::SubtypeCycle(name.to_string()));
            }
            match registry.subtypes.get(name) {
                Some(subs) => {
                    trail.push(name.to_string());
                    for sub in subs {
                        walk(registry, sub, trail, leaves)?;
                    }
                    trail.pop();
                }
                None => {
                    if registry.schemas.contains_key(name) {
                        leaves.push(name.to_string());
                    }
                }
            }
            Ok(())
        }

        let mut leaves = Vec::new();
        let mut trail = Vec::new();
        walk(self, name, &mut trail, &mut leaves)?;
        Ok(leaves)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Cell;

    fn invoice_schema() -> EntitySchema {
        EntitySchema::builder("invoice")
            .column(ColumnSchema::new("account_id", ColumnType::Integer))
            .column(ColumnSchema::new("id", ColumnType::Integer))
            .column(ColumnSchema::new("amount", ColumnType::Real))
            .identity_key(["account_id", "id"])
            .container_key(["account_id"])
            .sort_key(["account_id", "id"])
            .build()
            .unwrap()
    }

    #[test]
    fn test_key_positions_resolved() {
        let schema = invoice_schema();
        assert_eq!(schema.identity_key_positions(), &[0, 1]);
        assert_eq!(schema.container_key_positions(), &[0]);
        assert_eq!(schema.sort_key_columns(), vec!["account_id", "id"]);
    }

    #[test]
    fn test_unknown_key_column_rejected() {
        let result = EntitySchema::builder("broken")
            .column(ColumnSchema::new("id", ColumnType::Integer))
            .identity_key(["missing"])
            .build();
        assert!(matches!(
            result,
            Err(SchemaBuildError::UnknownKeyColumn { .. })
        ));
    }

    #[test]
    fn test_decode_row_converts_cells() {
        let schema = Arc::new(invoice_schema());
        let entity = schema
            .decode_row(vec![
                Cell::Text("7".into()),
                Cell::Text("3".into()),
                Cell::Text("19.5".into()),
            ])
            .unwrap();

        assert_eq!(entity.values()[0], Cell::Int(7));
        assert_eq!(entity.values()[2], Cell::Real(19.5));
        assert_eq!(
            entity.identity_key(),
            SortKey(vec![Cell::Int(7), Cell::Int(3)])
        );
    }

    #[test]
    fn test_decode_row_rejects_wrong_arity() {
        let schema = Arc::new(invoice_schema());
        let err = schema.decode_row(vec![Cell::Int(1)]).unwrap_err();
        assert!(err.kind().is_row_skippable());
    }

    #[test]
    fn test_entity_from_identity_key() {
        let schema = Arc::new(invoice_schema());
        let key = SortKey(vec![Cell::Int(7), Cell::Int(3)]);
        let entity = schema.entity_from_identity_key(&key).unwrap();

        assert_eq!(entity.values()[0], Cell::Int(7));
        assert_eq!(entity.values()[1], Cell::Int(3));
        assert_eq!(entity.values()[2], Cell::Null);
    }

    #[test]
    fn test_registry_leaf_enumeration() {
        let teacher = EntitySchema::builder("teacher")
            .column(ColumnSchema::new("school_id", ColumnType::Integer))
            .column(ColumnSchema::new("id", ColumnType::Integer))
            .identity_key(["school_id", "id"])
            .container_key(["school_id"])
            .sort_key(["school_id", "id"])
            .build()
            .unwrap();
        let administrator = EntitySchema::builder("administrator")
            .column(ColumnSchema::new("school_id", ColumnType::Integer))
            .column(ColumnSchema::new("id", ColumnType::Integer))
            .identity_key(["school_id", "id"])
            .container_key(["school_id"])
            .sort_key(["school_id", "id"])
            .build()
            .unwrap();

        let registry = SchemaRegistry::builder()
            .schema(teacher)
            .schema(administrator)
            .abstract_type("employee", ["teacher", "administrator"])
            .finalize()
            .unwrap();

        assert_eq!(registry.leaf_types("employee"), vec!["teacher", "administrator"]);
        assert_eq!(registry.leaf_types("teacher"), vec!["teacher"]);
        assert!(registry.matches_type("teacher", "employee"));
        assert!(registry.matches_type("teacher", "teacher"));
        assert!(!registry.matches_type("employee", "teacher"));
    }

    #[test]
    fn test_registry_rejects_dangling_target() {
        let parent = EntitySchema::builder("parent")
            .column(ColumnSchema::new("id", ColumnType::Integer))
            .identity_key(["id"])
            .sort_key(["id"])
            .relationship(Relationship::to_many("children", "missing"))
            .build()
            .unwrap();

        let result = SchemaRegistry::builder().schema(parent).finalize();
        assert!(matches!(
            result,
            Err(SchemaBuildError::UnknownRelationshipTarget { .. })
        ));
    }

    #[test]
    fn test_registry_rejects_container_key_mismatch() {
        let parent = EntitySchema::builder("parent")
            .column(ColumnSchema::new("region", ColumnType::Integer))
            .column(ColumnSchema::new("id", ColumnType::Integer))
            .identity_key(["region", "id"])
            .sort_key(["region", "id"])
            .relationship(Relationship::to_many("children", "child"))
            .build()
            .unwrap();
        let child = EntitySchema::builder("child")
            .column(ColumnSchema::new("parent_id", ColumnType::Integer))
            .column(ColumnSchema::new("id", ColumnType::Integer))
            .identity_key(["parent_id", "id"])
            .container_key(["parent_id"])
            .sort_key(["parent_id", "id"])
            .build()
            .unwrap();

        let result = SchemaRegistry::builder()
            .schema(parent)
            .schema(child)
            .finalize();
        assert!(matches!(
            result,
            Err(SchemaBuildError::ContainerKeyMismatch { .. })
        ));
    }
}
