//! Write-side serializers: the non-merging tree-walk that flattens
//! assembled entities back out to row sinks.
//!
//! Writer selection mirrors the readers: abstract types dispatch per
//! concrete subtype, compound types write their own row and recurse,
//! implicit types only recurse, leaf types write rows to their bound sink.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{ErrorKind, StitchResult};
use crate::schema::{EntitySchema, SchemaRegistry};
use crate::sink::{EntitySink, SinkProvider};
use crate::types::Entity;

/// A sink for fully assembled entities of one declared type.
pub trait EntityWriter {
    /// Writes one entity (and, for compound/implicit types, its subtree).
    fn write(&mut self, entity: &Entity) -> StitchResult<()>;

    /// Closes every sink this writer owns.
    fn close(&mut self) -> StitchResult<()>;
}

/// Maps entity type names to the sinks backing them.
#[derive(Default)]
pub struct SinkBindings {
    providers: HashMap<String, Arc<dyn SinkProvider>>,
}

impl SinkBindings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds a sink provider to the named type.
    pub fn bind(
        mut self,
        type_name: impl Into<String>,
        provider: impl SinkProvider + 'static,
    ) -> Self {
        self.providers.insert(type_name.into(), Arc::new(provider));
        self
    }

    /// Returns whether the named type has a binding.
    pub fn contains(&self, type_name: &str) -> bool {
        self.providers.contains_key(type_name)
    }

    fn provider(&self, type_name: &str) -> Option<&Arc<dyn SinkProvider>> {
        self.providers.get(type_name)
    }
}

/// Builds the writer for `type_name`, recursing over its relationships.
pub fn build_writer(
    registry: &Arc<SchemaRegistry>,
    bindings: &SinkBindings,
    type_name: &str,
) -> StitchResult<Box<dyn EntityWriter>> {
    if registry.is_abstract(type_name) {
        if bindings.contains(type_name) {
            crate::bail!(
                ErrorKind::ConfigError,
                "abstract types cannot be bound to a sink",
                format!("type `{type_name}`")
            );
        }

        let mut writers = HashMap::new();
        for leaf in registry.leaf_types(type_name) {
            let writer = build_writer(registry, bindings, &leaf)?;
            writers.insert(leaf, writer);
        }
        return Ok(Box::new(PolymorphicWriter { writers }));
    }

    let schema = match registry.schema(type_name) {
        Some(schema) => Arc::clone(schema),
        None => crate::bail!(
            ErrorKind::MissingSchema,
            "no schema registered for type",
            format!("type `{type_name}`")
        ),
    };

    if !schema.relationships().is_empty() {
        let implicit = ImplicitWriter::new(registry, bindings, &schema)?;
        if bindings.contains(type_name) {
            let simple = SimpleWriter::new(&schema, bindings)?;
            return Ok(Box::new(CompoundWriter { simple, implicit }));
        }
        return Ok(Box::new(implicit));
    }

    Ok(Box::new(SimpleWriter::new(&schema, bindings)?))
}

/// Unconverts an entity's own columns to one row of its bound sink.
struct SimpleWriter {
    sink: Box<dyn EntitySink>,
}

impl SimpleWriter {
    fn new(schema: &Arc<EntitySchema>, bindings: &SinkBindings) -> StitchResult<SimpleWriter> {
        let Some(provider) = bindings.provider(schema.name()) else {
            crate::bail!(
                ErrorKind::MissingSourceBinding,
                "type has no sink binding",
                format!("type `{}`", schema.name())
            );
        };

        let mut sink = provider.start_sink(schema)?;
        sink.open()?;
        Ok(SimpleWriter { sink })
    }
}

impl EntityWriter for SimpleWriter {
    fn write(&mut self, entity: &Entity) -> StitchResult<()> {
        self.sink.write(entity)
    }

    fn close(&mut self) -> StitchResult<()> {
        self.sink.close()
    }
}

/// Writes nothing for the parent itself; recursively writes its children,
/// to-many children in sort-key order.
struct ImplicitWriter {
    /// One child writer per relationship, parallel to the descriptor list.
    writers: Vec<Box<dyn EntityWriter>>,
}

impl ImplicitWriter {
    fn new(
        registry: &Arc<SchemaRegistry>,
        bindings: &SinkBindings,
        schema: &Arc<EntitySchema>,
    ) -> StitchResult<ImplicitWriter> {
        let mut writers = Vec::with_capacity(schema.relationships().len());
        for relationship in schema.relationships() {
            writers.push(build_writer(registry, bindings, &relationship.target)?);
        }
        Ok(ImplicitWriter { writers })
    }
}

impl EntityWriter for ImplicitWriter {
    fn write(&mut self, entity: &Entity) -> StitchResult<()> {
        for (relationship, writer) in entity
            .schema()
            .relationships()
            .iter()
            .zip(&mut self.writers)
        {
            if relationship.to_many {
                let mut children: Vec<&Entity> =
                    entity.related_many(&relationship.name).iter().collect();
                children.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
                for child in children {
                    writer.write(child)?;
                }
            } else if let Some(child) = entity.related_one(&relationship.name) {
                writer.write(child)?;
            }
        }
        Ok(())
    }

    fn close(&mut self) -> StitchResult<()> {
        for writer in &mut self.writers {
            writer.close()?;
        }
        Ok(())
    }
}

/// Writes the parent's own row, then its subtree.
struct CompoundWriter {
    simple: SimpleWriter,
    implicit: ImplicitWriter,
}

impl EntityWriter for CompoundWriter {
    fn write(&mut self, entity: &Entity) -> StitchResult<()> {
        self.simple.write(entity)?;
        self.implicit.write(entity)
    }

    fn close(&mut self) -> StitchResult<()> {
        self.simple.close()?;
        self.implicit.close()
    }
}

/// Dispatches each entity to its concrete type's writer.
struct PolymorphicWriter {
    writers: HashMap<String, Box<dyn EntityWriter>>,
}

impl EntityWriter for PolymorphicWriter {
    fn write(&mut self, entity: &Entity) -> StitchResult<()> {
        match self.writers.get_mut(entity.type_name()) {
            Some(writer) => writer.write(entity),
            None => Err(crate::stitch_error!(
                ErrorKind::StructuralViolation,
                "entity type is not a registered leaf of the written type",
                format!("type `{}`", entity.type_name())
            )),
        }
    }

    fn close(&mut self) -> StitchResult<()> {
        for writer in self.writers.values_mut() {
            writer.close()?;
        }
        Ok(())
    }
}
