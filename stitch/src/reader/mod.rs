//! Reader state machines assembling hierarchical entities from sorted
//! streams.
//!
//! A reader is requested for a root type and recursively builds child
//! readers for every declared relationship, each ultimately grounded in a
//! simple reader over physical sources. Pulling one item from the root
//! transitively pulls exactly the rows needed to assemble one complete
//! entity, plus one buffered lookahead row per source.

mod compound;
mod implicit;
mod polymorphic;
mod simple;

pub use compound::CompoundReader;
pub use implicit::ImplicitReader;
pub use polymorphic::PolymorphicReader;
pub use simple::SimpleReader;

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{ErrorKind, StitchResult};
use crate::merge::MergeSet;
use crate::schema::{EntitySchema, SchemaRegistry};
use crate::source::SourceProvider;
use crate::types::Entity;

/// A pull-based stream of fully assembled entities.
///
/// All readers move through the same states: uninitialized, buffered (one
/// assembled entity held for `peek`), exhausted. Transitions happen only
/// through `next` and the internal update that backs it.
pub trait EntityReader {
    /// Returns the buffered entity without consuming it.
    fn peek(&self) -> Option<&Entity>;

    /// Returns the buffered entity and assembles the next one.
    fn next(&mut self) -> StitchResult<Option<Entity>>;

    /// Releases every source and child reader this reader owns.
    fn close(&mut self) -> StitchResult<()>;
}

/// Maps entity type names to the physical sources backing them.
///
/// Types with relationships but no binding are implicit (they exist only as
/// aggregation points for their children); abstract types must not be bound.
#[derive(Default)]
pub struct ReaderBindings {
    providers: HashMap<String, Arc<dyn SourceProvider>>,
}

impl ReaderBindings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds a source provider to the named type.
    pub fn bind(
        mut self,
        type_name: impl Into<String>,
        provider: impl SourceProvider + 'static,
    ) -> Self {
        self.providers.insert(type_name.into(), Arc::new(provider));
        self
    }

    /// Returns whether the named type has a binding.
    pub fn contains(&self, type_name: &str) -> bool {
        self.providers.contains_key(type_name)
    }

    fn provider(&self, type_name: &str) -> Option<&Arc<dyn SourceProvider>> {
        self.providers.get(type_name)
    }
}

/// Builds the reader for `type_name`, recursing over its relationships.
///
/// Selection mirrors the type's declaration: abstract types get a
/// [`PolymorphicReader`]; types with relationships get a [`CompoundReader`]
/// when they have their own rows and an [`ImplicitReader`] when they do not;
/// leaf types get a [`SimpleReader`] and must be bound to a source.
pub fn build_reader(
    registry: &Arc<SchemaRegistry>,
    bindings: &ReaderBindings,
    type_name: &str,
) -> StitchResult<Box<dyn EntityReader>> {
    if registry.is_abstract(type_name) {
        if bindings.contains(type_name) {
            crate::bail!(
                ErrorKind::ConfigError,
                "abstract types cannot be bound to a source",
                format!("type `{type_name}`")
            );
        }
        return Ok(Box::new(PolymorphicReader::new(
            registry, bindings, type_name,
        )?));
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
        if bindings.contains(type_name) {
            return Ok(Box::new(CompoundReader::new(registry, bindings, schema)?));
        }
        return Ok(Box::new(ImplicitReader::new(registry, bindings, schema)?));
    }

    match bindings.provider(type_name) {
        Some(provider) => Ok(Box::new(SimpleReader::new(schema, Arc::clone(provider))?)),
        None => crate::bail!(
            ErrorKind::MissingSourceBinding,
            "leaf type has no source binding",
            format!("type `{type_name}`")
        ),
    }
}

/// Builds the child merge over every declared relationship of `schema`.
fn child_merge(
    registry: &Arc<SchemaRegistry>,
    bindings: &ReaderBindings,
    schema: &EntitySchema,
) -> StitchResult<MergeSet> {
    let mut members = Vec::with_capacity(schema.relationships().len());
    for relationship in schema.relationships() {
        let reader = build_reader(registry, bindings, &relationship.target)?;
        members.push((relationship.name.clone(), 0, reader));
    }
    MergeSet::new(members)
}

/// Dispatches a consumed child into the relationship slot of `parent` whose
/// declared target matches the child's runtime type, subtype-aware.
///
/// A child matching no declared relationship is a structural violation:
/// the schema or the source configuration disagrees with the data.
fn dispatch_child(
    registry: &SchemaRegistry,
    parent: &mut Entity,
    child: Entity,
) -> StitchResult<()> {
    let position = parent
        .schema()
        .relationships()
        .iter()
        .position(|relationship| registry.matches_type(child.type_name(), &relationship.target));

    match position {
        Some(position) => {
            parent.absorb_child(position, child);
            Ok(())
        }
        None => Err(crate::stitch_error!(
            ErrorKind::StructuralViolation,
            "merged child matches no declared relationship",
            format!(
                "child `{}` does not fit any relationship of `{}`",
                child.type_name(),
                parent.type_name()
            )
        )),
    }
}
