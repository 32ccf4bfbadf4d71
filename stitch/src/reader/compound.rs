use std::cmp::Ordering;
use std::sync::Arc;

use tracing::warn;

use crate::error::{ErrorKind, StitchResult};
use crate::merge::MergeSet;
use crate::reader::{EntityReader, ReaderBindings, SimpleReader, child_merge, dispatch_child};
use crate::schema::{EntitySchema, SchemaRegistry};
use crate::types::Entity;

/// Assembles parents from their own row stream and children from a merge
/// over every declared relationship.
///
/// For each parent pulled from the own stream, children whose container key
/// sorts strictly before the parent's identity key are orphans: no matching
/// parent exists in the stream, so they are dropped with a warning. Children
/// with an equal container key are absorbed into the matching relationship
/// slot. The first child with a greater container key stays buffered for a
/// later parent.
pub struct CompoundReader {
    registry: Arc<SchemaRegistry>,
    own: SimpleReader,
    children: MergeSet,
    buffered: Option<Entity>,
}

impl CompoundReader {
    pub(crate) fn new(
        registry: &Arc<SchemaRegistry>,
        bindings: &ReaderBindings,
        schema: Arc<EntitySchema>,
    ) -> StitchResult<CompoundReader> {
        let Some(provider) = bindings.provider(schema.name()) else {
            crate::bail!(
                ErrorKind::MissingSourceBinding,
                "compound type has no source binding",
                format!("type `{}`", schema.name())
            );
        };

        let own = SimpleReader::new(Arc::clone(&schema), Arc::clone(provider))?;
        let children = child_merge(registry, bindings, &schema)?;

        let mut reader = CompoundReader {
            registry: Arc::clone(registry),
            own,
            children,
            buffered: None,
        };
        reader.update()?;
        Ok(reader)
    }

    fn update(&mut self) -> StitchResult<()> {
        let Some(mut parent) = self.own.next()? else {
            self.buffered = None;
            return Ok(());
        };
        let parent_key = parent.identity_key();

        while let Some(child) = self.children.peek() {
            let child_key = child.container_key();
            match child_key.cmp(&parent_key) {
                Ordering::Less => {
                    let orphan = self
                        .children
                        .next()?
                        .expect("peeked child is still buffered");
                    warn!(
                        entity = orphan.type_name(),
                        container_key = %child_key,
                        "dropping orphaned child with no matching parent"
                    );
                }
                Ordering::Equal => {
                    let child = self
                        .children
                        .next()?
                        .expect("peeked child is still buffered");
                    dispatch_child(&self.registry, &mut parent, child)?;
                }
                Ordering::Greater => break,
            }
        }

        self.buffered = Some(parent);
        Ok(())
    }
}

impl EntityReader for CompoundReader {
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
        self.own.close()?;
        self.children.close()
    }
}
