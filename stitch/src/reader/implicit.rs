use std::sync::Arc;

use crate::error::StitchResult;
use crate::merge::MergeSet;
use crate::reader::{EntityReader, ReaderBindings, child_merge, dispatch_child};
use crate::schema::{EntitySchema, SchemaRegistry};
use crate::types::Entity;

/// Assembles parents that exist only as aggregation points for their
/// children: there is no independent parent row stream.
///
/// Each parent is synthesized from the child merge's next container key,
/// its identity columns filled positionally from that key, and absorbs
/// every child sharing the key. There is no orphan phase: with no own rows
/// to be ahead of, the next container key always defines the next parent.
pub struct ImplicitReader {
    registry: Arc<SchemaRegistry>,
    schema: Arc<EntitySchema>,
    children: MergeSet,
    buffered: Option<Entity>,
}

impl ImplicitReader {
    pub(crate) fn new(
        registry: &Arc<SchemaRegistry>,
        bindings: &ReaderBindings,
        schema: Arc<EntitySchema>,
    ) -> StitchResult<ImplicitReader> {
        let children = child_merge(registry, bindings, &schema)?;

        let mut reader = ImplicitReader {
            registry: Arc::clone(registry),
            schema,
            children,
            buffered: None,
        };
        reader.update()?;
        Ok(reader)
    }

    fn update(&mut self) -> StitchResult<()> {
        let Some(first) = self.children.peek() else {
            self.buffered = None;
            return Ok(());
        };
        let key = first.container_key();
        let mut parent = self.schema.entity_from_identity_key(&key)?;

        while let Some(child) = self.children.peek() {
            if child.container_key() != key {
                break;
            }
            let child = self
                .children
                .next()?
                .expect("peeked child is still buffered");
            dispatch_child(&self.registry, &mut parent, child)?;
        }

        self.buffered = Some(parent);
        Ok(())
    }
}

impl EntityReader for ImplicitReader {
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
        self.children.close()
    }
}
