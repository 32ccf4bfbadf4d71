use std::fmt;
use std::sync::Arc;

use crate::error::{ErrorKind, StitchResult};
use crate::schema::EntitySchema;
use crate::types::{Cell, SortKey};

/// One relationship slot on an entity.
///
/// To-one slots hold an object or nothing; to-many slots hold an ordered
/// list whose insertion order is the child stream order.
#[derive(Debug, Clone, PartialEq)]
pub enum RelationSlot {
    One(Option<Box<Entity>>),
    Many(Vec<Entity>),
}

/// An instance of a declared entity type.
///
/// Holds the column values and one relationship slot per declared
/// relationship, parallel to the schema's descriptor list. Entities are
/// constructed exactly once by a reader as it advances and are never mutated
/// by the engine after being returned to the caller.
#[derive(Debug, Clone)]
pub struct Entity {
    schema: Arc<EntitySchema>,
    values: Vec<Cell>,
    relations: Vec<RelationSlot>,
}

impl Entity {
    /// Creates an entity with the given decoded values and empty
    /// relationship slots.
    pub(crate) fn new(schema: Arc<EntitySchema>, values: Vec<Cell>) -> Self {
        let relations = schema
            .relationships()
            .iter()
            .map(|rel| {
                if rel.to_many {
                    RelationSlot::Many(Vec::new())
                } else {
                    RelationSlot::One(None)
                }
            })
            .collect();

        Self {
            schema,
            values,
            relations,
        }
    }

    /// Returns the name of this entity's type.
    pub fn type_name(&self) -> &str {
        self.schema.name()
    }

    /// Returns the schema this entity was decoded with.
    pub fn schema(&self) -> &Arc<EntitySchema> {
        &self.schema
    }

    /// Returns the column values in declared column order.
    pub fn values(&self) -> &[Cell] {
        &self.values
    }

    /// Returns the value of the named column, if the column exists.
    pub fn value(&self, column: &str) -> Option<&Cell> {
        self.schema
            .column_position(column)
            .map(|position| &self.values[position])
    }

    /// Returns the identity key: the tuple uniquely naming this instance
    /// within its type.
    pub fn identity_key(&self) -> SortKey {
        SortKey::project(&self.values, self.schema.identity_key_positions())
    }

    /// Returns the container key: the tuple naming the parent entity that
    /// owns this one.
    pub fn container_key(&self) -> SortKey {
        SortKey::project(&self.values, self.schema.container_key_positions())
    }

    /// Returns the sort key governing this type's stream order.
    pub fn sort_key(&self) -> SortKey {
        SortKey::project(&self.values, self.schema.sort_key_positions())
    }

    /// Returns the relationship slots, parallel to the schema's
    /// relationship descriptors.
    pub fn relations(&self) -> &[RelationSlot] {
        &self.relations
    }

    /// Returns the to-many children of the named relationship.
    ///
    /// Returns an empty slice when the relationship does not exist or is
    /// to-one.
    pub fn related_many(&self, name: &str) -> &[Entity] {
        match self.relation_slot(name) {
            Some(RelationSlot::Many(children)) => children,
            _ => &[],
        }
    }

    /// Returns the to-one child of the named relationship, if set.
    pub fn related_one(&self, name: &str) -> Option<&Entity> {
        match self.relation_slot(name) {
            Some(RelationSlot::One(child)) => child.as_deref(),
            _ => None,
        }
    }

    fn relation_slot(&self, name: &str) -> Option<&RelationSlot> {
        self.schema
            .relationship_position(name)
            .map(|position| &self.relations[position])
    }

    /// Places a consumed child into the relationship slot at `position`:
    /// append for to-many, set for to-one.
    pub(crate) fn absorb_child(&mut self, position: usize, child: Entity) {
        match &mut self.relations[position] {
            RelationSlot::Many(children) => children.push(child),
            RelationSlot::One(slot) => *slot = Some(Box::new(child)),
        }
    }

    /// Attaches a child to the named relationship: append for to-many, set
    /// for to-one.
    ///
    /// This is how callers assemble entity trees for the write side; the
    /// readers never attach through a name.
    pub fn attach(&mut self, relationship: &str, child: Entity) -> StitchResult<()> {
        match self.schema.relationship_position(relationship) {
            Some(position) => {
                self.absorb_child(position, child);
                Ok(())
            }
            None => Err(crate::stitch_error!(
                ErrorKind::StructuralViolation,
                "no such relationship on this entity type",
                format!(
                    "relationship `{relationship}` on type `{}`",
                    self.schema.name()
                )
            )),
        }
    }
}

/// Entities compare by type name, column values and relationship contents.
impl PartialEq for Entity {
    fn eq(&self, other: &Entity) -> bool {
        self.schema.name() == other.schema.name()
            && self.values == other.values
            && self.relations == other.relations
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.schema.name(), self.identity_key())
    }
}
