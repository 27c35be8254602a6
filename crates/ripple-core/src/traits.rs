use crate::{
    entity::RelatedEntities, identity::Identity, model::entity::EntityModel, value::Value,
};
use std::any::Any;

// ============================================================================
// ENTITY IDENTITY & SCHEMA
// ============================================================================
//
// These traits describe *what an entity is*, not how it is stored
// or manipulated at runtime.
//

///
/// EntityKind
///
/// Declared schema facts for an entity type. Implemented once per type;
/// `MODEL` is the authoritative relationship metadata for traversal.
///

pub trait EntityKind: 'static {
    const ENTITY_NAME: &'static str;
    const MODEL: &'static EntityModel;
}

///
/// FieldValues
///
/// Attribute projection used by the diff engine. Relations are not field
/// values; they are reached through `EntityValue::related`.
///

pub trait FieldValues {
    fn get_value(&self, field: &str) -> Option<Value>;
}

// ============================================================================
// ENTITY VALUES
// ============================================================================

///
/// EntityValue
///
/// A concrete entity instance inside a materialized object graph.
///
/// ## Semantics
/// - `identity()` is `None` until the storage layer assigns one
/// - `related()` returns the materialized neighbors for a declared relation,
///   or `None` when the relation was not loaded for this instance
///

pub trait EntityValue: EntityKind + FieldValues + Sized {
    fn identity(&self) -> Option<Identity>;

    fn related(&self, relation: &str) -> Option<RelatedEntities>;
}

// ============================================================================
// ERASED GRAPH ACCESS
// ============================================================================

///
/// EntityNode
///
/// Object-safe view of one graph node. Blanket-implemented for every
/// `EntityValue`; the traversal and dispatch layers only ever see this.
///

pub trait EntityNode: 'static {
    fn model(&self) -> &'static EntityModel;

    fn identity(&self) -> Option<Identity>;

    fn related(&self, relation: &str) -> Option<RelatedEntities>;

    fn field_value(&self, field: &str) -> Option<Value>;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<E: EntityValue> EntityNode for E {
    fn model(&self) -> &'static EntityModel {
        E::MODEL
    }

    fn identity(&self) -> Option<Identity> {
        EntityValue::identity(self)
    }

    fn related(&self, relation: &str) -> Option<RelatedEntities> {
        EntityValue::related(self, relation)
    }

    fn field_value(&self, field: &str) -> Option<Value> {
        self.get_value(field)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
