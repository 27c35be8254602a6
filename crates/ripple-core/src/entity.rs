use crate::{
    identity::{Identity, VisitedKey},
    model::entity::EntityModel,
    traits::{EntityNode, EntityValue},
    value::Value,
};
use std::{
    cell::{Ref, RefCell, RefMut},
    fmt,
    marker::PhantomData,
    rc::Rc,
};

///
/// Shared
///
/// Graph-shareable entity cell. Relationship fields hold these so the same
/// instance can be reached through multiple paths, including cycles.
///

pub type Shared<E> = Rc<RefCell<E>>;

/// Wrap a plain entity value into a graph-shareable cell.
pub fn shared<E: EntityValue>(entity: E) -> Shared<E> {
    Rc::new(RefCell::new(entity))
}

///
/// EntityHandle
///
/// Type-erased handle to one graph node. Cloning is cheap; borrows are
/// taken on demand and never held across hook invocations.
///

#[derive(Clone)]
pub struct EntityHandle {
    cell: Rc<RefCell<dyn EntityNode>>,
}

impl EntityHandle {
    pub fn new<E: EntityValue>(entity: Shared<E>) -> Self {
        let cell: Rc<RefCell<dyn EntityNode>> = entity;

        Self { cell }
    }

    #[must_use]
    pub fn model(&self) -> &'static EntityModel {
        self.cell.borrow().model()
    }

    #[must_use]
    pub fn identity(&self) -> Option<Identity> {
        self.cell.borrow().identity()
    }

    /// Allocation address; the identity fallback for unpersisted entities.
    #[must_use]
    pub fn address(&self) -> usize {
        Rc::as_ptr(&self.cell).cast::<()>() as usize
    }

    #[must_use]
    pub fn visited_key(&self) -> VisitedKey {
        VisitedKey::of(self)
    }

    /// Whether both handles point at the same allocation.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.cell, &other.cell)
    }

    #[must_use]
    pub fn is<E: EntityValue>(&self) -> bool {
        self.cell.borrow().as_any().is::<E>()
    }

    /// Materialized neighbors for one declared relation.
    #[must_use]
    pub fn related(&self, relation: &str) -> Option<RelatedEntities> {
        self.cell.borrow().related(relation)
    }

    /// Attribute projection used by the diff engine.
    #[must_use]
    pub fn field_value(&self, field: &str) -> Option<Value> {
        self.cell.borrow().field_value(field)
    }

    /// Borrow the node as its concrete type; `None` on a type mismatch.
    #[must_use]
    pub fn try_borrow_as<E: EntityValue>(&self) -> Option<Ref<'_, E>> {
        let node = self.cell.borrow();

        Ref::filter_map(node, |node| node.as_any().downcast_ref::<E>()).ok()
    }

    /// Mutably borrow the node as its concrete type; `None` on a mismatch.
    #[must_use]
    pub fn try_borrow_mut_as<E: EntityValue>(&self) -> Option<RefMut<'_, E>> {
        let node = self.cell.borrow_mut();

        RefMut::filter_map(node, |node| node.as_any_mut().downcast_mut::<E>()).ok()
    }
}

impl fmt::Debug for EntityHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let model = self.model();
        match self.identity() {
            Some(identity) => write!(f, "{}({identity})", model.entity_name),
            None => write!(f, "{}(@{:x})", model.entity_name, self.address()),
        }
    }
}

///
/// RelatedEntities
///
/// Materialized neighbor view an entity exposes per relation. Many-to-many
/// relations surface the join records next to the far side so both types
/// are visited independently.
///

#[derive(Clone, Debug)]
pub enum RelatedEntities {
    ToOne(Option<EntityHandle>),
    ToMany(Vec<EntityHandle>),
    ToManyThrough(Vec<ThroughPair>),
}

impl RelatedEntities {
    /// Far-side neighbors, flattened across cardinalities.
    #[must_use]
    pub fn far_targets(&self) -> Vec<EntityHandle> {
        match self {
            Self::ToOne(target) => target.iter().cloned().collect(),
            Self::ToMany(targets) => targets.clone(),
            Self::ToManyThrough(pairs) => pairs.iter().map(|pair| pair.target.clone()).collect(),
        }
    }

    /// Join records for many-to-many relations; empty otherwise.
    #[must_use]
    pub fn join_records(&self) -> Vec<EntityHandle> {
        match self {
            Self::ToOne(_) | Self::ToMany(_) => Vec::new(),
            Self::ToManyThrough(pairs) => pairs.iter().map(|pair| pair.join.clone()).collect(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::ToOne(target) => target.is_none(),
            Self::ToMany(targets) => targets.is_empty(),
            Self::ToManyThrough(pairs) => pairs.is_empty(),
        }
    }
}

///
/// ThroughPair
///

#[derive(Clone, Debug)]
pub struct ThroughPair {
    pub join: EntityHandle,
    pub target: EntityHandle,
}

///
/// EntitySet
///
/// Typed, borrow-on-demand view over the deduplicated handles handed to a
/// hook. Entities are borrowed one at a time during iteration, so a hook
/// may freely mutate the entity it is currently looking at.
///

pub struct EntitySet<'a, E> {
    handles: &'a [EntityHandle],
    _marker: PhantomData<fn() -> E>,
}

impl<'a, E: EntityValue> EntitySet<'a, E> {
    pub(crate) const fn new(handles: &'a [EntityHandle]) -> Self {
        Self {
            handles,
            _marker: PhantomData,
        }
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.handles.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    #[must_use]
    pub const fn handles(&self) -> &'a [EntityHandle] {
        self.handles
    }

    pub fn iter(&self) -> impl Iterator<Item = Ref<'a, E>> {
        self.handles
            .iter()
            .filter_map(|handle| handle.try_borrow_as::<E>())
    }

    pub fn iter_mut(&self) -> impl Iterator<Item = RefMut<'a, E>> {
        self.handles
            .iter()
            .filter_map(|handle| handle.try_borrow_mut_as::<E>())
    }

    /// Assigned identities of the entities in this set, in set order.
    #[must_use]
    pub fn identities(&self) -> Vec<Identity> {
        self.handles
            .iter()
            .filter_map(EntityHandle::identity)
            .collect()
    }
}
