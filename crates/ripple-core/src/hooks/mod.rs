pub(crate) mod erased;

use crate::{
    engine::{diff::DiffSet, relation_map::RelationView},
    entity::EntitySet,
    error::HookError,
    identity::Identity,
    model::entity::EntityModel,
    traits::EntityValue,
};
use bitflags::bitflags;
use std::fmt;

///
/// HookKind
///
/// The lifecycle callback enumeration. One method on [`LifecycleHooks`]
/// per kind.
///

#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub enum HookKind {
    BeforeCreate,
    AfterCreate,
    BeforeRead,
    AfterRead,
    BeforeUpdate,
    AfterUpdate,
    BeforeDelete,
    AfterDelete,
    OnReturn,
    BeforeUpdateRelation,
    BeforeImplicitUpdateRelation,
}

impl HookKind {
    /// The capability flag corresponding to this kind.
    #[must_use]
    pub const fn flag(self) -> HookSet {
        match self {
            Self::BeforeCreate => HookSet::BEFORE_CREATE,
            Self::AfterCreate => HookSet::AFTER_CREATE,
            Self::BeforeRead => HookSet::BEFORE_READ,
            Self::AfterRead => HookSet::AFTER_READ,
            Self::BeforeUpdate => HookSet::BEFORE_UPDATE,
            Self::AfterUpdate => HookSet::AFTER_UPDATE,
            Self::BeforeDelete => HookSet::BEFORE_DELETE,
            Self::AfterDelete => HookSet::AFTER_DELETE,
            Self::OnReturn => HookSet::ON_RETURN,
            Self::BeforeUpdateRelation => HookSet::BEFORE_UPDATE_RELATION,
            Self::BeforeImplicitUpdateRelation => HookSet::BEFORE_IMPLICIT_UPDATE_RELATION,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::BeforeCreate => "before_create",
            Self::AfterCreate => "after_create",
            Self::BeforeRead => "before_read",
            Self::AfterRead => "after_read",
            Self::BeforeUpdate => "before_update",
            Self::AfterUpdate => "after_update",
            Self::BeforeDelete => "before_delete",
            Self::AfterDelete => "after_delete",
            Self::OnReturn => "on_return",
            Self::BeforeUpdateRelation => "before_update_relation",
            Self::BeforeImplicitUpdateRelation => "before_implicit_update_relation",
        }
    }
}

impl fmt::Display for HookKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

bitflags! {
    ///
    /// HookSet
    ///
    /// Per-type capability descriptor: a flag is set iff the container
    /// actually implements that hook. Computed once at registration and
    /// read-only afterwards; a kind not present here is never dispatched.
    ///
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct HookSet: u16 {
        const BEFORE_CREATE = 1 << 0;
        const AFTER_CREATE = 1 << 1;
        const BEFORE_READ = 1 << 2;
        const AFTER_READ = 1 << 3;
        const BEFORE_UPDATE = 1 << 4;
        const AFTER_UPDATE = 1 << 5;
        const BEFORE_DELETE = 1 << 6;
        const AFTER_DELETE = 1 << 7;
        const ON_RETURN = 1 << 8;
        const BEFORE_UPDATE_RELATION = 1 << 9;
        const BEFORE_IMPLICIT_UPDATE_RELATION = 1 << 10;
    }
}

///
/// Operation
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Operation {
    Create,
    Read,
    Update,
    Delete,
}

impl Operation {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Read => "read",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

///
/// HookContext
///
/// Per-dispatch context handed to every hook: the operation kind and the
/// model of the type the operation was rooted at.
///

#[derive(Clone, Copy)]
pub struct HookContext {
    pub operation: Operation,
    pub root: &'static EntityModel,
}

impl HookContext {
    #[must_use]
    pub(crate) const fn new(operation: Operation, root: &'static EntityModel) -> Self {
        Self { operation, root }
    }

    /// Whether the dispatched type is the root type of this operation.
    #[must_use]
    pub fn is_root(&self, model: &'static EntityModel) -> bool {
        std::ptr::eq(self.root, model)
    }
}

/// Result type returned by every hook.
pub type HookResult = Result<(), HookError>;

///
/// LifecycleHooks
///
/// The hook container contract, implemented per resource type. Every method
/// is a no-op by default; `HOOKS` is the authoritative capability set and a
/// method whose flag is absent is never invoked, overridden or not.
///
/// Dispatch is synchronous and ordered; the first error aborts the
/// remainder of the phase.
///

pub trait LifecycleHooks: 'static {
    type Entity: EntityValue;

    /// Statically declared capability set for this container.
    const HOOKS: HookSet;

    fn before_create(&self, _entities: &EntitySet<'_, Self::Entity>, _ctx: &HookContext) -> HookResult {
        Ok(())
    }

    fn after_create(&self, _entities: &EntitySet<'_, Self::Entity>, _ctx: &HookContext) -> HookResult {
        Ok(())
    }

    /// Fires before the storage query runs; there are no entities yet.
    fn before_read(&self, _ctx: &HookContext, _relationship_hop: bool) -> HookResult {
        Ok(())
    }

    fn after_read(
        &self,
        _entities: &EntitySet<'_, Self::Entity>,
        _ctx: &HookContext,
        _relationship_hop: bool,
    ) -> HookResult {
        Ok(())
    }

    fn before_update(&self, _diffs: &DiffSet<'_, Self::Entity>, _ctx: &HookContext) -> HookResult {
        Ok(())
    }

    fn after_update(&self, _entities: &EntitySet<'_, Self::Entity>, _ctx: &HookContext) -> HookResult {
        Ok(())
    }

    fn before_delete(&self, _entities: &EntitySet<'_, Self::Entity>, _ctx: &HookContext) -> HookResult {
        Ok(())
    }

    fn after_delete(
        &self,
        _entities: &EntitySet<'_, Self::Entity>,
        _ctx: &HookContext,
        _succeeded: bool,
    ) -> HookResult {
        Ok(())
    }

    fn on_return(&self, _entities: &EntitySet<'_, Self::Entity>, _ctx: &HookContext) -> HookResult {
        Ok(())
    }

    /// Relationship change explicitly present in the request payload.
    fn before_update_relation(
        &self,
        _identities: &[Identity],
        _relations: &RelationView<'_, Self::Entity>,
        _ctx: &HookContext,
    ) -> HookResult {
        Ok(())
    }

    /// Relationship change discovered only by diffing against persisted
    /// state; the caller never explicitly targeted these entities.
    fn before_implicit_update_relation(
        &self,
        _relations: &RelationView<'_, Self::Entity>,
        _ctx: &HookContext,
    ) -> HookResult {
        Ok(())
    }
}
