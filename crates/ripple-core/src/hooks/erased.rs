use crate::{
    engine::{
        diff::{DiffSet, EntityDiff, TargetedFields},
        relation_map::{RelationChanges, RelationView},
    },
    entity::{EntityHandle, EntitySet},
    error::{Error, InternalError},
    hooks::{HookContext, HookKind, HookSet, LifecycleHooks},
    identity::Identity,
    traits::EntityKind,
};

///
/// EntityPhase
///
/// The entity-set-shaped dispatch points, with their per-phase extras.
///

#[derive(Clone, Copy, Debug)]
pub(crate) enum EntityPhase {
    BeforeCreate,
    AfterCreate,
    AfterRead { relationship_hop: bool },
    AfterUpdate,
    BeforeDelete,
    AfterDelete { succeeded: bool },
    OnReturn,
}

impl EntityPhase {
    pub(crate) const fn kind(self) -> HookKind {
        match self {
            Self::BeforeCreate => HookKind::BeforeCreate,
            Self::AfterCreate => HookKind::AfterCreate,
            Self::AfterRead { .. } => HookKind::AfterRead,
            Self::AfterUpdate => HookKind::AfterUpdate,
            Self::BeforeDelete => HookKind::BeforeDelete,
            Self::AfterDelete { .. } => HookKind::AfterDelete,
            Self::OnReturn => HookKind::OnReturn,
        }
    }
}

///
/// ErasedHooks
///
/// Object-safe dispatch surface over one typed hook container. The adapter
/// rebuilds the typed argument shapes and rejects mixed-type entity sets as
/// dispatch invariants before the container ever runs.
///

pub(crate) trait ErasedHooks {
    fn entity_name(&self) -> &'static str;

    fn hooks(&self) -> HookSet;

    fn invoke_entities(
        &self,
        phase: EntityPhase,
        entities: &[EntityHandle],
        ctx: &HookContext,
    ) -> Result<(), Error>;

    fn invoke_before_read(&self, ctx: &HookContext, relationship_hop: bool) -> Result<(), Error>;

    fn invoke_before_update(
        &self,
        diffs: &[EntityDiff],
        targets: &TargetedFields,
        ctx: &HookContext,
    ) -> Result<(), Error>;

    fn invoke_update_relation(
        &self,
        identities: &[Identity],
        changes: &RelationChanges,
        ctx: &HookContext,
    ) -> Result<(), Error>;

    fn invoke_implicit_update_relation(
        &self,
        changes: &RelationChanges,
        ctx: &HookContext,
    ) -> Result<(), Error>;
}

///
/// HookAdapter
///

pub(crate) struct HookAdapter<C> {
    container: C,
}

impl<C: LifecycleHooks> HookAdapter<C> {
    pub const fn new(container: C) -> Self {
        Self { container }
    }

    fn ensure_typed(&self, entities: &[EntityHandle]) -> Result<(), InternalError> {
        for handle in entities {
            if !handle.is::<C::Entity>() {
                return Err(InternalError::dispatch_invariant(format!(
                    "entity set for '{}' contains a '{}' instance",
                    <C::Entity as EntityKind>::ENTITY_NAME,
                    handle.model().entity_name,
                )));
            }
        }

        Ok(())
    }

    fn ensure_typed_changes(&self, changes: &RelationChanges) -> Result<(), InternalError> {
        for group in changes.groups() {
            self.ensure_typed(group.entities())?;
        }

        Ok(())
    }
}

impl<C: LifecycleHooks> ErasedHooks for HookAdapter<C> {
    fn entity_name(&self) -> &'static str {
        <C::Entity as EntityKind>::ENTITY_NAME
    }

    fn hooks(&self) -> HookSet {
        C::HOOKS
    }

    fn invoke_entities(
        &self,
        phase: EntityPhase,
        entities: &[EntityHandle],
        ctx: &HookContext,
    ) -> Result<(), Error> {
        self.ensure_typed(entities)?;
        let set = EntitySet::<C::Entity>::new(entities);

        let result = match phase {
            EntityPhase::BeforeCreate => self.container.before_create(&set, ctx),
            EntityPhase::AfterCreate => self.container.after_create(&set, ctx),
            EntityPhase::AfterRead { relationship_hop } => {
                self.container.after_read(&set, ctx, relationship_hop)
            }
            EntityPhase::AfterUpdate => self.container.after_update(&set, ctx),
            EntityPhase::BeforeDelete => self.container.before_delete(&set, ctx),
            EntityPhase::AfterDelete { succeeded } => {
                self.container.after_delete(&set, ctx, succeeded)
            }
            EntityPhase::OnReturn => self.container.on_return(&set, ctx),
        };

        result.map_err(Error::from)
    }

    fn invoke_before_read(&self, ctx: &HookContext, relationship_hop: bool) -> Result<(), Error> {
        self.container
            .before_read(ctx, relationship_hop)
            .map_err(Error::from)
    }

    fn invoke_before_update(
        &self,
        diffs: &[EntityDiff],
        targets: &TargetedFields,
        ctx: &HookContext,
    ) -> Result<(), Error> {
        for diff in diffs {
            self.ensure_typed(std::slice::from_ref(diff.request_handle()))?;
            if let Some(persisted) = diff.persisted_handle() {
                self.ensure_typed(std::slice::from_ref(persisted))?;
            }
        }

        let set = DiffSet::<C::Entity>::new(diffs, targets);
        self.container.before_update(&set, ctx).map_err(Error::from)
    }

    fn invoke_update_relation(
        &self,
        identities: &[Identity],
        changes: &RelationChanges,
        ctx: &HookContext,
    ) -> Result<(), Error> {
        self.ensure_typed_changes(changes)?;
        let view = RelationView::<C::Entity>::new(changes);

        self.container
            .before_update_relation(identities, &view, ctx)
            .map_err(Error::from)
    }

    fn invoke_implicit_update_relation(
        &self,
        changes: &RelationChanges,
        ctx: &HookContext,
    ) -> Result<(), Error> {
        self.ensure_typed_changes(changes)?;
        let view = RelationView::<C::Entity>::new(changes);

        self.container
            .before_implicit_update_relation(&view, ctx)
            .map_err(Error::from)
    }
}
