use crate::{
    engine::{
        diff::{self, EntityDiff, TargetedFields},
        include::{self, IncludePath},
        relation_map::{RelationAccumulator, RelationChanges},
        traversal::{Expansion, Traversal},
    },
    entity::{EntityHandle, Shared},
    error::{Error, InternalError},
    hooks::{HookContext, HookKind, Operation, erased::EntityPhase},
    identity::VisitedKey,
    loader::ValueLoader,
    obs::sink::{self, MetricsEvent},
    registry::{HookRegistry, SchemaRegistry},
    traits::EntityValue,
};
use std::collections::{BTreeMap, BTreeSet};

///
/// HookDispatcher
///
/// The orchestrator: holds the startup-built registries plus the persisted
/// value loader and runs every lifecycle dispatch synchronously on the
/// calling thread. One public method per operation phase; the caller's
/// pipeline decides when each fires.
///
/// Dispatch order within a phase is deterministic: the root type first,
/// then every other reached type in name order. The first hook error
/// aborts the remainder of the phase.
///

pub struct HookDispatcher<L> {
    schema: SchemaRegistry,
    hooks: HookRegistry,
    loader: L,
}

impl<L: ValueLoader> HookDispatcher<L> {
    /// Build a dispatcher, validating the schema first.
    pub fn try_new(
        schema: SchemaRegistry,
        hooks: HookRegistry,
        loader: L,
    ) -> Result<Self, InternalError> {
        schema.validate()?;

        Ok(Self {
            schema,
            hooks,
            loader,
        })
    }

    #[must_use]
    pub const fn schema(&self) -> &SchemaRegistry {
        &self.schema
    }

    #[must_use]
    pub const fn hooks(&self) -> &HookRegistry {
        &self.hooks
    }

    // ─────────────────────────────────────────────
    // CREATE
    // ─────────────────────────────────────────────

    /// Fires `BeforeCreate` for the roots, then the explicit relationship
    /// hook for every related type reached in the materialized graph.
    pub fn before_create<E: EntityValue>(&self, roots: &[Shared<E>]) -> Result<(), Error> {
        let ctx = self.start::<E>(Operation::Create);
        let handles = erase(roots);

        self.invoke_entities(E::ENTITY_NAME, EntityPhase::BeforeCreate, &handles, &ctx)?;

        let expansion = Traversal::new(&self.hooks).expand_graph(&handles);
        for (name, changes) in relation_changes(&expansion, None) {
            self.invoke_update_relation(name, &changes, &ctx)?;
        }

        Ok(())
    }

    /// Fires `AfterCreate` for the root type and `AfterUpdate` for every
    /// other type reached anywhere in the graph, flattened and deduplicated.
    pub fn after_create<E: EntityValue>(&self, roots: &[Shared<E>]) -> Result<(), Error> {
        let ctx = self.start::<E>(Operation::Create);
        let handles = erase(roots);

        let expansion = Traversal::new(&self.hooks).expand_graph(&handles);
        self.dispatch_after_write(E::ENTITY_NAME, EntityPhase::AfterCreate, &expansion, &ctx)
    }

    // ─────────────────────────────────────────────
    // READ
    // ─────────────────────────────────────────────

    /// Fires `BeforeRead` for the root type and once per distinct type
    /// named by the include paths; there are no entities yet.
    pub fn before_read<E: EntityValue>(&self, includes: &[IncludePath]) -> Result<(), Error> {
        let ctx = self.start::<E>(Operation::Read);

        let types = include::resolve_include_types(&self.schema, E::MODEL, includes)?;
        for (model, relationship_hop) in types {
            self.invoke_before_read(model.entity_name, relationship_hop, &ctx)?;
        }

        Ok(())
    }

    /// Fires `AfterRead` once per reached type over the materialized
    /// results; included types are marked as relationship hops.
    pub fn after_read<E: EntityValue>(
        &self,
        roots: &[Shared<E>],
        includes: &[IncludePath],
    ) -> Result<(), Error> {
        let ctx = self.start::<E>(Operation::Read);
        let handles = erase(roots);

        let expansion = include::expand_includes(&handles, includes);

        if let Some(bucket) = expansion.bucket(E::ENTITY_NAME) {
            self.invoke_entities(
                E::ENTITY_NAME,
                EntityPhase::AfterRead {
                    relationship_hop: false,
                },
                &bucket.entities,
                &ctx,
            )?;
        }

        for (&name, bucket) in &expansion.buckets {
            if name == E::ENTITY_NAME {
                continue;
            }
            self.invoke_entities(
                name,
                EntityPhase::AfterRead {
                    relationship_hop: true,
                },
                &bucket.entities,
                &ctx,
            )?;
        }

        Ok(())
    }

    /// Fires `OnReturn` once per reached type, root or included; there is
    /// no hop distinction once results are final.
    pub fn on_return<E: EntityValue>(
        &self,
        roots: &[Shared<E>],
        includes: &[IncludePath],
    ) -> Result<(), Error> {
        let ctx = self.start::<E>(Operation::Read);
        let handles = erase(roots);

        let expansion = include::expand_includes(&handles, includes);

        if let Some(bucket) = expansion.bucket(E::ENTITY_NAME) {
            self.invoke_entities(E::ENTITY_NAME, EntityPhase::OnReturn, &bucket.entities, &ctx)?;
        }

        for (&name, bucket) in &expansion.buckets {
            if name == E::ENTITY_NAME {
                continue;
            }
            self.invoke_entities(name, EntityPhase::OnReturn, &bucket.entities, &ctx)?;
        }

        Ok(())
    }

    // ─────────────────────────────────────────────
    // UPDATE
    // ─────────────────────────────────────────────

    /// Loads persisted counterparts, fires `BeforeUpdate` with the diff
    /// set, then the explicit and implicit relationship hooks derived from
    /// the targeted relations.
    pub fn before_update<E: EntityValue>(
        &self,
        roots: &[Shared<E>],
        targets: &TargetedFields,
    ) -> Result<(), Error> {
        let ctx = self.start::<E>(Operation::Update);
        let handles = erase(roots);

        let diffs = diff::build_diffs(&self.loader, E::MODEL, &handles)?;
        self.invoke_before_update(E::ENTITY_NAME, &diffs, targets, &ctx)?;

        let deltas = diff::relation_deltas(E::MODEL, &diffs, targets);
        for (&name, changes) in &deltas.explicit {
            self.invoke_update_relation(name, changes, &ctx)?;
        }
        for (&name, changes) in &deltas.implicit {
            self.invoke_implicit_update_relation(name, changes, &ctx)?;
        }

        Ok(())
    }

    /// Fires `AfterUpdate` for every type reached anywhere in the graph,
    /// flattened and deduplicated, root type first.
    pub fn after_update<E: EntityValue>(&self, roots: &[Shared<E>]) -> Result<(), Error> {
        let ctx = self.start::<E>(Operation::Update);
        let handles = erase(roots);

        let expansion = Traversal::new(&self.hooks).expand_graph(&handles);
        self.dispatch_after_write(E::ENTITY_NAME, EntityPhase::AfterUpdate, &expansion, &ctx)
    }

    // ─────────────────────────────────────────────
    // DELETE
    // ─────────────────────────────────────────────

    /// Fires `BeforeDelete` for the roots, then the implicit relationship
    /// hook for every related type left behind by the deletion.
    pub fn before_delete<E: EntityValue>(&self, roots: &[Shared<E>]) -> Result<(), Error> {
        let ctx = self.start::<E>(Operation::Delete);
        let handles = erase(roots);

        self.invoke_entities(E::ENTITY_NAME, EntityPhase::BeforeDelete, &handles, &ctx)?;

        let expansion = Traversal::new(&self.hooks).expand_graph(&handles);

        // The roots themselves are being deleted, not implicitly updated.
        let root_keys = handles
            .iter()
            .map(EntityHandle::visited_key)
            .collect::<BTreeSet<_>>();

        for (name, changes) in relation_changes(&expansion, Some(&root_keys)) {
            self.invoke_implicit_update_relation(name, &changes, &ctx)?;
        }

        Ok(())
    }

    /// Fires `AfterDelete` for the root type with the outcome flag.
    pub fn after_delete<E: EntityValue>(
        &self,
        roots: &[Shared<E>],
        succeeded: bool,
    ) -> Result<(), Error> {
        let ctx = self.start::<E>(Operation::Delete);
        let handles = erase(roots);

        self.invoke_entities(
            E::ENTITY_NAME,
            EntityPhase::AfterDelete { succeeded },
            &handles,
            &ctx,
        )
    }

    // ─────────────────────────────────────────────
    // DISPATCH PLUMBING
    // ─────────────────────────────────────────────

    fn start<E: EntityValue>(&self, operation: Operation) -> HookContext {
        sink::record(MetricsEvent::DispatchStart {
            operation,
            root: E::ENTITY_NAME,
        });

        HookContext::new(operation, E::MODEL)
    }

    /// After-phase for write operations: root type gets `root_phase`, every
    /// other reached type gets `AfterUpdate`.
    fn dispatch_after_write(
        &self,
        root_name: &'static str,
        root_phase: EntityPhase,
        expansion: &Expansion,
        ctx: &HookContext,
    ) -> Result<(), Error> {
        if let Some(bucket) = expansion.bucket(root_name) {
            self.invoke_entities(root_name, root_phase, &bucket.entities, ctx)?;
        }

        for (&name, bucket) in &expansion.buckets {
            if name == root_name {
                continue;
            }
            self.invoke_entities(name, EntityPhase::AfterUpdate, &bucket.entities, ctx)?;
        }

        Ok(())
    }

    fn invoke_entities(
        &self,
        entity_name: &'static str,
        phase: EntityPhase,
        entities: &[EntityHandle],
        ctx: &HookContext,
    ) -> Result<(), Error> {
        let kind = phase.kind();
        if !self.can_fire(entity_name, kind) {
            return Ok(());
        }
        let Some(container) = self.hooks.container(entity_name) else {
            return Ok(());
        };

        fire(entity_name, kind, || {
            container.invoke_entities(phase, entities, ctx)
        })
    }

    fn invoke_before_read(
        &self,
        entity_name: &'static str,
        relationship_hop: bool,
        ctx: &HookContext,
    ) -> Result<(), Error> {
        if !self.can_fire(entity_name, HookKind::BeforeRead) {
            return Ok(());
        }
        let Some(container) = self.hooks.container(entity_name) else {
            return Ok(());
        };

        fire(entity_name, HookKind::BeforeRead, || {
            container.invoke_before_read(ctx, relationship_hop)
        })
    }

    fn invoke_before_update(
        &self,
        entity_name: &'static str,
        diffs: &[EntityDiff],
        targets: &TargetedFields,
        ctx: &HookContext,
    ) -> Result<(), Error> {
        if !self.can_fire(entity_name, HookKind::BeforeUpdate) {
            return Ok(());
        }
        let Some(container) = self.hooks.container(entity_name) else {
            return Ok(());
        };

        fire(entity_name, HookKind::BeforeUpdate, || {
            container.invoke_before_update(diffs, targets, ctx)
        })
    }

    fn invoke_update_relation(
        &self,
        entity_name: &'static str,
        changes: &RelationChanges,
        ctx: &HookContext,
    ) -> Result<(), Error> {
        if !self.can_fire(entity_name, HookKind::BeforeUpdateRelation) {
            return Ok(());
        }
        let Some(container) = self.hooks.container(entity_name) else {
            return Ok(());
        };

        let identities = changes.identities();
        fire(entity_name, HookKind::BeforeUpdateRelation, || {
            container.invoke_update_relation(&identities, changes, ctx)
        })
    }

    fn invoke_implicit_update_relation(
        &self,
        entity_name: &'static str,
        changes: &RelationChanges,
        ctx: &HookContext,
    ) -> Result<(), Error> {
        if !self.can_fire(entity_name, HookKind::BeforeImplicitUpdateRelation) {
            return Ok(());
        }
        let Some(container) = self.hooks.container(entity_name) else {
            return Ok(());
        };

        fire(entity_name, HookKind::BeforeImplicitUpdateRelation, || {
            container.invoke_implicit_update_relation(changes, ctx)
        })
    }

    fn can_fire(&self, entity_name: &str, kind: HookKind) -> bool {
        self.hooks.capabilities(entity_name).contains(kind.flag())
    }
}

/// Record one hook invocation, mirroring failures into the sink.
fn fire(
    entity_name: &'static str,
    kind: HookKind,
    invoke: impl FnOnce() -> Result<(), Error>,
) -> Result<(), Error> {
    sink::record(MetricsEvent::HookFired {
        kind,
        entity: entity_name,
    });

    invoke().inspect_err(|_| {
        sink::record(MetricsEvent::HookFailed {
            kind,
            entity: entity_name,
        });
    })
}

/// Erase typed root cells into traversal handles.
fn erase<E: EntityValue>(roots: &[Shared<E>]) -> Vec<EntityHandle> {
    roots
        .iter()
        .map(|root| EntityHandle::new(root.clone()))
        .collect()
}

/// Group the incoming edges of every reached type into relationship-change
/// views, optionally excluding targets (the delete roots).
fn relation_changes(
    expansion: &Expansion,
    exclude: Option<&BTreeSet<VisitedKey>>,
) -> BTreeMap<&'static str, RelationChanges> {
    let mut out = BTreeMap::new();

    for (name, bucket) in &expansion.buckets {
        let mut acc = RelationAccumulator::default();

        for edge in &bucket.edges {
            if let Some(exclude) = exclude
                && exclude.contains(&edge.target.visited_key())
            {
                continue;
            }
            acc.push(edge.source, edge.relation, edge.target.clone());
        }

        if !acc.is_empty() {
            out.insert(*name, acc.finish());
        }
    }

    out
}
