use crate::{
    entity::{EntityHandle, EntitySet},
    identity::{Identity, VisitedKey},
    model::{entity::EntityModel, relation::RelationModel},
    traits::EntityValue,
};
use std::{
    cell::Ref,
    collections::{BTreeMap, BTreeSet},
    marker::PhantomData,
};

///
/// RelationChanges
///
/// Grouped, read-only record of the entities of one type that became newly
/// related to (or unrelated from) other entities, keyed by the connecting
/// relation. Built once per dispatch from traversal edges or diff output;
/// queries never re-traverse the graph.
///

#[derive(Debug, Default)]
pub struct RelationChanges {
    groups: Vec<RelationGroup>,
}

impl RelationChanges {
    pub(crate) fn groups(&self) -> &[RelationGroup] {
        &self.groups
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Distinct assigned identities across all groups, in discovery order.
    #[must_use]
    pub fn identities(&self) -> Vec<Identity> {
        let mut seen = BTreeSet::new();
        let mut out = Vec::new();

        for group in &self.groups {
            for handle in &group.entities {
                if let Some(identity) = handle.identity()
                    && seen.insert(identity.clone())
                {
                    out.push(identity);
                }
            }
        }

        out
    }

    /// Distinct entity count across all groups.
    #[must_use]
    pub fn len(&self) -> usize {
        let mut seen = BTreeSet::new();

        for group in &self.groups {
            for handle in &group.entities {
                seen.insert(handle.visited_key());
            }
        }

        seen.len()
    }
}

///
/// RelationGroup
///
/// One `(source type, relation)` bucket of affected entities.
///

#[derive(Debug)]
pub struct RelationGroup {
    pub source: &'static EntityModel,
    pub relation: &'static RelationModel,
    entities: Vec<EntityHandle>,
}

impl RelationGroup {
    pub(crate) fn entities(&self) -> &[EntityHandle] {
        &self.entities
    }
}

///
/// RelationAccumulator
///
/// Builder for [`RelationChanges`]: deduplicates per group while keeping
/// multi-path discoveries visible as separate groups.
///

#[derive(Default)]
pub(crate) struct RelationAccumulator {
    groups: BTreeMap<(&'static str, &'static str), GroupSlot>,
}

struct GroupSlot {
    source: &'static EntityModel,
    relation: &'static RelationModel,
    seen: BTreeSet<VisitedKey>,
    entities: Vec<EntityHandle>,
}

impl RelationAccumulator {
    pub fn push(
        &mut self,
        source: &'static EntityModel,
        relation: &'static RelationModel,
        target: EntityHandle,
    ) {
        let slot = self
            .groups
            .entry((source.entity_name, relation.name))
            .or_insert_with(|| GroupSlot {
                source,
                relation,
                seen: BTreeSet::new(),
                entities: Vec::new(),
            });

        if slot.seen.insert(target.visited_key()) {
            slot.entities.push(target);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn finish(self) -> RelationChanges {
        let groups = self
            .groups
            .into_values()
            .map(|slot| RelationGroup {
                source: slot.source,
                relation: slot.relation,
                entities: slot.entities,
            })
            .collect();

        RelationChanges { groups }
    }
}

///
/// RelationView
///
/// Typed view over [`RelationChanges`] handed to relationship hooks.
///

pub struct RelationView<'a, E> {
    changes: &'a RelationChanges,
    _marker: PhantomData<fn() -> E>,
}

impl<'a, E: EntityValue> RelationView<'a, E> {
    pub(crate) const fn new(changes: &'a RelationChanges) -> Self {
        Self {
            changes,
            _marker: PhantomData,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Distinct affected entity count.
    #[must_use]
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// Iterate the `(source model, relation, entities)` groups.
    pub fn groups(
        &self,
    ) -> impl Iterator<Item = (&'static EntityModel, &'static RelationModel, EntitySet<'a, E>)>
    {
        self.changes
            .groups()
            .iter()
            .map(|group| (group.source, group.relation, EntitySet::new(group.entities())))
    }

    /// All entities related through the named relation, borrowed on demand.
    pub fn via(&self, relation: &str) -> impl Iterator<Item = Ref<'a, E>> {
        let relation = relation.to_string();

        self.changes
            .groups()
            .iter()
            .filter(move |group| group.relation.name == relation)
            .flat_map(|group| {
                group
                    .entities()
                    .iter()
                    .filter_map(|handle| handle.try_borrow_as::<E>())
            })
    }

    /// Distinct affected entity count reached through the named relation.
    #[must_use]
    pub fn len_via(&self, relation: &str) -> usize {
        let mut seen = BTreeSet::new();

        for group in self.changes.groups() {
            if group.relation.name != relation {
                continue;
            }
            for handle in group.entities() {
                seen.insert(handle.visited_key());
            }
        }

        seen.len()
    }
}
