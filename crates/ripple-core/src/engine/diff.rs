use crate::{
    engine::relation_map::{RelationAccumulator, RelationChanges},
    entity::{EntityHandle, RelatedEntities},
    error::InternalError,
    loader::ValueLoader,
    model::entity::EntityModel,
    obs::sink::{self, MetricsEvent},
    traits::EntityValue,
    value::Value,
};
use std::{
    cell::Ref,
    collections::{BTreeMap, BTreeSet},
    marker::PhantomData,
};

///
/// TargetedFields
///
/// The attribute and relation names actually present in the request
/// payload. Partial updates are expected: anything absent here is left
/// untouched by the caller and must never be reported as changed.
///

#[derive(Clone, Debug, Default)]
pub struct TargetedFields {
    attributes: BTreeSet<String>,
    relations: BTreeSet<String>,
}

impl TargetedFields {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_attribute(mut self, name: impl Into<String>) -> Self {
        self.attributes.insert(name.into());
        self
    }

    #[must_use]
    pub fn with_relation(mut self, name: impl Into<String>) -> Self {
        self.relations.insert(name.into());
        self
    }

    #[must_use]
    pub fn has_attribute(&self, name: &str) -> bool {
        self.attributes.contains(name)
    }

    #[must_use]
    pub fn has_relation(&self, name: &str) -> bool {
        self.relations.contains(name)
    }
}

///
/// EntityDiff
///
/// One request entity paired with its persisted counterpart. An absent
/// counterpart is a caller-level not-found condition, never an engine
/// error.
///

#[derive(Debug)]
pub struct EntityDiff {
    request: EntityHandle,
    persisted: Option<EntityHandle>,
}

impl EntityDiff {
    #[must_use]
    pub const fn request_handle(&self) -> &EntityHandle {
        &self.request
    }

    #[must_use]
    pub const fn persisted_handle(&self) -> Option<&EntityHandle> {
        self.persisted.as_ref()
    }
}

/// Pair request entities with persisted counterparts, batched per type.
pub(crate) fn build_diffs<L: ValueLoader>(
    loader: &L,
    model: &'static EntityModel,
    roots: &[EntityHandle],
) -> Result<Vec<EntityDiff>, InternalError> {
    let identities = roots
        .iter()
        .filter_map(EntityHandle::identity)
        .collect::<Vec<_>>();

    let mut persisted = if identities.is_empty() {
        BTreeMap::new()
    } else {
        loader.load_persisted(model, &identities)?
    };

    let mut diffs = Vec::with_capacity(roots.len());
    let mut missing = 0u64;

    for root in roots {
        let counterpart = root
            .identity()
            .and_then(|identity| persisted.remove(&identity));
        if counterpart.is_none() {
            missing += 1;
        }

        diffs.push(EntityDiff {
            request: root.clone(),
            persisted: counterpart,
        });
    }

    sink::record(MetricsEvent::DiffBuilt {
        loaded: (diffs.len() as u64).saturating_sub(missing),
        missing,
    });

    Ok(diffs)
}

///
/// DiffSet
///
/// Typed view over the diffs of one update dispatch.
///

pub struct DiffSet<'a, E> {
    diffs: &'a [EntityDiff],
    targets: &'a TargetedFields,
    _marker: PhantomData<fn() -> E>,
}

impl<'a, E: EntityValue> DiffSet<'a, E> {
    pub(crate) const fn new(diffs: &'a [EntityDiff], targets: &'a TargetedFields) -> Self {
        Self {
            diffs,
            targets,
            _marker: PhantomData,
        }
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.diffs.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.diffs.is_empty()
    }

    #[must_use]
    pub const fn targets(&self) -> &'a TargetedFields {
        self.targets
    }

    pub fn iter(&self) -> impl Iterator<Item = DiffEntry<'a, E>> {
        let targets = self.targets;

        self.diffs.iter().map(move |diff| DiffEntry {
            diff,
            targets,
            _marker: PhantomData,
        })
    }
}

///
/// DiffEntry
///
/// One request/persisted pair, borrowed on demand.
///

pub struct DiffEntry<'a, E> {
    diff: &'a EntityDiff,
    targets: &'a TargetedFields,
    _marker: PhantomData<fn() -> E>,
}

impl<'a, E: EntityValue> DiffEntry<'a, E> {
    #[must_use]
    pub fn request(&self) -> Option<Ref<'a, E>> {
        self.diff.request.try_borrow_as::<E>()
    }

    #[must_use]
    pub fn persisted(&self) -> Option<Ref<'a, E>> {
        self.diff
            .persisted
            .as_ref()
            .and_then(|handle| handle.try_borrow_as::<E>())
    }

    #[must_use]
    pub fn persisted_found(&self) -> bool {
        self.diff.persisted.is_some()
    }

    /// Targeted attributes whose request value differs from the persisted
    /// value. With no persisted baseline, every targeted attribute counts.
    #[must_use]
    pub fn changed_attributes(&self) -> Vec<&'static str> {
        let model = self.diff.request.model();

        model
            .attributes
            .iter()
            .copied()
            .filter(|attr| self.is_changed(attr))
            .collect()
    }

    #[must_use]
    pub fn is_changed(&self, attribute: &str) -> bool {
        if !self.targets.has_attribute(attribute) {
            return false;
        }

        let Some(persisted) = &self.diff.persisted else {
            return true;
        };

        let request_value = self
            .diff
            .request
            .field_value(attribute)
            .unwrap_or(Value::Null);
        let persisted_value = persisted.field_value(attribute).unwrap_or(Value::Null);

        request_value != persisted_value
    }
}

///
/// RelationDeltas
///
/// Per far-side type, the relationship changes of one update dispatch:
/// `explicit` carries far entities present in the request payload,
/// `implicit` carries far entities (and their join records) related in the
/// persisted version but absent from the request.
///

pub(crate) struct RelationDeltas {
    pub explicit: BTreeMap<&'static str, RelationChanges>,
    pub implicit: BTreeMap<&'static str, RelationChanges>,
}

/// Compute relationship deltas for the targeted relations of the roots.
pub(crate) fn relation_deltas(
    model: &'static EntityModel,
    diffs: &[EntityDiff],
    targets: &TargetedFields,
) -> RelationDeltas {
    let mut explicit: BTreeMap<&'static str, RelationAccumulator> = BTreeMap::new();
    let mut implicit: BTreeMap<&'static str, RelationAccumulator> = BTreeMap::new();

    for diff in diffs {
        for relation in model.relations {
            if !targets.has_relation(relation.name) {
                continue;
            }

            let request_related = diff.request.related(relation.name);
            let mut request_keys = BTreeSet::new();

            if let Some(related) = &request_related {
                for target in related.far_targets() {
                    request_keys.insert(target.visited_key());
                    explicit
                        .entry(target.model().entity_name)
                        .or_default()
                        .push(model, relation, target);
                }
                for join in related.join_records() {
                    explicit
                        .entry(join.model().entity_name)
                        .or_default()
                        .push(model, relation, join);
                }
            }

            let Some(persisted) = &diff.persisted else {
                continue;
            };
            let Some(persisted_related) = persisted.related(relation.name) else {
                continue;
            };

            // Detachments: related before, absent from the request now.
            match &persisted_related {
                RelatedEntities::ToManyThrough(pairs) => {
                    for pair in pairs {
                        if request_keys.contains(&pair.target.visited_key()) {
                            continue;
                        }
                        implicit
                            .entry(pair.target.model().entity_name)
                            .or_default()
                            .push(model, relation, pair.target.clone());
                        implicit
                            .entry(pair.join.model().entity_name)
                            .or_default()
                            .push(model, relation, pair.join.clone());
                    }
                }
                _ => {
                    for target in persisted_related.far_targets() {
                        if request_keys.contains(&target.visited_key()) {
                            continue;
                        }
                        implicit
                            .entry(target.model().entity_name)
                            .or_default()
                            .push(model, relation, target);
                    }
                }
            }
        }
    }

    RelationDeltas {
        explicit: finish_accumulators(explicit),
        implicit: finish_accumulators(implicit),
    }
}

fn finish_accumulators(
    accumulators: BTreeMap<&'static str, RelationAccumulator>,
) -> BTreeMap<&'static str, RelationChanges> {
    accumulators
        .into_iter()
        .filter(|(_, acc)| !acc.is_empty())
        .map(|(name, acc)| (name, acc.finish()))
        .collect()
}
