use crate::{
    engine::traversal::{Edge, Expansion, TypeBucket},
    entity::EntityHandle,
    error::InternalError,
    identity::VisitedKey,
    model::{entity::EntityModel, relation::RelationModel},
    obs::sink::{self, MetricsEvent},
    registry::SchemaRegistry,
};
use derive_more::Deref;
use std::collections::BTreeSet;

///
/// IncludePath
///
/// One caller-resolved, dot-separated relationship path. Validation of the
/// segments happened upstream in the query layer; the engine treats the
/// path as trusted input.
///

#[derive(Clone, Debug, Deref)]
pub struct IncludePath(Vec<String>);

impl IncludePath {
    #[must_use]
    pub fn parse(path: &str) -> Self {
        Self(
            path.split('.')
                .filter(|segment| !segment.is_empty())
                .map(ToString::to_string)
                .collect(),
        )
    }

    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.0
    }
}

impl From<&str> for IncludePath {
    fn from(path: &str) -> Self {
        Self::parse(path)
    }
}

/// Resolve the entity types named by the include paths, root first.
///
/// Used before the storage query runs, when no instances exist yet. Each
/// type appears once; the flag marks relationship hops. Join types of
/// many-to-many segments are resolved alongside the far side.
pub(crate) fn resolve_include_types(
    schema: &SchemaRegistry,
    root: &'static EntityModel,
    paths: &[IncludePath],
) -> Result<Vec<(&'static EntityModel, bool)>, InternalError> {
    let mut seen = BTreeSet::from([root.entity_name]);
    let mut out = vec![(root, false)];

    for path in paths {
        let mut model = root;

        for segment in path.segments() {
            let relation = model.relation(segment).ok_or_else(|| {
                InternalError::schema_invariant(format!(
                    "unknown relation '{segment}' on '{}'",
                    model.entity_name
                ))
            })?;

            if let Some(join_name) = relation.join_entity_name() {
                let join = schema.try_get_model(join_name)?;
                if seen.insert(join.entity_name) {
                    out.push((join, true));
                }
            }

            let target = schema.try_get_model(relation.target_entity_name)?;
            if seen.insert(target.entity_name) {
                out.push((target, true));
            }

            model = target;
        }
    }

    Ok(out)
}

/// Expand the materialized roots along the include paths.
///
/// Unlike write-side traversal this follows only the relations the caller
/// actually chose to include, one path segment per level. The shared
/// visited set keeps every entity in exactly one bucket however many paths
/// reach it.
pub(crate) fn expand_includes(roots: &[EntityHandle], paths: &[IncludePath]) -> Expansion {
    let mut expansion = Expansion::default();
    let mut visited = BTreeSet::new();

    for root in roots {
        if visited.insert(root.visited_key()) {
            bucket_for(&mut expansion, root).entities.push(root.clone());
        }
    }

    for path in paths {
        let mut current: Vec<EntityHandle> = roots.to_vec();

        for segment in path.segments() {
            let mut next = Vec::new();

            for handle in &current {
                let model = handle.model();
                let Some(relation) = model.relation(segment) else {
                    continue;
                };
                let Some(related) = handle.related(segment) else {
                    continue;
                };

                for join in related.join_records() {
                    record(&mut expansion, &mut visited, model, relation, join);
                }
                for target in related.far_targets() {
                    record(
                        &mut expansion,
                        &mut visited,
                        model,
                        relation,
                        target.clone(),
                    );
                    next.push(target);
                }
            }

            if next.is_empty() {
                break;
            }
            current = next;
        }
    }

    sink::record(MetricsEvent::GraphExpanded {
        nodes: expansion.node_count(),
        edges: expansion.edge_count(),
    });

    expansion
}

fn record(
    expansion: &mut Expansion,
    visited: &mut BTreeSet<VisitedKey>,
    source: &'static EntityModel,
    relation: &'static RelationModel,
    target: EntityHandle,
) {
    let bucket = bucket_for(expansion, &target);
    bucket.edges.push(Edge {
        source,
        relation,
        target: target.clone(),
    });

    if visited.insert(target.visited_key()) {
        bucket_for(expansion, &target).entities.push(target);
    }
}

fn bucket_for<'e>(expansion: &'e mut Expansion, handle: &EntityHandle) -> &'e mut TypeBucket {
    let model = handle.model();

    expansion
        .buckets
        .entry(model.entity_name)
        .or_insert_with(|| TypeBucket {
            model,
            entities: Vec::new(),
            edges: Vec::new(),
        })
}
