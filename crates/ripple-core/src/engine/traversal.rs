use crate::{
    entity::EntityHandle,
    identity::VisitedKey,
    model::{entity::EntityModel, relation::RelationModel},
    obs::sink::{self, MetricsEvent},
    registry::HookRegistry,
};
use std::collections::{BTreeMap, BTreeSet, VecDeque};

///
/// Expansion
///
/// Result of one traversal run: per-type deduplicated entity buckets plus
/// the incoming edges that connected them. Lives only for the duration of
/// one dispatch call.
///

#[derive(Default)]
pub(crate) struct Expansion {
    pub buckets: BTreeMap<&'static str, TypeBucket>,
}

impl Expansion {
    pub fn bucket(&self, entity_name: &str) -> Option<&TypeBucket> {
        self.buckets.get(entity_name)
    }

    pub fn node_count(&self) -> u64 {
        self.buckets
            .values()
            .map(|bucket| bucket.entities.len() as u64)
            .sum()
    }

    pub fn edge_count(&self) -> u64 {
        self.buckets
            .values()
            .map(|bucket| bucket.edges.len() as u64)
            .sum()
    }
}

///
/// TypeBucket
///

pub(crate) struct TypeBucket {
    pub model: &'static EntityModel,
    /// Distinct entities of this type, in discovery order.
    pub entities: Vec<EntityHandle>,
    /// Every relationship edge that reached this type, revisits included.
    pub edges: Vec<Edge>,
}

///
/// Edge
///

pub(crate) struct Edge {
    pub source: &'static EntityModel,
    pub relation: &'static RelationModel,
    pub target: EntityHandle,
}

///
/// Traversal
///
/// Write-side graph expansion: follows every declared relation of the
/// roots outward, recursively, suppressing revisits through the visited
/// set. The check happens before each recursive step, so self-references
/// and longer cycles terminate without losing the first discovery.
///

pub(crate) struct Traversal<'a> {
    hooks: &'a HookRegistry,
    visited: BTreeSet<VisitedKey>,
    expansion: Expansion,
}

impl<'a> Traversal<'a> {
    pub fn new(hooks: &'a HookRegistry) -> Self {
        Self {
            hooks,
            visited: BTreeSet::new(),
            expansion: Expansion::default(),
        }
    }

    /// Expand the full reachable graph of the given roots.
    pub fn expand_graph(mut self, roots: &[EntityHandle]) -> Expansion {
        let mut queue = VecDeque::new();

        for root in roots {
            if self.visited.insert(root.visited_key()) {
                self.bucket_for(root).entities.push(root.clone());
                queue.push_back(root.clone());
            }
        }

        while let Some(handle) = queue.pop_front() {
            self.expand_node(&handle, &mut queue);
        }

        sink::record(MetricsEvent::GraphExpanded {
            nodes: self.expansion.node_count(),
            edges: self.expansion.edge_count(),
        });

        self.expansion
    }

    fn expand_node(&mut self, handle: &EntityHandle, queue: &mut VecDeque<EntityHandle>) {
        let model = handle.model();

        for relation in model.relations {
            let Some(related) = handle.related(relation.name) else {
                continue;
            };

            for join in related.join_records() {
                self.visit(model, relation, join, queue);
            }
            for target in related.far_targets() {
                self.visit(model, relation, target, queue);
            }
        }
    }

    fn visit(
        &mut self,
        source: &'static EntityModel,
        relation: &'static RelationModel,
        target: EntityHandle,
        queue: &mut VecDeque<EntityHandle>,
    ) {
        // The edge is recorded unconditionally so multi-path discoveries
        // stay visible; only the recursion is suppressed.
        let bucket = self.bucket_for(&target);
        bucket.edges.push(Edge {
            source,
            relation,
            target: target.clone(),
        });

        if !self.visited.insert(target.visited_key()) {
            return;
        }

        let target_model = target.model();
        let bucket = self.bucket_for(&target);
        bucket.entities.push(target.clone());

        // Expansion stops early when the type can neither fire a hook nor
        // lead anywhere deeper.
        let capabilities = self.hooks.capabilities(target_model.entity_name);
        if capabilities.is_empty() && target_model.is_leaf() {
            return;
        }

        queue.push_back(target);
    }

    fn bucket_for(&mut self, handle: &EntityHandle) -> &mut TypeBucket {
        let model = handle.model();

        self.expansion
            .buckets
            .entry(model.entity_name)
            .or_insert_with(|| TypeBucket {
                model,
                entities: Vec::new(),
                edges: Vec::new(),
            })
    }
}
