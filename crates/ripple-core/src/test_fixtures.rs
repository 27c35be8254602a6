use crate::{
    engine::{DiffSet, HookDispatcher, RelationView},
    entity::{EntityHandle, EntitySet, RelatedEntities, Shared, ThroughPair, shared},
    error::{HookError, InternalError},
    hooks::{HookContext, HookKind, HookResult, HookSet, LifecycleHooks},
    identity::Identity,
    loader::{NoValueLoader, ValueLoader},
    model::{EntityModel, RelationKind, RelationModel},
    registry::{HookRegistry, SchemaRegistry},
    traits::{EntityKind, EntityValue, FieldValues},
    value::Value,
};
use std::{
    cell::RefCell,
    collections::BTreeMap,
    marker::PhantomData,
    rc::Rc,
};

///
/// Fixture schema
///
/// person ─┬─ partner ──> person        (to-one, self-referencing)
///         ├─ friends ──> person        (to-many, self-referencing)
///         ├─ todos ────> todo_item     (to-many)
///         └─ passport ─> passport      (to-one)
/// todo_item ─┬─ owner ─> person        (to-one)
///            └─ tags ──> tag           (to-many through tag_assignment)
/// tag_assignment ─┬─ todo ─> todo_item (to-one)
///                 └─ tag ──> tag       (to-one)
///

static PERSON_RELATIONS: [RelationModel; 4] = [
    RelationModel {
        name: "partner",
        target_entity_name: "person",
        kind: RelationKind::ToOne,
    },
    RelationModel {
        name: "friends",
        target_entity_name: "person",
        kind: RelationKind::ToMany,
    },
    RelationModel {
        name: "todos",
        target_entity_name: "todo_item",
        kind: RelationKind::ToMany,
    },
    RelationModel {
        name: "passport",
        target_entity_name: "passport",
        kind: RelationKind::ToOne,
    },
];

static PERSON_MODEL: EntityModel = EntityModel {
    path: "test_fixtures::Person",
    entity_name: "person",
    attributes: &["name"],
    relations: &PERSON_RELATIONS,
};

static TODO_ITEM_RELATIONS: [RelationModel; 2] = [
    RelationModel {
        name: "owner",
        target_entity_name: "person",
        kind: RelationKind::ToOne,
    },
    RelationModel {
        name: "tags",
        target_entity_name: "tag",
        kind: RelationKind::ToManyThrough {
            join_entity_name: "tag_assignment",
        },
    },
];

static TODO_ITEM_MODEL: EntityModel = EntityModel {
    path: "test_fixtures::TodoItem",
    entity_name: "todo_item",
    attributes: &["description", "ordinal"],
    relations: &TODO_ITEM_RELATIONS,
};

static TAG_ASSIGNMENT_RELATIONS: [RelationModel; 2] = [
    RelationModel {
        name: "todo",
        target_entity_name: "todo_item",
        kind: RelationKind::ToOne,
    },
    RelationModel {
        name: "tag",
        target_entity_name: "tag",
        kind: RelationKind::ToOne,
    },
];

static TAG_ASSIGNMENT_MODEL: EntityModel = EntityModel {
    path: "test_fixtures::TagAssignment",
    entity_name: "tag_assignment",
    attributes: &[],
    relations: &TAG_ASSIGNMENT_RELATIONS,
};

static TAG_MODEL: EntityModel = EntityModel {
    path: "test_fixtures::Tag",
    entity_name: "tag",
    attributes: &["label"],
    relations: &[],
};

static PASSPORT_MODEL: EntityModel = EntityModel {
    path: "test_fixtures::Passport",
    entity_name: "passport",
    attributes: &["number"],
    relations: &[],
};

///
/// Person
///

#[derive(Debug, Default)]
pub(crate) struct Person {
    pub id: Option<u64>,
    pub name: String,
    pub partner: Option<Shared<Person>>,
    pub friends: Vec<Shared<Person>>,
    pub todos: Vec<Shared<TodoItem>>,
    pub passport: Option<Shared<Passport>>,
}

impl Person {
    pub fn new(id: impl Into<Option<u64>>, name: &str) -> Shared<Self> {
        shared(Self {
            id: id.into(),
            name: name.to_string(),
            ..Self::default()
        })
    }
}

impl EntityKind for Person {
    const ENTITY_NAME: &'static str = "person";
    const MODEL: &'static EntityModel = &PERSON_MODEL;
}

impl FieldValues for Person {
    fn get_value(&self, field: &str) -> Option<Value> {
        match field {
            "name" => Some(Value::Text(self.name.clone())),
            _ => None,
        }
    }
}

impl EntityValue for Person {
    fn identity(&self) -> Option<Identity> {
        self.id.map(Identity::Uint)
    }

    fn related(&self, relation: &str) -> Option<RelatedEntities> {
        match relation {
            "partner" => Some(RelatedEntities::ToOne(
                self.partner.clone().map(EntityHandle::new),
            )),
            "friends" => Some(RelatedEntities::ToMany(
                self.friends.iter().cloned().map(EntityHandle::new).collect(),
            )),
            "todos" => Some(RelatedEntities::ToMany(
                self.todos.iter().cloned().map(EntityHandle::new).collect(),
            )),
            "passport" => Some(RelatedEntities::ToOne(
                self.passport.clone().map(EntityHandle::new),
            )),
            _ => None,
        }
    }
}

///
/// TodoItem
///

#[derive(Debug, Default)]
pub(crate) struct TodoItem {
    pub id: Option<u64>,
    pub description: String,
    pub ordinal: u64,
    pub owner: Option<Shared<Person>>,
    pub assignments: Vec<Shared<TagAssignment>>,
}

impl TodoItem {
    pub fn new(id: impl Into<Option<u64>>, description: &str) -> Shared<Self> {
        shared(Self {
            id: id.into(),
            description: description.to_string(),
            ..Self::default()
        })
    }
}

impl EntityKind for TodoItem {
    const ENTITY_NAME: &'static str = "todo_item";
    const MODEL: &'static EntityModel = &TODO_ITEM_MODEL;
}

impl FieldValues for TodoItem {
    fn get_value(&self, field: &str) -> Option<Value> {
        match field {
            "description" => Some(Value::Text(self.description.clone())),
            "ordinal" => Some(Value::Uint(self.ordinal)),
            _ => None,
        }
    }
}

impl EntityValue for TodoItem {
    fn identity(&self) -> Option<Identity> {
        self.id.map(Identity::Uint)
    }

    fn related(&self, relation: &str) -> Option<RelatedEntities> {
        match relation {
            "owner" => Some(RelatedEntities::ToOne(
                self.owner.clone().map(EntityHandle::new),
            )),
            "tags" => {
                let pairs = self
                    .assignments
                    .iter()
                    .filter_map(|assignment| {
                        let tag = assignment.borrow().tag.clone()?;
                        Some(ThroughPair {
                            join: EntityHandle::new(assignment.clone()),
                            target: EntityHandle::new(tag),
                        })
                    })
                    .collect();

                Some(RelatedEntities::ToManyThrough(pairs))
            }
            _ => None,
        }
    }
}

///
/// TagAssignment
///

#[derive(Debug, Default)]
pub(crate) struct TagAssignment {
    pub id: Option<u64>,
    pub todo: Option<Shared<TodoItem>>,
    pub tag: Option<Shared<Tag>>,
}

impl TagAssignment {
    pub fn new(
        id: impl Into<Option<u64>>,
        todo: &Shared<TodoItem>,
        tag: &Shared<Tag>,
    ) -> Shared<Self> {
        let assignment = shared(Self {
            id: id.into(),
            todo: Some(todo.clone()),
            tag: Some(tag.clone()),
        });
        todo.borrow_mut().assignments.push(assignment.clone());

        assignment
    }
}

impl EntityKind for TagAssignment {
    const ENTITY_NAME: &'static str = "tag_assignment";
    const MODEL: &'static EntityModel = &TAG_ASSIGNMENT_MODEL;
}

impl FieldValues for TagAssignment {
    fn get_value(&self, _field: &str) -> Option<Value> {
        None
    }
}

impl EntityValue for TagAssignment {
    fn identity(&self) -> Option<Identity> {
        self.id.map(Identity::Uint)
    }

    fn related(&self, relation: &str) -> Option<RelatedEntities> {
        match relation {
            "todo" => Some(RelatedEntities::ToOne(
                self.todo.clone().map(EntityHandle::new),
            )),
            "tag" => Some(RelatedEntities::ToOne(
                self.tag.clone().map(EntityHandle::new),
            )),
            _ => None,
        }
    }
}

///
/// Tag
///

#[derive(Debug, Default)]
pub(crate) struct Tag {
    pub id: Option<u64>,
    pub label: String,
}

impl Tag {
    pub fn new(id: impl Into<Option<u64>>, label: &str) -> Shared<Self> {
        shared(Self {
            id: id.into(),
            label: label.to_string(),
        })
    }
}

impl EntityKind for Tag {
    const ENTITY_NAME: &'static str = "tag";
    const MODEL: &'static EntityModel = &TAG_MODEL;
}

impl FieldValues for Tag {
    fn get_value(&self, field: &str) -> Option<Value> {
        match field {
            "label" => Some(Value::Text(self.label.clone())),
            _ => None,
        }
    }
}

impl EntityValue for Tag {
    fn identity(&self) -> Option<Identity> {
        self.id.map(Identity::Uint)
    }

    fn related(&self, _relation: &str) -> Option<RelatedEntities> {
        None
    }
}

///
/// Passport
///

#[derive(Debug, Default)]
pub(crate) struct Passport {
    pub id: Option<u64>,
    pub number: u64,
}

impl Passport {
    pub fn new(id: impl Into<Option<u64>>, number: u64) -> Shared<Self> {
        shared(Self {
            id: id.into(),
            number,
        })
    }
}

impl EntityKind for Passport {
    const ENTITY_NAME: &'static str = "passport";
    const MODEL: &'static EntityModel = &PASSPORT_MODEL;
}

impl FieldValues for Passport {
    fn get_value(&self, field: &str) -> Option<Value> {
        match field {
            "number" => Some(Value::Uint(self.number)),
            _ => None,
        }
    }
}

impl EntityValue for Passport {
    fn identity(&self) -> Option<Identity> {
        self.id.map(Identity::Uint)
    }

    fn related(&self, _relation: &str) -> Option<RelatedEntities> {
        None
    }
}

///
/// Schema helpers
///

pub(crate) fn schema() -> SchemaRegistry {
    let mut registry = SchemaRegistry::new();
    registry
        .register::<Person>()
        .expect("person model registration should succeed");
    registry
        .register::<TodoItem>()
        .expect("todo_item model registration should succeed");
    registry
        .register::<TagAssignment>()
        .expect("tag_assignment model registration should succeed");
    registry
        .register::<Tag>()
        .expect("tag model registration should succeed");
    registry
        .register::<Passport>()
        .expect("passport model registration should succeed");

    registry
}

pub(crate) fn dispatcher(hooks: HookRegistry) -> HookDispatcher<NoValueLoader> {
    HookDispatcher::try_new(schema(), hooks, NoValueLoader)
        .expect("fixture dispatcher construction should succeed")
}

pub(crate) fn dispatcher_with_loader(
    hooks: HookRegistry,
    loader: FixtureLoader,
) -> HookDispatcher<FixtureLoader> {
    HookDispatcher::try_new(schema(), hooks, loader)
        .expect("fixture dispatcher construction should succeed")
}

/// Capability shorthand used by the recorder declarations below.
pub(crate) const ALL_HOOKS: u16 = HookSet::all().bits();

///
/// HookCall
///
/// One recorded hook invocation, flattened to comparable data.
///

#[derive(Clone, Debug)]
pub(crate) struct HookCall {
    pub kind: HookKind,
    pub entity: &'static str,
    /// Entity (or diff) count handed to the hook.
    pub count: usize,
    /// Assigned identities handed to the hook, in set order.
    pub identities: Vec<Identity>,
    pub relationship_hop: bool,
    pub succeeded: Option<bool>,
    /// Changed attributes, unioned across diff entries.
    pub changed: Vec<&'static str>,
    /// Relationship groups as `(relation name, distinct entity count)`.
    pub via: Vec<(&'static str, usize)>,
}

impl HookCall {
    fn new(kind: HookKind, entity: &'static str) -> Self {
        Self {
            kind,
            entity,
            count: 0,
            identities: Vec::new(),
            relationship_hop: false,
            succeeded: None,
            changed: Vec::new(),
            via: Vec::new(),
        }
    }
}

pub(crate) type HookLog = Rc<RefCell<Vec<HookCall>>>;

pub(crate) fn new_log() -> HookLog {
    Rc::new(RefCell::new(Vec::new()))
}

/// Recorded calls matching a `(entity, kind)` pair.
pub(crate) fn calls_for(log: &HookLog, entity: &str, kind: HookKind) -> Vec<HookCall> {
    log.borrow()
        .iter()
        .filter(|call| call.entity == entity && call.kind == kind)
        .cloned()
        .collect()
}

///
/// RecordingHooks
///
/// Capability-parameterized recorder: declares exactly the hooks named by
/// `H` and appends one `HookCall` per invocation. Optionally fails on one
/// kind to exercise abort semantics.
///

pub(crate) struct RecordingHooks<E, const H: u16> {
    log: HookLog,
    fail_on: Option<HookKind>,
    _marker: PhantomData<fn() -> E>,
}

impl<E, const H: u16> RecordingHooks<E, H> {
    pub fn new(log: &HookLog) -> Self {
        Self {
            log: log.clone(),
            fail_on: None,
            _marker: PhantomData,
        }
    }

    pub fn failing_on(log: &HookLog, kind: HookKind) -> Self {
        Self {
            log: log.clone(),
            fail_on: Some(kind),
            _marker: PhantomData,
        }
    }

    fn record(&self, call: HookCall) -> HookResult {
        let kind = call.kind;
        self.log.borrow_mut().push(call);

        if self.fail_on == Some(kind) {
            Err(HookError::new(format!("{kind} rejected")))
        } else {
            Ok(())
        }
    }
}

impl<E: EntityValue, const H: u16> LifecycleHooks for RecordingHooks<E, H> {
    type Entity = E;

    const HOOKS: HookSet = HookSet::from_bits_truncate(H);

    fn before_create(&self, entities: &EntitySet<'_, E>, _ctx: &HookContext) -> HookResult {
        self.record(HookCall {
            count: entities.len(),
            identities: entities.identities(),
            ..HookCall::new(HookKind::BeforeCreate, E::ENTITY_NAME)
        })
    }

    fn after_create(&self, entities: &EntitySet<'_, E>, _ctx: &HookContext) -> HookResult {
        self.record(HookCall {
            count: entities.len(),
            identities: entities.identities(),
            ..HookCall::new(HookKind::AfterCreate, E::ENTITY_NAME)
        })
    }

    fn before_read(&self, _ctx: &HookContext, relationship_hop: bool) -> HookResult {
        self.record(HookCall {
            relationship_hop,
            ..HookCall::new(HookKind::BeforeRead, E::ENTITY_NAME)
        })
    }

    fn after_read(
        &self,
        entities: &EntitySet<'_, E>,
        _ctx: &HookContext,
        relationship_hop: bool,
    ) -> HookResult {
        self.record(HookCall {
            count: entities.len(),
            identities: entities.identities(),
            relationship_hop,
            ..HookCall::new(HookKind::AfterRead, E::ENTITY_NAME)
        })
    }

    fn before_update(&self, diffs: &DiffSet<'_, E>, _ctx: &HookContext) -> HookResult {
        let mut changed = Vec::new();
        let mut identities = Vec::new();

        for entry in diffs.iter() {
            for attr in entry.changed_attributes() {
                if !changed.contains(&attr) {
                    changed.push(attr);
                }
            }
            if let Some(request) = entry.request()
                && let Some(identity) = request.identity()
            {
                identities.push(identity);
            }
        }

        self.record(HookCall {
            count: diffs.len(),
            identities,
            changed,
            ..HookCall::new(HookKind::BeforeUpdate, E::ENTITY_NAME)
        })
    }

    fn after_update(&self, entities: &EntitySet<'_, E>, _ctx: &HookContext) -> HookResult {
        self.record(HookCall {
            count: entities.len(),
            identities: entities.identities(),
            ..HookCall::new(HookKind::AfterUpdate, E::ENTITY_NAME)
        })
    }

    fn before_delete(&self, entities: &EntitySet<'_, E>, _ctx: &HookContext) -> HookResult {
        self.record(HookCall {
            count: entities.len(),
            identities: entities.identities(),
            ..HookCall::new(HookKind::BeforeDelete, E::ENTITY_NAME)
        })
    }

    fn after_delete(
        &self,
        entities: &EntitySet<'_, E>,
        _ctx: &HookContext,
        succeeded: bool,
    ) -> HookResult {
        self.record(HookCall {
            count: entities.len(),
            identities: entities.identities(),
            succeeded: Some(succeeded),
            ..HookCall::new(HookKind::AfterDelete, E::ENTITY_NAME)
        })
    }

    fn on_return(&self, entities: &EntitySet<'_, E>, _ctx: &HookContext) -> HookResult {
        self.record(HookCall {
            count: entities.len(),
            identities: entities.identities(),
            ..HookCall::new(HookKind::OnReturn, E::ENTITY_NAME)
        })
    }

    fn before_update_relation(
        &self,
        identities: &[Identity],
        relations: &RelationView<'_, E>,
        _ctx: &HookContext,
    ) -> HookResult {
        self.record(HookCall {
            count: relations.len(),
            identities: identities.to_vec(),
            via: group_summary(relations),
            ..HookCall::new(HookKind::BeforeUpdateRelation, E::ENTITY_NAME)
        })
    }

    fn before_implicit_update_relation(
        &self,
        relations: &RelationView<'_, E>,
        _ctx: &HookContext,
    ) -> HookResult {
        self.record(HookCall {
            count: relations.len(),
            via: group_summary(relations),
            ..HookCall::new(HookKind::BeforeImplicitUpdateRelation, E::ENTITY_NAME)
        })
    }
}

fn group_summary<E: EntityValue>(relations: &RelationView<'_, E>) -> Vec<(&'static str, usize)> {
    relations
        .groups()
        .map(|(_, relation, entities)| (relation.name, entities.len()))
        .collect()
}

///
/// FixtureLoader
///
/// In-memory stand-in for the storage-side value loader, keyed by
/// `(entity name, identity)`.
///

#[derive(Default)]
pub(crate) struct FixtureLoader {
    rows: BTreeMap<(&'static str, Identity), EntityHandle>,
}

impl FixtureLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<E: EntityValue>(&mut self, entity: &Shared<E>) {
        let handle = EntityHandle::new(entity.clone());
        let identity = handle
            .identity()
            .expect("fixture loader rows need assigned identities");

        self.rows.insert((E::ENTITY_NAME, identity), handle);
    }
}

impl ValueLoader for FixtureLoader {
    fn load_persisted(
        &self,
        model: &'static EntityModel,
        identities: &[Identity],
    ) -> Result<BTreeMap<Identity, EntityHandle>, InternalError> {
        let mut out = BTreeMap::new();

        for identity in identities {
            if let Some(handle) = self.rows.get(&(model.entity_name, identity.clone())) {
                out.insert(identity.clone(), handle.clone());
            }
        }

        Ok(out)
    }
}
