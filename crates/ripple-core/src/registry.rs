use crate::{
    error::{ErrorClass, ErrorOrigin, InternalError},
    hooks::{
        HookSet, LifecycleHooks,
        erased::{ErasedHooks, HookAdapter},
    },
    model::entity::EntityModel,
    traits::EntityKind,
};
use std::collections::BTreeMap;
use thiserror::Error as ThisError;

///
/// RegistryError
///

#[derive(Debug, ThisError)]
pub enum RegistryError {
    #[error("entity model '{0}' already registered")]
    ModelAlreadyRegistered(String),

    #[error("entity model '{0}' not found")]
    ModelNotFound(String),

    #[error("hook container for '{0}' already registered")]
    ContainerAlreadyRegistered(String),

    #[error("relation '{owner}.{relation}' targets unknown entity '{target}'")]
    UnknownRelationTarget {
        owner: String,
        relation: String,
        target: String,
    },

    #[error("relation '{owner}.{relation}' joins through unknown entity '{join}'")]
    UnknownJoinEntity {
        owner: String,
        relation: String,
        join: String,
    },
}

impl RegistryError {
    pub(crate) const fn class(&self) -> ErrorClass {
        match self {
            Self::ModelNotFound(_) => ErrorClass::Internal,
            Self::ModelAlreadyRegistered(_)
            | Self::ContainerAlreadyRegistered(_)
            | Self::UnknownRelationTarget { .. }
            | Self::UnknownJoinEntity { .. } => ErrorClass::InvariantViolation,
        }
    }
}

impl From<RegistryError> for InternalError {
    fn from(err: RegistryError) -> Self {
        Self::new(err.class(), ErrorOrigin::Registry, err.to_string())
    }
}

///
/// SchemaRegistry
///
/// The process-wide relationship descriptor table: one `&'static` model per
/// entity type, built once at startup and read-only afterwards.
///

#[derive(Default)]
pub struct SchemaRegistry {
    models: BTreeMap<&'static str, &'static EntityModel>,
}

impl SchemaRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an entity type's model.
    pub fn register<E: EntityKind>(&mut self) -> Result<(), InternalError> {
        let model = E::MODEL;

        if self.models.contains_key(model.entity_name) {
            return Err(RegistryError::ModelAlreadyRegistered(model.entity_name.to_string()).into());
        }

        self.models.insert(model.entity_name, model);
        Ok(())
    }

    /// Look up a model by entity name.
    #[must_use]
    pub fn model(&self, entity_name: &str) -> Option<&'static EntityModel> {
        self.models.get(entity_name).copied()
    }

    /// Look up a model by entity name, failing on unknown names.
    pub fn try_get_model(&self, entity_name: &str) -> Result<&'static EntityModel, InternalError> {
        self.models
            .get(entity_name)
            .copied()
            .ok_or_else(|| RegistryError::ModelNotFound(entity_name.to_string()).into())
    }

    /// Iterate registered models in name order.
    pub fn iter(&self) -> impl Iterator<Item = &'static EntityModel> {
        self.models.values().copied()
    }

    /// Check that every declared relation resolves to a registered model.
    pub fn validate(&self) -> Result<(), InternalError> {
        for model in self.models.values() {
            for relation in model.relations {
                if !self.models.contains_key(relation.target_entity_name) {
                    return Err(RegistryError::UnknownRelationTarget {
                        owner: model.entity_name.to_string(),
                        relation: relation.name.to_string(),
                        target: relation.target_entity_name.to_string(),
                    }
                    .into());
                }

                if let Some(join_name) = relation.join_entity_name()
                    && !self.models.contains_key(join_name)
                {
                    return Err(RegistryError::UnknownJoinEntity {
                        owner: model.entity_name.to_string(),
                        relation: relation.name.to_string(),
                        join: join_name.to_string(),
                    }
                    .into());
                }
            }
        }

        Ok(())
    }
}

///
/// HookRegistry
///
/// Per-type hook containers with their capability sets. Built once at
/// startup; lookups are O(log n) over a small map and a type with no
/// container simply resolves to an all-false capability set.
///

#[derive(Default)]
pub struct HookRegistry {
    containers: BTreeMap<&'static str, Box<dyn ErasedHooks>>,
}

impl HookRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a hook container for its entity type.
    pub fn register<C: LifecycleHooks>(&mut self, container: C) -> Result<(), InternalError> {
        let entity_name = <C::Entity as EntityKind>::ENTITY_NAME;

        if self.containers.contains_key(entity_name) {
            return Err(RegistryError::ContainerAlreadyRegistered(entity_name.to_string()).into());
        }

        self.containers
            .insert(entity_name, Box::new(HookAdapter::new(container)));
        Ok(())
    }

    /// Capability set for a type; all-false when no container is registered.
    #[must_use]
    pub fn capabilities(&self, entity_name: &str) -> HookSet {
        self.containers
            .get(entity_name)
            .map_or_else(HookSet::empty, |container| container.hooks())
    }

    pub(crate) fn container(&self, entity_name: &str) -> Option<&dyn ErasedHooks> {
        self.containers.get(entity_name).map(AsRef::as_ref)
    }
}
