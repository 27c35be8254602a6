use crate::{entity::EntityHandle, error::InternalError, identity::Identity, model::EntityModel};
use std::collections::BTreeMap;

///
/// ValueLoader
///
/// Storage-side collaborator that fetches the persisted counterparts of
/// request entities, batched per type. An identity absent from the returned
/// map means "not found"; that is the caller's condition to handle, never
/// an engine error. The fetch completes before any before-hook fires.
///

pub trait ValueLoader {
    fn load_persisted(
        &self,
        model: &'static EntityModel,
        identities: &[Identity],
    ) -> Result<BTreeMap<Identity, EntityHandle>, InternalError>;
}

///
/// NoValueLoader
///
/// Loader for pipelines that never dispatch updates. Any attempt to load
/// persisted state is an internal error.
///

#[derive(Clone, Copy, Debug, Default)]
pub struct NoValueLoader;

impl ValueLoader for NoValueLoader {
    fn load_persisted(
        &self,
        model: &'static EntityModel,
        _identities: &[Identity],
    ) -> Result<BTreeMap<Identity, EntityHandle>, InternalError> {
        Err(InternalError::loader_internal(format!(
            "no value loader configured; cannot load persisted '{}' state",
            model.entity_name
        )))
    }
}
