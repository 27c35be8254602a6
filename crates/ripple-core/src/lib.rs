//! Core runtime for Ripple: entity traits, erased graph handles, capability
//! registries, graph traversal, persisted-state diffing, and the hook
//! dispatcher, plus the ergonomics exported via the `prelude`.

// public exports are one module level down
pub mod engine;
pub mod entity;
pub mod error;
pub mod hooks;
pub mod identity;
pub mod loader;
pub mod model;
pub mod obs;
pub mod registry;
pub mod traits;
pub mod value;

// test
#[cfg(test)]
pub(crate) mod test_fixtures;

pub use error::{Error, HookError, InternalError};

///
/// Prelude
///
/// Prelude contains only domain vocabulary.
/// No errors, registries, or observability helpers are re-exported here.
///

pub mod prelude {
    pub use crate::{
        engine::{DiffEntry, DiffSet, HookDispatcher, IncludePath, RelationView, TargetedFields},
        entity::{EntityHandle, EntitySet, RelatedEntities, Shared, ThroughPair, shared},
        hooks::{HookContext, HookKind, HookResult, HookSet, LifecycleHooks, Operation},
        identity::Identity,
        model::{EntityModel, RelationKind, RelationModel},
        traits::{EntityKind, EntityValue, FieldValues},
        value::Value,
    };
}
