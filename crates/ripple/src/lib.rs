//! Ripple — a lifecycle hook execution engine for entity relationship
//! graphs.
//!
//! ## Crate layout
//! - `core`: entity traits, erased graph handles, capability registries,
//!   traversal, diffing, observability, and the dispatcher.
//! - `error`: public error type with a stable kind + origin taxonomy.
//!
//! The `prelude` module mirrors the surface a hosting pipeline uses when
//! wiring entity types and hook containers into a dispatcher.

pub use ripple_core as core;

pub mod error;

pub use error::Error;

//
// Consts
//

/// Workspace version re-export for downstream tooling/tests.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

///
/// Prelude
///

pub mod prelude {
    pub use crate::error::{Error, ErrorKind, ErrorOrigin};
    pub use ripple_core::{
        engine::{DiffEntry, DiffSet, HookDispatcher, IncludePath, RelationView, TargetedFields},
        entity::{EntityHandle, EntitySet, RelatedEntities, Shared, ThroughPair, shared},
        hooks::{HookContext, HookKind, HookResult, HookSet, LifecycleHooks, Operation},
        identity::Identity,
        loader::ValueLoader,
        model::{EntityModel, RelationKind, RelationModel},
        registry::{HookRegistry, SchemaRegistry},
        traits::{EntityKind, EntityValue, FieldValues},
        value::Value,
    };
}
