pub mod entity;
pub mod relation;

pub use entity::EntityModel;
pub use relation::{RelationKind, RelationModel};
