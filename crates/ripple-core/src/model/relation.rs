///
/// RelationModel
///
/// Lightweight relation descriptor: one row of the process-wide relationship
/// table. Built once from static type metadata and never mutated.
///

#[derive(Clone, Copy, Debug)]
pub struct RelationModel {
    /// Relation name as used in request payloads and include paths.
    pub name: &'static str,
    /// Stable entity name of the far side.
    pub target_entity_name: &'static str,
    /// Cardinality, including the join type for many-to-many relations.
    pub kind: RelationKind,
}

impl RelationModel {
    /// Join entity name for many-to-many relations, if any.
    #[must_use]
    pub const fn join_entity_name(&self) -> Option<&'static str> {
        match self.kind {
            RelationKind::ToOne | RelationKind::ToMany => None,
            RelationKind::ToManyThrough { join_entity_name } => Some(join_entity_name),
        }
    }
}

///
/// RelationKind
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RelationKind {
    ToOne,
    ToMany,
    /// Many-to-many through a join entity; the join records are visited as
    /// first-class nodes alongside the far side.
    ToManyThrough { join_entity_name: &'static str },
}
