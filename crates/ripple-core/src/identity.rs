use crate::entity::EntityHandle;
use std::fmt;
use ulid::Ulid;

///
/// Identity
///
/// Persisted identity of an entity. Absent until the storage layer assigns
/// one; identity equality is authoritative once assigned.
///

#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Identity {
    Int(i64),
    Uint(u64),
    Text(String),
    Ulid(Ulid),
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Uint(v) => write!(f, "{v}"),
            Self::Text(v) => write!(f, "{v}"),
            Self::Ulid(v) => write!(f, "{v}"),
        }
    }
}

impl From<i64> for Identity {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<u64> for Identity {
    fn from(v: u64) -> Self {
        Self::Uint(v)
    }
}

impl From<&str> for Identity {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for Identity {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<Ulid> for Identity {
    fn from(v: Ulid) -> Self {
        Self::Ulid(v)
    }
}

///
/// VisitedKey
///
/// Traversal-run identity of an entity: persisted identity when assigned,
/// otherwise the handle's allocation address. Within one traversal run a
/// given key is expanded at most once.
///

#[derive(Clone, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub struct VisitedKey {
    entity_name: &'static str,
    slot: VisitedSlot,
}

#[derive(Clone, Debug, Eq, Ord, PartialEq, PartialOrd)]
enum VisitedSlot {
    Persisted(Identity),
    Address(usize),
}

impl VisitedKey {
    #[must_use]
    pub fn of(handle: &EntityHandle) -> Self {
        let slot = match handle.identity() {
            Some(identity) => VisitedSlot::Persisted(identity),
            None => VisitedSlot::Address(handle.address()),
        };

        Self {
            entity_name: handle.model().entity_name,
            slot,
        }
    }

    #[must_use]
    pub const fn entity_name(&self) -> &'static str {
        self.entity_name
    }
}
