use serde::{Deserialize, Serialize};
use std::{cell::RefCell, collections::BTreeMap};

///
/// EventReport
/// Ephemeral, in-memory counters for dispatch activity.
///

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct EventReport {
    pub ops: EventOps,
    /// Fired-hook counts keyed by hook kind.
    pub hooks: BTreeMap<String, u64>,
    /// Per-entity-type counters.
    pub entities: BTreeMap<String, EntityCounters>,
    /// Number of resets since process start.
    pub resets: u64,
}

///
/// EventOps
///

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct EventOps {
    // Dispatcher entrypoints
    pub dispatch_calls: u64,
    pub create_calls: u64,
    pub read_calls: u64,
    pub update_calls: u64,
    pub delete_calls: u64,

    // Hook activity
    pub hooks_fired: u64,
    pub hooks_failed: u64,

    // Traversal
    pub nodes_visited: u64,
    pub edges_recorded: u64,

    // Diffing
    pub diffs_loaded: u64,
    pub persisted_missing: u64,
}

///
/// EntityCounters
///

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct EntityCounters {
    pub hooks_fired: u64,
    pub hooks_failed: u64,
}

thread_local! {
    static STATE: RefCell<EventReport> = RefCell::new(EventReport::default());
}

pub(crate) fn with_state<R>(f: impl FnOnce(&EventReport) -> R) -> R {
    STATE.with_borrow(f)
}

pub(crate) fn with_state_mut<R>(f: impl FnOnce(&mut EventReport) -> R) -> R {
    STATE.with_borrow_mut(f)
}

pub(crate) fn reset() {
    STATE.with_borrow_mut(|state| {
        let resets = state.resets.saturating_add(1);
        *state = EventReport {
            resets,
            ..EventReport::default()
        };
    });
}
