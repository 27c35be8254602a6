//! Metrics sink boundary.
//!
//! Dispatch logic MUST NOT depend on obs::metrics directly.
//! All instrumentation flows through MetricsEvent and MetricsSink; this
//! module is the only bridge between dispatch and the global state.

use crate::{
    hooks::{HookKind, Operation},
    obs::metrics::{self, EventReport},
};
use std::{cell::RefCell, rc::Rc};

thread_local! {
    static SINK_OVERRIDE: RefCell<Option<Rc<dyn MetricsSink>>> = const { RefCell::new(None) };
}

///
/// MetricsEvent
///

#[derive(Clone, Copy, Debug)]
pub enum MetricsEvent {
    DispatchStart {
        operation: Operation,
        root: &'static str,
    },
    HookFired {
        kind: HookKind,
        entity: &'static str,
    },
    HookFailed {
        kind: HookKind,
        entity: &'static str,
    },
    GraphExpanded {
        nodes: u64,
        edges: u64,
    },
    DiffBuilt {
        loaded: u64,
        missing: u64,
    },
}

///
/// MetricsSink
///

pub trait MetricsSink {
    fn record(&self, event: MetricsEvent);
}

///
/// GlobalMetricsSink
/// Default process-local sink that writes into global metrics state.
/// Acts as the concrete sink when no scoped override is installed.
///

pub(crate) struct GlobalMetricsSink;

impl MetricsSink for GlobalMetricsSink {
    fn record(&self, event: MetricsEvent) {
        match event {
            MetricsEvent::DispatchStart { operation, .. } => metrics::with_state_mut(|m| {
                m.ops.dispatch_calls += 1;
                match operation {
                    Operation::Create => m.ops.create_calls += 1,
                    Operation::Read => m.ops.read_calls += 1,
                    Operation::Update => m.ops.update_calls += 1,
                    Operation::Delete => m.ops.delete_calls += 1,
                }
            }),

            MetricsEvent::HookFired { kind, entity } => metrics::with_state_mut(|m| {
                m.ops.hooks_fired += 1;
                *m.hooks.entry(kind.as_str().to_string()).or_default() += 1;
                m.entities.entry(entity.to_string()).or_default().hooks_fired += 1;
            }),

            MetricsEvent::HookFailed { entity, .. } => metrics::with_state_mut(|m| {
                m.ops.hooks_failed += 1;
                m.entities
                    .entry(entity.to_string())
                    .or_default()
                    .hooks_failed += 1;
            }),

            MetricsEvent::GraphExpanded { nodes, edges } => metrics::with_state_mut(|m| {
                m.ops.nodes_visited += nodes;
                m.ops.edges_recorded += edges;
            }),

            MetricsEvent::DiffBuilt { loaded, missing } => metrics::with_state_mut(|m| {
                m.ops.diffs_loaded += loaded;
                m.ops.persisted_missing += missing;
            }),
        }
    }
}

/// Record one event through the scoped override, or the global sink.
pub(crate) fn record(event: MetricsEvent) {
    let sink = SINK_OVERRIDE.with_borrow(Clone::clone);

    match sink {
        Some(sink) => sink.record(event),
        None => GlobalMetricsSink.record(event),
    }
}

/// Run `f` with all metrics events routed to `sink`.
pub fn with_sink_override<R>(sink: Rc<dyn MetricsSink>, f: impl FnOnce() -> R) -> R {
    let previous = SINK_OVERRIDE.with_borrow_mut(|slot| slot.replace(sink));

    let result = f();

    SINK_OVERRIDE.with_borrow_mut(|slot| {
        *slot = previous;
    });

    result
}

/// Snapshot the global metrics state.
#[must_use]
pub fn metrics_report() -> EventReport {
    metrics::with_state(Clone::clone)
}

/// Reset all counters, bumping the reset generation.
pub fn metrics_reset_all() {
    metrics::reset();
}
