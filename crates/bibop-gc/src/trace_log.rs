//! Structured tracing for collections.
//!
//! When the `tracing` feature is enabled, every collection gets a span
//! carrying a stable id, and the mark/sweep phases emit their own spans.

#[cfg(feature = "tracing")]
pub(crate) mod internal {
    use std::cell::Cell;
    use tracing::{span, Level};

    /// The two collection phases.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub(crate) enum GcPhase {
        /// Trace the live object graph.
        Mark,
        /// Reclaim unreachable slots.
        Sweep,
    }

    /// Stable identifier correlating the events of one collection.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub(crate) struct GcId(pub u64);

    thread_local! {
        static NEXT_GC_ID: Cell<u64> = const { Cell::new(1) };
    }

    pub(crate) fn next_gc_id() -> GcId {
        NEXT_GC_ID.with(|n| {
            let id = n.get();
            n.set(id.wrapping_add(1));
            GcId(id)
        })
    }

    pub(crate) fn trace_gc_collection(gc_id: GcId) -> span::EnteredSpan {
        span!(Level::DEBUG, "gc_collect", gc_id = gc_id.0).entered()
    }

    pub(crate) fn trace_phase(phase: GcPhase) -> span::EnteredSpan {
        span!(Level::DEBUG, "gc_phase", phase = ?phase).entered()
    }
}

#[cfg(feature = "tracing")]
pub(crate) use internal::{next_gc_id, trace_gc_collection, trace_phase, GcPhase};
