//! Collection metrics.

use std::cell::Cell;
use std::time::{Duration, Instant};

/// Statistics from the most recent collection.
#[derive(Debug, Clone, Copy)]
pub struct GcMetrics {
    /// Duration of the whole collection.
    pub duration: Duration,
    /// Duration of the mark phase.
    pub mark_duration: Duration,
    /// Duration of the sweep phase.
    pub sweep_duration: Duration,
    /// Bytes reclaimed by the sweep.
    pub bytes_reclaimed: usize,
    /// Slots reclaimed by the sweep.
    pub slots_reclaimed: usize,
    /// Live bytes surviving the sweep.
    pub bytes_surviving: usize,
    /// Pages that emptied and moved to the cache.
    pub pages_cached: usize,
    /// Pages that emptied and were returned to the OS.
    pub pages_released: usize,
    /// Collections run since init.
    pub total_collections: usize,
}

impl Default for GcMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl GcMetrics {
    /// Creates a `GcMetrics` with every field zeroed.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            duration: Duration::ZERO,
            mark_duration: Duration::ZERO,
            sweep_duration: Duration::ZERO,
            bytes_reclaimed: 0,
            slots_reclaimed: 0,
            bytes_surviving: 0,
            pages_cached: 0,
            pages_released: 0,
            total_collections: 0,
        }
    }
}

/// Helper for timing the two collection phases.
#[derive(Debug, Clone, Copy)]
pub(crate) struct PhaseTimer {
    pub(crate) mark: Duration,
    pub(crate) sweep: Duration,
    current_start: Option<Instant>,
}

impl PhaseTimer {
    pub(crate) const fn new() -> Self {
        Self {
            mark: Duration::ZERO,
            sweep: Duration::ZERO,
            current_start: None,
        }
    }

    pub(crate) fn start(&mut self) {
        self.current_start = Some(Instant::now());
    }

    pub(crate) fn end_mark(&mut self) {
        if let Some(start) = self.current_start.take() {
            self.mark = start.elapsed();
        }
    }

    pub(crate) fn end_sweep(&mut self) {
        if let Some(start) = self.current_start.take() {
            self.sweep = start.elapsed();
        }
    }
}

thread_local! {
    static LAST_METRICS: Cell<GcMetrics> = const { Cell::new(GcMetrics::new()) };
}

/// Metrics of the most recent collection on this thread, or all zeroes if
/// none has run.
#[must_use]
pub fn last_gc_metrics() -> GcMetrics {
    LAST_METRICS.with(Cell::get)
}

pub(crate) fn record(metrics: GcMetrics) {
    LAST_METRICS.with(|m| m.set(metrics));
}
