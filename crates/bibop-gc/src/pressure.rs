//! Pressure-based collection triggering.
//!
//! Before every allocation the collector consults a condition function with
//! a snapshot of the pressure counters. The default condition compares the
//! bytes allocated since the last collection (plus the upcoming request)
//! against a growth-factor multiple of the last observed live set.

use crate::classes::PAGE;

/// Snapshot of the pressure counters handed to a [`CollectCondition`].
#[derive(Debug, Clone, Copy)]
pub struct CollectInfo {
    bytes_since_last_gc: usize,
    last_live_bytes: usize,
    upcoming_alloc_bytes: usize,
    growth_factor: f64,
}

impl CollectInfo {
    pub(crate) fn new(
        bytes_since_last_gc: usize,
        last_live_bytes: usize,
        upcoming_alloc_bytes: usize,
        growth_factor: f64,
    ) -> CollectInfo {
        CollectInfo {
            bytes_since_last_gc,
            last_live_bytes,
            upcoming_alloc_bytes,
            growth_factor,
        }
    }

    /// Bytes handed out since the last collection finished.
    #[must_use]
    pub const fn bytes_since_last_gc(&self) -> usize {
        self.bytes_since_last_gc
    }

    /// Live bytes measured at the end of the last sweep. Seeded with the
    /// page size before the first collection.
    #[must_use]
    pub const fn last_live_bytes(&self) -> usize {
        self.last_live_bytes
    }

    /// Size of the allocation about to be served.
    #[must_use]
    pub const fn upcoming_alloc_bytes(&self) -> usize {
        self.upcoming_alloc_bytes
    }

    /// Configured growth factor.
    #[must_use]
    pub const fn growth_factor(&self) -> f64 {
        self.growth_factor
    }
}

/// Type of the functions deciding whether an allocation triggers a
/// collection first.
pub type CollectCondition = fn(&CollectInfo) -> bool;

/// The default condition: collect once the bytes allocated since the last
/// collection, counting the upcoming request, exceed the growth-factor
/// multiple of the last live set. The baseline is floored at one page so an
/// empty heap does not thrash.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn default_collect_condition(info: &CollectInfo) -> bool {
    let baseline = info.last_live_bytes().max(PAGE) as f64;
    let threshold = baseline * info.growth_factor();
    (info.bytes_since_last_gc() + info.upcoming_alloc_bytes()) as f64 > threshold
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn below_threshold_stays_quiet() {
        let info = CollectInfo::new(PAGE, PAGE, 0, 1.5);
        assert!(!default_collect_condition(&info));
    }

    #[test]
    fn crossing_threshold_fires() {
        let info = CollectInfo::new(PAGE + PAGE / 2, PAGE, 1, 1.5);
        assert!(default_collect_condition(&info));
    }

    #[test]
    fn upcoming_bytes_count_toward_the_threshold() {
        let info = CollectInfo::new(PAGE, PAGE, PAGE, 1.5);
        assert!(default_collect_condition(&info));
    }

    #[test]
    fn baseline_is_floored_at_one_page() {
        // A tiny live set must not produce a near-zero threshold.
        let info = CollectInfo::new(PAGE, 64, 0, 1.5);
        assert!(!default_collect_condition(&info));
    }
}
