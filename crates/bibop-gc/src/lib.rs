//! A conservative mark-and-sweep garbage collector over a size-classed page
//! allocator.
//!
//! Memory is carved into PAGE-sized, PAGE-aligned pages, each split into
//! uniform slots of one size class. An open-addressed index keyed by page
//! base address resolves any interior pointer to its page in O(1), which is
//! what makes conservative scanning workable: every word that resolves to an
//! allocated slot is treated as a live reference.
//!
//! # Quick start
//!
//! ```no_run
//! use bibop_gc::{alloc, collect, destroy, init, GcConfig};
//!
//! assert!(init(GcConfig::default()));
//!
//! let p = alloc(24);
//! unsafe { p.write_bytes(0xAB, 24) };
//!
//! let mut handle: *mut u8 = p;
//! unsafe { bibop_gc::root(&mut handle) };
//! collect(); // `handle` keeps the slot alive
//! unsafe { bibop_gc::unroot(&mut handle) };
//!
//! destroy();
//! ```
//!
//! # Root discovery
//!
//! Two modes, chosen at [`init`]:
//!
//! - [`StackScan::RootsOnly`] (default): only cells registered through
//!   [`root`] are scanned. Deterministic; reclamation happens exactly when
//!   the registered cells stop referencing a slot.
//! - [`StackScan::Window`]: additionally scans the native stack between the
//!   collector's frame and a caller-supplied upper bound, spilling
//!   callee-saved registers first. Conservative: integers that look like
//!   slot addresses cause retention, never premature frees.
//!
//! # Collection trigger
//!
//! Every allocation first consults a pressure condition; the default fires
//! once bytes allocated since the last collection exceed a growth-factor
//! multiple of the last live set. See [`set_collect_condition`].
//!
//! # Threading
//!
//! The collector is single-threaded: state is thread-local and every
//! operation runs on the thread that called [`init`]. Other threads see an
//! uninitialized collector.

#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

mod book;
mod classes;
mod collector;
mod index;
mod metrics;
mod page;
mod pressure;
mod roots;
mod stack;
#[cfg(feature = "tracing")]
mod trace_log;

pub mod debug;

pub use classes::{class_for_size, NUM_CLASSES, PAGE, SIZE_CLASSES};
pub use collector::{
    alloc, collect, destroy, init, root, set_collect_condition, stats, unroot, GcConfig, GcStats,
    StackScan,
};
pub use metrics::{last_gc_metrics, GcMetrics};
pub use pressure::{default_collect_condition, CollectCondition, CollectInfo};

/// Helpers for tests that need deterministic reclamation.
pub mod test_util {
    /// Clears callee-saved registers so stale pointer values are not picked
    /// up as false roots by a stack-window scan.
    ///
    /// # Safety
    ///
    /// Must only be called when the cleared registers hold no values the
    /// calling code still needs.
    pub unsafe fn clear_registers() {
        // SAFETY: forwarded contract.
        unsafe { crate::stack::clear_registers() }
    }
}
