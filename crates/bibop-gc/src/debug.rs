//! Heap introspection.
//!
//! These helpers resolve pointers through the page index and audit the
//! structural invariants of every live page. They exist for tests and
//! debugging; none of them is needed on the allocation path.

use crate::collector;

/// Where a managed pointer landed: its page and slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotInfo {
    /// Base address of the owning page.
    pub page_base: usize,
    /// Slot size of the owning page in bytes.
    pub size_class: usize,
    /// Number of slots on the owning page.
    pub n_slots: u32,
    /// Index of the slot containing the pointer.
    pub slot_index: u32,
    /// Whether that slot is currently allocated.
    pub in_use: bool,
}

/// Resolves an arbitrary pointer to its slot, or `None` if the pointer is
/// not managed (oversize blocks and foreign memory included).
#[must_use]
pub fn slot_info(ptr: *const u8) -> Option<SlotInfo> {
    collector::with(|c| {
        let pg = c.index.find_by_addr(ptr as usize)?;
        // SAFETY: indexed pages are live.
        let page = unsafe { pg.as_ref() };
        let idx = page.slot_index_of(ptr as usize)?;
        Some(SlotInfo {
            page_base: page.base(),
            size_class: page.size_class,
            n_slots: page.n_slots,
            slot_index: idx,
            in_use: page.is_in_use(idx),
        })
    })
    .flatten()
}

/// Audits every live page: the in-use counter must match the bitmap, the
/// freelist must be exactly the free slots with no cycles, and no mark bit
/// may be set outside a collection.
///
/// # Panics
///
/// Panics with a description of the first violations found.
pub fn verify_heap() {
    let problems = collector::with(|c| {
        let mut problems = Vec::new();
        c.book.for_each_page(|page| {
            if let Err(err) = page.check_consistency() {
                problems.push(format!("page {:#x}: {err}", page.base()));
            }
            if !page.marks_clear() {
                problems.push(format!(
                    "page {:#x}: mark bits set outside a collection",
                    page.base()
                ));
            }
        });
        problems
    });
    if let Some(problems) = problems {
        assert!(problems.is_empty(), "heap invariant violations: {problems:?}");
    }
}

/// Number of live (non-tombstoned) root cells, or `None` before init.
#[must_use]
pub fn live_roots() -> Option<usize> {
    collector::with(|c| c.roots.live())
}
