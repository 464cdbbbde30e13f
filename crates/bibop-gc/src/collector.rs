//! The collector: lifecycle, allocation entry points, and the mark/sweep
//! cycle tying the book, the page index, the roots table and the pressure
//! counters together.

use std::cell::RefCell;
use std::io;
use std::ptr::NonNull;
use std::time::Instant;

use sys_arena::Arena;

use crate::book::Book;
use crate::classes::{class_for_size, NUM_CLASSES, PAGE, SIZE_CLASSES};
use crate::index::PageIndex;
use crate::metrics::{self, GcMetrics, PhaseTimer};
use crate::page::Page;
use crate::pressure::{default_collect_condition, CollectCondition, CollectInfo};
use crate::roots::RootsTable;
use crate::stack;

// ============================================================================
// Configuration
// ============================================================================

/// How the mark phase discovers roots beyond the explicit table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackScan {
    /// Scan the native stack between the collector's own frame and the given
    /// upper bound, treating every pointer-sized word as a candidate
    /// reference. The hint must dominate every frame that may hold
    /// references; take it early in `main`.
    Window {
        /// Upper bound of the scannable stack.
        top_hint: usize,
    },
    /// Consult only cells registered through [`root`](crate::root). The
    /// deterministic mode: no false retention from stale stack words.
    RootsOnly,
}

/// Collector configuration, fixed at [`init`].
#[derive(Debug, Clone, Copy)]
pub struct GcConfig {
    /// Root discovery policy.
    pub stack_scan: StackScan,
    /// When true, pages that sweep empty are returned to the OS instead of
    /// being cached for rebinding.
    pub free_empty_pages: bool,
    /// Multiplier over the last live set that sets the collection threshold.
    pub growth_factor: f64,
}

impl Default for GcConfig {
    fn default() -> Self {
        Self {
            stack_scan: StackScan::RootsOnly,
            free_empty_pages: false,
            growth_factor: 1.5,
        }
    }
}

// ============================================================================
// Collector state
// ============================================================================

#[derive(Clone, Copy)]
struct WorkItem {
    page: NonNull<Page>,
    idx: u32,
}

#[derive(Default)]
struct SweepOutcome {
    bytes_reclaimed: usize,
    slots_reclaimed: usize,
    pages_cached: usize,
    pages_released: usize,
}

pub(crate) struct Collector {
    arena: Arena,
    pub(crate) book: Book,
    pub(crate) index: PageIndex,
    pub(crate) roots: RootsTable,
    worklist: Vec<WorkItem>,
    config: GcConfig,
    collect_condition: CollectCondition,
    pub(crate) bytes_since_last_gc: usize,
    pub(crate) last_live_bytes: usize,
    total_collections: usize,
    in_collect: bool,
}

thread_local! {
    static COLLECTOR: RefCell<Option<Collector>> = const { RefCell::new(None) };
}

/// Runs `f` against the thread's collector, or returns `None` if [`init`]
/// has not been called on this thread.
pub(crate) fn with<R>(f: impl FnOnce(&mut Collector) -> R) -> Option<R> {
    COLLECTOR.with(|c| c.borrow_mut().as_mut().map(f))
}

// ============================================================================
// Public operations
// ============================================================================

/// Initializes the collector for the calling thread.
///
/// Re-initializing tears down the previous collector first. Returns false
/// only if the arena cannot map its initial block.
pub fn init(config: GcConfig) -> bool {
    let arena = match Arena::new() {
        Ok(arena) => arena,
        Err(_err) => {
            #[cfg(feature = "tracing")]
            tracing::error!(error = %_err, "arena initialization failed");
            return false;
        }
    };

    let collector = Collector {
        arena,
        book: Book::new(),
        index: PageIndex::new(128),
        roots: RootsTable::new(),
        worklist: Vec::new(),
        config,
        collect_condition: default_collect_condition,
        bytes_since_last_gc: 0,
        last_live_bytes: PAGE,
        total_collections: 0,
        in_collect: false,
    };
    COLLECTOR.with(|c| *c.borrow_mut() = Some(collector));
    true
}

/// Tears the collector down. Every page, oversize block and bookkeeping
/// structure is released; all pointers handed out become invalid.
pub fn destroy() {
    COLLECTOR.with(|c| {
        drop(c.borrow_mut().take());
    });
}

/// Allocates `size` bytes and returns an aligned pointer.
///
/// Memory is zeroed the first time a slot is handed out and not rezeroed on
/// reuse; callers must not assume zero. A request of zero bytes is served
/// from the smallest class. Any call may run a collection first, so raw
/// interior pointers into managed memory must not be held across
/// allocations unless their owner is reachable from a root.
///
/// # Panics
///
/// Panics if the collector is not initialized, or if the OS refuses memory
/// even after a retry collection.
#[must_use]
pub fn alloc(size: usize) -> *mut u8 {
    with(|c| c.alloc(size)).expect("collector not initialized: call init first")
}

/// Runs a full mark/sweep cycle synchronously. A no-op before [`init`].
pub fn collect() {
    let _ = with(Collector::run_collection);
}

/// Registers the address of a caller-held reference. During mark the cell
/// is dereferenced once and the value treated as a potential reference.
/// Duplicate registrations are deduplicated.
///
/// # Safety
///
/// `cell` must stay valid (and hold either null or a live reference) until
/// it is passed to [`unroot`] or the collector is destroyed.
pub unsafe fn root(cell: *mut *mut u8) {
    if cell.is_null() {
        return;
    }
    let _ = with(|c| c.roots.add(cell));
}

/// Deregisters a cell added with [`root`]. Unrooting a cell that was never
/// registered is a non-fatal diagnostic and otherwise a no-op.
///
/// # Safety
///
/// `cell` must be the exact address previously registered.
pub unsafe fn unroot(cell: *mut *mut u8) {
    match with(|c| c.roots.remove(cell)) {
        Some(false) => {
            #[cfg(feature = "tracing")]
            tracing::warn!(cell = cell as usize, "unroot of unregistered cell ignored");
        }
        _ => {}
    }
}

/// Replaces the function deciding whether an allocation collects first.
/// See [`default_collect_condition`]. A no-op before [`init`].
pub fn set_collect_condition(f: CollectCondition) {
    let _ = with(|c| c.collect_condition = f);
}

/// Point-in-time counters of the collector's heap.
#[derive(Debug, Clone, Copy)]
pub struct GcStats {
    /// Pages currently bound to a class plus cached empty pages.
    pub total_pages: usize,
    /// Pages currently bound to a size class.
    pub active_pages: usize,
    /// Pages cached for rebinding.
    pub empty_pages: usize,
    /// Exact live bytes over the class lists.
    pub live_bytes: usize,
    /// Live bytes measured at the end of the last sweep.
    pub last_live_bytes: usize,
    /// Bytes allocated since the last collection.
    pub bytes_since_last_gc: usize,
}

/// Snapshot of the heap counters, or `None` before [`init`].
#[must_use]
pub fn stats() -> Option<GcStats> {
    with(|c| {
        let active_pages = c.book.active_pages();
        let empty_pages = c.book.empty_pages();
        GcStats {
            total_pages: active_pages + empty_pages,
            active_pages,
            empty_pages,
            live_bytes: c.book.live_bytes(),
            last_live_bytes: c.last_live_bytes,
            bytes_since_last_gc: c.bytes_since_last_gc,
        }
    })
}

// ============================================================================
// Allocation
// ============================================================================

impl Collector {
    fn alloc(&mut self, size: usize) -> *mut u8 {
        match class_for_size(size) {
            Some(class_index) => {
                self.maybe_collect(SIZE_CLASSES[class_index]);
                match self.alloc_from_class(class_index) {
                    Ok(ptr) => ptr,
                    Err(_) => {
                        self.run_collection();
                        match self.alloc_from_class(class_index) {
                            Ok(ptr) => ptr,
                            Err(err) => panic!(
                                "allocation of a {}-byte slot failed after a retry collection: {err}",
                                SIZE_CLASSES[class_index]
                            ),
                        }
                    }
                }
            }
            None => self.alloc_oversize(size),
        }
    }

    /// Requests beyond the largest class bypass the page machinery: the
    /// arena hands out a raw block that is never swept and lives until the
    /// collector is destroyed. Its bytes still count toward pressure.
    fn alloc_oversize(&mut self, size: usize) -> *mut u8 {
        self.maybe_collect(size);
        let block = match self.arena.alloc_raw(size) {
            Ok(block) => block,
            Err(_) => {
                self.run_collection();
                match self.arena.alloc_raw(size) {
                    Ok(block) => block,
                    Err(err) => panic!(
                        "oversize allocation of {size} bytes failed after a retry collection: {err}"
                    ),
                }
            }
        };
        self.bytes_since_last_gc += size;
        block.as_ptr()
    }

    fn alloc_from_class(&mut self, class_index: usize) -> io::Result<*mut u8> {
        // A page of this class with a free slot.
        if let Some(mut pg) = self.book.find_page_with_free_slot(class_index) {
            // SAFETY: pages in the book are live until destroyed.
            let ptr = unsafe {
                let page = pg.as_mut();
                let idx = page.take_free_slot().expect("page advertised a free slot");
                page.slot_ptr(idx)
            };
            self.bytes_since_last_gc += SIZE_CLASSES[class_index];
            return Ok(ptr);
        }

        // A cached empty page, rebound to this class.
        if let Some(mut pg) = self.book.pop_empty() {
            // SAFETY: as above.
            let ptr = unsafe {
                let page = pg.as_mut();
                page.reset_for_class(class_index);
                let idx = page.take_free_slot().expect("fresh page has free slots");
                page.slot_ptr(idx)
            };
            self.book.push_class_front(class_index, pg);
            self.bytes_since_last_gc += SIZE_CLASSES[class_index];
            return Ok(ptr);
        }

        // A new page from the OS.
        let mut page = Page::new_for_class(class_index)?;
        let idx = page.take_free_slot().expect("fresh page has free slots");
        let ptr = page.slot_ptr(idx);
        let base = page.base();
        let pg = NonNull::from(Box::leak(page));
        self.index.insert(base, pg);
        self.book.push_class_front(class_index, pg);
        self.book.n_pages += 1;
        self.bytes_since_last_gc += SIZE_CLASSES[class_index];
        Ok(ptr)
    }

    fn maybe_collect(&mut self, upcoming_bytes: usize) {
        if self.in_collect {
            return;
        }
        let info = CollectInfo::new(
            self.bytes_since_last_gc,
            self.last_live_bytes,
            upcoming_bytes,
            self.config.growth_factor,
        );
        if (self.collect_condition)(&info) {
            self.run_collection();
        }
    }

    // ========================================================================
    // Collection
    // ========================================================================

    fn run_collection(&mut self) {
        if self.in_collect {
            return;
        }
        self.in_collect = true;

        #[cfg(feature = "tracing")]
        let _span = crate::trace_log::trace_gc_collection(crate::trace_log::next_gc_id());

        let start = Instant::now();
        let mut timer = PhaseTimer::new();

        timer.start();
        self.mark();
        timer.end_mark();

        timer.start();
        let swept = self.sweep();
        timer.end_sweep();

        let live = self.book.live_bytes();
        self.last_live_bytes = live;
        self.bytes_since_last_gc = 0;
        self.total_collections += 1;
        self.in_collect = false;

        metrics::record(GcMetrics {
            duration: start.elapsed(),
            mark_duration: timer.mark,
            sweep_duration: timer.sweep,
            bytes_reclaimed: swept.bytes_reclaimed,
            slots_reclaimed: swept.slots_reclaimed,
            bytes_surviving: live,
            pages_cached: swept.pages_cached,
            pages_released: swept.pages_released,
            total_collections: self.total_collections,
        });
    }

    /// Mark phase. Mark bits are zero on entry: they are cleared at page
    /// birth and by the previous sweep.
    fn mark(&mut self) {
        #[cfg(feature = "tracing")]
        let _phase = crate::trace_log::trace_phase(crate::trace_log::GcPhase::Mark);

        self.worklist.clear();

        if let StackScan::Window { top_hint } = self.config.stack_scan {
            let mut visit = |word: usize| self.mark_ptr(word);
            // SAFETY: the window spans this thread's live stack up to the
            // hint recorded at init.
            unsafe { stack::scan_with_spilled_registers(top_hint, &mut visit) };
        }

        let mut i = 0;
        while i < self.roots.high_water() {
            let cell = self.roots.cell_at(i);
            i += 1;
            if !cell.is_null() {
                // SAFETY: registered cells stay valid until unrooted.
                let value = unsafe { *cell } as usize;
                self.mark_ptr(value);
            }
        }

        self.drain_worklist();
    }

    /// Conservative filter: an arbitrary word is treated as a reference only
    /// if it resolves through the page index to an allocated slot.
    fn mark_ptr(&mut self, addr: usize) {
        if addr == 0 {
            return;
        }
        let Some(mut pg) = self.index.find_by_addr(addr) else {
            return;
        };
        // SAFETY: indexed pages are live.
        let page = unsafe { pg.as_mut() };
        let Some(idx) = page.slot_index_of(addr) else {
            return;
        };
        if !page.is_in_use(idx) {
            return;
        }
        if page.set_mark(idx) {
            self.worklist.push(WorkItem { page: pg, idx });
        }
    }

    fn drain_worklist(&mut self) {
        while let Some(item) = self.worklist.pop() {
            // SAFETY: worklist entries reference live pages and in-use slots.
            let (slot, size_class) = unsafe {
                let page = item.page.as_ref();
                (page.slot_ptr(item.idx), page.size_class)
            };
            let n_words = size_class / std::mem::size_of::<usize>();
            for k in 0..n_words {
                // SAFETY: the slot payload lies inside the page buffer and
                // slot bases are word-aligned.
                let word = unsafe { slot.cast::<usize>().add(k).read() };
                self.mark_ptr(word);
            }
        }
    }

    /// Sweep phase: reclaim unmarked in-use slots, clear surviving marks,
    /// and retire pages that emptied.
    fn sweep(&mut self) -> SweepOutcome {
        #[cfg(feature = "tracing")]
        let _phase = crate::trace_log::trace_phase(crate::trace_log::GcPhase::Sweep);

        let mut out = SweepOutcome::default();
        for class_index in 0..NUM_CLASSES {
            let mut link: *mut Option<NonNull<Page>> = self.book.class_head_mut(class_index);
            // SAFETY: `link` always points at a live list cell: the class
            // head in the book, or the `next` field of a page in that list.
            unsafe {
                while let Some(mut pg) = *link {
                    let page = pg.as_mut();
                    for i in 0..page.n_slots {
                        if page.is_marked(i) {
                            page.clear_mark(i);
                        } else if page.is_in_use(i) {
                            page.release_slot(i);
                            out.slots_reclaimed += 1;
                            out.bytes_reclaimed += page.size_class;
                        }
                    }

                    if page.in_use_count == 0 {
                        *link = page.next.take();
                        if self.config.free_empty_pages {
                            self.index.remove(page.base());
                            self.book.n_pages -= 1;
                            drop(Box::from_raw(pg.as_ptr()));
                            out.pages_released += 1;
                        } else {
                            self.book.push_empty_front(pg);
                            out.pages_cached += 1;
                        }
                    } else {
                        link = &mut page.next;
                    }
                }
            }
        }
        out
    }
}
