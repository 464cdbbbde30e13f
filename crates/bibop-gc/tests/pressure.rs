//! Pressure-triggered automatic collection.

use bibop_gc::{
    alloc, debug, destroy, init, last_gc_metrics, root, set_collect_condition, stats, unroot,
    GcConfig, PAGE,
};

/// Allocations of this size keep the math simple: 384 of them equal the
/// 1.5-page default threshold.
const CHUNK: usize = 4096;

#[test]
fn unreferenced_churn_triggers_a_collection_that_reclaims() {
    assert!(init(GcConfig::default()));

    // Cross the threshold: the collection fires before the allocation that
    // would exceed it completes.
    let n = (PAGE + PAGE / 2) / CHUNK + 2;
    for _ in 0..n {
        let _ = alloc(CHUNK);
    }

    let m = last_gc_metrics();
    assert!(m.total_collections >= 1, "pressure fired a collection");
    assert!(m.bytes_reclaimed > 0, "nothing was referenced");
    assert!(
        stats().unwrap().last_live_bytes < PAGE,
        "the live set collapsed"
    );

    debug::verify_heap();
    destroy();
}

#[test]
fn rooted_allocations_survive_the_pressure_collection() {
    assert!(init(GcConfig::default()));

    const N: usize = 400;
    let mut cells: Box<[*mut u8; N]> = Box::new([std::ptr::null_mut(); N]);
    for cell in cells.iter_mut() {
        *cell = alloc(CHUNK);
        unsafe { root(cell) };
    }

    let m = last_gc_metrics();
    assert!(m.total_collections >= 1, "the collection still fires");
    assert_eq!(m.slots_reclaimed, 0, "but reclaims nothing");
    assert!(
        stats().unwrap().last_live_bytes > PAGE,
        "the observed live set grew past the baseline"
    );

    for cell in cells.iter_mut() {
        unsafe { unroot(cell) };
    }
    debug::verify_heap();
    destroy();
}

#[test]
fn a_custom_condition_can_silence_the_trigger() {
    assert!(init(GcConfig::default()));
    set_collect_condition(|_| false);

    for _ in 0..(PAGE * 4 / CHUNK) {
        let _ = alloc(CHUNK);
    }
    assert_eq!(last_gc_metrics().total_collections, 0);
    assert!(stats().unwrap().bytes_since_last_gc >= PAGE * 4);

    destroy();
}

#[test]
fn condition_sees_the_upcoming_allocation() {
    assert!(init(GcConfig::default()));

    // A single request bigger than the whole threshold trips on its own.
    let _ = alloc(PAGE * 2); // oversize, still counted
    assert_eq!(
        last_gc_metrics().total_collections,
        1,
        "the pre-allocation check counted the upcoming bytes"
    );

    destroy();
}
