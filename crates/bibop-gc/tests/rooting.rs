//! Explicit root registration and removal.

use bibop_gc::{alloc, collect, debug, destroy, init, root, unroot, GcConfig};

#[test]
fn a_rooted_cell_preserves_its_referent_until_unrooted() {
    assert!(init(GcConfig::default()));

    let mut p = alloc(64);
    unsafe { root(&mut p) };

    collect();
    assert!(debug::slot_info(p).unwrap().in_use, "rooted slot survives");

    let freed = p;
    unsafe { unroot(&mut p) };
    p = std::ptr::null_mut();
    let _ = p;

    collect();
    assert!(
        !debug::slot_info(freed).unwrap().in_use,
        "unrooted slot is reclaimed"
    );

    destroy();
}

#[test]
fn duplicate_roots_are_deduplicated() {
    assert!(init(GcConfig::default()));

    let mut p = alloc(64);
    unsafe {
        root(&mut p);
        root(&mut p);
        root(&mut p);
    }
    assert_eq!(debug::live_roots(), Some(1));

    unsafe { unroot(&mut p) };
    assert_eq!(debug::live_roots(), Some(0));

    destroy();
}

#[test]
fn unrooting_an_unknown_cell_is_a_harmless_no_op() {
    assert!(init(GcConfig::default()));

    let mut stranger: *mut u8 = std::ptr::null_mut();
    unsafe { unroot(&mut stranger) };
    assert_eq!(debug::live_roots(), Some(0));

    destroy();
}

#[test]
fn a_root_holding_null_is_skipped_by_the_mark_phase() {
    assert!(init(GcConfig::default()));

    let mut empty: *mut u8 = std::ptr::null_mut();
    unsafe { root(&mut empty) };
    collect(); // must not fault on the null value

    unsafe { unroot(&mut empty) };
    destroy();
}

#[test]
fn a_rooted_interior_pointer_keeps_the_whole_slot_alive() {
    assert!(init(GcConfig::default()));

    let p = alloc(256);
    let mut interior = unsafe { p.add(100) };
    unsafe { root(&mut interior) };

    collect();
    assert!(debug::slot_info(p).unwrap().in_use);

    unsafe { unroot(&mut interior) };
    collect();
    assert!(!debug::slot_info(p).unwrap().in_use);

    destroy();
}

#[test]
fn rewriting_a_rooted_cell_redirects_reachability() {
    assert!(init(GcConfig::default()));

    let first = alloc(64);
    let second = alloc(64);
    let mut cell = first;
    unsafe { root(&mut cell) };

    collect();
    assert!(debug::slot_info(first).unwrap().in_use);
    assert!(!debug::slot_info(second).unwrap().in_use, "never referenced");

    // The cell is read at mark time, so retargeting it moves liveness.
    let replacement = alloc(64);
    cell = replacement;
    collect();
    assert!(!debug::slot_info(first).unwrap().in_use);
    assert!(debug::slot_info(replacement).unwrap().in_use);

    unsafe { unroot(&mut cell) };
    destroy();
}
