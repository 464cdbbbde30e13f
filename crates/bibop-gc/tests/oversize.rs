//! The oversize path: requests beyond the largest size class.

use bibop_gc::{
    alloc, collect, debug, destroy, init, set_collect_condition, stats, GcConfig, PAGE,
    SIZE_CLASSES,
};

#[test]
fn oversize_blocks_bypass_pages_and_survive_collection() {
    assert!(init(GcConfig::default()));
    set_collect_condition(|_| false);

    let p = alloc(PAGE);
    assert!(
        debug::slot_info(p).is_none(),
        "oversize blocks are not in the page index"
    );

    // The block is writable end to end.
    unsafe {
        p.write(0x11);
        p.add(PAGE - 1).write(0x22);
    }

    let s = stats().unwrap();
    assert_eq!(s.live_bytes, 0, "oversize bytes never enter the class lists");
    assert_eq!(s.bytes_since_last_gc, PAGE, "but they do count toward pressure");

    collect();

    // Not swept: contents are intact and the live accounting ignores it.
    unsafe {
        assert_eq!(p.read(), 0x11);
        assert_eq!(p.add(PAGE - 1).read(), 0x22);
    }
    assert_eq!(stats().unwrap().last_live_bytes, 0);

    destroy();
}

#[test]
fn largest_class_is_managed_and_one_past_it_is_not() {
    assert!(init(GcConfig::default()));

    let largest = SIZE_CLASSES[SIZE_CLASSES.len() - 1];
    let managed = alloc(largest);
    assert_eq!(debug::slot_info(managed).unwrap().size_class, largest);

    let oversize = alloc(largest + 1);
    assert!(debug::slot_info(oversize).is_none());

    destroy();
}
