mod common;

use common::ArenaFixture;
use igc::error::Result;
use igc::mpm::ScanState;
use igc::scanners::{self, FaceRefs};
use igc::value::{Cons, Tag, TaggedRef};

/// A minimal stand-in for the host's face record: one inline reference
/// slot, matching what `scanners::FaceRefs` requires.
struct TestFace {
    refs: [TaggedRef; 1],
}

impl FaceRefs for TestFace {
    fn refs_mut(&mut self) -> &mut [TaggedRef] {
        &mut self.refs
    }
}

/// The host-supplied `AreaScanFn` for a face cache (`spec.md` §4.4, §4.7
/// `on_make_face_cache`): `[start, end)` is an array of `*mut TestFace`,
/// with null entries standing in for unused cache slots. `AreaScanFn` is a
/// plain `fn` pointer with no captured environment, so, like a real face
/// cache, the table's own memory is the only state this function sees.
fn scan_test_face_table(ss: &mut dyn ScanState, start: usize, end: usize) -> Result<()> {
    let ptr_size = std::mem::size_of::<*mut TestFace>();
    let count = (end - start) / ptr_size;
    // SAFETY: the test installs `start`/`end` over a live stack array of
    // `*mut TestFace` for the duration of the root's registration.
    let slots = unsafe { std::slice::from_raw_parts(start as *const *mut TestFace, count) };
    let mut faces: Vec<Option<&mut TestFace>> = slots
        .iter()
        .map(|&p| if p.is_null() { None } else { Some(unsafe { &mut *p }) })
        .collect();
    scanners::scan_faces_by_id(ss, &mut faces)
}

/// A cons reachable only through a face-table root (not the stack or any
/// `on_mem_insert` root) must survive a collection, and the face record's
/// slot that held it must still decode to the same object afterward
/// (`spec.md` §4.4 face table root shape, §4.7 `on_make_face_cache`).
#[test]
fn face_cache_root_pins_referenced_cons() {
    let fixture = ArenaFixture::new();
    let arena = &fixture.arena;

    let cons = arena
        .make_cons(fixture.main_thread, TaggedRef::from_int(9), TaggedRef::NIL)
        .unwrap();
    assert_eq!(cons.tag(), Some(Tag::Cons));

    let mut face = TestFace { refs: [cons] };
    let face_ptr: *mut TestFace = &mut face;
    let slots: [*mut TestFace; 2] = [face_ptr, std::ptr::null_mut()];
    let start = slots.as_ptr() as usize;
    let end = start + std::mem::size_of_val(&slots);

    let root = arena.on_make_face_cache(start, end, scan_test_face_table).unwrap();

    fixture.force_collection();

    let after = face.refs[0];
    assert_eq!(after.tag(), Some(Tag::Cons));
    let block = unsafe { *(after.untagged() as *const Cons) };
    assert_eq!(block.car.as_int(), Some(9));
    assert_eq!(block.cdr, TaggedRef::NIL);

    arena.on_free_face_cache(root).unwrap();

    // With the face-table root gone the cons is unreachable; this must not
    // panic or double-free, it simply collects it.
    fixture.force_collection();
}

/// `on_face_cache_change` must swap the face-table root atomically from the
/// caller's point of view: the replacement root keeps a still-referenced
/// cons alive exactly like the original did.
#[test]
fn face_cache_change_keeps_referenced_cons_alive_across_swap() {
    let fixture = ArenaFixture::new();
    let arena = &fixture.arena;

    let cons = arena
        .make_cons(fixture.main_thread, TaggedRef::from_int(3), TaggedRef::NIL)
        .unwrap();

    let mut old_face = TestFace { refs: [cons] };
    let old_slots: [*mut TestFace; 1] = [&mut old_face];
    let old_start = old_slots.as_ptr() as usize;
    let old_end = old_start + std::mem::size_of_val(&old_slots);
    let old_root = arena
        .on_make_face_cache(old_start, old_end, scan_test_face_table)
        .unwrap();

    let mut new_face = TestFace { refs: [cons] };
    let new_slots: [*mut TestFace; 1] = [&mut new_face];
    let new_start = new_slots.as_ptr() as usize;
    let new_end = new_start + std::mem::size_of_val(&new_slots);

    let new_root = arena
        .on_face_cache_change(old_root, new_start, new_end, scan_test_face_table)
        .unwrap();

    fixture.force_collection();

    let after = new_face.refs[0];
    assert_eq!(after.tag(), Some(Tag::Cons));
    let block = unsafe { *(after.untagged() as *const Cons) };
    assert_eq!(block.car.as_int(), Some(3));

    arena.on_free_face_cache(new_root).unwrap();
}
