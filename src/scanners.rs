//! Scanners
//!
//! One function per ambiguous/precise root shape (`spec.md` §4.4, §6).
//! `scan_faces_by_id`/`scan_glyph_rows` are the kind of scanner a host
//! passes as an `Mpm::AreaScanFn` to `register_area_root` (see
//! `hooks::on_make_face_cache`/`on_adjust_glyph_matrix`), wrapped in a safe
//! `fn` built over the host's own record layout. `scan_mem_area` and
//! `scan_staticvec` instead back the generic/staticvec root shapes this
//! crate scans itself; both are `unsafe fn`s since they dereference raw
//! pointers directly, so a host wiring one of them into an `AreaScanFn`
//! needs its own safe wrapper around the `unsafe` block.
//!
//! The host's `face`/`glyph_row` record layouts are out of scope (`spec.md`
//! §1: "the host's display engine" is named but not specified); the face
//! and glyph-row scanners below are expressed over small local traits
//! capturing exactly the shape the spec describes (a table of pointers to
//! records, each holding an inline vector of references), so a host's real
//! types only need to implement the trait, not be reimplemented here.

use crate::error::Result;
use crate::mpm::ScanState;
use crate::tag;
use crate::value::TaggedRef;

/// Scan a generic memory area `[start, end)` of raw tagged words
/// (`spec.md` §4.4 "generic memory area" / "value-binding stack"
/// shapes). Mirrors the MPM's own `scan_area_masked` primitive: every
/// word-aligned slot is treated as a candidate tagged reference.
///
/// # Safety
/// `[start, end)` must be readable and writable for `size_of::<TaggedRef>()`
/// aligned word accesses, and must not be concurrently mutated by another
/// thread while this scan runs.
pub unsafe fn scan_mem_area(ss: &mut dyn ScanState, start: usize, end: usize) -> Result<()> {
    let word = std::mem::size_of::<TaggedRef>();
    let mut addr = start;
    while addr + word <= end {
        let slot = addr as *mut TaggedRef;
        let mut value = slot.read_unaligned();
        tag::fix(ss, &mut value)?;
        slot.write_unaligned(value);
        addr += word;
    }
    Ok(())
}

/// Scan a `staticvec`: an array of pointers to tagged words, with `null`
/// entries skipped (`spec.md` §4.4).
///
/// # Safety
/// Every non-null entry of `slots` must point to a valid, writable
/// `TaggedRef`.
pub unsafe fn scan_staticvec(ss: &mut dyn ScanState, slots: &[*mut TaggedRef]) -> Result<()> {
    for &slot in slots {
        if slot.is_null() {
            continue;
        }
        let mut value = slot.read();
        tag::fix(ss, &mut value)?;
        slot.write(value);
    }
    Ok(())
}

/// A face record's inline reference vector (`spec.md` §4.4 "face table").
pub trait FaceRefs {
    fn refs_mut(&mut self) -> &mut [TaggedRef];
}

/// Scan an array of pointers to face records, each with its own inline
/// vector of references. `None` entries represent unused face-cache slots.
pub fn scan_faces_by_id<F: FaceRefs>(
    ss: &mut dyn ScanState,
    faces: &mut [Option<&mut F>],
) -> Result<()> {
    for face in faces.iter_mut().flatten() {
        for slot in face.refs_mut() {
            tag::fix(ss, slot)?;
        }
    }
    Ok(())
}

/// One glyph's reference-bearing `object` field (`spec.md` §4.4 "glyph row
/// matrix").
pub trait GlyphObject {
    fn object_mut(&mut self) -> &mut TaggedRef;
}

/// A single row of a glyph matrix: a used sub-range of glyphs.
pub trait GlyphRow {
    type Glyph: GlyphObject;
    fn used_glyphs_mut(&mut self) -> &mut [Self::Glyph];
}

/// Scan every used glyph in every row of a glyph matrix.
pub fn scan_glyph_rows<R: GlyphRow>(ss: &mut dyn ScanState, rows: &mut [R]) -> Result<()> {
    for row in rows {
        for glyph in row.used_glyphs_mut() {
            tag::fix(ss, glyph.object_mut())?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Tag;

    struct Noop;
    impl ScanState for Noop {
        fn fix1(&mut self, _addr: usize) -> bool {
            false
        }
        fn fix2(&mut self, addr: usize) -> usize {
            addr
        }
    }

    #[test]
    fn scan_mem_area_preserves_immediates() {
        let mut words = [TaggedRef::from_int(7), TaggedRef::from_int(-3)];
        let start = words.as_mut_ptr() as usize;
        let end = start + std::mem::size_of_val(&words);
        let mut ss = Noop;
        unsafe { scan_mem_area(&mut ss, start, end).unwrap() };
        assert_eq!(words[0].as_int(), Some(7));
        assert_eq!(words[1].as_int(), Some(-3));
    }

    #[test]
    fn scan_staticvec_skips_nulls() {
        let mut value = TaggedRef::from_untagged(0x1000, Tag::String);
        let slots: Vec<*mut TaggedRef> = vec![std::ptr::null_mut(), &mut value as *mut _];
        let mut ss = Noop;
        unsafe { scan_staticvec(&mut ss, &slots).unwrap() };
        assert_eq!(value.untagged(), 0x1000);
    }
}
