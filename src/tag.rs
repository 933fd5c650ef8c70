//! Tag/Fix Primitives
//!
//! The single operation every scanner in this crate bottoms out on. The MPM
//! knows nothing about the host's tagging scheme, so stripping and
//! re-adding the tag happens here, not in the MPM contract (`spec.md`
//! §4.1).

use crate::error::{IgcError, Result};
use crate::mpm::ScanState;
use crate::value::{symbol_address_to_offset, symbol_offset_to_address, Tag, TaggedRef};

/// Fix one tagged slot in place.
///
/// Steps follow `spec.md` §4.1 literally so the invariant table in that
/// section maps onto this function body one-to-one:
///
/// 1. Read the tagged word at `slot`.
/// 2. If it tags an immediate integer, do nothing.
/// 3. Compute the candidate referent address (offset-relative for symbols,
///    direct otherwise).
/// 4. Ask the MPM whether the address is interesting (`fix1`).
/// 5. Ask the MPM to fix it (`fix2`).
/// 6. Convert back to an offset if the tag was symbol.
/// 7. Write `(new_payload | original_tag)` back to `slot`.
pub fn fix(ss: &mut dyn ScanState, slot: &mut TaggedRef) -> Result<()> {
    // 1. Read the tagged word at `slot`.
    let word = *slot;

    // 2. Immediates are never fixed.
    let tag = match word.tag() {
        Some(tag) => tag,
        None => return Err(IgcError::Internal("tagged word has reserved tag bits".into())),
    };
    if matches!(tag, Tag::Int) {
        return Ok(());
    }

    // 3. Compute the candidate referent address.
    let base = if matches!(tag, Tag::Symbol) {
        match symbol_offset_to_address(word.untagged()) {
            Some(addr) => addr,
            // No symbol array registered yet: nothing to fix against.
            None => return Ok(()),
        }
    } else {
        word.untagged() as usize
    };

    // 4. Is this address interesting to the MPM?
    if !ss.fix1(base) {
        return Ok(());
    }

    // 5. Fix it, receiving back the possibly-moved address.
    let new_base = ss.fix2(base);

    // 6. Convert back to an offset for symbols.
    let new_untagged = if matches!(tag, Tag::Symbol) {
        symbol_address_to_offset(new_base)
            .ok_or_else(|| IgcError::Internal("fixed symbol address precedes symbol_array_base".into()))?
    } else {
        new_base as u64
    };

    // 7. Write the new payload back with the original tag preserved.
    *slot = TaggedRef::from_untagged(new_untagged, tag);
    Ok(())
}

/// Resolve the address a tagged word's payload designates, translating the
/// symbol tag's offset through `symbol_array_base` exactly as `fix`'s
/// steps 2-3 do. Ambiguous/conservative scanners (`mpm::sim::SimMpm`'s
/// `scan_conservative`) use this instead of `fix`: a word found on a
/// conservatively-scanned stack is only ever tested for pool membership
/// and pinned, never rewritten, so there is no `ScanState` to hand and no
/// tag to write back (`spec.md` §4.4: ambiguous roots pin their referent;
/// they do not get fixed up in place). Returns `None` for immediates and
/// for symbol words whose offset cannot yet be resolved (no symbol array
/// registered).
pub fn ambiguous_candidate(word: TaggedRef) -> Option<usize> {
    let tag = word.tag()?;
    if matches!(tag, Tag::Int) {
        return None;
    }
    if matches!(tag, Tag::Symbol) {
        symbol_offset_to_address(word.untagged())
    } else {
        Some(word.untagged() as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::set_symbol_array_base;

    struct IdentityScan;
    impl ScanState for IdentityScan {
        fn fix1(&mut self, _addr: usize) -> bool {
            true
        }
        fn fix2(&mut self, addr: usize) -> usize {
            addr
        }
    }

    struct MovingScan {
        from: usize,
        to: usize,
    }
    impl ScanState for MovingScan {
        fn fix1(&mut self, addr: usize) -> bool {
            addr == self.from
        }
        fn fix2(&mut self, addr: usize) -> usize {
            if addr == self.from {
                self.to
            } else {
                addr
            }
        }
    }

    #[test]
    fn immediates_are_untouched() {
        let mut ss = IdentityScan;
        let mut slot = TaggedRef::from_int(42);
        fix(&mut ss, &mut slot).unwrap();
        assert_eq!(slot.as_int(), Some(42));
    }

    #[test]
    fn tag_bits_survive_a_move() {
        let mut ss = MovingScan { from: 0x2000, to: 0x3000 };
        let mut slot = TaggedRef::from_untagged(0x2000, Tag::Cons);
        fix(&mut ss, &mut slot).unwrap();
        assert_eq!(slot.tag(), Some(Tag::Cons));
        assert_eq!(slot.untagged(), 0x3000);
    }

    #[test]
    fn symbol_offsets_round_trip_through_a_move() {
        // `set_symbol_array_base` is a set-once global shared by every test
        // in this binary, so read back whatever base ends up active rather
        // than assuming this call wins the race.
        set_symbol_array_base(0x9000_0000);
        let base = crate::value::symbol_array_base();
        let mut ss = MovingScan {
            from: base + 16,
            to: base + 16,
        };
        let mut slot = TaggedRef::from_untagged(16, Tag::Symbol);
        fix(&mut ss, &mut slot).unwrap();
        assert_eq!(slot.tag(), Some(Tag::Symbol));
        assert_eq!(slot.untagged(), 16);
    }

    #[test]
    fn ambiguous_candidate_ignores_immediates() {
        assert_eq!(ambiguous_candidate(TaggedRef::from_int(7)), None);
    }

    #[test]
    fn ambiguous_candidate_resolves_symbol_offsets() {
        set_symbol_array_base(0xa000_0000);
        let base = crate::value::symbol_array_base();
        let word = TaggedRef::from_untagged(24, Tag::Symbol);
        assert_eq!(ambiguous_candidate(word), Some(base + 24));
    }

    #[test]
    fn ambiguous_candidate_passes_through_direct_addresses() {
        let word = TaggedRef::from_untagged(0x5000, Tag::Cons);
        assert_eq!(ambiguous_candidate(word), Some(0x5000));
    }
}
