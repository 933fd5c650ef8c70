//! Legacy-Mark Bridge
//!
//! `mark_old_objects_referenced_from_pools` walks every live cons and
//! symbol in the moving pools and, for each reference whose tag is a
//! legacy-managed kind, invokes the legacy `mark_object` callback
//! (`spec.md` §4.9). References tagged cons or symbol are skipped; the
//! moving pools own those directly. This keeps the legacy mark-sweep heap
//! (still responsible for strings, vectors, and opaque/misc objects during
//! the transition period, `spec.md` §9) conservative even though it no
//! longer traces moving objects itself.

use crate::format::{read_cons_refs, read_symbol_refs};
use crate::mpm::Mpm;
use crate::pool::ManagedPools;
use crate::value::{Tag, TaggedRef};

/// Walk every live object in both managed pools, invoking `mark_object` for
/// every reference whose tag is legacy-managed (string, vector, misc).
///
/// Invoked from the legacy collector's root phase, typically under arena
/// parking so the pool walk does not race a concurrent trace.
pub fn mark_old_objects_referenced_from_pools<M: Mpm>(
    mpm: &M,
    pools: &ManagedPools,
    mut mark_object: impl FnMut(TaggedRef),
) {
    let mut visit = |r: TaggedRef| {
        if let Some(tag) = r.tag() {
            if !matches!(tag, Tag::Int | Tag::Cons | Tag::Symbol) {
                mark_object(r);
            }
        }
    };

    for addr in mpm.pool_objects(pools.cons_pool) {
        // SAFETY: `pool_objects` only returns addresses of currently-live,
        // non-forwarded, non-padding blocks in this pool.
        let refs = unsafe { read_cons_refs(addr) };
        for r in refs {
            visit(r);
        }
    }

    for addr in mpm.pool_objects(pools.symbol_pool) {
        // SAFETY: as above.
        let refs = unsafe { read_symbol_refs(addr) };
        for r in refs {
            visit(r);
        }
    }

    log::debug!("legacy-mark bridge pass complete");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alloc::make_cons;
    use crate::config::IgcConfig;
    use crate::mpm::sim::SimMpm;
    use crate::pool::create_managed_pools;
    use std::cell::RefCell;

    #[test]
    fn legacy_managed_references_are_marked() {
        let mpm = SimMpm::new();
        mpm.create_arena().unwrap();
        let config = IgcConfig::default();
        let pools = create_managed_pools(&mpm, &config).unwrap();
        let ap = mpm.create_ap(pools.cons_pool).unwrap();

        let legacy_value = TaggedRef::from_untagged(0x4000, Tag::String);
        let cons = make_cons(&mpm, &ap, &config, legacy_value, TaggedRef::NIL).unwrap();
        let _ = cons;

        let marked = RefCell::new(Vec::new());
        mark_old_objects_referenced_from_pools(&mpm, &pools, |r| marked.borrow_mut().push(r));

        assert!(marked.borrow().iter().any(|r| r.untagged() == 0x4000));
    }

    #[test]
    fn moving_pool_tags_are_not_forwarded_to_legacy_marker() {
        let mpm = SimMpm::new();
        mpm.create_arena().unwrap();
        let config = IgcConfig::default();
        let pools = create_managed_pools(&mpm, &config).unwrap();
        let ap = mpm.create_ap(pools.cons_pool).unwrap();

        let inner = make_cons(&mpm, &ap, &config, TaggedRef::from_int(1), TaggedRef::NIL).unwrap();
        let _outer = make_cons(&mpm, &ap, &config, inner, TaggedRef::NIL).unwrap();

        let marked = RefCell::new(Vec::new());
        mark_old_objects_referenced_from_pools(&mpm, &pools, |r| marked.borrow_mut().push(r));

        assert!(marked.borrow().is_empty());
    }
}
