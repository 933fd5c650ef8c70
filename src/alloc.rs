//! Allocation API
//!
//! `make_cons`, `alloc_symbol`, and the ambiguous-root-backed allocator
//! (`spec.md` §4.6). Every entry point here follows the reserve/commit/
//! retry discipline: between reserve and commit the block is invisible to
//! the collector, so a failed commit invalidates the reservation outright
//! and the whole cycle must restart from `reserve`. Holding onto the
//! stale pointer across a failed commit is UB (`spec.md` §4.6, §5).

use crate::config::IgcConfig;
use crate::error::{IgcError, Result};
use crate::mpm::Mpm;
use crate::roots::{RootId, Roots};
use crate::value::{Cons, Symbol, Tag, TaggedRef};
use std::collections::HashMap;
use std::mem::size_of;

/// `make_cons(car, cdr)`: reserve `sizeof(cons)`, write the two words,
/// commit, retrying the whole cycle on commit failure.
pub fn make_cons<M: Mpm>(
    mpm: &M,
    ap: &M::Ap,
    config: &IgcConfig,
    car: TaggedRef,
    cdr: TaggedRef,
) -> Result<TaggedRef> {
    let size = size_of::<Cons>();
    for attempt in 1..=config.max_commit_retries {
        let addr = mpm.reserve(ap, size)?;
        // SAFETY: `reserve` guarantees `addr` is writable for `size` bytes
        // and ignored by the collector until `commit` succeeds.
        unsafe {
            (addr as *mut Cons).write(Cons { car, cdr });
        }
        if mpm.commit(ap, addr, size) {
            log::trace!("make_cons committed at {:#x} (attempt {attempt})", addr);
            return Ok(TaggedRef::from_untagged(addr as u64, Tag::Cons));
        }
        log::warn!("make_cons commit failed, retrying (attempt {attempt})");
    }
    Err(IgcError::CommitFailed {
        attempts: config.max_commit_retries,
    })
}

/// `alloc_symbol()`: reserve `sizeof(symbol)`, leave contents
/// uninitialized bar a safe default, commit, retrying on failure. The
/// caller is expected to overwrite every field.
///
/// Unlike `make_cons`, the returned reference's untagged bits are an
/// *offset* from `symbol_array_base`, not the reserved address itself
/// (`spec.md` §3, §4.1): the symbol pool's backing storage is set as the
/// symbol array's base at pool-creation time (`pool::create_managed_pools`),
/// so this conversion always succeeds for an address this function itself
/// just reserved from that same pool.
pub fn alloc_symbol<M: Mpm>(mpm: &M, ap: &M::Ap, config: &IgcConfig) -> Result<TaggedRef> {
    let size = size_of::<Symbol>();
    for attempt in 1..=config.max_commit_retries {
        let addr = mpm.reserve(ap, size)?;
        unsafe {
            (addr as *mut Symbol).write(Symbol::uninit());
        }
        if mpm.commit(ap, addr, size) {
            let offset = crate::value::symbol_address_to_offset(addr).ok_or_else(|| {
                IgcError::Internal(
                    "alloc_symbol: reserved address precedes symbol_array_base".into(),
                )
            })?;
            log::trace!("alloc_symbol committed at {:#x} (attempt {attempt})", addr);
            return Ok(TaggedRef::from_untagged(offset, Tag::Symbol));
        }
        log::warn!("alloc_symbol commit failed, retrying (attempt {attempt})");
    }
    Err(IgcError::CommitFailed {
        attempts: config.max_commit_retries,
    })
}

/// Book-keeping for `xalloc_ambig_root`/`xfree_ambig_root`: the host's
/// ordinary allocator doesn't track root ids, so this crate owns the
/// mapping from base address to both the backing allocation and the root
/// it was registered as.
#[derive(Default)]
pub struct AmbigAllocs {
    allocations: HashMap<usize, (Box<[u8]>, RootId)>,
}

impl AmbigAllocs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.allocations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.allocations.is_empty()
    }
}

const AMBIG_ROOT_TAG_MASK: u64 = crate::value::TAG_MASK;

/// `xalloc_ambig_root(size)`: zero-fill a `size`-byte region from the
/// host's ordinary allocator, register it as an ambiguous root, and return
/// its base address.
pub fn xalloc_ambig_root<M: Mpm>(
    mpm: &M,
    roots: &mut Roots<M>,
    allocs: &mut AmbigAllocs,
    size: usize,
) -> Result<usize> {
    let mut buf: Box<[u8]> = vec![0u8; size].into_boxed_slice();
    let base = buf.as_mut_ptr() as usize;
    let end = base + size;
    let mpm_root = mpm.register_ambiguous_root(base, end, AMBIG_ROOT_TAG_MASK)?;
    let root_id = roots.register_root(mpm_root, base, end)?;
    allocs.allocations.insert(base, (buf, root_id));
    log::debug!("xalloc_ambig_root: [{:#x}, {:#x})", base, end);
    Ok(base)
}

/// `xfree_ambig_root(p)`: look up the root by start address, remove it,
/// and release the backing allocation.
pub fn xfree_ambig_root<M: Mpm>(
    mpm: &M,
    roots: &mut Roots<M>,
    allocs: &mut AmbigAllocs,
    base: usize,
) -> Result<()> {
    let (_, root_id) = allocs
        .allocations
        .remove(&base)
        .ok_or_else(|| IgcError::InvalidArgument(format!("no ambiguous root at {base:#x}")))?;
    roots.remove_root(mpm, root_id)?;
    log::debug!("xfree_ambig_root: {:#x}", base);
    Ok(())
}

/// `xrealloc_ambig_root` (added, §4.6): the copy-then-swap helper the
/// original source inlines at every growth call site
/// (`igc_on_grow_specpdl`, `igc_on_grow_read_stack`): allocate a new
/// region, copy the old contents in, install the new root, then free the
/// old one. Callers are responsible for parking the arena around this
/// call when it may race a concurrent scan (`hooks::on_grow_specpdl`,
/// `hooks::on_grow_read_stack` do so).
pub fn xrealloc_ambig_root<M: Mpm>(
    mpm: &M,
    roots: &mut Roots<M>,
    allocs: &mut AmbigAllocs,
    old_base: usize,
    new_size: usize,
) -> Result<usize> {
    let new_base = xalloc_ambig_root(mpm, roots, allocs, new_size)?;

    let old_len = allocs
        .allocations
        .get(&old_base)
        .map(|(buf, _)| buf.len())
        .ok_or_else(|| IgcError::InvalidArgument(format!("no ambiguous root at {old_base:#x}")))?;
    let copy_len = old_len.min(new_size);

    // SAFETY: both regions are live, non-overlapping heap allocations of at
    // least `copy_len` bytes, held exclusively by `allocs`.
    unsafe {
        std::ptr::copy_nonoverlapping(old_base as *const u8, new_base as *mut u8, copy_len);
    }

    xfree_ambig_root(mpm, roots, allocs, old_base)?;
    log::debug!(
        "xrealloc_ambig_root: {:#x} -> {:#x} ({} bytes copied)",
        old_base,
        new_base,
        copy_len
    );
    Ok(new_base)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mpm::sim::SimMpm;
    use crate::mpm::PoolClass;
    use crate::pool::create_managed_pools;

    #[test]
    fn make_cons_then_alloc_symbol_round_trip() {
        let mpm = SimMpm::new();
        mpm.create_arena().unwrap();
        let config = IgcConfig::default();
        let pools = create_managed_pools(&mpm, &config).unwrap();
        let cons_ap = mpm.create_ap(pools.cons_pool).unwrap();
        let symbol_ap = mpm.create_ap(pools.symbol_pool).unwrap();

        let cons_ref = make_cons(&mpm, &cons_ap, &config, TaggedRef::from_int(1), TaggedRef::from_int(2)).unwrap();
        assert_eq!(cons_ref.tag(), Some(Tag::Cons));

        let sym_ref = alloc_symbol(&mpm, &symbol_ap, &config).unwrap();
        assert_eq!(sym_ref.tag(), Some(Tag::Symbol));
        let _ = PoolClass::AutomaticMarkSweep;
    }

    #[test]
    fn ambiguous_root_alloc_free_round_trip() {
        let mpm = SimMpm::new();
        mpm.create_arena().unwrap();
        let mut roots = Roots::new();
        let mut allocs = AmbigAllocs::new();

        let base = xalloc_ambig_root(&mpm, &mut roots, &mut allocs, 256).unwrap();
        assert_eq!(allocs.len(), 1);
        xfree_ambig_root(&mpm, &mut roots, &mut allocs, base).unwrap();
        assert!(allocs.is_empty());
    }

    #[test]
    fn xrealloc_copies_old_contents() {
        let mpm = SimMpm::new();
        mpm.create_arena().unwrap();
        let mut roots = Roots::new();
        let mut allocs = AmbigAllocs::new();

        let base = xalloc_ambig_root(&mpm, &mut roots, &mut allocs, 16).unwrap();
        unsafe {
            std::ptr::write_bytes(base as *mut u8, 0x42, 16);
        }
        let new_base = xrealloc_ambig_root(&mpm, &mut roots, &mut allocs, base, 32).unwrap();
        let byte = unsafe { *(new_base as *const u8) };
        assert_eq!(byte, 0x42);
        assert_eq!(allocs.len(), 1);
    }
}
