//! Root Registry
//!
//! A collection of root handles; each handle owns one MPM root object and
//! carries the address range it covers (`spec.md` §4.4). Represented here
//! as an `IndexMap` keyed by a monotonic id rather than a hand-rolled
//! doubly linked list. The spec's "doubly linked collection" is an
//! implementation detail of the original C source, not an externally
//! observable property; insertion order and O(1) lookup-by-id are what the
//! operations below actually need.
//!
//! The registry is NOT thread-safe on its own: callers serialize mutation
//! either through the host's global lock or through arena parking
//! (`spec.md` §4.4, §5). `Arena` wraps it in a `Mutex` accordingly.

use crate::error::{IgcError, Result};
use crate::mpm::Mpm;
use indexmap::IndexMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RootId(pub usize);

pub struct RootHandle<M: Mpm> {
    pub id: RootId,
    pub mpm_root: M::Root,
    pub start: usize,
    pub end: usize,
}

pub struct Roots<M: Mpm> {
    handles: IndexMap<usize, RootHandle<M>>,
    next_id: usize,
}

impl<M: Mpm> Roots<M> {
    pub fn new() -> Self {
        Self {
            handles: IndexMap::new(),
            next_id: 1,
        }
    }

    fn overlaps(&self, start: usize, end: usize) -> bool {
        self.handles
            .values()
            .any(|h| start < h.end && h.start < end)
    }

    /// Push a new handle, rejecting it if it overlaps a live root
    /// (`spec.md` §4.4 invariant: no two live handles cover overlapping
    /// ranges).
    pub fn register_root(&mut self, mpm_root: M::Root, start: usize, end: usize) -> Result<RootId> {
        if start > end {
            return Err(IgcError::InvalidArgument(format!(
                "root range start {start:#x} exceeds end {end:#x}"
            )));
        }
        if self.overlaps(start, end) {
            return Err(IgcError::RootOverlap { start, end });
        }
        let id = RootId(self.next_id);
        self.next_id += 1;
        self.handles.insert(
            id.0,
            RootHandle {
                id,
                mpm_root,
                start,
                end,
            },
        );
        log::debug!("registered root {:?} [{:#x}, {:#x})", id, start, end);
        Ok(id)
    }

    /// Unlink and free the handle, returning its underlying MPM root so the
    /// caller can destroy it.
    pub fn deregister_root(&mut self, id: RootId) -> Result<M::Root> {
        self.handles
            .shift_remove(&id.0)
            .map(|h| h.mpm_root)
            .ok_or(IgcError::RootNotFound(id.0))
    }

    /// Deregister and destroy in one step.
    pub fn remove_root(&mut self, mpm: &M, id: RootId) -> Result<()> {
        let root = self.deregister_root(id)?;
        mpm.destroy_root(root);
        log::debug!("removed root {:?}", id);
        Ok(())
    }

    /// Linear search for the handle starting at `start`.
    pub fn find_root_with_start(&self, start: usize) -> Option<RootId> {
        self.handles
            .values()
            .find(|h| h.start == start)
            .map(|h| h.id)
    }

    /// Drain every root, destroying each with the MPM.
    pub fn remove_all_roots(&mut self, mpm: &M) {
        for (_, handle) in self.handles.drain(..) {
            mpm.destroy_root(handle.mpm_root);
        }
    }

    /// Read-only snapshot of currently registered handles, for diagnostics
    /// (`Arena::diagnostics`, added per `spec.md` §4.4).
    pub fn iter(&self) -> impl Iterator<Item = &RootHandle<M>> {
        self.handles.values()
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

impl<M: Mpm> Default for Roots<M> {
    fn default() -> Self {
        Self::new()
    }
}
