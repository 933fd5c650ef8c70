//! Lifecycle Hooks (host-invoked)
//!
//! Public entry points the host calls on specific events (`spec.md` §4.7).
//! Parking discipline ("park; mutate; unpark") is preserved exactly as
//! documented per hook: any hook that may overlap a concurrent scan parks
//! the arena around its registry mutation via [`crate::parking::ParkGuard`].

use crate::arena::Arena;
use crate::error::Result;
use crate::mpm::{AreaScanFn, Mpm};
use crate::parking::ParkGuard;
use crate::roots::RootId;
use crate::threads::ThreadId;
use crate::value::TAG_MASK;

impl<M: Mpm> Arena<M> {
    /// `on_mem_insert(start, end)`: add an ambiguous root covering
    /// `[start, end)`.
    pub fn on_mem_insert(&self, start: usize, end: usize) -> Result<RootId> {
        let mpm_root = self.mpm.register_ambiguous_root(start, end, TAG_MASK)?;
        self.roots.lock().register_root(mpm_root, start, end)
    }

    /// `on_mem_delete(handle)`: remove it.
    pub fn on_mem_delete(&self, handle: RootId) -> Result<()> {
        self.roots.lock().remove_root(&self.mpm, handle)
    }

    /// `on_alloc_main_thread_specpdl()`: install the specpdl root for
    /// `thread`, deferred from `thread_add` until the value-binding stack
    /// exists.
    pub fn on_alloc_main_thread_specpdl(&self, thread: ThreadId, start: usize, end: usize) -> Result<()> {
        let mpm_root = self.mpm.register_ambiguous_root(start, end, TAG_MASK)?;
        let mut roots = self.roots.lock();
        let root_id = roots.register_root(mpm_root, start, end)?;
        drop(roots);
        let mut threads = self.threads.lock();
        threads.get_mut(thread)?.specpdl_root = Some(root_id);
        Ok(())
    }

    /// `on_grow_specpdl()`: park; remove the old specpdl root; install the
    /// new one over the reallocated region; unpark.
    ///
    /// `spec.md` §9 leaves open whether the new root could be installed
    /// before the old one is removed, since the MPM forbids overlapping
    /// roots and the old/new ranges may happen to be disjoint. This
    /// implementation always removes first (see `DESIGN.md`), which is
    /// correct regardless of whether the ranges happen to be disjoint.
    pub fn on_grow_specpdl(&self, thread: ThreadId, new_start: usize, new_end: usize) -> Result<()> {
        let _guard = ParkGuard::acquire(&self.mpm);
        let old_root = {
            let mut threads = self.threads.lock();
            let handle = threads.get_mut(thread)?;
            handle.specpdl_root.take()
        };
        if let Some(old_root) = old_root {
            self.roots.lock().remove_root(&self.mpm, old_root)?;
        }
        let mpm_root = self.mpm.register_ambiguous_root(new_start, new_end, TAG_MASK)?;
        let new_root = self.roots.lock().register_root(mpm_root, new_start, new_end)?;
        self.threads.lock().get_mut(thread)?.specpdl_root = Some(new_root);
        Ok(())
    }

    /// `on_specbinding_unused(b)`: zero the record so no stale reference
    /// survives.
    ///
    /// # Safety
    /// `[addr, addr + size)` must be a writable binding record owned by
    /// the calling thread's specpdl stack.
    pub unsafe fn on_specbinding_unused(&self, addr: usize, size: usize) {
        std::ptr::write_bytes(addr as *mut u8, 0, size);
    }

    /// `on_pdump_loaded()`: add an ambiguous root covering the loaded
    /// image's value section.
    pub fn on_pdump_loaded(&self, start: usize, end: usize) -> Result<RootId> {
        self.on_mem_insert(start, end)
    }

    /// `on_make_face_cache(c)`: install a face-table root. The host
    /// supplies `scan`, its own precise scanner over the face table's
    /// record layout (see `scanners::scan_faces_by_id`); the root itself
    /// is registered as an area root.
    pub fn on_make_face_cache(&self, start: usize, end: usize, scan: AreaScanFn) -> Result<RootId> {
        let mpm_root = self.mpm.register_area_root(start, end, scan)?;
        self.roots.lock().register_root(mpm_root, start, end)
    }

    /// `on_free_face_cache(c)`: remove the face-table root.
    pub fn on_free_face_cache(&self, handle: RootId) -> Result<()> {
        self.roots.lock().remove_root(&self.mpm, handle)
    }

    /// `on_face_cache_change(c)`: park, remove the old face-table root,
    /// install the new one (roots cannot overlap during the cache's
    /// internal reallocation).
    pub fn on_face_cache_change(
        &self,
        old: RootId,
        new_start: usize,
        new_end: usize,
        scan: AreaScanFn,
    ) -> Result<RootId> {
        let _guard = ParkGuard::acquire(&self.mpm);
        self.roots.lock().remove_root(&self.mpm, old)?;
        let mpm_root = self.mpm.register_area_root(new_start, new_end, scan)?;
        self.roots.lock().register_root(mpm_root, new_start, new_end)
    }

    /// `on_adjust_glyph_matrix(m)`: park; replace the matrix root covering
    /// the new rows buffer.
    pub fn on_adjust_glyph_matrix(
        &self,
        old: Option<RootId>,
        new_start: usize,
        new_end: usize,
        scan: AreaScanFn,
    ) -> Result<RootId> {
        let _guard = ParkGuard::acquire(&self.mpm);
        if let Some(old) = old {
            self.roots.lock().remove_root(&self.mpm, old)?;
        }
        let mpm_root = self.mpm.register_area_root(new_start, new_end, scan)?;
        self.roots.lock().register_root(mpm_root, new_start, new_end)
    }

    /// `on_free_glyph_matrix(m)`: remove its root, if any.
    pub fn on_free_glyph_matrix(&self, handle: Option<RootId>) -> Result<()> {
        if let Some(handle) = handle {
            self.roots.lock().remove_root(&self.mpm, handle)?;
        }
        Ok(())
    }

    /// `on_grow_read_stack(old_handle, start, end)`: park; remove old;
    /// install new over the new reader stack.
    pub fn on_grow_read_stack(&self, old: RootId, start: usize, end: usize) -> Result<RootId> {
        let _guard = ParkGuard::acquire(&self.mpm);
        self.roots.lock().remove_root(&self.mpm, old)?;
        let mpm_root = self.mpm.register_ambiguous_root(start, end, TAG_MASK)?;
        self.roots.lock().register_root(mpm_root, start, end)
    }

    /// `on_idle()`: ask the MPM to do up to the configured time budget
    /// (default ≈10 ms) of incremental work. Returns whether more work
    /// remains.
    pub fn on_idle(&self) -> bool {
        let budget = self.config.idle_budget;
        let more_work = self.mpm.step(budget);
        self.stats.lock().record_cycle(budget);
        log::trace!("on_idle: {:?} budget spent, more_work={}", budget, more_work);
        more_work
    }

    /// `inhibit_garbage_collection()`: park the arena and return a guard
    /// that releases it on drop, covering every exit path including a
    /// panicking unwind (`spec.md` §4.7, §5).
    pub fn inhibit_garbage_collection(&self) -> ParkGuard<'_, M> {
        ParkGuard::acquire(&self.mpm)
    }
}
