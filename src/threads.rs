//! Thread Registry
//!
//! A collection of thread handles; each handle owns an MPM thread
//! registration, a cold stack-base pointer, the root handles covering its
//! control stack and value-binding stack, and one allocation point per
//! managed pool (`spec.md` §3, §4.5).
//!
//! `spec.md`'s Thread Handle field list names only `specpdl_root_handle`
//! explicitly, but `thread_add` step 3 also installs a control-stack root
//! that `thread_remove` must be able to tear down symmetrically; this
//! registry tracks both root ids rather than relying on the MPM to forget
//! the stack root on thread deregistration (see `DESIGN.md`).

use crate::error::{IgcError, Result};
use crate::mpm::Mpm;
use crate::pool::ManagedPools;
use crate::roots::{RootId, Roots};
use indexmap::IndexMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ThreadId(pub usize);

pub struct ThreadHandle<M: Mpm> {
    pub id: ThreadId,
    pub mpm_thread: M::Thread,
    pub cold_stack_base: usize,
    pub stack_root: RootId,
    pub specpdl_root: Option<RootId>,
    pub cons_ap: M::Ap,
    pub symbol_ap: M::Ap,
}

pub struct Threads<M: Mpm> {
    handles: IndexMap<usize, ThreadHandle<M>>,
    next_id: usize,
}

impl<M: Mpm> Threads<M> {
    pub fn new() -> Self {
        Self {
            handles: IndexMap::new(),
            next_id: 1,
        }
    }

    /// `thread_add(cold)` (`spec.md` §4.5): register with the MPM, install
    /// the control-stack root over `[cold, current_sp)` with tagged
    /// scanning, create one allocation point per managed pool, and append
    /// the handle. The value-binding stack root is installed separately by
    /// `on_alloc_main_thread_specpdl` once that stack exists.
    #[allow(clippy::too_many_arguments)]
    pub fn thread_add(
        &mut self,
        mpm: &M,
        roots: &mut Roots<M>,
        pools: &ManagedPools,
        cold: usize,
        current_sp: usize,
        tag_mask: u64,
    ) -> Result<ThreadId> {
        let mpm_thread = mpm.register_thread(cold)?;

        let (stack_start, stack_end) = if cold <= current_sp {
            (cold, current_sp)
        } else {
            (current_sp, cold)
        };
        let mpm_root = mpm
            .register_thread_root(&mpm_thread, stack_start, stack_end, tag_mask)
            .inspect_err(|_| mpm.deregister_thread(mpm_thread.clone()))?;
        let stack_root = roots.register_root(mpm_root, stack_start, stack_end)?;

        let cons_ap = mpm.create_ap(pools.cons_pool)?;
        let symbol_ap = mpm.create_ap(pools.symbol_pool)?;

        let id = ThreadId(self.next_id);
        self.next_id += 1;
        self.handles.insert(
            id.0,
            ThreadHandle {
                id,
                mpm_thread,
                cold_stack_base: cold,
                stack_root,
                specpdl_root: None,
                cons_ap,
                symbol_ap,
            },
        );
        log::info!("thread {:?} registered, cold stack base {:#x}", id, cold);
        Ok(id)
    }

    /// `thread_remove(handle)`: tear down APs first, then deregister with
    /// the MPM, then unlink (`spec.md` §4.5).
    pub fn thread_remove(&mut self, mpm: &M, roots: &mut Roots<M>, id: ThreadId) -> Result<()> {
        let handle = self
            .handles
            .shift_remove(&id.0)
            .ok_or(IgcError::ThreadNotFound(id.0))?;

        mpm.destroy_ap(handle.cons_ap);
        mpm.destroy_ap(handle.symbol_ap);

        roots.remove_root(mpm, handle.stack_root)?;
        if let Some(specpdl_root) = handle.specpdl_root {
            roots.remove_root(mpm, specpdl_root)?;
        }

        mpm.deregister_thread(handle.mpm_thread);
        log::info!("thread {:?} removed", id);
        Ok(())
    }

    pub fn get(&self, id: ThreadId) -> Result<&ThreadHandle<M>> {
        self.handles.get(&id.0).ok_or(IgcError::ThreadNotFound(id.0))
    }

    pub fn get_mut(&mut self, id: ThreadId) -> Result<&mut ThreadHandle<M>> {
        self.handles
            .get_mut(&id.0)
            .ok_or(IgcError::ThreadNotFound(id.0))
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

impl<M: Mpm> Default for Threads<M> {
    fn default() -> Self {
        Self::new()
    }
}
