//! MPM Contract - the General-Purpose Memory Pool Manager Interface
//!
//! `spec.md` §1 and §6 treat the underlying memory-pool manager as an
//! external collaborator: the core only needs a narrow contract from it
//! (arena/pool/format/root creation, allocation points, park/release,
//! incremental stepping, finalization messages). No Rust binding for a
//! real production memory pool manager is vendored by this crate; the
//! contract is expressed as the [`Mpm`] trait so a host can supply its own
//! implementation, and [`sim`] gives this crate a fully safe, in-process
//! reference implementation to build and test against.

use crate::error::Result;
use std::time::Duration;

/// Opaque identifier for a generation chain created via
/// [`Mpm::create_chain`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChainId(pub usize);

/// Opaque identifier for a pool created via [`Mpm::create_pool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PoolId(pub usize);

/// Which pool class to create a pool with (`spec.md` §6: "pool classes:
/// automatic mark-sweep (non-moving) ... with optional debug variant").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolClass {
    /// Non-moving mark-sweep, used for both managed pools during the
    /// transition period (`spec.md` §9).
    AutomaticMarkSweep,
    /// Same, but with fencepost/poison instrumentation enabled
    /// (`IGC_DEBUG_POOL`).
    DebugMarkSweep,
}

/// Format descriptor handed to [`Mpm::create_pool`]: the function pointers
/// the MPM invokes on any block belonging to that pool (`spec.md` §3
/// "Object Format").
pub struct FormatDesc {
    pub alignment: usize,
    pub object_size: usize,
    pub scan: ScanFn,
    pub skip: SkipFn,
    pub forward: ForwardFn,
    pub is_forwarded: IsForwardedFn,
    pub pad: PadFn,
}

pub type ScanFn = fn(&mut dyn ScanState, base: usize, limit: usize) -> Result<()>;
pub type SkipFn = fn(addr: usize) -> usize;
pub type ForwardFn = fn(old: usize, new: usize);
pub type IsForwardedFn = fn(addr: usize) -> Option<usize>;
pub type PadFn = fn(addr: usize, size: usize);

/// Scan-time handle passed into a format's `scan` function. `fix1`/`fix2`
/// mirror the two-step protocol `spec.md` §4.1 describes: `fix1` asks
/// whether an address is interesting, `fix2` asks the MPM to fix it
/// (returning the new address, possibly unchanged).
pub trait ScanState {
    /// `spec.md` §4.1 step 4: is this address interesting to the MPM
    /// (i.e. does it fall in a to-be-scanned region)?
    fn fix1(&mut self, addr: usize) -> bool;

    /// `spec.md` §4.1 step 5: fix the address, returning its (possibly
    /// moved) replacement.
    fn fix2(&mut self, addr: usize) -> usize;
}

/// A region root's scan callback (`spec.md` §4.4 root shapes: generic
/// memory area, staticvec, face table, glyph row matrix).
pub type AreaScanFn = fn(&mut dyn ScanState, start: usize, end: usize) -> Result<()>;

/// Finalization message drained by [`Mpm::poll_finalization`] /
/// `finalize::handle_messages` (`spec.md` §4.8).
#[derive(Debug, Clone, Copy)]
pub struct FinalizationMessage {
    pub referent: usize,
}

/// Occupancy snapshot for one pool, used by `stats::ArenaStats` and
/// `Arena::health_check` (`spec.md` §4.13, added). Mirrors the kind of
/// figures a real MPM reports via `mps_pool_total_size`/`mps_pool_free_size`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PoolStats {
    pub used: usize,
    pub capacity: usize,
}

/// The contract this core requires from the underlying memory pool
/// manager. Every method corresponds to a bullet in `spec.md` §6's
/// "Required MPM contract" list.
pub trait Mpm: Send + Sync {
    /// Opaque handle to an MPM-side root object (`spec.md` §3 "Root
    /// Handle": `mps_root`).
    type Root: Clone + Send + Sync;
    /// Opaque handle to an allocation point (`spec.md` §3 "Allocation
    /// Point").
    type Ap: Send;
    /// Opaque handle to a thread registration (`spec.md` §3 "Thread
    /// Handle": `mps_thread`).
    type Thread: Clone + Send + Sync;

    /// Create the arena. Called once by `arena::init`.
    fn create_arena(&self) -> Result<()>;

    /// Create a generation chain from `(capacity, mortality)` pairs
    /// (`spec.md` §4.3).
    fn create_chain(&self, generations: &[crate::config::GenerationDesc]) -> Result<ChainId>;

    /// Create a pool of the given class, bound to `chain` and `format`.
    fn create_pool(&self, chain: ChainId, class: PoolClass, format: FormatDesc) -> Result<PoolId>;

    /// Create an allocation point bound to `pool`. APs are never shared
    /// across threads (`spec.md` §3).
    fn create_ap(&self, pool: PoolId) -> Result<Self::Ap>;

    /// Destroy an allocation point (used by `thread_remove`).
    fn destroy_ap(&self, ap: Self::Ap);

    /// Reserve `size` bytes from `ap`. May return a block the collector
    /// ignores until [`Mpm::commit`] succeeds (`spec.md` §4.6).
    fn reserve(&self, ap: &Self::Ap, size: usize) -> Result<usize>;

    /// Attempt to commit a previous reservation. `false` means the
    /// reservation is invalid and must be redone from `reserve`.
    fn commit(&self, ap: &Self::Ap, addr: usize, size: usize) -> bool;

    /// Register the calling thread with the MPM.
    fn register_thread(&self, cold_stack_base: usize) -> Result<Self::Thread>;

    /// Deregister a previously registered thread.
    fn deregister_thread(&self, thread: Self::Thread);

    /// Register an ambiguous root over `[start, end)` with the given tag
    /// mask (`spec.md` §4.4: "any word-aligned pattern that looks like a
    /// tagged heap pointer pins the object").
    fn register_ambiguous_root(&self, start: usize, end: usize, tag_mask: u64) -> Result<Self::Root>;

    /// Register a thread-tagged stack root over `[cold, hot)`.
    fn register_thread_root(
        &self,
        thread: &Self::Thread,
        cold: usize,
        hot: usize,
        tag_mask: u64,
    ) -> Result<Self::Root>;

    /// Register an area root with a user-supplied scanner (used for the
    /// face table / glyph row matrix / staticvec shapes).
    fn register_area_root(&self, start: usize, end: usize, scan: AreaScanFn) -> Result<Self::Root>;

    /// Destroy a previously registered root.
    fn destroy_root(&self, root: Self::Root);

    /// Pause the collector so the mutator may mutate collector-visible
    /// registries without racing a concurrent scan (`spec.md` §5).
    fn park(&self);

    /// Resume the collector after [`Mpm::park`].
    fn release(&self);

    /// Perform up to `budget` of incremental collection work. Returns
    /// `true` if there is more work remaining.
    fn step(&self, budget: Duration) -> bool;

    /// Enable the finalization message type (`spec.md` §4.3).
    fn enable_finalization(&self) -> Result<()>;

    /// Dequeue one pending finalization message, if any.
    fn poll_finalization(&self) -> Option<FinalizationMessage>;

    /// Register `addr` for finalization; when it becomes unreachable a
    /// [`FinalizationMessage`] is queued.
    fn register_for_finalization(&self, addr: usize) -> Result<()>;

    /// Enumerate the addresses of every currently-live object in `pool`.
    /// Mirrors a real MPM's formatted-object walk
    /// (`mps_arena_formatted_objects_walk`); used only by the legacy-mark
    /// bridge (`spec.md` §4.9), which must inspect pool contents directly
    /// rather than through the ordinary scan/fix protocol.
    fn pool_objects(&self, pool: PoolId) -> Vec<usize>;

    /// Occupancy of `pool`, used for diagnostics and health checks
    /// (`spec.md` §4.13, added).
    fn pool_stats(&self, pool: PoolId) -> PoolStats;

    /// Base address of `pool`'s backing storage. Used exactly once, at
    /// init, to set `value::symbol_array_base` to the symbol pool's own
    /// base address (`spec.md` §3: symbol references are offsets "into a
    /// known base array"; in this core that array *is* the symbol pool's
    /// backing storage, so every symbol reference, whether pool-allocated
    /// by `alloc_symbol` or pre-existing at pdump load, resolves through
    /// the same base; see `pool::create_managed_pools`).
    fn pool_base(&self, pool: PoolId) -> usize;

    /// Tear down the arena. Called once at process exit.
    fn destroy_arena(&self);
}

pub mod sim;
