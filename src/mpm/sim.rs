//! Reference MPM - single-process, non-moving simulation
//!
//! Implements the [`Mpm`] trait contract in safe-ish, in-process Rust so
//! this crate's own tests and benches have something to run against
//! without binding to a real out-of-process memory pool manager. Pools are
//! fixed-size bump-allocated backing stores; the trace ("mark") phase
//! walks root records and object formats exactly the way a real MPM would
//! drive `scan`, `fix1`/`fix2`; the "sweep" phase removes unreached
//! addresses from the live set and queues finalization messages for any
//! that were registered for finalization. Pools never move objects
//! (`forward`/`is_forwarded` are exercised for correctness but no object is
//! ever relocated), matching the "automatic mark-sweep (non-moving)" class
//! `spec.md` §4.3 specifies for the transition period.

use crate::config::GenerationDesc;
use crate::error::{IgcError, Result};
use crate::mpm::{
    AreaScanFn, ChainId, FinalizationMessage, FormatDesc, Mpm, PoolClass, PoolId, PoolStats,
    ScanState,
};
use parking_lot::{Mutex, RwLock};
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

/// Default backing-store size per pool: generous enough for the test
/// suite's object counts without needing real growth.
const POOL_BACKING_BYTES: usize = 8 * 1024 * 1024;

struct PoolState {
    chain: ChainId,
    #[allow(dead_code)]
    class: PoolClass,
    format: FormatDesc,
    memory: Box<[u8]>,
    base: usize,
    capacity: usize,
    cursor: AtomicUsize,
    live: Mutex<HashSet<usize>>,
    finalizable: Mutex<HashSet<usize>>,
}

impl PoolState {
    fn contains(&self, addr: usize) -> bool {
        addr >= self.base && addr < self.base + self.capacity
    }
}

enum RootKind {
    Ambiguous { start: usize, end: usize, tag_mask: u64 },
    Thread { cold: usize, hot: usize, tag_mask: u64 },
    Area { start: usize, end: usize, scan: AreaScanFn },
}

struct RootRecord {
    id: usize,
    kind: RootKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SimRootId(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SimThreadId(usize);

pub struct SimAp {
    pool: PoolId,
    pending: Mutex<Option<(usize, usize)>>,
}

/// In-process reference implementation of [`Mpm`].
pub struct SimMpm {
    created: AtomicBool,
    chains: Mutex<Vec<Vec<GenerationDesc>>>,
    pools: RwLock<Vec<PoolState>>,
    roots: Mutex<Vec<RootRecord>>,
    next_root_id: AtomicUsize,
    next_thread_id: AtomicUsize,
    finalization_queue: Mutex<VecDeque<FinalizationMessage>>,
    finalization_enabled: AtomicBool,
    parked: AtomicBool,
    park_depth: AtomicUsize,
    /// Test hook: force the next N commits to fail.
    inject_commit_failures: AtomicUsize,
    /// Test hook: record how many step() calls were made.
    steps_run: AtomicUsize,
}

impl Default for SimMpm {
    fn default() -> Self {
        Self::new()
    }
}

impl SimMpm {
    pub fn new() -> Self {
        Self {
            created: AtomicBool::new(false),
            chains: Mutex::new(Vec::new()),
            pools: RwLock::new(Vec::new()),
            roots: Mutex::new(Vec::new()),
            next_root_id: AtomicUsize::new(1),
            next_thread_id: AtomicUsize::new(1),
            finalization_queue: Mutex::new(VecDeque::new()),
            finalization_enabled: AtomicBool::new(false),
            parked: AtomicBool::new(false),
            park_depth: AtomicUsize::new(0),
            inject_commit_failures: AtomicUsize::new(0),
            steps_run: AtomicUsize::new(0),
        }
    }

    /// Test hook: force the next `n` `commit()` calls to report failure,
    /// exercising the reserve/commit retry loop in `alloc.rs`.
    pub fn inject_commit_failures(&self, n: usize) {
        self.inject_commit_failures.store(n, Ordering::SeqCst);
    }

    pub fn is_parked(&self) -> bool {
        self.parked.load(Ordering::SeqCst)
    }

    pub fn steps_run(&self) -> usize {
        self.steps_run.load(Ordering::Relaxed)
    }

    /// Number of live (reachable-as-of-last-trace) objects across all
    /// pools. Used by tests to observe collection effects.
    pub fn live_object_count(&self) -> usize {
        self.pools.read().iter().map(|p| p.live.lock().len()).sum()
    }

    fn pool_index(&self, pools: &[PoolState], addr: usize) -> Option<usize> {
        pools.iter().position(|p| p.contains(addr))
    }

    /// Run a full trace-and-sweep cycle: scan every registered root,
    /// transitively scan every reachable object via its pool's format,
    /// then drop anything not reached from the live sets and queue
    /// finalization messages for any of those that were registered.
    fn trace_and_sweep(&self) {
        let pools = self.pools.read();
        let mut marked: HashSet<usize> = HashSet::new();
        let mut worklist: VecDeque<usize> = VecDeque::new();

        struct Tracer<'a> {
            pools: &'a [PoolState],
            marked: &'a mut HashSet<usize>,
            worklist: &'a mut VecDeque<usize>,
        }

        impl<'a> ScanState for Tracer<'a> {
            fn fix1(&mut self, addr: usize) -> bool {
                self.pools.iter().any(|p| p.contains(addr))
            }

            fn fix2(&mut self, addr: usize) -> usize {
                if self.marked.insert(addr) {
                    self.worklist.push_back(addr);
                }
                addr
            }
        }

        {
            let roots = self.roots.lock();
            for record in roots.iter() {
                let mut tracer = Tracer {
                    pools: &pools,
                    marked: &mut marked,
                    worklist: &mut worklist,
                };
                match &record.kind {
                    RootKind::Ambiguous { start, end, tag_mask }
                    | RootKind::Thread { cold: start, hot: end, tag_mask } => {
                        scan_conservative(*start, *end, *tag_mask, &mut tracer);
                    }
                    RootKind::Area { start, end, scan } => {
                        let _ = scan(&mut tracer, *start, *end);
                    }
                }
            }
        }

        while let Some(addr) = worklist.pop_front() {
            if let Some(idx) = self.pool_index(&pools, addr) {
                let pool = &pools[idx];
                if !pool.live.lock().contains(&addr) {
                    // Committed-but-not-live addresses are stale ambiguous
                    // hits (conservative scanning false positives); ignore.
                    continue;
                }
                let limit = addr + pool.format.object_size;
                let mut tracer = Tracer {
                    pools: &pools,
                    marked: &mut marked,
                    worklist: &mut worklist,
                };
                let _ = (pool.format.scan)(&mut tracer, addr, limit);
            }
        }

        for pool in pools.iter() {
            let mut live = pool.live.lock();
            let mut finalizable = pool.finalizable.lock();
            let dead: Vec<usize> = live.iter().filter(|a| !marked.contains(*a)).copied().collect();
            for addr in dead {
                live.remove(&addr);
                if finalizable.remove(&addr) && self.finalization_enabled.load(Ordering::SeqCst) {
                    self.finalization_queue
                        .lock()
                        .push_back(FinalizationMessage { referent: addr });
                }
            }
        }
    }
}

/// Conservatively scan `[start, end)` word by word, pinning anything that
/// looks like a tagged heap pointer (`spec.md` §4.4: "any word-aligned
/// pattern that looks like a tagged heap pointer pins the object").
/// `tag_mask` is unused beyond documenting the contract `Mpm::register_*_root`
/// was given; this crate only ever registers `value::TAG_MASK`, so the
/// candidate address is resolved the same way `tag::fix` resolves one,
/// including the symbol tag's offset-into-`symbol_array_base` translation.
/// Ambiguous roots only pin; they never rewrite, so `tag::ambiguous_candidate`
/// (not `tag::fix`) is the right primitive here: there is no `ScanState`
/// mutation to perform on a word that merely happens to look like a
/// reference.
fn scan_conservative(start: usize, end: usize, _tag_mask: u64, tracer: &mut dyn ScanState) {
    let word = std::mem::size_of::<usize>();
    let mut addr = start;
    while addr + word <= end {
        let word_value = unsafe { (addr as *const usize).read_unaligned() } as u64;
        if let Some(candidate) = crate::tag::ambiguous_candidate(crate::value::TaggedRef(word_value)) {
            if tracer.fix1(candidate) {
                tracer.fix2(candidate);
            }
        }
        addr += word;
    }
}

impl Mpm for SimMpm {
    type Root = SimRootId;
    type Ap = SimAp;
    type Thread = SimThreadId;

    fn create_arena(&self) -> Result<()> {
        if self.created.swap(true, Ordering::SeqCst) {
            return Err(IgcError::AlreadyInitialized);
        }
        Ok(())
    }

    fn create_chain(&self, generations: &[GenerationDesc]) -> Result<ChainId> {
        let mut chains = self.chains.lock();
        chains.push(generations.to_vec());
        Ok(ChainId(chains.len() - 1))
    }

    fn create_pool(&self, chain: ChainId, class: PoolClass, format: FormatDesc) -> Result<PoolId> {
        // `Box<[u8]>` only guarantees byte alignment; `format.scan`/`forward`
        // do aligned `Cons`/`Symbol` pointer writes into this backing store,
        // so the slack bytes below let `base` be rounded up to
        // `format.alignment` without running past the allocation. Object
        // sizes reserved from this pool are always rounded up to the same
        // alignment (see `reserve`), so every address handed out stays
        // aligned once `base` itself is.
        let align = format.alignment.max(1);
        let memory = vec![0u8; POOL_BACKING_BYTES + align].into_boxed_slice();
        let raw_base = memory.as_ptr() as usize;
        let base = align_up(raw_base, align);
        let capacity = POOL_BACKING_BYTES;
        let mut pools = self.pools.write();
        pools.push(PoolState {
            chain,
            class,
            format,
            memory,
            base,
            capacity,
            cursor: AtomicUsize::new(0),
            live: Mutex::new(HashSet::new()),
            finalizable: Mutex::new(HashSet::new()),
        });
        Ok(PoolId(pools.len() - 1))
    }

    fn create_ap(&self, pool: PoolId) -> Result<Self::Ap> {
        Ok(SimAp {
            pool,
            pending: Mutex::new(None),
        })
    }

    fn destroy_ap(&self, _ap: Self::Ap) {}

    fn reserve(&self, ap: &Self::Ap, size: usize) -> Result<usize> {
        let pools = self.pools.read();
        let pool = &pools[ap.pool.0];
        let aligned = align_up(size, pool.format.alignment);
        let offset = pool.cursor.fetch_add(aligned, Ordering::SeqCst);
        if offset + aligned > pool.capacity {
            return Err(IgcError::OutOfMemory {
                requested: aligned,
                available: pool.capacity.saturating_sub(offset),
            });
        }
        let addr = pool.base + offset;
        *ap.pending.lock() = Some((addr, aligned));
        Ok(addr)
    }

    fn commit(&self, ap: &Self::Ap, addr: usize, size: usize) -> bool {
        let mut pending = ap.pending.lock();
        if *pending != Some((addr, size)) {
            return false;
        }
        if self
            .inject_commit_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                if n > 0 {
                    Some(n - 1)
                } else {
                    None
                }
            })
            .is_ok()
        {
            return false;
        }
        let pools = self.pools.read();
        pools[ap.pool.0].live.lock().insert(addr);
        *pending = None;
        true
    }

    fn register_thread(&self, _cold_stack_base: usize) -> Result<Self::Thread> {
        Ok(SimThreadId(self.next_thread_id.fetch_add(1, Ordering::SeqCst)))
    }

    fn deregister_thread(&self, _thread: Self::Thread) {}

    fn register_ambiguous_root(&self, start: usize, end: usize, tag_mask: u64) -> Result<Self::Root> {
        let id = self.next_root_id.fetch_add(1, Ordering::SeqCst);
        self.roots.lock().push(RootRecord {
            id,
            kind: RootKind::Ambiguous { start, end, tag_mask },
        });
        Ok(SimRootId(id))
    }

    fn register_thread_root(
        &self,
        _thread: &Self::Thread,
        cold: usize,
        hot: usize,
        tag_mask: u64,
    ) -> Result<Self::Root> {
        let id = self.next_root_id.fetch_add(1, Ordering::SeqCst);
        self.roots.lock().push(RootRecord {
            id,
            kind: RootKind::Thread { cold, hot, tag_mask },
        });
        Ok(SimRootId(id))
    }

    fn register_area_root(&self, start: usize, end: usize, scan: AreaScanFn) -> Result<Self::Root> {
        let id = self.next_root_id.fetch_add(1, Ordering::SeqCst);
        self.roots.lock().push(RootRecord {
            id,
            kind: RootKind::Area { start, end, scan },
        });
        Ok(SimRootId(id))
    }

    fn destroy_root(&self, root: Self::Root) {
        self.roots.lock().retain(|r| r.id != root.0);
    }

    fn park(&self) {
        self.park_depth.fetch_add(1, Ordering::SeqCst);
        self.parked.store(true, Ordering::SeqCst);
    }

    fn release(&self) {
        if self.park_depth.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.parked.store(false, Ordering::SeqCst);
        }
    }

    fn step(&self, _budget: Duration) -> bool {
        if self.is_parked() {
            log::debug!("step() called while parked, no work done");
            return false;
        }
        self.steps_run.fetch_add(1, Ordering::Relaxed);
        self.trace_and_sweep();
        false
    }

    fn enable_finalization(&self) -> Result<()> {
        self.finalization_enabled.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn poll_finalization(&self) -> Option<FinalizationMessage> {
        self.finalization_queue.lock().pop_front()
    }

    fn register_for_finalization(&self, addr: usize) -> Result<()> {
        let pools = self.pools.read();
        let idx = self
            .pool_index(&pools, addr)
            .ok_or_else(|| IgcError::InvalidArgument("address not in any managed pool".into()))?;
        pools[idx].finalizable.lock().insert(addr);
        Ok(())
    }

    fn pool_objects(&self, pool: PoolId) -> Vec<usize> {
        let pools = self.pools.read();
        pools[pool.0].live.lock().iter().copied().collect()
    }

    fn pool_stats(&self, pool: PoolId) -> PoolStats {
        let pools = self.pools.read();
        let p = &pools[pool.0];
        PoolStats {
            used: p.cursor.load(Ordering::SeqCst).min(p.capacity),
            capacity: p.capacity,
        }
    }

    fn pool_base(&self, pool: PoolId) -> usize {
        self.pools.read()[pool.0].base
    }

    fn destroy_arena(&self) {
        self.created.store(false, Ordering::SeqCst);
        self.pools.write().clear();
        self.roots.lock().clear();
    }
}

fn align_up(size: usize, alignment: usize) -> usize {
    (size + alignment - 1) & !(alignment - 1)
}
