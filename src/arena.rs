//! Arena
//!
//! The process-wide singleton tying every other component together
//! (`spec.md` §3 "Arena", §9 "Global singleton state"). Unlike the
//! original C source, which stores one arena in a well-known static, this
//! crate is generic over the `Mpm` implementation so it can be exercised
//! against `mpm::sim::SimMpm` in tests and benches without a real
//! out-of-process memory pool manager; an embedder that wants a literal
//! process-wide static simply stores its own `Arc<Arena<ProductionMpm>>`
//! in a `OnceLock` at the call site (see `DESIGN.md`).

use crate::alloc::{self, AmbigAllocs};
use crate::config::IgcConfig;
use crate::error::Result;
use crate::finalize::{FinalizerFn, Finalizers};
use crate::mpm::Mpm;
use crate::pool::{create_managed_pools, ManagedPools};
use crate::roots::Roots;
use crate::stats::{check_pool_utilization, ArenaStats, HealthCheck};
use crate::threads::{ThreadId, Threads};
use crate::value::{TaggedRef, TAG_MASK};
use indexmap::IndexMap;
use parking_lot::Mutex;
use std::sync::Arc;

pub struct Arena<M: Mpm> {
    pub(crate) mpm: M,
    pub(crate) config: IgcConfig,
    pub(crate) pools: ManagedPools,
    pub(crate) roots: Mutex<Roots<M>>,
    pub(crate) threads: Mutex<Threads<M>>,
    pub(crate) ambig_allocs: Mutex<AmbigAllocs>,
    pub(crate) finalizers: Finalizers,
    pub(crate) stats: Mutex<ArenaStats>,
}

impl<M: Mpm> Arena<M> {
    /// Create the arena, pools, and static roots, then add the main
    /// thread (`spec.md` §6 `init()`). `main_cold`/`main_sp` are the
    /// control-stack extremum and current stack pointer of the calling
    /// (main) thread. `value::symbol_array_base` is set as a side effect
    /// of `create_managed_pools` to the symbol pool's own backing address,
    /// not supplied here (see `pool::create_managed_pools` and `DESIGN.md`).
    /// Tearing the arena down at exit is the caller's responsibility via
    /// [`Arena::free`]; this crate does not register its own `atexit`
    /// handler, since Rust has no portable equivalent and the host almost
    /// certainly already runs its own shutdown sequence.
    pub fn init(mpm: M, config: IgcConfig, main_cold: usize, main_sp: usize) -> Result<Arc<Self>> {
        config.validate()?;
        mpm.create_arena()?;
        let pools = create_managed_pools(&mpm, &config)?;

        let arena = Arc::new(Self {
            mpm,
            config,
            pools,
            roots: Mutex::new(Roots::new()),
            threads: Mutex::new(Threads::new()),
            ambig_allocs: Mutex::new(AmbigAllocs::new()),
            finalizers: Finalizers::new(),
            stats: Mutex::new(ArenaStats::new()),
        });

        {
            let mut threads = arena.threads.lock();
            let mut roots = arena.roots.lock();
            threads.thread_add(&arena.mpm, &mut roots, &arena.pools, main_cold, main_sp, TAG_MASK)?;
        }

        log::info!("arena initialized");
        Ok(arena)
    }

    /// Tear down the arena: drop every root, then destroy the underlying
    /// MPM arena. Called once at process exit (`spec.md` §3).
    pub fn free(&self) {
        self.roots.lock().remove_all_roots(&self.mpm);
        self.mpm.destroy_arena();
        log::info!("arena torn down");
    }

    pub fn mpm(&self) -> &M {
        &self.mpm
    }

    pub fn config(&self) -> &IgcConfig {
        &self.config
    }

    pub fn pools(&self) -> &ManagedPools {
        &self.pools
    }

    /// `thread_add(cold)` (`spec.md` §4.5), bound to this arena's pools.
    pub fn thread_add(&self, cold: usize, current_sp: usize) -> Result<ThreadId> {
        let mut threads = self.threads.lock();
        let mut roots = self.roots.lock();
        threads.thread_add(&self.mpm, &mut roots, &self.pools, cold, current_sp, TAG_MASK)
    }

    pub fn thread_remove(&self, thread: ThreadId) -> Result<()> {
        let mut threads = self.threads.lock();
        let mut roots = self.roots.lock();
        threads.thread_remove(&self.mpm, &mut roots, thread)
    }

    /// `make_cons(car, cdr)` on behalf of `thread`.
    pub fn make_cons(&self, thread: ThreadId, car: TaggedRef, cdr: TaggedRef) -> Result<TaggedRef> {
        let threads = self.threads.lock();
        let handle = threads.get(thread)?;
        let result = alloc::make_cons(&self.mpm, &handle.cons_ap, &self.config, car, cdr)?;
        self.stats
            .lock()
            .record_cons_allocated(std::mem::size_of::<crate::value::Cons>() as u64);
        Ok(result)
    }

    /// `alloc_symbol()` on behalf of `thread`.
    pub fn alloc_symbol(&self, thread: ThreadId) -> Result<TaggedRef> {
        let threads = self.threads.lock();
        let handle = threads.get(thread)?;
        let result = alloc::alloc_symbol(&self.mpm, &handle.symbol_ap, &self.config)?;
        self.stats
            .lock()
            .record_symbol_allocated(std::mem::size_of::<crate::value::Symbol>() as u64);
        Ok(result)
    }

    /// Register `addr` for single-shot finalization: `f` runs once,
    /// exactly when `addr` becomes unreachable (`spec.md` §4.8).
    pub fn register_for_finalization(&self, addr: usize, f: FinalizerFn) -> Result<()> {
        self.mpm.register_for_finalization(addr)?;
        self.finalizers.insert(addr, f);
        Ok(())
    }

    /// `handle_messages()` (`spec.md` §4.7, §4.8): drain the finalization
    /// queue. Returns the number of finalizers invoked.
    pub fn handle_messages(&self) -> usize {
        let run = self.finalizers.handle_messages(&self.mpm);
        if run > 0 {
            let mut stats = self.stats.lock();
            for _ in 0..run {
                stats.record_finalizer_run();
            }
        }
        run
    }

    /// Diagnostics snapshot combining running counters with current
    /// registry sizes (`spec.md` §4.13, added).
    pub fn diagnostics(&self) -> IndexMap<String, String> {
        let mut map = self.stats.lock().diagnostics();
        map.insert("live_roots".to_string(), self.roots.lock().len().to_string());
        map.insert("live_threads".to_string(), self.threads.lock().len().to_string());
        map.insert(
            "pending_finalizers".to_string(),
            self.finalizers.len().to_string(),
        );
        let cons_stats = self.mpm.pool_stats(self.pools.cons_pool);
        let symbol_stats = self.mpm.pool_stats(self.pools.symbol_pool);
        map.insert(
            "cons_pool_used_bytes".to_string(),
            cons_stats.used.to_string(),
        );
        map.insert(
            "symbol_pool_used_bytes".to_string(),
            symbol_stats.used.to_string(),
        );
        map
    }

    /// Threshold-based health check over both managed pools
    /// (`spec.md` §4.13, added): warns at 75% utilization, flags an issue
    /// at 90%.
    pub fn health_check(&self) -> HealthCheck {
        let mut health = HealthCheck::default();
        let cons_stats = self.mpm.pool_stats(self.pools.cons_pool);
        let symbol_stats = self.mpm.pool_stats(self.pools.symbol_pool);
        check_pool_utilization("cons", cons_stats.used, cons_stats.capacity, &mut health);
        check_pool_utilization("symbol", symbol_stats.used, symbol_stats.capacity, &mut health);
        health
    }
}
