//! Shared fixture for integration tests: boots an `Arena` over a fresh
//! `mpm::sim::SimMpm` with a small heap.

use igc::arena::Arena;
use igc::config::{GenerationDesc, IgcConfig};
use igc::mpm::sim::SimMpm;
use igc::threads::ThreadId;
use std::sync::Arc;

pub struct ArenaFixture {
    pub arena: Arc<Arena<SimMpm>>,
    pub main_thread: ThreadId,
}

impl ArenaFixture {
    /// Boot an arena with a small two-generation chain so tests can
    /// trigger collections without allocating megabytes of conses.
    pub fn new() -> Self {
        init_test_logging();

        let config = IgcConfig {
            generations: vec![GenerationDesc::new(4096, 0.8), GenerationDesc::new(16384, 0.4)],
            ..IgcConfig::default()
        };

        // `mpm::sim`'s conservative scan dereferences every word in every
        // registered root during a trace, including the main thread's stack
        // root installed by `Arena::init`. Unlike a real host's control
        // stack, these bounds must cover real, readable memory rather than a
        // nominal address range. A leaked zeroed buffer stands in for the
        // stack; its zero words never satisfy `fix1` (nothing in the
        // pools is mapped at address 0), so it contributes no false roots.
        let stack = Box::leak(vec![0u8; 4096].into_boxed_slice());
        let cold = stack.as_ptr() as usize;
        let sp = cold + stack.len();

        let mpm = SimMpm::new();
        let arena = Arena::init(mpm, config, cold, sp).expect("arena init");
        let main_thread = ThreadId(1);

        Self { arena, main_thread }
    }

    pub fn force_collection(&self) {
        self.arena.mpm().step(std::time::Duration::from_millis(10));
    }
}

impl Default for ArenaFixture {
    fn default() -> Self {
        Self::new()
    }
}

fn init_test_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}
