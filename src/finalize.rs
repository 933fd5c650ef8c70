//! Finalization Pump
//!
//! Drains the MPM's finalization message queue and invokes user-defined
//! finalizers (`spec.md` §4.8). The finalizer function slot is cleared
//! before invocation, so re-finalization of the same object is impossible
//! even if the finalizer resurrects it; a finalizer may register a new
//! object but must not re-register itself (`spec.md` §9 Open Question,
//! resolved in `DESIGN.md`: single-shot is the implemented behavior).

use crate::mpm::Mpm;
use parking_lot::Mutex;
use std::collections::HashMap;

/// A host-supplied callable invoked once when its referent becomes
/// unreachable. Boxed as `FnMut` rather than `FnOnce` only because it must
/// live in a map keyed by address until it fires; the pump still calls it
/// at most once by removing it from the map first.
pub type FinalizerFn = Box<dyn FnMut() + Send>;

/// Registry of pending finalizers, keyed by referent address.
#[derive(Default)]
pub struct Finalizers {
    pending: Mutex<HashMap<usize, FinalizerFn>>,
}

impl Finalizers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `f` to run when `addr` is finalized. The caller is
    /// responsible for also calling `Mpm::register_for_finalization(addr)`.
    pub fn insert(&self, addr: usize, f: FinalizerFn) {
        self.pending.lock().insert(addr, f);
    }

    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }

    /// Drain every pending finalization message and run its finalizer, if
    /// any is still registered. Returns the number of finalizers invoked.
    pub fn handle_messages<M: Mpm>(&self, mpm: &M) -> usize {
        let mut run = 0;
        while let Some(message) = mpm.poll_finalization() {
            // Clear the slot before invoking: a finalizer that resurrects
            // its own referent and re-registers it must not find its old
            // finalizer still attached.
            let finalizer = self.pending.lock().remove(&message.referent);
            if let Some(mut f) = finalizer {
                log::info!("running finalizer for {:#x}", message.referent);
                f();
                run += 1;
            } else {
                log::debug!(
                    "finalization message for {:#x} with no registered finalizer",
                    message.referent
                );
            }
        }
        run
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mpm::sim::SimMpm;
    use crate::mpm::{FormatDesc, Mpm, PoolClass};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn noop_scan(_ss: &mut dyn crate::mpm::ScanState, _b: usize, _l: usize) -> crate::error::Result<()> {
        Ok(())
    }
    fn noop_skip(a: usize) -> usize {
        a
    }
    fn noop_forward(_o: usize, _n: usize) {}
    fn noop_is_forwarded(_a: usize) -> Option<usize> {
        None
    }
    fn noop_pad(_a: usize, _s: usize) {}

    #[test]
    fn finalizer_runs_exactly_once() {
        let mpm = SimMpm::new();
        mpm.create_arena().unwrap();
        let chain = mpm
            .create_chain(&[crate::config::GenerationDesc::new(4096, 0.8)])
            .unwrap();
        let format = FormatDesc {
            alignment: 8,
            object_size: 16,
            scan: noop_scan,
            skip: noop_skip,
            forward: noop_forward,
            is_forwarded: noop_is_forwarded,
            pad: noop_pad,
        };
        let pool = mpm.create_pool(chain, PoolClass::AutomaticMarkSweep, format).unwrap();
        let ap = mpm.create_ap(pool).unwrap();
        mpm.enable_finalization().unwrap();

        let addr = mpm.reserve(&ap, 16).unwrap();
        assert!(mpm.commit(&ap, addr, 16));
        mpm.register_for_finalization(addr).unwrap();

        let finalizers = Finalizers::new();
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();
        finalizers.insert(
            addr,
            Box::new(move || {
                counter_clone.fetch_add(1, Ordering::SeqCst);
            }),
        );

        // Drop the only root and collect: the object becomes unreachable.
        mpm.step(std::time::Duration::from_millis(1));
        let run = finalizers.handle_messages(&mpm);
        assert_eq!(run, 1);
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        // Further collections must not re-run it.
        mpm.step(std::time::Duration::from_millis(1));
        let run_again = finalizers.handle_messages(&mpm);
        assert_eq!(run_again, 0);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
