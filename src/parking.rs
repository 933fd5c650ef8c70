//! Parking
//!
//! Arena parking is the registries' only lock (`spec.md` §4.7, §5): any
//! hook that may overlap a concurrent scan parks the arena, mutates, then
//! releases. `ParkGuard` (added per `spec.md` §5's "scoped acquisition with
//! guaranteed release on all exit paths including failure") is the RAII
//! realization of that discipline, used both internally by hooks that park
//! only for the duration of one mutation and externally by
//! `inhibit_garbage_collection`, whose guard the host holds for an
//! arbitrary scope.

use crate::mpm::Mpm;

/// Holds the arena parked until dropped. Matches `spec.md` §4.7's
/// "park; mutate; unpark" discipline for any hook documented that way, and
/// backs `Arena::inhibit_garbage_collection`'s returned token.
pub struct ParkGuard<'a, M: Mpm> {
    mpm: &'a M,
}

impl<'a, M: Mpm> ParkGuard<'a, M> {
    /// Park `mpm` and return a guard that releases it on drop.
    pub fn acquire(mpm: &'a M) -> Self {
        mpm.park();
        log::debug!("arena parked");
        ParkGuard { mpm }
    }
}

impl<'a, M: Mpm> Drop for ParkGuard<'a, M> {
    fn drop(&mut self) {
        self.mpm.release();
        log::debug!("arena released");
    }
}
