//! Logging (added, `spec.md` §4.12)
//!
//! This core emits ordinary `log` crate records from every component
//! (`trace!` for per-object scan work, `debug!` for root/AP bookkeeping,
//! `info!` for GC cycle and hook boundaries, `warn!` for retried commits,
//! `error!` for fatal MPM failures); it does not define its own event
//! enum or sink. The only thing this module adds is a test/bench-only
//! helper to install a logger so those records are visible when a single
//! test is run with `--nocapture`.

#[cfg(test)]
mod test_support {
    use std::sync::Once;

    static INIT: Once = Once::new();

    /// Install `env_logger` once per process. Safe to call from every
    /// test; only the first call has any effect.
    pub fn init_test_logging() {
        INIT.call_once(|| {
            let _ = env_logger::builder().is_test(true).try_init();
        });
    }
}

#[cfg(test)]
pub use test_support::init_test_logging;
