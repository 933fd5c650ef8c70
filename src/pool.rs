//! Pools & Chain
//!
//! At init, one generation chain is created from the configured
//! `(capacity, mortality)` pairs, and both managed pools (`cons_pool`,
//! `symbol_pool`) are bound to it and to their respective object formats,
//! using the automatic mark-sweep pool class (`spec.md` §4.3).

use crate::config::IgcConfig;
use crate::error::Result;
use crate::format::{cons_format, symbol_format};
use crate::mpm::{ChainId, Mpm, PoolClass, PoolId};

/// The two managed pools and the chain they share.
#[derive(Debug, Clone, Copy)]
pub struct ManagedPools {
    pub chain: ChainId,
    pub cons_pool: PoolId,
    pub symbol_pool: PoolId,
}

/// Create the generation chain and both managed pools per `config`.
pub fn create_managed_pools<M: Mpm>(mpm: &M, config: &IgcConfig) -> Result<ManagedPools> {
    let chain = mpm.create_chain(&config.generations)?;
    let class = if config.igc_debug_pool {
        PoolClass::DebugMarkSweep
    } else {
        PoolClass::AutomaticMarkSweep
    };
    let cons_pool = mpm.create_pool(chain, class, cons_format())?;
    let symbol_pool = mpm.create_pool(chain, class, symbol_format())?;
    log::debug!(
        "created managed pools: chain={:?} cons_pool={:?} symbol_pool={:?}",
        chain,
        cons_pool,
        symbol_pool
    );

    // The symbol pool's own backing storage *is* the "known base array"
    // symbol references are offsets into (`spec.md` §3, §4.1): every
    // symbol-tagged word, whether produced by `alloc_symbol` or present in
    // a loaded pdump image, resolves through this one base.
    crate::value::set_symbol_array_base(mpm.pool_base(symbol_pool));

    mpm.enable_finalization()?;
    Ok(ManagedPools {
        chain,
        cons_pool,
        symbol_pool,
    })
}
