//! Configuration Module - GC Tuning Parameters
//!
//! Parameters governing generation sizing, debug instrumentation, and the
//! `on_idle` time budget. Most embedders only ever touch `igc_manage_cons`
//! and `idle_budget_ms`; the rest have defaults matching `spec.md` §4.3.

use crate::error::{IgcError, Result};
use std::time::Duration;

/// One `(capacity, mortality)` pair of the generation chain (`spec.md` §3,
/// §4.3). `capacity` is in bytes; `mortality` is the expected survival
/// fraction in `[0.0, 1.0]` (confusingly named "mortality" upstream even
/// though it is actually a *survival* rate, kept for continuity with the
/// source material).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationDesc {
    pub capacity: usize,
    pub mortality: f32,
}

impl GenerationDesc {
    pub const fn new(capacity: usize, mortality: f32) -> Self {
        Self { capacity, mortality }
    }
}

/// Configuration for the IGC core.
#[derive(Debug, Clone)]
pub struct IgcConfig {
    /// Generation chain, younger generation first. Default: two
    /// generations, `(32000, 0.8)` and `(160045, 0.4)`, per `spec.md` §4.3.
    pub generations: Vec<GenerationDesc>,

    /// `IGC_DEBUG`: enable invariant assertions throughout the core.
    pub igc_debug: bool,

    /// `IGC_DEBUG_POOL`: use the fencepost/poison debug pool class.
    pub igc_debug_pool: bool,

    /// `IGC_MANAGE_CONS`: master switch for collector-managed cons/symbol
    /// pools. When `false`, `make_cons`/`alloc_symbol` still work but the
    /// pools are created without ever being traced by the legacy bridge,
    /// i.e. the host has opted the moving collector out entirely.
    pub igc_manage_cons: bool,

    /// Time budget handed to `Mpm::step` by `on_idle`, default ≈10ms.
    pub idle_budget: Duration,

    /// Maximum allocation reserve/commit retries before `CommitFailed`.
    pub max_commit_retries: u32,
}

impl Default for IgcConfig {
    fn default() -> Self {
        Self {
            generations: vec![
                GenerationDesc::new(32_000, 0.8),
                GenerationDesc::new(160_045, 0.4),
            ],
            igc_debug: false,
            igc_debug_pool: false,
            igc_manage_cons: true,
            idle_budget: Duration::from_millis(10),
            max_commit_retries: 8,
        }
    }
}

impl IgcConfig {
    /// Validate configuration, rejecting values that would make the chain
    /// or idle budget meaningless.
    pub fn validate(&self) -> Result<()> {
        if self.generations.is_empty() {
            return Err(IgcError::Configuration(
                "generation chain must have at least one generation".to_string(),
            ));
        }

        for (i, gen) in self.generations.iter().enumerate() {
            if gen.capacity == 0 {
                return Err(IgcError::Configuration(format!(
                    "generation {i} capacity must be > 0"
                )));
            }
            if !(0.0..=1.0).contains(&gen.mortality) {
                return Err(IgcError::Configuration(format!(
                    "generation {i} mortality must be within [0.0, 1.0]"
                )));
            }
        }

        if self.idle_budget.is_zero() {
            return Err(IgcError::Configuration(
                "idle_budget must be non-zero".to_string(),
            ));
        }

        if self.max_commit_retries == 0 {
            return Err(IgcError::Configuration(
                "max_commit_retries must be > 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Build configuration from environment variables, overriding defaults:
    /// `IGC_DEBUG`, `IGC_DEBUG_POOL`, `IGC_MANAGE_CONS`, `IGC_IDLE_BUDGET_MS`.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("IGC_DEBUG") {
            config.igc_debug = is_truthy(&val);
        }
        if let Ok(val) = std::env::var("IGC_DEBUG_POOL") {
            config.igc_debug_pool = is_truthy(&val);
        }
        if let Ok(val) = std::env::var("IGC_MANAGE_CONS") {
            config.igc_manage_cons = is_truthy(&val);
        }
        if let Ok(val) = std::env::var("IGC_IDLE_BUDGET_MS") {
            if let Ok(ms) = val.parse::<u64>() {
                config.idle_budget = Duration::from_millis(ms);
            }
        }

        config
    }
}

fn is_truthy(val: &str) -> bool {
    val == "1" || val.eq_ignore_ascii_case("true")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        let config = IgcConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.generations.len(), 2);
    }

    #[test]
    fn rejects_empty_chain() {
        let config = IgcConfig {
            generations: vec![],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_bad_mortality() {
        let config = IgcConfig {
            generations: vec![GenerationDesc::new(1024, 1.5)],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_zero_idle_budget() {
        let config = IgcConfig {
            idle_budget: Duration::ZERO,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
