//! Statistics & Diagnostics (added, `spec.md` §4.13)
//!
//! Tracks cycle counts, per-pool bytes allocated, idle time consumed, and
//! finalizer throughput, and exposes both a free-form diagnostics map and a
//! threshold-based health check.

use indexmap::IndexMap;
use std::time::Duration;

/// Running counters for one `Arena`. Updated by `hooks`/`finalize`/`legacy`
/// as the corresponding operations occur.
#[derive(Debug, Clone, Default)]
pub struct ArenaStats {
    pub cycles: u64,
    pub cons_bytes_allocated: u64,
    pub symbol_bytes_allocated: u64,
    pub idle_time_consumed: Duration,
    pub finalizers_run: u64,
    pub commit_retries: u64,
}

impl ArenaStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_cons_allocated(&mut self, bytes: u64) {
        self.cons_bytes_allocated += bytes;
    }

    pub fn record_symbol_allocated(&mut self, bytes: u64) {
        self.symbol_bytes_allocated += bytes;
    }

    pub fn record_cycle(&mut self, idle_spent: Duration) {
        self.cycles += 1;
        self.idle_time_consumed += idle_spent;
    }

    pub fn record_finalizer_run(&mut self) {
        self.finalizers_run += 1;
    }

    pub fn record_commit_retry(&mut self) {
        self.commit_retries += 1;
    }

    /// Render as a flat diagnostics map suitable for logging or a status
    /// endpoint.
    pub fn diagnostics(&self) -> IndexMap<String, String> {
        let mut map = IndexMap::new();
        map.insert("cycles".to_string(), self.cycles.to_string());
        map.insert(
            "cons_bytes_allocated".to_string(),
            self.cons_bytes_allocated.to_string(),
        );
        map.insert(
            "symbol_bytes_allocated".to_string(),
            self.symbol_bytes_allocated.to_string(),
        );
        map.insert(
            "idle_time_consumed_ms".to_string(),
            self.idle_time_consumed.as_millis().to_string(),
        );
        map.insert("finalizers_run".to_string(), self.finalizers_run.to_string());
        map.insert("commit_retries".to_string(), self.commit_retries.to_string());
        map
    }
}

/// Pool utilization thresholds for `HealthCheck`.
const WARNING_UTILIZATION: f64 = 0.75;
const CRITICAL_UTILIZATION: f64 = 0.90;

/// Result of `Arena::health_check`.
#[derive(Debug, Clone, Default)]
pub struct HealthCheck {
    pub warnings: Vec<String>,
    pub issues: Vec<String>,
}

impl HealthCheck {
    pub fn is_healthy(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Evaluate one pool's occupancy against the warning/critical thresholds.
pub fn check_pool_utilization(label: &str, used: usize, capacity: usize, out: &mut HealthCheck) {
    if capacity == 0 {
        return;
    }
    let utilization = used as f64 / capacity as f64;
    if utilization >= CRITICAL_UTILIZATION {
        out.issues.push(format!(
            "{label} pool at {:.1}% capacity ({used}/{capacity} bytes)",
            utilization * 100.0
        ));
    } else if utilization >= WARNING_UTILIZATION {
        out.warnings.push(format!(
            "{label} pool at {:.1}% capacity ({used}/{capacity} bytes)",
            utilization * 100.0
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagnostics_reports_recorded_counters() {
        let mut stats = ArenaStats::new();
        stats.record_cons_allocated(16);
        stats.record_cycle(Duration::from_millis(5));
        let diag = stats.diagnostics();
        assert_eq!(diag.get("cons_bytes_allocated").map(String::as_str), Some("16"));
        assert_eq!(diag.get("cycles").map(String::as_str), Some("1"));
    }

    #[test]
    fn utilization_below_threshold_is_healthy() {
        let mut health = HealthCheck::default();
        check_pool_utilization("cons", 100, 1000, &mut health);
        assert!(health.is_healthy());
        assert!(health.warnings.is_empty());
    }

    #[test]
    fn utilization_above_critical_is_an_issue() {
        let mut health = HealthCheck::default();
        check_pool_utilization("cons", 950, 1000, &mut health);
        assert!(!health.is_healthy());
        assert_eq!(health.issues.len(), 1);
    }
}
