//! Per-class lock statistics

use crate::core::atomics::{RelaxedAtomic, atomic_add_to};
use crate::core::config;
use crate::core::order::{CLASS_COUNT, MUTEX_NAMES};
use lazy_static::lazy_static;
use serde::Serialize;
use std::fmt;

/// Counters aggregated over every mutex of one class
///
/// Updated from any thread with relaxed ordering. A reader may see a
/// combination of counters that never existed at a single instant.
#[derive(Debug, Default)]
pub struct MutexStat {
    /// Successful acquisitions, including reacquisition after a condition wait
    pub locks: RelaxedAtomic<u64>,
    /// Releases, including the release at the start of a condition wait
    pub unlocks: RelaxedAtomic<u64>,
    /// Acquisitions that had to block
    pub waits: RelaxedAtomic<u64>,
    /// Sum of blocking times in nanoseconds
    pub wait_sum_ns: RelaxedAtomic<f64>,
    /// Sum of squared blocking times, for the standard deviation
    pub wait_sumsq_ns: RelaxedAtomic<f64>,
}

impl MutexStat {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accumulates one blocking wait of `wait_ns` nanoseconds.
    pub fn add_wait_time(&self, wait_ns: u64) {
        let wait_ns = wait_ns as f64;
        atomic_add_to(&self.wait_sum_ns, wait_ns);
        atomic_add_to(&self.wait_sumsq_ns, wait_ns * wait_ns);
    }

    pub fn snapshot(&self) -> StatSnapshot {
        StatSnapshot {
            locks: self.locks.load(),
            unlocks: self.unlocks.load(),
            waits: self.waits.load(),
            wait_sum_ns: self.wait_sum_ns.load(),
            wait_sumsq_ns: self.wait_sumsq_ns.load(),
        }
    }
}

impl fmt::Display for MutexStat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.snapshot(), f)
    }
}

/// Point-in-time copy of a [`MutexStat`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct StatSnapshot {
    pub locks: u64,
    pub unlocks: u64,
    pub waits: u64,
    pub wait_sum_ns: f64,
    pub wait_sumsq_ns: f64,
}

impl StatSnapshot {
    pub fn uncontested(&self) -> u64 {
        self.locks.saturating_sub(self.waits)
    }

    pub fn avg_wait_ms(&self) -> f64 {
        if self.waits == 0 {
            return 0.0;
        }
        self.wait_sum_ns * 1e-6 / self.waits as f64
    }

    pub fn std_wait_ms(&self) -> f64 {
        if self.waits < 2 {
            return 0.0;
        }
        let avg = self.avg_wait_ms();
        // Clamped: the accumulators drift independently.
        (self.wait_sumsq_ns * 1e-12 / self.waits as f64 - avg * avg)
            .max(0.0)
            .sqrt()
    }
}

impl fmt::Display for StatSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "locks: {}", self.locks)?;
        writeln!(f, "uncontested: {}", self.uncontested())?;
        writeln!(f, "waits: {}", self.waits)?;
        writeln!(f, "unlocks: {}", self.unlocks)?;
        writeln!(f, "avg_wait_ms: {:.6}", self.avg_wait_ms())?;
        writeln!(f, "std_wait_ms: {:.6}", self.std_wait_ms())
    }
}

lazy_static! {
    static ref STATS: Vec<MutexStat> = (0..CLASS_COUNT).map(|_| MutexStat::new()).collect();
}

/// Statistics record of the class at `order`
///
/// `order` must be below `CLASS_COUNT`; mutex construction guarantees it.
pub(crate) fn class_stat(order: usize) -> &'static MutexStat {
    &STATS[order]
}

/// Snapshot of one class's statistics, or `None` when `order` is out of range
pub fn class_stats(order: usize) -> Option<StatSnapshot> {
    STATS.get(order).map(MutexStat::snapshot)
}

/// Text dump of every class that has been locked at least once
pub fn all_stats_report() -> String {
    let mut out = format!(
        "mutex stats: priority inheritance {}\n",
        if config::priority_inheritance() {
            "enabled"
        } else {
            "disabled"
        }
    );
    for (name, stat) in MUTEX_NAMES.iter().zip(STATS.iter()) {
        let snapshot = stat.snapshot();
        if snapshot.locks == 0 {
            continue;
        }
        out.push_str("Capability: ");
        out.push_str(name);
        out.push('\n');
        out.push_str(&snapshot.to_string());
    }
    out
}
