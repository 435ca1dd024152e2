//! Lock discipline violations and the fatal policy

use crate::core::atomics::RelaxedAtomic;
use crate::core::config;
use crate::core::logger;
use crate::core::order::{CLASS_COUNT, class_name};
use crate::core::types::current_thread_id;
use lazy_static::lazy_static;
use serde::Serialize;
use std::fmt;
use tracing::{error, warn};

/// A detected misuse of an instrumented mutex
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Violation {
    /// A lock was requested while a lock of a higher class is held
    OrderInversion { held_order: usize, order: usize },
    /// A non-recursive mutex was locked again by its holder
    Recursion { order: usize },
    /// A mutex was released by a thread that does not hold it
    InvalidUnlock { order: usize },
    /// A mutex was constructed with an order outside the class table
    ClassOutOfRange { order: usize },
}

impl Violation {
    /// Whether this violation terminates the process under the current
    /// configuration
    pub fn is_fatal(&self) -> bool {
        match self {
            Violation::OrderInversion { .. } => config::abort_on_order_check(),
            Violation::Recursion { .. } => config::abort_on_recursion_check(),
            Violation::InvalidUnlock { .. } => config::abort_on_invalid_unlock(),
            Violation::ClassOutOfRange { .. } => true,
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Violation::OrderInversion { held_order, order } => write!(
                f,
                "invalid mutex order (previous) {} {} > (new) {} {}",
                held_order,
                class_name(held_order),
                order,
                class_name(order)
            ),
            Violation::Recursion { order } => write!(
                f,
                "recursive mutex access detected (order: {} {})",
                order,
                class_name(order)
            ),
            Violation::InvalidUnlock { order } => write!(
                f,
                "invalid mutex unlock when not previously held (order: {} {})",
                order,
                class_name(order)
            ),
            Violation::ClassOutOfRange { order } => write!(
                f,
                "mutex order {} is equal to or greater than order limit:{}",
                order, CLASS_COUNT
            ),
        }
    }
}

/// Number of violations seen per kind since process start
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ViolationCounts {
    pub order_inversions: u64,
    pub recursions: u64,
    pub invalid_unlocks: u64,
    pub classes_out_of_range: u64,
}

impl ViolationCounts {
    pub fn total(&self) -> u64 {
        self.order_inversions + self.recursions + self.invalid_unlocks + self.classes_out_of_range
    }
}

#[derive(Default)]
struct ViolationCounters {
    order_inversions: RelaxedAtomic<u64>,
    recursions: RelaxedAtomic<u64>,
    invalid_unlocks: RelaxedAtomic<u64>,
    classes_out_of_range: RelaxedAtomic<u64>,
}

impl ViolationCounters {
    fn count(&self, violation: &Violation) {
        let counter = match violation {
            Violation::OrderInversion { .. } => &self.order_inversions,
            Violation::Recursion { .. } => &self.recursions,
            Violation::InvalidUnlock { .. } => &self.invalid_unlocks,
            Violation::ClassOutOfRange { .. } => &self.classes_out_of_range,
        };
        counter.increment();
    }

    fn snapshot(&self) -> ViolationCounts {
        ViolationCounts {
            order_inversions: self.order_inversions.load(),
            recursions: self.recursions.load(),
            invalid_unlocks: self.invalid_unlocks.load(),
            classes_out_of_range: self.classes_out_of_range.load(),
        }
    }
}

lazy_static! {
    static ref COUNTERS: ViolationCounters = ViolationCounters::default();
}

pub fn violation_counts() -> ViolationCounts {
    COUNTERS.snapshot()
}

/// Records `violation`, aborting the process when it is fatal.
pub(crate) fn report(violation: Violation) {
    if violation.is_fatal() {
        fatal(violation);
    }
    record(&violation);
    warn!(tid = current_thread_id(), "{}", violation);
}

/// Records `violation` and aborts regardless of configuration.
pub(crate) fn fatal(violation: Violation) -> ! {
    record(&violation);
    error!(tid = current_thread_id(), "{}", violation);
    std::process::abort()
}

fn record(violation: &Violation) {
    COUNTERS.count(violation);
    logger::log_violation(current_thread_id(), violation);
}
