//! Bookkeeping hooks called by the lock types
//!
//! With the `tracking` feature (on by default) every lock state change
//! updates the class statistics and the calling thread's record, and each
//! acquisition is checked against the class order. Without it the hooks are
//! empty: the mutexes behave like plain `parking_lot` ones, statistics stay
//! at zero and [`detect`](crate::detect) finds no chains.

#[cfg(feature = "tracking")]
pub(crate) use enabled::*;

#[cfg(not(feature = "tracking"))]
pub(crate) use disabled::*;

/// Whether lock tracking was compiled in
pub const TRACKING_ENABLED: bool = cfg!(feature = "tracking");

#[cfg(feature = "tracking")]
mod enabled {
    use crate::core::stats::MutexStat;
    use crate::core::thread_info;
    use crate::core::types::{MutexHandle, NO_HANDLE, ThreadId};
    use crate::core::violation::{self, Violation};
    use std::time::Instant;

    /// Reports an order or recursion violation for acquiring `handle` at
    /// `order` on the calling thread.
    pub(crate) fn check_order(handle: MutexHandle, order: usize) {
        let Some(Some(held)) =
            thread_info::with_current(|record| record.check_held(handle, order))
        else {
            return;
        };
        if held.order > order {
            violation::report(Violation::OrderInversion {
                held_order: held.order,
                order,
            });
        } else {
            violation::report(Violation::Recursion { order });
        }
    }

    pub(crate) fn record_acquired(handle: MutexHandle, order: usize, stat: &MutexStat) {
        stat.locks.increment();
        thread_info::with_current(|record| record.push_held(handle, order));
    }

    pub(crate) fn record_released(handle: MutexHandle, order: usize, stat: &MutexStat) {
        stat.unlocks.increment();
        let held = thread_info::with_current(|record| record.remove_held(handle)).unwrap_or(true);
        if !held {
            violation::report(Violation::InvalidUnlock { order });
        }
    }

    /// Start of a blocking acquisition
    pub(crate) struct WaitStart(Instant);

    /// Publishes `handle` as the mutex the calling thread is blocked on.
    pub(crate) fn begin_wait(handle: MutexHandle) -> WaitStart {
        thread_info::with_current(|record| record.reset_waiter(handle));
        WaitStart(Instant::now())
    }

    /// Clears the blocked-on handle; returns the time blocked in ns.
    pub(crate) fn end_wait(start: WaitStart) -> u64 {
        let wait_ns = u64::try_from(start.0.elapsed().as_nanos()).unwrap_or(u64::MAX);
        thread_info::with_current(|record| record.reset_waiter(NO_HANDLE));
        wait_ns
    }

    /// Counts one contended acquisition.
    pub(crate) fn record_wait(stat: &MutexStat, wait_ns: u64) {
        stat.waits.increment();
        stat.add_wait_time(wait_ns);
    }

    /// The mutex is released for a condition wait on `notifier_tid`.
    pub(crate) fn cv_release(
        handle: MutexHandle,
        order: usize,
        stat: &MutexStat,
        notifier_tid: ThreadId,
    ) {
        stat.unlocks.increment();
        let held = thread_info::with_current(|record| {
            record.remove_held_for_cv(handle, order, notifier_tid)
        })
        .unwrap_or(true);
        if !held {
            violation::report(Violation::InvalidUnlock { order });
        }
    }

    /// The mutex is held again after a condition wait.
    pub(crate) fn cv_reacquire(handle: MutexHandle, order: usize, stat: &MutexStat) {
        stat.locks.increment();
        thread_info::with_current(|record| record.push_held_for_cv(handle, order));
    }

    pub(crate) fn begin_join_wait(tid: ThreadId) {
        thread_info::with_current(|record| record.add_wait_join(tid));
    }

    pub(crate) fn end_join_wait() {
        thread_info::with_current(|record| record.remove_wait_join());
    }

    pub(crate) fn begin_queue_wait(tid: ThreadId) {
        thread_info::with_current(|record| record.add_wait_queue(tid));
    }

    pub(crate) fn end_queue_wait() {
        thread_info::with_current(|record| record.remove_wait_queue());
    }
}

#[cfg(not(feature = "tracking"))]
mod disabled {
    use crate::core::stats::MutexStat;
    use crate::core::types::{MutexHandle, ThreadId};

    #[inline(always)]
    pub(crate) fn check_order(_handle: MutexHandle, _order: usize) {}

    #[inline(always)]
    pub(crate) fn record_acquired(_handle: MutexHandle, _order: usize, _stat: &MutexStat) {}

    #[inline(always)]
    pub(crate) fn record_released(_handle: MutexHandle, _order: usize, _stat: &MutexStat) {}

    pub(crate) struct WaitStart;

    #[inline(always)]
    pub(crate) fn begin_wait(_handle: MutexHandle) -> WaitStart {
        WaitStart
    }

    #[inline(always)]
    pub(crate) fn end_wait(_start: WaitStart) -> u64 {
        0
    }

    #[inline(always)]
    pub(crate) fn record_wait(_stat: &MutexStat, _wait_ns: u64) {}

    #[inline(always)]
    pub(crate) fn cv_release(
        _handle: MutexHandle,
        _order: usize,
        _stat: &MutexStat,
        _notifier_tid: ThreadId,
    ) {
    }

    #[inline(always)]
    pub(crate) fn cv_reacquire(_handle: MutexHandle, _order: usize, _stat: &MutexStat) {}

    #[inline(always)]
    pub(crate) fn begin_join_wait(_tid: ThreadId) {}

    #[inline(always)]
    pub(crate) fn end_join_wait() {}

    #[inline(always)]
    pub(crate) fn begin_queue_wait(_tid: ThreadId) {}

    #[inline(always)]
    pub(crate) fn end_queue_wait() {}
}
