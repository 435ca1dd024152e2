use crate::core::atomics::metadata_memory_barrier_if_needed;
use crate::core::locks::mutex::MutexGuard;
use crate::core::order::LockClass;
use crate::core::stats::MutexStat;
use crate::core::tracking::{cv_reacquire, cv_release};
use crate::core::types::{INVALID_TID, MutexHandle, ThreadId};
use parking_lot::Condvar as ParkingLotCondvar;
use std::fmt;
use std::time::{Duration, Instant};

/// Whether a timed condition wait returned because its deadline passed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitTimeoutResult(bool);

impl WaitTimeoutResult {
    pub fn timed_out(self) -> bool {
        self.0
    }
}

/// A condition variable for use with [`Mutex`](crate::Mutex)
///
/// While a thread waits, the mutex is dropped from its holding stack. A wait
/// can name the thread expected to notify it (see
/// [`with_notifier`](Self::with_notifier)), which lets the deadlock detector
/// follow the wait to that thread.
///
/// # Example
///
/// ```rust
/// use audio_mutex::{Condvar, Mutex, thread};
/// use std::sync::Arc;
///
/// let pair = Arc::new((Mutex::new(false), Condvar::new()));
/// let pair2 = Arc::clone(&pair);
///
/// let notifier = thread::spawn(move || {
///     let (lock, cvar) = &*pair2;
///     *lock.lock() = true;
///     cvar.notify_one();
/// });
///
/// let (lock, cvar) = &*pair;
/// let mut ready = lock.lock();
/// cvar.with_notifier(notifier.tid()).wait_while(&mut ready, |ready| !*ready);
/// drop(ready);
/// notifier.join().unwrap();
/// ```
#[derive(Default)]
pub struct Condvar {
    inner: ParkingLotCondvar,
}

impl Condvar {
    pub fn new() -> Self {
        Condvar {
            inner: ParkingLotCondvar::new(),
        }
    }

    /// Waits expecting thread `notifier_tid` to notify
    ///
    /// `INVALID_TID` means the notifier is unknown.
    pub fn with_notifier(&self, notifier_tid: ThreadId) -> NotifierWait<'_> {
        NotifierWait {
            condvar: self,
            notifier_tid,
        }
    }

    /// Blocks until notified, releasing the guard's mutex meanwhile
    pub fn wait<T, C: LockClass>(&self, guard: &mut MutexGuard<'_, T, C>) {
        self.with_notifier(INVALID_TID).wait(guard)
    }

    /// Blocks while `condition` returns true
    pub fn wait_while<T, C, F>(&self, guard: &mut MutexGuard<'_, T, C>, condition: F)
    where
        C: LockClass,
        F: FnMut(&mut T) -> bool,
    {
        self.with_notifier(INVALID_TID).wait_while(guard, condition)
    }

    pub fn wait_for<T, C: LockClass>(
        &self,
        guard: &mut MutexGuard<'_, T, C>,
        timeout: Duration,
    ) -> WaitTimeoutResult {
        self.with_notifier(INVALID_TID).wait_for(guard, timeout)
    }

    pub fn wait_until<T, C: LockClass>(
        &self,
        guard: &mut MutexGuard<'_, T, C>,
        deadline: Instant,
    ) -> WaitTimeoutResult {
        self.with_notifier(INVALID_TID).wait_until(guard, deadline)
    }

    pub fn wait_while_for<T, C, F>(
        &self,
        guard: &mut MutexGuard<'_, T, C>,
        timeout: Duration,
        condition: F,
    ) -> WaitTimeoutResult
    where
        C: LockClass,
        F: FnMut(&mut T) -> bool,
    {
        self.with_notifier(INVALID_TID)
            .wait_while_for(guard, timeout, condition)
    }

    pub fn wait_while_until<T, C, F>(
        &self,
        guard: &mut MutexGuard<'_, T, C>,
        deadline: Instant,
        condition: F,
    ) -> WaitTimeoutResult
    where
        C: LockClass,
        F: FnMut(&mut T) -> bool,
    {
        self.with_notifier(INVALID_TID)
            .wait_while_until(guard, deadline, condition)
    }

    /// Wakes one waiter; returns whether one was woken.
    pub fn notify_one(&self) -> bool {
        self.inner.notify_one()
    }

    /// Wakes every waiter; returns how many were woken.
    pub fn notify_all(&self) -> usize {
        self.inner.notify_all()
    }
}

impl fmt::Debug for Condvar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Condvar").finish_non_exhaustive()
    }
}

/// Condition waits annotated with the expected notifier
///
/// Predicates run with the mutex held and recorded as held. With a deadline,
/// the wait reports a timeout as soon as one underlying wait times out, even
/// if the predicate has meanwhile become false.
#[derive(Debug, Clone, Copy)]
pub struct NotifierWait<'a> {
    condvar: &'a Condvar,
    notifier_tid: ThreadId,
}

impl NotifierWait<'_> {
    pub fn notifier_tid(&self) -> ThreadId {
        self.notifier_tid
    }

    pub fn wait<T, C: LockClass>(&self, guard: &mut MutexGuard<'_, T, C>) {
        let _scope = CvWaitScope::enter(guard, self.notifier_tid);
        self.condvar.inner.wait(guard.inner_guard());
    }

    pub fn wait_while<T, C, F>(&self, guard: &mut MutexGuard<'_, T, C>, mut condition: F)
    where
        C: LockClass,
        F: FnMut(&mut T) -> bool,
    {
        while condition(&mut **guard) {
            self.wait(guard);
        }
    }

    /// A timeout too large to represent as a deadline waits without limit.
    pub fn wait_for<T, C: LockClass>(
        &self,
        guard: &mut MutexGuard<'_, T, C>,
        timeout: Duration,
    ) -> WaitTimeoutResult {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.wait_until(guard, deadline),
            None => {
                self.wait(guard);
                WaitTimeoutResult(false)
            }
        }
    }

    pub fn wait_until<T, C: LockClass>(
        &self,
        guard: &mut MutexGuard<'_, T, C>,
        deadline: Instant,
    ) -> WaitTimeoutResult {
        let _scope = CvWaitScope::enter(guard, self.notifier_tid);
        let result = self.condvar.inner.wait_until(guard.inner_guard(), deadline);
        WaitTimeoutResult(result.timed_out())
    }

    pub fn wait_while_for<T, C, F>(
        &self,
        guard: &mut MutexGuard<'_, T, C>,
        timeout: Duration,
        condition: F,
    ) -> WaitTimeoutResult
    where
        C: LockClass,
        F: FnMut(&mut T) -> bool,
    {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.wait_while_until(guard, deadline, condition),
            None => {
                self.wait_while(guard, condition);
                WaitTimeoutResult(false)
            }
        }
    }

    pub fn wait_while_until<T, C, F>(
        &self,
        guard: &mut MutexGuard<'_, T, C>,
        deadline: Instant,
        mut condition: F,
    ) -> WaitTimeoutResult
    where
        C: LockClass,
        F: FnMut(&mut T) -> bool,
    {
        while condition(&mut **guard) {
            let result = self.wait_until(guard, deadline);
            if result.timed_out() {
                return result;
            }
        }
        WaitTimeoutResult(false)
    }
}

/// Holding bookkeeping for the span of one underlying condition wait
struct CvWaitScope {
    /// The mutex released by the wait
    handle: MutexHandle,
    /// Its order, kept for the other-wait record
    order: usize,
    /// Its class statistics
    stat: &'static MutexStat,
}

impl CvWaitScope {
    fn enter<T, C: LockClass>(guard: &MutexGuard<'_, T, C>, notifier_tid: ThreadId) -> Self {
        let mutex = guard.mutex();
        let scope = CvWaitScope {
            handle: mutex.handle(),
            order: mutex.order(),
            stat: mutex.stat(),
        };
        cv_release(scope.handle, scope.order, scope.stat, notifier_tid);
        metadata_memory_barrier_if_needed();
        scope
    }
}

impl Drop for CvWaitScope {
    fn drop(&mut self) {
        cv_reacquire(self.handle, self.order, self.stat);
        metadata_memory_barrier_if_needed();
    }
}

#[cfg(all(test, feature = "tracking"))]
mod tests {
    use super::*;
    use crate::core::thread_info;
    use crate::core::locks::mutex::Mutex;
    use crate::core::types::current_thread_id;
    use std::sync::Arc;

    #[test]
    fn test_wait_for_times_out_and_restores_holding() {
        let mutex = Mutex::new(());
        let condvar = Condvar::new();
        let mut guard = mutex.lock();
        let record = thread_info::current().unwrap();
        let before = record.held().size();

        let result = condvar.wait_for(&mut guard, Duration::from_millis(10));
        assert!(result.timed_out());
        assert_eq!(record.held().size(), before);
        assert_eq!(record.held().top(0).handle, mutex.handle());
    }

    #[test]
    fn test_wait_while_until_satisfied_predicate_does_not_wait() {
        let mutex = Mutex::new(5);
        let condvar = Condvar::new();
        let mut guard = mutex.lock();
        let result = condvar.wait_while_until(&mut guard, Instant::now(), |value| *value < 5);
        assert!(!result.timed_out());
    }

    #[test]
    fn test_notifier_wait_records_partner() {
        let pair = Arc::new((Mutex::new(false), Condvar::new()));
        let waiter_pair = Arc::clone(&pair);
        let me = current_thread_id();

        let waiter = std::thread::spawn(move || {
            let (lock, cvar) = &*waiter_pair;
            let record = thread_info::current().unwrap();
            let mut ready = lock.lock();
            cvar.with_notifier(me).wait_while(&mut ready, |ready| !*ready);
            assert!(!record.other_wait().is_active());
            assert_eq!(record.held().top(0).handle, lock.handle());
        });

        let (lock, cvar) = &*pair;
        loop {
            let partner = crate::core::registry::global()
                .snapshot()
                .values()
                .filter_map(|weak| weak.upgrade())
                .any(|record| record.other_wait().partner_tid == me);
            if partner {
                break;
            }
            std::thread::yield_now();
        }
        *lock.lock() = true;
        cvar.notify_all();
        waiter.join().unwrap();
    }
}
