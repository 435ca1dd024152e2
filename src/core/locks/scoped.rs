use crate::core::atomics::metadata_memory_barrier_if_needed;
use crate::core::locks::mutex::{Mutex, MutexGuard, RawLockable};
use crate::core::order::{DefaultClass, LockClass};
use crate::core::tracking::{begin_wait, check_order, end_wait, record_acquired, record_wait};
use crate::core::violation::{self, Violation};
use std::time::{Duration, Instant};

/// A lock that may be released and reacquired during its lifetime
///
/// # Example
///
/// ```rust
/// use audio_mutex::{Mutex, UniqueLock};
///
/// let mutex = Mutex::new(0);
/// let mut lock = UniqueLock::deferred(&mutex);
/// assert!(!lock.owns_lock());
///
/// lock.lock();
/// **lock.guard_mut().unwrap() += 1;
/// lock.unlock();
/// assert_eq!(*mutex.lock(), 1);
/// ```
pub struct UniqueLock<'a, T, C: LockClass = DefaultClass> {
    mutex: &'a Mutex<T, C>,
    guard: Option<MutexGuard<'a, T, C>>,
}

impl<'a, T, C: LockClass> UniqueLock<'a, T, C> {
    /// Locks `mutex`
    pub fn new(mutex: &'a Mutex<T, C>) -> Self {
        UniqueLock {
            mutex,
            guard: Some(mutex.lock()),
        }
    }

    /// Associates with `mutex` without locking it
    pub fn deferred(mutex: &'a Mutex<T, C>) -> Self {
        UniqueLock { mutex, guard: None }
    }

    /// Locking an owned lock is a recursion violation, and a no-op when the
    /// violation is not fatal.
    pub fn lock(&mut self) {
        if self.already_owned() {
            return;
        }
        self.guard = Some(self.mutex.lock());
    }

    /// Unlocking a lock that is not owned is an invalid unlock.
    pub fn unlock(&mut self) {
        if self.guard.take().is_none() {
            violation::report(Violation::InvalidUnlock {
                order: self.mutex.order(),
            });
        }
    }

    pub fn try_lock(&mut self) -> bool {
        if self.already_owned() {
            return true;
        }
        self.guard = self.mutex.try_lock();
        self.owns_lock()
    }

    pub fn try_lock_for(&mut self, timeout: Duration) -> bool {
        if self.already_owned() {
            return true;
        }
        self.guard = self.mutex.try_lock_for(timeout);
        self.owns_lock()
    }

    pub fn try_lock_until(&mut self, deadline: Instant) -> bool {
        if self.already_owned() {
            return true;
        }
        self.guard = self.mutex.try_lock_until(deadline);
        self.owns_lock()
    }

    pub fn owns_lock(&self) -> bool {
        self.guard.is_some()
    }

    pub fn mutex(&self) -> &'a Mutex<T, C> {
        self.mutex
    }

    pub fn guard(&self) -> Option<&MutexGuard<'a, T, C>> {
        self.guard.as_ref()
    }

    pub fn guard_mut(&mut self) -> Option<&mut MutexGuard<'a, T, C>> {
        self.guard.as_mut()
    }

    /// Gives up ownership of the guard, if any, without unlocking
    pub fn into_guard(self) -> Option<MutexGuard<'a, T, C>> {
        self.guard
    }

    fn already_owned(&self) -> bool {
        if self.owns_lock() {
            violation::report(Violation::Recursion {
                order: self.mutex.order(),
            });
            return true;
        }
        false
    }
}

/// A set of distinct mutexes that can be locked together
pub trait LockSet<'a> {
    type Guards;

    fn lock_all(self) -> Self::Guards;
}

macro_rules! impl_lock_set {
    ($(($idx:tt, $t:ident, $c:ident)),+) => {
        impl<'a, $($t, $c: LockClass),+> LockSet<'a> for ($(&'a Mutex<$t, $c>,)+) {
            type Guards = ($(MutexGuard<'a, $t, $c>,)+);

            fn lock_all(self) -> Self::Guards {
                lock_raw_set(&[$(self.$idx as &dyn RawLockable),+]);
                // SAFETY: every raw mutex was just locked by this thread.
                unsafe { ($(self.$idx.assume_locked(),)+) }
            }
        }
    };
}

impl_lock_set!((0, T0, C0));
impl_lock_set!((0, T0, C0), (1, T1, C1));
impl_lock_set!((0, T0, C0), (1, T1, C1), (2, T2, C2));
impl_lock_set!((0, T0, C0), (1, T1, C1), (2, T2, C2), (3, T3, C3));

/// Locks every mutex in `set` without risk of deadlocking against another
/// thread locking an overlapping set in a different order
///
/// The mutexes are acquired with a back-off strategy: block on one, try the
/// rest, and on failure release everything and block on the one that failed.
/// Once all are held they are recorded in ascending class order. Passing the
/// same mutex twice aborts the process.
///
/// # Example
///
/// ```rust
/// use audio_mutex::{Mutex, scoped_lock};
///
/// let left = Mutex::new(1);
/// let right = Mutex::new(2);
/// let (mut a, mut b) = scoped_lock((&left, &right));
/// std::mem::swap(&mut *a, &mut *b);
/// ```
pub fn scoped_lock<'a, S: LockSet<'a>>(set: S) -> S::Guards {
    set.lock_all()
}

fn lock_raw_set(locks: &[&dyn RawLockable]) {
    let mut sorted = locks.to_vec();
    sorted.sort_by_key(|lock| (lock.order(), lock.handle()));
    for pair in sorted.windows(2) {
        if pair[0].handle() == pair[1].handle() {
            violation::fatal(Violation::Recursion {
                order: pair[0].order(),
            });
        }
    }
    for lock in &sorted {
        check_order(lock.handle(), lock.order());
    }

    let waited = acquire_with_backoff(locks);

    for (index, lock) in locks.iter().enumerate() {
        if let Some(wait_ns) = waited[index] {
            record_wait(lock.stat(), wait_ns);
        }
    }
    for lock in &sorted {
        record_acquired(lock.handle(), lock.order(), lock.stat());
    }
    metadata_memory_barrier_if_needed();
}

/// Returns the total blocking time per lock, `None` for locks that never
/// blocked.
fn acquire_with_backoff(locks: &[&dyn RawLockable]) -> Vec<Option<u64>> {
    let mut waited: Vec<Option<u64>> = vec![None; locks.len()];
    let mut first = 0;
    loop {
        let lock = locks[first];
        if !lock.raw_try_lock() {
            let wait = begin_wait(lock.handle());
            lock.raw_lock();
            let wait_ns = end_wait(wait);
            waited[first] = Some(waited[first].unwrap_or(0).saturating_add(wait_ns));
        }

        let failed = (0..locks.len())
            .filter(|&index| index != first)
            .find(|&index| !locks[index].raw_try_lock());

        let Some(failed) = failed else {
            return waited;
        };

        // Everything locked before `failed` in this round, plus `first`.
        for index in (0..failed).filter(|&index| index != first) {
            // SAFETY: locked above in this round.
            unsafe { locks[index].raw_unlock() };
        }
        // SAFETY: locked at the top of this round.
        unsafe { lock.raw_unlock() };
        metadata_memory_barrier_if_needed();

        first = failed;
        std::thread::yield_now();
    }
}
