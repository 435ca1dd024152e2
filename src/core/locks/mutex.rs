use crate::core::atomics::metadata_memory_barrier_if_needed;
use crate::core::config;
use crate::core::order::{AcquiredAfter, CLASS_COUNT, DefaultClass, Dynamic, LockClass, class_name};
use crate::core::stats::{MutexStat, StatSnapshot, class_stat};
use crate::core::tracking::{
    begin_wait, check_order, end_wait, record_acquired, record_released, record_wait,
};
use crate::core::types::MutexHandle;
use crate::core::violation::{self, Violation};
use lock_api::RawMutex as _;
use parking_lot::{Mutex as ParkingLotMutex, MutexGuard as ParkingLotMutexGuard};
use std::fmt;
use std::marker::PhantomData;
use std::mem::ManuallyDrop;
use std::ops::{Deref, DerefMut};
use std::time::{Duration, Instant};

/// A mutex that tracks its holders for order checking, statistics and
/// deadlock detection
///
/// The class `C` fixes the mutex's place in the acquisition order: a thread
/// holding a lock of some class may only lock classes of strictly higher
/// order. Violations are reported when they are attempted. Several mutexes of
/// the same class may be held at once; relocking the same mutex is a
/// recursion violation.
///
/// # Example
///
/// ```rust
/// use audio_mutex::Mutex;
/// use audio_mutex::order::{AudioFlingerMutex, ThreadBaseMutex};
///
/// let flinger: Mutex<Vec<u32>, AudioFlingerMutex> = Mutex::with_class(Vec::new());
/// let thread: Mutex<u32, ThreadBaseMutex> = Mutex::with_class(0);
///
/// let mut tracks = flinger.lock();
/// let mut frames = tracks.then_lock(&thread);
/// *frames += 256;
/// tracks.push(*frames);
/// ```
pub struct Mutex<T, C: LockClass = DefaultClass> {
    /// Position of this mutex in the acquisition order
    order: usize,
    /// Statistics shared by every mutex of the same class
    stat: &'static MutexStat,
    /// Whether priority inheritance was requested
    priority_inheritance: bool,
    /// The lock class, fixed at compile time
    class: PhantomData<fn() -> C>,
    /// The wrapped mutex
    inner: ParkingLotMutex<T>,
}

/// Guard for a [`Mutex`]; updates the holder's bookkeeping when dropped
#[must_use = "if unused the Mutex will immediately unlock"]
pub struct MutexGuard<'a, T, C: LockClass = DefaultClass> {
    /// The mutex this guard releases
    mutex: &'a Mutex<T, C>,
    /// The inner MutexGuard, dropped after the release is recorded
    guard: ManuallyDrop<ParkingLotMutexGuard<'a, T>>,
}

impl<T> Mutex<T> {
    /// Creates a mutex of the default class
    ///
    /// # Arguments
    /// * `value` - The initial value to protect
    ///
    /// # Returns
    /// A new unlocked Mutex
    ///
    /// ```rust
    /// use audio_mutex::Mutex;
    ///
    /// let mutex = Mutex::new(42);
    /// assert_eq!(*mutex.lock(), 42);
    /// ```
    pub fn new(value: T) -> Self {
        Self::with_class(value)
    }
}

impl<T> Mutex<T, Dynamic> {
    /// Creates a mutex whose order is chosen at run time
    ///
    /// Only the run-time order check applies. An `order` outside the class
    /// table aborts the process.
    ///
    /// # Arguments
    /// * `order` - Index into the class table
    /// * `value` - The initial value to protect
    ///
    /// # Returns
    /// A new unlocked Mutex of the given order
    pub fn with_order(order: usize, value: T) -> Self {
        Self::build(value, order, config::priority_inheritance())
    }
}

impl<T, C: LockClass> Mutex<T, C> {
    /// Creates a mutex of class `C`
    ///
    /// # Arguments
    /// * `value` - The initial value to protect
    ///
    /// # Returns
    /// A new unlocked Mutex ordered by `C`
    pub fn with_class(value: T) -> Self {
        Self::build(value, C::ORDER, config::priority_inheritance())
    }

    /// Creates a mutex of class `C`, overriding the process-wide priority
    /// inheritance setting
    ///
    /// # Arguments
    /// * `value` - The initial value to protect
    /// * `priority_inheritance` - Whether this mutex requests priority inheritance
    ///
    /// # Returns
    /// A new unlocked Mutex ordered by `C`
    pub fn with_priority_inheritance(value: T, priority_inheritance: bool) -> Self {
        Self::build(value, C::ORDER, priority_inheritance)
    }

    fn build(value: T, order: usize, priority_inheritance: bool) -> Self {
        if order >= CLASS_COUNT {
            violation::fatal(Violation::ClassOutOfRange { order });
        }
        Mutex {
            order,
            stat: class_stat(order),
            priority_inheritance,
            class: PhantomData,
            inner: ParkingLotMutex::new(value),
        }
    }

    /// Identity of this mutex in holding stacks and deadlock reports
    pub fn handle(&self) -> MutexHandle {
        self as *const Self as MutexHandle
    }

    pub fn order(&self) -> usize {
        self.order
    }

    pub fn class_name(&self) -> &'static str {
        class_name(self.order)
    }

    /// Whether priority inheritance was requested at construction
    pub fn priority_inheritance(&self) -> bool {
        self.priority_inheritance
    }

    /// Statistics of this mutex's class
    pub fn stats(&self) -> StatSnapshot {
        self.stat.snapshot()
    }

    pub fn is_locked(&self) -> bool {
        self.inner.is_locked()
    }

    /// Acquires the mutex, blocking until it is available
    ///
    /// An order or recursion violation is reported before blocking. When the
    /// violation is not fatal the lock proceeds, so relocking a mutex held by
    /// the calling thread blocks forever.
    pub fn lock(&self) -> MutexGuard<'_, T, C> {
        check_order(self.handle(), self.order);
        let guard = match self.inner.try_lock() {
            Some(guard) => guard,
            None => self.lock_contended(),
        };
        self.acquired(guard)
    }

    /// Acquires the mutex without the order and recursion check
    ///
    /// For two mutexes that share a class by design and are taken in a
    /// known-safe sequence. Statistics and holding state are still updated.
    pub fn lock_no_check(&self) -> MutexGuard<'_, T, C> {
        let guard = match self.inner.try_lock() {
            Some(guard) => guard,
            None => self.lock_contended(),
        };
        self.acquired(guard)
    }

    /// Attempts to acquire the mutex without blocking
    pub fn try_lock(&self) -> Option<MutexGuard<'_, T, C>> {
        check_order(self.handle(), self.order);
        let guard = self.inner.try_lock();
        metadata_memory_barrier_if_needed();
        guard.map(|guard| self.acquired(guard))
    }

    /// Attempts to acquire the mutex, giving up after `timeout`
    ///
    /// A zero timeout never blocks. A timeout too large to represent as a
    /// deadline blocks without limit.
    pub fn try_lock_for(&self, timeout: Duration) -> Option<MutexGuard<'_, T, C>> {
        if timeout.is_zero() {
            return self.try_lock();
        }
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.try_lock_until(deadline),
            None => Some(self.lock()),
        }
    }

    /// Attempts to acquire the mutex, giving up at `deadline`
    ///
    /// Time spent waiting is recorded only when the lock is obtained.
    pub fn try_lock_until(&self, deadline: Instant) -> Option<MutexGuard<'_, T, C>> {
        check_order(self.handle(), self.order);
        if let Some(guard) = self.inner.try_lock() {
            return Some(self.acquired(guard));
        }

        let wait = begin_wait(self.handle());
        let guard = self.inner.try_lock_until(deadline);
        let wait_ns = end_wait(wait);

        match guard {
            Some(guard) => {
                record_wait(self.stat, wait_ns);
                Some(self.acquired(guard))
            }
            None => {
                metadata_memory_barrier_if_needed();
                None
            }
        }
    }

    /// Nanosecond form of [`try_lock_for`](Self::try_lock_for); a
    /// non-positive timeout is a plain [`try_lock`](Self::try_lock).
    pub fn try_lock_timeout(&self, timeout_ns: i64) -> Option<MutexGuard<'_, T, C>> {
        if timeout_ns <= 0 {
            return self.try_lock();
        }
        self.try_lock_for(Duration::from_nanos(timeout_ns as u64))
    }

    /// Releases the mutex without a guard
    ///
    /// The release is recorded against the calling thread. If the calling
    /// thread is not holding the mutex, an invalid unlock is reported.
    ///
    /// # Safety
    ///
    /// The mutex must be locked, and the guard that locked it must have been
    /// forgotten (for example with [`std::mem::forget`]).
    pub unsafe fn force_unlock(&self) {
        record_released(self.handle(), self.order, self.stat);
        unsafe { self.inner.force_unlock() };
        metadata_memory_barrier_if_needed();
    }

    pub fn into_inner(self) -> T {
        self.inner.into_inner()
    }

    /// Mutable access without locking; the borrow proves no guard exists.
    pub fn get_mut(&mut self) -> &mut T {
        self.inner.get_mut()
    }

    fn lock_contended(&self) -> ParkingLotMutexGuard<'_, T> {
        let wait = begin_wait(self.handle());
        let guard = self.inner.lock();
        record_wait(self.stat, end_wait(wait));
        guard
    }

    fn acquired<'a>(&'a self, guard: ParkingLotMutexGuard<'a, T>) -> MutexGuard<'a, T, C> {
        record_acquired(self.handle(), self.order, self.stat);
        metadata_memory_barrier_if_needed();
        MutexGuard {
            mutex: self,
            guard: ManuallyDrop::new(guard),
        }
    }

    /// Wraps an already held raw lock whose acquisition has been recorded.
    ///
    /// # Safety
    ///
    /// The raw mutex must be locked by the calling thread with no guard.
    pub(crate) unsafe fn assume_locked(&self) -> MutexGuard<'_, T, C> {
        MutexGuard {
            mutex: self,
            guard: ManuallyDrop::new(unsafe { self.inner.make_guard_unchecked() }),
        }
    }

    pub(crate) fn stat(&self) -> &'static MutexStat {
        self.stat
    }
}

impl<T, C: LockClass> fmt::Debug for Mutex<T, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mutex")
            .field("class", &self.class_name())
            .field("order", &self.order)
            .field("locked", &self.is_locked())
            .finish_non_exhaustive()
    }
}

impl<T: Default> Default for Mutex<T> {
    fn default() -> Mutex<T> {
        Mutex::new(Default::default())
    }
}

impl<T> From<T> for Mutex<T> {
    fn from(value: T) -> Self {
        Mutex::new(value)
    }
}

impl<'a, T, C: LockClass> MutexGuard<'a, T, C> {
    /// Locks `next` while this guard is held
    ///
    /// Compiles only when `next`'s class may be acquired after this one.
    pub fn then_lock<'b, U, D: AcquiredAfter<C>>(
        &self,
        next: &'b Mutex<U, D>,
    ) -> MutexGuard<'b, U, D> {
        next.lock()
    }

    pub fn mutex(&self) -> &'a Mutex<T, C> {
        self.mutex
    }

    /// The parking_lot guard, for condition variable waits
    pub(crate) fn inner_guard(&mut self) -> &mut ParkingLotMutexGuard<'a, T> {
        &mut self.guard
    }
}

impl<T, C: LockClass> Deref for MutexGuard<'_, T, C> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        self.guard.deref()
    }
}

impl<T, C: LockClass> DerefMut for MutexGuard<'_, T, C> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.guard.deref_mut()
    }
}

impl<T: fmt::Debug, C: LockClass> fmt::Debug for MutexGuard<'_, T, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&**self, f)
    }
}

impl<T, C: LockClass> Drop for MutexGuard<'_, T, C> {
    fn drop(&mut self) {
        record_released(self.mutex.handle(), self.mutex.order, self.mutex.stat);
        // SAFETY: the guard is never used again.
        unsafe { ManuallyDrop::drop(&mut self.guard) };
        metadata_memory_barrier_if_needed();
    }
}

/// Raw access used by multi-mutex acquisition
pub(crate) trait RawLockable {
    fn handle(&self) -> MutexHandle;
    fn order(&self) -> usize;
    fn stat(&self) -> &'static MutexStat;
    fn raw_lock(&self);
    fn raw_try_lock(&self) -> bool;
    /// # Safety
    ///
    /// The raw mutex must be held by the calling thread with no guard.
    unsafe fn raw_unlock(&self);
}

impl<T, C: LockClass> RawLockable for Mutex<T, C> {
    fn handle(&self) -> MutexHandle {
        Mutex::handle(self)
    }

    fn order(&self) -> usize {
        self.order
    }

    fn stat(&self) -> &'static MutexStat {
        self.stat
    }

    fn raw_lock(&self) {
        unsafe { self.inner.raw() }.lock();
    }

    fn raw_try_lock(&self) -> bool {
        unsafe { self.inner.raw() }.try_lock()
    }

    unsafe fn raw_unlock(&self) {
        unsafe { self.inner.raw().unlock() };
    }
}
