//! Relaxed and unordered atomic scalars
//!
//! The instrumentation metadata is never protected by a lock. Two levels of
//! atomicity are used instead:
//!
//! - [`RelaxedAtomic`]: multiple writers, multiple readers, relaxed ordering.
//!   Used for the per-class statistics counters.
//! - [`UnorderedAtomic`]: a single writer (the owning thread) and occasional
//!   readers on other threads. Read-modify-write operations are a plain load
//!   followed by a plain store, which is only correct with one writer. Readers
//!   may see stale values but never torn ones.
//!
//! Neither level extends the happens-before guarantees of the mutex itself.

use crate::core::types::OtherWaitReason;
use std::fmt;
use std::sync::atomic::{
    self, AtomicBool, AtomicI32, AtomicI64, AtomicU8, AtomicU32, AtomicU64, AtomicUsize, Ordering,
};

/// A word-sized value with a lock-free atomic representation
pub trait Scalar: Copy + PartialEq + Default + Send + Sync + 'static {
    type Atom: Send + Sync;

    fn new_atom(value: Self) -> Self::Atom;
    fn atom_load(atom: &Self::Atom, order: Ordering) -> Self;
    fn atom_store(atom: &Self::Atom, value: Self, order: Ordering);
    fn atom_compare_exchange_weak(
        atom: &Self::Atom,
        current: Self,
        new: Self,
        success: Ordering,
        failure: Ordering,
    ) -> Result<Self, Self>;
}

/// Scalars that can be summed
pub trait Accumulate: Scalar {
    fn plus(self, rhs: Self) -> Self;

    /// Atomically adds `value`, returning the previous value.
    fn atom_add(atom: &Self::Atom, value: Self, order: Ordering) -> Self;
}

/// Integer scalars with unit increments
pub trait Counter: Accumulate {
    const ONE: Self;

    fn minus(self, rhs: Self) -> Self;

    /// Atomically subtracts `value`, returning the previous value.
    fn atom_sub(atom: &Self::Atom, value: Self, order: Ordering) -> Self;
}

macro_rules! impl_integer_scalar {
    ($($ty:ty => $atom:ty),+ $(,)?) => {
        $(
            impl Scalar for $ty {
                type Atom = $atom;

                fn new_atom(value: Self) -> Self::Atom {
                    <$atom>::new(value)
                }

                fn atom_load(atom: &Self::Atom, order: Ordering) -> Self {
                    atom.load(order)
                }

                fn atom_store(atom: &Self::Atom, value: Self, order: Ordering) {
                    atom.store(value, order)
                }

                fn atom_compare_exchange_weak(
                    atom: &Self::Atom,
                    current: Self,
                    new: Self,
                    success: Ordering,
                    failure: Ordering,
                ) -> Result<Self, Self> {
                    atom.compare_exchange_weak(current, new, success, failure)
                }
            }

            impl Accumulate for $ty {
                fn plus(self, rhs: Self) -> Self {
                    self.wrapping_add(rhs)
                }

                fn atom_add(atom: &Self::Atom, value: Self, order: Ordering) -> Self {
                    atom.fetch_add(value, order)
                }
            }

            impl Counter for $ty {
                const ONE: Self = 1;

                fn minus(self, rhs: Self) -> Self {
                    self.wrapping_sub(rhs)
                }

                fn atom_sub(atom: &Self::Atom, value: Self, order: Ordering) -> Self {
                    atom.fetch_sub(value, order)
                }
            }
        )+
    };
}

impl_integer_scalar! {
    u32 => AtomicU32,
    u64 => AtomicU64,
    usize => AtomicUsize,
    i32 => AtomicI32,
    i64 => AtomicI64,
}

impl Scalar for f64 {
    type Atom = AtomicU64;

    fn new_atom(value: Self) -> Self::Atom {
        AtomicU64::new(value.to_bits())
    }

    fn atom_load(atom: &Self::Atom, order: Ordering) -> Self {
        f64::from_bits(atom.load(order))
    }

    fn atom_store(atom: &Self::Atom, value: Self, order: Ordering) {
        atom.store(value.to_bits(), order)
    }

    // Compares bit patterns, so NaN payloads and signed zeros are distinct.
    fn atom_compare_exchange_weak(
        atom: &Self::Atom,
        current: Self,
        new: Self,
        success: Ordering,
        failure: Ordering,
    ) -> Result<Self, Self> {
        atom.compare_exchange_weak(current.to_bits(), new.to_bits(), success, failure)
            .map(f64::from_bits)
            .map_err(f64::from_bits)
    }
}

impl Accumulate for f64 {
    fn plus(self, rhs: Self) -> Self {
        self + rhs
    }

    fn atom_add(atom: &Self::Atom, value: Self, order: Ordering) -> Self {
        let mut expected = Self::atom_load(atom, Ordering::Relaxed);
        loop {
            match Self::atom_compare_exchange_weak(
                atom,
                expected,
                expected + value,
                order,
                Ordering::Relaxed,
            ) {
                Ok(previous) => return previous,
                Err(actual) => expected = actual,
            }
        }
    }
}

impl Scalar for bool {
    type Atom = AtomicBool;

    fn new_atom(value: Self) -> Self::Atom {
        AtomicBool::new(value)
    }

    fn atom_load(atom: &Self::Atom, order: Ordering) -> Self {
        atom.load(order)
    }

    fn atom_store(atom: &Self::Atom, value: Self, order: Ordering) {
        atom.store(value, order)
    }

    fn atom_compare_exchange_weak(
        atom: &Self::Atom,
        current: Self,
        new: Self,
        success: Ordering,
        failure: Ordering,
    ) -> Result<Self, Self> {
        atom.compare_exchange_weak(current, new, success, failure)
    }
}

impl Scalar for OtherWaitReason {
    type Atom = AtomicU8;

    fn new_atom(value: Self) -> Self::Atom {
        AtomicU8::new(value as u8)
    }

    fn atom_load(atom: &Self::Atom, order: Ordering) -> Self {
        OtherWaitReason::from_u8(atom.load(order))
    }

    fn atom_store(atom: &Self::Atom, value: Self, order: Ordering) {
        atom.store(value as u8, order)
    }

    fn atom_compare_exchange_weak(
        atom: &Self::Atom,
        current: Self,
        new: Self,
        success: Ordering,
        failure: Ordering,
    ) -> Result<Self, Self> {
        atom.compare_exchange_weak(current as u8, new as u8, success, failure)
            .map(OtherWaitReason::from_u8)
            .map_err(OtherWaitReason::from_u8)
    }
}

/// Multiple writer, multiple reader atomic with relaxed ordering
pub struct RelaxedAtomic<T: Scalar> {
    atom: T::Atom,
}

impl<T: Scalar> RelaxedAtomic<T> {
    pub fn new(value: T) -> Self {
        RelaxedAtomic {
            atom: T::new_atom(value),
        }
    }

    pub fn load(&self) -> T {
        T::atom_load(&self.atom, Ordering::Relaxed)
    }

    pub fn store(&self, value: T) {
        T::atom_store(&self.atom, value, Ordering::Relaxed)
    }

    pub fn compare_exchange_weak(&self, current: T, new: T) -> Result<T, T> {
        T::atom_compare_exchange_weak(&self.atom, current, new, Ordering::Relaxed, Ordering::Relaxed)
    }
}

impl<T: Accumulate> RelaxedAtomic<T> {
    /// Returns the previous value.
    pub fn fetch_add(&self, value: T) -> T {
        T::atom_add(&self.atom, value, Ordering::Relaxed)
    }

    /// Returns the new value.
    pub fn add_assign(&self, value: T) -> T {
        self.fetch_add(value).plus(value)
    }
}

impl<T: Counter> RelaxedAtomic<T> {
    /// Returns the new value.
    pub fn increment(&self) -> T {
        self.add_assign(T::ONE)
    }

    /// Returns the new value.
    pub fn decrement(&self) -> T {
        T::atom_sub(&self.atom, T::ONE, Ordering::Relaxed).minus(T::ONE)
    }
}

impl<T: Scalar> Default for RelaxedAtomic<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: Scalar + fmt::Debug> fmt::Debug for RelaxedAtomic<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.load(), f)
    }
}

/// Single writer, multiple reader atomic
///
/// Only the owning thread may call the mutating methods. Other threads may
/// call [`load`](Self::load) at any time.
pub struct UnorderedAtomic<T: Scalar> {
    atom: T::Atom,
}

impl<T: Scalar> UnorderedAtomic<T> {
    pub fn new(value: T) -> Self {
        UnorderedAtomic {
            atom: T::new_atom(value),
        }
    }

    pub fn load(&self) -> T {
        T::atom_load(&self.atom, Ordering::Relaxed)
    }

    pub fn store(&self, value: T) {
        T::atom_store(&self.atom, value, Ordering::Relaxed)
    }
}

impl<T: Accumulate> UnorderedAtomic<T> {
    /// Returns the new value.
    pub fn add_assign(&self, value: T) -> T {
        let new = self.load().plus(value);
        self.store(new);
        new
    }
}

impl<T: Counter> UnorderedAtomic<T> {
    /// Returns the new value.
    pub fn increment(&self) -> T {
        self.add_assign(T::ONE)
    }

    /// Returns the new value.
    pub fn decrement(&self) -> T {
        let new = self.load().minus(T::ONE);
        self.store(new);
        new
    }
}

impl<T: Scalar> Default for UnorderedAtomic<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: Scalar + fmt::Debug> fmt::Debug for UnorderedAtomic<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.load(), f)
    }
}

/// Destinations accepted by [`atomic_add_to`]
pub trait AtomicAddTo<T> {
    fn atomic_add_to(&self, value: T);
}

impl<T: Accumulate> AtomicAddTo<T> for RelaxedAtomic<T> {
    fn atomic_add_to(&self, value: T) {
        self.fetch_add(value);
    }
}

impl<T: Accumulate> AtomicAddTo<T> for UnorderedAtomic<T> {
    fn atomic_add_to(&self, value: T) {
        self.add_assign(value);
    }
}

/// Accumulates `value` into `dst`
///
/// Integer destinations use a fetch-add; floating point destinations use a
/// compare-exchange loop.
pub fn atomic_add_to<T, A: AtomicAddTo<T> + ?Sized>(dst: &A, value: T) {
    dst.atomic_add_to(value)
}

/// Prevents the compiler from caching or reordering memory accesses across
/// the call. Emits no CPU fence.
#[inline(always)]
pub fn compiler_memory_barrier() {
    atomic::compiler_fence(Ordering::SeqCst);
}

/// Issued after every lock state change.
///
/// Thread metadata uses [`UnorderedAtomic`], whose loads and stores the
/// compiler may otherwise keep in registers across inlined lock calls, which
/// would hide the state from diagnostic readers for longer than necessary.
#[inline(always)]
pub fn metadata_memory_barrier_if_needed() {
    compiler_memory_barrier();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_relaxed_counter_operations() {
        let counter = RelaxedAtomic::new(5u64);
        assert_eq!(counter.increment(), 6);
        assert_eq!(counter.decrement(), 5);
        assert_eq!(counter.add_assign(10), 15);
        assert_eq!(counter.fetch_add(1), 15);
        assert_eq!(counter.load(), 16);

        let mut current = counter.load();
        while let Err(actual) = counter.compare_exchange_weak(current, 100) {
            current = actual;
        }
        assert_eq!(counter.load(), 100);
    }

    #[test]
    fn test_relaxed_counter_multiple_writers() {
        let counter = Arc::new(RelaxedAtomic::new(0u64));
        let sum = Arc::new(RelaxedAtomic::new(0.0f64));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let counter = Arc::clone(&counter);
                let sum = Arc::clone(&sum);
                thread::spawn(move || {
                    for _ in 0..1000 {
                        counter.increment();
                        atomic_add_to(&*sum, 0.5);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(counter.load(), 8000);
        assert_eq!(sum.load(), 4000.0);
    }

    #[test]
    fn test_unordered_single_writer() {
        let value = UnorderedAtomic::new(0usize);
        assert_eq!(value.increment(), 1);
        assert_eq!(value.add_assign(4), 5);
        assert_eq!(value.decrement(), 4);
        atomic_add_to(&value, 6usize);
        assert_eq!(value.load(), 10);

        let reason = UnorderedAtomic::new(OtherWaitReason::None);
        reason.store(OtherWaitReason::Queue);
        assert_eq!(reason.load(), OtherWaitReason::Queue);
    }

    #[test]
    fn test_float_accumulation() {
        let value = RelaxedAtomic::new(1.5f64);
        assert_eq!(value.fetch_add(2.25), 1.5);
        assert_eq!(value.add_assign(0.25), 4.0);
    }
}
