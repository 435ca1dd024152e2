//! Bounded stack of held locks
//!
//! Written only by the owning thread, read by diagnostics on any thread.
//! Each entry is a pair of independent atomics, so a reader may briefly see a
//! half-shifted entry or a duplicate during removal, never a torn value.
//!
//! When more than `N` locks are held the stack keeps a subset: the newest
//! push overwrites the topmost slot. A subset of an ordered stack is still
//! ordered. `true_size()` counts every push minus every removal; when it equals
//! `size()` the tracked stack is exact.

use crate::core::atomics::UnorderedAtomic;
use crate::core::types::{MutexHandle, NO_HANDLE};
use serde::Serialize;
use std::fmt;

/// Default number of tracked entries per thread
pub const HOLDING_STACK_CAPACITY: usize = 16;

/// A value copy of one stack slot
///
/// The zero entry (`NO_HANDLE`, order 0) stands for "nothing there".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub struct StackEntry {
    pub handle: MutexHandle,
    pub order: usize,
}

impl StackEntry {
    pub const INVALID: StackEntry = StackEntry {
        handle: NO_HANDLE,
        order: 0,
    };

    pub fn is_valid(&self) -> bool {
        self.handle != NO_HANDLE
    }
}

#[derive(Default)]
struct Slot {
    handle: UnorderedAtomic<MutexHandle>,
    order: UnorderedAtomic<usize>,
}

impl Slot {
    fn load(&self) -> StackEntry {
        StackEntry {
            handle: self.handle.load(),
            order: self.order.load(),
        }
    }

    fn store(&self, entry: StackEntry) {
        self.handle.store(entry.handle);
        self.order.store(entry.order);
    }
}

/// Fixed capacity stack of `(handle, order)` pairs
pub struct AtomicStack<const N: usize> {
    top: UnorderedAtomic<usize>,
    true_top: UnorderedAtomic<usize>,
    slots: [Slot; N],
}

/// The per-thread holding stack
pub type HoldingStack = AtomicStack<HOLDING_STACK_CAPACITY>;

impl<const N: usize> AtomicStack<N> {
    /// Creates an empty stack; a zero capacity is rejected at compile time.
    pub fn new() -> Self {
        const { assert!(N > 0, "AtomicStack needs room for at least one entry") };
        AtomicStack {
            top: UnorderedAtomic::new(0),
            true_top: UnorderedAtomic::new(0),
            slots: std::array::from_fn(|_| Slot::default()),
        }
    }

    pub const fn capacity() -> usize {
        N
    }

    /// Pushes onto the top, overwriting the topmost entry when full.
    pub fn push(&self, handle: MutexHandle, order: usize) {
        let top = self.top.load();
        let (location, increment) = if top >= N { (N - 1, 0) } else { (top, 1) };
        self.slots[location].store(StackEntry { handle, order });
        self.true_top.increment();
        self.top.store(top + increment);
    }

    /// Removes `handle`, which is usually but not necessarily on top.
    ///
    /// Returns false when the removal cannot correspond to an earlier push.
    pub fn remove(&self, handle: MutexHandle) -> bool {
        if self.true_top.load() == 0 {
            return false;
        }
        self.true_top.decrement();

        let top = self.top.load();
        for i in (0..top).rev() {
            if self.slots[i].handle.load() != handle {
                continue;
            }
            // Shift down to keep the order. A reader may see a duplicate
            // entry meanwhile, which is better than a missing one.
            for j in i..top - 1 {
                self.slots[j].store(self.slots[j + 1].load());
            }
            self.top.store(top - 1);
            return true;
        }

        // Not tracked: fine as long as it was one of the overflowed entries.
        if self.true_top.load() >= top {
            return true;
        }
        self.true_top.store(top);
        false
    }

    /// Entry `offset` positions below the top.
    pub fn top(&self, offset: usize) -> StackEntry {
        let top = self.top.load();
        match top.checked_sub(offset) {
            Some(position) if position > 0 && position <= N => self.slots[position - 1].load(),
            _ => StackEntry::INVALID,
        }
    }

    /// Entry `offset` positions above the bottom.
    pub fn bottom(&self, offset: usize) -> StackEntry {
        if offset < self.top.load().min(N) {
            self.slots[offset].load()
        } else {
            StackEntry::INVALID
        }
    }

    pub fn size(&self) -> usize {
        self.top.load()
    }

    pub fn true_size(&self) -> usize {
        self.true_top.load()
    }

    pub fn is_empty(&self) -> bool {
        self.true_size() == 0
    }

    /// Tracked entries, bottom first.
    pub fn entries(&self) -> Vec<StackEntry> {
        (0..self.size().min(N)).map(|i| self.slots[i].load()).collect()
    }
}

impl<const N: usize> Default for AtomicStack<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> fmt::Display for AtomicStack<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "size: {} true_size: {} items: [",
            self.size(),
            self.true_size()
        )?;
        for entry in self.entries() {
            write!(f, "{{ {}, {} }} ", entry.handle, entry.order)?;
        }
        f.write_str("]")
    }
}

impl<const N: usize> fmt::Debug for AtomicStack<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AtomicStack")
            .field("size", &self.size())
            .field("true_size", &self.true_size())
            .field("entries", &self.entries())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handles<const N: usize>(stack: &AtomicStack<N>) -> Vec<MutexHandle> {
        stack.entries().iter().map(|e| e.handle).collect()
    }

    #[test]
    fn test_push_remove_lifo() {
        let stack = AtomicStack::<4>::new();
        stack.push(0x10, 1);
        stack.push(0x20, 2);
        assert_eq!(stack.top(0), StackEntry { handle: 0x20, order: 2 });
        assert_eq!(stack.top(1), StackEntry { handle: 0x10, order: 1 });
        assert_eq!(stack.top(2), StackEntry::INVALID);
        assert_eq!(stack.bottom(0).handle, 0x10);

        assert!(stack.remove(0x20));
        assert!(stack.remove(0x10));
        assert!(stack.is_empty());
        assert_eq!(stack.size(), 0);
    }

    #[test]
    fn test_remove_out_of_order_shifts_down() {
        let stack = AtomicStack::<4>::new();
        stack.push(0x10, 1);
        stack.push(0x20, 2);
        stack.push(0x30, 3);

        assert!(stack.remove(0x20));
        assert_eq!(handles(&stack), vec![0x10, 0x30]);
        assert_eq!(stack.top(0).order, 3);
        assert_eq!(stack.size(), 2);
        assert_eq!(stack.true_size(), 2);
    }

    #[test]
    fn test_overflow_replaces_top() {
        let stack = AtomicStack::<2>::new();
        stack.push(0x10, 1);
        stack.push(0x20, 2);
        stack.push(0x30, 3);

        assert_eq!(stack.size(), 2);
        assert_eq!(stack.true_size(), 3);
        assert_eq!(handles(&stack), vec![0x10, 0x30]);

        // The displaced entry is removed by count only.
        assert!(stack.remove(0x20));
        assert_eq!(stack.true_size(), 2);
        assert_eq!(stack.size(), 2);

        assert!(stack.remove(0x30));
        assert!(stack.remove(0x10));
        assert!(stack.is_empty());
    }

    #[test]
    fn test_single_slot_overflow() {
        let stack = AtomicStack::<1>::new();
        assert_eq!(AtomicStack::<1>::capacity(), 1);
        stack.push(0x10, 1);
        stack.push(0x20, 2);
        stack.push(0x30, 3);

        assert_eq!(stack.size(), 1);
        assert_eq!(stack.true_size(), 3);
        assert_eq!(stack.top(0), StackEntry { handle: 0x30, order: 3 });
        assert_eq!(stack.top(1), StackEntry::INVALID);

        assert!(stack.remove(0x20));
        assert!(stack.remove(0x10));
        assert_eq!(stack.size(), 1);
        assert!(stack.remove(0x30));
        assert!(stack.is_empty());
        assert_eq!(stack.true_size(), 0);
    }

    #[test]
    fn test_unbalanced_remove() {
        let stack = AtomicStack::<4>::new();
        assert!(!stack.remove(0x10));

        stack.push(0x10, 1);
        assert!(!stack.remove(0x99));
        assert_eq!(stack.true_size(), 1);
        assert_eq!(stack.size(), 1);
    }

    #[test]
    fn test_display() {
        let stack = AtomicStack::<4>::new();
        stack.push(16, 3);
        assert_eq!(stack.to_string(), "size: 1 true_size: 1 items: [{ 16, 3 } ]");
    }
}
