//! Per-thread lock holding record
//!
//! Each thread that touches an instrumented mutex owns one [`ThreadRecord`],
//! created lazily and registered with the thread registry. The owning thread
//! is the only writer. Diagnostics read the fields from other threads without
//! coordination, so a combination of fields may be inconsistent.

use crate::core::atomics::UnorderedAtomic;
use crate::core::registry;
use crate::core::stack::{HoldingStack, StackEntry};
use crate::core::types::{
    INVALID_TID, MutexHandle, NO_HANDLE, NO_ORDER, OtherWaitReason, ThreadId, current_thread_id,
};
use std::fmt;
use std::sync::Arc;

/// Value copy of a thread's non-mutex wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OtherWaitInfo {
    pub partner_tid: ThreadId,
    pub reason: OtherWaitReason,
    pub order: usize,
}

impl OtherWaitInfo {
    pub fn is_active(&self) -> bool {
        self.partner_tid != INVALID_TID
    }
}

impl fmt::Display for OtherWaitInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.is_active() {
            return Ok(());
        }
        match self.reason {
            OtherWaitReason::None => Ok(()),
            OtherWaitReason::Condition => {
                write!(f, "cv_tid: {}  cv_order: {}", self.partner_tid, self.order)
            }
            OtherWaitReason::Join => write!(f, "join_tid: {}", self.partner_tid),
            OtherWaitReason::Queue => write!(f, "queue_tid: {}", self.partner_tid),
        }
    }
}

struct OtherWait {
    /// Thread expected to wake us
    partner_tid: UnorderedAtomic<ThreadId>,
    reason: UnorderedAtomic<OtherWaitReason>,
    /// Order of the mutex released by a condition wait
    order: UnorderedAtomic<usize>,
}

/// Locks held and waited on by one thread
pub struct ThreadRecord {
    /// Id of the thread this record describes
    tid: ThreadId,
    /// Mutex the thread is blocked on, or `NO_HANDLE`
    waiting: UnorderedAtomic<MutexHandle>,
    /// Wait on another thread that holds no mutex we could follow
    other_wait: OtherWait,
    /// Mutexes currently held, most recent on top
    held: HoldingStack,
}

impl ThreadRecord {
    pub fn new(tid: ThreadId) -> Self {
        ThreadRecord {
            tid,
            waiting: UnorderedAtomic::new(NO_HANDLE),
            other_wait: OtherWait {
                partner_tid: UnorderedAtomic::new(INVALID_TID),
                reason: UnorderedAtomic::new(OtherWaitReason::None),
                order: UnorderedAtomic::new(NO_ORDER),
            },
            held: HoldingStack::new(),
        }
    }

    pub fn tid(&self) -> ThreadId {
        self.tid
    }

    /// Handle of the mutex this thread is blocked acquiring, or `NO_HANDLE`
    pub fn waiting_handle(&self) -> MutexHandle {
        self.waiting.load()
    }

    pub fn reset_waiter(&self, handle: MutexHandle) {
        self.waiting.store(handle);
    }

    pub fn other_wait(&self) -> OtherWaitInfo {
        OtherWaitInfo {
            partner_tid: self.other_wait.partner_tid.load(),
            reason: self.other_wait.reason.load(),
            order: self.other_wait.order.load(),
        }
    }

    pub fn held(&self) -> &HoldingStack {
        &self.held
    }

    /// Finds the held entry that forbids acquiring `handle` at `order`.
    ///
    /// An entry of higher order is an inversion; the same handle at the same
    /// order is recursion. The stack is ordered, so scanning stops at the
    /// first lower order.
    pub fn check_held(&self, handle: MutexHandle, order: usize) -> Option<StackEntry> {
        for offset in 0..self.held.size() {
            let entry = self.held.top(offset);
            if entry.order < order {
                break;
            }
            if entry.order > order || entry.handle == handle {
                return Some(entry);
            }
        }
        None
    }

    /// Records an acquisition. Call [`check_held`](Self::check_held) first.
    pub fn push_held(&self, handle: MutexHandle, order: usize) {
        self.held.push(handle, order);
    }

    pub fn remove_held(&self, handle: MutexHandle) -> bool {
        self.held.remove(handle)
    }

    /// Reacquisition after a condition wait; the wait is over.
    pub fn push_held_for_cv(&self, handle: MutexHandle, order: usize) {
        self.push_held(handle, order);
        self.other_wait.partner_tid.store(INVALID_TID);
    }

    /// Release for a condition wait on `notifier_tid`.
    pub fn remove_held_for_cv(
        &self,
        handle: MutexHandle,
        order: usize,
        notifier_tid: ThreadId,
    ) -> bool {
        self.other_wait.order.store(order);
        self.other_wait.reason.store(OtherWaitReason::Condition);
        self.other_wait.partner_tid.store(notifier_tid);
        self.remove_held(handle)
    }

    pub fn add_wait_join(&self, tid: ThreadId) {
        self.set_other_wait(OtherWaitReason::Join, tid);
    }

    pub fn remove_wait_join(&self) {
        self.other_wait.partner_tid.store(INVALID_TID);
    }

    pub fn add_wait_queue(&self, tid: ThreadId) {
        self.set_other_wait(OtherWaitReason::Queue, tid);
    }

    pub fn remove_wait_queue(&self) {
        self.other_wait.partner_tid.store(INVALID_TID);
    }

    fn set_other_wait(&self, reason: OtherWaitReason, tid: ThreadId) {
        self.other_wait.reason.store(reason);
        self.other_wait.partner_tid.store(tid);
    }

    /// True when the thread neither waits for nor holds a mutex.
    pub fn is_empty(&self) -> bool {
        self.waiting_handle() == NO_HANDLE && self.held.size() == 0
    }
}

impl fmt::Display for ThreadRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tid: {}\nwaiting: {}", self.tid, self.waiting_handle())?;
        let other_wait = self.other_wait();
        if other_wait.is_active() {
            write!(f, "\n{}", other_wait)?;
        }
        write!(f, "\nheld: {}", self.held)
    }
}

impl fmt::Debug for ThreadRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadRecord")
            .field("tid", &self.tid)
            .field("waiting", &self.waiting_handle())
            .field("other_wait", &self.other_wait())
            .field("held", &self.held)
            .finish()
    }
}

impl Drop for ThreadRecord {
    fn drop(&mut self) {
        if self.tid != INVALID_TID {
            registry::global().remove(self.tid);
        }
    }
}

thread_local! {
    static CURRENT: Arc<ThreadRecord> = {
        let record = Arc::new(ThreadRecord::new(current_thread_id()));
        registry::global().add(&record);
        record
    };
}

/// Runs `f` on the calling thread's record, creating it on first use.
///
/// Returns `None` once the thread's locals are being torn down.
#[cfg_attr(not(feature = "tracking"), allow(dead_code))]
pub(crate) fn with_current<R>(f: impl FnOnce(&ThreadRecord) -> R) -> Option<R> {
    CURRENT.try_with(|record| f(record)).ok()
}

/// The calling thread's record
pub fn current() -> Option<Arc<ThreadRecord>> {
    CURRENT.try_with(Arc::clone).ok()
}
