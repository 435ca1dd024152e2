//! Scoped annotations for waits on other threads
//!
//! A thread blocked in a join or on a cross-thread queue holds no mutex the
//! detector could follow. These guards record the thread being waited on for
//! the duration of the blocking call so the wait-for chain can pass through.
//!
//! ```rust
//! use audio_mutex::{ScopedJoinWait, thread};
//!
//! let worker = thread::spawn(|| 7);
//! let tid = worker.tid();
//! let result = {
//!     let _wait = ScopedJoinWait::new(tid);
//!     worker.into_inner().join()
//! };
//! assert_eq!(result.unwrap(), 7);
//! ```

use crate::core::atomics::metadata_memory_barrier_if_needed;
use crate::core::tracking::{begin_join_wait, begin_queue_wait, end_join_wait, end_queue_wait};
use crate::core::types::ThreadId;
use std::marker::PhantomData;

/// Marks the current thread as joining thread `tid` until dropped
#[must_use = "the annotation ends when the guard is dropped"]
#[derive(Debug)]
pub struct ScopedJoinWait {
    // Must be dropped on the thread that created it.
    _not_send: PhantomData<*const ()>,
}

impl ScopedJoinWait {
    pub fn new(tid: ThreadId) -> Self {
        begin_join_wait(tid);
        metadata_memory_barrier_if_needed();
        ScopedJoinWait {
            _not_send: PhantomData,
        }
    }
}

impl Drop for ScopedJoinWait {
    fn drop(&mut self) {
        end_join_wait();
        metadata_memory_barrier_if_needed();
    }
}

/// Marks the current thread as waiting on a queue served by thread `tid`
/// until dropped
#[must_use = "the annotation ends when the guard is dropped"]
#[derive(Debug)]
pub struct ScopedQueueWait {
    _not_send: PhantomData<*const ()>,
}

impl ScopedQueueWait {
    pub fn new(tid: ThreadId) -> Self {
        begin_queue_wait(tid);
        metadata_memory_barrier_if_needed();
        ScopedQueueWait {
            _not_send: PhantomData,
        }
    }
}

impl Drop for ScopedQueueWait {
    fn drop(&mut self) {
        end_queue_wait();
        metadata_memory_barrier_if_needed();
    }
}

#[cfg(all(test, feature = "tracking"))]
mod tests {
    use super::*;
    use crate::core::thread_info;
    use crate::core::types::OtherWaitReason;

    #[test]
    fn test_annotations_are_scoped() {
        let record = thread_info::current().unwrap();
        {
            let _wait = ScopedQueueWait::new(77);
            let other = record.other_wait();
            assert_eq!(other.partner_tid, 77);
            assert_eq!(other.reason, OtherWaitReason::Queue);
        }
        assert!(!record.other_wait().is_active());

        {
            let _wait = ScopedJoinWait::new(78);
            assert_eq!(record.other_wait().reason, OtherWaitReason::Join);
        }
        assert!(!record.other_wait().is_active());
    }
}
