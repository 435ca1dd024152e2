//! # audio-mutex
//!
//! Instrumented mutexes for a multithreaded audio service, with lock-order
//! checking and on-demand deadlock analysis.
//!
//! Every [`Mutex`] belongs to a lock class with a fixed order. Each thread
//! keeps a small lock-free record of the mutexes it holds and the one it is
//! blocked on, so another thread can inspect it without stopping anybody.
//!
//! ## Features
//!
//! - Lock-order and recursion checks on every acquisition
//! - Compile-time ordering for chained locks through [`MutexGuard::then_lock`]
//! - Per-class contention statistics ([`all_stats_report`])
//! - Wait-for chain and cycle detection across mutexes, condition variables,
//!   joins and queues ([`detect`])
//! - Optional JSON-lines event log ([`Config::with_log`])
//!
//! The run-time bookkeeping sits behind the default `tracking` Cargo
//! feature. Building with `--no-default-features` leaves plain
//! `parking_lot` locking: no checks, zero statistics and nothing for
//! [`detect`] to follow. [`TRACKING_ENABLED`] tells which build is running.
//!
//! ## Example
//!
//! ```rust
//! use audio_mutex::order::{EffectChainMutex, ThreadBaseMutex};
//! use audio_mutex::Mutex;
//!
//! let thread_state: Mutex<u32, ThreadBaseMutex> = Mutex::with_class(0);
//! let chain_state: Mutex<u32, EffectChainMutex> = Mutex::with_class(0);
//!
//! let mut outer = thread_state.lock();
//! let mut inner = outer.then_lock(&chain_state);
//! *inner += 1;
//! drop(inner);
//! *outer += 1;
//! ```

mod core;

pub use self::core::{
    Config, DeadlockInfo, INVALID_TID, MutexHandle, NO_HANDLE, OtherWaitReason,
    TRACKING_ENABLED, ThreadId, ThreadRecord, Violation, ViolationCounts, all_threads_report,
    config, current_thread_id, detect, order, thread, thread_record, violation_counts,
};
pub use self::core::detector::detect_with_names;
pub use self::core::locks::{
    condvar::{Condvar, NotifierWait, WaitTimeoutResult},
    mutex::{Mutex, MutexGuard},
    scoped::{LockSet, UniqueLock, scoped_lock},
    wait::{ScopedJoinWait, ScopedQueueWait},
};
pub use self::core::logger::{current_log_file, is_logging_enabled};
pub use self::core::stack::{HOLDING_STACK_CAPACITY, StackEntry};
pub use self::core::stats::{StatSnapshot, all_stats_report, class_stats};
pub use self::core::thread_info::{OtherWaitInfo, current as current_thread_record};

/// Building blocks shared by the lock types
pub mod sync {
    pub use crate::core::atomics::{
        AtomicAddTo, RelaxedAtomic, UnorderedAtomic, atomic_add_to, compiler_memory_barrier,
        metadata_memory_barrier_if_needed,
    };
    pub use crate::core::stack::{AtomicStack, HoldingStack};
}
