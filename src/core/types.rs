use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Thread identifier type
///
/// Uniquely identifies a thread in the application. Identifiers are never
/// reused within a process.
pub type ThreadId = usize;

/// The tid value meaning "no thread"
pub const INVALID_TID: ThreadId = 0;

// Global counter for assigning unique thread IDs
static THREAD_ID_COUNTER: AtomicUsize = AtomicUsize::new(1);

// Thread-local storage for each thread's assigned ID
thread_local! {
    static THREAD_ID: ThreadId = {
        // Each thread gets a unique ID once, when this is first accessed
        THREAD_ID_COUNTER.fetch_add(1, Ordering::SeqCst)
    };
}

/// Get a unique identifier of the current thread
/// This will always return the same ID for the lifetime of the thread
pub fn current_thread_id() -> ThreadId {
    THREAD_ID.try_with(|&id| id).unwrap_or(INVALID_TID)
}

/// Opaque identity of a mutex instance: its address.
///
/// Handles are only ever compared, never dereferenced, so a handle may
/// outlive the mutex it names. `0` is the null handle.
pub type MutexHandle = usize;

/// The null mutex handle
pub const NO_HANDLE: MutexHandle = 0;

/// Order value used when an "other wait" carries no class
pub const NO_ORDER: usize = usize::MAX;

/// Reasons a thread may be blocked on another thread besides a mutex
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum OtherWaitReason {
    #[default]
    None = 0,
    /// Waiting on a condition variable for a notifier thread
    Condition = 1,
    /// Joining a thread
    Join = 2,
    /// Waiting on a cross-thread queue
    Queue = 3,
}

impl OtherWaitReason {
    pub fn as_str(self) -> &'static str {
        match self {
            OtherWaitReason::None => "none",
            OtherWaitReason::Condition => "cv",
            OtherWaitReason::Join => "join",
            OtherWaitReason::Queue => "queue",
        }
    }

    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            1 => OtherWaitReason::Condition,
            2 => OtherWaitReason::Join,
            3 => OtherWaitReason::Queue,
            _ => OtherWaitReason::None,
        }
    }
}

impl fmt::Display for OtherWaitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Represents the result of a wait-for chain walk
///
/// Produced by [`detect`](crate::detect) for one thread. If a cycle is
/// detected, the last element of `chain` is a tid that appears earlier in
/// the chain (or is `tid` itself).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeadlockInfo {
    /// Thread for which the chain was computed
    pub tid: ThreadId,

    /// True if the chain closes on a thread already visited
    pub has_cycle: bool,

    /// The last non-mutex wait reason followed while walking the chain
    pub other_wait_reason: OtherWaitReason,

    /// Wait chain of (tid, edge label) hops
    ///
    /// Lock edges are labelled with the class name of the lock, condition
    /// edges with `cv-` plus the class name, join and queue edges with
    /// `join` and `queue`.
    pub chain: Vec<(ThreadId, String)>,

    /// True when some holding stack was truncated while building the chain,
    /// so edges may be missing
    pub approximate: bool,
}

impl DeadlockInfo {
    pub fn new(tid: ThreadId) -> Self {
        DeadlockInfo {
            tid,
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }
}

impl fmt::Display for DeadlockInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.has_cycle {
            f.write_str("mutex cycle found (last tid repeated) ")?;
        } else {
            f.write_str("mutex wait chain ")?;
        }
        write!(f, "[ {}", self.tid)?;
        for (tid, name) in &self.chain {
            write!(f, ", {} (by {})", tid, name)?;
        }
        f.write_str(" ]")
    }
}
