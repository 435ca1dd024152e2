//! Process-wide registry of thread records
//!
//! The registry lock is taken only on thread birth and death, and by
//! diagnostics for as long as it takes to copy the map. Records are held
//! weakly, so the registry never keeps a finished thread's record alive.

use crate::core::thread_info::ThreadRecord;
use crate::core::types::ThreadId;
use fxhash::FxHashMap;
use lazy_static::lazy_static;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::{Arc, Weak};
use tracing::{trace, warn};

/// Registry map copy, keyed by tid
pub type RegistrySnapshot = FxHashMap<ThreadId, Weak<ThreadRecord>>;

#[derive(Default)]
pub struct ThreadRegistry {
    threads: Mutex<RegistrySnapshot>,
}

impl ThreadRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false, leaving the existing entry, when the tid is present.
    pub fn add(&self, record: &Arc<ThreadRecord>) -> bool {
        let tid = record.tid();
        let mut threads = self.threads.lock();
        if threads.contains_key(&tid) {
            warn!(tid, "thread already registered");
            return false;
        }
        threads.insert(tid, Arc::downgrade(record));
        trace!(tid, "thread registered");
        true
    }

    pub fn remove(&self, tid: ThreadId) -> bool {
        let removed = self.threads.lock().remove(&tid).is_some();
        if removed {
            trace!(tid, "thread unregistered");
        } else {
            warn!(tid, "cannot find registry entry for thread");
        }
        removed
    }

    pub fn snapshot(&self) -> RegistrySnapshot {
        self.threads.lock().clone()
    }

    /// The live record of `tid`, if any
    pub fn get(&self, tid: ThreadId) -> Option<Arc<ThreadRecord>> {
        self.threads.lock().get(&tid).and_then(Weak::upgrade)
    }

    pub fn len(&self) -> usize {
        self.threads.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Text dump of every registered thread, in tid order
    pub fn report(&self) -> String {
        let ordered: BTreeMap<ThreadId, Weak<ThreadRecord>> = self.snapshot().into_iter().collect();
        let mut out = format!("thread count: {}\n", ordered.len());
        let mut idle = Vec::new();
        for (tid, weak) in &ordered {
            let Some(record) = weak.upgrade() else {
                continue;
            };
            if record.is_empty() {
                idle.push(*tid);
            } else {
                out.push_str(&record.to_string());
                out.push('\n');
            }
        }
        out.push_str("tids without current activity [ ");
        for tid in idle {
            out.push_str(&tid.to_string());
            out.push(' ');
        }
        out.push_str("]\n");
        out
    }
}

/// Looks up a live record in a registry copy.
pub fn lookup(snapshot: &RegistrySnapshot, tid: ThreadId) -> Option<Arc<ThreadRecord>> {
    snapshot.get(&tid).and_then(Weak::upgrade)
}

lazy_static! {
    static ref REGISTRY: ThreadRegistry = ThreadRegistry::new();
}

pub fn global() -> &'static ThreadRegistry {
    &REGISTRY
}

/// The live record of thread `tid`
pub fn thread_record(tid: ThreadId) -> Option<Arc<ThreadRecord>> {
    REGISTRY.get(tid)
}

/// Text dump of every thread that has used an instrumented mutex
pub fn all_threads_report() -> String {
    REGISTRY.report()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::INVALID_TID;

    // Records with the invalid tid do not unregister themselves on drop.
    fn detached() -> Arc<ThreadRecord> {
        Arc::new(ThreadRecord::new(INVALID_TID))
    }

    #[test]
    fn test_duplicate_add_and_missing_remove() {
        let registry = ThreadRegistry::new();
        let record = detached();
        assert!(registry.add(&record));
        assert!(!registry.add(&record));
        assert_eq!(registry.len(), 1);

        assert!(registry.remove(INVALID_TID));
        assert!(!registry.remove(INVALID_TID));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_weak_entries_do_not_resurrect() {
        let registry = ThreadRegistry::new();
        let record = detached();
        registry.add(&record);
        assert!(registry.get(INVALID_TID).is_some());

        drop(record);
        assert!(registry.get(INVALID_TID).is_none());
        assert!(lookup(&registry.snapshot(), INVALID_TID).is_none());
    }

    #[test]
    fn test_report_lists_idle_threads() {
        let registry = ThreadRegistry::new();
        let idle = detached();
        registry.add(&idle);
        assert_eq!(
            registry.report(),
            "thread count: 1\ntids without current activity [ 0 ]\n"
        );

        idle.push_held(0x10, 2);
        assert_eq!(
            registry.report(),
            "thread count: 1\ntid: 0\nwaiting: 0\nheld: size: 1 true_size: 1 items: [{ 16, 2 } ]\n\
             tids without current activity [ ]\n"
        );
    }
}
