//! On-demand wait-for chain analysis
//!
//! The detector copies the thread registry, maps every held mutex handle to
//! its holder, and follows "waits for" edges from one thread until the chain
//! ends or a thread repeats. It takes no lock besides the registry's, and
//! only while copying, so it cannot deadlock with the threads it inspects.
//!
//! Handles are compared, never dereferenced. A handle reused by a freshly
//! allocated mutex may yield a false cycle.

use crate::core::logger;
use crate::core::order::MUTEX_NAMES;
use crate::core::registry::{self, RegistrySnapshot};
use crate::core::types::{
    DeadlockInfo, INVALID_TID, MutexHandle, NO_HANDLE, OtherWaitReason, ThreadId,
};
use fxhash::{FxHashMap, FxHashSet};
use tracing::debug;

/// Walks the wait-for chain starting at `tid`, naming lock edges from the
/// shipped class table.
pub fn detect(tid: ThreadId) -> DeadlockInfo {
    detect_with_names(tid, MUTEX_NAMES)
}

/// Walks the wait-for chain starting at `tid`
///
/// `class_names` is indexed by class order; orders beyond it are labelled
/// `unknown`. A cycle is reported through the event log when logging is on.
pub fn detect_with_names(tid: ThreadId, class_names: &[&str]) -> DeadlockInfo {
    let snapshot = registry::global().snapshot();
    let info = walk(&snapshot, tid, class_names);
    if info.has_cycle {
        debug!(tid, "{}", info);
        logger::log_deadlock(tid, &info);
    }
    info
}

fn walk(snapshot: &RegistrySnapshot, tid: ThreadId, class_names: &[&str]) -> DeadlockInfo {
    let mut info = DeadlockInfo::new(tid);

    let Some(start) = registry::lookup(snapshot, tid) else {
        return info;
    };
    let mut waiting = start.waiting_handle();
    let mut other_wait = start.other_wait();
    if waiting == NO_HANDLE && other_wait.partner_tid == INVALID_TID {
        return info;
    }
    drop(start);

    let (holders, approximate) = holders(snapshot);
    if approximate {
        debug!(tid, "mutex info only subset, deadlock detection may be inaccurate");
    }
    info.approximate = approximate;

    let mut visited = FxHashSet::default();
    visited.insert(tid);
    loop {
        let (next_tid, order, reason) = match holders.get(&waiting) {
            Some(&(holder, order)) => (holder, order, OtherWaitReason::None),
            _ if other_wait.partner_tid != INVALID_TID => {
                info.other_wait_reason = other_wait.reason;
                (other_wait.partner_tid, other_wait.order, other_wait.reason)
            }
            _ => return info,
        };

        let name = class_names.get(order).copied().unwrap_or("unknown");
        let label = match reason {
            OtherWaitReason::Condition => format!("cv-{name}"),
            OtherWaitReason::Join => "join".to_string(),
            OtherWaitReason::Queue => "queue".to_string(),
            OtherWaitReason::None => name.to_string(),
        };
        info.chain.push((next_tid, label));

        if !visited.insert(next_tid) {
            info.has_cycle = true;
            return info;
        }

        // The thread may have exited meanwhile.
        let Some(record) = registry::lookup(snapshot, next_tid) else {
            return info;
        };
        waiting = record.waiting_handle();
        other_wait = record.other_wait();
    }
}

/// Maps each tracked held handle to `(holder tid, class order)`.
///
/// The flag is set when some holding stack has overflowed.
fn holders(snapshot: &RegistrySnapshot) -> (FxHashMap<MutexHandle, (ThreadId, usize)>, bool) {
    let mut holders = FxHashMap::default();
    let mut approximate = false;
    for (&tid, weak) in snapshot {
        let Some(record) = weak.upgrade() else {
            continue;
        };
        let stack = record.held();
        let entries = stack.entries();
        approximate |= entries.len() != stack.true_size();
        for entry in entries.into_iter().filter(|entry| entry.is_valid()) {
            holders.insert(entry.handle, (tid, entry.order));
        }
    }
    (holders, approximate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::thread_info::ThreadRecord;
    use std::sync::Arc;

    const NAMES: &[&str] = &["zero", "one", "two"];

    // Synthetic tids far from real ones; these records are never registered.
    fn record(tid: ThreadId) -> Arc<ThreadRecord> {
        Arc::new(ThreadRecord::new(tid))
    }

    fn snapshot_of(records: &[&Arc<ThreadRecord>]) -> RegistrySnapshot {
        records
            .iter()
            .map(|record| (record.tid(), Arc::downgrade(record)))
            .collect()
    }

    #[test]
    fn test_idle_thread_has_empty_chain() {
        let a = record(1_000_001);
        a.push_held(0x10, 1);
        let info = walk(&snapshot_of(&[&a]), a.tid(), NAMES);
        assert!(info.is_empty());
        assert!(!info.has_cycle);
        assert_eq!(walk(&snapshot_of(&[]), 42, NAMES), DeadlockInfo::new(42));
    }

    #[test]
    fn test_two_thread_cycle() {
        let a = record(1_000_011);
        let b = record(1_000_012);
        a.push_held(0x10, 1);
        b.push_held(0x20, 1);
        a.reset_waiter(0x20);
        b.reset_waiter(0x10);

        let info = walk(&snapshot_of(&[&a, &b]), a.tid(), NAMES);
        assert!(info.has_cycle);
        assert_eq!(
            info.chain,
            vec![(b.tid(), "one".to_string()), (a.tid(), "one".to_string())]
        );
        assert!(!info.approximate);
    }

    #[test]
    fn test_condition_and_join_edges() {
        let a = record(1_000_021);
        let b = record(1_000_022);
        let c = record(1_000_023);
        a.push_held(0x10, 2);
        a.remove_held_for_cv(0x10, 2, b.tid());
        b.add_wait_join(c.tid());

        let info = walk(&snapshot_of(&[&a, &b, &c]), a.tid(), NAMES);
        assert!(!info.has_cycle);
        assert_eq!(
            info.chain,
            vec![(b.tid(), "cv-two".to_string()), (c.tid(), "join".to_string())]
        );
        assert_eq!(info.other_wait_reason, OtherWaitReason::Join);
    }

    #[test]
    fn test_unknown_class_and_missing_partner() {
        let a = record(1_000_031);
        a.add_wait_queue(1_000_039);
        a.remove_held_for_cv(0x10, 9, 1_000_039);

        let info = walk(&snapshot_of(&[&a]), a.tid(), NAMES);
        assert_eq!(info.chain, vec![(1_000_039, "cv-unknown".to_string())]);
        assert!(!info.has_cycle);
    }
}
