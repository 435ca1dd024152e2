//! Process-wide settings read on the locking hot path

use std::sync::atomic::{AtomicBool, Ordering};

static ABORT_ON_ORDER_CHECK: AtomicBool = AtomicBool::new(true);
static ABORT_ON_RECURSION_CHECK: AtomicBool = AtomicBool::new(true);
static ABORT_ON_INVALID_UNLOCK: AtomicBool = AtomicBool::new(true);
static PRIORITY_INHERITANCE: AtomicBool = AtomicBool::new(false);

pub fn abort_on_order_check() -> bool {
    ABORT_ON_ORDER_CHECK.load(Ordering::Relaxed)
}

pub fn abort_on_recursion_check() -> bool {
    ABORT_ON_RECURSION_CHECK.load(Ordering::Relaxed)
}

pub fn abort_on_invalid_unlock() -> bool {
    ABORT_ON_INVALID_UNLOCK.load(Ordering::Relaxed)
}

/// Default priority inheritance setting for newly constructed mutexes
pub fn priority_inheritance() -> bool {
    PRIORITY_INHERITANCE.load(Ordering::Relaxed)
}

pub(crate) fn set_abort_on_order_check(enabled: bool) {
    ABORT_ON_ORDER_CHECK.store(enabled, Ordering::Relaxed);
}

pub(crate) fn set_abort_on_recursion_check(enabled: bool) {
    ABORT_ON_RECURSION_CHECK.store(enabled, Ordering::Relaxed);
}

pub(crate) fn set_abort_on_invalid_unlock(enabled: bool) {
    ABORT_ON_INVALID_UNLOCK.store(enabled, Ordering::Relaxed);
}

pub(crate) fn set_priority_inheritance(enabled: bool) {
    PRIORITY_INHERITANCE.store(enabled, Ordering::Relaxed);
}
