#![cfg(feature = "tracking")]

use audio_mutex::order::AsyncCallbackThreadMutex;
use audio_mutex::{Config, Mutex, UniqueLock, current_thread_record, violation_counts};
use std::mem;
mod common;
use common::{is_child, run_child};

type CallbackMutex = Mutex<u32, AsyncCallbackThreadMutex>;

#[test]
fn test_unlock_without_lock_aborts() {
    if is_child() {
        let mutex: CallbackMutex = Mutex::with_class(0);
        let mut lock = UniqueLock::deferred(&mutex);
        lock.unlock();
        unreachable!("unlocking an unowned lock must abort");
    }

    let status = run_child("test_unlock_without_lock_aborts", None);
    assert!(!status.success(), "child exited normally: {status:?}");
}

#[test]
fn test_invalid_unlocks_when_not_fatal() {
    if is_child() {
        return;
    }
    Config::new()
        .abort_on_invalid_unlock(false)
        .start()
        .expect("Failed to configure");

    let mutex: CallbackMutex = Mutex::with_class(0);
    let record = current_thread_record().unwrap();

    // Releasing a forgotten guard on the owning thread is fine.
    mem::forget(mutex.lock());
    unsafe { mutex.force_unlock() };
    assert!(record.held().is_empty());
    assert_eq!(violation_counts().invalid_unlocks, 0);

    let mut lock = UniqueLock::deferred(&mutex);
    lock.unlock();
    assert_eq!(violation_counts().invalid_unlocks, 1);

    // Released by a thread that never locked it.
    mem::forget(mutex.lock());
    std::thread::scope(|s| {
        s.spawn(|| unsafe { mutex.force_unlock() });
    });
    assert_eq!(violation_counts().invalid_unlocks, 2);
    assert!(!mutex.is_locked());

    // The owner's record still lists the mutex.
    assert_eq!(record.held().top(0).handle, mutex.handle());
}
