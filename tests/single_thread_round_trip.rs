#![cfg(feature = "tracking")]

use audio_mutex::order::{CommandThreadMutex, EffectBasePolicyMutex, LockClass, UidPolicyMutex};
use audio_mutex::{Mutex, class_stats, current_thread_record, violation_counts};

#[test]
fn test_nested_lock_round_trip() {
    let policy: Mutex<u32, EffectBasePolicyMutex> = Mutex::with_class(0);
    let command: Mutex<u32, CommandThreadMutex> = Mutex::with_class(0);
    let record = current_thread_record().expect("thread record");
    let before = record.held().entries();

    {
        let mut a = policy.lock();
        let mut b = a.then_lock(&command);
        *b += 1;
        *a += 1;
        assert_eq!(record.held().size(), before.len() + 2);
        assert_eq!(record.held().top(0).order, CommandThreadMutex::ORDER);
        assert_eq!(record.held().top(1).order, EffectBasePolicyMutex::ORDER);
    }

    assert_eq!(record.held().entries(), before);
    assert!(record.held().is_empty());

    for order in [EffectBasePolicyMutex::ORDER, CommandThreadMutex::ORDER] {
        let stats = class_stats(order).unwrap();
        assert_eq!(stats.locks, 1, "class {order}");
        assert_eq!(stats.unlocks, 1, "class {order}");
        assert_eq!(stats.waits, 0, "class {order}");
        assert_eq!(stats.uncontested(), 1);
    }
    assert_eq!(violation_counts().total(), 0);
}

#[test]
fn test_uncontested_locks_accumulate_no_wait_time() {
    let mutex: Mutex<Vec<u32>, UidPolicyMutex> = Mutex::with_class(Vec::new());
    for i in 0..1000 {
        mutex.lock().push(i);
    }
    assert_eq!(mutex.lock().len(), 1000);

    let stats = mutex.stats();
    assert_eq!(stats.locks, 1001);
    assert_eq!(stats.unlocks, 1001);
    assert_eq!(stats.waits, 0);
    assert_eq!(stats.uncontested(), stats.locks - stats.waits);
    assert_eq!(stats.wait_sum_ns, 0.0);
    assert_eq!(stats.wait_sumsq_ns, 0.0);
    assert_eq!(stats.avg_wait_ms(), 0.0);
    assert_eq!(stats.std_wait_ms(), 0.0);
}
