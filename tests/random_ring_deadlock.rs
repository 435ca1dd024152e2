#![cfg(feature = "tracking")]

use audio_mutex::{Mutex, thread};
use rand::Rng;
use std::{
    collections::HashSet,
    sync::{Arc, Barrier},
    time::Duration,
};
mod common;
use common::expect_deadlock;

#[test]
fn test_random_ring_deadlock() {
    // Pick a random ring size between 3 and 8
    let mut rng = rand::rng();
    let n = rng.random_range(3..=8);
    println!("→ testing a ring of {} threads", n);

    // Build n locks in a ring, all of the default class
    let locks: Vec<_> = (0..n)
        .map(|i| Arc::new(Mutex::new(format!("L{}", i))))
        .collect();

    // Barrier so all threads start together
    let barrier = Arc::new(Barrier::new(n));
    let mut tids = Vec::with_capacity(n);

    for i in 0..n {
        let first = locks[i].clone();
        let second = locks[(i + 1) % n].clone();
        let bar = barrier.clone();

        let handle = thread::spawn(move || {
            let mut rng = rand::rng();

            // Rendezvous
            bar.wait();

            // Random jitter before first lock
            thread::sleep(Duration::from_millis(rng.random_range(0..20)));
            let _a = first.lock();

            // Random jitter before second lock
            thread::sleep(Duration::from_millis(rng.random_range(50..100)));
            let _b = second.lock();
        });
        tids.push(handle.tid());
    }

    let start = tids[0];
    let info = expect_deadlock(start, Duration::from_secs(5));

    assert_eq!(
        info.chain.len(),
        n,
        "Expected a cycle of length {}, got {}",
        n,
        info
    );
    assert!(info.chain.len() <= n + 1);
    assert_eq!(info.chain.last().unwrap().0, start);

    let expected: Vec<_> = tids[1..].iter().chain([&start]).copied().collect();
    let found: Vec<_> = info.chain.iter().map(|(tid, _)| *tid).collect();
    assert_eq!(found, expected);
    assert!(info.chain.iter().all(|(_, label)| label == "OtherMutex"));

    // Every member of the ring sees the same cycle.
    for &tid in &tids {
        let info = audio_mutex::detect(tid);
        assert!(info.has_cycle);
        let members: HashSet<_> = info.chain.iter().map(|(tid, _)| *tid).collect();
        assert_eq!(members.len(), n);
    }

    println!("✔ detected {}-cycle deadlock: {}", n, info);

    // Threads remain deadlocked; we don't join them.
}
