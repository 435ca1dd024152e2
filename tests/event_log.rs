#![cfg(feature = "tracking")]

use audio_mutex::order::AudioFlingerClientMutex;
use audio_mutex::{Config, Mutex, current_log_file, is_logging_enabled, thread};
use std::fs;
use std::sync::{Arc, Barrier};
mod common;
use common::{DEADLOCK_TIMEOUT, expect_deadlock};

#[test]
fn test_deadlock_is_logged() {
    let dir = tempfile::tempdir().unwrap();
    Config::new()
        .priority_inheritance(true)
        .with_log(dir.path().join("logs").join("audio_{timestamp}.log"))
        .start()
        .expect("Failed to initialize logger");

    assert!(is_logging_enabled());
    let log_file = current_log_file().unwrap();
    let name = log_file.file_name().unwrap().to_string_lossy().into_owned();
    assert!(name.starts_with("audio_") && !name.contains('{'), "{name}");
    assert!(log_file.exists());

    let first: Arc<Mutex<(), AudioFlingerClientMutex>> = Arc::new(Mutex::with_class(()));
    let second: Arc<Mutex<(), AudioFlingerClientMutex>> = Arc::new(Mutex::with_class(()));
    assert!(first.priority_inheritance());
    let barrier = Arc::new(Barrier::new(2));

    let spawn_pair = |a: Arc<Mutex<(), AudioFlingerClientMutex>>,
                      b: Arc<Mutex<(), AudioFlingerClientMutex>>| {
        let barrier = barrier.clone();
        thread::spawn(move || {
            let _a = a.lock();
            barrier.wait();
            let _b = b.lock();
        })
    };
    let t1 = spawn_pair(first.clone(), second.clone());
    let t2 = spawn_pair(second.clone(), first.clone());

    let info = expect_deadlock(t1.tid(), DEADLOCK_TIMEOUT);
    assert_eq!(info.chain.len(), 2);

    let contents = fs::read_to_string(&log_file).unwrap();
    let deadlocks: Vec<serde_json::Value> = contents
        .lines()
        .map(|line| serde_json::from_str::<serde_json::Value>(line).unwrap())
        .filter(|entry| entry["record"].get("deadlock").is_some())
        .collect();
    assert!(!deadlocks.is_empty());

    let entry = &deadlocks[deadlocks.len() - 1];
    assert!(entry["timestamp"].as_f64().unwrap() > 0.0);
    let record = &entry["record"]["deadlock"];
    assert_eq!(record["tid"], t1.tid());
    assert_eq!(record["has_cycle"], true);
    assert_eq!(record["other_wait_reason"], "none");
    assert_eq!(record["chain"][0][0], t2.tid());
    assert_eq!(record["chain"][0][1], "AudioFlinger_ClientMutex");
    assert_eq!(record["chain"][1][0], t1.tid());

    // Threads remain deadlocked; we don't join them.
}
