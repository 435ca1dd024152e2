use audio_mutex::{DeadlockInfo, ThreadId, detect};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};
use std::time::{Duration, Instant};

#[allow(dead_code)]
pub const DEADLOCK_TIMEOUT: Duration = Duration::from_secs(3);
#[allow(dead_code)]
pub const NO_DEADLOCK_TIMEOUT: Duration = Duration::from_millis(500);

/// Environment variable that switches a test into its aborting child role
#[allow(dead_code)]
pub const CHILD_ENV: &str = "AUDIO_MUTEX_TEST_CHILD";
/// Event log path handed to the child process
#[allow(dead_code)]
pub const CHILD_LOG_ENV: &str = "AUDIO_MUTEX_TEST_LOG";

/// Polls `condition` until it holds or `timeout` elapses
#[allow(dead_code)]
pub fn wait_for(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}

/// Polls `detect(tid)` until it reports a cycle
#[allow(dead_code)]
pub fn expect_deadlock(tid: ThreadId, timeout: Duration) -> DeadlockInfo {
    let mut info = detect(tid);
    let found = wait_for(timeout, || {
        info = detect(tid);
        info.has_cycle
    });
    assert!(found, "No deadlock detected within {timeout:?}, last: {info}");
    info
}

/// Polls `detect(tid)` until it reports any wait chain
#[allow(dead_code)]
pub fn expect_chain(tid: ThreadId, timeout: Duration) -> DeadlockInfo {
    let mut info = detect(tid);
    let found = wait_for(timeout, || {
        info = detect(tid);
        !info.is_empty()
    });
    assert!(found, "No wait chain for tid {tid} within {timeout:?}");
    info
}

/// Whether this process is the child spawned by [`run_child`]
#[allow(dead_code)]
pub fn is_child() -> bool {
    std::env::var_os(CHILD_ENV).is_some()
}

/// Event log path passed by the parent, if any
#[allow(dead_code)]
pub fn child_log() -> Option<PathBuf> {
    std::env::var_os(CHILD_LOG_ENV).map(PathBuf::from)
}

/// Re-runs the single test `name` of the current test binary in a child
/// process with [`CHILD_ENV`] set
#[allow(dead_code)]
pub fn run_child(name: &str, log: Option<&Path>) -> ExitStatus {
    let exe = std::env::current_exe().expect("test binary path");
    let mut command = Command::new(exe);
    command
        .args([name, "--exact", "--test-threads=1", "--nocapture"])
        .env(CHILD_ENV, "1");
    if let Some(log) = log {
        command.env(CHILD_LOG_ENV, log);
    }
    command.status().expect("failed to run child test process")
}
