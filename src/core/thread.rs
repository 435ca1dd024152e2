//! Native threads whose joins are visible to the deadlock detector.
//!
//! A drop-in replacement for the spawning half of `std::thread`. The spawned
//! thread's [`ThreadId`](crate::ThreadId) is published on its [`JoinHandle`],
//! and [`JoinHandle::join`] records a join wait on that thread while it
//! blocks. Threads started with plain `std::thread` work with the mutexes
//! too; they just lack the automatic join annotation.
//!
//! ## Usage
//!
//! ```rust
//! use audio_mutex::thread;
//!
//! let handle = thread::spawn(|| 42);
//! assert_ne!(handle.tid(), audio_mutex::INVALID_TID);
//! assert_eq!(handle.join().unwrap(), 42);
//!
//! thread::yield_now();
//! thread::sleep(std::time::Duration::from_millis(1));
//! ```

use crate::core::locks::wait::ScopedJoinWait;
use crate::core::types::{ThreadId, current_thread_id};
use std::sync::mpsc;

pub use std::thread::{Result, Thread, current, panicking, park, park_timeout, sleep, yield_now};

/// Spawns a new thread, returning a [`JoinHandle`] for it.
///
/// # Panics
///
/// Panics if the OS fails to create a thread; use [`Builder::spawn`]
/// to recover from such errors.
pub fn spawn<F, T>(f: F) -> JoinHandle<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    match Builder::new().spawn(f) {
        Ok(handle) => handle,
        Err(error) => panic!("failed to spawn thread: {error}"),
    }
}

/// Thread factory, wrapping [`std::thread::Builder`]
///
/// ```rust
/// use audio_mutex::thread;
///
/// let handle = thread::Builder::new()
///     .name("mixer".to_string())
///     .stack_size(64 * 1024)
///     .spawn(|| thread::current().name().map(str::to_owned))
///     .unwrap();
///
/// assert_eq!(handle.join().unwrap().as_deref(), Some("mixer"));
/// ```
#[derive(Debug)]
pub struct Builder {
    inner: std::thread::Builder,
}

impl Builder {
    pub fn new() -> Builder {
        Builder {
            inner: std::thread::Builder::new(),
        }
    }

    pub fn name(mut self, name: String) -> Builder {
        self.inner = self.inner.name(name);
        self
    }

    /// Sets the size of the stack (in bytes) for the new thread.
    pub fn stack_size(mut self, size: usize) -> Builder {
        self.inner = self.inner.stack_size(size);
        self
    }

    /// Spawns the thread and waits until it has published its tid.
    ///
    /// # Errors
    ///
    /// Returns an error if the thread could not be spawned.
    pub fn spawn<F, T>(self, f: F) -> std::io::Result<JoinHandle<T>>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = mpsc::sync_channel(1);
        let inner = self.inner.spawn(move || {
            let _ = tx.send(current_thread_id());
            f()
        })?;
        let tid = rx.recv().map_err(std::io::Error::other)?;
        Ok(JoinHandle { inner, tid })
    }
}

impl Default for Builder {
    fn default() -> Self {
        Self::new()
    }
}

/// An owned permission to join on a thread spawned by [`spawn`]
#[derive(Debug)]
pub struct JoinHandle<T> {
    inner: std::thread::JoinHandle<T>,
    tid: ThreadId,
}

impl<T> JoinHandle<T> {
    /// Tid of the spawned thread, as used in deadlock reports
    pub fn tid(&self) -> ThreadId {
        self.tid
    }

    pub fn thread(&self) -> &Thread {
        self.inner.thread()
    }

    pub fn is_finished(&self) -> bool {
        self.inner.is_finished()
    }

    /// Waits for the thread to finish, recorded as a join wait on it
    pub fn join(self) -> Result<T> {
        let _wait = ScopedJoinWait::new(self.tid);
        self.inner.join()
    }

    /// The wrapped handle; joining it records nothing.
    pub fn into_inner(self) -> std::thread::JoinHandle<T> {
        self.inner
    }
}
