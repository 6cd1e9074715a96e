#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![cfg_attr(coverage_nightly, coverage(off))] // This is all test code, no need to test it.

//! Private helpers for testing and examples in the resource pool packages.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::task::{Context, Poll, Waker};
use std::thread;
use std::time::Duration;

/// Runs a test with a timeout to prevent infinite hangs.
///
/// A pool test that loses a wakeup or leaks an instance tends to hang forever in `acquire()`
/// instead of failing. Wrapping it in this function turns the hang into a panic.
///
/// The timeout is 10 seconds under normal conditions and 60 seconds under Miri, where
/// thread synchronization primitives are significantly slower.
///
/// When the `MUTATION_TESTING` environment variable is set to "1", the watchdog is disabled
/// and the test function is executed directly, so mutation testing can detect hangs itself.
///
/// # Panics
///
/// Panics if the test exceeds the timeout (when not in mutation testing mode) and resumes
/// the panic of the test itself if it panicked.
pub fn with_watchdog<F, R>(test_fn: F) -> R
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    if std::env::var("MUTATION_TESTING").as_deref() == Ok("1") {
        return test_fn();
    }

    let (tx, rx) = mpsc::channel();

    let test_handle = thread::spawn(move || {
        let result = test_fn();
        // If this fails, the receiver has already timed out.
        drop(tx.send(result));
    });

    let timeout = if cfg!(miri) {
        Duration::from_secs(60)
    } else {
        Duration::from_secs(10)
    };

    match rx.recv_timeout(timeout) {
        Ok(result) => {
            test_handle.join().expect("test thread should not panic");
            result
        }
        Err(mpsc::RecvTimeoutError::Timeout) => {
            panic!("test exceeded {timeout:?} timeout, probably stuck waiting on the pool");
        }
        Err(mpsc::RecvTimeoutError::Disconnected) => match test_handle.join() {
            Ok(()) => panic!("test thread disconnected unexpectedly"),
            Err(e) => std::panic::resume_unwind(e),
        },
    }
}

/// Polls a future exactly once with a waker that does nothing.
///
/// Useful for observing whether a pool operation completed without suspending, while
/// keeping the future alive for later polls.
pub fn poll_once<F>(future: &mut F) -> Poll<F::Output>
where
    F: Future + Unpin,
{
    let mut cx = Context::from_waker(Waker::noop());
    Pin::new(future).poll(&mut cx)
}

/// A stand-in for a pooled network connection.
#[derive(Debug, Eq, PartialEq)]
pub struct Connection {
    /// Address the connection was opened to. Unique per factory call.
    pub url: String,
}

/// Creates [`Connection`]s with sequentially numbered addresses and counts the calls.
#[derive(Debug, Default)]
pub struct ConnectionFactory {
    created: AtomicUsize,
}

impl ConnectionFactory {
    /// Creates a factory whose first connection is numbered zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens the next connection.
    pub fn connect(&self) -> Connection {
        let index = self.created.fetch_add(1, Ordering::Relaxed);

        Connection {
            url: format!("http://10.0.0.1/{index}"),
        }
    }

    /// How many connections this factory has created.
    #[must_use]
    pub fn created(&self) -> usize {
        self.created.load(Ordering::Relaxed)
    }
}

/// Tracks how many instances are in use at the same time and the highest value seen.
///
/// Stress tests call [`enter()`][Self::enter] right after checking out an instance and
/// drop the returned guard right before releasing it.
#[derive(Debug, Default)]
pub struct OccupancyProbe {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl OccupancyProbe {
    /// Creates a probe with nothing in use.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one more instance in use until the guard is dropped.
    pub fn enter(&self) -> OccupancyGuard<'_> {
        let now = self
            .current
            .fetch_add(1, Ordering::SeqCst)
            .checked_add(1)
            .expect("occupancy cannot overflow usize");
        self.peak.fetch_max(now, Ordering::SeqCst);

        OccupancyGuard { probe: self }
    }

    /// The highest number of instances in use at the same time.
    #[must_use]
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    /// The number of instances in use right now.
    #[must_use]
    pub fn current(&self) -> usize {
        self.current.load(Ordering::SeqCst)
    }
}

/// Returned by [`OccupancyProbe::enter()`]; leaves the probe when dropped.
#[derive(Debug)]
pub struct OccupancyGuard<'a> {
    probe: &'a OccupancyProbe,
}

impl Drop for OccupancyGuard<'_> {
    fn drop(&mut self) {
        self.probe.current.fetch_sub(1, Ordering::SeqCst);
    }
}
