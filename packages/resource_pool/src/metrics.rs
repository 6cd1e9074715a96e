//! Metrics for the resource pool.
//!
//! The events are per-thread instances to keep observation cheap under contention.

use nm::{Event, Magnitude};

/// Histogram buckets for the time a suspended acquire spent in the waiter queue.
///
/// Under light load most waits are short, while a pool sized too small for its workload
/// will show a long tail.
const ACQUIRE_WAIT_MS_BUCKETS: &[Magnitude] = &[0, 1, 2, 5, 10, 20, 50, 100, 200, 500, 1000, 5000];

thread_local! {
    /// An acquire found a free instance and completed without suspending.
    pub(crate) static ACQUIRE_IMMEDIATE: Event = Event::builder()
        .name("resource_pool_acquire_immediate")
        .build();

    /// An acquire found no free instance and was appended to the waiter queue.
    pub(crate) static ACQUIRE_SUSPENDED: Event = Event::builder()
        .name("resource_pool_acquire_suspended")
        .build();

    /// An instance was handed directly to a queued waiter by `release()` or `add()`.
    pub(crate) static HANDOFFS: Event = Event::builder()
        .name("resource_pool_handoffs")
        .build();

    /// A call was rejected because the caller misused the pool.
    pub(crate) static MISUSE_REJECTED: Event = Event::builder()
        .name("resource_pool_misuse_rejected")
        .build();

    /// Time between a suspended acquire entering the queue and the caller receiving
    /// its instance.
    ///
    /// The magnitude is the wait time in milliseconds.
    pub(crate) static ACQUIRE_WAIT_MS: Event = Event::builder()
        .name("resource_pool_acquire_wait_ms")
        .histogram(ACQUIRE_WAIT_MS_BUCKETS)
        .build();
}
