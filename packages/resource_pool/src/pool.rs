//! The pool itself and its public operations.

use std::any::type_name;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::builder::DEFAULT_NAME;
use crate::metrics::{ACQUIRE_IMMEDIATE, ACQUIRE_SUSPENDED, HANDOFFS, MISUSE_REJECTED};
use crate::state::{Outcome, PoolState, Rejected, Returned};
use crate::{Acquire, ResourcePoolBuilder, Result};

/// A bounded pool of interchangeable resource instances shared by concurrent callers.
///
/// Instances are held as `Arc<T>` and identified by allocation ([`Arc::ptr_eq`]), never by
/// value. Each instance is either free or checked out by exactly one caller:
///
/// * [`acquire()`][Self::acquire] checks out a free instance, or queues the caller until
///   one is returned. Queued callers are served strictly in the order they called
///   `acquire()`.
/// * [`release()`][Self::release] returns a checked-out instance. If callers are queued, the
///   instance goes directly to the longest-waiting one and is never marked free in between.
/// * [`add()`][Self::add] grows the pool by one instance, which also serves a queued caller
///   first if there is one.
///
/// The pool never removes instances and has no acquisition timeouts. A caller that wants to
/// stop waiting drops its [`Acquire`] future, which takes it out of the queue.
///
/// # Thread safety
///
/// The pool is thread-safe when `T` is `Send + Sync`. Share it by reference, e.g. via
/// `Arc<ResourcePool<T>>` or scoped threads. All bookkeeping happens under a short-lived
/// internal lock that is never held while caller code runs.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
///
/// use resource_pool::ResourcePool;
/// # use futures::executor::block_on;
///
/// # block_on(async {
/// let pool = ResourcePool::new(2, || String::from("connection"));
///
/// let first = pool.acquire().await;
/// let second = pool.acquire().await;
/// assert_eq!(pool.available(), 0);
///
/// // Nothing is free, so this caller is queued.
/// let third = pool.acquire();
/// assert_eq!(pool.waiting(), 1);
///
/// // Releasing hands the instance straight to the queued caller.
/// pool.release(Arc::clone(&first)).unwrap();
/// let third = third.await;
/// assert!(Arc::ptr_eq(&first, &third));
///
/// pool.release(second).unwrap();
/// pool.release(third).unwrap();
/// assert_eq!(pool.available(), 2);
/// # });
/// ```
pub struct ResourcePool<T> {
    name: String,
    state: Mutex<PoolState<T>>,
}

impl<T> ResourcePool<T> {
    /// Creates a pool with `size` instances, calling `factory` once for each.
    ///
    /// Use [`ResourcePool::builder()`] to name the pool or to use a fallible factory.
    #[must_use]
    pub fn new<F>(size: usize, factory: F) -> Self
    where
        F: FnMut() -> T,
    {
        Self::builder().size(size).build(factory)
    }

    /// Creates a pool with `size` instances from a fallible factory.
    ///
    /// # Errors
    ///
    /// Returns the first error produced by `factory`.
    pub fn try_new<F, E>(size: usize, factory: F) -> std::result::Result<Self, E>
    where
        F: FnMut() -> std::result::Result<T, E>,
    {
        Self::builder().size(size).try_build(factory)
    }

    /// Creates a pool without any instances. Use [`add()`][Self::add] to provide them.
    #[must_use]
    pub fn empty() -> Self {
        Self::from_instances(DEFAULT_NAME.to_string(), Vec::new())
    }

    /// Creates a builder for configuring the pool.
    pub fn builder() -> ResourcePoolBuilder<T> {
        ResourcePoolBuilder::new()
    }

    pub(crate) fn from_instances(name: String, instances: Vec<Arc<T>>) -> Self {
        debug!(pool = %name, size = instances.len(), "resource pool created");

        Self {
            name,
            state: Mutex::new(PoolState::with_free_instances(instances)),
        }
    }

    /// The name that identifies the pool in log output.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of instances tracked by the pool, whether free or checked out.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().len()
    }

    /// Whether the pool tracks no instances at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of instances that can be checked out without waiting.
    #[must_use]
    pub fn available(&self) -> usize {
        self.state.lock().available()
    }

    /// Number of instances currently checked out.
    #[must_use]
    pub fn checked_out(&self) -> usize {
        let state = self.state.lock();

        state
            .len()
            .checked_sub(state.available())
            .expect("available count never exceeds the number of instances")
    }

    /// Number of callers queued in [`acquire()`][Self::acquire].
    #[must_use]
    pub fn waiting(&self) -> usize {
        self.state.lock().waiting()
    }

    /// Checks out an instance, waiting for one to be returned if none is free.
    ///
    /// The decision is made when this method is called, not when the returned future is
    /// first polled: either a free instance is checked out right away, or the caller takes
    /// its place at the end of the queue. Queued callers are served in the order in which
    /// they called this method.
    ///
    /// Dropping the returned future before it completes gives up the place in the queue. If
    /// an instance had already been assigned to it, the instance is returned to the pool.
    pub fn acquire(&self) -> Acquire<'_, T> {
        let mut state = self.state.lock();

        if let Some((index, instance)) = state.take_free() {
            drop(state);

            ACQUIRE_IMMEDIATE.with(|e| e.observe_once());
            trace!(pool = %self.name, index, "checked out free instance");

            return Acquire::ready(self, instance);
        }

        let (ticket, receiver) = state.enqueue();
        let waiting = state.waiting();
        drop(state);

        ACQUIRE_SUSPENDED.with(|e| e.observe_once());
        trace!(pool = %self.name, ticket, waiting, "no free instance, caller queued");

        Acquire::waiting(self, ticket, receiver)
    }

    /// Checks out a free instance if there is one, without ever queueing.
    ///
    /// Returns `None` if every instance is checked out.
    #[must_use]
    pub fn try_acquire(&self) -> Option<Arc<T>> {
        let (index, instance) = self.state.lock().take_free()?;

        ACQUIRE_IMMEDIATE.with(|e| e.observe_once());
        trace!(pool = %self.name, index, "checked out free instance");

        Some(instance)
    }

    /// Adds a new instance to the pool, growing its size by one.
    ///
    /// If callers are queued, the new instance goes to the longest-waiting one. Otherwise
    /// it becomes free.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateResource`][crate::Error::DuplicateResource] if the instance
    /// is already tracked by this pool. The pool is left unmodified.
    pub fn add(&self, instance: Arc<T>) -> Result<()> {
        let (returned, size) = {
            let mut state = self.state.lock();
            let returned = state.add(instance);
            (returned, state.len())
        };

        if returned.is_ok() {
            debug!(pool = %self.name, size, "instance added to pool");
        }

        self.report(returned, "add")
    }

    /// Returns a checked-out instance to the pool.
    ///
    /// If callers are queued, the instance goes directly to the longest-waiting one. That
    /// caller resumes on its own task; this method never runs the caller's code.
    ///
    /// # Errors
    ///
    /// * [`Error::UnknownResource`][crate::Error::UnknownResource] if the instance was never
    ///   tracked by this pool.
    /// * [`Error::NotCheckedOut`][crate::Error::NotCheckedOut] if the instance is tracked
    ///   but already free, e.g. because it was released twice.
    pub fn release(&self, instance: Arc<T>) -> Result<()> {
        // The guard is a temporary, so the lock is released before `report()` drops a
        // rejected instance.
        let returned = self.state.lock().release(instance);

        self.report(returned, "release")
    }

    /// Called when an `Acquire` that already owned an instance is dropped unpolled.
    pub(crate) fn return_abandoned(&self, instance: Arc<T>) {
        let returned = self.state.lock().release(instance);

        trace!(pool = %self.name, "acquire dropped after checkout, returning its instance");

        self.report(returned, "return_abandoned")
            .expect("an instance owned by an acquire future is always checked out");
    }

    /// Called when a queued `Acquire` is dropped before it completes.
    pub(crate) fn abandon_waiter(&self, ticket: u64, receiver: oneshot::Receiver<Arc<T>>) {
        let mut state = self.state.lock();

        if state.forget_waiter(ticket) {
            drop(state);
            trace!(pool = %self.name, ticket, "acquire dropped while queued");
            return;
        }

        // No longer queued, so `give_back()` has already sent an instance under this same
        // lock. It is waiting in the channel and must go back to the pool.
        let Ok(instance) = receiver.try_recv() else {
            return;
        };

        let returned = state.release(instance);
        drop(state);

        trace!(pool = %self.name, ticket, "acquire dropped after handoff, returning its instance");

        self.report(returned, "abandon_waiter")
            .expect("an instance handed to a waiter is always checked out");
    }

    fn report(&self, returned: Outcome<T>, operation: &'static str) -> Result<()> {
        match returned {
            Ok(Returned::HandedOff { index, ticket }) => {
                HANDOFFS.with(|e| e.observe_once());
                trace!(pool = %self.name, operation, index, ticket, "instance handed to queued caller");
                Ok(())
            }
            Ok(Returned::MarkedFree { index }) => {
                trace!(pool = %self.name, operation, index, "instance marked free");
                Ok(())
            }
            Err(Rejected { error, instance }) => {
                // Must not happen under the lock: this may be the last reference, and the
                // drop of `T` is free to call back into the pool.
                drop(instance);

                MISUSE_REJECTED.with(|e| e.observe_once());
                warn!(pool = %self.name, operation, %error, "rejected pool misuse");
                Err(error)
            }
        }
    }
}

impl<T> Default for ResourcePool<T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T> fmt::Debug for ResourcePool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();

        f.debug_struct(type_name::<Self>())
            .field("name", &self.name)
            .field("len", &state.len())
            .field("available", &state.available())
            .field("waiting", &state.waiting())
            .finish_non_exhaustive()
    }
}
