//! Future for checking out an instance from the pool.

use std::any::type_name;
use std::fmt;
use std::future::Future;
use std::mem;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

use crate::ResourcePool;
use crate::metrics::ACQUIRE_WAIT_MS;

/// A pending checkout returned by [`ResourcePool::acquire()`].
///
/// Awaiting it yields the checked-out instance, which must later be handed back via
/// [`ResourcePool::release()`].
///
/// Dropping the future before it completes gives up the caller's place in the queue. If an
/// instance had already been assigned to it, that instance is returned to the pool.
///
/// # Panics
///
/// Polling the future again after it has completed panics.
#[must_use = "dropping an acquire future gives up the checkout"]
pub struct Acquire<'a, T> {
    pool: &'a ResourcePool<T>,
    state: AcquireState<T>,
}

enum AcquireState<T> {
    /// A free instance was checked out when the future was created.
    Ready(Arc<T>),

    /// Queued in the pool, waiting for `release()` or `add()` to send an instance.
    Waiting {
        ticket: u64,
        receiver: oneshot::Receiver<Arc<T>>,
        enqueued_at: Instant,
    },

    Completed,
}

impl<'a, T> Acquire<'a, T> {
    pub(crate) fn ready(pool: &'a ResourcePool<T>, instance: Arc<T>) -> Self {
        Self {
            pool,
            state: AcquireState::Ready(instance),
        }
    }

    pub(crate) fn waiting(
        pool: &'a ResourcePool<T>,
        ticket: u64,
        receiver: oneshot::Receiver<Arc<T>>,
    ) -> Self {
        Self {
            pool,
            state: AcquireState::Waiting {
                ticket,
                receiver,
                enqueued_at: Instant::now(),
            },
        }
    }
}

impl<T> Future for Acquire<'_, T> {
    type Output = Arc<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match mem::replace(&mut self.state, AcquireState::Completed) {
            AcquireState::Ready(instance) => Poll::Ready(instance),
            AcquireState::Waiting {
                ticket,
                mut receiver,
                enqueued_at,
            } => match Pin::new(&mut receiver).poll(cx) {
                Poll::Pending => {
                    self.state = AcquireState::Waiting {
                        ticket,
                        receiver,
                        enqueued_at,
                    };
                    Poll::Pending
                }
                Poll::Ready(Ok(instance)) => {
                    ACQUIRE_WAIT_MS.with(|e| e.observe_millis(enqueued_at.elapsed()));
                    Poll::Ready(instance)
                }
                // The pool outlives this future and only drops a queued sender when this
                // future asks it to, so the sender always sends before going away.
                Poll::Ready(Err(_)) => {
                    panic!("waiter channel closed without an instance being sent")
                }
            },
            AcquireState::Completed => panic!("Acquire polled after completion"),
        }
    }
}

impl<T> Drop for Acquire<'_, T> {
    fn drop(&mut self) {
        match mem::replace(&mut self.state, AcquireState::Completed) {
            AcquireState::Ready(instance) => self.pool.return_abandoned(instance),
            AcquireState::Waiting {
                ticket, receiver, ..
            } => self.pool.abandon_waiter(ticket, receiver),
            AcquireState::Completed => {}
        }
    }
}

impl<T> fmt::Debug for Acquire<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &self.state {
            AcquireState::Ready(_) => "ready",
            AcquireState::Waiting { .. } => "waiting",
            AcquireState::Completed => "completed",
        };

        f.debug_struct(type_name::<Self>())
            .field("pool", &self.pool.name())
            .field("state", &state)
            .finish_non_exhaustive()
    }
}
