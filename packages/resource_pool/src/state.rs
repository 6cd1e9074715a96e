//! Bookkeeping over the tracked instances, their free markers and the waiter queue.
//!
//! Everything here runs under the pool's lock. Nothing in this module blocks or calls user
//! code; handing an instance to a waiter only wakes the waiter's task.

use std::collections::VecDeque;
use std::sync::Arc;

use crate::Error;

/// A suspended acquire that is waiting for an instance.
struct Waiter<T> {
    /// Identifies the waiter so a dropped `Acquire` can find and remove its own entry.
    ticket: u64,

    sender: oneshot::Sender<Arc<T>>,
}

/// What happened to an instance that came back to the pool via `release()` or `add()`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Returned {
    /// The instance went straight to the waiter holding `ticket` without becoming free.
    HandedOff { index: usize, ticket: u64 },

    /// No waiter was queued, so the instance is now free.
    MarkedFree { index: usize },
}

/// A call the pool refused. Carries the caller's instance back out so that it is dropped
/// after the lock is released, never under it.
#[derive(Debug)]
pub(crate) struct Rejected<T> {
    pub(crate) error: Error,
    pub(crate) instance: Arc<T>,
}

pub(crate) type Outcome<T> = Result<Returned, Rejected<T>>;

pub(crate) struct PoolState<T> {
    /// Append-only. An index into this vector identifies an instance for as long as the
    /// pool exists.
    instances: Vec<Arc<T>>,

    /// Index-aligned with `instances`. `true` means the instance can be checked out.
    free: Vec<bool>,

    /// Number of `true` entries in `free`.
    available: usize,

    /// Where the next scan for a free instance starts. This is a hint, not the truth - any
    /// index is a valid starting point.
    cursor: usize,

    /// Pending acquires in arrival order. Non-empty only while `available` is zero.
    waiters: VecDeque<Waiter<T>>,

    next_ticket: u64,
}

impl<T> PoolState<T> {
    /// Creates the state with every instance free.
    ///
    /// The caller guarantees that the instances are distinct allocations.
    pub(crate) fn with_free_instances(instances: Vec<Arc<T>>) -> Self {
        let available = instances.len();

        Self {
            free: vec![true; available],
            instances,
            available,
            cursor: 0,
            waiters: VecDeque::new(),
            next_ticket: 0,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.instances.len()
    }

    pub(crate) fn available(&self) -> usize {
        self.available
    }

    pub(crate) fn waiting(&self) -> usize {
        self.waiters.len()
    }

    /// Checks out the first free instance at or after the cursor, wrapping around.
    ///
    /// Returns `None` if nothing is free.
    pub(crate) fn take_free(&mut self) -> Option<(usize, Arc<T>)> {
        if self.available == 0 {
            return None;
        }

        let index = (self.cursor..self.free.len())
            .chain(0..self.cursor)
            .find(|&index| self.free.get(index) == Some(&true))
            .expect("available count is non-zero, so at least one instance must be marked free");

        self.set_free(index, false);
        self.available = self
            .available
            .checked_sub(1)
            .expect("we just found a free instance, so the available count is at least one");
        self.cursor = index;

        Some((index, Arc::clone(self.instance(index))))
    }

    /// Registers a new waiter at the tail of the queue.
    ///
    /// Only valid while nothing is free - otherwise the waiter could sit next to a free
    /// instance forever.
    pub(crate) fn enqueue(&mut self) -> (u64, oneshot::Receiver<Arc<T>>) {
        debug_assert_eq!(self.available, 0, "waiters may only queue while nothing is free");

        let (sender, receiver) = oneshot::channel();

        let ticket = self.next_ticket;
        self.next_ticket = self.next_ticket.wrapping_add(1);

        self.waiters.push_back(Waiter { ticket, sender });

        (ticket, receiver)
    }

    /// Removes a still-queued waiter. Returns `false` if the waiter is no longer queued,
    /// meaning it has already been handed an instance.
    pub(crate) fn forget_waiter(&mut self, ticket: u64) -> bool {
        let Some(position) = self.waiters.iter().position(|w| w.ticket == ticket) else {
            return false;
        };

        drop(self.waiters.remove(position));
        true
    }

    /// Appends a new instance, giving it to the longest-waiting caller if there is one.
    pub(crate) fn add(&mut self, instance: Arc<T>) -> Outcome<T> {
        if self.position(&instance).is_some() {
            return Err(Rejected {
                error: Error::DuplicateResource,
                instance,
            });
        }

        let index = self.instances.len();
        self.instances.push(Arc::clone(&instance));
        // Starts out checked out; `give_back()` decides whether it becomes free.
        self.free.push(false);

        Ok(self.give_back(index, instance))
    }

    /// Returns a checked-out instance to the pool.
    pub(crate) fn release(&mut self, instance: Arc<T>) -> Outcome<T> {
        let Some(index) = self.position(&instance) else {
            return Err(Rejected {
                error: Error::UnknownResource,
                instance,
            });
        };

        if self.is_free(index) {
            return Err(Rejected {
                error: Error::NotCheckedOut,
                instance,
            });
        }

        Ok(self.give_back(index, instance))
    }

    fn give_back(&mut self, index: usize, mut instance: Arc<T>) -> Returned {
        while let Some(Waiter { ticket, sender }) = self.waiters.pop_front() {
            match sender.send(instance) {
                Ok(()) => return Returned::HandedOff { index, ticket },
                // The receiving side went away without leaving the queue. Serve the next one.
                Err(e) => instance = e.into_inner(),
            }
        }

        self.set_free(index, true);
        self.available = self
            .available
            .checked_add(1)
            .expect("available count cannot exceed the number of instances, which fits in usize");
        self.cursor = index;

        Returned::MarkedFree { index }
    }

    fn position(&self, instance: &Arc<T>) -> Option<usize> {
        self.instances.iter().position(|i| Arc::ptr_eq(i, instance))
    }

    fn is_free(&self, index: usize) -> bool {
        self.free.get(index) == Some(&true)
    }

    fn set_free(&mut self, index: usize, free: bool) {
        *self
            .free
            .get_mut(index)
            .expect("index was produced by a lookup into this pool") = free;
    }

    fn instance(&self, index: usize) -> &Arc<T> {
        self.instances
            .get(index)
            .expect("index was produced by a lookup into this pool")
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    fn state_of(names: &[&'static str]) -> (PoolState<&'static str>, Vec<Arc<&'static str>>) {
        let instances: Vec<_> = names.iter().map(|n| Arc::new(*n)).collect();
        (PoolState::with_free_instances(instances.clone()), instances)
    }

    fn assert_consistent<T>(state: &PoolState<T>) {
        assert_eq!(state.instances.len(), state.free.len());
        assert_eq!(state.available, state.free.iter().filter(|f| **f).count());
        assert!(state.waiters.is_empty() || state.available == 0);
    }

    #[test]
    fn new_state_is_all_free() {
        let (state, _) = state_of(&["a", "b", "c"]);

        assert_eq!(state.len(), 3);
        assert_eq!(state.available(), 3);
        assert_eq!(state.waiting(), 0);
        assert_consistent(&state);
    }

    #[test]
    fn take_free_scans_from_cursor() {
        let (mut state, instances) = state_of(&["a", "b", "c"]);

        let (index, first) = state.take_free().unwrap();
        assert_eq!(index, 0);
        assert!(Arc::ptr_eq(&first, &instances[0]));

        let (index, second) = state.take_free().unwrap();
        assert_eq!(index, 1);
        assert!(Arc::ptr_eq(&second, &instances[1]));

        assert_eq!(state.available(), 1);
        assert_consistent(&state);
    }

    #[test]
    fn take_free_wraps_around() {
        let (mut state, instances) = state_of(&["a", "b", "c"]);

        let (_, a) = state.take_free().unwrap();
        let (_, b) = state.take_free().unwrap();
        let (_, _c) = state.take_free().unwrap();

        // Releasing "a" moves the cursor to 0, then releasing "b" moves it to 1.
        state.release(a).unwrap();
        state.release(b).unwrap();
        assert_eq!(state.cursor, 1);

        let (index, taken) = state.take_free().unwrap();
        assert_eq!(index, 1);
        assert!(Arc::ptr_eq(&taken, &instances[1]));

        // Scan starts at 1 (busy) and 2 (busy), then wraps to 0.
        let (index, taken) = state.take_free().unwrap();
        assert_eq!(index, 0);
        assert!(Arc::ptr_eq(&taken, &instances[0]));

        assert!(state.take_free().is_none());
        assert_consistent(&state);
    }

    #[test]
    fn take_free_on_empty_state_is_none() {
        let mut state = PoolState::<u32>::with_free_instances(Vec::new());

        assert!(state.take_free().is_none());
    }

    #[test]
    fn release_with_waiter_hands_off_without_marking_free() {
        let (mut state, _) = state_of(&["a"]);

        let (_, a) = state.take_free().unwrap();
        let (ticket, receiver) = state.enqueue();

        let returned = state.release(Arc::clone(&a)).unwrap();
        assert_eq!(returned, Returned::HandedOff { index: 0, ticket });

        assert_eq!(state.available(), 0);
        assert_eq!(state.waiting(), 0);
        assert!(Arc::ptr_eq(&receiver.try_recv().unwrap(), &a));
        assert_consistent(&state);
    }

    #[test]
    fn waiters_are_served_in_arrival_order() {
        let (mut state, _) = state_of(&["a", "b"]);

        let (_, a) = state.take_free().unwrap();
        let (_, b) = state.take_free().unwrap();

        let (first_ticket, first) = state.enqueue();
        let (second_ticket, second) = state.enqueue();

        assert_eq!(
            state.release(Arc::clone(&b)).unwrap(),
            Returned::HandedOff {
                index: 1,
                ticket: first_ticket
            }
        );
        assert_eq!(
            state.release(Arc::clone(&a)).unwrap(),
            Returned::HandedOff {
                index: 0,
                ticket: second_ticket
            }
        );

        assert!(Arc::ptr_eq(&first.try_recv().unwrap(), &b));
        assert!(Arc::ptr_eq(&second.try_recv().unwrap(), &a));
    }

    #[test]
    fn release_skips_waiter_whose_receiver_is_gone() {
        let (mut state, _) = state_of(&["a"]);

        let (_, a) = state.take_free().unwrap();
        let (_, gone) = state.enqueue();
        let (live_ticket, live) = state.enqueue();
        drop(gone);

        let returned = state.release(a).unwrap();

        assert_eq!(
            returned,
            Returned::HandedOff {
                index: 0,
                ticket: live_ticket
            }
        );
        assert!(live.try_recv().is_ok());
    }

    #[test]
    fn release_marks_free_when_only_dead_waiters_remain() {
        let (mut state, _) = state_of(&["a"]);

        let (_, a) = state.take_free().unwrap();
        let (_, gone) = state.enqueue();
        drop(gone);

        assert_eq!(state.release(a).unwrap(), Returned::MarkedFree { index: 0 });
        assert_eq!(state.available(), 1);
        assert_consistent(&state);
    }

    #[test]
    fn release_unknown_is_rejected() {
        let (mut state, _) = state_of(&["a"]);

        let stranger = Arc::new("a");

        let rejected = state.release(Arc::clone(&stranger)).unwrap_err();

        assert_eq!(rejected.error, Error::UnknownResource);
        assert!(Arc::ptr_eq(&rejected.instance, &stranger));
    }

    #[test]
    fn release_free_is_rejected() {
        let (mut state, instances) = state_of(&["a"]);

        assert_eq!(
            state.release(Arc::clone(&instances[0])).unwrap_err().error,
            Error::NotCheckedOut
        );
        assert_eq!(state.available(), 1);
    }

    #[test]
    fn add_duplicate_is_rejected_and_leaves_state_alone() {
        let (mut state, instances) = state_of(&["a"]);

        assert_eq!(
            state.add(Arc::clone(&instances[0])).unwrap_err().error,
            Error::DuplicateResource
        );
        assert_eq!(state.len(), 1);
        assert_eq!(state.available(), 1);
    }

    #[test]
    fn add_without_waiters_marks_free() {
        let (mut state, _) = state_of(&["a"]);

        assert_eq!(
            state.add(Arc::new("b")).unwrap(),
            Returned::MarkedFree { index: 1 }
        );
        assert_eq!(state.len(), 2);
        assert_eq!(state.available(), 2);
        assert_consistent(&state);
    }

    #[test]
    fn add_with_waiter_hands_off() {
        let mut state = PoolState::with_free_instances(Vec::new());
        let (ticket, receiver) = state.enqueue();

        let added = Arc::new(5_u32);
        assert_eq!(
            state.add(Arc::clone(&added)).unwrap(),
            Returned::HandedOff { index: 0, ticket }
        );

        assert_eq!(state.available(), 0);
        assert_eq!(state.waiting(), 0);
        assert!(Arc::ptr_eq(&receiver.try_recv().unwrap(), &added));
        assert_consistent(&state);
    }

    #[test]
    fn forget_waiter_removes_only_that_waiter() {
        let mut state = PoolState::<u32>::with_free_instances(Vec::new());

        let (first, _first_receiver) = state.enqueue();
        let (second, _second_receiver) = state.enqueue();

        assert!(state.forget_waiter(first));
        assert!(!state.forget_waiter(first));
        assert_eq!(state.waiting(), 1);
        assert!(state.forget_waiter(second));
        assert_eq!(state.waiting(), 0);
    }
}
