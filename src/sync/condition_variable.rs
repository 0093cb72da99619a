//! # Condition Variable.
//!
//! A condition variable lets a thread leave the ready rotation entirely
//! until some state change it cares about has happened, instead of
//! spinning on a predicate. It is always used together with a [`Mutex`]
//! guarding the shared state: [`wait`] takes the guard, releases the lock,
//! and parks the calling thread on the condition's own FIFO wait queue. A
//! parked thread is in exactly one place, and it is not the ready queue.
//!
//! [`signal`] moves the longest-waiting parked thread back into the ready
//! queue; [`broadcast`] moves all of them, preserving their wait order,
//! behind whatever was already ready. Neither call is buffered: a signal
//! with no waiter does nothing.
//!
//! Unlike standard monitor usage, `wait` does **not** reacquire the mutex
//! on wakeup, which is why it consumes the guard and returns nothing.
//! Callers re-lock explicitly, or use [`wait_while`], which wraps the whole
//! lock/check/park/re-lock loop:
//!
//! ```text
//! let guard = condvar.wait_while(&mutex, |state| state.is_empty());
//! ```
//!
//! [`wait`]: ConditionVariable::wait
//! [`wait_while`]: ConditionVariable::wait_while
//! [`signal`]: ConditionVariable::signal
//! [`broadcast`]: ConditionVariable::broadcast

use super::mutex::{Mutex, MutexGuard};
use crate::thread::Thread;
use crate::thread::scheduler;
use crossbeam_queue::SegQueue;

/// A condition variable: a FIFO queue of parked threads plus the
/// operations to park onto it and to move parked threads back into the
/// ready rotation.
#[derive(Default)]
pub struct ConditionVariable {
    waiters: SegQueue<Box<Thread>>,
}

impl ConditionVariable {
    /// Creates a new condition variable ready to be waited on and
    /// signaled.
    pub fn new() -> ConditionVariable {
        ConditionVariable {
            waiters: SegQueue::new(),
        }
    }

    /// Releases the mutex and parks the current thread until signaled.
    ///
    /// The caller must hold `guard`'s mutex; it is unlocked before
    /// parking and **not** reacquired on return; re-locking is the
    /// caller's responsibility.
    ///
    /// Parking while no other thread is runnable means no thread could
    /// ever signal this condition; that is a fatal deadlock and the
    /// process terminates.
    pub fn wait<T>(&self, guard: MutexGuard<'_, T>) {
        scheduler::with_active(|core| {
            if core.ready_is_empty() {
                scheduler::deadlock_abort("ConditionVariable::wait");
            }
            drop(guard);
            core.park_on(&self.waiters);
        });
        // Signaled and rescheduled; the mutex is not held here.
    }

    /// Locks `mutex` and blocks the current thread while `predicate`
    /// returns true, returning with the lock held and the predicate
    /// false.
    ///
    /// The predicate is always evaluated with the lock held; there is no
    /// need to check it before calling.
    pub fn wait_while<'a, T>(
        &self,
        mutex: &'a Mutex<T>,
        mut predicate: impl FnMut(&mut T) -> bool,
    ) -> MutexGuard<'a, T> {
        let mut guard = mutex.lock();
        while predicate(&mut guard) {
            self.wait(guard);
            guard = mutex.lock();
        }
        guard
    }

    /// Wakes the longest-waiting parked thread, if any.
    ///
    /// The woken thread moves to the back of the ready queue; it resumes
    /// inside its call to [`wait`] once scheduled. No-op when nothing is
    /// parked.
    ///
    /// [`wait`]: ConditionVariable::wait
    pub fn signal(&self) {
        if let Some(thread) = self.waiters.pop() {
            scheduler::with_active(|core| core.make_ready(thread));
        }
    }

    /// Wakes every currently parked thread, preserving their wait order.
    ///
    /// Threads that park after this call are not woken by it.
    pub fn broadcast(&self) {
        if self.waiters.is_empty() {
            return;
        }
        scheduler::with_active(|core| {
            while let Some(thread) = self.waiters.pop() {
                core.make_ready(thread);
            }
        });
    }
}

impl Drop for ConditionVariable {
    fn drop(&mut self) {
        let abandoned = self.waiters.len();
        if abandoned > 0 {
            log::warn!("condition variable dropped with {abandoned} parked threads");
        }
    }
}
