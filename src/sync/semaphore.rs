//! Counting semaphore, in the same spin-and-yield idiom as [`Mutex`].
//!
//! A semaphore holds a number of permits. [`acquire`] takes one, yielding
//! while none are available; [`release`] adds one, with no requirement
//! that the releaser ever acquired. A semaphore with one permit behaves
//! like a mutex without the guard; with zero initial permits it is a
//! simple wakeup token.
//!
//! [`Mutex`]: super::Mutex
//! [`acquire`]: Semaphore::acquire
//! [`release`]: Semaphore::release

use crate::thread::scheduler;
use std::cell::Cell;

/// A counting semaphore.
pub struct Semaphore {
    permits: Cell<usize>,
}

impl Semaphore {
    /// Creates a semaphore with `permits` available permits.
    pub const fn new(permits: usize) -> Semaphore {
        Semaphore {
            permits: Cell::new(permits),
        }
    }

    /// Takes a permit, yielding until one is available.
    ///
    /// As with [`Mutex::lock`], blocking with no other runnable thread is
    /// a fatal deadlock: nothing could ever release a permit.
    ///
    /// [`Mutex::lock`]: super::Mutex::lock
    pub fn acquire(&self) {
        while self.permits.get() == 0 {
            scheduler::with_active(|core| {
                if core.ready_is_empty() {
                    scheduler::deadlock_abort("Semaphore::acquire");
                }
                core.yield_now();
            });
        }
        self.permits.set(self.permits.get() - 1);
    }

    /// Takes a permit if one is available, without ever yielding.
    pub fn try_acquire(&self) -> bool {
        if self.permits.get() == 0 {
            false
        } else {
            self.permits.set(self.permits.get() - 1);
            true
        }
    }

    /// Adds a permit, potentially unblocking an acquirer on its next spin.
    pub fn release(&self) {
        self.permits.set(self.permits.get() + 1);
    }

    /// The number of permits currently available.
    pub fn available_permits(&self) -> usize {
        self.permits.get()
    }
}
