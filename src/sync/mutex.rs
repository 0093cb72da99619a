//! # Mutex.
//!
//! A mutual-exclusion lock that allows only one thread at a time into a
//! critical section. A contended [`lock`] does not block in the wait-queue
//! sense: it spins, yielding the execution stream on every iteration until
//! the holder unlocks (spin-and-yield). That is cheap here because a yield
//! is a plain context switch and the spinner consumes no turn beyond its
//! own re-check.
//!
//! The lock state is a single boolean. There is no owner identity and no
//! recursion count; locking a mutex the current thread already holds can
//! never succeed, which the runtime detects as a deadlock when nothing
//! else is runnable. Unlocking without holding the lock is unrepresentable:
//! the lock only opens when the [`MutexGuard`] goes away.
//!
//! [`lock`]: Mutex::lock

use crate::thread::scheduler;
use std::cell::{Cell, UnsafeCell};
use std::ops::{Deref, DerefMut};

/// A mutual exclusion primitive protecting shared data.
///
/// Each mutex has a type parameter for the data it protects, which can
/// only be reached through the guard returned by [`lock`] and
/// [`try_lock`], so the data is only ever accessed with the lock held.
///
/// # Examples
///
/// ```
/// use std::rc::Rc;
/// use strand::{Runtime, ThreadBuilder, yield_now};
/// use strand::sync::Mutex;
///
/// const N: usize = 10;
///
/// let _rt = Runtime::new();
/// let data = Rc::new(Mutex::new(0));
///
/// let handles: Vec<_> = (0..N)
///     .map(|_| {
///         let data = Rc::clone(&data);
///         ThreadBuilder::new("work")
///             .spawn(move || {
///                 // Only one thread at a time gets past this point, even
///                 // though the critical section yields in the middle.
///                 let mut data = data.lock();
///                 let read = *data;
///                 yield_now();
///                 *data = read + 1;
///                 0
///             })
///             .unwrap()
///     })
///     .collect();
/// for handle in handles {
///     handle.join();
/// }
/// assert_eq!(*data.lock(), N);
/// ```
///
/// [`lock`]: Self::lock
/// [`try_lock`]: Self::try_lock
pub struct Mutex<T> {
    locked: Cell<bool>,
    value: UnsafeCell<T>,
}

impl<T> Mutex<T> {
    /// Creates a new mutex in an unlocked state ready for use.
    pub const fn new(t: T) -> Mutex<T> {
        Mutex {
            locked: Cell::new(false),
            value: UnsafeCell::new(t),
        }
    }

    /// Acquires the mutex, yielding until it is available.
    ///
    /// Attempting to lock a held mutex while no other thread is runnable
    /// can never make progress (nothing can ever unlock it) and is
    /// treated as a fatal deadlock: the process terminates rather than
    /// spinning forever.
    pub fn lock(&self) -> MutexGuard<'_, T> {
        while self.locked.get() {
            scheduler::with_active(|core| {
                if core.ready_is_empty() {
                    scheduler::deadlock_abort("Mutex::lock");
                }
                core.yield_now();
            });
        }
        // No atomicity needed: nothing ran between the check and here.
        self.locked.set(true);
        MutexGuard { lock: self }
    }

    /// Attempts to acquire the lock without ever yielding.
    ///
    /// Returns [`WouldBlock`] when the mutex is already locked.
    pub fn try_lock(&self) -> Result<MutexGuard<'_, T>, WouldBlock> {
        if self.locked.get() {
            Err(WouldBlock)
        } else {
            self.locked.set(true);
            Ok(MutexGuard { lock: self })
        }
    }

    /// Consumes the mutex, returning the underlying data.
    pub fn into_inner(self) -> T {
        self.value.into_inner()
    }

    /// Mutable access without locking; safe because exclusive borrow of
    /// the mutex proves no guard exists.
    pub fn get_mut(&mut self) -> &mut T {
        self.value.get_mut()
    }
}

impl<T: Default> Default for Mutex<T> {
    fn default() -> Mutex<T> {
        Mutex::new(T::default())
    }
}

/// The error returned by [`Mutex::try_lock`] when the lock is held.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WouldBlock;

/// A scoped lock of a [`Mutex`]. The data protected by the mutex is
/// reachable through this guard; when the guard is dropped, the mutex
/// unlocks.
pub struct MutexGuard<'a, T> {
    lock: &'a Mutex<T>,
}

impl<T> MutexGuard<'_, T> {
    /// Releases the underlying [`Mutex`]. Equivalent to dropping the
    /// guard; named for call sites where the release is the point.
    pub fn unlock(self) {
        drop(self);
    }
}

impl<T> Deref for MutexGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { &*self.lock.value.get() }
    }
}

impl<T> DerefMut for MutexGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.lock.value.get() }
    }
}

impl<T> Drop for MutexGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.locked.set(false);
    }
}
