//! Cooperative synchronization primitives.
//!
//! Everything here is built on [`yield_now`] and the scheduler's queues;
//! none of it holds execution-transfer logic of its own. The primitives
//! are correct only because execution is single-logical-thread: a
//! spin-and-yield loop cannot lose a race it is not in, so no atomics are
//! needed. Do not mistake them for parallel spinlocks.
//!
//! [`yield_now`]: crate::yield_now

pub mod condition_variable;
pub mod mutex;
pub mod semaphore;

pub use condition_variable::ConditionVariable;
pub use mutex::{Mutex, MutexGuard, WouldBlock};
pub use semaphore::Semaphore;
