//! # strand: a cooperative user-level thread runtime.
//!
//! `strand` multiplexes many logical threads of control onto a single
//! physical execution stream. Scheduling is purely cooperative: control
//! only transfers at explicit points ([`yield_now`], a contended
//! [`Mutex::lock`], [`ConditionVariable::wait`], and thread exit). There
//! are no timer interrupts and no preemption, so between two transfer
//! points a thread owns the execution stream outright.
//!
//! ## The threading model
//!
//! A [`Runtime`] owns the scheduler state: the currently running thread,
//! a strict-FIFO ready queue, and a one-slot graveyard for the stack of a
//! thread that has exited but is still "in flight" (a thread cannot free
//! the stack it is executing on; the scheduler releases it on the next
//! transfer). The flow of control that creates the runtime becomes the
//! *bootstrap* thread; it has no entry routine of its own and receives an
//! execution context lazily the first time it yields.
//!
//! Threads are built with [`ThreadBuilder`] and run an `FnOnce() -> i32`
//! body. Joinable threads hand back a [`JoinHandle`]; detached threads
//! are reclaimed by the scheduler the moment they finish. Because the
//! whole runtime lives on one OS thread, shared state travels in [`Rc`]
//! and [`Cell`]/[`RefCell`] rather than `Arc` and atomics.
//!
//! ```
//! use strand::{Runtime, ThreadBuilder, yield_now};
//!
//! let _rt = Runtime::new();
//! let worker = ThreadBuilder::new("worker")
//!     .spawn(|| {
//!         yield_now();
//!         42
//!     })
//!     .unwrap();
//! assert_eq!(worker.join(), 42);
//! ```
//!
//! ## Blocking and deadlock
//!
//! The synchronization primitives in [`sync`] are built entirely on
//! [`yield_now`] and the runtime's queues; they are correct precisely
//! because only one logical thread executes between yield points. An
//! attempt to block while no other thread is runnable can never make
//! progress, so the runtime treats it as a fatal deadlock and terminates
//! the process instead of spinning forever. When the last thread exits,
//! the process terminates successfully.
//!
//! [`Rc`]: std::rc::Rc
//! [`Cell`]: std::cell::Cell
//! [`RefCell`]: std::cell::RefCell
//! [`Mutex::lock`]: sync::Mutex::lock
//! [`ConditionVariable::wait`]: sync::ConditionVariable::wait

mod ctx;
pub mod sync;
pub mod thread;

pub use thread::scheduler::Runtime;
pub use thread::{Current, JoinHandle, ThreadBuilder, yield_now};

use thiserror::Error;

/// Failure to create a new thread.
///
/// Returned by [`ThreadBuilder::spawn`] and [`ThreadBuilder::spawn_detached`]
/// when the resources backing a new execution context cannot be allocated.
/// Nothing is enqueued on failure; the runtime is left untouched.
#[derive(Debug, Error)]
pub enum SpawnError {
    /// The anonymous mapping for the thread's stack could not be created.
    #[error("failed to allocate a thread stack: {0}")]
    StackExhausted(#[from] std::io::Error),
}
