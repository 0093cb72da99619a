//! Thread abstraction: control blocks, spawning, joining.
//!
//! Every logical thread is described by a control block holding its
//! execution context, its entry routine, and a shared completion record.
//! The control block itself belongs to the scheduler (it is either the
//! current thread, queued ready, or parked on a condition variable); a
//! [`JoinHandle`] holds only the completion record, so observing and
//! collecting a thread's result never races with the scheduler reclaiming
//! its stack.
//!
//! Threads are created through [`ThreadBuilder`]. A new thread does not
//! run immediately: it is appended to the ready queue and first executes
//! when the scheduler dequeues it, entering through a trampoline that
//! invokes the entry routine and then behaves exactly like an explicit
//! [`Current::exit`].

pub mod scheduler;

use crate::SpawnError;
use crate::ctx::Context;
use std::cell::Cell;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::rc::Rc;

/// Completion record shared between a thread's control block and its
/// [`JoinHandle`]. Outlives the control block for joinable threads.
pub(crate) struct Completion {
    done: Cell<bool>,
    result: Cell<i32>,
}

impl Completion {
    fn new() -> Completion {
        Completion {
            done: Cell::new(false),
            result: Cell::new(0),
        }
    }

    pub(crate) fn finish(&self, result: i32) {
        self.result.set(result);
        self.done.set(true);
    }
}

/// A thread control block. Crate-private: user code only ever holds
/// [`JoinHandle`]s.
pub(crate) struct Thread {
    /// Execution context. `None` for the bootstrap thread until its first
    /// yield, when a blank context is adopted lazily.
    pub(crate) ctx: Option<Context>,
    /// Entry routine with its argument captured. Taken by the trampoline on
    /// first execution; `None` for the bootstrap thread.
    pub(crate) entry: Option<Box<dyn FnOnce() -> i32>>,
    pub(crate) joinable: bool,
    pub(crate) shared: Rc<Completion>,
    pub(crate) tid: u64,
    pub(crate) name: String,
}

impl Thread {
    pub(crate) fn bootstrap() -> Thread {
        Thread {
            ctx: None,
            entry: None,
            joinable: false,
            shared: Rc::new(Completion::new()),
            tid: 0,
            name: String::from("bootstrap"),
        }
    }
}

/// The very beginning of every spawned thread.
///
/// Runs the entry routine, records its result, and then follows the exit
/// path: storing a result and returning from the entry routine is
/// equivalent to calling [`Current::exit`] with it. A panicking body is
/// caught here, so panics never unwind off the forged stack frame, and
/// completes the thread with result `-1`.
extern "C" fn thread_trampoline() -> ! {
    let entry = scheduler::with_active(|core| {
        core.current_mut()
            .entry
            .take()
            .expect("thread started without an entry routine")
    });
    let result = match catch_unwind(AssertUnwindSafe(entry)) {
        Ok(result) => result,
        Err(_) => {
            let name = scheduler::with_active(|core| core.current().name.clone());
            log::error!("thread '{name}' panicked; completing with result -1");
            -1
        }
    };
    scheduler::exit_active(result)
}

/// A builder for a new logical thread.
///
/// ```
/// use strand::{Runtime, ThreadBuilder};
///
/// let _rt = Runtime::new();
/// let handle = ThreadBuilder::new("worker").spawn(|| 7).unwrap();
/// assert_eq!(handle.join(), 7);
/// ```
pub struct ThreadBuilder {
    name: String,
}

impl ThreadBuilder {
    /// Create a new thread builder for thread `name`.
    pub fn new<I: Into<String>>(name: I) -> ThreadBuilder {
        ThreadBuilder { name: name.into() }
    }

    /// Spawn a joinable thread.
    ///
    /// The thread is appended to the ready queue; it first runs when the
    /// scheduler later dequeues it. The returned handle must be joined
    /// exactly once, which consuming [`JoinHandle::join`] enforces.
    pub fn spawn<F>(self, f: F) -> Result<JoinHandle, SpawnError>
    where
        F: FnOnce() -> i32 + 'static,
    {
        let (tid, shared) = scheduler::with_active(|core| {
            core.create(self.name, Box::new(f), true, thread_trampoline)
        })?;
        Ok(JoinHandle { tid, shared })
    }

    /// Spawn a detached thread.
    ///
    /// The thread's control block and context are reclaimed by the
    /// scheduler the moment it completes; its result is discarded.
    pub fn spawn_detached<F>(self, f: F) -> Result<(), SpawnError>
    where
        F: FnOnce() -> i32 + 'static,
    {
        scheduler::with_active(|core| {
            core.create(self.name, Box::new(f), false, thread_trampoline)
        })?;
        Ok(())
    }
}

/// A handle to join a thread.
///
/// Joining consumes the handle, so a thread can only be joined once, and
/// only joinable threads hand one out.
pub struct JoinHandle {
    /// Thread id of the underlying thread, unique within its runtime.
    pub tid: u64,
    shared: Rc<Completion>,
}

impl JoinHandle {
    /// Wait for the thread to complete and return its result.
    ///
    /// This yields in a loop until the thread's completion flag is set; it
    /// makes progress only through other threads being scheduled. If the
    /// thread is unfinished and nothing else is runnable, no thread can
    /// ever complete it: that is a deadlock, and the process terminates.
    pub fn join(self) -> i32 {
        while !self.shared.done.get() {
            scheduler::with_active(|core| {
                if core.ready_is_empty() {
                    scheduler::deadlock_abort("JoinHandle::join");
                }
                core.yield_now();
            });
        }
        self.shared.result.get()
    }

    /// Whether the thread has completed. Never blocks.
    pub fn is_finished(&self) -> bool {
        self.shared.done.get()
    }
}

/// The opaque structure indicating the running thread.
pub struct Current {
    _p: (),
}

impl Current {
    /// Exit the current thread with `result`, never returning.
    ///
    /// The thread's context is handed to the scheduler for deallocation on
    /// the next transfer, and control passes to the longest-waiting ready
    /// thread. If no thread is left ready, the whole process terminates
    /// successfully.
    pub fn exit(result: i32) -> ! {
        scheduler::exit_active(result)
    }

    /// Get the current thread's id. The bootstrap thread is tid 0.
    pub fn tid() -> u64 {
        scheduler::with_active(|core| core.current().tid)
    }
}

/// Voluntarily hand the execution stream to the longest-waiting ready
/// thread.
///
/// Returns immediately when nothing else is ready. Otherwise the current
/// thread goes to the back of the ready queue and resumes transparently
/// here once rescheduled: synchronous from the caller's point of view,
/// asynchronous in wall-clock time.
pub fn yield_now() {
    scheduler::with_active(|core| core.yield_now());
}
