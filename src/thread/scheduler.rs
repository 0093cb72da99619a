//! The scheduler core: current thread, ready queue, graveyard slot.
//!
//! All scheduler state lives in one explicitly-constructed [`Runtime`].
//! Creating it registers the runtime in a thread-local slot so that the
//! spawn/yield/exit entry points and the thread trampoline (which run on
//! arbitrary stacks) can reach it; dropping it tears the slot down again.
//! One runtime per OS thread, each fully independent.
//!
//! The ready queue is strict FIFO: a yield always hands off to the
//! longest-waiting ready thread. The graveyard is a one-slot deferred
//! deallocation for the context of a thread that has exited: a thread
//! cannot free the stack it is executing on, so the slot is flushed at the
//! start of the next transfer, when some other stack is running.

use crate::SpawnError;
use crate::ctx::{self, Context};
use crate::thread::{Completion, Thread};
use crossbeam_queue::SegQueue;
use std::cell::Cell;
use std::mem;
use std::process;
use std::ptr;
use std::rc::Rc;

thread_local! {
    static ACTIVE: Cell<*mut Core> = const { Cell::new(ptr::null_mut()) };
}

/// Run `f` against the active runtime's scheduler core.
///
/// Panics when no runtime is active on this OS thread: every public
/// operation requires an initialized [`Runtime`].
pub(crate) fn with_active<R>(f: impl FnOnce(&mut Core) -> R) -> R {
    let core = ACTIVE.with(Cell::get);
    assert!(
        !core.is_null(),
        "no strand runtime is active on this thread"
    );
    unsafe { f(&mut *core) }
}

/// Exit the current thread of the active runtime. A non-generic twin of
/// [`with_active`] for the two call sites that never return.
pub(crate) fn exit_active(result: i32) -> ! {
    let core = ACTIVE.with(Cell::get);
    assert!(
        !core.is_null(),
        "no strand runtime is active on this thread"
    );
    unsafe { (*core).exit_current(result) }
}

/// Fatal deadlock: a thread attempted to block with no other runnable
/// thread, so the runtime can never make progress. Terminates the process
/// rather than hanging forever.
pub(crate) fn deadlock_abort(op: &str) -> ! {
    log::error!("deadlock detected in {op}: no runnable thread can make progress");
    eprintln!("strand: deadlock detected in {op}: no runnable thread can make progress");
    process::exit(1);
}

/// Where to park the outgoing thread on a transfer.
pub(crate) enum Park<'a> {
    /// Back of the ready queue (a plain yield).
    Ready,
    /// A condition variable's wait queue.
    Queue(&'a SegQueue<Box<Thread>>),
}

/// A cooperative scheduler bound to the OS thread that created it.
///
/// The creating flow of control becomes the bootstrap thread. The runtime
/// must stay alive (and stay on this OS thread; it is `!Send`) for as
/// long as any of its threads do; dropping it discards still-queued
/// threads without running them.
pub struct Runtime {
    core: Box<Core>,
}

impl Runtime {
    /// Establish the scheduler with the calling flow of control as the
    /// bootstrap thread.
    ///
    /// # Panics
    /// Panics if a runtime is already active on this OS thread.
    pub fn new() -> Runtime {
        assert!(
            ACTIVE.with(Cell::get).is_null(),
            "a strand runtime is already active on this thread"
        );
        let mut core = Box::new(Core {
            current: Box::new(Thread::bootstrap()),
            ready: SegQueue::new(),
            graveyard: None,
            next_tid: 1,
        });
        ACTIVE.with(|active| active.set(&mut *core as *mut Core));
        log::debug!("runtime initialized");
        Runtime { core }
    }
}

impl Default for Runtime {
    fn default() -> Runtime {
        Runtime::new()
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        ACTIVE.with(|active| active.set(ptr::null_mut()));
        let mut discarded = 0usize;
        while self.core.ready.pop().is_some() {
            discarded += 1;
        }
        if discarded > 0 {
            log::warn!("runtime dropped with {discarded} unfinished threads");
        }
    }
}

pub(crate) struct Core {
    /// The thread currently owning the execution stream. Exactly one at
    /// any instant; all others are queued ready, parked, or gone.
    current: Box<Thread>,
    /// Threads eligible to run next, strict FIFO.
    ready: SegQueue<Box<Thread>>,
    /// Context of an exited thread, pending deallocation. At most one may
    /// be in flight; it is released on the next transfer, never while it
    /// is still the one executing.
    graveyard: Option<Context>,
    next_tid: u64,
}

impl Core {
    pub(crate) fn current(&self) -> &Thread {
        &self.current
    }

    pub(crate) fn current_mut(&mut self) -> &mut Thread {
        &mut self.current
    }

    pub(crate) fn ready_is_empty(&self) -> bool {
        self.ready.is_empty()
    }

    /// Allocate a control block and context for a new thread and append it
    /// to the ready queue. On context-allocation failure nothing is
    /// enqueued and the control block is released.
    pub(crate) fn create(
        &mut self,
        name: String,
        entry: Box<dyn FnOnce() -> i32>,
        joinable: bool,
        entry_point: extern "C" fn() -> !,
    ) -> Result<(u64, Rc<Completion>), SpawnError> {
        let context = Context::new(entry_point)?;
        let tid = self.next_tid;
        self.next_tid += 1;
        let shared = Rc::new(Completion::new());
        log::debug!("spawn thread '{name}' (tid {tid}, joinable: {joinable})");
        self.ready.push(Box::new(Thread {
            ctx: Some(context),
            entry: Some(entry),
            joinable,
            shared: shared.clone(),
            tid,
            name,
        }));
        Ok((tid, shared))
    }

    /// Voluntary handoff: no-op when nothing else is ready, otherwise the
    /// current thread goes to the back of the ready queue.
    pub(crate) fn yield_now(&mut self) {
        if self.ready.is_empty() {
            return;
        }
        self.switch_current(Park::Ready);
    }

    /// Park the current thread on `waiters` and hand off to the next ready
    /// thread. The caller must have ensured the ready queue is non-empty.
    pub(crate) fn park_on(&mut self, waiters: &SegQueue<Box<Thread>>) {
        self.switch_current(Park::Queue(waiters));
    }

    /// Move a parked thread back into the ready rotation.
    pub(crate) fn make_ready(&mut self, thread: Box<Thread>) {
        self.ready.push(thread);
    }

    /// Dequeue the next current thread and transfer execution to it,
    /// parking the outgoing thread as directed. Resumes here, on the
    /// outgoing thread's stack, once it is rescheduled.
    fn switch_current(&mut self, park: Park<'_>) {
        self.flush_graveyard();
        if self.current.ctx.is_none() {
            // The bootstrap thread reaches its first switch without a
            // context; adopt the running flow so it can be resumed.
            self.current.ctx = Some(Context::adopt());
        }
        debug_assert!(
            self.current.ctx.as_ref().is_some_and(Context::canary_intact),
            "stack overflow detected on thread '{}'",
            self.current.name,
        );
        // The control blocks are heap allocations, so these stay valid
        // while the boxes move between queues.
        let outgoing: *mut Context = self.current.ctx.as_mut().unwrap();
        let next = self
            .ready
            .pop()
            .expect("switch_current with an empty ready queue");
        let prev = mem::replace(&mut self.current, next);
        match park {
            Park::Ready => self.ready.push(prev),
            Park::Queue(waiters) => waiters.push(prev),
        }
        let incoming: *const Context = self
            .current
            .ctx
            .as_ref()
            .expect("runnable thread without a context");
        unsafe { ctx::switch(&mut *outgoing, &*incoming) }
        // Rescheduled: execution of the caller continues after this point.
    }

    /// Terminal transfer: complete the current thread, stash its context in
    /// the graveyard, release its control block, and hand off. With the
    /// ready queue empty there is no thread left to run and the process
    /// terminates successfully.
    pub(crate) fn exit_current(&mut self, result: i32) -> ! {
        self.current.shared.finish(result);
        debug_assert!(
            self.current.joinable || Rc::strong_count(&self.current.shared) == 1,
            "detached thread '{}' has an outstanding handle",
            self.current.name,
        );
        log::debug!(
            "thread '{}' (tid {}) completed with result {result}",
            self.current.name,
            self.current.tid,
        );
        self.flush_graveyard();
        let Some(next) = self.ready.pop() else {
            log::debug!("last thread exited; terminating");
            process::exit(0);
        };
        let mut prev = mem::replace(&mut self.current, next);
        // We are still executing on `prev`'s stack: it goes to the
        // graveyard, to be released on the next transfer. The control
        // block itself is plain heap memory and can go now.
        self.graveyard = prev.ctx.take();
        drop(prev);
        let incoming: *const Context = self
            .current
            .ctx
            .as_ref()
            .expect("runnable thread without a context");
        unsafe { ctx::jump(&*incoming) }
    }

    fn flush_graveyard(&mut self) {
        // Safe at the start of a transfer: the pending context belongs to
        // a thread that exited on some earlier stack, never the current one.
        self.graveyard = None;
    }
}
