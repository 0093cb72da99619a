//! Thread creation, scheduling order, and join lifecycle.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use strand::{Current, Runtime, ThreadBuilder, yield_now};

#[test]
fn entry_runs_exactly_once() {
    const N: usize = 16;
    let _rt = Runtime::new();
    let runs = Rc::new(RefCell::new(vec![0u32; N]));

    let handles: Vec<_> = (0..N)
        .map(|i| {
            let runs = Rc::clone(&runs);
            ThreadBuilder::new(format!("t{i}"))
                .spawn(move || {
                    runs.borrow_mut()[i] += 1;
                    yield_now();
                    0
                })
                .unwrap()
        })
        .collect();
    for handle in handles {
        handle.join();
    }

    assert!(runs.borrow().iter().all(|&count| count == 1));
}

#[test]
fn spawned_thread_runs_only_when_dequeued() {
    let _rt = Runtime::new();
    let ran = Rc::new(Cell::new(false));

    let handle = {
        let ran = Rc::clone(&ran);
        ThreadBuilder::new("lazy")
            .spawn(move || {
                ran.set(true);
                0
            })
            .unwrap()
    };

    assert!(!ran.get(), "thread must not run before a yield");
    yield_now();
    assert!(ran.get());
    handle.join();
}

#[test]
fn yield_with_empty_ready_queue_is_a_noop() {
    let _rt = Runtime::new();
    yield_now();
    yield_now();
}

#[test]
fn fifo_fairness_is_cyclic() {
    const N: u64 = 4;
    const ROUNDS: usize = 3;
    let _rt = Runtime::new();
    let order = Rc::new(RefCell::new(Vec::new()));

    let handles: Vec<_> = (0..N)
        .map(|id| {
            let order = Rc::clone(&order);
            ThreadBuilder::new(format!("round-robin-{id}"))
                .spawn(move || {
                    for _ in 0..ROUNDS {
                        order.borrow_mut().push(id);
                        yield_now();
                    }
                    0
                })
                .unwrap()
        })
        .collect();
    for handle in handles {
        handle.join();
    }

    let expected: Vec<u64> = (0..ROUNDS as u64).flat_map(|_| 0..N).collect();
    assert_eq!(*order.borrow(), expected);
}

#[test]
fn join_returns_the_thread_result() {
    let _rt = Runtime::new();
    let a = ThreadBuilder::new("a").spawn(|| 42).unwrap();
    let b = ThreadBuilder::new("b").spawn(|| -7).unwrap();
    assert_eq!(a.join(), 42);
    assert_eq!(b.join(), -7);
}

#[test]
fn join_after_completion_is_immediate() {
    let _rt = Runtime::new();
    let handle = ThreadBuilder::new("early").spawn(|| 5).unwrap();

    assert!(!handle.is_finished());
    yield_now();
    assert!(handle.is_finished());
    assert_eq!(handle.join(), 5);
}

#[test]
fn explicit_exit_matches_entry_return() {
    let _rt = Runtime::new();
    let reached_after_exit = Rc::new(Cell::new(false));

    let handle = {
        let reached_after_exit = Rc::clone(&reached_after_exit);
        ThreadBuilder::new("quitter")
            .spawn(move || {
                // Spawned threads always have a nonzero tid, so the exit is
                // always taken; the branch keeps the tail reachable.
                if Current::tid() > 0 {
                    Current::exit(9);
                }
                reached_after_exit.set(true);
                0
            })
            .unwrap()
    };

    assert_eq!(handle.join(), 9);
    assert!(!reached_after_exit.get(), "exit must not return to its caller");
}

#[test]
fn detached_thread_is_reclaimed_on_next_transfer() {
    let _rt = Runtime::new();
    let ran = Rc::new(Cell::new(0u32));

    // A detached thread that exits immediately leaves its context in the
    // graveyard; the following transfers must flush it without incident.
    for _ in 0..8 {
        let ran = Rc::clone(&ran);
        ThreadBuilder::new("fleeting")
            .spawn_detached(move || {
                ran.set(ran.get() + 1);
                0
            })
            .unwrap();
        yield_now();
        yield_now();
    }

    assert_eq!(ran.get(), 8);
}

#[test]
fn threads_execute_in_spawn_order() {
    let _rt = Runtime::new();
    let order = Rc::new(RefCell::new(Vec::new()));

    for id in 0..5u64 {
        let order = Rc::clone(&order);
        ThreadBuilder::new(format!("w{id}"))
            .spawn_detached(move || {
                order.borrow_mut().push(id);
                0
            })
            .unwrap();
    }
    yield_now();

    assert_eq!(*order.borrow(), vec![0, 1, 2, 3, 4]);
}

#[test]
fn current_tid_distinguishes_threads() {
    let _rt = Runtime::new();
    assert_eq!(Current::tid(), 0, "bootstrap thread is tid 0");

    let seen = Rc::new(RefCell::new(Vec::new()));
    let handles: Vec<_> = (0..3)
        .map(|i| {
            let seen = Rc::clone(&seen);
            ThreadBuilder::new(format!("t{i}"))
                .spawn(move || {
                    seen.borrow_mut().push(Current::tid());
                    0
                })
                .unwrap()
        })
        .collect();
    let tids: Vec<u64> = handles.iter().map(|h| h.tid).collect();
    for handle in handles {
        handle.join();
    }

    assert_eq!(*seen.borrow(), tids);
}

#[test]
fn panicking_thread_completes_with_minus_one() {
    let _rt = Runtime::new();
    let handle = ThreadBuilder::new("doomed")
        .spawn(|| -> i32 { panic!("boom") })
        .unwrap();
    assert_eq!(handle.join(), -1);

    // The runtime stays usable afterward.
    let next = ThreadBuilder::new("survivor").spawn(|| 1).unwrap();
    assert_eq!(next.join(), 1);
}

#[test]
fn many_threads_interleave() {
    const N: usize = 100;
    let _rt = Runtime::new();
    let total = Rc::new(Cell::new(0u64));

    let handles: Vec<_> = (0..N)
        .map(|i| {
            let total = Rc::clone(&total);
            ThreadBuilder::new(format!("bulk-{i}"))
                .spawn(move || {
                    for _ in 0..10 {
                        total.set(total.get() + 1);
                        yield_now();
                    }
                    0
                })
                .unwrap()
        })
        .collect();
    for handle in handles {
        handle.join();
    }

    assert_eq!(total.get(), (N as u64) * 10);
}

#[test]
#[should_panic(expected = "already active")]
fn nested_runtime_panics() {
    let _outer = Runtime::new();
    let _inner = Runtime::new();
}

#[test]
fn operations_require_an_active_runtime() {
    let result = std::panic::catch_unwind(|| yield_now());
    assert!(result.is_err());
}

#[test]
fn runtimes_are_independent_across_os_threads() {
    let _rt = Runtime::new();
    let here = ThreadBuilder::new("local").spawn(|| 1).unwrap();

    let other = std::thread::spawn(|| {
        let _rt = Runtime::new();
        let handle = ThreadBuilder::new("remote").spawn(|| 2).unwrap();
        handle.join()
    })
    .join()
    .unwrap();

    assert_eq!(here.join(), 1);
    assert_eq!(other, 2);
}
