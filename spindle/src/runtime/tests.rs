use crate::channel::{Receiver, Sender, bounded, channel};
use crate::runtime::Runtime;
use crate::task::TaskHandle;
use crate::test_utils::*;
use crate::time;
use crate::utils::thread::current_thread_name;
use parking_lot::Mutex;
use rstest::rstest;
use static_assertions::assert_impl_all;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

assert_impl_all!(Runtime: Send, Sync);
assert_impl_all!(TaskHandle<i32>: Send, Sync);
assert_impl_all!(Sender<i32>: Send, Sync, Clone);
assert_impl_all!(Receiver<i32>: Send, Sync, Clone);

#[test]
fn ping_pong_delivers_in_send_order() {
    let rt = test_runtime(2);
    let (tx, rx) = channel::<i32>();
    let received = Arc::new(Mutex::new(Vec::new()));

    let producer = rt.spawn("producer", move || {
        for i in 0..10 {
            tx.send(i);
        }
        tx.send(-1);
    });
    let consumer = rt.spawn("consumer", {
        let received = received.clone();
        move || {
            loop {
                let value = rx.recv();
                received.lock().push(value);
                if value == -1 {
                    break;
                }
            }
        }
    });

    producer.join();
    consumer.join();
    assert_eq!(*received.lock(), [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, -1]);
}

#[rstest]
#[case(1)]
#[case(2)]
#[case(8)]
fn any_capacity_preserves_fifo(#[case] capacity: usize) {
    let rt = test_runtime(2);
    let (tx, rx) = bounded(capacity);
    let received = Arc::new(Mutex::new(Vec::new()));

    let producer = rt.spawn("producer", move || {
        for i in 0..20 {
            tx.send(i);
        }
    });
    let consumer = rt.spawn("consumer", {
        let received = received.clone();
        move || {
            for _ in 0..20 {
                received.lock().push(rx.recv());
            }
        }
    });

    producer.join();
    consumer.join();
    assert_eq!(*received.lock(), (0..20).collect::<Vec<_>>());
}

#[test]
fn two_receivers_split_one_stream() {
    let rt = test_runtime(3);
    let (tx, rx) = channel::<i32>();
    let rx2 = rx.clone();

    let producer = rt.spawn("producer", move || {
        for i in 0..10 {
            tx.send(i);
        }
        // One sentinel per receiver.
        tx.send(-1);
        tx.send(-1);
    });

    let drain = |rx: Receiver<i32>| {
        move || {
            let mut seen = Vec::new();
            loop {
                let value = rx.recv();
                seen.push(value);
                if value == -1 {
                    break;
                }
            }
            seen
        }
    };
    let r1 = rt.spawn("receiver-1", drain(rx));
    let r2 = rt.spawn("receiver-2", drain(rx2));

    producer.join();
    let (seen1, seen2) = (r1.join(), r2.join());

    // Each receiver sees exactly one sentinel, as its last value.
    assert_eq!(seen1.iter().filter(|v| **v == -1).count(), 1);
    assert_eq!(seen2.iter().filter(|v| **v == -1).count(), 1);
    assert_eq!(seen1.last(), Some(&-1));
    assert_eq!(seen2.last(), Some(&-1));

    // Together they saw every value exactly once.
    let mut union: Vec<i32> = seen1
        .iter()
        .chain(seen2.iter())
        .copied()
        .filter(|v| *v != -1)
        .collect();
    union.sort_unstable();
    assert_eq!(union, (0..10).collect::<Vec<_>>());
}

#[test]
fn sleeps_wake_in_deadline_order() {
    let rt = test_runtime(3);
    let order = Arc::new(Mutex::new(Vec::new()));

    let handles: Vec<TaskHandle<()>> = [("t1", 300, "A"), ("t2", 100, "B"), ("t3", 200, "C")]
        .into_iter()
        .map(|(name, delay_ms, tag)| {
            let order = order.clone();
            rt.spawn(name, move || {
                time::sleep(Duration::from_millis(delay_ms));
                order.lock().push(tag);
            })
        })
        .collect();

    for handle in handles {
        handle.join();
    }
    assert_eq!(*order.lock(), ["B", "C", "A"]);
}

#[test]
fn full_buffer_parks_the_sender_until_a_receive() {
    let rt = test_runtime(2);
    let (tx, rx) = bounded(2);
    let third_sent = Arc::new(AtomicBool::new(false));

    let producer = rt.spawn("producer", {
        let third_sent = third_sent.clone();
        move || {
            tx.send(1);
            tx.send(2);
            tx.send(3);
            third_sent.store(true, Ordering::SeqCst);
        }
    });

    // Two sends fit the buffer; the third parks the task.
    thread::sleep(Duration::from_millis(100));
    assert!(!third_sent.load(Ordering::SeqCst));

    // Receiving from the main thread unparks it.
    assert_eq!(rx.recv(), 1);
    producer.join();
    assert!(third_sent.load(Ordering::SeqCst));

    assert_eq!(rx.recv(), 2);
    assert_eq!(rx.recv(), 3);
}

// A single worker proves the awaiting task yields instead of busy-waiting:
// if "outer" held the worker while waiting, "inner" could never run.
#[test]
fn awaiting_a_handle_parks_the_task_until_completion() {
    let rt = test_runtime(1);
    let shared = rt.shared().clone();
    let inner_done = Arc::new(AtomicBool::new(false));
    let done_before_wait_returned = Arc::new(AtomicBool::new(false));

    let outer = rt.spawn("outer", {
        let inner_done = inner_done.clone();
        let observed = done_before_wait_returned.clone();
        move || {
            let inner = shared.spawn("inner".into(), {
                let inner_done = inner_done.clone();
                move || {
                    time::sleep(Duration::from_millis(20));
                    inner_done.store(true, Ordering::SeqCst);
                }
            });
            inner.wait();
            observed.store(inner_done.load(Ordering::SeqCst), Ordering::SeqCst);
        }
    });

    outer.join();
    assert!(done_before_wait_returned.load(Ordering::SeqCst));
}

#[test]
fn worker_pool_never_exceeds_the_cap() {
    let rt = test_runtime(2);

    let handles: Vec<TaskHandle<()>> = (0..10)
        .map(|i| {
            rt.spawn(format!("looper-{i}"), || {
                for _ in 0..3 {
                    time::sleep(Duration::from_millis(5));
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join();
    }
    assert!(rt.shared().worker_count() <= 2);
}

#[test]
fn workers_carry_generated_thread_names() {
    let rt = test_runtime(2);

    let names: HashSet<String> = (0..4)
        .map(|i| {
            rt.spawn(format!("who-{i}"), || {
                current_thread_name().expect("worker thread has a name")
            })
            .join()
        })
        .collect();

    for name in &names {
        let (prefix, index) = name.split_once('-').expect("name has a dash");
        assert_eq!(prefix, "spindle");
        assert!(index.parse::<usize>().is_ok(), "unexpected name {name:?}");
    }
}

#[test]
fn join_returns_the_task_value() {
    let rt = test_runtime(1);
    let handle = rt.spawn("answer", || 6 * 7);
    handle.wait();
    assert!(handle.is_finished());
    assert_eq!(handle.join(), 42);
}

#[test]
fn sleep_outside_a_task_blocks_the_thread() {
    init_tracing();
    let start = Instant::now();
    time::sleep(Duration::from_millis(50));
    assert!(start.elapsed() >= Duration::from_millis(50));
}

#[test]
fn shutdown_abandons_parked_tasks() {
    let rt = test_runtime(1);
    let (tx, rx) = channel::<i32>();

    let handle = rt.spawn("parked-forever", move || {
        let _ = rx.recv();
    });
    thread::sleep(Duration::from_millis(50));

    // Dropping the handle would join a task that can never complete.
    std::mem::forget(handle);
    rt.shutdown();
    drop(tx);
}

#[test]
fn public_run_uses_the_global_runtime() {
    init_tracing();
    let handle = crate::run("global-smoke", || {
        crate::sleep(Duration::from_millis(10));
        27
    });
    assert_eq!(handle.join(), 27);
}
