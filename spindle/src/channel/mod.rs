//! Bounded rendezvous channels between tasks.
//!
//! A channel is a fixed-capacity FIFO of values plus two wait-queues of
//! parked tasks: senders blocked on a full buffer and receivers blocked on
//! an empty one. Suspension follows the park-then-yield pattern: an
//! operation that cannot make progress records the current task on the
//! relevant wait-queue under the channel lock, drops the lock, and only then
//! yields its worker.
//!
//! Callers that are not tasks (e.g. the main thread) block on a condition
//! variable instead of parking a fiber.
//!
//! There is no closed-channel signal: once every sender is gone, a receiver
//! parked on an empty channel stays parked. Callers signal completion
//! in-band, typically with a sentinel value.

use crate::runtime::context;
use crate::task::Task;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::Arc;

/// Create a rendezvous channel: a [`bounded`] channel of capacity 1.
pub fn channel<T>() -> (Sender<T>, Receiver<T>) {
    bounded(1)
}

/// Create a channel holding at most `capacity` buffered values.
///
/// Both handles are cloneable; any number of senders and receivers may
/// share the channel. Values are delivered in send order, and parked tasks
/// are woken in park order, but there is no fairness between the sender and
/// receiver sides.
///
/// # Panics
///
/// Panics if `capacity` is zero.
pub fn bounded<T>(capacity: usize) -> (Sender<T>, Receiver<T>) {
    assert!(capacity > 0, "channel capacity must be greater than 0");
    let inner = Arc::new(Inner {
        state: Mutex::new(State {
            buffer: VecDeque::with_capacity(capacity),
            capacity,
            send_waiters: VecDeque::new(),
            recv_waiters: VecDeque::new(),
        }),
        cv: Condvar::new(),
    });
    (
        Sender {
            inner: inner.clone(),
        },
        Receiver { inner },
    )
}

struct State<T> {
    buffer: VecDeque<T>,
    capacity: usize,
    send_waiters: VecDeque<Arc<Task>>,
    recv_waiters: VecDeque<Arc<Task>>,
}

struct Inner<T> {
    state: Mutex<State<T>>,
    /// Wakes callers that block as plain threads rather than tasks.
    cv: Condvar,
}

impl<T> Inner<T> {
    fn send(&self, value: T) {
        let mut value = Some(value);
        loop {
            let mut state = self.state.lock();
            if state.buffer.len() < state.capacity {
                state.buffer.push_back(value.take().unwrap());
                let waiter = state.recv_waiters.pop_front();
                drop(state);

                self.cv.notify_one();
                if let Some(task) = waiter {
                    task.wake();
                }
                return;
            }

            match context::current_task() {
                Some(task) => {
                    // Park, then yield. Whoever drains the buffer pops us
                    // off the wait-queue and re-admits us.
                    state.send_waiters.push_back(task);
                    drop(state);
                    context::preempt_current();
                }
                None => {
                    self.cv.wait(&mut state);
                }
            }
        }
    }

    fn recv(&self) -> T {
        loop {
            let mut state = self.state.lock();
            if let Some(value) = state.buffer.pop_front() {
                let waiter = state.send_waiters.pop_front();
                drop(state);

                self.cv.notify_one();
                if let Some(task) = waiter {
                    task.wake();
                }
                return value;
            }

            match context::current_task() {
                Some(task) => {
                    state.recv_waiters.push_back(task);
                    drop(state);
                    context::preempt_current();
                }
                None => {
                    self.cv.wait(&mut state);
                }
            }
        }
    }
}

/// The sending half of a channel. Clone for additional senders.
pub struct Sender<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Sender<T> {
    /// Deliver `value`, suspending until the buffer has room.
    pub fn send(&self, value: T) {
        self.inner.send(value);
    }
}

impl<T> Clone for Sender<T> {
    fn clone(&self) -> Self {
        Sender {
            inner: self.inner.clone(),
        }
    }
}

/// The receiving half of a channel. Clone for additional receivers.
pub struct Receiver<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Receiver<T> {
    /// Take the next value, suspending until one is available.
    pub fn recv(&self) -> T {
        self.inner.recv()
    }
}

impl<T> Clone for Receiver<T> {
    fn clone(&self) -> Self {
        Receiver {
            inner: self.inner.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    // Thread-blocking paths only; task-parking paths are covered by the
    // scheduler's end-to-end tests.

    #[test]
    #[should_panic(expected = "capacity must be greater than 0")]
    fn zero_capacity_is_rejected() {
        let _ = bounded::<i32>(0);
    }

    #[test]
    fn buffered_values_arrive_in_order() {
        let (tx, rx) = bounded(3);
        tx.send(1);
        tx.send(2);
        tx.send(3);
        assert_eq!([rx.recv(), rx.recv(), rx.recv()], [1, 2, 3]);
    }

    #[test]
    fn full_channel_blocks_a_plain_thread_sender() {
        let (tx, rx) = bounded(1);
        tx.send(0);

        let sender = thread::spawn(move || {
            for i in 1..=3 {
                tx.send(i);
            }
        });

        // The sender cannot finish until we drain.
        thread::sleep(Duration::from_millis(50));
        assert!(!sender.is_finished());

        assert_eq!((0..=3).map(|_| rx.recv()).collect::<Vec<_>>(), [0, 1, 2, 3]);
        sender.join().unwrap();
    }

    #[test]
    fn empty_channel_blocks_a_plain_thread_receiver() {
        let (tx, rx) = channel();

        let receiver = thread::spawn(move || rx.recv());
        thread::sleep(Duration::from_millis(50));
        assert!(!receiver.is_finished());

        tx.send(7);
        assert_eq!(receiver.join().unwrap(), 7);
    }

    #[test]
    fn cloned_handles_share_the_channel() {
        let (tx, rx) = bounded(4);
        let tx2 = tx.clone();
        let rx2 = rx.clone();

        tx.send(1);
        tx2.send(2);
        assert_eq!(rx2.recv(), 1);
        assert_eq!(rx.recv(), 2);
    }
}
