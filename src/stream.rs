//! Bounded FIFO with a drop policy and blocking/non-blocking receive, used
//! by the stream bridge (`bridge::ToStream`).

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};

/// What happens to a `push` when the buffer is already at capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropPolicy {
    /// Evict the oldest buffered item, then append the new one.
    DropOldest,
    /// Discard the incoming item; the buffer is unchanged.
    DropNewest,
    /// Clear the buffer entirely, then append only the new item.
    DropAll,
}

/// Error returned by a blocking `recv` once the stream has been disposed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Closed;

/// Error returned by `try_recv`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TryRecvError {
    Empty,
    Closed,
}

struct Shared<T> {
    buffer: Mutex<VecDeque<T>>,
    condvar: Condvar,
    capacity: usize,
    drop_policy: DropPolicy,
    disposed: Mutex<bool>,
    on_dispose: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

/// A bounded, backpressured FIFO queue.
pub struct Stream<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for Stream<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<T> Stream<T> {
    /// `capacity` is clamped to at least 1.
    pub fn new(capacity: usize, drop_policy: DropPolicy) -> Self {
        Self {
            shared: Arc::new(Shared {
                buffer: Mutex::new(VecDeque::with_capacity(capacity.max(1))),
                condvar: Condvar::new(),
                capacity: capacity.max(1),
                drop_policy,
                disposed: Mutex::new(false),
                on_dispose: Mutex::new(None),
            }),
        }
    }

    /// Register a callback run exactly once when this stream is disposed —
    /// `ToStream` uses this to dispose the underlying subscription.
    pub fn set_on_dispose(&self, f: impl FnOnce() + Send + 'static) {
        *self.shared.on_dispose.lock().expect("poisoned") = Some(Box::new(f));
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    pub fn is_disposed(&self) -> bool {
        *self.shared.disposed.lock().expect("poisoned")
    }

    pub fn len(&self) -> usize {
        self.shared.buffer.lock().expect("poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Push an item, applying the drop policy if the buffer is full.
    /// Returns `false` if the item was not accepted (`DropNewest` at
    /// capacity, or the stream is already disposed).
    pub fn push(&self, item: T) -> bool {
        if self.is_disposed() {
            return false;
        }
        let mut buffer = self.shared.buffer.lock().expect("poisoned");
        if buffer.len() >= self.shared.capacity {
            match self.shared.drop_policy {
                DropPolicy::DropOldest => {
                    buffer.pop_front();
                }
                DropPolicy::DropNewest => {
                    return false;
                }
                DropPolicy::DropAll => {
                    buffer.clear();
                }
            }
        }
        buffer.push_back(item);
        self.shared.condvar.notify_all();
        true
    }

    /// Block until an item is available or the stream is disposed.
    pub fn recv(&self) -> Result<T, Closed> {
        let mut buffer = self.shared.buffer.lock().expect("poisoned");
        loop {
            if let Some(item) = buffer.pop_front() {
                return Ok(item);
            }
            if self.is_disposed() {
                return Err(Closed);
            }
            buffer = self.shared.condvar.wait(buffer).expect("poisoned");
        }
    }

    /// Non-blocking receive.
    pub fn try_recv(&self) -> Result<T, TryRecvError> {
        let mut buffer = self.shared.buffer.lock().expect("poisoned");
        if let Some(item) = buffer.pop_front() {
            return Ok(item);
        }
        if self.is_disposed() {
            Err(TryRecvError::Closed)
        } else {
            Err(TryRecvError::Empty)
        }
    }

    /// Dispose the stream: wakes all blocked receivers (they observe
    /// `Closed`), clears the buffer, and runs the registered dispose
    /// callback (if any) exactly once. Idempotent.
    pub fn dispose(&self) {
        let mut disposed = self.shared.disposed.lock().expect("poisoned");
        if *disposed {
            return;
        }
        *disposed = true;
        drop(disposed);

        self.shared.buffer.lock().expect("poisoned").clear();
        self.shared.condvar.notify_all();

        if let Some(f) = self.shared.on_dispose.lock().expect("poisoned").take() {
            f();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_is_clamped_to_at_least_one() {
        let s: Stream<i32> = Stream::new(0, DropPolicy::DropOldest);
        assert_eq!(s.capacity(), 1);
    }

    #[test]
    fn drop_oldest_keeps_most_recent_items() {
        let s = Stream::new(2, DropPolicy::DropOldest);
        assert!(s.push("p1"));
        assert!(s.push("p2"));
        assert!(s.push("p3"));
        assert_eq!(s.try_recv(), Ok("p2"));
        assert_eq!(s.try_recv(), Ok("p3"));
        assert_eq!(s.try_recv(), Err(TryRecvError::Empty));
    }

    #[test]
    fn drop_newest_rejects_incoming_item_when_full() {
        let s = Stream::new(2, DropPolicy::DropNewest);
        assert!(s.push("p1"));
        assert!(s.push("p2"));
        assert!(!s.push("p3"));
        assert_eq!(s.try_recv(), Ok("p1"));
        assert_eq!(s.try_recv(), Ok("p2"));
    }

    #[test]
    fn drop_all_clears_buffer_then_appends() {
        let s = Stream::new(2, DropPolicy::DropAll);
        assert!(s.push("p1"));
        assert!(s.push("p2"));
        assert!(s.push("p3"));
        assert_eq!(s.len(), 1);
        assert_eq!(s.try_recv(), Ok("p3"));
    }

    #[test]
    fn dispose_wakes_blocked_receivers_with_closed() {
        let s: Stream<i32> = Stream::new(1, DropPolicy::DropOldest);
        let s2 = s.clone();
        let handle = std::thread::spawn(move || s2.recv());
        std::thread::sleep(std::time::Duration::from_millis(20));
        s.dispose();
        assert_eq!(handle.join().unwrap(), Err(Closed));
    }

    #[test]
    fn dispose_runs_callback_exactly_once() {
        let s: Stream<i32> = Stream::new(1, DropPolicy::DropOldest);
        let count = Arc::new(Mutex::new(0));
        let count2 = count.clone();
        s.set_on_dispose(move || *count2.lock().unwrap() += 1);
        s.dispose();
        s.dispose();
        assert_eq!(*count.lock().unwrap(), 1);
    }
}
