//! Fixed-capacity FIFO between producers and a single consumer.
//!
//! Producers block (or fail, per [`BackpressurePolicy`]) while the queue is
//! full. Closing is a one-way switch: afterwards every push is rejected, while
//! the consumer keeps popping until the buffer is empty and only then sees
//! `None`.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::config::BackpressurePolicy;

/// Why a push did not enqueue. The rejected item is handed back.
#[derive(Debug, PartialEq, Eq)]
pub enum PushError<T> {
    Closed(T),
    Full(T),
    Timeout(T),
}

impl<T> PushError<T> {
    pub fn into_inner(self) -> T {
        match self {
            PushError::Closed(item) | PushError::Full(item) | PushError::Timeout(item) => item,
        }
    }
}

struct QueueState<T> {
    items: VecDeque<T>,
    closed: bool,
}

pub struct BoundedQueue<T> {
    state: Mutex<QueueState<T>>,
    not_empty: Condvar,
    not_full: Condvar,
    capacity: usize,
}

impl<T> BoundedQueue<T> {
    /// A capacity of zero is treated as one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::new(),
                closed: false,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Appends `item`, waiting for space according to `policy`.
    pub fn push(&self, item: T, policy: BackpressurePolicy) -> Result<(), PushError<T>> {
        let mut state = self.lock();
        if state.closed {
            return Err(PushError::Closed(item));
        }

        if state.items.len() >= self.capacity {
            state = match policy {
                BackpressurePolicy::FailFast => return Err(PushError::Full(item)),
                BackpressurePolicy::Block { timeout: None } => self
                    .not_full
                    .wait_while(state, |s| !s.closed && s.items.len() >= self.capacity)
                    .unwrap_or_else(PoisonError::into_inner),
                BackpressurePolicy::Block {
                    timeout: Some(timeout),
                } => {
                    let (state, result) = self.wait_for_space(state, timeout);
                    if result {
                        return Err(PushError::Timeout(item));
                    }
                    state
                }
            };
            // Closed while we were parked.
            if state.closed {
                return Err(PushError::Closed(item));
            }
        }

        state.items.push_back(item);
        drop(state);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Takes the oldest item, blocking while the queue is open and empty.
    ///
    /// Returns `None` only once the queue is closed and fully drained.
    pub fn pop(&self) -> Option<T> {
        let mut state = self
            .not_empty
            .wait_while(self.lock(), |s| !s.closed && s.items.is_empty())
            .unwrap_or_else(PoisonError::into_inner);
        let item = state.items.pop_front();
        drop(state);
        if item.is_some() {
            self.not_full.notify_one();
        }
        item
    }

    /// Rejects all further pushes. Items already buffered stay poppable.
    ///
    /// Returns `false` if the queue was already closed.
    pub fn close(&self) -> bool {
        let mut state = self.lock();
        let was_open = !state.closed;
        state.closed = true;
        drop(state);
        self.not_empty.notify_all();
        self.not_full.notify_all();
        was_open
    }

    /// Removes every buffered item without handing them to a consumer.
    pub fn clear(&self) -> usize {
        let mut state = self.lock();
        let dropped = state.items.len();
        state.items.clear();
        drop(state);
        self.not_full.notify_all();
        dropped
    }

    /// Waits up to `timeout` for a free slot (or close). The flag is true when
    /// the deadline passed with the queue still full and open.
    fn wait_for_space<'a>(
        &'a self,
        mut state: MutexGuard<'a, QueueState<T>>,
        timeout: Duration,
    ) -> (MutexGuard<'a, QueueState<T>>, bool) {
        // A timeout past the clock's range is no timeout at all.
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            let state = self
                .not_full
                .wait_while(state, |s| !s.closed && s.items.len() >= self.capacity)
                .unwrap_or_else(PoisonError::into_inner);
            return (state, false);
        };
        while !state.closed && state.items.len() >= self.capacity {
            let now = Instant::now();
            if now >= deadline {
                return (state, true);
            }
            state = self
                .not_full
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        (state, false)
    }

    // The guarded state is always consistent between statements, so a
    // panicking holder leaves nothing to repair.
    fn lock(&self) -> MutexGuard<'_, QueueState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{mpsc, Arc};
    use std::thread;

    const BLOCK: BackpressurePolicy = BackpressurePolicy::Block { timeout: None };

    #[test]
    fn test_fifo_order() {
        let queue = BoundedQueue::new(8);
        for i in 0..5 {
            queue.push(i, BLOCK).unwrap();
        }
        queue.close();
        let drained: Vec<i32> = std::iter::from_fn(|| queue.pop()).collect();
        assert_eq!(drained, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_push_after_close_returns_item() {
        let queue = BoundedQueue::new(2);
        assert!(queue.close());
        assert!(!queue.close());
        assert_eq!(queue.push(7, BLOCK), Err(PushError::Closed(7)));
    }

    #[test]
    fn test_fail_fast_on_full() {
        let queue = BoundedQueue::new(1);
        queue.push(1, BackpressurePolicy::FailFast).unwrap();
        let err = queue.push(2, BackpressurePolicy::FailFast).unwrap_err();
        assert_eq!(err.into_inner(), 2);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_block_timeout_on_full() {
        let queue = BoundedQueue::new(1);
        queue.push(1, BLOCK).unwrap();
        let policy = BackpressurePolicy::Block {
            timeout: Some(Duration::from_millis(20)),
        };
        let start = Instant::now();
        assert_eq!(queue.push(2, policy), Err(PushError::Timeout(2)));
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_unrepresentable_timeout_waits_for_space() {
        let queue = Arc::new(BoundedQueue::new(1));
        queue.push(1, BLOCK).unwrap();
        let policy = BackpressurePolicy::Block {
            timeout: Some(Duration::MAX),
        };

        let (done_tx, done_rx) = mpsc::channel();
        let producer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                let result = queue.push(2, policy);
                let _ = done_tx.send(());
                result
            })
        };

        assert!(done_rx.recv_timeout(Duration::from_millis(50)).is_err());
        assert_eq!(queue.pop(), Some(1));
        done_rx.recv_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(producer.join().unwrap(), Ok(()));
        assert_eq!(queue.pop(), Some(2));
    }

    #[test]
    fn test_zero_capacity_holds_one() {
        let queue = BoundedQueue::new(0);
        assert_eq!(queue.capacity(), 1);
        queue.push("a", BackpressurePolicy::FailFast).unwrap();
        assert!(queue.push("b", BackpressurePolicy::FailFast).is_err());
    }

    #[test]
    fn test_close_wakes_blocked_producer() {
        let queue = Arc::new(BoundedQueue::new(1));
        queue.push(1, BLOCK).unwrap();

        let (done_tx, done_rx) = mpsc::channel();
        let producer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                let result = queue.push(2, BLOCK);
                let _ = done_tx.send(());
                result
            })
        };

        assert!(done_rx.recv_timeout(Duration::from_millis(50)).is_err());
        queue.close();
        done_rx.recv_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(producer.join().unwrap(), Err(PushError::Closed(2)));

        // The item buffered before close is still delivered.
        assert_eq!(queue.pop(), Some(1));
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn test_clear_discards_buffered() {
        let queue = BoundedQueue::new(4);
        queue.push(1, BLOCK).unwrap();
        queue.push(2, BLOCK).unwrap();
        queue.close();
        assert_eq!(queue.clear(), 2);
        assert!(queue.is_empty());
        assert_eq!(queue.pop(), None);
    }
}
