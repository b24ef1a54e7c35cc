//! Bounded drop-oldest queue.
//!
//! Every bounded queue in the fabric favours freshness: when full, the
//! oldest element is discarded and the new one appended. Bus subscriptions
//! and WebSocket outbound queues share this primitive so the policy is
//! uniform.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::Notify;

#[derive(Debug)]
pub struct Bounded<T> {
    items: Mutex<VecDeque<T>>,
    capacity: usize,
    dropped: AtomicU64,
    closed: AtomicBool,
    notify: Notify,
}

impl<T> Bounded<T> {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "queue capacity must be positive");
        Self {
            items: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            dropped: AtomicU64::new(0),
            closed: AtomicBool::new(false),
            notify: Notify::new(),
        }
    }

    /// Enqueue without blocking. Returns `true` when an older element was
    /// discarded to make room.
    pub fn push(&self, item: T) -> bool {
        let overflowed = {
            let mut items = self.items.lock();
            let overflowed = if items.len() == self.capacity {
                items.pop_front();
                true
            } else {
                false
            };
            items.push_back(item);
            overflowed
        };
        if overflowed {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        self.notify.notify_one();
        overflowed
    }

    /// Await the next element. Returns `None` once the queue is closed and
    /// drained.
    pub async fn recv(&self) -> Option<T> {
        loop {
            if let Some(item) = self.try_recv() {
                return Some(item);
            }
            if self.closed.load(Ordering::Acquire) {
                return None;
            }
            self.notify.notified().await;
        }
    }

    pub fn try_recv(&self) -> Option<T> {
        self.items.lock().pop_front()
    }

    /// Wake all waiters; subsequent `recv` calls drain remaining elements
    /// and then return `None`.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_waiters();
        self.notify.notify_one();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Total elements discarded due to overflow since creation.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn test_overflow_drops_oldest() {
        let queue = Bounded::new(3);
        for n in 0..5 {
            queue.push(n);
        }
        assert_eq!(queue.dropped(), 2);
        assert_eq!(queue.try_recv(), Some(2));
        assert_eq!(queue.try_recv(), Some(3));
        assert_eq!(queue.try_recv(), Some(4));
        assert_eq!(queue.try_recv(), None);
    }

    #[test]
    fn test_fifo_order() {
        let queue = Bounded::new(8);
        for n in 0..8 {
            queue.push(n);
        }
        let drained: Vec<_> = std::iter::from_fn(|| queue.try_recv()).collect();
        assert_eq!(drained, (0..8).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_recv_wakes_on_push() {
        let queue = Arc::new(Bounded::new(2));
        let consumer = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.recv().await })
        };
        tokio::task::yield_now().await;
        queue.push(7u32);
        assert_eq!(consumer.await.unwrap(), Some(7));
    }

    #[tokio::test]
    async fn test_close_drains_then_ends() {
        let queue: Bounded<u32> = Bounded::new(2);
        queue.push(1);
        queue.close();
        assert_eq!(queue.recv().await, Some(1));
        assert_eq!(queue.recv().await, None);
    }
}
