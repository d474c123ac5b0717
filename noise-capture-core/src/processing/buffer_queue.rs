use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};

/// Bounded, thread-safe FIFO that drops the oldest item on overflow.
///
/// Sits between a real-time producer (the audio callback) and a worker, so
/// `push` never blocks. Items dropped to make room are counted.
#[derive(Debug)]
pub struct BufferQueue<T> {
    sender: Sender<T>,
    // Kept on the producer side too, so a full queue can evict its head.
    receiver: Receiver<T>,
    dropped: AtomicU64,
    capacity: usize,
}

impl<T> BufferQueue<T> {
    /// Creates a queue holding at most `capacity` items (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, receiver) = bounded(capacity);
        Self {
            sender,
            receiver,
            dropped: AtomicU64::new(0),
            capacity,
        }
    }

    /// Appends an item, dropping the oldest one if the queue is full.
    ///
    /// Returns `true` if an item was dropped.
    pub fn push(&self, item: T) -> bool {
        let mut item = item;
        let mut dropped = false;
        loop {
            match self.sender.try_send(item) {
                Ok(()) => return dropped,
                Err(TrySendError::Full(rejected)) => {
                    if self.receiver.try_recv().is_ok() {
                        self.dropped.fetch_add(1, Ordering::Relaxed);
                        dropped = true;
                    }
                    item = rejected;
                }
                // Unreachable while `self.receiver` lives.
                Err(TrySendError::Disconnected(_)) => return dropped,
            }
        }
    }

    /// Removes the oldest item, waiting up to `timeout` for one to arrive.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<T> {
        self.receiver.recv_timeout(timeout).ok()
    }

    pub fn try_pop(&self) -> Option<T> {
        self.receiver.try_recv().ok()
    }

    /// Removes every queued item and returns them in arrival order.
    pub fn drain(&self) -> Vec<T> {
        self.receiver.try_iter().collect()
    }

    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    /// Total number of items dropped on overflow since creation.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;
    use std::time::Instant;

    use super::*;

    #[test]
    fn pops_in_arrival_order() {
        let queue = BufferQueue::new(4);
        queue.push(1);
        queue.push(2);
        queue.push(3);

        assert_eq!(queue.len(), 3);
        assert_eq!(queue.try_pop(), Some(1));
        assert_eq!(queue.drain(), vec![2, 3]);
        assert!(queue.is_empty());
    }

    #[test]
    fn overflow_drops_oldest() {
        let queue = BufferQueue::new(2);
        assert!(!queue.push("a"));
        assert!(!queue.push("b"));
        assert!(queue.push("c"));

        assert_eq!(queue.dropped(), 1);
        assert_eq!(queue.drain(), vec!["b", "c"]);
    }

    #[test]
    fn zero_capacity_holds_one_item() {
        let queue = BufferQueue::new(0);
        queue.push(1);
        queue.push(2);
        assert_eq!(queue.capacity(), 1);
        assert_eq!(queue.try_pop(), Some(2));
    }

    #[test]
    fn pop_timeout_returns_none_when_empty() {
        let queue: BufferQueue<u8> = BufferQueue::new(1);
        let started = Instant::now();
        assert_eq!(queue.pop_timeout(Duration::from_millis(20)), None);
        assert!(started.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn pop_timeout_wakes_on_push() {
        let queue = Arc::new(BufferQueue::new(8));
        let producer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(10));
                queue.push(42);
            })
        };

        assert_eq!(queue.pop_timeout(Duration::from_secs(5)), Some(42));
        producer.join().unwrap();
    }

    #[test]
    fn concurrent_producers_never_exceed_capacity() {
        let queue = Arc::new(BufferQueue::new(4));
        let producers: Vec<_> = (0..4)
            .map(|p| {
                let queue = Arc::clone(&queue);
                thread::spawn(move || {
                    for i in 0..250 {
                        queue.push(p * 1000 + i);
                    }
                })
            })
            .collect();
        for producer in producers {
            producer.join().unwrap();
        }

        assert!(queue.len() <= 4);
        assert_eq!(queue.len() as u64 + queue.dropped(), 1000);
    }
}
