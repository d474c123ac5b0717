use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};

use crate::processing::buffer_queue::BufferQueue;

/// An observer callback. Read-locked while it runs; emptied under the write
/// lock on detach, which therefore waits for any call in flight.
type ObserverSlot<T> = Arc<RwLock<Option<Box<dyn Fn(&T) + Send + Sync>>>>;

struct BroadcastInner<T> {
    mailboxes: Mutex<Vec<(u64, Arc<BufferQueue<T>>)>>,
    observers: Mutex<Vec<(u64, ObserverSlot<T>)>>,
    next_id: AtomicU64,
    capacity: usize,
}

impl<T> BroadcastInner<T> {
    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }
}

/// Multi-subscriber event stream.
///
/// Every value published reaches every subscriber present at publish time.
/// Two kinds of subscriber exist:
///
/// - [`Subscription`]: a bounded mailbox polled by the subscriber. A slow
///   reader loses its own oldest values and never slows down the publisher
///   or other subscribers.
/// - observers: callbacks run synchronously on the publishing thread. They
///   must return quickly, and must not drop their own [`ObserverHandle`].
///
/// Cloning yields another handle to the same stream.
pub struct Broadcast<T> {
    inner: Arc<BroadcastInner<T>>,
}

impl<T> Clone for Broadcast<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> std::fmt::Debug for Broadcast<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Broadcast")
            .field("subscribers", &self.inner.mailboxes.lock().len())
            .field("observers", &self.inner.observers.lock().len())
            .finish()
    }
}

impl<T: Clone + Send + 'static> Broadcast<T> {
    /// `capacity` bounds each subscriber mailbox.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(BroadcastInner {
                mailboxes: Mutex::new(Vec::new()),
                observers: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(0),
                capacity,
            }),
        }
    }

    pub fn subscribe(&self) -> Subscription<T> {
        let id = self.inner.next_id();
        let queue = Arc::new(BufferQueue::new(self.inner.capacity));
        self.inner.mailboxes.lock().push((id, Arc::clone(&queue)));
        Subscription {
            id,
            queue,
            owner: Arc::downgrade(&self.inner),
        }
    }

    /// Registers a callback invoked for every published value until the
    /// returned handle is dropped.
    pub fn observe<F>(&self, callback: F) -> ObserverHandle
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = self.inner.next_id();
        let callback: Box<dyn Fn(&T) + Send + Sync> = Box::new(callback);
        let slot: ObserverSlot<T> = Arc::new(RwLock::new(Some(callback)));
        self.inner.observers.lock().push((id, Arc::clone(&slot)));
        let owner: Weak<BroadcastInner<T>> = Arc::downgrade(&self.inner);
        ObserverHandle {
            detach: Some(Box::new(move || {
                if let Some(inner) = owner.upgrade() {
                    inner.observers.lock().retain(|(other, _)| *other != id);
                }
                // A publish may have snapshotted the slot before it was
                // unlisted. Wait for it, and leave nothing for it to call.
                slot.write().take();
            })),
        }
    }

    /// Delivers `value` to every current subscriber.
    ///
    /// Subscriber lists are snapshotted first so callbacks may subscribe, or
    /// drop handles other than their own, without deadlocking.
    pub fn publish(&self, value: &T) {
        let mailboxes: Vec<_> = self.inner.mailboxes.lock().iter().map(|(_, q)| Arc::clone(q)).collect();
        let observers: Vec<_> = self.inner.observers.lock().iter().map(|(_, o)| Arc::clone(o)).collect();
        for mailbox in mailboxes {
            mailbox.push(value.clone());
        }
        for observer in observers {
            // Recursive, so a callback publishing on this same stream cannot
            // queue behind a pending detach.
            if let Some(callback) = observer.read_recursive().as_ref() {
                callback(value);
            }
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.mailboxes.lock().len() + self.inner.observers.lock().len()
    }
}

/// Mailbox end of a [`Broadcast`]. Unsubscribes on drop.
pub struct Subscription<T> {
    id: u64,
    queue: Arc<BufferQueue<T>>,
    owner: Weak<BroadcastInner<T>>,
}

impl<T> Subscription<T> {
    pub fn recv_timeout(&self, timeout: Duration) -> Option<T> {
        self.queue.pop_timeout(timeout)
    }

    pub fn try_recv(&self) -> Option<T> {
        self.queue.try_pop()
    }

    /// Every value received so far, oldest first.
    pub fn drain(&self) -> Vec<T> {
        self.queue.drain()
    }

    /// Values this subscriber lost to mailbox overflow.
    pub fn dropped(&self) -> u64 {
        self.queue.dropped()
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        if let Some(inner) = self.owner.upgrade() {
            inner.mailboxes.lock().retain(|(other, _)| *other != self.id);
        }
    }
}

/// Keeps an observer callback registered. Unregisters on drop.
pub struct ObserverHandle {
    detach: Option<Box<dyn FnOnce() + Send>>,
}

impl ObserverHandle {
    /// Unregisters now, blocking until a callback already running on another
    /// thread has returned. Once this returns the callback is never invoked
    /// again.
    pub fn detach(mut self) {
        if let Some(detach) = self.detach.take() {
            detach();
        }
    }
}

impl Drop for ObserverHandle {
    fn drop(&mut self) {
        if let Some(detach) = self.detach.take() {
            detach();
        }
    }
}

impl std::fmt::Debug for ObserverHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverHandle")
            .field("attached", &self.detach.is_some())
            .finish()
    }
}
