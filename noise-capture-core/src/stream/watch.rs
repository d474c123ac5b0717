use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

/// Observable value: readers see the latest state and can wait for changes.
///
/// Intermediate values set between two reads are not replayed.
pub struct Watch<T> {
    sender: Arc<watch::Sender<T>>,
}

impl<T> Clone for Watch<T> {
    fn clone(&self) -> Self {
        Self {
            sender: Arc::clone(&self.sender),
        }
    }
}

impl<T: Clone + std::fmt::Debug> std::fmt::Debug for Watch<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Watch").field(&self.get()).finish()
    }
}

impl<T: Clone> Watch<T> {
    pub fn new(initial: T) -> Self {
        let (sender, _) = watch::channel(initial);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn get(&self) -> T {
        self.sender.borrow().clone()
    }

    pub fn set(&self, value: T) {
        self.sender.send_replace(value);
    }

    /// Read-only handle. Starts out having seen the current value.
    pub fn subscribe(&self) -> WatchReceiver<T> {
        WatchReceiver {
            receiver: self.sender.subscribe(),
        }
    }
}

impl<T: Clone + PartialEq> Watch<T> {
    /// Sets the value only if it differs. Returns whether it changed.
    pub fn set_if_changed(&self, value: T) -> bool {
        self.sender.send_if_modified(|current| {
            if *current == value {
                false
            } else {
                *current = value;
                true
            }
        })
    }
}

/// Reading end of a [`Watch`].
///
/// Once every [`Watch`] handle is gone the value is frozen: waits return
/// `None` straight away.
pub struct WatchReceiver<T> {
    receiver: watch::Receiver<T>,
}

impl<T: Clone> WatchReceiver<T> {
    pub fn get(&self) -> T {
        self.receiver.borrow().clone()
    }

    /// Whether a value was set since this receiver last observed one.
    pub fn has_changed(&self) -> bool {
        self.receiver.has_changed().unwrap_or(false)
    }

    /// Returns the latest value and marks it as seen.
    pub fn borrow_and_update(&mut self) -> T {
        self.receiver.borrow_and_update().clone()
    }

    /// Waits until a new value is set, up to `timeout`.
    pub fn wait_for_change(&mut self, timeout: Duration) -> Option<T> {
        let receiver = &mut self.receiver;
        block_on_timeout(timeout, async move {
            receiver.changed().await.ok()?;
            Some(receiver.borrow_and_update().clone())
        })
        .flatten()
    }

    /// Waits until the current value satisfies `predicate`, up to `timeout`.
    pub fn wait_until<F>(&mut self, predicate: F, timeout: Duration) -> Option<T>
    where
        F: FnMut(&T) -> bool,
    {
        let receiver = &mut self.receiver;
        block_on_timeout(timeout, async move {
            receiver.wait_for(predicate).await.ok().map(|value| value.clone())
        })
        .flatten()
    }
}

/// Drives `future` on the calling thread for at most `timeout`.
///
/// Watches are read from plain threads, so each blocking wait gets its own
/// current-thread runtime with a timer.
fn block_on_timeout<F: Future>(timeout: Duration, future: F) -> Option<F::Output> {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_time().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            log::error!("failed to build runtime for a watch wait: {e}");
            return None;
        }
    };
    runtime.block_on(async { tokio::time::timeout(timeout, future).await.ok() })
}
