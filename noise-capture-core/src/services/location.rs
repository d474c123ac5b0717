use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use crate::models::measurement::LocationRecord;
use crate::stream::Broadcast;
use crate::traits::location_provider::LocationProvider;

/// Location provider fed by the caller.
///
/// Fixes pushed while updates are stopped are ignored, as a platform provider
/// would not report them.
pub struct PushLocationProvider {
    live: Broadcast<LocationRecord>,
    updating: AtomicBool,
    last: Mutex<Option<LocationRecord>>,
}

impl PushLocationProvider {
    pub fn new(capacity: usize) -> Self {
        Self {
            live: Broadcast::new(capacity),
            updating: AtomicBool::new(false),
            last: Mutex::new(None),
        }
    }

    /// Reports a new fix. Returns whether it was published.
    pub fn push_location(&self, record: LocationRecord) -> bool {
        if !self.updating.load(Ordering::SeqCst) {
            log::debug!("ignoring location fix while updates are stopped");
            return false;
        }
        *self.last.lock() = Some(record.clone());
        self.live.publish(&record);
        true
    }
}

impl Default for PushLocationProvider {
    fn default() -> Self {
        Self::new(256)
    }
}

impl LocationProvider for PushLocationProvider {
    fn current_location(&self) -> Option<LocationRecord> {
        self.last.lock().clone()
    }

    fn live_location(&self) -> Broadcast<LocationRecord> {
        self.live.clone()
    }

    fn start_updating_location(&self) {
        if !self.updating.swap(true, Ordering::SeqCst) {
            log::debug!("location updates started");
        }
    }

    fn stop_updating_location(&self) {
        if self.updating.swap(false, Ordering::SeqCst) {
            log::debug!("location updates stopped");
        }
    }

    fn is_updating(&self) -> bool {
        self.updating.load(Ordering::SeqCst)
    }
}
