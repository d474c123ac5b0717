use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use crate::models::error::PermissionError;
use crate::models::permission::{Permission, PermissionState};
use crate::stream::{Watch, WatchReceiver};
use crate::traits::permission_delegate::PermissionDelegate;

/// Default delay between two permission state polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Routes permission queries to the delegate registered for each kind.
///
/// Kinds without a delegate on this platform report
/// [`PermissionState::NotImplemented`].
pub struct PermissionService {
    delegates: HashMap<Permission, Arc<dyn PermissionDelegate>>,
    poll_interval: Duration,
}

impl PermissionService {
    /// Registers `delegates`; a later delegate replaces an earlier one for the
    /// same permission.
    pub fn new(delegates: Vec<Arc<dyn PermissionDelegate>>) -> Self {
        let delegates = delegates
            .into_iter()
            .map(|delegate| (delegate.permission(), delegate))
            .collect();
        Self {
            delegates,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn check_permission(&self, permission: Permission) -> PermissionState {
        self.delegates
            .get(&permission)
            .map_or(PermissionState::NotImplemented, |d| d.permission_state())
    }

    /// Asks the platform for `permission`. Blocks until the user answers.
    pub fn request_permission(&self, permission: Permission) -> PermissionState {
        match self.delegates.get(&permission) {
            Some(delegate) => {
                let state = delegate.provide_permission();
                log::debug!("{permission} request resolved to {state:?}");
                state
            }
            None => PermissionState::NotImplemented,
        }
    }

    pub fn can_open_settings(&self, permission: Permission) -> bool {
        self.delegates
            .get(&permission)
            .is_some_and(|d| d.can_open_settings())
    }

    pub fn open_settings(&self, permission: Permission) -> Result<(), PermissionError> {
        match self.delegates.get(&permission) {
            Some(delegate) => delegate.open_setting_page(),
            None => Err(PermissionError::CannotOpenSettings(permission)),
        }
    }

    /// Observes the state of `permission`, polled every poll interval on a
    /// dedicated thread until the watcher is dropped.
    pub fn watch_permission_state(&self, permission: Permission) -> PermissionWatcher {
        let Some(delegate) = self.delegates.get(&permission) else {
            return PermissionWatcher::fixed(PermissionState::NotImplemented);
        };

        let state = Watch::new(delegate.permission_state());
        let receiver = state.subscribe();
        let running = Arc::new(AtomicBool::new(true));
        let spawned = {
            let running = Arc::clone(&running);
            let delegate = Arc::clone(delegate);
            let interval = self.poll_interval;
            thread::Builder::new()
                .name(format!("permission-watch-{permission:?}").to_lowercase())
                .spawn(move || {
                    while running.load(Ordering::SeqCst) {
                        thread::park_timeout(interval);
                        if !running.load(Ordering::SeqCst) {
                            break;
                        }
                        if state.set_if_changed(delegate.permission_state()) {
                            log::debug!("{permission} is now {:?}", state.get());
                        }
                    }
                })
        };

        match spawned {
            Ok(handle) => PermissionWatcher {
                receiver,
                running,
                poll_handle: Some(handle),
            },
            Err(e) => {
                log::error!("failed to spawn permission watcher for {permission}: {e}");
                PermissionWatcher {
                    receiver,
                    running,
                    poll_handle: None,
                }
            }
        }
    }
}

/// Live view of one permission's state. Stops polling on drop.
pub struct PermissionWatcher {
    receiver: WatchReceiver<PermissionState>,
    running: Arc<AtomicBool>,
    poll_handle: Option<thread::JoinHandle<()>>,
}

impl PermissionWatcher {
    fn fixed(state: PermissionState) -> Self {
        Self {
            receiver: Watch::new(state).subscribe(),
            running: Arc::new(AtomicBool::new(false)),
            poll_handle: None,
        }
    }

    pub fn current(&self) -> PermissionState {
        self.receiver.get()
    }

    /// Waits for the next state change, up to `timeout`.
    pub fn wait_for_change(&mut self, timeout: Duration) -> Option<PermissionState> {
        self.receiver.wait_for_change(timeout)
    }

    /// Waits until the state equals `expected`. Returns whether it did within
    /// `timeout`.
    pub fn wait_for(&mut self, expected: PermissionState, timeout: Duration) -> bool {
        self.receiver.wait_until(|&state| state == expected, timeout).is_some()
    }
}

impl Drop for PermissionWatcher {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.poll_handle.take() {
            handle.thread().unpark();
            if handle.join().is_err() {
                log::error!("permission watcher thread panicked");
            }
        }
    }
}

/// Permission delegate driven by the caller.
///
/// `provide_permission` resolves a not-yet-determined state to the configured
/// answer, as a user dialog would.
pub struct ManualPermissionDelegate {
    permission: Permission,
    state: Mutex<PermissionState>,
    answer: Mutex<PermissionState>,
    settings_available: bool,
    settings_opened: AtomicU64,
}

impl ManualPermissionDelegate {
    pub fn new(permission: Permission, state: PermissionState) -> Self {
        Self {
            permission,
            state: Mutex::new(state),
            answer: Mutex::new(PermissionState::Granted),
            settings_available: false,
            settings_opened: AtomicU64::new(0),
        }
    }

    pub fn granted(permission: Permission) -> Self {
        Self::new(permission, PermissionState::Granted)
    }

    pub fn with_settings_page(mut self) -> Self {
        self.settings_available = true;
        self
    }

    /// Simulates a change made outside the app, e.g. in system settings.
    pub fn set_state(&self, state: PermissionState) {
        *self.state.lock() = state;
    }

    /// State the simulated dialog resolves to.
    pub fn set_answer(&self, answer: PermissionState) {
        *self.answer.lock() = answer;
    }

    pub fn settings_opened(&self) -> u64 {
        self.settings_opened.load(Ordering::SeqCst)
    }
}

impl PermissionDelegate for ManualPermissionDelegate {
    fn permission(&self) -> Permission {
        self.permission
    }

    fn permission_state(&self) -> PermissionState {
        *self.state.lock()
    }

    fn provide_permission(&self) -> PermissionState {
        let mut state = self.state.lock();
        if *state == PermissionState::NotDetermined {
            *state = *self.answer.lock();
        }
        *state
    }

    fn can_open_settings(&self) -> bool {
        self.settings_available
    }

    fn open_setting_page(&self) -> Result<(), PermissionError> {
        if !self.settings_available {
            return Err(PermissionError::CannotOpenSettings(self.permission));
        }
        self.settings_opened.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
