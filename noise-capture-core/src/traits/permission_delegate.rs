use crate::models::error::PermissionError;
use crate::models::permission::{Permission, PermissionState};

/// Platform handler for one kind of [`Permission`].
///
/// Methods may be called from any thread.
pub trait PermissionDelegate: Send + Sync {
    fn permission(&self) -> Permission;

    /// Current state, without prompting the user.
    fn permission_state(&self) -> PermissionState;

    /// Prompts the user if needed and blocks until the platform answers.
    ///
    /// May block for as long as the user leaves the dialog open.
    fn provide_permission(&self) -> PermissionState;

    /// Whether [`PermissionDelegate::open_setting_page`] can succeed here.
    fn can_open_settings(&self) -> bool {
        false
    }

    /// Opens the system settings page where the user can change this permission.
    fn open_setting_page(&self) -> Result<(), PermissionError> {
        Err(PermissionError::CannotOpenSettings(self.permission()))
    }
}
