use std::fmt;

use serde::{Deserialize, Serialize};

/// Permissions the application may need, one delegate per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Permission {
    /// System bluetooth service is switched on.
    BluetoothServiceOn,
    Bluetooth,
    /// System location service is switched on.
    LocationServiceOn,
    LocationForeground,
    LocationBackground,
    RecordAudio,
    PostNotifications,
    /// Persistent local storage (origin private file system on web).
    PersistentLocalStorage,
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::BluetoothServiceOn => "bluetooth service",
            Self::Bluetooth => "bluetooth",
            Self::LocationServiceOn => "location service",
            Self::LocationForeground => "foreground location",
            Self::LocationBackground => "background location",
            Self::RecordAudio => "audio recording",
            Self::PostNotifications => "notifications",
            Self::PersistentLocalStorage => "persistent local storage",
        };
        f.write_str(name)
    }
}

/// State of a single permission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PermissionState {
    /// Not requested yet.
    NotDetermined,
    Granted,
    Denied,
    /// No delegate on this platform, either not implemented or not required.
    NotImplemented,
}

impl PermissionState {
    pub fn is_granted(&self) -> bool {
        matches!(self, Self::Granted)
    }
}
