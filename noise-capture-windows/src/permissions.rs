//! Windows microphone privacy permission.
//!
//! On Windows 10 1803+, microphone access is controlled by the privacy
//! settings at Settings > Privacy > Microphone. Desktop apps are allowed
//! unless the user has disabled the global toggle.
//!
//! There is no per-app consent dialog for unpackaged desktop apps, so a
//! request only re-reads the current state.

use std::process::Command;
use std::thread;

use windows::Win32::Media::Audio::*;
use windows::Win32::System::Com::*;

use noise_capture_core::models::error::PermissionError;
use noise_capture_core::models::permission::{Permission, PermissionState};
use noise_capture_core::traits::permission_delegate::PermissionDelegate;

const E_ACCESSDENIED: i32 = -2147024891;
const AUDCLNT_E_DEVICE_IN_USE: i32 = -2004287478;

const PRIVACY_SETTINGS_URI: &str = "ms-settings:privacy-microphone";

/// [`PermissionDelegate`] for [`Permission::RecordAudio`] on Windows.
#[derive(Debug, Default)]
pub struct WindowsMicrophonePermissionDelegate;

impl WindowsMicrophonePermissionDelegate {
    pub fn new() -> Self {
        Self
    }
}

impl PermissionDelegate for WindowsMicrophonePermissionDelegate {
    fn permission(&self) -> Permission {
        Permission::RecordAudio
    }

    fn permission_state(&self) -> PermissionState {
        // COM is initialized on a thread of our own so the caller's apartment is untouched.
        let check = thread::Builder::new()
            .name("mic-permission-check".into())
            .spawn(check_microphone_access);
        let result = match check {
            Ok(handle) => handle.join().unwrap_or_else(|_| Err("permission check panicked".into())),
            Err(e) => Err(format!("failed to spawn permission check: {e}")),
        };

        match result {
            Ok(true) => PermissionState::Granted,
            Ok(false) => PermissionState::Denied,
            Err(e) => {
                log::warn!("microphone permission check failed: {e}");
                PermissionState::Denied
            }
        }
    }

    fn provide_permission(&self) -> PermissionState {
        self.permission_state()
    }

    fn can_open_settings(&self) -> bool {
        true
    }

    fn open_setting_page(&self) -> Result<(), PermissionError> {
        Command::new("cmd")
            .args(["/C", "start", PRIVACY_SETTINGS_URI])
            .spawn()
            .map(|_| ())
            .map_err(|e| {
                log::warn!("failed to open microphone privacy settings: {e}");
                PermissionError::CannotOpenSettings(Permission::RecordAudio)
            })
    }
}

/// Opens the default capture device. Access denied or an exclusive
/// holder means the microphone is off in the privacy settings.
fn check_microphone_access() -> Result<bool, String> {
    unsafe {
        CoInitializeEx(None, COINIT_MULTITHREADED)
            .ok()
            .map_err(|e| format!("CoInitializeEx failed: {e}"))?;

        let result = activate_default_capture_client();

        CoUninitialize();
        result
    }
}

unsafe fn activate_default_capture_client() -> Result<bool, String> {
    let enumerator: IMMDeviceEnumerator = CoCreateInstance(&MMDeviceEnumerator, None, CLSCTX_ALL)
        .map_err(|e| format!("failed to create enumerator: {e}"))?;

    let device = match enumerator.GetDefaultAudioEndpoint(eCapture, eConsole) {
        Ok(d) => d,
        Err(_) => return Ok(false),
    };

    let client: windows::core::Result<IAudioClient> = device.Activate(CLSCTX_ALL, None);
    match client {
        Ok(_) => Ok(true),
        Err(e) if e.code().0 == E_ACCESSDENIED || e.code().0 == AUDCLNT_E_DEVICE_IN_USE => Ok(false),
        Err(e) => {
            log::warn!("unexpected error checking microphone access: {e}");
            Ok(true)
        }
    }
}
