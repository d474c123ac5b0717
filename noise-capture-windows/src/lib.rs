//! # noise-capture-windows
//!
//! Windows backend for noise-capture.
//!
//! Provides:
//! - `WasapiAudioSource`: microphone [`AudioSource`](noise_capture_core::AudioSource)
//!   on a WASAPI capture endpoint in shared mode
//! - `DeviceEnumerator`: capture device listing via the MMDevice API
//! - `WindowsMicrophonePermissionDelegate`: microphone privacy setting check
//!
//! ## Platform Requirements
//! - Windows 10 1803+ for the microphone privacy settings page
//! - Visual Studio Build Tools 2022 + Windows SDK for linking
//!
//! ## Usage
//! ```ignore
//! use std::sync::Arc;
//! use noise_capture_core::{AppContext, PushLocationProvider, JsonFileStorage, RecordingConfiguration};
//! use noise_capture_windows::{WasapiAudioSource, WindowsMicrophonePermissionDelegate};
//!
//! let config = RecordingConfiguration::default();
//! let context = AppContext::new(
//!     config.clone(),
//!     Box::new(WasapiAudioSource::default_device()),
//!     vec![Arc::new(WindowsMicrophonePermissionDelegate::new())],
//!     Arc::new(PushLocationProvider::default()),
//!     Arc::new(JsonFileStorage::open(&config.output_directory)?),
//! )?;
//! let mut recording = context.recording_service();
//! recording.start()?;
//! ```

#[cfg(target_os = "windows")]
pub mod device_enumerator;
#[cfg(target_os = "windows")]
pub mod permissions;
#[cfg(target_os = "windows")]
pub mod wasapi_source;

#[cfg(target_os = "windows")]
pub use device_enumerator::{CaptureDevice, DeviceEnumerator, TransportType};
#[cfg(target_os = "windows")]
pub use permissions::WindowsMicrophonePermissionDelegate;
#[cfg(target_os = "windows")]
pub use wasapi_source::WasapiAudioSource;
