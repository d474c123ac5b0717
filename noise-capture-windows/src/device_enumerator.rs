//! Capture device enumeration via the MMDevice API.
//!
//! Wraps `IMMDeviceEnumerator` to list microphone endpoints with friendly
//! names and transport types.

use windows::core::*;
use windows::Win32::Devices::FunctionDiscovery::*;
use windows::Win32::Media::Audio::*;
use windows::Win32::System::Com::StructuredStorage::PropVariantClear;
use windows::Win32::System::Com::*;
use windows::Win32::System::Variant::*;
use windows::Win32::UI::Shell::PropertiesSystem::{IPropertyStore, PROPERTYKEY};

use noise_capture_core::models::audio_models::MicrophoneLocation;
use noise_capture_core::models::error::InitializeError;

/// How a capture endpoint is attached to the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportType {
    BuiltIn,
    Usb,
    Bluetooth,
    BluetoothLE,
    Unknown,
}

impl TransportType {
    pub fn microphone_location(self) -> MicrophoneLocation {
        match self {
            Self::BuiltIn => MicrophoneLocation::MainBody,
            Self::Usb | Self::Bluetooth | Self::BluetoothLE => MicrophoneLocation::Peripheral,
            Self::Unknown => MicrophoneLocation::Unknown,
        }
    }

    fn from_enumerator_name(name: &str) -> Self {
        if name.contains("BTHLEENUM") {
            Self::BluetoothLE
        } else if name.contains("BTHENUM") {
            Self::Bluetooth
        } else if name.contains("USB") {
            Self::Usb
        } else {
            Self::BuiltIn
        }
    }
}

/// An active capture endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureDevice {
    pub id: String,
    pub name: String,
    pub is_default: bool,
    pub transport: TransportType,
}

/// Audio device enumerator using the Windows MMDevice API.
pub struct DeviceEnumerator {
    enumerator: IMMDeviceEnumerator,
}

impl DeviceEnumerator {
    /// Requires COM to be initialized on the calling thread.
    pub fn new() -> std::result::Result<Self, InitializeError> {
        unsafe {
            let enumerator: IMMDeviceEnumerator = CoCreateInstance(&MMDeviceEnumerator, None, CLSCTX_ALL)
                .map_err(|e| InitializeError::DeviceNotAvailable(format!("failed to create enumerator: {e}")))?;
            Ok(Self { enumerator })
        }
    }

    pub fn list_capture_devices(&self) -> std::result::Result<Vec<CaptureDevice>, InitializeError> {
        unsafe {
            let collection = self
                .enumerator
                .EnumAudioEndpoints(eCapture, DEVICE_STATE_ACTIVE)
                .map_err(|e| InitializeError::DeviceNotAvailable(format!("EnumAudioEndpoints failed: {e}")))?;
            let count = collection
                .GetCount()
                .map_err(|e| InitializeError::DeviceNotAvailable(format!("GetCount failed: {e}")))?;

            let default_id = self.default_capture_device_id().ok();

            let mut devices = Vec::new();
            for i in 0..count {
                let Ok(device) = collection.Item(i) else {
                    continue;
                };
                let Ok(id) = device.GetId() else {
                    continue;
                };
                let id = id.to_string().unwrap_or_default();
                let name = device_friendly_name(&device).unwrap_or_else(|| format!("Microphone {i}"));
                devices.push(CaptureDevice {
                    is_default: default_id.as_deref() == Some(id.as_str()),
                    transport: detect_transport_type(&device),
                    id,
                    name,
                });
            }
            Ok(devices)
        }
    }

    pub fn default_capture_device_id(&self) -> std::result::Result<String, InitializeError> {
        unsafe {
            let device = self
                .enumerator
                .GetDefaultAudioEndpoint(eCapture, eConsole)
                .map_err(|_| InitializeError::DeviceNotAvailable("no default microphone".into()))?;
            let id = device
                .GetId()
                .map_err(|e| InitializeError::DeviceNotAvailable(format!("GetId failed: {e}")))?;
            Ok(id.to_string().unwrap_or_default())
        }
    }

    /// Resolves `device_id`, or the default microphone when `None`.
    pub(crate) fn capture_endpoint(&self, device_id: Option<&str>) -> std::result::Result<IMMDevice, InitializeError> {
        unsafe {
            match device_id {
                Some(id) => {
                    let wide_id: Vec<u16> = id.encode_utf16().chain(std::iter::once(0)).collect();
                    self.enumerator
                        .GetDevice(PCWSTR(wide_id.as_ptr()))
                        .map_err(|e| InitializeError::DeviceNotAvailable(format!("device {id}: {e}")))
                }
                None => self
                    .enumerator
                    .GetDefaultAudioEndpoint(eCapture, eConsole)
                    .map_err(|_| InitializeError::DeviceNotAvailable("no default microphone".into())),
            }
        }
    }
}

pub(crate) fn detect_transport_type(device: &IMMDevice) -> TransportType {
    unsafe {
        let Ok(store) = device.OpenPropertyStore(STGM_READ) else {
            return TransportType::Unknown;
        };
        read_string_property(&store, &PKEY_Device_EnumeratorName)
            .map_or(TransportType::Unknown, |name| TransportType::from_enumerator_name(&name))
    }
}

fn device_friendly_name(device: &IMMDevice) -> Option<String> {
    unsafe {
        let store = device.OpenPropertyStore(STGM_READ).ok()?;
        read_string_property(&store, &PKEY_Device_FriendlyName)
    }
}

unsafe fn read_string_property(store: &IPropertyStore, key: &PROPERTYKEY) -> Option<String> {
    let mut prop = store.GetValue(key).ok()?;
    let value = if prop.Anonymous.Anonymous.vt == VT_LPWSTR {
        let pwsz = prop.Anonymous.Anonymous.Anonymous.pwszVal;
        (!pwsz.is_null()).then(|| {
            let len = (0..).take_while(|&i| *pwsz.offset(i) != 0).count();
            String::from_utf16_lossy(std::slice::from_raw_parts(pwsz, len))
        })
    } else {
        None
    };
    PropVariantClear(&mut prop).ok();
    value
}
