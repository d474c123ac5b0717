//! WASAPI microphone audio source.
//!
//! Captures from a WASAPI capture endpoint in shared mode on a dedicated
//! thread registered with MMCSS. The device mix format is downmixed to mono,
//! resampled to the requested rate and cut into fixed-size buffers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use chrono::Utc;
use windows::core::*;
use windows::Win32::Media::Audio::*;
use windows::Win32::System::Com::*;
use windows::Win32::System::Threading::*;

use noise_capture_core::models::audio_models::MicrophoneLocation;
use noise_capture_core::models::error::InitializeError;
use noise_capture_core::processing::buffer_chunker::BufferChunker;
use noise_capture_core::processing::sample_converter::SampleConverter;
use noise_capture_core::traits::audio_source::{samples_per_buffer, AudioBufferCallback, AudioSource};

use crate::device_enumerator::{detect_transport_type, CaptureDevice, DeviceEnumerator, TransportType};

/// Rates buffers can be delivered at, whatever the device mix format.
pub const SUPPORTED_SAMPLE_RATES: [u32; 2] = [44100, 48000];

/// 100 ms, in 100-nanosecond units.
const DEVICE_BUFFER_DURATION: i64 = 1_000_000;
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// WASAPI microphone capture.
pub struct WasapiAudioSource {
    device_id: Option<String>,
    transport: Arc<parking_lot::Mutex<Option<TransportType>>>,
    running: Arc<AtomicBool>,
    capture_handle: Option<thread::JoinHandle<()>>,
}

impl WasapiAudioSource {
    /// Captures from whichever microphone is the system default at setup time.
    pub fn default_device() -> Self {
        Self {
            device_id: None,
            transport: Arc::new(parking_lot::Mutex::new(None)),
            running: Arc::new(AtomicBool::new(false)),
            capture_handle: None,
        }
    }

    pub fn with_device(device: &CaptureDevice) -> Self {
        Self {
            device_id: Some(device.id.clone()),
            transport: Arc::new(parking_lot::Mutex::new(Some(device.transport))),
            running: Arc::new(AtomicBool::new(false)),
            capture_handle: None,
        }
    }
}

impl AudioSource for WasapiAudioSource {
    fn setup(
        &mut self,
        sample_rate: u32,
        buffer_size_bytes: usize,
        callback: AudioBufferCallback,
    ) -> std::result::Result<(), InitializeError> {
        if self.capture_handle.is_some() {
            return Err(InitializeError::AlreadyInitialized);
        }
        let chunk_len = samples_per_buffer(buffer_size_bytes)?;
        if !SUPPORTED_SAMPLE_RATES.contains(&sample_rate) {
            return Err(InitializeError::SampleRateNotSupported(sample_rate));
        }

        self.running.store(true, Ordering::SeqCst);
        let (init_tx, init_rx) = mpsc::channel();
        let capture = CaptureParams {
            device_id: self.device_id.clone(),
            sample_rate,
            chunk_len,
            callback,
            running: Arc::clone(&self.running),
            transport: Arc::clone(&self.transport),
        };

        let handle = thread::Builder::new()
            .name("wasapi-capture".into())
            .spawn(move || {
                let running = Arc::clone(&capture.running);
                if let Err(e) = capture_loop(capture, init_tx) {
                    log::error!("microphone capture error: {e}");
                }
                running.store(false, Ordering::SeqCst);
            })
            .map_err(|e| {
                self.running.store(false, Ordering::SeqCst);
                InitializeError::DeviceNotAvailable(format!("failed to spawn capture thread: {e}"))
            })?;

        let init = init_rx
            .recv()
            .unwrap_or_else(|_| Err(InitializeError::DeviceNotAvailable("capture thread exited".into())));
        if let Err(e) = init {
            self.running.store(false, Ordering::SeqCst);
            if handle.join().is_err() {
                log::error!("capture thread panicked");
            }
            return Err(e);
        }

        self.capture_handle = Some(handle);
        log::info!("microphone capture started at {sample_rate} Hz, {chunk_len} samples per buffer");
        Ok(())
    }

    fn release(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.capture_handle.take() {
            if handle.join().is_err() {
                log::error!("capture thread panicked");
            }
            log::info!("microphone capture stopped");
        }
    }

    fn microphone_location(&self) -> MicrophoneLocation {
        self.transport
            .lock()
            .map_or(MicrophoneLocation::Unknown, TransportType::microphone_location)
    }

    fn is_initialized(&self) -> bool {
        self.capture_handle.is_some()
    }
}

impl Drop for WasapiAudioSource {
    fn drop(&mut self) {
        self.release();
    }
}

struct CaptureParams {
    device_id: Option<String>,
    sample_rate: u32,
    chunk_len: usize,
    callback: AudioBufferCallback,
    running: Arc<AtomicBool>,
    transport: Arc<parking_lot::Mutex<Option<TransportType>>>,
}

/// Reported once through `init_tx`: everything up to `IAudioClient::Start`.
struct StartedClient {
    audio_client: IAudioClient,
    capture_client: IAudioCaptureClient,
    device_rate: u32,
    channels: usize,
}

/// Capture loop running on the dedicated thread.
///
/// Sequence:
/// 1. CoInitializeEx (MTA)
/// 2. Get capture device (default or by ID)
/// 3. Activate IAudioClient and initialize in shared mode
/// 4. Register with MMCSS for real-time priority
/// 5. Start, report the init result, poll for packets
fn capture_loop(
    params: CaptureParams,
    init_tx: mpsc::Sender<std::result::Result<(), InitializeError>>,
) -> std::result::Result<(), InitializeError> {
    let _com = match ComApartment::enter() {
        Ok(com) => com,
        Err(e) => {
            let _ = init_tx.send(Err(e.clone()));
            return Err(e);
        }
    };

    let started = match unsafe { start_client(&params) } {
        Ok(started) => started,
        Err(e) => {
            let _ = init_tx.send(Err(e.clone()));
            return Err(e);
        }
    };
    let _ = init_tx.send(Ok(()));

    let result = unsafe { poll_packets(&params, &started) };
    unsafe {
        let _ = started.audio_client.Stop();
    }
    result
}

unsafe fn start_client(params: &CaptureParams) -> std::result::Result<StartedClient, InitializeError> {
    let device = DeviceEnumerator::new()?.capture_endpoint(params.device_id.as_deref())?;
    params
        .transport
        .lock()
        .get_or_insert_with(|| detect_transport_type(&device));

    let audio_client: IAudioClient = device
        .Activate(CLSCTX_ALL, None)
        .map_err(|e| InitializeError::DeviceNotAvailable(format!("Activate failed: {e}")))?;

    let mix_format_ptr = audio_client
        .GetMixFormat()
        .map_err(|e| InitializeError::DeviceNotAvailable(format!("GetMixFormat failed: {e}")))?;
    let device_rate = (*mix_format_ptr).nSamplesPerSec;
    let channels = (*mix_format_ptr).nChannels as usize;

    let initialized = audio_client.Initialize(
        AUDCLNT_SHAREMODE_SHARED,
        AUDCLNT_STREAMFLAGS_NOPERSIST,
        DEVICE_BUFFER_DURATION,
        0,
        mix_format_ptr,
        None,
    );
    CoTaskMemFree(Some(mix_format_ptr as *const _));
    initialized.map_err(|e| InitializeError::DeviceNotAvailable(format!("IAudioClient::Initialize failed: {e}")))?;

    let capture_client: IAudioCaptureClient = audio_client
        .GetService()
        .map_err(|e| InitializeError::DeviceNotAvailable(format!("GetService failed: {e}")))?;

    let mut task_index: u32 = 0;
    if AvSetMmThreadCharacteristicsW(w!("Pro Audio"), &mut task_index).is_err() {
        log::warn!("MMCSS registration failed, capturing at normal priority");
    }

    audio_client
        .Start()
        .map_err(|e| InitializeError::DeviceNotAvailable(format!("IAudioClient::Start failed: {e}")))?;

    log::debug!("capture device mix format: {device_rate} Hz, {channels} channel(s)");
    Ok(StartedClient {
        audio_client,
        capture_client,
        device_rate,
        channels,
    })
}

unsafe fn poll_packets(params: &CaptureParams, client: &StartedClient) -> std::result::Result<(), InitializeError> {
    let mut converter = SampleConverter::new(params.sample_rate);
    let mut chunker = BufferChunker::new(params.chunk_len, params.sample_rate);
    let capture_error = |what: &str, e: Error| InitializeError::DeviceNotAvailable(format!("{what} failed: {e}"));

    while params.running.load(Ordering::SeqCst) {
        thread::sleep(POLL_INTERVAL);

        let mut packet_length = client
            .capture_client
            .GetNextPacketSize()
            .map_err(|e| capture_error("GetNextPacketSize", e))?;

        while packet_length > 0 {
            let mut buffer_ptr: *mut u8 = std::ptr::null_mut();
            let mut num_frames: u32 = 0;
            let mut flags: u32 = 0;
            client
                .capture_client
                .GetBuffer(&mut buffer_ptr, &mut num_frames, &mut flags, None, None)
                .map_err(|e| capture_error("GetBuffer", e))?;
            let captured_at = Utc::now();

            if num_frames > 0 && !buffer_ptr.is_null() {
                let total_samples = num_frames as usize * client.channels;
                // Shared mode delivers f32 interleaved frames.
                let interleaved = if flags & (AUDCLNT_BUFFERFLAGS_SILENT.0 as u32) != 0 {
                    vec![0.0f32; total_samples]
                } else {
                    std::slice::from_raw_parts(buffer_ptr as *const f32, total_samples).to_vec()
                };
                let mono = SampleConverter::downmix_to_mono(&interleaved, client.channels);
                let samples = converter.resample(&mono, client.device_rate);
                chunker.push(&samples, captured_at, |buffer| (params.callback)(buffer));
            }

            client
                .capture_client
                .ReleaseBuffer(num_frames)
                .map_err(|e| capture_error("ReleaseBuffer", e))?;
            packet_length = client
                .capture_client
                .GetNextPacketSize()
                .map_err(|e| capture_error("GetNextPacketSize", e))?;
        }
    }
    Ok(())
}

/// Multithreaded COM apartment for the current thread, left on drop.
struct ComApartment;

impl ComApartment {
    fn enter() -> std::result::Result<Self, InitializeError> {
        unsafe {
            CoInitializeEx(None, COINIT_MULTITHREADED)
                .ok()
                .map_err(|e| InitializeError::DeviceNotAvailable(format!("CoInitializeEx failed: {e}")))?;
        }
        Ok(Self)
    }
}

impl Drop for ComApartment {
    fn drop(&mut self) {
        unsafe {
            CoUninitialize();
        }
    }
}
