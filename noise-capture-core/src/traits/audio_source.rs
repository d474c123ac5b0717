use std::sync::Arc;

use crate::models::audio_models::{AudioBuffer, MicrophoneLocation};
use crate::models::error::InitializeError;

/// Callback invoked with every captured buffer.
///
/// Runs on the source's producer thread, one call at a time. It must return
/// before the next buffer is due.
pub type AudioBufferCallback = Arc<dyn Fn(AudioBuffer) + Send + Sync + 'static>;

/// Platform microphone capture.
///
/// Implemented by:
/// - `WasapiAudioSource` (Windows, in `noise-capture-windows`)
/// - [`crate::sources::ManualAudioSource`] (fed by the caller)
/// - [`crate::sources::SignalGeneratorSource`] (synthetic signals)
pub trait AudioSource: Send {
    /// Starts delivering buffers of exactly `buffer_size_bytes / 4` mono
    /// samples at `sample_rate` Hz to `callback`.
    ///
    /// Fails with [`InitializeError::AlreadyInitialized`] if called twice
    /// without an intervening [`AudioSource::release`].
    fn setup(
        &mut self,
        sample_rate: u32,
        buffer_size_bytes: usize,
        callback: AudioBufferCallback,
    ) -> Result<(), InitializeError>;

    /// Stops delivery. Idempotent. Once this returns, `callback` is never
    /// invoked again.
    fn release(&mut self);

    fn microphone_location(&self) -> MicrophoneLocation;

    fn is_initialized(&self) -> bool;
}

/// Number of f32 samples held by a buffer of `buffer_size_bytes` bytes.
pub fn samples_per_buffer(buffer_size_bytes: usize) -> Result<usize, InitializeError> {
    if buffer_size_bytes == 0 || buffer_size_bytes % std::mem::size_of::<f32>() != 0 {
        return Err(InitializeError::WrongBufferSize(buffer_size_bytes));
    }
    Ok(buffer_size_bytes / std::mem::size_of::<f32>())
}
