use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::models::audio_models::{samples_to_duration, MicrophoneLocation};
use crate::models::error::InitializeError;
use crate::processing::buffer_chunker::BufferChunker;
use crate::traits::audio_source::{samples_per_buffer, AudioBufferCallback, AudioSource};

struct ActiveFeed {
    chunker: BufferChunker,
    callback: AudioBufferCallback,
    sample_rate: u32,
}

#[derive(Default)]
struct FeedState {
    active: Option<ActiveFeed>,
    /// Capture time of the next pushed sample. Survives release so that
    /// timestamps keep increasing across setups.
    next_time: Option<DateTime<Utc>>,
}

/// An [`AudioSource`] whose samples are pushed by the caller through a
/// [`ManualAudioHandle`].
///
/// Pushed blocks are regrouped into buffers of the configured size and
/// delivered synchronously on the pushing thread. Timestamps follow a
/// sample-accurate clock started at setup time.
pub struct ManualAudioSource {
    state: Arc<Mutex<FeedState>>,
    location: MicrophoneLocation,
    supported_sample_rates: Option<Vec<u32>>,
}

impl ManualAudioSource {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(FeedState::default())),
            location: MicrophoneLocation::Unknown,
            supported_sample_rates: None,
        }
    }

    /// Restricts `setup` to the given rates.
    pub fn with_supported_sample_rates(mut self, rates: Vec<u32>) -> Self {
        self.supported_sample_rates = Some(rates);
        self
    }

    pub fn with_microphone_location(mut self, location: MicrophoneLocation) -> Self {
        self.location = location;
        self
    }

    pub fn handle(&self) -> ManualAudioHandle {
        ManualAudioHandle {
            state: Arc::clone(&self.state),
        }
    }
}

impl Default for ManualAudioSource {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioSource for ManualAudioSource {
    fn setup(
        &mut self,
        sample_rate: u32,
        buffer_size_bytes: usize,
        callback: AudioBufferCallback,
    ) -> Result<(), InitializeError> {
        let mut state = self.state.lock();
        if state.active.is_some() {
            return Err(InitializeError::AlreadyInitialized);
        }
        let chunk_len = samples_per_buffer(buffer_size_bytes)?;
        let rate_supported = sample_rate > 0
            && self
                .supported_sample_rates
                .as_ref()
                .map_or(true, |rates| rates.contains(&sample_rate));
        if !rate_supported {
            return Err(InitializeError::SampleRateNotSupported(sample_rate));
        }

        let now = Utc::now();
        state.next_time = Some(state.next_time.map_or(now, |next| next.max(now)));
        state.active = Some(ActiveFeed {
            chunker: BufferChunker::new(chunk_len, sample_rate),
            callback,
            sample_rate,
        });
        log::debug!("manual audio source set up at {sample_rate} Hz, {chunk_len} samples per buffer");
        Ok(())
    }

    fn release(&mut self) {
        if self.state.lock().active.take().is_some() {
            log::debug!("manual audio source released");
        }
    }

    fn microphone_location(&self) -> MicrophoneLocation {
        self.location
    }

    fn is_initialized(&self) -> bool {
        self.state.lock().active.is_some()
    }
}

/// Feeding end of a [`ManualAudioSource`]. Cheap to clone and `Send`.
#[derive(Clone)]
pub struct ManualAudioHandle {
    state: Arc<Mutex<FeedState>>,
}

impl ManualAudioHandle {
    /// Pushes samples captured right after the previously pushed ones.
    ///
    /// Returns `false` and discards the samples if the source is not set up.
    pub fn push_samples(&self, samples: &[f32]) -> bool {
        let mut state = self.state.lock();
        let captured_at = state.next_time.unwrap_or_else(Utc::now);
        Self::deliver(&mut state, samples, captured_at)
    }

    /// Sample rate of the active setup.
    pub fn sample_rate(&self) -> Option<u32> {
        self.state.lock().active.as_ref().map(|feed| feed.sample_rate)
    }

    pub fn is_active(&self) -> bool {
        self.state.lock().active.is_some()
    }

    // The callback runs under the state lock, so `release` cannot return
    // while a delivery is in flight.
    fn deliver(state: &mut FeedState, samples: &[f32], captured_at: DateTime<Utc>) -> bool {
        let Some(feed) = state.active.as_mut() else {
            return false;
        };
        let callback = Arc::clone(&feed.callback);
        feed.chunker.push(samples, captured_at, |buffer| callback(buffer));
        state.next_time = Some(captured_at + samples_to_duration(samples.len() as u64, feed.sample_rate));
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::audio_models::AudioBuffer;

    fn collecting_callback() -> (AudioBufferCallback, Arc<Mutex<Vec<AudioBuffer>>>) {
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&received);
        let callback: AudioBufferCallback = Arc::new(move |buffer| sink.lock().push(buffer));
        (callback, received)
    }

    #[test]
    fn delivers_fixed_size_buffers() {
        let mut source = ManualAudioSource::new();
        let handle = source.handle();
        let (callback, received) = collecting_callback();
        source.setup(48000, 4096, callback).unwrap();

        assert!(handle.push_samples(&[0.25; 3000]));

        let received = received.lock();
        assert_eq!(received.len(), 2);
        assert!(received.iter().all(|b| b.len() == 1024 && b.sample_rate == 48000));
        assert_eq!(
            received[1].captured_at - received[0].captured_at,
            samples_to_duration(1024, 48000)
        );
    }

    #[test]
    fn setup_twice_is_rejected() {
        let mut source = ManualAudioSource::new();
        let (callback, _) = collecting_callback();
        source.setup(48000, 4096, Arc::clone(&callback)).unwrap();
        assert_eq!(source.setup(48000, 4096, callback), Err(InitializeError::AlreadyInitialized));
    }

    #[test]
    fn rejects_unsupported_configuration() {
        let mut source = ManualAudioSource::new().with_supported_sample_rates(vec![44100, 48000]);
        let (callback, _) = collecting_callback();
        assert_eq!(
            source.setup(16000, 4096, Arc::clone(&callback)),
            Err(InitializeError::SampleRateNotSupported(16000))
        );
        assert_eq!(source.setup(48000, 10, callback), Err(InitializeError::WrongBufferSize(10)));
        assert!(!source.is_initialized());
    }

    #[test]
    fn no_delivery_after_release() {
        let mut source = ManualAudioSource::new();
        let handle = source.handle();
        let (callback, received) = collecting_callback();
        source.setup(48000, 4096, callback).unwrap();

        source.release();
        source.release();

        assert!(!handle.push_samples(&[0.0; 2048]));
        assert!(received.lock().is_empty());
    }

    #[test]
    fn clock_keeps_increasing_across_setups() {
        let mut source = ManualAudioSource::new();
        let handle = source.handle();
        let (callback, received) = collecting_callback();

        source.setup(1000, 400, Arc::clone(&callback)).unwrap();
        handle.push_samples(&[0.0; 100_000]);
        source.release();
        source.setup(1000, 400, callback).unwrap();
        handle.push_samples(&[0.0; 100]);

        let received = received.lock();
        assert!(received.windows(2).all(|w| w[0].captured_at < w[1].captured_at));
    }
}
