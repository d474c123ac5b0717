use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use chrono::Utc;

use crate::models::audio_models::{samples_to_duration, AudioBuffer, MicrophoneLocation};
use crate::models::error::InitializeError;
use crate::traits::audio_source::{samples_per_buffer, AudioBufferCallback, AudioSource};

/// Waveform produced by a [`SignalGeneratorSource`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Signal {
    Silence,
    Sine { frequency: f64, amplitude: f32 },
}

impl Signal {
    fn sample(&self, index: u64, sample_rate: u32) -> f32 {
        match *self {
            Signal::Silence => 0.0,
            Signal::Sine { frequency, amplitude } => {
                let phase = 2.0 * std::f64::consts::PI * frequency * index as f64 / sample_rate as f64;
                amplitude * phase.sin() as f32
            }
        }
    }
}

/// Synthetic [`AudioSource`] producing a signal on its own thread.
///
/// Buffers are paced in real time, as a microphone would deliver them.
pub struct SignalGeneratorSource {
    signal: Signal,
    running: Arc<AtomicBool>,
    generator_handle: Option<thread::JoinHandle<()>>,
}

impl SignalGeneratorSource {
    pub fn new(signal: Signal) -> Self {
        Self {
            signal,
            running: Arc::new(AtomicBool::new(false)),
            generator_handle: None,
        }
    }
}

impl AudioSource for SignalGeneratorSource {
    fn setup(
        &mut self,
        sample_rate: u32,
        buffer_size_bytes: usize,
        callback: AudioBufferCallback,
    ) -> Result<(), InitializeError> {
        if self.generator_handle.is_some() {
            return Err(InitializeError::AlreadyInitialized);
        }
        let chunk_len = samples_per_buffer(buffer_size_bytes)?;
        if sample_rate == 0 {
            return Err(InitializeError::SampleRateNotSupported(sample_rate));
        }

        self.running.store(true, Ordering::SeqCst);
        let running = Arc::clone(&self.running);
        let signal = self.signal;

        let handle = thread::Builder::new()
            .name("signal-generator".into())
            .spawn(move || generate(running, signal, sample_rate, chunk_len, callback))
            .map_err(|e| {
                self.running.store(false, Ordering::SeqCst);
                InitializeError::DeviceNotAvailable(format!("failed to spawn generator thread: {e}"))
            })?;
        self.generator_handle = Some(handle);
        log::debug!("signal generator started: {signal:?} at {sample_rate} Hz");
        Ok(())
    }

    fn release(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.generator_handle.take() {
            if handle.join().is_err() {
                log::error!("signal generator thread panicked");
            }
        }
    }

    fn microphone_location(&self) -> MicrophoneLocation {
        MicrophoneLocation::Unknown
    }

    fn is_initialized(&self) -> bool {
        self.generator_handle.is_some()
    }
}

impl Drop for SignalGeneratorSource {
    fn drop(&mut self) {
        self.release();
    }
}

fn generate(running: Arc<AtomicBool>, signal: Signal, sample_rate: u32, chunk_len: usize, callback: AudioBufferCallback) {
    let started = Instant::now();
    let started_at = Utc::now();
    let mut produced: u64 = 0;

    while running.load(Ordering::SeqCst) {
        let samples = (produced..produced + chunk_len as u64)
            .map(|index| signal.sample(index, sample_rate))
            .collect();
        let captured_at = started_at + samples_to_duration(produced, sample_rate);
        produced += chunk_len as u64;

        // Hold each buffer until its last sample would have been captured.
        let due = started + Duration::from_secs_f64(produced as f64 / sample_rate as f64);
        while running.load(Ordering::SeqCst) {
            let now = Instant::now();
            if now >= due {
                break;
            }
            thread::sleep((due - now).min(Duration::from_millis(5)));
        }
        if !running.load(Ordering::SeqCst) {
            break;
        }
        callback(AudioBuffer::new(samples, sample_rate, captured_at));
    }
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;

    use super::*;

    #[test]
    fn produces_paced_buffers_until_released() {
        let mut source = SignalGeneratorSource::new(Signal::Sine {
            frequency: 440.0,
            amplitude: 0.5,
        });
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&received);
        source
            .setup(8000, 400, Arc::new(move |buffer: AudioBuffer| sink.lock().push(buffer)))
            .unwrap();
        assert!(source.is_initialized());

        thread::sleep(Duration::from_millis(100));
        source.release();
        let count = received.lock().len();
        thread::sleep(Duration::from_millis(30));

        assert!(count > 0);
        assert_eq!(received.lock().len(), count);
        assert!(received.lock().iter().all(|b| b.len() == 100));
        assert!(!source.is_initialized());
    }

    #[test]
    fn setup_twice_is_rejected() {
        let mut source = SignalGeneratorSource::new(Signal::Silence);
        let callback: AudioBufferCallback = Arc::new(|_| {});
        source.setup(8000, 400, Arc::clone(&callback)).unwrap();
        assert_eq!(source.setup(8000, 400, callback), Err(InitializeError::AlreadyInitialized));
    }
}
