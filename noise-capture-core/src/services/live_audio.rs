use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use crate::models::audio_models::{AudioBuffer, LiveAudioDiagnostics, MicrophoneLocation};
use crate::models::config::RecordingConfiguration;
use crate::models::error::InitializeError;
use crate::models::indicators::{AcousticIndicatorsData, SpectrumData};
use crate::processing::buffer_queue::BufferQueue;
use crate::processing::indicators::AcousticIndicatorComputer;
use crate::processing::spectrum::{SpectrumAnalyzer, SPECTRUM_FFT_SIZE, SPECTRUM_HOP};
use crate::processing::level_decay::{BandLevelDecay, LevelDecay};
use crate::stream::{Broadcast, Subscription, Watch, WatchReceiver};
use crate::traits::audio_source::{AudioBufferCallback, AudioSource};

const WORKER_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Raw buffer drops are logged once, then every `DROP_LOG_EVERY`th time.
const DROP_LOG_EVERY: u64 = 100;

struct Worker {
    running: Arc<AtomicBool>,
    handle: thread::JoinHandle<()>,
}

#[derive(Clone)]
struct Outputs {
    indicators: Broadcast<AcousticIndicatorsData>,
    weighted_spl: Broadcast<f64>,
    band_spl: Broadcast<Vec<f64>>,
    spectrum: Broadcast<SpectrumData>,
    raw_audio: Broadcast<AudioBuffer>,
}

/// Live acoustic indicator pipeline.
///
/// Owns one [`AudioSource`] and turns its buffers into indicator frames:
///
/// ```text
/// audio thread                      "acoustic-indicators" thread
/// ────────────                      ────────────────────────────
/// AudioSource callback ──► BufferQueue ──► AcousticIndicatorComputer
///   (never blocks;          (bounded,        │
///    drops oldest raw        drop-oldest)    ├──► indicators()
///    buffer when full)                       ├──► weighted_spl()  (LAeq, display decay)
///                                            ├──► band_spl()      (per band, display decay)
///                         SpectrumAnalyzer ──┴──► spectrum()      (4096-point FFT, 2048 hop)
/// ```
///
/// Every computed frame is published to every current subscriber. All methods
/// take `&self`, so the service can be shared through an `Arc`.
pub struct LiveAudioService {
    config: RecordingConfiguration,
    source: Mutex<Box<dyn AudioSource>>,
    raw_queue: Arc<BufferQueue<AudioBuffer>>,
    outputs: Outputs,
    is_running: Watch<bool>,
    diagnostics: Arc<Mutex<LiveAudioDiagnostics>>,
    worker: Mutex<Option<Worker>>,
}

impl LiveAudioService {
    pub fn new(source: Box<dyn AudioSource>, config: RecordingConfiguration) -> Self {
        let capacity = config.subscriber_capacity;
        Self {
            raw_queue: Arc::new(BufferQueue::new(config.raw_queue_capacity)),
            outputs: Outputs {
                indicators: Broadcast::new(capacity),
                weighted_spl: Broadcast::new(capacity),
                band_spl: Broadcast::new(capacity),
                spectrum: Broadcast::new(capacity),
                raw_audio: Broadcast::new(capacity),
            },
            config,
            source: Mutex::new(source),
            is_running: Watch::new(false),
            diagnostics: Arc::new(Mutex::new(LiveAudioDiagnostics::default())),
            worker: Mutex::new(None),
        }
    }

    /// Sets up the audio source and starts computing indicators.
    ///
    /// Starting a running service does nothing.
    pub fn start(&self) -> Result<(), InitializeError> {
        let mut worker = self.worker.lock();
        if worker.is_some() {
            log::debug!("live audio already running");
            return Ok(());
        }

        let running = Arc::new(AtomicBool::new(true));
        let handle = {
            let running = Arc::clone(&running);
            let queue = Arc::clone(&self.raw_queue);
            let outputs = self.outputs.clone();
            let diagnostics = Arc::clone(&self.diagnostics);
            let config = self.config.clone();
            thread::Builder::new()
                .name("acoustic-indicators".into())
                .spawn(move || indicator_loop(running, queue, outputs, diagnostics, config))
                .map_err(|e| InitializeError::DeviceNotAvailable(format!("failed to spawn indicator thread: {e}")))?
        };

        let setup = self.source.lock().setup(
            self.config.sample_rate,
            self.config.buffer_size_bytes,
            self.source_callback(),
        );
        if let Err(e) = setup {
            running.store(false, Ordering::SeqCst);
            if handle.join().is_err() {
                log::error!("acoustic indicator thread panicked");
            }
            log::warn!("audio source setup failed: {e}");
            return Err(e);
        }

        *worker = Some(Worker { running, handle });
        self.is_running.set_if_changed(true);
        log::debug!(
            "live audio started at {} Hz, {} byte buffers",
            self.config.sample_rate,
            self.config.buffer_size_bytes
        );
        Ok(())
    }

    /// Releases the audio source and waits until every buffer already
    /// captured has been turned into frames and published.
    ///
    /// Safe to call when not started.
    pub fn stop(&self) {
        let mut worker = self.worker.lock();
        self.source.lock().release();

        let Some(Worker { running, handle }) = worker.take() else {
            return;
        };
        running.store(false, Ordering::SeqCst);
        if handle.join().is_err() {
            log::error!("acoustic indicator thread panicked");
        }
        self.is_running.set_if_changed(false);
        log::debug!("live audio stopped");
    }

    pub fn is_running(&self) -> bool {
        self.is_running.get()
    }

    pub fn running_state(&self) -> WatchReceiver<bool> {
        self.is_running.subscribe()
    }

    /// Stream of computed indicator frames.
    pub fn indicators(&self) -> Broadcast<AcousticIndicatorsData> {
        self.outputs.indicators.clone()
    }

    pub fn subscribe_indicators(&self) -> Subscription<AcousticIndicatorsData> {
        self.outputs.indicators.subscribe()
    }

    /// LAeq smoothed with the configured display decay, one value per frame.
    pub fn weighted_spl(&self) -> Broadcast<f64> {
        self.outputs.weighted_spl.clone()
    }

    /// Third-octave levels smoothed with the configured display decay.
    pub fn band_spl(&self) -> Broadcast<Vec<f64>> {
        self.outputs.band_spl.clone()
    }

    /// Power spectrum of overlapping 4096-sample blocks, one every 2048 samples.
    pub fn spectrum(&self) -> Broadcast<SpectrumData> {
        self.outputs.spectrum.clone()
    }

    /// Raw buffers, as consumed by the indicator worker.
    pub fn raw_audio(&self) -> Broadcast<AudioBuffer> {
        self.outputs.raw_audio.clone()
    }

    pub fn diagnostics(&self) -> LiveAudioDiagnostics {
        *self.diagnostics.lock()
    }

    pub fn microphone_location(&self) -> MicrophoneLocation {
        self.source.lock().microphone_location()
    }

    pub fn config(&self) -> &RecordingConfiguration {
        &self.config
    }

    fn source_callback(&self) -> AudioBufferCallback {
        let queue = Arc::clone(&self.raw_queue);
        let diagnostics = Arc::clone(&self.diagnostics);
        Arc::new(move |buffer: AudioBuffer| {
            let samples = buffer.len() as u64;
            let dropped = queue.push(buffer);
            let mut diagnostics = diagnostics.lock();
            diagnostics.callback_count += 1;
            diagnostics.samples_received += samples;
            if dropped {
                diagnostics.dropped_buffers += 1;
                if diagnostics.dropped_buffers % DROP_LOG_EVERY == 1 {
                    log::warn!(
                        "indicator worker is behind, dropped {} raw audio buffer(s) so far",
                        diagnostics.dropped_buffers
                    );
                }
            }
        })
    }
}

impl Drop for LiveAudioService {
    fn drop(&mut self) {
        self.stop();
    }
}

fn indicator_loop(
    running: Arc<AtomicBool>,
    queue: Arc<BufferQueue<AudioBuffer>>,
    outputs: Outputs,
    diagnostics: Arc<Mutex<LiveAudioDiagnostics>>,
    config: RecordingConfiguration,
) {
    let mut stage = IndicatorStage {
        computer: AcousticIndicatorComputer::from_config(&config, config.sample_rate),
        spl_decay: LevelDecay::new(config.spl_decay_rate_db_per_sec, config.integration_window_secs),
        band_decay: BandLevelDecay::new(config.spl_decay_rate_db_per_sec, config.integration_window_secs),
        spectrum: SpectrumAnalyzer::new(
            config.sample_rate,
            SPECTRUM_FFT_SIZE,
            SPECTRUM_HOP,
            config.total_gain_db(),
            config.windowing_mode,
        ),
        jitter_reported: 0,
    };

    while running.load(Ordering::SeqCst) {
        if let Some(buffer) = queue.pop_timeout(WORKER_POLL_INTERVAL) {
            stage.process(buffer, &outputs, &diagnostics);
        }
    }
    // The source is released before `running` is cleared, so this sees
    // everything it captured.
    for buffer in queue.drain() {
        stage.process(buffer, &outputs, &diagnostics);
    }
}

struct IndicatorStage {
    computer: AcousticIndicatorComputer,
    spl_decay: LevelDecay,
    band_decay: BandLevelDecay,
    spectrum: SpectrumAnalyzer,
    jitter_reported: u64,
}

impl IndicatorStage {
    fn process(&mut self, buffer: AudioBuffer, outputs: &Outputs, diagnostics: &Mutex<LiveAudioDiagnostics>) {
        outputs.raw_audio.publish(&buffer);
        let frames = self.computer.push(&buffer);

        {
            let mut diagnostics = diagnostics.lock();
            diagnostics.frames_computed += frames.len() as u64;
            diagnostics.jitter_events += self.computer.jitter_events() - self.jitter_reported;
        }
        self.jitter_reported = self.computer.jitter_events();

        for frame in frames {
            outputs.indicators.publish(&frame);
            outputs.weighted_spl.publish(&self.spl_decay.update(frame.laeq));
            outputs.band_spl.publish(&self.band_decay.update(&frame.third_octave));
        }
        for block in self.spectrum.push(&buffer) {
            outputs.spectrum.publish(&block);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::ManualAudioSource;

    fn service_with_manual_source() -> (LiveAudioService, crate::sources::ManualAudioHandle) {
        let source = ManualAudioSource::new();
        let handle = source.handle();
        (LiveAudioService::new(Box::new(source), RecordingConfiguration::default()), handle)
    }

    #[test]
    fn stop_without_start_is_harmless() {
        let (service, _) = service_with_manual_source();
        service.stop();
        service.stop();
        assert!(!service.is_running());
    }

    #[test]
    fn frames_are_published_before_stop_returns() {
        let (service, handle) = service_with_manual_source();
        let frames = service.subscribe_indicators();
        let levels = service.weighted_spl().subscribe();

        service.start().unwrap();
        assert!(service.is_running());
        // 48 full buffers, enough for eight 0.125 s windows.
        handle.push_samples(&vec![0.1; 48 * 1024]);
        service.stop();

        assert_eq!(frames.drain().len(), 8);
        assert_eq!(levels.drain().len(), 8);
        assert!(!service.is_running());
        let diagnostics = service.diagnostics();
        assert_eq!(diagnostics.frames_computed, 8);
        assert_eq!(diagnostics.samples_received, 48 * 1024);
        assert_eq!(diagnostics.dropped_buffers, 0);
    }

    #[test]
    fn start_is_idempotent_while_running() {
        let (service, _) = service_with_manual_source();
        service.start().unwrap();
        service.start().unwrap();
        service.stop();
    }

    #[test]
    fn setup_failure_leaves_service_stopped() {
        let source = ManualAudioSource::new().with_supported_sample_rates(vec![44100]);
        let service = LiveAudioService::new(Box::new(source), RecordingConfiguration::default());
        assert_eq!(service.start(), Err(InitializeError::SampleRateNotSupported(48000)));
        assert!(!service.is_running());
    }
}
