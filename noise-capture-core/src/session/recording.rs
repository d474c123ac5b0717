use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::models::config::RecordingConfiguration;
use crate::models::error::RecordingError;
use crate::models::measurement::{now_millis, LeqsRecord, LocationRecord, Measurement, MutableMeasurement, UserAgent};
use crate::models::permission::{Permission, PermissionState};
use crate::models::state::RecordingState;
use crate::processing::indicators::AcousticIndicatorComputer;
use crate::services::live_audio::LiveAudioService;
use crate::services::permission::PermissionService;
use crate::storage::audio_recorder::AudioFileRecorder;
use crate::stream::{ObserverHandle, Watch, WatchReceiver};
use crate::traits::location_provider::LocationProvider;
use crate::traits::measurement_storage::MeasurementStorage;
use crate::traits::recording_delegate::RecordingDelegate;

const DURATION_TICK: Duration = Duration::from_millis(250);

/// Appends queued for the measurement writer, applied in arrival order.
enum MeasurementEvent {
    Leqs(LeqsRecord),
    Location(LocationRecord),
    Finish,
}

/// Resources held while a measurement is in progress.
struct ActiveSession {
    started_at: DateTime<Utc>,
    events: Sender<MeasurementEvent>,
    writer_handle: thread::JoinHandle<MutableMeasurement>,
    observers: Vec<ObserverHandle>,
    recorder: Arc<Mutex<Option<AudioFileRecorder>>>,
    location_active: bool,
    timer: Option<DurationTimer>,
}

/// Recording session orchestrator.
///
/// Reconciles the indicator stream of a [`LiveAudioService`] and the fixes of
/// a [`LocationProvider`] into one [`Measurement`]:
///
/// ```text
/// LiveAudioService ──indicators──┐
///                  ──raw audio───┼──────────────► AudioFileRecorder (optional)
/// LocationProvider ──fixes───────┤
///                                ▼
///                    mpsc ──► "measurement-writer" thread ──► MutableMeasurement
///                                                              │ stop()
///                                                              ▼
///                                               Measurement ──► MeasurementStorage
/// ```
///
/// Only the writer thread mutates the in-progress measurement, so the two
/// producers never contend for it. Transitions take `&mut self` and either
/// complete or leave the session untouched.
pub struct RecordingService {
    config: RecordingConfiguration,
    live_audio: Arc<LiveAudioService>,
    location: Arc<dyn LocationProvider>,
    permissions: Arc<PermissionService>,
    storage: Arc<dyn MeasurementStorage>,
    delegate: Option<Arc<dyn RecordingDelegate>>,
    state: Watch<RecordingState>,
    is_recording: Watch<bool>,
    duration: Watch<chrono::Duration>,
    session: Option<ActiveSession>,
}

impl RecordingService {
    pub fn new(
        config: RecordingConfiguration,
        live_audio: Arc<LiveAudioService>,
        location: Arc<dyn LocationProvider>,
        permissions: Arc<PermissionService>,
        storage: Arc<dyn MeasurementStorage>,
    ) -> Self {
        Self {
            config,
            live_audio,
            location,
            permissions,
            storage,
            delegate: None,
            state: Watch::new(RecordingState::Idle),
            is_recording: Watch::new(false),
            duration: Watch::new(chrono::Duration::zero()),
            session: None,
        }
    }

    pub fn set_delegate(&mut self, delegate: Arc<dyn RecordingDelegate>) {
        self.delegate = Some(delegate);
    }

    pub fn state(&self) -> RecordingState {
        self.state.get()
    }

    pub fn is_recording(&self) -> bool {
        self.is_recording.get()
    }

    /// Elapsed time since the measurement started, paused time included.
    /// Frozen at the measurement's duration once stopped.
    pub fn recording_duration(&self) -> chrono::Duration {
        self.duration.get()
    }

    pub fn state_stream(&self) -> WatchReceiver<RecordingState> {
        self.state.subscribe()
    }

    pub fn is_recording_stream(&self) -> WatchReceiver<bool> {
        self.is_recording.subscribe()
    }

    /// Updated every 250 ms while a measurement is in progress.
    pub fn duration_stream(&self) -> WatchReceiver<chrono::Duration> {
        self.duration.subscribe()
    }

    pub fn live_audio(&self) -> &Arc<LiveAudioService> {
        &self.live_audio
    }

    /// Starts a new measurement. Requires the microphone permission.
    pub fn start(&mut self) -> Result<(), RecordingError> {
        self.expect_state(RecordingState::Idle, "start")?;
        let microphone = self.permissions.check_permission(Permission::RecordAudio);
        if !microphone.is_granted() {
            log::warn!("cannot start recording, microphone permission is {microphone:?}");
            return Err(RecordingError::PermissionDenied);
        }

        let started_at = now_millis();
        let measurement = MutableMeasurement::new(started_at, AcousticIndicatorComputer::nominal_frequencies());
        let uuid = measurement.uuid.clone();

        let recorder = if self.config.save_audio {
            Some(AudioFileRecorder::start(
                &self.config.output_directory,
                self.config.sample_rate,
                self.config.max_saved_audio_secs,
                started_at,
            )?)
        } else {
            None
        };
        let recorder = Arc::new(Mutex::new(recorder));

        let (events, receiver) = mpsc::channel();
        let writer_handle = match thread::Builder::new()
            .name("measurement-writer".into())
            .spawn(move || write_measurement(measurement, receiver))
        {
            Ok(handle) => handle,
            Err(e) => {
                log::error!("failed to spawn measurement writer: {e}");
                discard_recorder(&recorder);
                return Err(RecordingError::ThreadSpawn("measurement-writer"));
            }
        };

        let mut session = ActiveSession {
            started_at,
            observers: self.attach_observers(&events, &recorder),
            events,
            writer_handle,
            recorder,
            location_active: false,
            timer: None,
        };

        if let Err(e) = self.live_audio.start() {
            log::warn!("recording not started, live audio failed: {e}");
            let ActiveSession {
                events,
                writer_handle,
                observers,
                recorder,
                ..
            } = session;
            drop(observers);
            let _ = finish_writer(&events, writer_handle);
            discard_recorder(&recorder);
            return Err(e.into());
        }

        session.location_active = self.start_location_if_allowed();
        self.duration.set(chrono::Duration::zero());
        session.timer = match DurationTimer::spawn(started_at, self.duration.clone()) {
            Ok(timer) => Some(timer),
            Err(e) => {
                log::error!("duration updates unavailable: {e}");
                None
            }
        };

        self.session = Some(session);
        log::info!("measurement {uuid} started");
        self.set_state(RecordingState::Recording);
        Ok(())
    }

    /// Halts audio capture, keeping the measurement open.
    pub fn pause(&mut self) -> Result<(), RecordingError> {
        self.expect_state(RecordingState::Recording, "pause")?;
        self.live_audio.stop();

        if !self.config.keep_location_updates_while_paused {
            if let Some(session) = self.session.as_mut() {
                if session.location_active {
                    self.location.stop_updating_location();
                    session.location_active = false;
                }
            }
        }
        self.set_state(RecordingState::Paused);
        Ok(())
    }

    /// Restarts audio capture into the same measurement.
    pub fn resume(&mut self) -> Result<(), RecordingError> {
        self.expect_state(RecordingState::Paused, "resume")?;
        self.live_audio.start()?;

        let needs_location = self.session.as_ref().is_some_and(|s| !s.location_active);
        if needs_location {
            let started = self.start_location_if_allowed();
            if let Some(session) = self.session.as_mut() {
                session.location_active = started;
            }
        }
        self.set_state(RecordingState::Recording);
        Ok(())
    }

    /// Ends the measurement and hands it to storage.
    ///
    /// The session always ends in [`RecordingState::Idle`]. A failed storage
    /// hand-off is reported to the delegate and returned, with the frozen
    /// measurement lost to storage only.
    pub fn stop(&mut self) -> Result<Measurement, RecordingError> {
        let from = self.state.get();
        if !from.is_active() {
            return Err(self.invalid_transition(from, "stop"));
        }
        let Some(session) = self.session.take() else {
            return Err(self.invalid_transition(from, "stop"));
        };
        let ActiveSession {
            started_at,
            events,
            writer_handle,
            observers,
            recorder,
            location_active,
            timer,
        } = session;

        // Everything captured so far reaches the writer before it is told to finish.
        self.live_audio.stop();
        if location_active {
            self.location.stop_updating_location();
        }
        drop(observers);
        if let Some(timer) = timer {
            timer.stop();
        }
        let mut measurement = finish_writer(&events, writer_handle).unwrap_or_else(|| {
            MutableMeasurement::new(started_at, AcousticIndicatorComputer::nominal_frequencies())
        });

        let recorder = recorder.lock().take();
        if let Some(recorder) = recorder {
            match recorder.finish() {
                Ok(audio) => {
                    measurement.recorded_audio_url = Some(audio.path.to_string_lossy().into_owned());
                    measurement.recorded_audio_checksum = Some(audio.checksum);
                }
                Err(e) => {
                    log::error!("failed to finalize recorded audio: {e}");
                    self.notify_error(&e);
                }
            }
        }

        let measurement = measurement.freeze(now_millis(), UserAgent::current());
        self.duration.set(measurement.duration());
        self.set_state(RecordingState::Idle);

        match self.storage.save(&measurement) {
            Ok(()) => {
                log::info!(
                    "measurement {} saved: {} leqs records, {} locations, {} ms",
                    measurement.uuid,
                    measurement.leqs_sequence.len(),
                    measurement.location_sequence.len(),
                    measurement.duration_ms
                );
                if let Some(delegate) = &self.delegate {
                    delegate.on_measurement_saved(&measurement);
                }
                Ok(measurement)
            }
            Err(e) => {
                log::error!("failed to save measurement {}: {e}", measurement.uuid);
                let error = RecordingError::from(e);
                self.notify_error(&error);
                Err(error)
            }
        }
    }

    // --- Internal helpers ---

    fn expect_state(&self, expected: RecordingState, operation: &'static str) -> Result<(), RecordingError> {
        let current = self.state.get();
        if current == expected {
            Ok(())
        } else {
            Err(self.invalid_transition(current, operation))
        }
    }

    fn invalid_transition(&self, from: RecordingState, operation: &'static str) -> RecordingError {
        log::warn!("ignoring {operation} while {from}");
        RecordingError::InvalidStateTransition { from, operation }
    }

    fn set_state(&self, state: RecordingState) {
        self.state.set_if_changed(state);
        self.is_recording.set_if_changed(state.is_active());
        if let Some(delegate) = &self.delegate {
            delegate.on_state_changed(state);
        }
    }

    fn notify_error(&self, error: &RecordingError) {
        if let Some(delegate) = &self.delegate {
            delegate.on_error(error);
        }
    }

    fn attach_observers(
        &self,
        events: &Sender<MeasurementEvent>,
        recorder: &Arc<Mutex<Option<AudioFileRecorder>>>,
    ) -> Vec<ObserverHandle> {
        let mut observers = Vec::with_capacity(3);

        let leqs = events.clone();
        observers.push(self.live_audio.indicators().observe(move |frame| {
            let _ = leqs.send(MeasurementEvent::Leqs(LeqsRecord::from(frame)));
        }));

        let locations = events.clone();
        observers.push(self.location.live_location().observe(move |fix| {
            let _ = locations.send(MeasurementEvent::Location(fix.clone()));
        }));

        if recorder.lock().is_some() {
            let recorder = Arc::clone(recorder);
            observers.push(self.live_audio.raw_audio().observe(move |buffer| {
                if let Some(recorder) = recorder.lock().as_mut() {
                    recorder.write(buffer);
                }
            }));
        }
        observers
    }

    /// Starts location updates if foreground location is granted, or not a
    /// permission on this platform. Returns whether updates were started.
    fn start_location_if_allowed(&self) -> bool {
        match self.permissions.check_permission(Permission::LocationForeground) {
            PermissionState::Granted | PermissionState::NotImplemented => {
                self.location.start_updating_location();
                true
            }
            other => {
                log::warn!("recording without location, foreground location permission is {other:?}");
                false
            }
        }
    }
}

impl Drop for RecordingService {
    fn drop(&mut self) {
        if self.session.is_some() {
            if let Err(e) = self.stop() {
                log::error!("measurement lost while dropping recording service: {e}");
            }
        }
    }
}

fn write_measurement(mut measurement: MutableMeasurement, events: Receiver<MeasurementEvent>) -> MutableMeasurement {
    for event in events {
        match event {
            MeasurementEvent::Leqs(record) => measurement.push_leqs(record),
            MeasurementEvent::Location(record) => measurement.push_location(record),
            MeasurementEvent::Finish => break,
        }
    }
    measurement
}

/// Tells the writer to finish and collects the measurement.
fn finish_writer(
    events: &Sender<MeasurementEvent>,
    writer_handle: thread::JoinHandle<MutableMeasurement>,
) -> Option<MutableMeasurement> {
    let _ = events.send(MeasurementEvent::Finish);
    match writer_handle.join() {
        Ok(measurement) => Some(measurement),
        Err(_) => {
            log::error!("measurement writer thread panicked");
            None
        }
    }
}

fn discard_recorder(recorder: &Mutex<Option<AudioFileRecorder>>) {
    if let Some(recorder) = recorder.lock().take() {
        recorder.discard();
    }
}

/// Publishes the elapsed recording time every [`DURATION_TICK`].
struct DurationTimer {
    running: Arc<AtomicBool>,
    timer_handle: thread::JoinHandle<()>,
}

impl DurationTimer {
    fn spawn(started_at: DateTime<Utc>, duration: Watch<chrono::Duration>) -> std::io::Result<Self> {
        let running = Arc::new(AtomicBool::new(true));
        let timer_handle = {
            let running = Arc::clone(&running);
            thread::Builder::new().name("recording-timer".into()).spawn(move || {
                while running.load(Ordering::SeqCst) {
                    duration.set_if_changed(now_millis() - started_at);
                    thread::park_timeout(DURATION_TICK);
                }
            })?
        };
        Ok(Self { running, timer_handle })
    }

    fn stop(self) {
        self.running.store(false, Ordering::SeqCst);
        self.timer_handle.thread().unpark();
        if self.timer_handle.join().is_err() {
            log::error!("recording timer thread panicked");
        }
    }
}
