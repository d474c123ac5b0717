use std::sync::Arc;
use std::thread;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;

use noise_capture_core::{
    AppContext, InMemoryStorage, InitializeError, LocationProvider, LocationRecord, ManualAudioHandle,
    ManualAudioSource, ManualPermissionDelegate, Measurement, MeasurementStorage, Permission, PermissionDelegate,
    PermissionState, PushLocationProvider, RecordingConfiguration, RecordingDelegate, RecordingError,
    RecordingService, RecordingState, StorageError,
};

/// 48 buffers of 1024 samples: eight complete 0.125 s windows at 48 kHz.
const EIGHT_WINDOWS: usize = 48 * 1024;

struct Harness {
    audio: ManualAudioHandle,
    location: Arc<PushLocationProvider>,
    storage: Arc<InMemoryStorage>,
    microphone: Arc<ManualPermissionDelegate>,
    recording: RecordingService,
}

fn harness_with(config: RecordingConfiguration, source: ManualAudioSource, location_state: PermissionState) -> Harness {
    let audio = source.handle();
    let location = Arc::new(PushLocationProvider::default());
    let storage = Arc::new(InMemoryStorage::new());
    let microphone = Arc::new(ManualPermissionDelegate::granted(Permission::RecordAudio));
    let location_permission = Arc::new(ManualPermissionDelegate::new(Permission::LocationForeground, location_state));
    let delegates = vec![
        microphone.clone() as Arc<dyn PermissionDelegate>,
        location_permission as Arc<dyn PermissionDelegate>,
    ];
    let context = AppContext::new(
        config,
        Box::new(source),
        delegates,
        location.clone(),
        storage.clone(),
    )
    .unwrap();

    Harness {
        audio,
        location,
        storage,
        microphone,
        recording: context.recording_service(),
    }
}

fn harness() -> Harness {
    harness_with(
        RecordingConfiguration::default(),
        ManualAudioSource::new(),
        PermissionState::Granted,
    )
}

fn fix(seconds: i64) -> LocationRecord {
    LocationRecord::new(Utc::now() + chrono::Duration::seconds(seconds), 47.25, -1.55, 3.0)
}

fn assert_time_ordered(measurement: &Measurement) {
    assert!(measurement
        .leqs_sequence
        .windows(2)
        .all(|w| w[0].timestamp <= w[1].timestamp));
    assert!(measurement
        .location_sequence
        .windows(2)
        .all(|w| w[0].timestamp <= w[1].timestamp));
}

#[derive(Default)]
struct RecordingEvents {
    states: Mutex<Vec<RecordingState>>,
    errors: Mutex<Vec<RecordingError>>,
    saved: Mutex<Vec<String>>,
}

impl RecordingDelegate for RecordingEvents {
    fn on_state_changed(&self, state: RecordingState) {
        self.states.lock().push(state);
    }

    fn on_error(&self, error: &RecordingError) {
        self.errors.lock().push(error.clone());
    }

    fn on_measurement_saved(&self, measurement: &Measurement) {
        self.saved.lock().push(measurement.uuid.clone());
    }
}

#[test]
fn start_without_microphone_permission_is_denied() {
    let mut h = harness();
    h.microphone.set_state(PermissionState::Denied);

    assert_eq!(h.recording.start(), Err(RecordingError::PermissionDenied));
    assert_eq!(h.recording.state(), RecordingState::Idle);
    assert!(!h.recording.is_recording());
    assert!(!h.recording.live_audio().is_running());
    assert!(!h.location.is_updating());
    assert!(h.storage.is_empty());
}

#[test]
fn pause_while_idle_is_an_invalid_transition() {
    let mut h = harness();

    assert_eq!(
        h.recording.pause(),
        Err(RecordingError::InvalidStateTransition {
            from: RecordingState::Idle,
            operation: "pause",
        })
    );
    assert!(matches!(h.recording.resume(), Err(RecordingError::InvalidStateTransition { .. })));
    assert!(matches!(h.recording.stop(), Err(RecordingError::InvalidStateTransition { .. })));
    assert_eq!(h.recording.state(), RecordingState::Idle);
    assert!(h.storage.is_empty());
}

#[test]
fn full_session_produces_one_ordered_measurement() {
    let mut h = harness();
    let events = Arc::new(RecordingEvents::default());
    h.recording.set_delegate(events.clone());

    h.recording.start().unwrap();
    assert!(h.recording.is_recording());
    assert!(h.location.is_updating());
    assert!(matches!(h.recording.start(), Err(RecordingError::InvalidStateTransition { .. })));

    assert!(h.audio.push_samples(&vec![0.05; EIGHT_WINDOWS]));
    assert!(h.location.push_location(fix(0)));
    assert!(h.location.push_location(fix(1)));

    h.recording.pause().unwrap();
    assert_eq!(h.recording.state(), RecordingState::Paused);
    assert!(h.recording.is_recording());
    assert!(!h.audio.push_samples(&vec![0.05; EIGHT_WINDOWS]));
    // Location keeps flowing while paused by default.
    assert!(h.location.push_location(fix(2)));

    h.recording.resume().unwrap();
    assert!(h.audio.push_samples(&vec![0.05; EIGHT_WINDOWS]));

    let measurement = h.recording.stop().unwrap();
    assert_eq!(h.recording.state(), RecordingState::Idle);
    assert!(!h.recording.is_recording());
    assert!(!h.location.is_updating());

    assert_eq!(measurement.leqs_sequence.len(), 16);
    assert_eq!(measurement.location_sequence.len(), 3);
    assert_time_ordered(&measurement);
    assert_eq!(measurement.duration(), measurement.ended_at - measurement.started_at);
    assert_eq!(h.recording.recording_duration(), measurement.duration());
    assert_eq!(measurement.third_octave_frequencies.len(), 31);
    assert!(measurement
        .leqs_sequence
        .iter()
        .all(|r| r.leqs_per_third_octave_band.len() == 31));
    let metrics = measurement.laeq_metrics.unwrap();
    assert_eq!(metrics.records_count, 16);
    assert!(metrics.min <= metrics.average && metrics.average <= metrics.max);

    assert_eq!(h.storage.list().unwrap(), vec![measurement.uuid.clone()]);
    assert_eq!(h.storage.load(&measurement.uuid).unwrap(), measurement);
    assert_eq!(
        *events.states.lock(),
        vec![
            RecordingState::Recording,
            RecordingState::Paused,
            RecordingState::Recording,
            RecordingState::Idle,
        ]
    );
    assert_eq!(*events.saved.lock(), vec![measurement.uuid.clone()]);
}

#[test]
fn state_streams_follow_the_session() {
    let mut h = harness();
    let mut states = h.recording.state_stream();
    let mut recording = h.recording.is_recording_stream();
    assert_eq!(states.get(), RecordingState::Idle);

    h.recording.start().unwrap();
    assert_eq!(states.borrow_and_update(), RecordingState::Recording);
    assert!(recording.borrow_and_update());

    h.recording.pause().unwrap();
    assert_eq!(states.wait_for_change(Duration::from_secs(1)), Some(RecordingState::Paused));
    // Paused still counts as recording.
    assert!(!recording.has_changed());

    h.recording.stop().unwrap();
    assert_eq!(states.wait_for_change(Duration::from_secs(1)), Some(RecordingState::Idle));
    assert_eq!(recording.wait_for_change(Duration::from_secs(1)), Some(false));
}

#[test]
fn second_stop_is_rejected_without_new_measurement() {
    let mut h = harness();
    h.recording.start().unwrap();
    h.recording.stop().unwrap();

    assert!(matches!(
        h.recording.stop(),
        Err(RecordingError::InvalidStateTransition {
            from: RecordingState::Idle,
            ..
        })
    ));
    assert_eq!(h.storage.len(), 1);
}

#[test]
fn consecutive_sessions_produce_distinct_measurements() {
    let mut h = harness();
    h.recording.start().unwrap();
    h.audio.push_samples(&vec![0.05; EIGHT_WINDOWS]);
    let first = h.recording.stop().unwrap();

    h.recording.start().unwrap();
    let second = h.recording.stop().unwrap();

    assert_ne!(first.uuid, second.uuid);
    assert!(second.leqs_sequence.is_empty());
    assert_eq!(h.storage.len(), 2);
}

#[test]
fn pausing_can_halt_location_updates() {
    let config = RecordingConfiguration {
        keep_location_updates_while_paused: false,
        ..Default::default()
    };
    let mut h = harness_with(config, ManualAudioSource::new(), PermissionState::Granted);

    h.recording.start().unwrap();
    h.recording.pause().unwrap();
    assert!(!h.location.is_updating());
    assert!(!h.location.push_location(fix(0)));

    h.recording.resume().unwrap();
    assert!(h.location.is_updating());
    assert!(h.location.push_location(fix(1)));

    let measurement = h.recording.stop().unwrap();
    assert_eq!(measurement.location_sequence.len(), 1);
}

#[test]
fn records_without_location_when_not_permitted() {
    let mut h = harness_with(
        RecordingConfiguration::default(),
        ManualAudioSource::new(),
        PermissionState::Denied,
    );

    h.recording.start().unwrap();
    assert!(!h.location.is_updating());
    h.audio.push_samples(&vec![0.05; EIGHT_WINDOWS]);

    let measurement = h.recording.stop().unwrap();
    assert_eq!(measurement.leqs_sequence.len(), 8);
    assert!(measurement.location_sequence.is_empty());
}

#[test]
fn audio_setup_failure_leaves_session_idle() {
    let source = ManualAudioSource::new().with_supported_sample_rates(vec![44100]);
    let mut h = harness_with(RecordingConfiguration::default(), source, PermissionState::Granted);

    assert_eq!(
        h.recording.start(),
        Err(RecordingError::Initialize(InitializeError::SampleRateNotSupported(48000)))
    );
    assert_eq!(h.recording.state(), RecordingState::Idle);
    assert!(!h.location.is_updating());
    assert!(h.storage.is_empty());
}

#[test]
fn saves_recorded_audio_when_enabled() {
    let dir = tempfile::tempdir().unwrap();
    let config = RecordingConfiguration {
        save_audio: true,
        output_directory: dir.path().to_path_buf(),
        ..Default::default()
    };
    let mut h = harness_with(config, ManualAudioSource::new(), PermissionState::Granted);

    h.recording.start().unwrap();
    h.audio.push_samples(&vec![0.05; EIGHT_WINDOWS]);
    let measurement = h.recording.stop().unwrap();

    let url = measurement.recorded_audio_url.expect("audio file reference");
    let data = std::fs::read(&url).unwrap();
    assert_eq!(data.len(), 44 + EIGHT_WINDOWS * 2);
    assert_eq!(&data[0..4], b"RIFF");
    assert_eq!(measurement.recorded_audio_checksum.map(|c| c.len()), Some(64));
}

#[test]
fn duration_advances_while_recording() {
    let mut h = harness();
    let mut durations = h.recording.duration_stream();

    h.recording.start().unwrap();
    let advanced = durations.wait_until(|d| *d > chrono::Duration::zero(), Duration::from_secs(2));
    assert!(advanced.is_some());

    thread::sleep(Duration::from_millis(20));
    let measurement = h.recording.stop().unwrap();
    assert_eq!(h.recording.recording_duration(), measurement.duration());
}

struct FailingStorage;

impl MeasurementStorage for FailingStorage {
    fn save(&self, _: &Measurement) -> Result<(), StorageError> {
        Err(StorageError::Io("disk full".into()))
    }

    fn load(&self, uuid: &str) -> Result<Measurement, StorageError> {
        Err(StorageError::NotFound(uuid.into()))
    }

    fn list(&self) -> Result<Vec<String>, StorageError> {
        Ok(Vec::new())
    }

    fn delete(&self, uuid: &str) -> Result<(), StorageError> {
        Err(StorageError::NotFound(uuid.into()))
    }

    fn fetch_document_raw(&self, uuid: &str) -> Result<Vec<u8>, StorageError> {
        Err(StorageError::NotFound(uuid.into()))
    }
}

#[test]
fn storage_failure_is_reported_and_session_ends() {
    let context = AppContext::new(
        RecordingConfiguration::default(),
        Box::new(ManualAudioSource::new()),
        vec![Arc::new(ManualPermissionDelegate::granted(Permission::RecordAudio)) as Arc<dyn PermissionDelegate>],
        Arc::new(PushLocationProvider::default()),
        Arc::new(FailingStorage),
    )
    .unwrap();
    let mut recording = context.recording_service();
    let events = Arc::new(RecordingEvents::default());
    recording.set_delegate(events.clone());

    recording.start().unwrap();
    let expected = RecordingError::Storage(StorageError::Io("disk full".into()));
    assert_eq!(recording.stop(), Err(expected.clone()));
    assert_eq!(recording.state(), RecordingState::Idle);
    assert_eq!(*events.errors.lock(), vec![expected]);
    assert!(events.saved.lock().is_empty());
}

#[test]
fn dropping_an_active_session_saves_it() {
    let mut h = harness();
    h.recording.start().unwrap();
    let Harness { storage, recording, .. } = h;
    drop(recording);
    assert_eq!(storage.len(), 1);
}
