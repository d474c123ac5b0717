//! # noise-capture-core
//!
//! Platform-agnostic core of a noise measurement application.
//!
//! Turns microphone samples into calibrated acoustic indicators (Leq, LAeq,
//! LCeq, third-octave band levels) and records them, together with location
//! fixes, into persisted measurements. Platform backends implement the
//! [`AudioSource`], [`PermissionDelegate`] and [`LocationProvider`] traits and
//! are injected through an [`AppContext`].
//!
//! ## Architecture
//!
//! ```text
//! noise-capture-core (this crate)
//! ├── traits/       ← AudioSource, PermissionDelegate, LocationProvider, MeasurementStorage, RecordingDelegate
//! ├── models/       ← errors, RecordingState, Permission, AudioBuffer, indicators, Measurement, configuration
//! ├── processing/   ← AcousticIndicatorComputer, filter bank, spectrum, weightings, display decay, BufferQueue, WAV header
//! ├── stream/       ← Broadcast (fan-out) and Watch (observable state)
//! ├── sources/      ← ManualAudioSource, SignalGeneratorSource
//! ├── services/     ← LiveAudioService, PermissionService, PushLocationProvider
//! ├── session/      ← RecordingService (measurement state machine)
//! ├── storage/      ← JsonFileStorage, InMemoryStorage, WAV audio recorder
//! └── context       ← AppContext
//! ```

pub mod context;
pub mod models;
pub mod processing;
pub mod services;
pub mod session;
pub mod sources;
pub mod storage;
pub mod stream;
pub mod traits;

// Re-export key types at crate root for convenience.
pub use context::AppContext;
pub use models::audio_models::{AudioBuffer, LiveAudioDiagnostics, MicrophoneLocation};
pub use models::config::{RecordingConfiguration, WindowingMode};
pub use models::error::{ConfigError, InitializeError, PermissionError, RecordingError, StorageError};
pub use models::indicators::{AcousticIndicatorsData, SpectrumData};
pub use models::measurement::{LaeqMetrics, LeqsRecord, LocationRecord, Measurement, MutableMeasurement, UserAgent};
pub use models::permission::{Permission, PermissionState};
pub use models::state::RecordingState;
pub use processing::indicators::AcousticIndicatorComputer;
pub use processing::spectrum::SpectrumAnalyzer;
pub use services::{LiveAudioService, ManualPermissionDelegate, PermissionService, PermissionWatcher, PushLocationProvider};
pub use session::RecordingService;
pub use sources::{ManualAudioHandle, ManualAudioSource, Signal, SignalGeneratorSource};
pub use storage::{InMemoryStorage, JsonFileStorage};
pub use stream::{Broadcast, Watch, WatchReceiver};
pub use traits::audio_source::{AudioBufferCallback, AudioSource};
pub use traits::location_provider::LocationProvider;
pub use traits::measurement_storage::MeasurementStorage;
pub use traits::permission_delegate::PermissionDelegate;
pub use traits::recording_delegate::RecordingDelegate;
