use thiserror::Error;

use super::permission::Permission;
use super::state::RecordingState;

/// Errors raised while setting up an audio source.
///
/// Not retryable without changing the requested configuration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InitializeError {
    #[error("buffer size of {0} bytes is not supported")]
    WrongBufferSize(usize),

    #[error("sample rate of {0} Hz is not supported")]
    SampleRateNotSupported(u32),

    #[error("audio source is already initialized")]
    AlreadyInitialized,

    #[error("device not available: {0}")]
    DeviceNotAvailable(String),
}

/// Errors raised by permission delegates.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PermissionError {
    #[error("cannot open the settings page for {0}")]
    CannotOpenSettings(Permission),
}

/// Errors raised by measurement storage backends.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("document not found: {0}")]
    NotFound(String),

    #[error("storage I/O error: {0}")]
    Io(String),

    #[error("serialization failed: {0}")]
    Serialization(String),
}

/// Errors returned by the recording session.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RecordingError {
    #[error("microphone permission denied")]
    PermissionDenied,

    #[error("cannot {operation} while {from}")]
    InvalidStateTransition {
        from: RecordingState,
        operation: &'static str,
    },

    #[error(transparent)]
    Initialize(#[from] InitializeError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("audio file error: {0}")]
    AudioFile(String),

    #[error("failed to spawn {0} thread")]
    ThreadSpawn(&'static str),
}

/// Configuration loading or validation failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("failed to load configuration: {0}")]
    Load(String),
}
