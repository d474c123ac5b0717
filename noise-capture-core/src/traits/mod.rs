pub mod audio_source;
pub mod location_provider;
pub mod measurement_storage;
pub mod permission_delegate;
pub mod recording_delegate;
