use std::sync::Arc;

use crate::models::config::RecordingConfiguration;
use crate::models::error::ConfigError;
use crate::services::live_audio::LiveAudioService;
use crate::services::permission::PermissionService;
use crate::session::recording::RecordingService;
use crate::traits::audio_source::AudioSource;
use crate::traits::location_provider::LocationProvider;
use crate::traits::measurement_storage::MeasurementStorage;
use crate::traits::permission_delegate::PermissionDelegate;

/// Services of one application instance, wired from platform variants chosen
/// at startup.
///
/// ```ignore
/// let context = AppContext::new(
///     RecordingConfiguration::default(),
///     Box::new(WasapiAudioSource::default_device()),
///     vec![Arc::new(WindowsMicrophonePermissionDelegate::new())],
///     Arc::new(PushLocationProvider::default()),
///     Arc::new(JsonFileStorage::open("measurements")?),
/// )?;
/// let mut recording = context.recording_service();
/// recording.start()?;
/// ```
#[derive(Clone)]
pub struct AppContext {
    pub config: RecordingConfiguration,
    pub permissions: Arc<PermissionService>,
    pub live_audio: Arc<LiveAudioService>,
    pub location: Arc<dyn LocationProvider>,
    pub storage: Arc<dyn MeasurementStorage>,
}

impl AppContext {
    /// Validates `config` and assembles the services around the given
    /// platform implementations.
    pub fn new(
        config: RecordingConfiguration,
        audio_source: Box<dyn AudioSource>,
        permission_delegates: Vec<Arc<dyn PermissionDelegate>>,
        location: Arc<dyn LocationProvider>,
        storage: Arc<dyn MeasurementStorage>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            permissions: Arc::new(PermissionService::new(permission_delegates)),
            live_audio: Arc::new(LiveAudioService::new(audio_source, config.clone())),
            config,
            location,
            storage,
        })
    }

    /// A recording session sharing this context's services.
    pub fn recording_service(&self) -> RecordingService {
        RecordingService::new(
            self.config.clone(),
            Arc::clone(&self.live_audio),
            Arc::clone(&self.location),
            Arc::clone(&self.permissions),
            Arc::clone(&self.storage),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::location::PushLocationProvider;
    use crate::sources::ManualAudioSource;
    use crate::storage::memory_store::InMemoryStorage;

    #[test]
    fn rejects_invalid_configuration() {
        let config = RecordingConfiguration {
            sample_rate: 0,
            ..Default::default()
        };
        let result = AppContext::new(
            config,
            Box::new(ManualAudioSource::new()),
            vec![],
            Arc::new(PushLocationProvider::default()),
            Arc::new(InMemoryStorage::new()),
        );
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }
}
