use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::error::ConfigError;

/// Configuration for live audio analysis and recording sessions.
///
/// Every field has a default, so a partial JSON document is accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RecordingConfiguration {
    /// Requested audio source sample rate in Hz (default: 48000).
    pub sample_rate: u32,

    /// Size of each delivered audio buffer in bytes of f32 samples (default: 4096).
    pub buffer_size_bytes: usize,

    /// Length of one acoustic indicator integration window in seconds (default: 0.125).
    pub integration_window_secs: f64,

    /// Window applied before every FFT (default: Hann).
    pub windowing_mode: WindowingMode,

    /// Calibration gain added to every level, in dB (default: 112.35).
    pub db_gain: f64,

    /// User gain correction added on top of `db_gain`, in dB (default: 0).
    pub gain_correction_db: f64,

    /// Raw buffers held between the audio callback and the analysis worker (default: 64).
    pub raw_queue_capacity: usize,

    /// Values buffered per stream subscriber before the oldest is dropped (default: 1024).
    pub subscriber_capacity: usize,

    /// Decay rate of the weighted sound pressure level display in dB/s (default: -34.7, "fast").
    pub spl_decay_rate_db_per_sec: f64,

    /// Keep location updates flowing while a recording is paused (default: true).
    pub keep_location_updates_while_paused: bool,

    /// Save the raw audio of each recording as a WAV file (default: false).
    pub save_audio: bool,

    /// Maximum length of the saved audio file in seconds (default: 600).
    pub max_saved_audio_secs: u64,

    /// Directory where audio files and measurement documents are written.
    pub output_directory: PathBuf,
}

/// Tapering applied to a block of samples before its FFT.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WindowingMode {
    #[default]
    Hann,
    Rectangular,
}

/// Fast time weighting decay, in dB per second.
pub const FAST_DECAY_RATE: f64 = -34.7;

/// Slow time weighting decay, in dB per second.
pub const SLOW_DECAY_RATE: f64 = -4.3;

impl RecordingConfiguration {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sample_rate == 0 {
            return Err(ConfigError::Invalid("sample rate must be positive".into()));
        }
        if self.buffer_size_bytes == 0 || self.buffer_size_bytes % 4 != 0 {
            return Err(ConfigError::Invalid(format!(
                "buffer size must be a positive multiple of 4 bytes, got {}",
                self.buffer_size_bytes
            )));
        }
        if !(self.integration_window_secs.is_finite() && self.integration_window_secs > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "integration window must be positive, got {}",
                self.integration_window_secs
            )));
        }
        if !self.db_gain.is_finite() || !self.gain_correction_db.is_finite() {
            return Err(ConfigError::Invalid("gains must be finite".into()));
        }
        if self.raw_queue_capacity == 0 || self.subscriber_capacity == 0 {
            return Err(ConfigError::Invalid("queue capacities must be positive".into()));
        }
        if !(self.spl_decay_rate_db_per_sec.is_finite() && self.spl_decay_rate_db_per_sec < 0.0) {
            return Err(ConfigError::Invalid(format!(
                "decay rate must be negative, got {}",
                self.spl_decay_rate_db_per_sec
            )));
        }
        Ok(())
    }

    /// Total gain applied to computed levels.
    pub fn total_gain_db(&self) -> f64 {
        self.db_gain + self.gain_correction_db
    }

    /// Reads and validates a JSON configuration file.
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Load(format!("{}: {e}", path.display())))?;
        Self::from_json_str(&text)
    }

    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(text).map_err(|e| ConfigError::Load(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }
}

impl Default for RecordingConfiguration {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            buffer_size_bytes: 4096,
            integration_window_secs: 0.125,
            windowing_mode: WindowingMode::Hann,
            db_gain: 112.35,
            gain_correction_db: 0.0,
            raw_queue_capacity: 64,
            subscriber_capacity: 1024,
            spl_decay_rate_db_per_sec: FAST_DECAY_RATE,
            keep_location_updates_while_paused: true,
            save_audio: false,
            max_saved_audio_secs: 600,
            output_directory: PathBuf::from("."),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        assert!(RecordingConfiguration::default().validate().is_ok());
    }

    #[test]
    fn partial_json_uses_defaults() {
        let config =
            RecordingConfiguration::from_json_str(r#"{ "sampleRate": 44100, "saveAudio": true }"#)
                .unwrap();
        assert_eq!(config.sample_rate, 44100);
        assert!(config.save_audio);
        assert_eq!(config.buffer_size_bytes, 4096);
        assert_eq!(config.db_gain, 112.35);
    }

    #[test]
    fn windowing_mode_uses_upper_case_names() {
        let config = RecordingConfiguration::from_json_str(r#"{ "windowingMode": "RECTANGULAR" }"#).unwrap();
        assert_eq!(config.windowing_mode, WindowingMode::Rectangular);
        assert_eq!(RecordingConfiguration::default().windowing_mode, WindowingMode::Hann);

        let json = serde_json::to_string(&RecordingConfiguration::default()).unwrap();
        assert!(json.contains(r#""windowingMode":"HANN""#), "{json}");
        assert!(RecordingConfiguration::from_json_str(r#"{ "windowingMode": "BLACKMAN" }"#).is_err());
    }

    #[test]
    fn loads_from_a_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "integrationWindowSecs": 1.0, "gainCorrectionDb": -2.5 }"#).unwrap();

        let config = RecordingConfiguration::from_json_file(&path).unwrap();
        assert_eq!(config.integration_window_secs, 1.0);
        assert_eq!(config.total_gain_db(), 112.35 - 2.5);

        let missing = RecordingConfiguration::from_json_file(&dir.path().join("missing.json"));
        assert!(matches!(missing, Err(ConfigError::Load(_))));
    }

    #[test]
    fn rejects_unaligned_buffer_size() {
        let config = RecordingConfiguration {
            buffer_size_bytes: 4095,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn rejects_non_negative_decay() {
        let config = RecordingConfiguration {
            spl_decay_rate_db_per_sec: 0.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn malformed_json_is_a_load_error() {
        let err = RecordingConfiguration::from_json_str("{ nope").unwrap_err();
        assert!(matches!(err, ConfigError::Load(_)));
    }
}
