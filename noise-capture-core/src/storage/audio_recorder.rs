use std::path::Path;

use chrono::{DateTime, Utc};

use crate::models::audio_models::AudioBuffer;
use crate::models::error::RecordingError;
use crate::processing::sample_converter::SampleConverter;
use crate::processing::wav_format::WavSpec;
use crate::storage::wav_writer::{RecordedAudio, WavFileWriter};

/// Records the audio of a measurement into a 16-bit mono WAV file.
///
/// Writing stops silently once `max_secs` of audio were written. An I/O
/// failure stops writing and is reported by [`AudioFileRecorder::finish`].
pub struct AudioFileRecorder {
    writer: WavFileWriter,
    converter: SampleConverter,
    max_samples: u64,
    limit_reached: bool,
    failure: Option<String>,
}

impl AudioFileRecorder {
    /// Creates `recording_<timestamp>.wav` in `directory`.
    pub fn start(
        directory: &Path,
        sample_rate: u32,
        max_secs: u64,
        started_at: DateTime<Utc>,
    ) -> Result<Self, RecordingError> {
        let file_name = format!("recording_{}.wav", started_at.format("%Y-%m-%d_%H-%M-%S-%3f"));
        let writer = WavFileWriter::create(directory.join(file_name), WavSpec::mono_pcm16(sample_rate))
            .map_err(|e| RecordingError::AudioFile(e.to_string()))?;
        log::debug!("recording audio to {}", writer.file_path().display());
        Ok(Self {
            writer,
            converter: SampleConverter::new(sample_rate),
            max_samples: max_secs.saturating_mul(sample_rate as u64),
            limit_reached: false,
            failure: None,
        })
    }

    /// Appends a buffer, resampled to the file's rate if needed.
    pub fn write(&mut self, buffer: &AudioBuffer) {
        if self.failure.is_some() || self.limit_reached {
            return;
        }
        let samples = self.converter.resample(&buffer.samples, buffer.sample_rate);
        let remaining = self.max_samples.saturating_sub(self.writer.samples_written());
        let take = samples.len().min(remaining as usize);

        if let Err(e) = self.writer.write_samples(&samples[..take]) {
            log::error!("audio recording stopped: {e}");
            self.failure = Some(e.to_string());
            return;
        }
        if take < samples.len() || self.writer.samples_written() >= self.max_samples {
            self.limit_reached = true;
            log::info!("audio recording reached its maximum length, no longer writing");
        }
    }

    pub fn samples_written(&self) -> u64 {
        self.writer.samples_written()
    }

    /// Closes and deletes the file, for sessions that never started.
    pub fn discard(self) {
        let path = self.writer.file_path().to_path_buf();
        drop(self.writer);
        if let Err(e) = std::fs::remove_file(&path) {
            log::warn!("failed to remove unused audio file {}: {e}", path.display());
        }
    }

    pub fn finish(self) -> Result<RecordedAudio, RecordingError> {
        if let Some(failure) = self.failure {
            return Err(RecordingError::AudioFile(failure));
        }
        self.writer
            .finalize()
            .map_err(|e| RecordingError::AudioFile(e.to_string()))
    }
}
