use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One fixed-length block of mono samples delivered by an audio source.
///
/// Samples are normalized to `[-1.0, 1.0]`. `captured_at` is the capture time
/// of the first sample. A buffer is consumed once by the indicator stage and
/// dropped afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub captured_at: DateTime<Utc>,
}

impl AudioBuffer {
    pub fn new(samples: Vec<f32>, sample_rate: u32, captured_at: DateTime<Utc>) -> Self {
        Self {
            samples,
            sample_rate,
            captured_at,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Audio time covered by this buffer.
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.samples.len() as f64 / self.sample_rate as f64)
    }

    /// Capture time of the sample at `index`.
    pub fn timestamp_of(&self, index: usize) -> DateTime<Utc> {
        self.captured_at + samples_to_duration(index as u64, self.sample_rate)
    }
}

/// Converts a sample count into a chrono duration at nanosecond precision.
pub fn samples_to_duration(samples: u64, sample_rate: u32) -> chrono::Duration {
    if sample_rate == 0 {
        return chrono::Duration::zero();
    }
    let nanos = samples as u128 * 1_000_000_000 / sample_rate as u128;
    chrono::Duration::nanoseconds(nanos.min(i64::MAX as u128) as i64)
}

/// Physical placement of the microphone backing an audio source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MicrophoneLocation {
    Unknown,
    /// Built into the device body.
    MainBody,
    /// Built in, but on a movable part (laptop lid, slider).
    MainBodyMovable,
    /// External: headset, USB or bluetooth microphone.
    Peripheral,
}

/// Counters for debugging live audio processing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LiveAudioDiagnostics {
    pub callback_count: u64,
    pub samples_received: u64,
    pub frames_computed: u64,
    /// Raw buffers discarded because the worker fell behind.
    pub dropped_buffers: u64,
    /// Buffers that arrived noticeably early or late.
    pub jitter_events: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_duration_follows_sample_rate() {
        let buffer = AudioBuffer::new(vec![0.0; 4800], 48000, Utc::now());
        assert_eq!(buffer.duration(), Duration::from_millis(100));
    }

    #[test]
    fn timestamp_of_offsets_from_capture_time() {
        let start = Utc::now();
        let buffer = AudioBuffer::new(vec![0.0; 1024], 1000, start);
        assert_eq!(buffer.timestamp_of(500), start + chrono::Duration::milliseconds(500));
    }

    #[test]
    fn zero_sample_rate_has_no_duration() {
        let buffer = AudioBuffer::new(vec![0.0; 10], 0, Utc::now());
        assert_eq!(buffer.duration(), Duration::ZERO);
        assert_eq!(samples_to_duration(10, 0), chrono::Duration::zero());
    }
}
