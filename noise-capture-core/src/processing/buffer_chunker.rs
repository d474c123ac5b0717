use chrono::{DateTime, Utc};

use crate::models::audio_models::{samples_to_duration, AudioBuffer};

/// Regroups arbitrarily sized sample blocks into fixed-length [`AudioBuffer`]s.
///
/// Platform APIs hand out whatever block size suits the device; callers of
/// [`crate::traits::audio_source::AudioSource`] are promised exactly
/// `buffer_size_bytes / 4` samples per callback. Leftover samples are kept
/// until the next push.
#[derive(Debug)]
pub struct BufferChunker {
    chunk_len: usize,
    sample_rate: u32,
    pending: Vec<f32>,
    /// Capture time of `pending[0]`.
    pending_start: Option<DateTime<Utc>>,
}

impl BufferChunker {
    pub fn new(chunk_len: usize, sample_rate: u32) -> Self {
        let chunk_len = chunk_len.max(1);
        Self {
            chunk_len,
            sample_rate,
            pending: Vec::with_capacity(chunk_len),
            pending_start: None,
        }
    }

    /// Appends `samples`, captured starting at `captured_at`, and calls `emit`
    /// once per completed chunk.
    ///
    /// While samples are pending, chunk timestamps follow the sample clock
    /// rather than `captured_at`.
    pub fn push(&mut self, samples: &[f32], captured_at: DateTime<Utc>, mut emit: impl FnMut(AudioBuffer)) {
        let mut input = samples;
        while !input.is_empty() {
            let start = *self.pending_start.get_or_insert(captured_at);
            let take = (self.chunk_len - self.pending.len()).min(input.len());
            self.pending.extend_from_slice(&input[..take]);
            input = &input[take..];

            if self.pending.len() == self.chunk_len {
                let chunk = std::mem::replace(&mut self.pending, Vec::with_capacity(self.chunk_len));
                self.pending_start = Some(start + samples_to_duration(self.chunk_len as u64, self.sample_rate));
                emit(AudioBuffer::new(chunk, self.sample_rate, start));
            }
        }
        if self.pending.is_empty() {
            self.pending_start = None;
        }
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}
