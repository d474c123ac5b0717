/// Sample-format helpers used between platform capture and analysis.
///
/// Platform devices deliver interleaved multi-channel audio at their own mix
/// rate; the analysis pipeline wants mono f32 at the configured rate, and the
/// WAV recorder wants 16-bit PCM.
#[derive(Debug, Clone)]
pub struct SampleConverter {
    pub target_sample_rate: u32,
    resampler: ResamplerState,
}

/// Interpolation phase carried from one `resample` call to the next, so a
/// stream cut into packets resamples exactly like the unbroken stream.
#[derive(Debug, Clone, Copy, Default)]
struct ResamplerState {
    source_sample_rate: u32,
    /// Source position of the next output sample, relative to the first
    /// sample of the next call. `-1.0 ..= 0.0` interpolates from `previous`.
    position: f64,
    previous: Option<f32>,
}

impl SampleConverter {
    pub fn new(target_sample_rate: u32) -> Self {
        Self {
            target_sample_rate,
            resampler: ResamplerState::default(),
        }
    }

    /// Linear interpolation resampling of mono audio to `target_sample_rate`.
    ///
    /// Successive calls are treated as one continuous stream: the last input
    /// sample is held back until the next call supplies its right neighbour.
    /// Returns the input unchanged if rates match. A change of source rate
    /// restarts the stream.
    pub fn resample(&mut self, samples: &[f32], source_sample_rate: u32) -> Vec<f32> {
        if source_sample_rate == self.target_sample_rate || source_sample_rate == 0 {
            self.resampler = ResamplerState::default();
            return samples.to_vec();
        }
        if source_sample_rate != self.resampler.source_sample_rate {
            self.resampler = ResamplerState {
                source_sample_rate,
                ..ResamplerState::default()
            };
        }
        if samples.is_empty() {
            return Vec::new();
        }

        let step = source_sample_rate as f64 / self.target_sample_rate as f64;
        let state = &mut self.resampler;
        let last_index = (samples.len() - 1) as f64;
        let mut output = Vec::with_capacity((samples.len() as f64 / step) as usize + 1);
        while state.position < last_index {
            let floor = state.position.floor();
            let fraction = (state.position - floor) as f32;
            let (a, b) = if floor < 0.0 {
                (state.previous.unwrap_or(samples[0]), samples[0])
            } else {
                let index = floor as usize;
                (samples[index], samples[index + 1])
            };
            output.push(a + (b - a) * fraction);
            state.position += step;
        }
        state.position -= samples.len() as f64;
        state.previous = samples.last().copied();
        output
    }

    /// Averages interleaved frames down to one channel.
    pub fn downmix_to_mono(samples: &[f32], channels: usize) -> Vec<f32> {
        if channels <= 1 {
            return samples.to_vec();
        }
        let scale = 1.0 / channels as f32;
        samples
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() * scale)
            .collect()
    }

    /// Converts `[-1.0, 1.0]` samples to little-endian 16-bit PCM, clamping
    /// out-of-range values.
    pub fn convert_to_int16_pcm(samples: &[f32]) -> Vec<u8> {
        let mut data = Vec::with_capacity(samples.len() * 2);
        for &sample in samples {
            let value = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
            data.extend_from_slice(&value.to_le_bytes());
        }
        data
    }

    /// Root mean square, accumulated in double precision.
    pub fn rms_level(samples: &[f32]) -> f64 {
        if samples.is_empty() {
            return 0.0;
        }
        let sum_sq: f64 = samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
        (sum_sq / samples.len() as f64).sqrt()
    }
}
