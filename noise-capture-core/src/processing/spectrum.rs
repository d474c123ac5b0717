use std::f64::consts::PI;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rustfft::{num_complex::Complex, Fft, FftPlanner};

use super::indicators::power_to_db;
use crate::models::audio_models::{samples_to_duration, AudioBuffer};
use crate::models::config::WindowingMode;
use crate::models::indicators::SpectrumData;

/// FFT length of the live spectrum.
pub const SPECTRUM_FFT_SIZE: usize = 4096;

/// Samples between the starts of two consecutive spectrum blocks.
pub const SPECTRUM_HOP: usize = 2048;

/// Periodic window coefficients of length `len`.
pub fn window_function(mode: WindowingMode, len: usize) -> Vec<f64> {
    match mode {
        WindowingMode::Hann => (0..len)
            .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f64 / len as f64).cos()))
            .collect(),
        WindowingMode::Rectangular => vec![1.0; len],
    }
}

/// Sliding-window power spectrum.
///
/// Emits one [`SpectrumData`] per `hop` samples once the first `fft_size`
/// samples arrived. Bins are scaled so that summing their linear powers gives
/// the block's mean square, then calibrated like the acoustic indicators.
pub struct SpectrumAnalyzer {
    sample_rate: u32,
    gain_db: f64,
    windowing: WindowingMode,
    fft_size: usize,
    hop: usize,
    window: Vec<f64>,
    scale: f64,
    fft: Arc<dyn Fft<f64>>,
    scratch: Vec<Complex<f64>>,
    pending: Vec<f32>,
    /// Capture time of the sample that started the current run of pending
    /// samples, and how many samples were dropped from its head since.
    origin: Option<(DateTime<Utc>, u64)>,
}

impl std::fmt::Debug for SpectrumAnalyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpectrumAnalyzer")
            .field("sample_rate", &self.sample_rate)
            .field("fft_size", &self.fft_size)
            .field("hop", &self.hop)
            .field("windowing", &self.windowing)
            .finish()
    }
}

impl SpectrumAnalyzer {
    /// `hop` is clamped to `1..=fft_size`.
    pub fn new(sample_rate: u32, fft_size: usize, hop: usize, gain_db: f64, windowing: WindowingMode) -> Self {
        let fft_size = fft_size.max(2);
        let window = window_function(windowing, fft_size);
        let window_power = window.iter().map(|w| w * w).sum::<f64>() / fft_size as f64;
        Self {
            sample_rate,
            gain_db,
            windowing,
            fft_size,
            hop: hop.clamp(1, fft_size),
            window,
            scale: 2.0 / (fft_size as f64 * fft_size as f64 * window_power),
            fft: FftPlanner::<f64>::new().plan_fft_forward(fft_size),
            scratch: Vec::with_capacity(fft_size),
            pending: Vec::with_capacity(2 * fft_size),
            origin: None,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Consumes a buffer and returns every block it completed, in order.
    pub fn push(&mut self, buffer: &AudioBuffer) -> Vec<SpectrumData> {
        if buffer.sample_rate != self.sample_rate {
            log::debug!(
                "sample rate changed from {} to {} Hz, rebuilding spectrum analyzer",
                self.sample_rate,
                buffer.sample_rate
            );
            *self = Self::new(buffer.sample_rate, self.fft_size, self.hop, self.gain_db, self.windowing);
        }
        if buffer.is_empty() {
            return Vec::new();
        }
        if self.pending.is_empty() {
            self.origin = Some((buffer.captured_at, 0));
        }
        self.pending.extend_from_slice(&buffer.samples);

        let mut blocks = Vec::new();
        while self.pending.len() >= self.fft_size {
            let (origin, dropped) = self.origin.unwrap_or((buffer.captured_at, 0));
            let end = origin + samples_to_duration(dropped + self.fft_size as u64, self.sample_rate);
            blocks.push(self.analyse_head(end));
            self.pending.drain(..self.hop);
            self.origin = Some((origin, dropped + self.hop as u64));
        }
        blocks
    }

    fn analyse_head(&mut self, end: DateTime<Utc>) -> SpectrumData {
        self.scratch.clear();
        self.scratch.extend(
            self.pending[..self.fft_size]
                .iter()
                .zip(&self.window)
                .map(|(&s, &w)| Complex::new(s as f64 * w, 0.0)),
        );
        self.fft.process(&mut self.scratch);

        let spectrum = self.scratch[..self.fft_size / 2]
            .iter()
            .map(|bin| power_to_db(bin.norm_sqr() * self.scale, self.gain_db))
            .collect();
        SpectrumData {
            timestamp: end,
            sample_rate: self.sample_rate,
            spectrum,
        }
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;

    const RATE: u32 = 48000;
    const GAIN: f64 = 112.35;

    fn sine(frequency: f64, amplitude: f64, len: usize) -> Vec<f32> {
        (0..len)
            .map(|n| (amplitude * (2.0 * PI * frequency * n as f64 / RATE as f64).sin()) as f32)
            .collect()
    }

    fn tone_level(amplitude: f64) -> f64 {
        GAIN + 10.0 * (amplitude * amplitude / 2.0).log10()
    }

    #[test]
    fn blocks_follow_the_hop() {
        let mut analyzer = SpectrumAnalyzer::new(RATE, SPECTRUM_FFT_SIZE, SPECTRUM_HOP, GAIN, WindowingMode::Hann);
        let start = Utc::now();

        assert!(analyzer.push(&AudioBuffer::new(vec![0.0; 4000], RATE, start)).is_empty());
        let blocks = analyzer.push(&AudioBuffer::new(vec![0.0; 4192], RATE, start + samples_to_duration(4000, RATE)));

        assert_eq!(blocks.len(), 3);
        assert_eq!(blocks[0].timestamp, start + samples_to_duration(4096, RATE));
        assert_eq!(blocks[1].timestamp, start + samples_to_duration(6144, RATE));
        assert_eq!(blocks[2].timestamp, start + samples_to_duration(8192, RATE));
        assert!(blocks.iter().all(|b| b.spectrum.len() == SPECTRUM_FFT_SIZE / 2));
    }

    #[test]
    fn hann_block_energy_sums_to_tone_power() {
        let mut analyzer = SpectrumAnalyzer::new(RATE, SPECTRUM_FFT_SIZE, SPECTRUM_HOP, GAIN, WindowingMode::Hann);
        // 750 Hz falls exactly on bin 64.
        let blocks = analyzer.push(&AudioBuffer::new(sine(750.0, 0.5, 4096), RATE, Utc::now()));
        let spectrum = &blocks[0];

        assert_eq!(spectrum.peak_bin(), Some(64));
        assert_abs_diff_eq!(spectrum.bin_frequency(64), 750.0);
        let linear: f64 = spectrum.spectrum[62..=66].iter().map(|db| 10f64.powf(db / 10.0)).sum();
        assert_abs_diff_eq!(10.0 * linear.log10(), tone_level(0.5), epsilon = 0.01);
    }

    #[test]
    fn rectangular_window_puts_a_bin_centred_tone_in_one_bin() {
        let mut analyzer =
            SpectrumAnalyzer::new(RATE, SPECTRUM_FFT_SIZE, SPECTRUM_HOP, GAIN, WindowingMode::Rectangular);
        let blocks = analyzer.push(&AudioBuffer::new(sine(750.0, 0.5, 4096), RATE, Utc::now()));
        let spectrum = &blocks[0].spectrum;

        assert_abs_diff_eq!(spectrum[64], tone_level(0.5), epsilon = 1e-3);
        assert!(spectrum[70] < tone_level(0.5) - 60.0);
    }

    #[test]
    fn sample_rate_change_rebuilds() {
        let mut analyzer = SpectrumAnalyzer::new(RATE, 1024, 512, GAIN, WindowingMode::Hann);
        analyzer.push(&AudioBuffer::new(vec![0.0; 700], RATE, Utc::now()));
        let blocks = analyzer.push(&AudioBuffer::new(vec![0.0; 1024], 16000, Utc::now()));
        assert_eq!(analyzer.sample_rate(), 16000);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].sample_rate, 16000);
    }
}
