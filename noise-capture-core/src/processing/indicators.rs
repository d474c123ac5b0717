use std::sync::Arc;

use chrono::{DateTime, Utc};
use rustfft::{num_complex::Complex, Fft, FftPlanner};

use super::filter_bank::ThirdOctaveFilterBank;
use super::sample_converter::SampleConverter;
use super::spectrum::window_function;
use super::weighting::{FrequencyWeighting, NOMINAL_THIRD_OCTAVE_FREQUENCIES};
use crate::models::audio_models::{samples_to_duration, AudioBuffer};
use crate::models::config::{RecordingConfiguration, WindowingMode};
use crate::models::indicators::AcousticIndicatorsData;

/// Level reported for zero or unmeasurable energy, in dB.
pub const LEVEL_FLOOR_DB: f64 = -99.0;

/// Converts a mean-square value into a calibrated level, never below the floor.
pub fn power_to_db(power: f64, gain_db: f64) -> f64 {
    let level = gain_db + 10.0 * power.log10();
    if level.is_finite() {
        level.max(LEVEL_FLOOR_DB)
    } else {
        LEVEL_FLOOR_DB
    }
}

#[derive(Debug, Clone, Copy)]
struct BinInfo {
    /// Converts `|X_k|²` into a one-sided mean-square contribution.
    scale: f64,
    a_gain: f64,
    c_gain: f64,
}

/// Turns a stream of audio buffers into per-window acoustic indicators.
///
/// Samples are accumulated into fixed integration windows regardless of the
/// buffer size the source delivers. Each complete window is reduced to:
///
/// - `leq`: broadband level from the time-domain mean square,
/// - `third_octave`: mean square output of the IIR band filters over the
///   window (see [`ThirdOctaveFilterBank`]),
/// - `lzeq`: total energy of the windowed FFT,
/// - `laeq` / `lceq`: FFT bin energies weighted by the A and C curves.
///
/// The computer never blocks. Buffers arriving earlier or later than the
/// sample clock predicts are counted and logged, not rejected.
pub struct AcousticIndicatorComputer {
    sample_rate: u32,
    window_secs: f64,
    gain_db: f64,
    windowing: WindowingMode,
    window_len: usize,
    window: Vec<f64>,
    bins: Vec<BinInfo>,
    filter_bank: ThirdOctaveFilterBank,
    fft: Arc<dyn Fft<f64>>,
    scratch: Vec<Complex<f64>>,
    pending: Vec<f32>,
    window_start: Option<DateTime<Utc>>,
    expected_next: Option<DateTime<Utc>>,
    jitter_events: u64,
}

impl std::fmt::Debug for AcousticIndicatorComputer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AcousticIndicatorComputer")
            .field("sample_rate", &self.sample_rate)
            .field("window_len", &self.window_len)
            .field("gain_db", &self.gain_db)
            .field("windowing", &self.windowing)
            .field("pending", &self.pending.len())
            .finish()
    }
}

impl AcousticIndicatorComputer {
    /// Hann-windowed computer.
    pub fn new(sample_rate: u32, window_secs: f64, gain_db: f64) -> Self {
        Self::with_windowing(sample_rate, window_secs, gain_db, WindowingMode::Hann)
    }

    pub fn with_windowing(sample_rate: u32, window_secs: f64, gain_db: f64, windowing: WindowingMode) -> Self {
        let window_len = ((window_secs * sample_rate as f64).round() as usize).max(2);
        let window = window_function(windowing, window_len);
        let window_power = window.iter().map(|w| w * w).sum::<f64>() / window_len as f64;
        let normalization = 1.0 / (window_len as f64 * window_len as f64 * window_power);

        let nyquist_bin = window_len / 2;
        let bins = (0..=nyquist_bin)
            .map(|k| {
                let frequency = k as f64 * sample_rate as f64 / window_len as f64;
                let one_sided = if k == 0 || (window_len % 2 == 0 && k == nyquist_bin) { 1.0 } else { 2.0 };
                BinInfo {
                    scale: one_sided * normalization,
                    a_gain: FrequencyWeighting::A.power_gain(frequency),
                    c_gain: FrequencyWeighting::C.power_gain(frequency),
                }
            })
            .collect();

        let fft = FftPlanner::<f64>::new().plan_fft_forward(window_len);
        Self {
            sample_rate,
            window_secs,
            gain_db,
            windowing,
            window_len,
            window,
            bins,
            filter_bank: ThirdOctaveFilterBank::new(sample_rate),
            fft,
            scratch: Vec::with_capacity(window_len),
            pending: Vec::with_capacity(window_len),
            window_start: None,
            expected_next: None,
            jitter_events: 0,
        }
    }

    pub fn from_config(config: &RecordingConfiguration, sample_rate: u32) -> Self {
        Self::with_windowing(
            sample_rate,
            config.integration_window_secs,
            config.total_gain_db(),
            config.windowing_mode,
        )
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of samples in one integration window.
    pub fn window_len(&self) -> usize {
        self.window_len
    }

    pub fn nominal_frequencies() -> Vec<f64> {
        NOMINAL_THIRD_OCTAVE_FREQUENCIES.to_vec()
    }

    /// Buffers whose timestamp disagreed with the sample clock.
    pub fn jitter_events(&self) -> u64 {
        self.jitter_events
    }

    /// Consumes a buffer and returns the frames of every window it completed,
    /// in order.
    pub fn push(&mut self, buffer: &AudioBuffer) -> Vec<AcousticIndicatorsData> {
        if buffer.sample_rate != self.sample_rate {
            log::debug!(
                "sample rate changed from {} to {} Hz, rebuilding indicator computer",
                self.sample_rate,
                buffer.sample_rate
            );
            let jitter_events = self.jitter_events;
            *self = Self::with_windowing(buffer.sample_rate, self.window_secs, self.gain_db, self.windowing);
            self.jitter_events = jitter_events;
        }
        self.track_arrival(buffer);

        let mut frames = Vec::new();
        let mut offset = 0;
        while offset < buffer.samples.len() {
            if self.pending.is_empty() {
                self.window_start = Some(buffer.timestamp_of(offset));
            }
            let take = (self.window_len - self.pending.len()).min(buffer.samples.len() - offset);
            self.pending.extend_from_slice(&buffer.samples[offset..offset + take]);
            offset += take;

            if self.pending.len() == self.window_len {
                let start = self.window_start.take().unwrap_or(buffer.captured_at);
                let end = start + samples_to_duration(self.window_len as u64, self.sample_rate);
                let window = std::mem::replace(&mut self.pending, Vec::with_capacity(self.window_len));
                frames.push(self.compute_window(&window, end));
            }
        }
        frames
    }

    fn track_arrival(&mut self, buffer: &AudioBuffer) {
        if let Some(expected) = self.expected_next {
            let drift = (buffer.captured_at - expected).abs();
            let tolerance = samples_to_duration(buffer.len() as u64 / 2, self.sample_rate);
            if drift > tolerance {
                self.jitter_events += 1;
                log::warn!(
                    "audio buffer arrived {} ms off the sample clock",
                    (buffer.captured_at - expected).num_milliseconds()
                );
            }
        }
        self.expected_next = Some(buffer.captured_at + samples_to_duration(buffer.len() as u64, self.sample_rate));
    }

    /// Computes the indicators of one complete window ending at `end`.
    fn compute_window(&mut self, samples: &[f32], end: DateTime<Utc>) -> AcousticIndicatorsData {
        let rms = SampleConverter::rms_level(samples);

        self.scratch.clear();
        self.scratch.extend(
            samples
                .iter()
                .zip(&self.window)
                .map(|(&s, &w)| Complex::new(s as f64 * w, 0.0)),
        );
        self.scratch.resize(self.window_len, Complex::new(0.0, 0.0));
        self.fft.process(&mut self.scratch);

        let mut z_power = 0.0;
        let mut a_power = 0.0;
        let mut c_power = 0.0;
        for (bin, value) in self.bins.iter().zip(&self.scratch) {
            let power = value.norm_sqr() * bin.scale;
            z_power += power;
            a_power += power * bin.a_gain;
            c_power += power * bin.c_gain;
        }

        let band_power = self.filter_bank.band_powers(samples);
        let gain = self.gain_db;
        AcousticIndicatorsData {
            timestamp: end,
            leq: power_to_db(rms * rms, gain),
            lzeq: power_to_db(z_power, gain),
            laeq: power_to_db(a_power, gain),
            lceq: power_to_db(c_power, gain),
            rms,
            third_octave: band_power.iter().map(|&p| power_to_db(p, gain)).collect(),
            nominal_frequencies: Self::nominal_frequencies(),
        }
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;

    const RATE: u32 = 48000;
    const GAIN: f64 = 112.35;

    fn sine(frequency: f64, amplitude: f32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|n| amplitude * (2.0 * std::f64::consts::PI * frequency * n as f64 / RATE as f64).sin() as f32)
            .collect()
    }

    fn single_frame(samples: Vec<f32>) -> AcousticIndicatorsData {
        let mut computer = AcousticIndicatorComputer::new(RATE, 0.125, GAIN);
        let frames = computer.push(&AudioBuffer::new(samples, RATE, Utc::now()));
        assert_eq!(frames.len(), 1);
        frames.into_iter().next().unwrap()
    }

    /// Last frame of `secs` of a steady tone, once the band filters settled.
    fn settled_frame(frequency: f64, amplitude: f32, secs: f64) -> AcousticIndicatorsData {
        let mut computer = AcousticIndicatorComputer::new(RATE, 0.125, GAIN);
        let samples = sine(frequency, amplitude, (secs * RATE as f64) as usize);
        computer
            .push(&AudioBuffer::new(samples, RATE, Utc::now()))
            .pop()
            .unwrap()
    }

    #[test]
    fn window_length_follows_rate() {
        assert_eq!(AcousticIndicatorComputer::new(48000, 0.125, 0.0).window_len(), 6000);
        assert_eq!(AcousticIndicatorComputer::new(44100, 0.125, 0.0).window_len(), 5513);
    }

    #[test]
    fn sine_levels_match_analytic_value() {
        let amplitude = 0.5f32;
        let frame = settled_frame(1000.0, amplitude, 0.5);
        let expected = GAIN + 10.0 * ((amplitude as f64).powi(2) / 2.0).log10();

        assert_abs_diff_eq!(frame.leq, expected, epsilon = 0.5);
        assert_abs_diff_eq!(frame.lzeq, expected, epsilon = 0.5);
        assert_abs_diff_eq!(frame.laeq, expected, epsilon = 0.5);
        assert_abs_diff_eq!(frame.lceq, expected, epsilon = 0.5);
        assert_abs_diff_eq!(frame.band_level(1000.0).unwrap(), expected, epsilon = 0.5);
        assert_abs_diff_eq!(frame.rms, amplitude as f64 / 2f64.sqrt(), epsilon = 1e-4);
    }

    #[test]
    fn other_bands_stay_far_below_the_tone() {
        let frame = settled_frame(1000.0, 0.5, 1.0);
        let tone = frame.band_level(1000.0).unwrap();
        for (&frequency, &level) in frame.nominal_frequencies.iter().zip(&frame.third_octave) {
            match frequency {
                f if f == 1000.0 => {}
                f if f == 800.0 || f == 1250.0 => {
                    assert!(level < tone - 15.0, "band {frequency} Hz at {level} dB")
                }
                _ => assert!(level < tone - 30.0, "band {frequency} Hz at {level} dB"),
            }
        }
    }

    #[test]
    fn every_band_centre_reads_the_tone_level() {
        let expected = GAIN + 10.0 * (0.5f64.powi(2) / 2.0).log10();
        for &frequency in &NOMINAL_THIRD_OCTAVE_FREQUENCIES {
            // Two seconds: the 20 Hz filter needs a few hundred milliseconds.
            let frame = settled_frame(frequency, 0.5, 2.0);
            let level = frame.band_level(frequency).unwrap();
            assert!(
                (level - expected).abs() <= 0.5,
                "{frequency} Hz band read {level:.2} dB, expected {expected:.2} dB"
            );
        }
    }

    #[test]
    fn low_bands_are_resolved_separately() {
        let frame = settled_frame(40.0, 0.5, 2.0);
        let tone = frame.band_level(40.0).unwrap();
        assert!(frame.band_level(20.0).unwrap() < tone - 30.0);
        assert!(frame.band_level(31.5).unwrap() < tone - 15.0);
        assert!(frame.band_level(50.0).unwrap() < tone - 15.0);
        assert!(frame.band_level(80.0).unwrap() < tone - 30.0);
    }

    #[test]
    fn rectangular_window_reads_bin_centred_tones_exactly() {
        let config = RecordingConfiguration {
            windowing_mode: WindowingMode::Rectangular,
            ..Default::default()
        };
        let mut computer = AcousticIndicatorComputer::from_config(&config, RATE);
        // 1 kHz is bin 125 of a 6000-point window at 48 kHz.
        let frames = computer.push(&AudioBuffer::new(sine(1000.0, 0.5, 6000), RATE, Utc::now()));
        let expected = GAIN + 10.0 * (0.5f64.powi(2) / 2.0).log10();
        assert_abs_diff_eq!(frames[0].lzeq, expected, epsilon = 1e-4);
        assert_abs_diff_eq!(frames[0].laeq, expected, epsilon = 0.01);
    }

    #[test]
    fn a_weighting_attenuates_low_tones() {
        let frame = single_frame(sine(200.0, 0.5, 6000));
        let expected = frame.lzeq + FrequencyWeighting::A.gain_db(200.0);
        assert_abs_diff_eq!(frame.laeq, expected, epsilon = 0.5);
        assert!(frame.lceq > frame.laeq);
    }

    #[test]
    fn silence_sits_at_the_floor() {
        let frame = single_frame(vec![0.0; 6000]);
        assert_eq!(frame.leq, LEVEL_FLOOR_DB);
        assert_eq!(frame.lzeq, LEVEL_FLOOR_DB);
        assert_eq!(frame.laeq, LEVEL_FLOOR_DB);
        assert!(frame.third_octave.iter().all(|&l| l == LEVEL_FLOOR_DB));
        assert_eq!(frame.third_octave.len(), frame.nominal_frequencies.len());
    }

    #[test]
    fn partial_windows_are_buffered_across_pushes() {
        let mut computer = AcousticIndicatorComputer::new(RATE, 0.125, GAIN);
        let start = Utc::now();
        let samples = sine(1000.0, 0.5, 9000);

        let first = computer.push(&AudioBuffer::new(samples[..4500].to_vec(), RATE, start));
        assert!(first.is_empty());

        let second_start = start + samples_to_duration(4500, RATE);
        let second = computer.push(&AudioBuffer::new(samples[4500..].to_vec(), RATE, second_start));
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].timestamp, start + chrono::Duration::milliseconds(125));
        assert_eq!(computer.jitter_events(), 0);
    }

    #[test]
    fn one_buffer_can_complete_several_windows() {
        let mut computer = AcousticIndicatorComputer::new(RATE, 0.125, GAIN);
        let start = Utc::now();
        let frames = computer.push(&AudioBuffer::new(vec![0.1; 18000], RATE, start));

        let timestamps: Vec<_> = frames.iter().map(|f| f.timestamp).collect();
        assert_eq!(
            timestamps,
            vec![
                start + chrono::Duration::milliseconds(125),
                start + chrono::Duration::milliseconds(250),
                start + chrono::Duration::milliseconds(375),
            ]
        );
    }

    #[test]
    fn late_buffers_count_as_jitter() {
        let mut computer = AcousticIndicatorComputer::new(RATE, 0.125, GAIN);
        let start = Utc::now();
        computer.push(&AudioBuffer::new(vec![0.0; 1024], RATE, start));
        computer.push(&AudioBuffer::new(vec![0.0; 1024], RATE, start + chrono::Duration::seconds(1)));
        assert_eq!(computer.jitter_events(), 1);
    }

    #[test]
    fn sample_rate_change_rebuilds_window() {
        let mut computer = AcousticIndicatorComputer::new(RATE, 0.125, GAIN);
        computer.push(&AudioBuffer::new(vec![0.0; 100], 16000, Utc::now()));
        assert_eq!(computer.sample_rate(), 16000);
        assert_eq!(computer.window_len(), 2000);

        // Bands above the new Nyquist frequency sit at the floor.
        let frames = computer.push(&AudioBuffer::new(vec![0.5; 2000], 16000, Utc::now()));
        assert_eq!(frames[0].band_level(20000.0), Some(LEVEL_FLOOR_DB));
    }
}
