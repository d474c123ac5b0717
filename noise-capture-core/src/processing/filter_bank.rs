//! Third-octave filter bank: one order-3 Butterworth band-pass per band,
//! realised as three cascaded biquads.
//!
//! Filters are designed by the bilinear transform with pre-warped band
//! edges, so every band keeps its IEC 61260 edges no matter how few FFT bins
//! would fall inside it. Filter state carries over from one block to the
//! next, so consecutive integration windows see a continuous signal.

use std::f64::consts::PI;

use rustfft::num_complex::Complex;

use super::weighting::{band_edges, NOMINAL_THIRD_OCTAVE_FREQUENCIES};

/// Band edges are clamped below this fraction of the Nyquist frequency.
const MAX_EDGE_NYQUIST_FRACTION: f64 = 0.98;

/// Second-order section with numerator `g·(1 - z⁻²)`, in transposed direct
/// form II.
#[derive(Debug, Clone, Copy)]
struct Biquad {
    gain: f64,
    a1: f64,
    a2: f64,
    s1: f64,
    s2: f64,
}

impl Biquad {
    /// Section holding the digital poles `p` and `q`, which are either a
    /// conjugate pair or both real.
    fn from_poles(p: Complex<f64>, q: Complex<f64>) -> Self {
        Self {
            gain: 1.0,
            a1: -(p + q).re,
            a2: (p * q).re,
            s1: 0.0,
            s2: 0.0,
        }
    }

    #[inline]
    fn process(&mut self, x: f64) -> f64 {
        let y = self.gain * x + self.s1;
        self.s1 = self.s2 - self.a1 * y;
        self.s2 = -self.gain * x - self.a2 * y;
        y
    }

    /// Complex response at `z⁻¹ = e^{-jω}`.
    fn response(&self, omega: f64) -> Complex<f64> {
        let z1 = Complex::from_polar(1.0, -omega);
        let z2 = z1 * z1;
        (Complex::new(1.0, 0.0) - z2) * self.gain / (Complex::new(1.0, 0.0) + z1 * self.a1 + z2 * self.a2)
    }
}

#[derive(Debug, Clone)]
struct BandFilter {
    sections: [Biquad; 3],
}

impl BandFilter {
    /// Designs the band `[lower, upper]` Hz, or `None` when the band does not
    /// fit below Nyquist.
    fn design(lower: f64, upper: f64, sample_rate: f64) -> Option<Self> {
        let upper = upper.min(MAX_EDGE_NYQUIST_FRACTION * sample_rate / 2.0);
        if lower >= upper {
            return None;
        }

        // Pre-warped edges for s = (1 - z⁻¹) / (1 + z⁻¹).
        let low = (PI * lower / sample_rate).tan();
        let high = (PI * upper / sample_rate).tan();
        let bandwidth = high - low;
        let center_sq = low * high;

        // Each low-pass prototype pole p becomes the two roots of
        // s² - p·B·s + w0² = 0.
        let band_poles = |p: Complex<f64>| {
            let pb = p * bandwidth;
            let root = (pb * pb - 4.0 * center_sq).sqrt();
            ((pb + root) * 0.5, (pb - root) * 0.5)
        };
        let to_digital = |s: Complex<f64>| (Complex::new(1.0, 0.0) + s) / (Complex::new(1.0, 0.0) - s);

        let (r1, r2) = band_poles(Complex::new(-1.0, 0.0));
        let (c1, c2) = band_poles(Complex::new(-0.5, 3f64.sqrt() / 2.0));
        let mut sections = [
            Biquad::from_poles(to_digital(r1), to_digital(r2)),
            Biquad::from_poles(to_digital(c1), to_digital(c1).conj()),
            Biquad::from_poles(to_digital(c2), to_digital(c2).conj()),
        ];

        // Unity gain at the geometric band centre.
        let omega = 2.0 * PI * (lower * upper).sqrt() / sample_rate;
        let magnitude: f64 = sections.iter().map(|s| s.response(omega).norm()).product();
        if !(magnitude.is_finite() && magnitude > 0.0) {
            return None;
        }
        let gain = magnitude.recip().cbrt();
        for section in &mut sections {
            section.gain = gain;
        }
        Some(Self { sections })
    }

    #[inline]
    fn process(&mut self, x: f64) -> f64 {
        self.sections.iter_mut().fold(x, |acc, section| section.process(acc))
    }

    fn response_db(&self, frequency: f64, sample_rate: f64) -> f64 {
        let omega = 2.0 * PI * frequency / sample_rate;
        let magnitude: f64 = self.sections.iter().map(|s| s.response(omega).norm()).product();
        20.0 * magnitude.log10()
    }
}

/// Splits a signal into the 31 nominal third-octave bands.
#[derive(Debug, Clone)]
pub struct ThirdOctaveFilterBank {
    sample_rate: u32,
    bands: Vec<Option<BandFilter>>,
}

impl ThirdOctaveFilterBank {
    pub fn new(sample_rate: u32) -> Self {
        let bands: Vec<_> = (0..NOMINAL_THIRD_OCTAVE_FREQUENCIES.len())
            .map(|index| {
                let (lower, upper) = band_edges(index);
                BandFilter::design(lower, upper, sample_rate as f64)
            })
            .collect();
        let unmeasurable = bands.iter().filter(|band| band.is_none()).count();
        if unmeasurable > 0 {
            log::debug!("{unmeasurable} third-octave band(s) lie above Nyquist at {sample_rate} Hz");
        }
        Self { sample_rate, bands }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Filters `samples` through every band and returns each band's mean
    /// square output, in band order. Bands above Nyquist report zero.
    pub fn band_powers(&mut self, samples: &[f32]) -> Vec<f64> {
        if samples.is_empty() {
            return vec![0.0; self.bands.len()];
        }
        self.bands
            .iter_mut()
            .map(|band| match band {
                Some(filter) => {
                    let sum_sq: f64 = samples
                        .iter()
                        .map(|&x| {
                            let y = filter.process(x as f64);
                            y * y
                        })
                        .sum();
                    sum_sq / samples.len() as f64
                }
                None => 0.0,
            })
            .collect()
    }

    /// Magnitude response of band `index` at `frequency`, in dB.
    pub fn response_db(&self, index: usize, frequency: f64) -> Option<f64> {
        self.bands
            .get(index)?
            .as_ref()
            .map(|filter| filter.response_db(frequency, self.sample_rate as f64))
    }
}
