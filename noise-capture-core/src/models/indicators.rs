use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Acoustic indicators computed over one integration window.
///
/// All levels are in decibels and always finite. `third_octave[i]` is the level
/// of the band centred on `nominal_frequencies[i]`; both have the same length.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcousticIndicatorsData {
    /// End time of the integration window.
    pub timestamp: DateTime<Utc>,
    /// Broadband unweighted level over the full signal bandwidth.
    pub leq: f64,
    /// Z-weighted level over the full FFT spectrum.
    pub lzeq: f64,
    pub laeq: f64,
    pub lceq: f64,
    /// Root mean square of the raw samples.
    pub rms: f64,
    pub third_octave: Vec<f64>,
    pub nominal_frequencies: Vec<f64>,
}

impl AcousticIndicatorsData {
    /// Level of the band whose nominal centre frequency is `frequency`.
    pub fn band_level(&self, frequency: f64) -> Option<f64> {
        self.nominal_frequencies
            .iter()
            .position(|&f| (f - frequency).abs() < f64::EPSILON)
            .and_then(|index| self.third_octave.get(index).copied())
    }
}

/// Power spectrum of one FFT block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpectrumData {
    /// End time of the analysed block.
    pub timestamp: DateTime<Utc>,
    pub sample_rate: u32,
    /// Calibrated level of each FFT bin from DC up to, excluding, Nyquist.
    pub spectrum: Vec<f64>,
}

impl SpectrumData {
    /// Centre frequency of bin `index`, in Hz.
    pub fn bin_frequency(&self, index: usize) -> f64 {
        index as f64 * self.sample_rate as f64 / (2 * self.spectrum.len()) as f64
    }

    /// Index of the loudest bin.
    pub fn peak_bin(&self) -> Option<usize> {
        self.spectrum
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(index, _)| index)
    }
}
