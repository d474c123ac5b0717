//! Third-octave band layout and IEC 61672-1 frequency weightings.

/// Nominal third-octave centre frequencies from 20 Hz to 20 kHz (IEC 61260).
pub const NOMINAL_THIRD_OCTAVE_FREQUENCIES: [f64; 31] = [
    20.0, 25.0, 31.5, 40.0, 50.0, 63.0, 80.0, 100.0, 125.0, 160.0, 200.0, 250.0, 315.0, 400.0, 500.0, 630.0,
    800.0, 1000.0, 1250.0, 1600.0, 2000.0, 2500.0, 3150.0, 4000.0, 5000.0, 6300.0, 8000.0, 10000.0, 12500.0,
    16000.0, 20000.0,
];

const REFERENCE_BAND_INDEX: i32 = 17;

/// Exact base-10 centre frequency of band `index`, `1000·10^((index-17)/10)`.
pub fn exact_center_frequency(index: usize) -> f64 {
    1000.0 * 10f64.powf((index as i32 - REFERENCE_BAND_INDEX) as f64 / 10.0)
}

/// Lower and upper -3 dB edge frequencies of band `index`.
pub fn band_edges(index: usize) -> (f64, f64) {
    let center = exact_center_frequency(index);
    let half_band = 10f64.powf(1.0 / 20.0);
    (center / half_band, center * half_band)
}

/// Frequency weighting curve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrequencyWeighting {
    A,
    C,
    /// Flat.
    Z,
}

const F1: f64 = 20.598_997;
const F2: f64 = 107.652_65;
const F3: f64 = 737.862_23;
const F4: f64 = 12_194.217;

/// Normalisation constants so that both curves read 0 dB at 1 kHz.
const A1000_DB: f64 = 2.0;
const C1000_DB: f64 = 0.062;

impl FrequencyWeighting {
    /// Weighting gain in decibels. Non-positive frequencies map to `-inf`
    /// for A and C.
    pub fn gain_db(self, frequency: f64) -> f64 {
        match self {
            FrequencyWeighting::Z => 0.0,
            _ => 10.0 * self.power_gain(frequency).log10(),
        }
    }

    /// Weighting gain applied to a power (squared magnitude) value.
    pub fn power_gain(self, frequency: f64) -> f64 {
        if self == FrequencyWeighting::Z {
            return 1.0;
        }
        if frequency <= 0.0 || !frequency.is_finite() {
            return 0.0;
        }
        let f2 = frequency * frequency;
        let common = F4 * F4 / ((f2 + F1 * F1) * (f2 + F4 * F4));
        let (amplitude, offset_db) = match self {
            FrequencyWeighting::A => (
                common * f2 * f2 / ((f2 + F2 * F2) * (f2 + F3 * F3)).sqrt(),
                A1000_DB,
            ),
            FrequencyWeighting::C => (common * f2, C1000_DB),
            FrequencyWeighting::Z => (1.0, 0.0),
        };
        amplitude * amplitude * 10f64.powf(offset_db / 10.0)
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;

    #[test]
    fn reference_band_is_one_kilohertz() {
        assert_eq!(NOMINAL_THIRD_OCTAVE_FREQUENCIES[17], 1000.0);
        assert_abs_diff_eq!(exact_center_frequency(17), 1000.0, epsilon = 1e-9);
    }

    #[test]
    fn exact_centres_round_to_nominal() {
        for (index, &nominal) in NOMINAL_THIRD_OCTAVE_FREQUENCIES.iter().enumerate() {
            let exact = exact_center_frequency(index);
            assert!((exact - nominal).abs() / nominal < 0.03, "band {index}: {exact} vs {nominal}");
        }
    }

    #[test]
    fn bands_are_contiguous() {
        for index in 1..NOMINAL_THIRD_OCTAVE_FREQUENCIES.len() {
            let (_, previous_upper) = band_edges(index - 1);
            let (lower, _) = band_edges(index);
            assert_abs_diff_eq!(previous_upper, lower, epsilon = 1e-6);
        }
    }

    #[test]
    fn weightings_are_zero_at_one_kilohertz() {
        assert_abs_diff_eq!(FrequencyWeighting::A.gain_db(1000.0), 0.0, epsilon = 0.01);
        assert_abs_diff_eq!(FrequencyWeighting::C.gain_db(1000.0), 0.0, epsilon = 0.01);
        assert_eq!(FrequencyWeighting::Z.gain_db(1000.0), 0.0);
    }

    #[test]
    fn a_weighting_matches_tabulated_values() {
        // IEC 61672-1 table 3.
        assert_abs_diff_eq!(FrequencyWeighting::A.gain_db(100.0), -19.1, epsilon = 0.1);
        assert_abs_diff_eq!(FrequencyWeighting::A.gain_db(31.5), -39.4, epsilon = 0.2);
        assert_abs_diff_eq!(FrequencyWeighting::A.gain_db(4000.0), 1.0, epsilon = 0.1);
    }

    #[test]
    fn c_weighting_matches_tabulated_values() {
        assert_abs_diff_eq!(FrequencyWeighting::C.gain_db(31.5), -3.0, epsilon = 0.1);
        assert_abs_diff_eq!(FrequencyWeighting::C.gain_db(8000.0), -3.0, epsilon = 0.1);
    }

    #[test]
    fn dc_is_fully_attenuated() {
        assert_eq!(FrequencyWeighting::A.power_gain(0.0), 0.0);
        assert_eq!(FrequencyWeighting::C.power_gain(0.0), 0.0);
        assert_eq!(FrequencyWeighting::Z.power_gain(0.0), 1.0);
    }
}
