use super::indicators::power_to_db;

/// IEC 61672-1 display time weighting.
///
/// Smooths a sequence of levels produced every `interval_secs` so that a sudden
/// drop decays at `decay_rate` dB per second instead of jumping.
#[derive(Debug, Clone)]
pub struct LevelDecay {
    time_weight: f64,
    integration: f64,
}

impl LevelDecay {
    pub fn new(decay_rate_db_per_sec: f64, interval_secs: f64) -> Self {
        Self {
            time_weight: 10f64.powf(decay_rate_db_per_sec * interval_secs / 10.0),
            integration: 0.0,
        }
    }

    /// Feeds a new level in dB and returns the displayed level.
    pub fn update(&mut self, level_db: f64) -> f64 {
        self.integration = self.integration * self.time_weight + 10f64.powf(level_db / 10.0) * (1.0 - self.time_weight);
        power_to_db(self.integration, 0.0)
    }
}

/// One [`LevelDecay`] per third-octave band.
#[derive(Debug, Clone)]
pub struct BandLevelDecay {
    decay_rate: f64,
    interval_secs: f64,
    bands: Vec<LevelDecay>,
}

impl BandLevelDecay {
    pub fn new(decay_rate_db_per_sec: f64, interval_secs: f64) -> Self {
        Self {
            decay_rate: decay_rate_db_per_sec,
            interval_secs,
            bands: Vec::new(),
        }
    }

    pub fn update(&mut self, levels: &[f64]) -> Vec<f64> {
        if self.bands.len() != levels.len() {
            self.bands = vec![LevelDecay::new(self.decay_rate, self.interval_secs); levels.len()];
        }
        self.bands
            .iter_mut()
            .zip(levels)
            .map(|(decay, &level)| decay.update(level))
            .collect()
    }
}
