use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

use super::indicators::AcousticIndicatorsData;

/// Current wall-clock time, truncated to whole milliseconds.
///
/// Measurement timestamps are stored at millisecond precision so that
/// `duration == ended_at - started_at` holds exactly after serialization.
pub fn now_millis() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

/// Leq values recorded at a given time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeqsRecord {
    pub timestamp: DateTime<Utc>,
    pub lzeq: f64,
    pub laeq: f64,
    pub lceq: f64,
    pub leqs_per_third_octave_band: Vec<f64>,
}

impl From<&AcousticIndicatorsData> for LeqsRecord {
    fn from(data: &AcousticIndicatorsData) -> Self {
        Self {
            timestamp: data.timestamp,
            lzeq: data.lzeq,
            laeq: data.laeq,
            lceq: data.lceq,
            leqs_per_third_octave_band: data.third_octave.clone(),
        }
    }
}

/// A location fix reported by the platform location provider.
///
/// Speed, altitude and direction are not always available (browsers, older
/// Android versions), hence optional. Accuracies are in meters, meters per
/// second and degrees respectively.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationRecord {
    pub timestamp: DateTime<Utc>,
    pub lat: f64,
    pub lon: f64,
    pub altitude: Option<f64>,
    pub speed: Option<f64>,
    /// Direction of travel in degrees relative to due north.
    pub direction: Option<f64>,
    /// Device heading in degrees, when a compass is available.
    pub orientation: Option<f64>,
    pub horizontal_accuracy: f64,
    pub vertical_accuracy: Option<f64>,
    pub speed_accuracy: Option<f64>,
    pub direction_accuracy: Option<f64>,
}

impl LocationRecord {
    /// A fix with only coordinates and horizontal accuracy.
    pub fn new(timestamp: DateTime<Utc>, lat: f64, lon: f64, horizontal_accuracy: f64) -> Self {
        Self {
            timestamp,
            lat,
            lon,
            altitude: None,
            speed: None,
            direction: None,
            orientation: None,
            horizontal_accuracy,
            vertical_accuracy: None,
            speed_accuracy: None,
            direction_accuracy: None,
        }
    }
}

/// Overall LAeq statistics of a measurement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LaeqMetrics {
    pub min: f64,
    /// Energetic mean, `10·log10(mean(10^(L/10)))`.
    pub average: f64,
    pub max: f64,
    pub records_count: u64,
}

impl LaeqMetrics {
    /// Returns `None` when there are no records.
    pub fn from_records(records: &[LeqsRecord]) -> Option<Self> {
        if records.is_empty() {
            return None;
        }
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        let mut energy = 0.0;
        for record in records {
            min = min.min(record.laeq);
            max = max.max(record.laeq);
            energy += 10f64.powf(record.laeq / 10.0);
        }
        Some(Self {
            min,
            average: 10.0 * (energy / records.len() as f64).log10(),
            max,
            records_count: records.len() as u64,
        })
    }
}

/// Information about the running application and the device it runs on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserAgent {
    pub version_name: String,
    pub os_name: String,
    pub os_version: Option<String>,
    pub device_manufacturer: Option<String>,
    pub device_model_name: Option<String>,
}

impl UserAgent {
    /// Snapshot of this build and host; device details are left to the platform.
    pub fn current() -> Self {
        Self {
            version_name: env!("CARGO_PKG_VERSION").to_string(),
            os_name: std::env::consts::OS.to_string(),
            os_version: None,
            device_manufacturer: None,
            device_model_name: None,
        }
    }
}

/// An in-progress measurement, exclusively owned by the recording session.
///
/// Both sequences grow in arrival order and stay time-ordered.
#[derive(Debug, Clone, PartialEq)]
pub struct MutableMeasurement {
    pub uuid: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub location_sequence: Vec<LocationRecord>,
    pub leqs_sequence: Vec<LeqsRecord>,
    pub third_octave_frequencies: Vec<f64>,
    pub recorded_audio_url: Option<String>,
    pub recorded_audio_checksum: Option<String>,
}

impl MutableMeasurement {
    pub fn new(started_at: DateTime<Utc>, third_octave_frequencies: Vec<f64>) -> Self {
        Self {
            uuid: uuid::Uuid::new_v4().to_string(),
            started_at,
            ended_at: None,
            location_sequence: Vec::new(),
            leqs_sequence: Vec::new(),
            third_octave_frequencies,
            recorded_audio_url: None,
            recorded_audio_checksum: None,
        }
    }

    pub fn push_leqs(&mut self, mut record: LeqsRecord) {
        if let Some(last) = self.leqs_sequence.last() {
            if record.timestamp < last.timestamp {
                log::warn!(
                    "leqs record at {} precedes previous record at {}, clamping",
                    record.timestamp,
                    last.timestamp
                );
                record.timestamp = last.timestamp;
            }
        }
        self.leqs_sequence.push(record);
    }

    pub fn push_location(&mut self, mut record: LocationRecord) {
        if let Some(last) = self.location_sequence.last() {
            if record.timestamp < last.timestamp {
                log::warn!(
                    "location fix at {} precedes previous fix at {}, clamping",
                    record.timestamp,
                    last.timestamp
                );
                record.timestamp = last.timestamp;
            }
        }
        self.location_sequence.push(record);
    }

    /// Finalizes the measurement. `ended_at` never precedes `started_at`.
    pub fn freeze(mut self, ended_at: DateTime<Utc>, user_agent: UserAgent) -> Measurement {
        let ended_at = ended_at.max(self.started_at);
        self.ended_at = Some(ended_at);
        let laeq_metrics = LaeqMetrics::from_records(&self.leqs_sequence);
        Measurement {
            uuid: self.uuid,
            started_at: self.started_at,
            ended_at,
            duration_ms: (ended_at - self.started_at).num_milliseconds(),
            user_agent,
            location_sequence: self.location_sequence,
            leqs_sequence: self.leqs_sequence,
            third_octave_frequencies: self.third_octave_frequencies,
            laeq_metrics,
            recorded_audio_url: self.recorded_audio_url,
            recorded_audio_checksum: self.recorded_audio_checksum,
        }
    }
}

/// A completed, immutable measurement handed over to storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Measurement {
    pub uuid: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    /// Duration in milliseconds.
    #[serde(rename = "duration")]
    pub duration_ms: i64,
    pub user_agent: UserAgent,
    pub location_sequence: Vec<LocationRecord>,
    pub leqs_sequence: Vec<LeqsRecord>,
    pub third_octave_frequencies: Vec<f64>,
    pub laeq_metrics: Option<LaeqMetrics>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub recorded_audio_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub recorded_audio_checksum: Option<String>,
}

impl Measurement {
    pub fn duration(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(self.duration_ms)
    }
}
