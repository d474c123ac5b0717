use crate::models::error::RecordingError;
use crate::models::measurement::Measurement;
use crate::models::state::RecordingState;

/// Event delegate for recording session notifications.
///
/// Called from the thread performing the transition. Implementations should
/// marshal to a UI thread if needed.
pub trait RecordingDelegate: Send + Sync {
    fn on_state_changed(&self, state: RecordingState);

    /// Called for failures that do not abort the transition in progress,
    /// such as a failed storage hand-off on stop.
    fn on_error(&self, error: &RecordingError);

    /// Called after the measurement was handed to storage successfully.
    fn on_measurement_saved(&self, measurement: &Measurement);
}
