use crate::models::measurement::LocationRecord;
use crate::stream::Broadcast;

/// Platform location collaborator.
///
/// Fixes arrive at the provider's own cadence, unrelated to audio frames.
pub trait LocationProvider: Send + Sync {
    /// Last known fix, if any.
    fn current_location(&self) -> Option<LocationRecord>;

    /// Stream of fixes, published while updates are running.
    fn live_location(&self) -> Broadcast<LocationRecord>;

    fn start_updating_location(&self);

    fn stop_updating_location(&self);

    fn is_updating(&self) -> bool;
}
