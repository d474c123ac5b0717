//! Push-based fan-out primitives connecting the services.
//!
//! [`Broadcast`] carries event streams (indicator frames, locations) to any
//! number of subscribers. [`Watch`] holds observable state (`is_running`,
//! recording state, duration, permission state).

pub mod broadcast;
pub mod watch;

pub use broadcast::{Broadcast, ObserverHandle, Subscription};
pub use watch::{Watch, WatchReceiver};
