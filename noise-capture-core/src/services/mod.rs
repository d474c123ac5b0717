pub mod live_audio;
pub mod location;
pub mod permission;

pub use live_audio::LiveAudioService;
pub use location::PushLocationProvider;
pub use permission::{ManualPermissionDelegate, PermissionService, PermissionWatcher};
