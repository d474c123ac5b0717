//! Audio sources that need no hardware.

pub mod generator;
pub mod manual;

pub use generator::{Signal, SignalGeneratorSource};
pub use manual::{ManualAudioHandle, ManualAudioSource};
