pub mod audio_models;
pub mod config;
pub mod error;
pub mod indicators;
pub mod measurement;
pub mod permission;
pub mod state;
