pub mod audio_recorder;
pub mod json_store;
pub mod memory_store;
pub mod wav_writer;

pub use audio_recorder::AudioFileRecorder;
pub use json_store::JsonFileStorage;
pub use memory_store::InMemoryStorage;
pub use wav_writer::{RecordedAudio, WavFileWriter};
