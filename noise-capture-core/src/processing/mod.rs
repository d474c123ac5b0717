pub mod buffer_chunker;
pub mod buffer_queue;
pub mod filter_bank;
pub mod indicators;
pub mod level_decay;
pub mod sample_converter;
pub mod spectrum;
pub mod wav_format;
pub mod weighting;
