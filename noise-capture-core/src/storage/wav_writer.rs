use std::fs::{self, File};
use std::io::{BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::models::error::StorageError;
use crate::processing::sample_converter::SampleConverter;
use crate::processing::wav_format::{self, WavSpec, WAV_HEADER_SIZE};

/// A finalized audio file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedAudio {
    pub path: PathBuf,
    /// Lowercase hex SHA-256 of the complete file.
    pub checksum: String,
    pub data_bytes: u64,
}

/// Streaming PCM WAV writer.
///
/// ```text
/// [44-byte WAV header, sizes patched on finalize]
/// [raw little-endian PCM data...]
/// ```
pub struct WavFileWriter {
    file_path: PathBuf,
    spec: WavSpec,
    file: BufWriter<File>,
    data_bytes: u64,
}

impl WavFileWriter {
    /// Creates the file (and its directory) and writes a placeholder header.
    pub fn create(file_path: PathBuf, spec: WavSpec) -> Result<Self, StorageError> {
        if let Some(parent) = file_path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| StorageError::Io(format!("failed to create {}: {e}", parent.display())))?;
        }
        let file = File::create(&file_path)
            .map_err(|e| StorageError::Io(format!("failed to create {}: {e}", file_path.display())))?;
        let mut file = BufWriter::new(file);
        file.write_all(&spec.header(0))
            .map_err(|e| StorageError::Io(format!("failed to write WAV header: {e}")))?;

        Ok(Self {
            file_path,
            spec,
            file,
            data_bytes: 0,
        })
    }

    /// Appends normalized samples as 16-bit PCM.
    pub fn write_samples(&mut self, samples: &[f32]) -> Result<(), StorageError> {
        let pcm = SampleConverter::convert_to_int16_pcm(samples);
        self.file
            .write_all(&pcm)
            .map_err(|e| StorageError::Io(format!("write failed: {e}")))?;
        self.data_bytes += pcm.len() as u64;
        Ok(())
    }

    pub fn samples_written(&self) -> u64 {
        self.data_bytes / self.spec.block_align().max(1) as u64
    }

    pub fn spec(&self) -> WavSpec {
        self.spec
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    /// Patches the header sizes, closes the file and checksums it.
    pub fn finalize(self) -> Result<RecordedAudio, StorageError> {
        let Self {
            file_path,
            spec,
            file,
            data_bytes,
        } = self;
        let mut file = file
            .into_inner()
            .map_err(|e| StorageError::Io(format!("flush failed: {}", e.error())))?;

        let data_size = u32::try_from(data_bytes).unwrap_or(u32::MAX);
        let mut header = spec.header(0);
        wav_format::patch_data_size(&mut header, data_size);
        file.seek(SeekFrom::Start(0))
            .and_then(|_| file.write_all(&header[..WAV_HEADER_SIZE]))
            .and_then(|_| file.sync_all())
            .map_err(|e| StorageError::Io(format!("failed to finalize WAV header: {e}")))?;
        drop(file);

        let checksum = sha256_file(&file_path)?;
        log::debug!("audio file {} finalized, {data_bytes} data bytes", file_path.display());
        Ok(RecordedAudio {
            path: file_path,
            checksum,
            data_bytes,
        })
    }
}

/// SHA-256 hex digest of a file, read in chunks.
pub fn sha256_file(path: &Path) -> Result<String, StorageError> {
    let mut file = File::open(path).map_err(|e| StorageError::Io(format!("failed to open for checksum: {e}")))?;
    let mut hasher = Sha256::new();
    let mut chunk = [0u8; 64 * 1024];
    loop {
        let read = file
            .read(&mut chunk)
            .map_err(|e| StorageError::Io(format!("failed to read for checksum: {e}")))?;
        if read == 0 {
            break;
        }
        hasher.update(&chunk[..read]);
    }
    Ok(hex_encode(&hasher.finalize()))
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
