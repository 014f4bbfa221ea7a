use std::collections::TryReserveError;
use std::path::PathBuf;

use thiserror::Error;

/// Errors produced by format adapters.
#[derive(Debug, Error)]
pub enum AudioError {
    /// No adapter recognized the file; the caller may offer the raw PCM fallback.
    #[error("Unrecognized audio format: {path}")]
    FormatUnrecognized { path: PathBuf },
    /// The underlying file could not be opened.
    #[error("Failed to open {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Reading from an already opened file failed.
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Decoding failed even after reseeking once.
    #[error("Failed to decode {path} at byte {offset}: {message}")]
    DecodeFailed {
        path: PathBuf,
        offset: u64,
        message: String,
    },
    /// An output file could not be created or written.
    #[error("Failed to write {path}: {source}")]
    WriteFailed {
        path: PathBuf,
        source: std::io::Error,
    },
    /// The header or bitstream is structurally broken.
    #[error("Invalid audio stream {path}: {message}")]
    InvalidStream { path: PathBuf, message: String },
    /// The stream is well-formed but uses parameters this engine does not handle.
    #[error("Unsupported audio stream {path}: {message}")]
    Unsupported { path: PathBuf, message: String },
    /// A buffer allocation failed.
    #[error("Out of memory while {context}")]
    OutOfMemory { context: &'static str },
}

impl AudioError {
    pub(crate) fn read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        AudioError::Read {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        AudioError::WriteFailed {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn invalid(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        AudioError::InvalidStream {
            path: path.into(),
            message: message.into(),
        }
    }

    pub(crate) fn out_of_memory(context: &'static str) -> impl FnOnce(TryReserveError) -> Self {
        move |_| AudioError::OutOfMemory { context }
    }
}

/// Allocate a zeroed byte buffer, reporting allocation failure instead of aborting.
pub(crate) fn try_alloc_bytes(len: usize, context: &'static str) -> Result<Vec<u8>, AudioError> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len)
        .map_err(AudioError::out_of_memory(context))?;
    buf.resize(len, 0);
    Ok(buf)
}
