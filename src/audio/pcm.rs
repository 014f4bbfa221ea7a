//! Little-endian integer PCM sample helpers shared by the adapters and the summarizer.

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use super::AudioError;

/// Decode one little-endian sample of `bits` width from the front of `bytes`.
///
/// 8-bit samples are unsigned on disk and are recentred around zero.
/// Returns `0` when `bytes` is too short or the width is unsupported.
pub fn decode_sample(bytes: &[u8], bits: u16) -> i32 {
    match (bits, bytes) {
        (8, [b0, ..]) => i32::from(*b0) - 128,
        (16, [b0, b1, ..]) => i32::from(i16::from_le_bytes([*b0, *b1])),
        (24, [b0, b1, b2, ..]) => i32::from_le_bytes([0, *b0, *b1, *b2]) >> 8,
        (32, [b0, b1, b2, b3, ..]) => i32::from_le_bytes([*b0, *b1, *b2, *b3]),
        _ => 0,
    }
}

/// Largest positive amplitude representable at the given bit depth.
pub fn max_sample_value(bits: u16) -> i32 {
    match bits {
        0 => 0,
        1..=31 => (1i32 << (bits - 1)) - 1,
        _ => i32::MAX,
    }
}

pub(crate) fn is_supported_width(bits: u16) -> bool {
    matches!(bits, 8 | 16 | 24)
}

/// Byte-addressable PCM payload inside a file, read through a lazily repositioned cursor.
pub(crate) struct PcmFile {
    path: PathBuf,
    reader: BufReader<File>,
    data_offset: u64,
    length: u64,
    cursor: Option<u64>,
}

impl PcmFile {
    pub(crate) fn open(path: &Path, data_offset: u64, length: u64) -> Result<Self, AudioError> {
        let file = File::open(path).map_err(|source| AudioError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self {
            path: path.to_path_buf(),
            reader: BufReader::new(file),
            data_offset,
            length,
            cursor: None,
        })
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn data_offset(&self) -> u64 {
        self.data_offset
    }

    pub(crate) fn length(&self) -> u64 {
        self.length
    }

    /// Read payload bytes at `offset`, returning fewer bytes only at end of payload.
    pub(crate) fn read_at(&mut self, buf: &mut [u8], offset: u64) -> Result<usize, AudioError> {
        if offset >= self.length {
            return Ok(0);
        }
        if self.cursor != Some(offset) {
            self.reader
                .seek(SeekFrom::Start(self.data_offset + offset))
                .map_err(|source| AudioError::read(&self.path, source))?;
        }
        let wanted = (self.length - offset).min(buf.len() as u64) as usize;
        let mut filled = 0;
        while filled < wanted {
            match self.reader.read(&mut buf[filled..wanted]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(source) => {
                    self.cursor = None;
                    return Err(AudioError::read(&self.path, source));
                }
            }
        }
        self.cursor = Some(offset + filled as u64);
        Ok(filled)
    }
}
