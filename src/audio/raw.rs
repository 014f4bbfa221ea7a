//! Headerless PCM (CD-DA images): 44.1 kHz, 16-bit, stereo, caller-chosen byte order.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::pcm::PcmFile;
use super::{AudioError, AudioSource, FormatKind, ProgressFn, StreamInfo};

const RAW_CHANNELS: u16 = 2;
const RAW_SAMPLE_RATE: u32 = 44_100;
const RAW_BITS: u16 = 16;
const COPY_CHUNK_BYTES: usize = 64 * 1024;

/// Byte order of 16-bit samples in a headerless file.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ByteOrder {
    /// Most significant byte first (typical for CD-DA rips).
    #[default]
    BigEndian,
    LittleEndian,
}

/// An open headerless PCM file.
///
/// Reads always produce little-endian samples; written segments keep the
/// source byte order.
pub struct RawSource {
    order: ByteOrder,
    info: StreamInfo,
    file: PcmFile,
}

impl RawSource {
    pub fn open(path: &Path, order: ByteOrder) -> Result<Self, AudioError> {
        let length = std::fs::metadata(path)
            .map_err(|source| AudioError::OpenFailed {
                path: path.to_path_buf(),
                source,
            })?
            .len();
        let mut info = StreamInfo::new(RAW_CHANNELS, RAW_SAMPLE_RATE, RAW_BITS, 0);
        info.byte_length = length - length % u64::from(info.block_align);
        info!(path = %path.display(), ?order, bytes = info.byte_length, "Opened raw pcm");
        Ok(Self {
            order,
            info,
            file: PcmFile::open(path, 0, info.byte_length)?,
        })
    }

    pub fn byte_order(&self) -> ByteOrder {
        self.order
    }
}

impl AudioSource for RawSource {
    fn kind(&self) -> FormatKind {
        FormatKind::Raw
    }

    fn path(&self) -> &Path {
        self.file.path()
    }

    fn info(&self) -> &StreamInfo {
        &self.info
    }

    fn read_frames(&mut self, buf: &mut [u8], byte_offset: u64) -> Result<usize, AudioError> {
        let read = self.file.read_at(buf, byte_offset)?;
        if self.order == ByteOrder::BigEndian {
            let skew = (byte_offset % 2) as usize;
            for pair in buf[skew.min(read)..read].chunks_exact_mut(2) {
                pair.swap(0, 1);
            }
        }
        Ok(read)
    }

    fn write_range(
        &mut self,
        output: &Path,
        start: u64,
        end: u64,
        progress: ProgressFn<'_>,
    ) -> Result<(), AudioError> {
        let (start, end) = super::resolve_range(
            start,
            end,
            self.info.byte_length,
            u64::from(self.info.block_align),
        );
        debug!(output = %output.display(), start, end, "Writing raw range");
        let file = File::create(output).map_err(|source| AudioError::write(output, source))?;
        let mut writer = BufWriter::new(file);
        copy_bytes(&mut self.file, &mut writer, start, end, output, progress)?;
        writer
            .flush()
            .map_err(|source| AudioError::write(output, source))
    }

    fn try_clone(&self) -> Result<Box<dyn AudioSource>, AudioError> {
        Ok(Box::new(Self {
            order: self.order,
            info: self.info,
            file: PcmFile::open(self.file.path(), 0, self.info.byte_length)?,
        }))
    }
}

fn copy_bytes(
    file: &mut PcmFile,
    writer: &mut impl Write,
    start: u64,
    end: u64,
    output: &Path,
    progress: ProgressFn<'_>,
) -> Result<(), AudioError> {
    let mut chunk = super::try_alloc_bytes(COPY_CHUNK_BYTES, "allocating the raw copy buffer")?;
    let total = (end - start).max(1);
    let mut offset = start;
    while offset < end {
        let want = ((end - offset) as usize).min(chunk.len());
        let read = file.read_at(&mut chunk[..want], offset)?;
        if read == 0 {
            break;
        }
        writer
            .write_all(&chunk[..read])
            .map_err(|source| AudioError::write(output, source))?;
        offset += read as u64;
        progress((offset - start) as f32 / total as f32);
    }
    progress(1.0);
    Ok(())
}

/// Byte-concatenate whole files into `output`.
pub(crate) fn concat(output: &Path, inputs: &[PathBuf], progress: ProgressFn<'_>) -> Result<(), AudioError> {
    let file = File::create(output).map_err(|source| AudioError::write(output, source))?;
    let mut writer = BufWriter::new(file);
    let count = inputs.len().max(1) as f32;
    for (index, input) in inputs.iter().enumerate() {
        let length = std::fs::metadata(input)
            .map_err(|source| AudioError::OpenFailed {
                path: input.clone(),
                source,
            })?
            .len();
        let mut file = PcmFile::open(input, 0, length)?;
        let done = index as f32;
        copy_bytes(&mut file, &mut writer, 0, length, output, &mut |fraction| {
            progress((done + fraction) / count)
        })?;
    }
    writer
        .flush()
        .map_err(|source| AudioError::write(output, source))
}
