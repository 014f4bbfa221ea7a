//! MPEG audio (layers I-III) adapter.
//!
//! The bitstream carries no usable index, so opening scans every frame once
//! and caches their byte offsets. Reads decode from that cached index; written
//! segments are rebuilt by rescanning the source from the start and copying
//! whole frames verbatim.

mod decode;
pub mod header;
pub mod scan;

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use symphonia::core::errors::Error as SymphoniaError;
use tracing::{debug, info, warn};

use self::decode::FrameDecoder;
use self::header::FrameHeader;
use self::scan::FrameScanner;
use super::{AudioError, AudioSource, FormatKind, FormatProbe, ProgressFn, StreamInfo};

pub use self::decode::channel_layout;

const DECODED_BITS: u16 = 16;
const PRIME_FRAMES: usize = 2;
const PROBE_SCAN_LIMIT: u64 = 64 * 1024;
const PROBE_CONTIGUOUS_FRAMES: usize = 3;

/// Probe/open entry for MPEG audio files.
pub struct MpegFormat;

impl FormatProbe for MpegFormat {
    fn kind(&self) -> FormatKind {
        FormatKind::Mpeg
    }

    /// Accept the file when it starts with a run of contiguous, consistent frames.
    fn probe(&self, path: &Path) -> bool {
        let Ok(file) = File::open(path) else {
            return false;
        };
        let mut scanner = FrameScanner::new(BufReader::new(file));
        let mut first: Option<FrameHeader> = None;
        let mut contiguous = 0;
        while scanner.position() < PROBE_SCAN_LIMIT {
            match scanner.next_frame() {
                Ok(Some(frame)) => {
                    let consistent = first.is_none_or(|header| {
                        header.sample_rate == frame.header.sample_rate
                            && header.layer == frame.header.layer
                    });
                    if frame.gap == 0 && consistent && first.is_some() {
                        contiguous += 1;
                    } else {
                        contiguous = 1;
                        first = Some(frame.header);
                    }
                    if contiguous >= PROBE_CONTIGUOUS_FRAMES {
                        return true;
                    }
                }
                Ok(None) => return first.is_some() && scanner.skipped_bytes() == 0,
                Err(_) => return false,
            }
        }
        false
    }

    fn open(&self, path: &Path) -> Result<Box<dyn AudioSource>, AudioError> {
        Ok(Box::new(MpegSource::open(path)?))
    }
}

#[derive(Clone, Copy, Debug)]
struct FrameEntry {
    offset: u64,
    len: u32,
}

/// Frame positions recovered by the open-time scan; shared between clones.
#[derive(Debug)]
pub struct FrameIndex {
    header: FrameHeader,
    frames: Vec<FrameEntry>,
}

impl FrameIndex {
    fn build(path: &Path) -> Result<Self, AudioError> {
        let file = File::open(path).map_err(|source| AudioError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        let mut scanner = FrameScanner::new(BufReader::new(file));
        let mut header = None;
        let mut frames = Vec::new();
        let mut inconsistent = 0usize;
        while let Some(frame) = scanner
            .next_frame()
            .map_err(|source| AudioError::read(path, source))?
        {
            let first = *header.get_or_insert(frame.header);
            if first.sample_rate != frame.header.sample_rate
                || first.channels != frame.header.channels
                || first.samples_per_frame() != frame.header.samples_per_frame()
            {
                inconsistent += 1;
            }
            frames
                .try_reserve(1)
                .map_err(AudioError::out_of_memory("indexing mpeg frames"))?;
            frames.push(FrameEntry {
                offset: frame.offset,
                len: frame.bytes.len() as u32,
            });
        }
        let header = header.ok_or_else(|| AudioError::invalid(path, "no MPEG audio frames found"))?;
        if inconsistent > 0 {
            warn!(
                path = %path.display(),
                inconsistent,
                "MPEG stream changes parameters mid-stream; positions will drift"
            );
        }
        info!(
            path = %path.display(),
            frames = frames.len(),
            skipped = scanner.skipped_bytes(),
            "Indexed mpeg frames"
        );
        Ok(Self { header, frames })
    }

    /// Number of indexed frames.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    fn samples_per_frame(&self) -> u64 {
        u64::from(self.header.samples_per_frame())
    }
}

enum ReadFailure {
    Decode(String),
    Io(std::io::Error),
}

impl From<std::io::Error> for ReadFailure {
    fn from(err: std::io::Error) -> Self {
        ReadFailure::Io(err)
    }
}

impl From<SymphoniaError> for ReadFailure {
    fn from(err: SymphoniaError) -> Self {
        match err {
            SymphoniaError::IoError(err) => ReadFailure::Io(err),
            other => ReadFailure::Decode(other.to_string()),
        }
    }
}

/// An open MPEG audio file decoding to 16-bit interleaved PCM.
pub struct MpegSource {
    path: PathBuf,
    info: StreamInfo,
    index: Arc<FrameIndex>,
    reader: BufReader<File>,
    reader_pos: Option<u64>,
    decoder: Option<FrameDecoder>,
    next_frame: usize,
    pending: Vec<u8>,
    pending_pos: usize,
    frame_buf: Vec<u8>,
    cursor: Option<u64>,
}

impl MpegSource {
    pub fn open(path: &Path) -> Result<Self, AudioError> {
        let index = Arc::new(FrameIndex::build(path)?);
        Self::with_index(path, index)
    }

    fn with_index(path: &Path, index: Arc<FrameIndex>) -> Result<Self, AudioError> {
        let file = File::open(path).map_err(|source| AudioError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        let header = index.header;
        let mut info = StreamInfo::new(header.channels, header.sample_rate, DECODED_BITS, 0);
        info.byte_length = index.len() as u64 * index.samples_per_frame() * u64::from(info.block_align);
        Ok(Self {
            path: path.to_path_buf(),
            info,
            index,
            reader: BufReader::new(file),
            reader_pos: None,
            decoder: None,
            next_frame: 0,
            pending: Vec::new(),
            pending_pos: 0,
            frame_buf: Vec::new(),
            cursor: None,
        })
    }

    /// Cached frame index shared with clones of this source.
    pub fn frame_index(&self) -> &Arc<FrameIndex> {
        &self.index
    }

    fn read_once(&mut self, buf: &mut [u8], byte_offset: u64) -> Result<usize, ReadFailure> {
        if byte_offset >= self.info.byte_length {
            return Ok(0);
        }
        if self.cursor != Some(byte_offset) {
            self.cursor = None;
            self.seek(byte_offset)?;
        }
        let wanted = (self.info.byte_length - byte_offset).min(buf.len() as u64) as usize;
        let mut filled = 0;
        while filled < wanted {
            if self.pending_pos < self.pending.len() {
                let take = (self.pending.len() - self.pending_pos).min(wanted - filled);
                buf[filled..filled + take]
                    .copy_from_slice(&self.pending[self.pending_pos..self.pending_pos + take]);
                self.pending_pos += take;
                filled += take;
                continue;
            }
            if self.next_frame >= self.index.len() {
                break;
            }
            self.pending.clear();
            self.pending_pos = 0;
            let index = self.next_frame;
            self.next_frame += 1;
            self.decode_frame(index, true)?;
        }
        self.cursor = Some(byte_offset + filled as u64);
        Ok(filled)
    }

    /// Reposition so the next decoded byte is `byte_offset`.
    fn seek(&mut self, byte_offset: u64) -> Result<(), ReadFailure> {
        let align = u64::from(self.info.block_align);
        let frame_bytes = self.index.samples_per_frame() * align;
        let target = (byte_offset / frame_bytes) as usize;
        debug!(byte_offset, frame = target, "Seeking mpeg stream");
        if let Some(decoder) = self.decoder.as_mut() {
            decoder.reset();
        }
        self.pending.clear();
        self.pending_pos = 0;
        for index in target.saturating_sub(PRIME_FRAMES)..target {
            match self.decode_frame(index, false) {
                Ok(()) => {}
                Err(ReadFailure::Decode(message)) => {
                    debug!(frame = index, %message, "Ignoring decode error while priming");
                }
                Err(failure) => return Err(failure),
            }
        }
        self.pending.clear();
        self.next_frame = target;
        if target < self.index.len() {
            self.next_frame += 1;
            self.decode_frame(target, true)?;
            let within = (byte_offset - target as u64 * frame_bytes) as usize;
            self.pending_pos = within.min(self.pending.len());
        }
        Ok(())
    }

    fn decode_frame(&mut self, index: usize, keep: bool) -> Result<(), ReadFailure> {
        let entry = self.index.frames[index];
        if self.reader_pos != Some(entry.offset) {
            self.reader.seek(SeekFrom::Start(entry.offset))?;
        }
        self.reader_pos = None;
        self.frame_buf.resize(entry.len as usize, 0);
        self.reader.read_exact(&mut self.frame_buf)?;
        self.reader_pos = Some(entry.offset + u64::from(entry.len));

        if self.decoder.is_none() {
            self.decoder = Some(FrameDecoder::new(&self.index.header)?);
        }
        let Some(decoder) = self.decoder.as_mut() else {
            return Ok(());
        };
        let first_sample = index as u64 * self.index.samples_per_frame();
        let spf = self.index.header.samples_per_frame();
        if keep {
            let produced = decoder.decode_into(&self.frame_buf, first_sample, spf, &mut self.pending)?;
            let expected = self.index.samples_per_frame() as usize * self.info.block_align as usize;
            if produced < expected {
                self.pending.resize(self.pending.len() + expected - produced, 0);
            } else if produced > expected {
                self.pending.truncate(self.pending.len() - (produced - expected));
            }
        } else {
            let mut scratch = Vec::new();
            decoder.decode_into(&self.frame_buf, first_sample, spf, &mut scratch)?;
        }
        Ok(())
    }
}

impl AudioSource for MpegSource {
    fn kind(&self) -> FormatKind {
        FormatKind::Mpeg
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn info(&self) -> &StreamInfo {
        &self.info
    }

    fn read_frames(&mut self, buf: &mut [u8], byte_offset: u64) -> Result<usize, AudioError> {
        let failure = match self.read_once(buf, byte_offset) {
            Ok(read) => return Ok(read),
            Err(ReadFailure::Io(source)) => return Err(AudioError::read(&self.path, source)),
            Err(ReadFailure::Decode(message)) => message,
        };
        warn!(path = %self.path.display(), byte_offset, %failure, "Decode failed; reseeking once");
        self.cursor = None;
        self.decoder = None;
        match self.read_once(buf, byte_offset) {
            Ok(read) => Ok(read),
            Err(ReadFailure::Io(source)) => Err(AudioError::read(&self.path, source)),
            Err(ReadFailure::Decode(message)) => Err(AudioError::DecodeFailed {
                path: self.path.clone(),
                offset: byte_offset,
                message,
            }),
        }
    }

    fn write_range(
        &mut self,
        output: &Path,
        start: u64,
        end: u64,
        progress: ProgressFn<'_>,
    ) -> Result<(), AudioError> {
        let align = u64::from(self.info.block_align);
        let (start, end) = super::resolve_range(start, end, self.info.byte_length, align);
        let (first, last) = (start / align, end / align);
        debug!(output = %output.display(), first, last, "Writing mpeg frame range");

        let file = File::open(&self.path).map_err(|source| AudioError::OpenFailed {
            path: self.path.clone(),
            source,
        })?;
        let out = File::create(output).map_err(|source| AudioError::write(output, source))?;
        let mut writer = BufWriter::new(out);
        let span = (last - first).max(1) as f32;
        for frame in FrameScanner::new(BufReader::new(file)) {
            let frame = frame.map_err(|source| AudioError::read(&self.path, source))?;
            let range = frame.sample_range();
            if range.start >= last {
                break;
            }
            if range.end <= first {
                continue;
            }
            writer
                .write_all(&frame.bytes)
                .map_err(|source| AudioError::write(output, source))?;
            progress((range.end.min(last) - first) as f32 / span);
        }
        progress(1.0);
        writer
            .flush()
            .map_err(|source| AudioError::write(output, source))
    }

    fn try_clone(&self) -> Result<Box<dyn AudioSource>, AudioError> {
        Ok(Box::new(Self::with_index(&self.path, Arc::clone(&self.index))?))
    }
}

/// Concatenate the frames of every input into `output`, dropping tags and junk.
pub(crate) fn merge(output: &Path, inputs: &[PathBuf], progress: ProgressFn<'_>) -> Result<(), AudioError> {
    let out = File::create(output).map_err(|source| AudioError::write(output, source))?;
    let mut writer = BufWriter::new(out);
    let count = inputs.len().max(1) as f32;
    for (index, input) in inputs.iter().enumerate() {
        let file = File::open(input).map_err(|source| AudioError::OpenFailed {
            path: input.clone(),
            source,
        })?;
        for frame in FrameScanner::new(BufReader::new(file)) {
            let frame = frame.map_err(|source| AudioError::read(input, source))?;
            writer
                .write_all(&frame.bytes)
                .map_err(|source| AudioError::write(output, source))?;
        }
        progress((index + 1) as f32 / count);
    }
    writer
        .flush()
        .map_err(|source| AudioError::write(output, source))
}
