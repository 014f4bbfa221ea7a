//! Ogg Vorbis adapter.
//!
//! Decoding goes through symphonia's Ogg reader and Vorbis decoder; segments
//! are written by copying whole pages, so no audio is re-encoded.

mod page;

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, info, warn};

use self::page::{FLAG_EOS, OggPage, PageRead, PageReader};
use super::{AudioError, AudioSource, FormatKind, FormatProbe, ProgressFn, StreamInfo};

const DECODED_BITS: u16 = 16;
const TAIL_SCAN_BYTES: u64 = 64 * 1024;
/// Samples decoded ahead of a seek target. Twice the longest Vorbis packet,
/// so the packet holding the target is never the first one after a reset,
/// which only primes the decoder and yields no audio.
const SEEK_PREROLL: u64 = 8_192;

/// Probe/open entry for Ogg Vorbis files.
pub struct OggFormat;

impl FormatProbe for OggFormat {
    fn kind(&self) -> FormatKind {
        FormatKind::Ogg
    }

    fn probe(&self, path: &Path) -> bool {
        let mut magic = [0u8; 4];
        File::open(path)
            .and_then(|mut file| file.read_exact(&mut magic))
            .is_ok()
            && &magic == b"OggS"
    }

    fn open(&self, path: &Path) -> Result<Box<dyn AudioSource>, AudioError> {
        Ok(Box::new(OggSource::open(path)?))
    }
}

/// An open Ogg Vorbis stream decoding to 16-bit interleaved PCM.
pub struct OggSource {
    path: PathBuf,
    info: StreamInfo,
    reader: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    pending: Vec<u8>,
    pending_pos: usize,
    /// Sample-frame reached by the decoder, including `pending`.
    decoded_to: u64,
    cursor: Option<u64>,
}

enum ReadFailure {
    Decode(String),
    Io(std::io::Error),
}

impl From<SymphoniaError> for ReadFailure {
    fn from(err: SymphoniaError) -> Self {
        match err {
            SymphoniaError::IoError(err) => ReadFailure::Io(err),
            other => ReadFailure::Decode(other.to_string()),
        }
    }
}

fn open_reader(path: &Path) -> Result<Box<dyn FormatReader>, AudioError> {
    let file = File::open(path).map_err(|source| AudioError::OpenFailed {
        path: path.to_path_buf(),
        source,
    })?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());
    let mut hint = Hint::new();
    hint.with_extension("ogg");
    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|err| AudioError::invalid(path, format!("Ogg probe failed: {err}")))?;
    Ok(probed.format)
}

impl OggSource {
    pub fn open(path: &Path) -> Result<Self, AudioError> {
        let reader = open_reader(path)?;
        let track = reader
            .default_track()
            .ok_or_else(|| AudioError::invalid(path, "no audio track found"))?;
        let params = track.codec_params.clone();
        let track_id = track.id;
        let decoder = symphonia::default::get_codecs()
            .make(&params, &DecoderOptions::default())
            .map_err(|err| AudioError::Unsupported {
                path: path.to_path_buf(),
                message: format!("no decoder for Ogg stream: {err}"),
            })?;
        let sample_rate = params
            .sample_rate
            .ok_or_else(|| AudioError::invalid(path, "missing sample rate"))?;
        let channels = params
            .channels
            .map(|channels| channels.count() as u16)
            .ok_or_else(|| AudioError::invalid(path, "missing channel layout"))?;

        let total_samples = match last_granule(path)? {
            Some(granule) => granule,
            None => params
                .n_frames
                .ok_or_else(|| AudioError::invalid(path, "stream length unknown"))?,
        };
        let mut info = StreamInfo::new(channels, sample_rate, DECODED_BITS, 0);
        info.byte_length = total_samples * u64::from(info.block_align);
        info!(
            path = %path.display(),
            channels,
            sample_rate,
            total_samples,
            "Opened ogg stream"
        );
        Ok(Self {
            path: path.to_path_buf(),
            info,
            reader,
            decoder,
            track_id,
            pending: Vec::new(),
            pending_pos: 0,
            decoded_to: 0,
            cursor: None,
        })
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
            if !self.decode_next(0)? {
                break;
            }
        }
        self.cursor = Some(byte_offset + filled as u64);
        Ok(filled)
    }

    fn seek(&mut self, byte_offset: u64) -> Result<(), ReadFailure> {
        let target = byte_offset / u64::from(self.info.block_align);
        debug!(byte_offset, target, "Seeking ogg stream");
        let seeked = self.reader.seek(
            SeekMode::Accurate,
            SeekTo::TimeStamp {
                ts: target.saturating_sub(SEEK_PREROLL),
                track_id: self.track_id,
            },
        )?;
        self.decoder.reset();
        self.pending.clear();
        self.pending_pos = 0;
        self.decoded_to = seeked.actual_ts;
        self.decode_next(target)?;
        let within = byte_offset % u64::from(self.info.block_align);
        self.pending_pos = (within as usize).min(self.pending.len());
        Ok(())
    }

    /// Decode one packet into `pending`, dropping samples before `skip_to`.
    fn decode_next(&mut self, skip_to: u64) -> Result<bool, ReadFailure> {
        loop {
            let packet = match self.reader.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(err)) if err.kind() == std::io::ErrorKind::UnexpectedEof => {
                    return Ok(false);
                }
                Err(SymphoniaError::ResetRequired) => return Ok(false),
                Err(err) => return Err(err.into()),
            };
            if packet.track_id() != self.track_id {
                continue;
            }
            let start = packet.ts();
            let decoded = self.decoder.decode(&packet)?;
            let frames = decoded.frames() as u64;
            if frames == 0 {
                continue;
            }
            self.decoded_to = start + frames;
            if self.decoded_to <= skip_to {
                continue;
            }
            let mut samples = SampleBuffer::<i16>::new(decoded.capacity() as u64, *decoded.spec());
            samples.copy_interleaved_ref(decoded);
            let channels = usize::from(self.info.channels);
            let skip = skip_to.saturating_sub(start) as usize * channels;
            self.pending.clear();
            self.pending_pos = 0;
            for sample in samples.samples().iter().skip(skip) {
                self.pending.extend_from_slice(&sample.to_le_bytes());
            }
            return Ok(true);
        }
    }
}

impl AudioSource for OggSource {
    fn kind(&self) -> FormatKind {
        FormatKind::Ogg
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
        copy_pages(&self.path, output, start / align, end / align, progress)
    }

    fn try_clone(&self) -> Result<Box<dyn AudioSource>, AudioError> {
        Ok(Box::new(Self::open(&self.path)?))
    }
}

/// Granule position of the last intact page, read from the tail of the file.
fn last_granule(path: &Path) -> Result<Option<u64>, AudioError> {
    let mut file = File::open(path).map_err(|source| AudioError::OpenFailed {
        path: path.to_path_buf(),
        source,
    })?;
    let length = file
        .metadata()
        .map_err(|source| AudioError::read(path, source))?
        .len();
    for from in [length.saturating_sub(TAIL_SCAN_BYTES), 0] {
        file.seek(SeekFrom::Start(from))
            .map_err(|source| AudioError::read(path, source))?;
        let mut pages = PageReader::new(BufReader::new(&mut file));
        let mut last = None;
        while let Some(read) = pages
            .next_page()
            .map_err(|source| AudioError::read(path, source))?
        {
            if let PageRead::Page(page) = read
                && page.has_granule()
            {
                last = Some(page.granule);
            }
        }
        if last.is_some() || from == 0 {
            return Ok(last);
        }
    }
    Ok(None)
}

/// Copy the pages covering sample-frames `[first, last)` into a new Ogg file.
///
/// Leading header pages (granule 0) are repeated at the start of the output.
/// Damaged pages are skipped; copied pages are renumbered, their granules
/// rebased to the first copied page, and the final page is flagged EOS.
pub(crate) fn copy_pages(
    input: &Path,
    output: &Path,
    first: u64,
    last: u64,
    progress: ProgressFn<'_>,
) -> Result<(), AudioError> {
    debug!(output = %output.display(), first, last, "Writing ogg page range");
    let file = File::open(input).map_err(|source| AudioError::OpenFailed {
        path: input.to_path_buf(),
        source,
    })?;
    let out = File::create(output).map_err(|source| AudioError::write(output, source))?;
    let mut writer = BufWriter::new(out);
    let mut pages = PageReader::new(BufReader::new(file));

    let mut in_headers = true;
    let mut serial = None;
    let mut sequence = 0u32;
    let mut page_start = 0u64;
    let mut base = None;
    let mut held: Option<OggPage> = None;
    let mut damaged = 0usize;
    let span = (last - first).max(1) as f32;

    let emit = |mut page: OggPage, sequence: &mut u32, writer: &mut BufWriter<File>| {
        page.sequence = *sequence;
        page.flags &= !FLAG_EOS;
        *sequence += 1;
        page.write_to(writer)
            .map_err(|source| AudioError::write(output, source))
    };

    while let Some(read) = pages
        .next_page()
        .map_err(|source| AudioError::read(input, source))?
    {
        let page = match read {
            PageRead::Page(page) => page,
            PageRead::Damaged { offset } => {
                warn!(path = %input.display(), offset, "Skipping damaged ogg page");
                damaged += 1;
                continue;
            }
        };
        if *serial.get_or_insert(page.serial) != page.serial {
            continue;
        }
        if in_headers && page.granule == 0 {
            emit(page, &mut sequence, &mut writer)?;
            continue;
        }
        in_headers = false;

        let page_end = if page.has_granule() { page.granule } else { page_start };
        let covered = (page_start, page_end.max(page_start));
        page_start = covered.1;
        if covered.0 >= last && covered.1 > covered.0 {
            break;
        }
        if covered.1 <= first && page.has_granule() {
            continue;
        }
        let base = *base.get_or_insert(covered.0);
        let mut page = page;
        if page.has_granule() {
            page.granule -= base;
        }
        if let Some(previous) = held.replace(page) {
            emit(previous, &mut sequence, &mut writer)?;
        }
        progress((covered.1.min(last).saturating_sub(first)) as f32 / span);
    }
    if let Some(mut final_page) = held {
        final_page.sequence = sequence;
        final_page.flags |= FLAG_EOS;
        final_page
            .write_to(&mut writer)
            .map_err(|source| AudioError::write(output, source))?;
    }
    if damaged > 0 {
        warn!(path = %input.display(), damaged, "Damaged ogg pages were not copied");
    }
    progress(1.0);
    writer
        .flush()
        .map_err(|source| AudioError::write(output, source))
}

/// Concatenate whole Ogg files into one chained stream.
pub(crate) fn merge(output: &Path, inputs: &[PathBuf], progress: ProgressFn<'_>) -> Result<(), AudioError> {
    super::raw::concat(output, inputs, progress)
}

#[cfg(test)]
mod tests {
    use super::page::test_pages::page;
    use super::page::{FLAG_BOS, GRANULE_NONE};
    use super::*;

    fn write_stream(dir: &Path, pages: &[OggPage]) -> PathBuf {
        let path = dir.join("stream.ogg");
        let bytes: Vec<u8> = pages.iter().flat_map(OggPage::to_bytes).collect();
        std::fs::write(&path, bytes).unwrap();
        path
    }

    fn read_pages(path: &Path) -> Vec<OggPage> {
        let mut reader = PageReader::new(BufReader::new(File::open(path).unwrap()));
        let mut pages = Vec::new();
        while let Some(read) = reader.next_page().unwrap() {
            match read {
                PageRead::Page(page) => pages.push(page),
                PageRead::Damaged { offset } => panic!("damaged page at {offset}"),
            }
        }
        pages
    }

    fn sample_stream() -> Vec<OggPage> {
        vec![
            page(0, 0, FLAG_BOS, 30, 1),
            page(1, 0, 0, 200, 2),
            page(2, 1_000, 0, 100, 3),
            page(3, 2_000, 0, 100, 4),
            page(4, GRANULE_NONE, 0, 100, 5),
            page(5, 3_000, 0, 100, 6),
            page(6, 4_000, FLAG_EOS, 100, 7),
        ]
    }

    #[test]
    fn probe_checks_capture_pattern() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_stream(dir.path(), &sample_stream());
        assert!(OggFormat.probe(&path));
        let other = dir.path().join("other.bin");
        std::fs::write(&other, b"RIFF....").unwrap();
        assert!(!OggFormat.probe(&other));
    }

    #[test]
    fn last_granule_comes_from_final_page() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_stream(dir.path(), &sample_stream());
        assert_eq!(last_granule(&path).unwrap(), Some(4_000));
    }

    #[test]
    fn page_copy_keeps_headers_and_rebases_granules() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_stream(dir.path(), &sample_stream());
        let out = dir.path().join("part.ogg");

        copy_pages(&path, &out, 1_500, 2_500, &mut |_| {}).unwrap();
        let pages = read_pages(&out);
        let fills: Vec<u8> = pages.iter().map(|page| page.body[0]).collect();
        // headers, then the pages covering 1000..2000, 2000..2000 (no granule) and 2000..3000
        assert_eq!(fills, vec![1, 2, 4, 5, 6]);
        let sequences: Vec<u32> = pages.iter().map(|page| page.sequence).collect();
        assert_eq!(sequences, vec![0, 1, 2, 3, 4]);
        assert_eq!(pages[2].granule, 1_000);
        assert_eq!(pages[3].granule, GRANULE_NONE);
        assert_eq!(pages[4].granule, 2_000);
        assert!(pages[4].flags & FLAG_EOS != 0);
        assert!(pages[..4].iter().all(|page| page.flags & FLAG_EOS == 0));
    }

    #[test]
    fn page_copy_skips_damaged_pages() {
        let dir = tempfile::tempdir().unwrap();
        let stream = sample_stream();
        let mut bytes: Vec<u8> = Vec::new();
        let mut damaged_at = 0;
        for (index, page) in stream.iter().enumerate() {
            if index == 3 {
                damaged_at = bytes.len() + 40;
            }
            bytes.extend(page.to_bytes());
        }
        bytes[damaged_at] ^= 0x55;
        let path = dir.path().join("damaged.ogg");
        std::fs::write(&path, bytes).unwrap();
        let out = dir.path().join("whole.ogg");

        copy_pages(&path, &out, 0, 4_000, &mut |_| {}).unwrap();
        let fills: Vec<u8> = read_pages(&out).iter().map(|page| page.body[0]).collect();
        assert_eq!(fills, vec![1, 2, 3, 5, 6, 7]);
    }
}
