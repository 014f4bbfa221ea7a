//! Frame-sync scanning over an MPEG audio bitstream.
//!
//! Frames are located by a sliding 32-bit window rather than an index. Once a
//! header is recognized the scanner consumes exactly the computed frame size,
//! so consecutive frames are assumed contiguous; bytes between frames are
//! counted as skipped non-frame data. Restarting requires a fresh scanner
//! over a stream rewound to position 0.

use std::io::{self, BufRead, Read};
use std::ops::Range;

use tracing::debug;

use super::header::FrameHeader;

const ID3V2_HEADER_LEN: usize = 10;
const ID3V2_FOOTER_FLAG: u8 = 0x10;

/// One complete frame with its position in the byte stream and the sample timeline.
#[derive(Clone, Debug)]
pub struct Frame {
    pub header: FrameHeader,
    /// Byte offset of the header within the stream.
    pub offset: u64,
    /// Number of non-frame bytes skipped since the previous frame.
    pub gap: u64,
    /// Index of the first sample-frame this frame decodes to.
    pub first_sample: u64,
    /// The whole frame, header included.
    pub bytes: Vec<u8>,
}

impl Frame {
    /// Sample-frames covered by this frame.
    pub fn sample_range(&self) -> Range<u64> {
        self.first_sample..self.first_sample + u64::from(self.header.samples_per_frame())
    }
}

/// Lazy sequence of frames read from the start of a bitstream.
pub struct FrameScanner<R> {
    reader: R,
    position: u64,
    last_frame_end: u64,
    next_sample: u64,
    skipped_total: u64,
    started: bool,
    finished: bool,
}

impl<R: BufRead> FrameScanner<R> {
    /// Wrap a reader positioned at the start of the stream.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            position: 0,
            last_frame_end: 0,
            next_sample: 0,
            skipped_total: 0,
            started: false,
            finished: false,
        }
    }

    /// Bytes consumed so far.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Total non-frame bytes skipped so far (tags excluded).
    pub fn skipped_bytes(&self) -> u64 {
        self.skipped_total
    }

    /// Return the next frame, or `None` at end of stream or on a truncated final frame.
    pub fn next_frame(&mut self) -> io::Result<Option<Frame>> {
        if self.finished {
            return Ok(None);
        }
        if !self.started {
            self.started = true;
            self.skip_id3v2()?;
        }
        let mut window: u32 = 0;
        let mut filled = 0u8;
        loop {
            let Some(byte) = self.read_byte()? else {
                self.finish();
                return Ok(None);
            };
            window = window << 8 | u32::from(byte);
            filled = filled.saturating_add(1);
            if filled < 4 {
                continue;
            }
            let Some(header) = FrameHeader::parse(window) else {
                continue;
            };
            let offset = self.position - 4;
            let gap = offset - self.last_frame_end;
            if gap > 0 {
                debug!(offset, gap, "Skipped non-frame data before MPEG frame");
                self.skipped_total += gap;
            }
            let len = header.frame_len();
            let mut bytes = Vec::with_capacity(len);
            bytes.extend_from_slice(&window.to_be_bytes());
            bytes.resize(len, 0);
            if let Err(err) = self.reader.read_exact(&mut bytes[4..]) {
                if err.kind() == io::ErrorKind::UnexpectedEof {
                    debug!(offset, len, "Truncated final MPEG frame dropped");
                    self.finished = true;
                    return Ok(None);
                }
                return Err(err);
            }
            self.position += (len - 4) as u64;
            self.last_frame_end = self.position;
            let first_sample = self.next_sample;
            self.next_sample += u64::from(header.samples_per_frame());
            return Ok(Some(Frame {
                header,
                offset,
                gap,
                first_sample,
                bytes,
            }));
        }
    }

    fn read_byte(&mut self) -> io::Result<Option<u8>> {
        let mut byte = [0u8; 1];
        loop {
            match self.reader.read(&mut byte) {
                Ok(0) => return Ok(None),
                Ok(_) => {
                    self.position += 1;
                    return Ok(Some(byte[0]));
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            }
        }
    }

    fn skip_id3v2(&mut self) -> io::Result<()> {
        let buffered = self.reader.fill_buf()?;
        if buffered.len() < ID3V2_HEADER_LEN || &buffered[..3] != b"ID3" {
            return Ok(());
        }
        let size = buffered[6..10]
            .iter()
            .fold(0u64, |acc, &byte| acc << 7 | u64::from(byte & 0x7f));
        let footer = if buffered[5] & ID3V2_FOOTER_FLAG != 0 {
            ID3V2_HEADER_LEN as u64
        } else {
            0
        };
        let tag_len = ID3V2_HEADER_LEN as u64 + size + footer;
        let skipped = io::copy(&mut (&mut self.reader).take(tag_len), &mut io::sink())?;
        debug!(tag_len, "Skipped ID3v2 tag");
        self.position += skipped;
        self.last_frame_end = self.position;
        Ok(())
    }

    fn finish(&mut self) {
        self.finished = true;
        let trailing = self.position - self.last_frame_end;
        if trailing > 0 {
            debug!(trailing, "Trailing non-frame data after last MPEG frame");
            self.skipped_total += trailing;
        }
    }
}

impl<R: BufRead> Iterator for FrameScanner<R> {
    type Item = io::Result<Frame>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_frame().transpose()
    }
}

#[cfg(test)]
pub(crate) mod test_stream {
    use super::super::header::{FrameHeader, Layer, MpegVersion};

    /// A 128 kbps 44.1 kHz stereo layer III header without padding.
    pub(crate) fn layer3_header(padding: bool) -> FrameHeader {
        FrameHeader {
            version: MpegVersion::V1,
            layer: Layer::III,
            bitrate_kbps: 128,
            sample_rate: 44_100,
            padding,
            channels: 2,
        }
    }

    /// Build one frame whose payload bytes are all `fill`.
    pub(crate) fn frame(header: FrameHeader, fill: u8) -> Vec<u8> {
        let mut bytes = header.to_word().to_be_bytes().to_vec();
        bytes.resize(header.frame_len(), fill);
        bytes
    }

    /// Build a contiguous stream of `count` silent frames, alternating padding.
    pub(crate) fn stream(count: usize) -> Vec<u8> {
        (0..count)
            .flat_map(|index| frame(layer3_header(index % 2 == 1), 0))
            .collect()
    }

    /// Like [`stream`], but frame `damaged` carries an undecodable payload.
    pub(crate) fn damaged_stream(count: usize, damaged: usize) -> Vec<u8> {
        (0..count)
            .flat_map(|index| {
                let fill = if index == damaged { 0xab } else { 0 };
                frame(layer3_header(index % 2 == 1), fill)
            })
            .collect()
    }
}
