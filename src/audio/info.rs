use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Number of position blocks per second (the CD sector rate).
pub const BLOCKS_PER_SECOND: u32 = 75;

const BUFFER_BLOCKS: usize = 4;

/// Format family handled by an adapter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FormatKind {
    /// RIFF/WAVE PCM container.
    Wav,
    /// Headerless 16-bit stereo PCM at 44.1 kHz.
    Raw,
    /// MPEG audio layer I/II/III frame stream.
    Mpeg,
    /// Ogg Vorbis stream.
    Ogg,
}

impl FormatKind {
    /// File extension used when the source path carries none.
    pub fn default_extension(self) -> &'static str {
        match self {
            FormatKind::Wav => "wav",
            FormatKind::Raw => "dat",
            FormatKind::Mpeg => "mp3",
            FormatKind::Ogg => "ogg",
        }
    }
}

/// Geometry of an opened stream, fixed for the lifetime of the session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StreamInfo {
    pub channels: u16,
    pub sample_rate: u32,
    pub bits_per_sample: u16,
    /// Bytes per sample-frame across all channels.
    pub block_align: u32,
    /// Bytes per 1/75 s position block.
    pub block_size: u32,
    /// Total PCM payload length in bytes.
    pub byte_length: u64,
    /// Preferred read size for sequential playback.
    pub buffer_size: usize,
}

impl StreamInfo {
    /// Derive the full geometry from the basic stream parameters.
    pub fn new(channels: u16, sample_rate: u32, bits_per_sample: u16, byte_length: u64) -> Self {
        let block_align = u32::from(channels) * u32::from(bits_per_sample / 8);
        let block_size = block_align * (sample_rate / BLOCKS_PER_SECOND);
        Self {
            channels,
            sample_rate,
            bits_per_sample,
            block_align,
            block_size,
            byte_length,
            buffer_size: (block_size as usize).max(1) * BUFFER_BLOCKS,
        }
    }

    /// Number of complete or partial position blocks in the stream.
    pub fn block_count(&self) -> u64 {
        if self.block_size == 0 {
            return 0;
        }
        self.byte_length.div_ceil(u64::from(self.block_size))
    }

    /// Total number of sample-frames.
    pub fn frame_count(&self) -> u64 {
        if self.block_align == 0 {
            return 0;
        }
        self.byte_length / u64::from(self.block_align)
    }

    /// Stream duration derived from the frame count.
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        let frames = self.frame_count();
        let rate = u64::from(self.sample_rate);
        Duration::from_secs(frames / rate)
            + Duration::from_nanos((frames % rate) * 1_000_000_000 / rate)
    }

    /// Byte offset of the given position block.
    pub fn block_to_byte(&self, block: u64) -> u64 {
        block * u64::from(self.block_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cd_geometry_matches_sector_size() {
        let info = StreamInfo::new(2, 44_100, 16, 44_100 * 4 * 10);
        assert_eq!(info.block_align, 4);
        assert_eq!(info.block_size, 2_352);
        assert_eq!(info.block_count(), 750);
        assert_eq!(info.duration(), Duration::from_secs(10));
    }

    #[test]
    fn partial_trailing_block_is_counted() {
        let info = StreamInfo::new(1, 8_000, 8, 1_000);
        assert_eq!(info.block_size, 106);
        assert_eq!(info.block_count(), 10);
    }
}
