//! MPEG audio frame header decoding.

/// MPEG audio version.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MpegVersion {
    V1,
    V2,
    V25,
}

/// MPEG audio layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Layer {
    I,
    II,
    III,
}

/// Decoded fields of one 32-bit frame header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameHeader {
    pub version: MpegVersion,
    pub layer: Layer,
    pub bitrate_kbps: u32,
    pub sample_rate: u32,
    pub padding: bool,
    pub channels: u16,
}

const BITRATES_V1_L1: [u32; 15] = [0, 32, 64, 96, 128, 160, 192, 224, 256, 288, 320, 352, 384, 416, 448];
const BITRATES_V1_L2: [u32; 15] = [0, 32, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320, 384];
const BITRATES_V1_L3: [u32; 15] = [0, 32, 40, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320];
const BITRATES_V2_L1: [u32; 15] = [0, 32, 48, 56, 64, 80, 96, 112, 128, 144, 160, 176, 192, 224, 256];
const BITRATES_V2_L23: [u32; 15] = [0, 8, 16, 24, 32, 40, 48, 56, 64, 80, 96, 112, 128, 144, 160];

const SYNC_MASK: u32 = 0xffe0_0000;
const EMPHASIS_RESERVED: u32 = 0b10;
const CHANNEL_MODE_MONO: u32 = 0b11;

impl FrameHeader {
    /// Decode a header from a big-endian 32-bit window.
    ///
    /// Returns `None` unless the sync bits are set and no reserved or
    /// unsupported field value is present (free-format bitrate included).
    pub fn parse(word: u32) -> Option<Self> {
        if word & SYNC_MASK != SYNC_MASK {
            return None;
        }
        let version = match (word >> 19) & 0b11 {
            0b00 => MpegVersion::V25,
            0b10 => MpegVersion::V2,
            0b11 => MpegVersion::V1,
            _ => return None,
        };
        let layer = match (word >> 17) & 0b11 {
            0b01 => Layer::III,
            0b10 => Layer::II,
            0b11 => Layer::I,
            _ => return None,
        };
        let bitrate_index = ((word >> 12) & 0b1111) as usize;
        if bitrate_index == 0 || bitrate_index == 0b1111 {
            return None;
        }
        let rate_index = (word >> 10) & 0b11;
        let sample_rate = match (rate_index, version) {
            (0b11, _) => return None,
            (index, MpegVersion::V1) => [44_100, 48_000, 32_000][index as usize],
            (index, MpegVersion::V2) => [22_050, 24_000, 16_000][index as usize],
            (index, MpegVersion::V25) => [11_025, 12_000, 8_000][index as usize],
        };
        if word & 0b11 == EMPHASIS_RESERVED {
            return None;
        }
        let table = match (version, layer) {
            (MpegVersion::V1, Layer::I) => &BITRATES_V1_L1,
            (MpegVersion::V1, Layer::II) => &BITRATES_V1_L2,
            (MpegVersion::V1, Layer::III) => &BITRATES_V1_L3,
            (_, Layer::I) => &BITRATES_V2_L1,
            (_, _) => &BITRATES_V2_L23,
        };
        let channels = if (word >> 6) & 0b11 == CHANNEL_MODE_MONO { 1 } else { 2 };
        Some(Self {
            version,
            layer,
            bitrate_kbps: table[bitrate_index],
            sample_rate,
            padding: (word >> 9) & 1 == 1,
            channels,
        })
    }

    /// Total frame length in bytes, header included.
    pub fn frame_len(&self) -> usize {
        let bitrate = self.bitrate_kbps as usize * 1_000;
        let rate = self.sample_rate as usize;
        let padding = usize::from(self.padding);
        match (self.layer, self.version) {
            (Layer::I, _) => (12 * bitrate / rate + padding) * 4,
            (Layer::II, _) | (Layer::III, MpegVersion::V1) => 144 * bitrate / rate + padding,
            (Layer::III, _) => 72 * bitrate / rate + padding,
        }
    }

    /// Sample-frames decoded from one frame.
    pub fn samples_per_frame(&self) -> u32 {
        match (self.layer, self.version) {
            (Layer::I, _) => 384,
            (Layer::II, _) | (Layer::III, MpegVersion::V1) => 1_152,
            (Layer::III, _) => 576,
        }
    }

    /// Encode the header back into its 32-bit form (CRC off, no private or copyright bits).
    pub fn to_word(&self) -> u32 {
        let version = match self.version {
            MpegVersion::V25 => 0b00,
            MpegVersion::V2 => 0b10,
            MpegVersion::V1 => 0b11,
        };
        let layer = match self.layer {
            Layer::III => 0b01,
            Layer::II => 0b10,
            Layer::I => 0b11,
        };
        let table = match (self.version, self.layer) {
            (MpegVersion::V1, Layer::I) => &BITRATES_V1_L1,
            (MpegVersion::V1, Layer::II) => &BITRATES_V1_L2,
            (MpegVersion::V1, Layer::III) => &BITRATES_V1_L3,
            (_, Layer::I) => &BITRATES_V2_L1,
            (_, _) => &BITRATES_V2_L23,
        };
        let bitrate_index = table
            .iter()
            .position(|&kbps| kbps == self.bitrate_kbps)
            .unwrap_or(0) as u32;
        let rates: [u32; 3] = match self.version {
            MpegVersion::V1 => [44_100, 48_000, 32_000],
            MpegVersion::V2 => [22_050, 24_000, 16_000],
            MpegVersion::V25 => [11_025, 12_000, 8_000],
        };
        let rate_index = rates
            .iter()
            .position(|&rate| rate == self.sample_rate)
            .unwrap_or(0) as u32;
        let mode = if self.channels == 1 { CHANNEL_MODE_MONO } else { 0 };
        SYNC_MASK
            | version << 19
            | layer << 17
            | 1 << 16
            | bitrate_index << 12
            | rate_index << 10
            | u32::from(self.padding) << 9
            | mode << 6
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_common_layer3_header() {
        let header = FrameHeader::parse(0xfffb_9064).unwrap();
        assert_eq!(header.version, MpegVersion::V1);
        assert_eq!(header.layer, Layer::III);
        assert_eq!(header.bitrate_kbps, 128);
        assert_eq!(header.sample_rate, 44_100);
        assert!(!header.padding);
        assert_eq!(header.channels, 2);
        assert_eq!(header.frame_len(), 417);
        assert_eq!(header.samples_per_frame(), 1_152);
    }

    #[test]
    fn padding_adds_one_byte_for_layer3() {
        let header = FrameHeader::parse(0xfffb_9264).unwrap();
        assert!(header.padding);
        assert_eq!(header.frame_len(), 418);
    }

    #[test]
    fn mpeg2_layer3_uses_half_frames() {
        let header = FrameHeader {
            version: MpegVersion::V2,
            layer: Layer::III,
            bitrate_kbps: 64,
            sample_rate: 22_050,
            padding: false,
            channels: 1,
        };
        let parsed = FrameHeader::parse(header.to_word()).unwrap();
        assert_eq!(parsed, header);
        assert_eq!(parsed.samples_per_frame(), 576);
        assert_eq!(parsed.frame_len(), 208);
    }

    #[test]
    fn rejects_reserved_and_free_format_values() {
        assert!(FrameHeader::parse(0x0000_0000).is_none());
        // reserved version
        assert!(FrameHeader::parse(0xffeb_9064).is_none());
        // reserved layer
        assert!(FrameHeader::parse(0xfff9_9064).is_none());
        // free-format bitrate
        assert!(FrameHeader::parse(0xfffb_0064).is_none());
        // bad bitrate
        assert!(FrameHeader::parse(0xfffb_f064).is_none());
        // reserved sample rate
        assert!(FrameHeader::parse(0xfffb_9c64).is_none());
        // reserved emphasis
        assert!(FrameHeader::parse(0xfffb_9066).is_none());
    }

    #[test]
    fn layer1_frames_are_slot_aligned() {
        let header = FrameHeader {
            version: MpegVersion::V1,
            layer: Layer::I,
            bitrate_kbps: 384,
            sample_rate: 48_000,
            padding: true,
            channels: 2,
        };
        assert_eq!(header.frame_len(), 388);
        assert_eq!(header.samples_per_frame(), 384);
    }
}
