//! Symphonia-backed decoding of individual MPEG audio frames to 16-bit PCM.

use symphonia::core::audio::{Channels, SampleBuffer};
use symphonia::core::codecs::{
    CODEC_TYPE_MP1, CODEC_TYPE_MP2, CODEC_TYPE_MP3, CodecParameters, Decoder, DecoderOptions,
};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::Packet;

use super::header::{FrameHeader, Layer};

/// Channel layout for a channel count taken straight from the frame header.
pub fn channel_layout(channels: u16) -> Channels {
    match channels {
        1 => Channels::FRONT_LEFT,
        _ => Channels::FRONT_LEFT | Channels::FRONT_RIGHT,
    }
}

/// Stateful frame decoder. Layer III frames depend on their predecessors
/// (bit reservoir and overlap), so callers prime it after every reset.
pub(crate) struct FrameDecoder {
    decoder: Box<dyn Decoder>,
}

impl FrameDecoder {
    pub(crate) fn new(header: &FrameHeader) -> Result<Self, SymphoniaError> {
        let codec = match header.layer {
            Layer::I => CODEC_TYPE_MP1,
            Layer::II => CODEC_TYPE_MP2,
            Layer::III => CODEC_TYPE_MP3,
        };
        let mut params = CodecParameters::new();
        params
            .for_codec(codec)
            .with_sample_rate(header.sample_rate)
            .with_channels(channel_layout(header.channels));
        let decoder = symphonia::default::get_codecs().make(&params, &DecoderOptions::default())?;
        Ok(Self { decoder })
    }

    pub(crate) fn reset(&mut self) {
        self.decoder.reset();
    }

    /// Decode one whole frame and append its interleaved little-endian `i16` samples to `out`.
    pub(crate) fn decode_into(
        &mut self,
        frame: &[u8],
        first_sample: u64,
        samples_per_frame: u32,
        out: &mut Vec<u8>,
    ) -> Result<usize, SymphoniaError> {
        let packet = Packet::new_from_slice(0, first_sample, u64::from(samples_per_frame), frame);
        let decoded = self.decoder.decode(&packet)?;
        if decoded.frames() == 0 {
            return Ok(0);
        }
        let spec = *decoded.spec();
        let mut samples = SampleBuffer::<i16>::new(decoded.capacity() as u64, spec);
        samples.copy_interleaved_ref(decoded);
        let before = out.len();
        for sample in samples.samples() {
            out.extend_from_slice(&sample.to_le_bytes());
        }
        Ok(out.len() - before)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_count_maps_directly_to_layout() {
        assert_eq!(channel_layout(1), Channels::FRONT_LEFT);
        assert_eq!(channel_layout(1).count(), 1);
        assert_eq!(
            channel_layout(2),
            Channels::FRONT_LEFT | Channels::FRONT_RIGHT
        );
        assert_eq!(channel_layout(2).count(), 2);
    }
}
