use crate::audio::decode_sample;

/// Min/max of the first channel across the whole sample-frames in `bytes`.
///
/// Extremes start at zero, so a block of strictly positive samples still
/// reports `min == 0`.
pub(super) fn first_channel_extremes(bytes: &[u8], bits: u16, block_align: usize) -> (i32, i32) {
    let width = usize::from(bits / 8);
    if width == 0 || block_align < width {
        return (0, 0);
    }
    bytes
        .chunks_exact(block_align)
        .map(|frame| decode_sample(&frame[..width], bits))
        .fold((0, 0), |(min, max), sample| (min.min(sample), max.max(sample)))
}
