use std::path::Path;

/// Header of a 128 kbps 44.1 kHz stereo MPEG-1 layer III frame.
const HEADER: u32 = 0xfffb_9064;
const PADDED: u32 = HEADER | 1 << 9;

fn frame(header: u32, fill: u8) -> Vec<u8> {
    let len = if header == PADDED { 418 } else { 417 };
    let mut bytes = header.to_be_bytes().to_vec();
    bytes.resize(len, fill);
    bytes
}

/// Contiguous frames alternating padding, each filled with zeros after the header.
pub fn frame_stream(count: usize) -> Vec<u8> {
    (0..count)
        .flat_map(|index| frame(if index % 2 == 1 { PADDED } else { HEADER }, 0))
        .collect()
}

pub fn write_stream(path: &Path, count: usize) -> Vec<u8> {
    let bytes = frame_stream(count);
    std::fs::write(path, &bytes).unwrap();
    bytes
}
