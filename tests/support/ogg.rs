/// One Ogg page with a single-segment body of `len` bytes of `fill`.
///
/// The checksum field is left zero; these pages only feed byte-level paths.
pub fn page(serial: u32, sequence: u32, granule: u64, len: u8, fill: u8) -> Vec<u8> {
    let mut bytes = b"OggS".to_vec();
    bytes.push(0);
    bytes.push(if sequence == 0 { 0x02 } else { 0 });
    bytes.extend_from_slice(&granule.to_le_bytes());
    bytes.extend_from_slice(&serial.to_le_bytes());
    bytes.extend_from_slice(&sequence.to_le_bytes());
    bytes.extend_from_slice(&[0; 4]);
    bytes.push(1);
    bytes.push(len);
    bytes.extend(std::iter::repeat_n(fill, usize::from(len)));
    bytes
}

pub fn stream(serial: u32, pages: u32) -> Vec<u8> {
    (0..pages)
        .flat_map(|sequence| page(serial, sequence, u64::from(sequence) * 1_000, 40, sequence as u8))
        .collect()
}
