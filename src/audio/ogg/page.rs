//! Ogg page framing: parse, checksum and re-serialize physical pages.

use std::io::{self, Read, Write};

use tracing::debug;

const CAPTURE: [u8; 4] = *b"OggS";
const HEADER_LEN: usize = 27;
const CRC_RANGE: std::ops::Range<usize> = 22..26;

#[cfg(test)]
pub(crate) const FLAG_BOS: u8 = 0x02;
pub(crate) const FLAG_EOS: u8 = 0x04;

/// Granule value meaning "no packet finishes on this page".
pub(crate) const GRANULE_NONE: u64 = u64::MAX;

static CRC_TABLE: [u32; 256] = crc_table();

const fn crc_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut index = 0;
    while index < 256 {
        let mut crc = (index as u32) << 24;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 0x8000_0000 != 0 {
                crc << 1 ^ 0x04c1_1db7
            } else {
                crc << 1
            };
            bit += 1;
        }
        table[index] = crc;
        index += 1;
    }
    table
}

/// Ogg page checksum: CRC-32, polynomial 0x04c11db7, zero init, unreflected.
pub(crate) fn crc32(bytes: &[u8]) -> u32 {
    crc_update(0, bytes)
}

fn crc_update(crc: u32, bytes: &[u8]) -> u32 {
    bytes.iter().fold(crc, |crc, &byte| {
        crc << 8 ^ CRC_TABLE[((crc >> 24) as u8 ^ byte) as usize]
    })
}

/// One physical Ogg page.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct OggPage {
    pub flags: u8,
    pub granule: u64,
    pub serial: u32,
    pub sequence: u32,
    pub lacing: Vec<u8>,
    pub body: Vec<u8>,
}

impl OggPage {
    pub(crate) fn has_granule(&self) -> bool {
        self.granule != GRANULE_NONE
    }

    /// Serialize with a freshly computed checksum.
    pub(crate) fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(HEADER_LEN + self.lacing.len() + self.body.len());
        bytes.extend_from_slice(&CAPTURE);
        bytes.push(0);
        bytes.push(self.flags);
        bytes.extend_from_slice(&self.granule.to_le_bytes());
        bytes.extend_from_slice(&self.serial.to_le_bytes());
        bytes.extend_from_slice(&self.sequence.to_le_bytes());
        bytes.extend_from_slice(&[0; 4]);
        bytes.push(self.lacing.len() as u8);
        bytes.extend_from_slice(&self.lacing);
        bytes.extend_from_slice(&self.body);
        let crc = crc32(&bytes);
        bytes[CRC_RANGE].copy_from_slice(&crc.to_le_bytes());
        bytes
    }

    pub(crate) fn write_to(&self, writer: &mut impl Write) -> io::Result<()> {
        writer.write_all(&self.to_bytes())
    }
}

/// Outcome of reading one page.
#[derive(Debug)]
pub(crate) enum PageRead {
    Page(OggPage),
    /// A structurally complete page whose checksum did not match.
    Damaged { offset: u64 },
}

/// Sequential page reader that resynchronizes on the capture pattern.
pub(crate) struct PageReader<R> {
    reader: R,
    position: u64,
}

impl<R: Read> PageReader<R> {
    pub(crate) fn new(reader: R) -> Self {
        Self {
            reader,
            position: 0,
        }
    }

    /// Next page, or `None` at end of stream (a truncated trailing page included).
    pub(crate) fn next_page(&mut self) -> io::Result<Option<PageRead>> {
        let Some(offset) = self.sync()? else {
            return Ok(None);
        };
        let mut header = [0u8; HEADER_LEN];
        header[..4].copy_from_slice(&CAPTURE);
        if !self.fill(&mut header[4..])? {
            return Ok(None);
        }
        let mut lacing = vec![0u8; usize::from(header[26])];
        if !self.fill(&mut lacing)? {
            return Ok(None);
        }
        let body_len = lacing.iter().map(|&len| usize::from(len)).sum();
        let mut body = vec![0u8; body_len];
        if !self.fill(&mut body)? {
            return Ok(None);
        }

        let stored = u32::from_le_bytes([header[22], header[23], header[24], header[25]]);
        header[CRC_RANGE].fill(0);
        let computed = crc_update(crc_update(crc_update(0, &header), &lacing), &body);
        if computed != stored {
            debug!(offset, stored, computed, "Ogg page checksum mismatch");
            return Ok(Some(PageRead::Damaged { offset }));
        }
        Ok(Some(PageRead::Page(OggPage {
            flags: header[5],
            granule: u64::from_le_bytes(header[6..14].try_into().unwrap_or_default()),
            serial: u32::from_le_bytes([header[14], header[15], header[16], header[17]]),
            sequence: u32::from_le_bytes([header[18], header[19], header[20], header[21]]),
            lacing,
            body,
        })))
    }

    /// Advance past the next capture pattern, returning the page's offset.
    fn sync(&mut self) -> io::Result<Option<u64>> {
        let mut window = [0u8; 4];
        let mut filled = 0usize;
        let start = self.position;
        loop {
            let mut byte = [0u8; 1];
            if !self.fill(&mut byte)? {
                return Ok(None);
            }
            window.rotate_left(1);
            window[3] = byte[0];
            filled += 1;
            if filled >= 4 && window == CAPTURE {
                let offset = self.position - 4;
                if offset > start {
                    debug!(offset, skipped = offset - start, "Resynchronized on Ogg page");
                }
                return Ok(Some(offset));
            }
        }
    }

    fn fill(&mut self, buf: &mut [u8]) -> io::Result<bool> {
        match self.reader.read_exact(buf) {
            Ok(()) => {
                self.position += buf.len() as u64;
                Ok(true)
            }
            Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
            Err(err) => Err(err),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::test_pages::page;
    use super::*;
    use std::io::Cursor;

    #[test]
    fn crc_matches_reference_check_value() {
        assert_eq!(crc32(b"123456789"), 0x89a1_897f);
    }

    #[test]
    fn serialized_page_parses_back() {
        let original = page(3, 4_096, FLAG_BOS, 300, 7);
        let bytes = original.to_bytes();
        let mut reader = PageReader::new(Cursor::new(bytes));
        match reader.next_page().unwrap() {
            Some(PageRead::Page(parsed)) => assert_eq!(parsed, original),
            other => panic!("unexpected {other:?}"),
        }
        assert!(reader.next_page().unwrap().is_none());
    }

    #[test]
    fn corrupted_body_is_reported_damaged_and_reading_continues() {
        let mut bytes = page(0, 0, FLAG_BOS, 40, 1).to_bytes();
        let damaged_at = bytes.len();
        bytes.extend(page(1, 100, 0, 40, 2).to_bytes());
        bytes[damaged_at + 40] ^= 0xff;
        bytes.extend(page(2, 200, 0, 40, 3).to_bytes());

        let mut reader = PageReader::new(Cursor::new(bytes));
        assert!(matches!(reader.next_page().unwrap(), Some(PageRead::Page(_))));
        assert!(matches!(
            reader.next_page().unwrap(),
            Some(PageRead::Damaged { offset }) if offset == damaged_at as u64
        ));
        match reader.next_page().unwrap() {
            Some(PageRead::Page(page)) => assert_eq!(page.sequence, 2),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn junk_before_capture_is_skipped() {
        let mut bytes = vec![0x11, 0x22, b'O', b'g'];
        bytes.extend(page(0, 0, 0, 10, 9).to_bytes());
        let mut reader = PageReader::new(Cursor::new(bytes));
        assert!(matches!(reader.next_page().unwrap(), Some(PageRead::Page(_))));
    }
}
