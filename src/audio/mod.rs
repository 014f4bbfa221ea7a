//! Format adapters that expose every supported container/codec through one
//! random-access "read N bytes of PCM at byte offset" contract.

mod error;
mod info;
pub mod mpeg;
pub mod ogg;
mod pcm;
mod probe;
pub mod raw;
pub mod wav;

use std::path::Path;

pub use error::AudioError;
pub(crate) use error::try_alloc_bytes;
pub use info::{BLOCKS_PER_SECOND, FormatKind, StreamInfo};
pub use probe::{FormatProbe, open_raw, open_source, registry};
pub(crate) use probe::{detect as detect_format, merge as merge_files};
pub use pcm::{decode_sample, max_sample_value};
pub use raw::ByteOrder;

/// Progress callback invoked with the completed fraction of a long operation.
pub type ProgressFn<'a> = &'a mut dyn FnMut(f32);

/// One open audio stream behind a format-specific adapter.
///
/// Dropping the value closes the underlying file and releases decoder state.
pub trait AudioSource: Send {
    /// Format family of the adapter.
    fn kind(&self) -> FormatKind;

    /// Source file this adapter reads from.
    fn path(&self) -> &Path;

    /// Stream geometry computed when the source was opened.
    fn info(&self) -> &StreamInfo;

    /// Fill `buf` with PCM bytes starting at `byte_offset`.
    ///
    /// Returns the number of bytes written, `0` at end of stream. Repositioning
    /// only happens when `byte_offset` differs from the end of the previous read.
    fn read_frames(&mut self, buf: &mut [u8], byte_offset: u64) -> Result<usize, AudioError>;

    /// Write the byte range `[start, end)` of the stream into a new file.
    ///
    /// `end == 0` means "until end of stream".
    fn write_range(
        &mut self,
        output: &Path,
        start: u64,
        end: u64,
        progress: ProgressFn<'_>,
    ) -> Result<(), AudioError>;

    /// Open an independent handle over the same stream.
    ///
    /// The clone has its own file handle and decode cursor but shares any
    /// immutable index built at open time.
    fn try_clone(&self) -> Result<Box<dyn AudioSource>, AudioError>;
}

/// Resolve the `[start, end)` byte range requested from a stream of `length` bytes.
///
/// `end == 0` selects the end of stream; both bounds are aligned down to
/// whole sample-frames and clamped to the stream length.
pub(crate) fn resolve_range(start: u64, end: u64, length: u64, align: u64) -> (u64, u64) {
    let align = align.max(1);
    let end = if end == 0 { length } else { end.min(length) };
    let start = start.min(end);
    (start - start % align, end - end % align)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_range_treats_zero_end_as_end_of_stream() {
        assert_eq!(resolve_range(8, 0, 100, 4), (8, 100));
    }

    #[test]
    fn resolve_range_aligns_to_frames_and_clamps() {
        assert_eq!(resolve_range(5, 1_000, 98, 4), (4, 96));
        assert_eq!(resolve_range(200, 150, 98, 4), (96, 96));
    }
}
