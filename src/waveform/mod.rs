//! Decimated amplitude envelope: one `(min, max)` pair per 1/75 s block.

mod peaks;

use tracing::{debug, info, warn};

use crate::audio::{AudioError, AudioSource, ProgressFn, max_sample_value, try_alloc_bytes};

/// Per-block envelope of the first channel, used to draw and scale the waveform.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WaveformSummary {
    /// `(min, max)` sample values, one entry per position block.
    pub peaks: Vec<(i32, i32)>,
    /// Largest representable amplitude at the stream's bit depth.
    pub max_sample_value: i32,
    /// Smallest `max - min` spread seen in any block.
    pub min_range: i32,
    /// Largest `max - min` spread seen in any block.
    pub max_range: i32,
    /// Source bytes represented by each entry.
    pub block_size: u32,
    /// First read error met while scanning, if any block was filled in as silence.
    pub read_error: Option<String>,
}

impl WaveformSummary {
    pub fn len(&self) -> usize {
        self.peaks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peaks.is_empty()
    }

    /// Envelope of one block, if it exists.
    pub fn block(&self, index: usize) -> Option<(i32, i32)> {
        self.peaks.get(index).copied()
    }

    /// Whether a block's peak amplitude stays below `fraction` of full scale.
    pub fn is_quiet(&self, index: usize, fraction: f32) -> bool {
        self.block(index).is_some_and(|(min, max)| {
            let peak = min.unsigned_abs().max(max.unsigned_abs()) as f32;
            peak <= self.max_sample_value as f32 * fraction
        })
    }
}

/// Scan the whole stream block by block and build its envelope.
///
/// Progress is reported after every block and forced to `1.0` at the end. The
/// result always holds `ceil(byte_length / block_size)` entries; blocks the
/// source could not deliver are recorded as silence. An undecodable block is
/// skipped and the scan goes on; any other read error ends the scan early.
pub fn summarize(
    source: &mut dyn AudioSource,
    progress: ProgressFn<'_>,
) -> Result<WaveformSummary, AudioError> {
    let info = *source.info();
    let total = usize::try_from(info.block_count())
        .map_err(|_| AudioError::OutOfMemory {
            context: "sizing the waveform summary",
        })?;
    let mut peaks = Vec::new();
    peaks
        .try_reserve_exact(total)
        .map_err(AudioError::out_of_memory("allocating the waveform summary"))?;
    let block_size = info.block_size as usize;
    let mut buf = try_alloc_bytes(block_size, "allocating the waveform read buffer")?;
    let align = info.block_align as usize;

    let mut read_error = None;
    while peaks.len() < total {
        let offset = info.block_to_byte(peaks.len() as u64);
        let read = match read_block(source, &mut buf, offset) {
            Ok(read) => read,
            Err(err) => {
                warn!(offset, "Waveform block unreadable: {err}");
                let fatal = !matches!(err, AudioError::DecodeFailed { .. });
                read_error.get_or_insert_with(|| err.to_string());
                if fatal {
                    break;
                }
                peaks.push((0, 0));
                progress(peaks.len() as f32 / total as f32);
                continue;
            }
        };
        if read == 0 {
            break;
        }
        peaks.push(peaks::first_channel_extremes(
            &buf[..read],
            info.bits_per_sample,
            align,
        ));
        progress(peaks.len() as f32 / total as f32);
        if read < block_size {
            break;
        }
    }
    if peaks.len() < total {
        debug!(
            delivered = peaks.len(),
            expected = total,
            "Stream ended early; padding waveform summary"
        );
        peaks.resize(total, (0, 0));
    }
    progress(1.0);

    let ranges = peaks.iter().map(|(min, max)| max - min);
    let summary = WaveformSummary {
        min_range: ranges.clone().min().unwrap_or(0),
        max_range: ranges.max().unwrap_or(0),
        max_sample_value: max_sample_value(info.bits_per_sample),
        block_size: info.block_size,
        peaks,
        read_error,
    };
    info!(
        path = %source.path().display(),
        blocks = summary.len(),
        "Waveform summary built"
    );
    Ok(summary)
}

fn read_block(
    source: &mut dyn AudioSource,
    buf: &mut [u8],
    offset: u64,
) -> Result<usize, AudioError> {
    let mut filled = 0;
    while filled < buf.len() {
        let read = source.read_frames(&mut buf[filled..], offset + filled as u64)?;
        if read == 0 {
            break;
        }
        filled += read;
    }
    Ok(filled)
}
