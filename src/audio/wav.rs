//! RIFF/WAVE adapter. Headers are parsed and synthesized through `hound`;
//! the sample payload is addressed directly by byte offset.

use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::{Path, PathBuf};

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use tracing::{debug, info};

use super::pcm::{PcmFile, decode_sample, is_supported_width};
use super::{AudioError, AudioSource, FormatKind, FormatProbe, ProgressFn, StreamInfo};

const COPY_CHUNK_BYTES: usize = 64 * 1024;

/// Probe/open entry for WAV files.
pub struct WavFormat;

impl FormatProbe for WavFormat {
    fn kind(&self) -> FormatKind {
        FormatKind::Wav
    }

    fn probe(&self, path: &Path) -> bool {
        let mut header = [0u8; 12];
        File::open(path)
            .and_then(|mut file| file.read_exact(&mut header))
            .is_ok()
            && &header[0..4] == b"RIFF"
            && &header[8..12] == b"WAVE"
    }

    fn open(&self, path: &Path) -> Result<Box<dyn AudioSource>, AudioError> {
        Ok(Box::new(WavSource::open(path)?))
    }
}

/// An open WAV file.
pub struct WavSource {
    spec: WavSpec,
    info: StreamInfo,
    file: PcmFile,
}

impl WavSource {
    pub fn open(path: &Path) -> Result<Self, AudioError> {
        let file = File::open(path).map_err(|source| AudioError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        let reader = WavReader::new(BufReader::new(file))
            .map_err(|err| AudioError::invalid(path, err.to_string()))?;
        let spec = reader.spec();
        validate_spec(path, &spec)?;
        let frames = u64::from(reader.duration());
        let mut inner = reader.into_inner();
        let data_offset = inner
            .stream_position()
            .map_err(|source| AudioError::read(path, source))?;

        let block_align = u64::from(spec.channels) * u64::from(spec.bits_per_sample / 8);
        let info = StreamInfo::new(
            spec.channels,
            spec.sample_rate,
            spec.bits_per_sample,
            frames * block_align,
        );
        info!(
            path = %path.display(),
            channels = spec.channels,
            sample_rate = spec.sample_rate,
            bits = spec.bits_per_sample,
            bytes = info.byte_length,
            "Opened wav"
        );
        Ok(Self {
            spec,
            info,
            file: PcmFile::open(path, data_offset, info.byte_length)?,
        })
    }
}

fn validate_spec(path: &Path, spec: &WavSpec) -> Result<(), AudioError> {
    if spec.sample_format != SampleFormat::Int || !is_supported_width(spec.bits_per_sample) {
        return Err(AudioError::Unsupported {
            path: path.to_path_buf(),
            message: format!(
                "{:?} samples at {} bits",
                spec.sample_format, spec.bits_per_sample
            ),
        });
    }
    if spec.channels == 0 || spec.sample_rate == 0 {
        return Err(AudioError::invalid(path, "zero channels or sample rate"));
    }
    Ok(())
}

impl AudioSource for WavSource {
    fn kind(&self) -> FormatKind {
        FormatKind::Wav
    }

    fn path(&self) -> &Path {
        self.file.path()
    }

    fn info(&self) -> &StreamInfo {
        &self.info
    }

    fn read_frames(&mut self, buf: &mut [u8], byte_offset: u64) -> Result<usize, AudioError> {
        self.file.read_at(buf, byte_offset)
    }

    fn write_range(
        &mut self,
        output: &Path,
        start: u64,
        end: u64,
        progress: ProgressFn<'_>,
    ) -> Result<(), AudioError> {
        let (start, end) = super::resolve_range(
            start,
            end,
            self.info.byte_length,
            u64::from(self.info.block_align),
        );
        debug!(output = %output.display(), start, end, "Writing wav range");
        let mut writer = WavWriter::create(output, self.spec).map_err(|err| hound_error(output, err))?;
        copy_samples(&mut self.file, &mut writer, self.spec.bits_per_sample, start, end, output, progress)?;
        writer.finalize().map_err(|err| hound_error(output, err))
    }

    fn try_clone(&self) -> Result<Box<dyn AudioSource>, AudioError> {
        Ok(Box::new(Self {
            spec: self.spec,
            info: self.info,
            file: PcmFile::open(self.file.path(), self.file.data_offset(), self.file.length())?,
        }))
    }
}

/// Re-encode the payload bytes `[start, end)` of `file` as samples through `writer`.
fn copy_samples<W: std::io::Write + Seek>(
    file: &mut PcmFile,
    writer: &mut WavWriter<W>,
    bits: u16,
    start: u64,
    end: u64,
    output: &Path,
    progress: ProgressFn<'_>,
) -> Result<(), AudioError> {
    let width = usize::from(bits / 8).max(1);
    let chunk_len = COPY_CHUNK_BYTES - COPY_CHUNK_BYTES % width;
    let mut chunk = super::try_alloc_bytes(chunk_len, "allocating the wav copy buffer")?;
    let total = end - start;
    let mut offset = start;
    while offset < end {
        let want = ((end - offset) as usize).min(chunk_len);
        let read = file.read_at(&mut chunk[..want], offset)?;
        if read == 0 {
            break;
        }
        for sample in chunk[..read - read % width].chunks_exact(width) {
            writer
                .write_sample(decode_sample(sample, bits))
                .map_err(|err| hound_error(output, err))?;
        }
        offset += read as u64;
        progress((offset - start) as f32 / total.max(1) as f32);
    }
    progress(1.0);
    Ok(())
}

/// Concatenate the sample payloads of `inputs` into one WAV file at `output`.
///
/// Every input must share the first input's channel count, rate and width.
pub(crate) fn merge(output: &Path, inputs: &[PathBuf], progress: ProgressFn<'_>) -> Result<(), AudioError> {
    let Some(first) = inputs.first() else {
        return Ok(());
    };
    let spec = WavSource::open(first)?.spec;
    let mut writer = WavWriter::create(output, spec).map_err(|err| hound_error(output, err))?;
    for (index, input) in inputs.iter().enumerate() {
        let mut source = WavSource::open(input)?;
        if source.spec != spec {
            return Err(AudioError::invalid(
                input,
                format!("format {:?} does not match {:?}", source.spec, spec),
            ));
        }
        let length = source.info.byte_length;
        let done = index as f32;
        let count = inputs.len() as f32;
        copy_samples(
            &mut source.file,
            &mut writer,
            spec.bits_per_sample,
            0,
            length,
            output,
            &mut |fraction| progress((done + fraction) / count),
        )?;
    }
    writer.finalize().map_err(|err| hound_error(output, err))
}

fn hound_error(path: &Path, err: hound::Error) -> AudioError {
    match err {
        hound::Error::IoError(source) => AudioError::write(path, source),
        other => AudioError::write(path, std::io::Error::other(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_wav(path: &Path, spec: WavSpec, samples: &[i32]) {
        let mut writer = WavWriter::create(path, spec).unwrap();
        for &sample in samples {
            writer.write_sample(sample).unwrap();
        }
        writer.finalize().unwrap();
    }

    fn spec(channels: u16, bits: u16) -> WavSpec {
        WavSpec {
            channels,
            sample_rate: 8_000,
            bits_per_sample: bits,
            sample_format: SampleFormat::Int,
        }
    }

    #[test]
    fn probe_matches_riff_wave_only() {
        let dir = tempfile::tempdir().unwrap();
        let wav = dir.path().join("a.wav");
        write_wav(&wav, spec(1, 16), &[0, 1, 2]);
        let junk = dir.path().join("b.wav");
        std::fs::write(&junk, b"not a riff file at all").unwrap();

        assert!(WavFormat.probe(&wav));
        assert!(!WavFormat.probe(&junk));
    }

    #[test]
    fn open_reports_payload_geometry() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.wav");
        write_wav(&path, spec(2, 24), &[0; 20]);

        let source = WavSource::open(&path).unwrap();
        let info = source.info();
        assert_eq!(info.block_align, 6);
        assert_eq!(info.byte_length, 60);
        assert_eq!(info.block_size, 6 * 106);
    }

    #[test]
    fn rejects_float_samples() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.wav");
        let float_spec = WavSpec {
            channels: 1,
            sample_rate: 8_000,
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        };
        let mut writer = WavWriter::create(&path, float_spec).unwrap();
        writer.write_sample(0.5f32).unwrap();
        writer.finalize().unwrap();

        assert!(matches!(
            WavSource::open(&path),
            Err(AudioError::Unsupported { .. })
        ));
    }

    #[test]
    fn reads_raw_payload_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.wav");
        write_wav(&path, spec(1, 16), &[1, -2, 3]);

        let mut source = WavSource::open(&path).unwrap();
        let mut buf = [0u8; 16];
        let read = source.read_frames(&mut buf, 2).unwrap();
        assert_eq!(read, 4);
        assert_eq!(&buf[..4], &[0xfe, 0xff, 0x03, 0x00]);
    }

    #[test]
    fn write_range_preserves_8bit_samples() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.wav");
        write_wav(&path, spec(1, 8), &[-128, -1, 0, 1, 127]);
        let out = dir.path().join("out.wav");

        let mut source = WavSource::open(&path).unwrap();
        source.write_range(&out, 1, 4, &mut |_| {}).unwrap();

        let mut reader = WavReader::open(&out).unwrap();
        let samples: Vec<i32> = reader.samples::<i32>().map(Result::unwrap).collect();
        assert_eq!(samples, vec![-1, 0, 1]);
    }

    #[test]
    fn merge_rejects_mismatched_inputs() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.wav");
        let b = dir.path().join("b.wav");
        write_wav(&a, spec(1, 16), &[1, 2]);
        write_wav(&b, spec(2, 16), &[3, 4]);

        let err = merge(&dir.path().join("m.wav"), &[a, b], &mut |_| {}).unwrap_err();
        assert!(matches!(err, AudioError::InvalidStream { .. }));
    }
}
