use std::fs::File;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::mpeg::MpegFormat;
use super::ogg::OggFormat;
use super::raw::{ByteOrder, RawSource};
use super::wav::WavFormat;
use super::{AudioError, AudioSource, FormatKind, ProgressFn};

/// Detection and opening for one format family.
pub trait FormatProbe: Send + Sync {
    fn kind(&self) -> FormatKind;

    /// Cheap signature check; must not fail loudly on foreign files.
    fn probe(&self, path: &Path) -> bool;

    fn open(&self, path: &Path) -> Result<Box<dyn AudioSource>, AudioError>;
}

static WAV: WavFormat = WavFormat;
static OGG: OggFormat = OggFormat;
static MPEG: MpegFormat = MpegFormat;

/// Probes in priority order: headered containers first, frame-sync scanning last.
pub fn registry() -> [&'static dyn FormatProbe; 3] {
    [&WAV, &OGG, &MPEG]
}

/// Open `path` with the first adapter whose probe matches.
///
/// Returns [`AudioError::FormatUnrecognized`] when nothing matches; the caller
/// then decides whether to retry through [`open_raw`].
pub fn open_source(path: &Path) -> Result<Box<dyn AudioSource>, AudioError> {
    File::open(path).map_err(|source| AudioError::OpenFailed {
        path: path.to_path_buf(),
        source,
    })?;
    for format in registry() {
        if format.probe(path) {
            debug!(path = %path.display(), kind = ?format.kind(), "Format probe matched");
            return format.open(path);
        }
    }
    info!(path = %path.display(), "No format probe matched");
    Err(AudioError::FormatUnrecognized {
        path: path.to_path_buf(),
    })
}

/// Open `path` as headerless 16-bit stereo 44.1 kHz PCM.
pub fn open_raw(path: &Path, order: ByteOrder) -> Result<Box<dyn AudioSource>, AudioError> {
    Ok(Box::new(RawSource::open(path, order)?))
}

/// Join previously written segments of one format into `output`.
pub(crate) fn merge(
    kind: FormatKind,
    output: &Path,
    inputs: &[PathBuf],
    progress: ProgressFn<'_>,
) -> Result<(), AudioError> {
    info!(output = %output.display(), ?kind, inputs = inputs.len(), "Merging files");
    match kind {
        FormatKind::Wav => super::wav::merge(output, inputs, progress),
        FormatKind::Raw => super::raw::concat(output, inputs, progress),
        FormatKind::Mpeg => super::mpeg::merge(output, inputs, progress),
        FormatKind::Ogg => super::ogg::merge(output, inputs, progress),
    }
}

/// Format of a merge input, probed the same way as [`open_source`].
pub(crate) fn detect(path: &Path) -> Option<FormatKind> {
    registry()
        .into_iter()
        .find(|format| format.probe(path))
        .map(|format| format.kind())
}
