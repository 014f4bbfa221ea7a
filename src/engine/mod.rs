//! Format-agnostic sample engine.
//!
//! One [`SampleEngine`] owns a single session: the open source, its stream
//! geometry and the background tasks working on it (open-scan, play, write,
//! merge). Session state sits behind one mutex that is only held while state
//! changes hands; file I/O always happens outside it.

mod error;
mod playback;
mod progress;
mod writer;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use tracing::{debug, error, info, warn};

use crate::audio::{self, AudioError, AudioSource, ByteOrder, FormatKind, StreamInfo};
use crate::config::AppConfig;
use crate::track_breaks::{self, TrackBreak};
use crate::waveform::{self, WaveformSummary};

pub use error::EngineError;
pub use playback::PlaybackSink;
pub use progress::ProgressCell;
pub use writer::{
    OverwriteDecision, OverwritePolicy, OverwritePrompt, WriteEvent, WriteJob, WriteJobHandle,
    WriteOptions, WriteReport,
};

use playback::Playback;
use writer::{MergeJob, SegmentJob};

/// Coarse lifecycle state of the session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EngineState {
    Closed,
    Ready,
    Playing,
    Writing,
}

/// State shared with background tasks.
pub(crate) struct Shared {
    summary: RwLock<Option<Arc<WaveformSummary>>>,
    generation: AtomicU64,
    play_position: AtomicU64,
    writing: AtomicBool,
    last_error: Mutex<Option<String>>,
}

impl Shared {
    pub(crate) fn record_error(&self, message: String) {
        *lock(&self.last_error) = Some(message);
    }
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// The open source behind its cursor lock.
type SharedSource = Arc<Mutex<Box<dyn AudioSource>>>;

struct ActiveSource {
    path: PathBuf,
    kind: FormatKind,
    info: StreamInfo,
    reader: SharedSource,
    scan_progress: Arc<ProgressCell>,
}

#[derive(Default)]
struct Session {
    active: Option<ActiveSource>,
    playback: Option<Playback>,
}

impl Session {
    fn is_playing(&self) -> bool {
        self.playback.as_ref().is_some_and(Playback::is_running)
    }
}

/// Format-agnostic façade over the active audio source.
pub struct SampleEngine {
    session: Mutex<Session>,
    shared: Arc<Shared>,
    output_device: String,
}

impl Default for SampleEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl SampleEngine {
    pub fn new() -> Self {
        Self {
            session: Mutex::new(Session::default()),
            shared: Arc::new(Shared {
                summary: RwLock::new(None),
                generation: AtomicU64::new(0),
                play_position: AtomicU64::new(0),
                writing: AtomicBool::new(false),
                last_error: Mutex::new(None),
            }),
            output_device: AppConfig::default().output_device,
        }
    }

    /// Engine using the playback device named in `config`.
    pub fn with_config(config: &AppConfig) -> Self {
        let mut engine = Self::new();
        engine.set_output_device(config.output_device.clone());
        engine
    }

    pub fn set_output_device(&mut self, device: impl Into<String>) {
        self.output_device = device.into();
    }

    /// Open `path` with the first matching format adapter.
    ///
    /// Returns once the header is parsed; the waveform summary is built in the
    /// background. On failure the previous session is left untouched.
    pub fn open(&self, path: &Path) -> Result<StreamInfo, EngineError> {
        let source = audio::open_source(path).map_err(|err| self.fail(err.into()))?;
        self.install(source)
    }

    /// Open `path` as headerless 16-bit stereo 44.1 kHz PCM.
    pub fn open_raw(&self, path: &Path, order: ByteOrder) -> Result<StreamInfo, EngineError> {
        let source = audio::open_raw(path, order).map_err(|err| self.fail(err.into()))?;
        self.install(source)
    }

    fn install(&self, source: Box<dyn AudioSource>) -> Result<StreamInfo, EngineError> {
        let info = *source.info();
        let scan_source = source.try_clone().map_err(|err| self.fail(err.into()))?;
        let path = source.path().to_path_buf();
        let kind = source.kind();
        let scan_progress = Arc::new(ProgressCell::new());
        let start_scan = self.spawn_scan(scan_source, Arc::clone(&scan_progress))?;

        // Infallible from here on.
        self.stop();
        let generation = self.shared.generation.fetch_add(1, Ordering::AcqRel) + 1;
        *self.write_summary() = None;
        self.shared.play_position.store(0, Ordering::Release);
        let previous = lock(&self.session).active.replace(ActiveSource {
            path: path.clone(),
            kind,
            info,
            reader: Arc::new(Mutex::new(source)),
            scan_progress,
        });
        let _ = start_scan.send(generation);
        if let Some(previous) = previous {
            debug!(path = %previous.path.display(), "Closed previous session");
        }
        info!(path = %path.display(), ?kind, ?info, "Opened audio file");
        Ok(info)
    }

    /// Start the open-scan thread. It idles until the session's generation
    /// arrives on the returned channel and exits if the sender is dropped.
    fn spawn_scan(
        &self,
        mut source: Box<dyn AudioSource>,
        progress: Arc<ProgressCell>,
    ) -> Result<mpsc::Sender<u64>, EngineError> {
        let shared = Arc::clone(&self.shared);
        let (start, generation_rx) = mpsc::channel();
        std::thread::Builder::new()
            .name("trackbreak-scan".into())
            .spawn(move || {
                let Ok(generation) = generation_rx.recv() else {
                    return;
                };
                let result = waveform::summarize(source.as_mut(), &mut |fraction| progress.advance(fraction));
                progress.complete();
                let current = shared.generation.load(Ordering::Acquire);
                if current != generation {
                    debug!(generation, current, "Discarding superseded waveform summary");
                    return;
                }
                match result {
                    Ok(summary) => {
                        if let Some(message) = &summary.read_error {
                            shared.record_error(message.clone());
                        }
                        let mut slot = shared.summary.write().unwrap_or_else(PoisonError::into_inner);
                        if shared.generation.load(Ordering::Acquire) == generation {
                            *slot = Some(Arc::new(summary));
                        }
                    }
                    Err(err) => {
                        error!(path = %source.path().display(), "Waveform scan failed: {err}");
                        shared.record_error(err.to_string());
                    }
                }
            })
            .map(|_| start)
            .map_err(|source| self.fail(EngineError::Spawn {
                task: "open-scan",
                source,
            }))
    }

    /// Read decoded PCM bytes from the open source.
    pub fn read(&self, buf: &mut [u8], byte_offset: u64) -> Result<usize, EngineError> {
        let reader = self.reader()?;
        let read = lock(&reader).read_frames(buf, byte_offset)?;
        Ok(read)
    }

    /// Start playback at `start_block`, feeding buffers to `sink`.
    pub fn play(&self, start_block: u64, mut sink: Box<dyn PlaybackSink>) -> Result<(), EngineError> {
        let (reader, info) = {
            let session = lock(&self.session);
            let active = session.active.as_ref().ok_or(EngineError::NoFileOpen)?;
            if session.is_playing() {
                return Err(EngineError::AlreadyPlaying);
            }
            if self.shared.writing.load(Ordering::Acquire) {
                return Err(EngineError::WriteInProgress);
            }
            (Arc::clone(&active.reader), active.info)
        };
        let source = lock(&reader).try_clone()?;
        sink.start(&info, &self.output_device)
            .map_err(|source| EngineError::Sink { source })?;

        let mut session = lock(&self.session);
        let same_session = session
            .active
            .as_ref()
            .is_some_and(|active| Arc::ptr_eq(&active.reader, &reader));
        let refused = if !same_session {
            Some(EngineError::NoFileOpen)
        } else if session.is_playing() {
            Some(EngineError::AlreadyPlaying)
        } else {
            None
        };
        if let Some(err) = refused {
            drop(session);
            sink.finish();
            return Err(err);
        }
        let finished = session.playback.take();
        let playback = Playback::spawn(source, sink, start_block, Arc::clone(&self.shared))
            .map_err(|source| EngineError::Spawn { task: "play", source })?;
        session.playback = Some(playback);
        drop(session);
        if let Some(finished) = finished {
            finished.stop();
        }
        Ok(())
    }

    /// Stop playback and wait for the play task to exit.
    ///
    /// Once this returns the sink receives no further buffers.
    pub fn stop(&self) {
        let playback = lock(&self.session).playback.take();
        if let Some(playback) = playback {
            playback.stop();
            debug!("Playback stopped");
        }
    }

    /// Drop the open source. Safe to call repeatedly.
    pub fn close(&self) {
        self.stop();
        self.shared.generation.fetch_add(1, Ordering::AcqRel);
        *self.write_summary() = None;
        if let Some(active) = lock(&self.session).active.take() {
            info!(path = %active.path.display(), "Closed audio file");
        }
    }

    pub fn state(&self) -> EngineState {
        let session = lock(&self.session);
        if session.active.is_none() {
            EngineState::Closed
        } else if session.is_playing() {
            EngineState::Playing
        } else if self.shared.writing.load(Ordering::Acquire) {
            EngineState::Writing
        } else {
            EngineState::Ready
        }
    }

    pub fn is_playing(&self) -> bool {
        lock(&self.session).is_playing()
    }

    /// Whether a write or merge job is running.
    pub fn is_writing(&self) -> bool {
        self.shared.writing.load(Ordering::Acquire)
    }

    pub fn info(&self) -> Option<StreamInfo> {
        lock(&self.session).active.as_ref().map(|active| active.info)
    }

    pub fn path(&self) -> Option<PathBuf> {
        lock(&self.session).active.as_ref().map(|active| active.path.clone())
    }

    pub fn kind(&self) -> Option<FormatKind> {
        lock(&self.session).active.as_ref().map(|active| active.kind)
    }

    /// Latest completed waveform summary for the open file.
    pub fn summary(&self) -> Option<Arc<WaveformSummary>> {
        self.shared
            .summary
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Completion fraction of the waveform scan for the open file.
    pub fn open_progress(&self) -> f32 {
        lock(&self.session)
            .active
            .as_ref()
            .map_or(0.0, |active| active.scan_progress.get())
    }

    /// Block the playhead has reached.
    pub fn play_position(&self) -> u64 {
        self.shared.play_position.load(Ordering::Acquire)
    }

    /// Human-readable text of the most recent surfaced error.
    pub fn last_error(&self) -> Option<String> {
        lock(&self.shared.last_error).clone()
    }

    /// Write every included segment described by `breaks` into `output_dir`.
    ///
    /// Breaks may arrive in any order; they are sorted by position and
    /// de-duplicated first. Failures of single segments are reported in the
    /// job's [`WriteReport`] and never abort the batch.
    pub fn write_segments(
        &self,
        breaks: &[TrackBreak],
        output_dir: &Path,
        options: WriteOptions,
    ) -> Result<WriteJobHandle, EngineError> {
        let reader = {
            let session = lock(&self.session);
            let active = session.active.as_ref().ok_or(EngineError::NoFileOpen)?;
            if session.is_playing() {
                return Err(EngineError::PlaybackActive);
            }
            self.claim_writer()?;
            Arc::clone(&active.reader)
        };
        let source = match lock(&reader).try_clone() {
            Ok(source) => source,
            Err(err) => {
                self.shared.writing.store(false, Ordering::Release);
                return Err(self.fail(err.into()));
            }
        };
        let job = SegmentJob {
            source,
            segments: track_breaks::segments(breaks),
            output_dir: output_dir.to_path_buf(),
            options,
        };
        writer::spawn_segments(job, Arc::clone(&self.shared)).map_err(|source| {
            self.shared.writing.store(false, Ordering::Release);
            self.fail(EngineError::Spawn { task: "write", source })
        })
    }

    /// Concatenate previously written files of one format into `output`.
    ///
    /// The format comes from probing the first input; inputs no probe
    /// recognizes are joined as raw PCM.
    pub fn merge_files(&self, output: &Path, inputs: &[PathBuf]) -> Result<WriteJobHandle, EngineError> {
        let first = inputs.first().ok_or_else(|| {
            self.fail(
                AudioError::invalid(output, "no input files to merge").into(),
            )
        })?;
        let kind = audio::detect_format(first).unwrap_or(FormatKind::Raw);
        self.claim_writer()?;
        let job = MergeJob {
            kind,
            output: output.to_path_buf(),
            inputs: inputs.to_vec(),
        };
        writer::spawn_merge(job, Arc::clone(&self.shared)).map_err(|source| {
            self.shared.writing.store(false, Ordering::Release);
            self.fail(EngineError::Spawn { task: "merge", source })
        })
    }

    fn claim_writer(&self) -> Result<(), EngineError> {
        self.shared
            .writing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|_| EngineError::WriteInProgress)
    }

    fn reader(&self) -> Result<SharedSource, EngineError> {
        lock(&self.session)
            .active
            .as_ref()
            .map(|active| Arc::clone(&active.reader))
            .ok_or(EngineError::NoFileOpen)
    }

    fn write_summary(&self) -> std::sync::RwLockWriteGuard<'_, Option<Arc<WaveformSummary>>> {
        self.shared.summary.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn fail(&self, err: EngineError) -> EngineError {
        warn!("{err}");
        self.shared.record_error(err.to_string());
        err
    }
}

impl Drop for SampleEngine {
    fn drop(&mut self) {
        self.stop();
    }
}
