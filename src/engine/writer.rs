//! Segment writer and merge jobs.
//!
//! Each job runs on its own thread with its own source handle. Observers get a
//! stream of [`WriteEvent`]s and can also poll the shared [`WriteJob`] status.
//! Overwrite confirmation is a message round-trip: the job sends an
//! [`OverwritePrompt`] and waits for its reply.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use tracing::{info, warn};

use super::progress::ProgressCell;
use super::{Shared, lock};
use crate::audio::{self, AudioSource, FormatKind};
use crate::track_breaks::{Segment, base_stem};

/// What to do when a segment's output file already exists.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OverwritePolicy {
    /// Send an [`OverwritePrompt`] and wait for the answer.
    #[default]
    Ask,
    Always,
    Never,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WriteOptions {
    pub overwrite: OverwritePolicy,
}

/// Answer to an overwrite prompt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OverwriteDecision {
    /// Replace this file only.
    Overwrite,
    /// Replace this file and every later existing file without asking.
    OverwriteAll,
    Skip,
}

/// Pending question about an existing output file.
///
/// Dropping the prompt without answering counts as [`OverwriteDecision::Skip`].
#[derive(Debug)]
pub struct OverwritePrompt {
    path: PathBuf,
    reply: Sender<OverwriteDecision>,
}

impl OverwritePrompt {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn answer(self, decision: OverwriteDecision) {
        let _ = self.reply.send(decision);
    }
}

/// Progress and hand-off messages emitted by a running job.
#[derive(Debug)]
pub enum WriteEvent {
    SegmentStarted {
        index: usize,
        total: usize,
        path: PathBuf,
    },
    /// Completion of the current file and of the whole job.
    Progress { segment: f32, overall: f32 },
    OverwriteRequested(OverwritePrompt),
    SegmentSkipped { path: PathBuf },
    SegmentFailed { path: PathBuf, error: String },
    Finished(WriteReport),
}

/// Outcome of a whole job.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WriteReport {
    pub written: Vec<PathBuf>,
    pub skipped: Vec<PathBuf>,
    pub failed: Vec<(PathBuf, String)>,
}

impl WriteReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    /// One line per failed file, for presenting after the batch.
    pub fn failure_summary(&self) -> Option<String> {
        if self.failed.is_empty() {
            return None;
        }
        let lines: Vec<String> = self
            .failed
            .iter()
            .map(|(path, error)| format!("{}: {error}", path.display()))
            .collect();
        Some(format!(
            "{} of {} files failed to write:\n{}",
            self.failed.len(),
            self.failed.len() + self.written.len() + self.skipped.len(),
            lines.join("\n")
        ))
    }
}

/// Pollable status of a running job.
#[derive(Debug)]
pub struct WriteJob {
    total: usize,
    current: AtomicUsize,
    current_file: Mutex<Option<PathBuf>>,
    progress: ProgressCell,
    segment_progress: ProgressCell,
    done: AtomicBool,
}

impl WriteJob {
    fn new(total: usize) -> Self {
        Self {
            total,
            current: AtomicUsize::new(0),
            current_file: Mutex::new(None),
            progress: ProgressCell::new(),
            segment_progress: ProgressCell::new(),
            done: AtomicBool::new(false),
        }
    }

    /// Number of files the job will produce.
    pub fn total(&self) -> usize {
        self.total
    }

    /// Zero-based index of the file being written.
    pub fn current_index(&self) -> usize {
        self.current.load(Ordering::Acquire)
    }

    pub fn current_file(&self) -> Option<PathBuf> {
        lock(&self.current_file).clone()
    }

    /// Completion fraction of the whole job.
    pub fn progress(&self) -> f32 {
        self.progress.get()
    }

    /// Completion fraction of the file being written.
    pub fn segment_progress(&self) -> f32 {
        self.segment_progress.get()
    }

    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }
}

/// Caller side of a write or merge job.
pub struct WriteJobHandle {
    job: Arc<WriteJob>,
    events: Receiver<WriteEvent>,
    handle: Option<JoinHandle<WriteReport>>,
}

impl WriteJobHandle {
    pub fn job(&self) -> &Arc<WriteJob> {
        &self.job
    }

    pub fn events(&self) -> &Receiver<WriteEvent> {
        &self.events
    }

    /// Next pending event without blocking.
    pub fn try_next_event(&self) -> Option<WriteEvent> {
        self.events.try_recv().ok()
    }

    /// Block until the job finishes, skipping every overwrite prompt still pending.
    pub fn wait(mut self) -> WriteReport {
        let events = std::mem::replace(&mut self.events, mpsc::channel().1);
        drop(events);
        self.join()
    }

    fn join(&mut self) -> WriteReport {
        match self.handle.take().map(JoinHandle::join) {
            Some(Ok(report)) => report,
            Some(Err(_)) => {
                warn!("Write thread panicked");
                WriteReport::default()
            }
            None => WriteReport::default(),
        }
    }
}

/// Everything a segment job needs, resolved before the thread starts.
pub(super) struct SegmentJob {
    pub source: Box<dyn AudioSource>,
    pub segments: Vec<Segment>,
    pub output_dir: PathBuf,
    pub options: WriteOptions,
}

pub(super) struct MergeJob {
    pub kind: FormatKind,
    pub output: PathBuf,
    pub inputs: Vec<PathBuf>,
}

pub(super) fn spawn_segments(job: SegmentJob, shared: Arc<Shared>) -> std::io::Result<WriteJobHandle> {
    let total = job.segments.len();
    spawn("trackbreak-write", total, shared, move |status, events| {
        write_segments(job, status, events)
    })
}

pub(super) fn spawn_merge(job: MergeJob, shared: Arc<Shared>) -> std::io::Result<WriteJobHandle> {
    spawn("trackbreak-merge", 1, shared, move |status, events| {
        merge(job, status, events)
    })
}

fn spawn<F>(name: &str, total: usize, shared: Arc<Shared>, body: F) -> std::io::Result<WriteJobHandle>
where
    F: FnOnce(&WriteJob, &Sender<WriteEvent>) -> WriteReport + Send + 'static,
{
    let job = Arc::new(WriteJob::new(total));
    let (sender, events) = mpsc::channel();
    let status = Arc::clone(&job);
    let handle = std::thread::Builder::new()
        .name(name.to_string())
        .spawn(move || {
            let report = body(&status, &sender);
            if let Some(summary) = report.failure_summary() {
                shared.record_error(summary);
            }
            status.progress.complete();
            status.segment_progress.complete();
            status.done.store(true, Ordering::Release);
            shared.writing.store(false, Ordering::Release);
            let _ = sender.send(WriteEvent::Finished(report.clone()));
            report
        })?;
    Ok(WriteJobHandle {
        job,
        events,
        handle: Some(handle),
    })
}

fn write_segments(job: SegmentJob, status: &WriteJob, events: &Sender<WriteEvent>) -> WriteReport {
    let SegmentJob {
        mut source,
        segments,
        output_dir,
        options,
    } = job;
    let info = *source.info();
    let block_size = u64::from(info.block_size);
    let extension = output_extension(source.path(), source.kind());
    let base = base_stem(source.path());
    let total = segments.len();
    let mut policy = options.overwrite;
    let mut report = WriteReport::default();
    info!(
        source = %source.path().display(),
        output_dir = %output_dir.display(),
        segments = total,
        "Writing segments"
    );

    for (index, segment) in segments.iter().enumerate() {
        let stem = if segment.filename.is_empty() {
            format!("{base}{:02}", index + 1)
        } else {
            segment.filename.clone()
        };
        let path = output_dir.join(file_name(&stem, &extension));
        status.current.store(index, Ordering::Release);
        status.segment_progress.reset();
        *lock(&status.current_file) = Some(path.clone());
        let _ = events.send(WriteEvent::SegmentStarted {
            index,
            total,
            path: path.clone(),
        });

        if path.exists() && !confirm_overwrite(&path, &mut policy, events) {
            info!(path = %path.display(), "Skipping existing file");
            let _ = events.send(WriteEvent::SegmentSkipped { path: path.clone() });
            report.skipped.push(path);
            advance(status, events, 1.0, (index + 1) as f32 / total as f32);
            continue;
        }

        let start = segment.start * block_size;
        let end = segment.end.map_or(0, |end| end * block_size);
        let done = index as f32;
        let result = source.write_range(&path, start, end, &mut |fraction| {
            advance(status, events, fraction, (done + fraction) / total as f32)
        });
        match result {
            Ok(()) => {
                info!(path = %path.display(), start, end, "Segment written");
                report.written.push(path);
            }
            Err(err) => {
                warn!(path = %path.display(), "Segment failed: {err}");
                let _ = events.send(WriteEvent::SegmentFailed {
                    path: path.clone(),
                    error: err.to_string(),
                });
                report.failed.push((path, err.to_string()));
            }
        }
        advance(status, events, 1.0, (index + 1) as f32 / total as f32);
    }
    report
}

fn merge(job: MergeJob, status: &WriteJob, events: &Sender<WriteEvent>) -> WriteReport {
    *lock(&status.current_file) = Some(job.output.clone());
    let _ = events.send(WriteEvent::SegmentStarted {
        index: 0,
        total: 1,
        path: job.output.clone(),
    });
    let result = audio::merge_files(job.kind, &job.output, &job.inputs, &mut |fraction| {
        advance(status, events, fraction, fraction)
    });
    let mut report = WriteReport::default();
    match result {
        Ok(()) => report.written.push(job.output),
        Err(err) => {
            warn!(output = %job.output.display(), "Merge failed: {err}");
            let _ = events.send(WriteEvent::SegmentFailed {
                path: job.output.clone(),
                error: err.to_string(),
            });
            report.failed.push((job.output, err.to_string()));
        }
    }
    report
}

/// Ask (or apply the standing policy) whether `path` may be replaced.
fn confirm_overwrite(path: &Path, policy: &mut OverwritePolicy, events: &Sender<WriteEvent>) -> bool {
    match *policy {
        OverwritePolicy::Always => return true,
        OverwritePolicy::Never => return false,
        OverwritePolicy::Ask => {}
    }
    let (reply, answer) = mpsc::channel();
    let prompt = OverwritePrompt {
        path: path.to_path_buf(),
        reply,
    };
    if events.send(WriteEvent::OverwriteRequested(prompt)).is_err() {
        return false;
    }
    match answer.recv() {
        Ok(OverwriteDecision::Overwrite) => true,
        Ok(OverwriteDecision::OverwriteAll) => {
            *policy = OverwritePolicy::Always;
            true
        }
        Ok(OverwriteDecision::Skip) | Err(_) => false,
    }
}

fn advance(status: &WriteJob, events: &Sender<WriteEvent>, segment: f32, overall: f32) {
    status.segment_progress.advance(segment);
    status.progress.advance(overall);
    let _ = events.send(WriteEvent::Progress {
        segment: status.segment_progress.get(),
        overall: status.progress.get(),
    });
}

/// Extension of the source file, or the format default when it has none.
fn output_extension(source: &Path, kind: FormatKind) -> String {
    source
        .extension()
        .map(|ext| ext.to_string_lossy().into_owned())
        .filter(|ext| !ext.is_empty())
        .unwrap_or_else(|| kind.default_extension().to_string())
}

fn file_name(stem: &str, extension: &str) -> String {
    let suffix = format!(".{extension}");
    if stem.to_lowercase().ends_with(&suffix.to_lowercase()) {
        stem.to_string()
    } else {
        format!("{stem}{suffix}")
    }
}
