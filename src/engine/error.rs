use thiserror::Error;

use crate::audio::AudioError;

/// Errors surfaced by [`SampleEngine`](super::SampleEngine) operations.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Playback is already running")]
    AlreadyPlaying,
    #[error("No audio file is open")]
    NoFileOpen,
    #[error("A write or merge job is still running")]
    WriteInProgress,
    #[error("Stop playback before writing")]
    PlaybackActive,
    #[error("Failed to start {task} task: {source}")]
    Spawn {
        task: &'static str,
        source: std::io::Error,
    },
    #[error("Playback sink failed to start: {source}")]
    Sink { source: std::io::Error },
    #[error(transparent)]
    Audio(#[from] AudioError),
}
