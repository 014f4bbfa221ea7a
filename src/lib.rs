//! Audio sample engine for splitting long recordings at track breaks.
//!
//! Open a WAV, headerless CD image, MPEG audio or Ogg Vorbis file through
//! [`engine::SampleEngine`], inspect its [`waveform::WaveformSummary`], place
//! cut points in a [`track_breaks::TrackBreakList`] and write each segment as
//! its own file in the source format.

/// Config and log directory resolution.
pub mod app_dirs;
/// Format adapters behind one random-access PCM read contract.
pub mod audio;
/// Persistent user preferences.
pub mod config;
/// Session state machine and background tasks.
pub mod engine;
/// Tracing subscriber setup.
pub mod logging;
/// Cut-point list, display times and filename stems.
pub mod track_breaks;
/// Per-block amplitude envelope.
pub mod waveform;

pub use audio::{AudioError, ByteOrder, FormatKind, StreamInfo};
pub use engine::{EngineError, EngineState, SampleEngine};
