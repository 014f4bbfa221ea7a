use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use tracing::{debug, info, warn};

use super::Shared;
use crate::audio::{AudioSource, StreamInfo};

/// Destination for decoded PCM during playback (an audio device in practice).
///
/// Buffers are interleaved little-endian samples in the stream's geometry.
pub trait PlaybackSink: Send {
    /// Prepare the device before the first buffer.
    fn start(&mut self, info: &StreamInfo, device: &str) -> io::Result<()>;

    /// Queue one buffer; may block until the device accepts it.
    fn write(&mut self, pcm: &[u8]) -> io::Result<()>;

    /// Release the device. Called once, after the last `write`.
    fn finish(&mut self) {}
}

/// A running play task.
pub(super) struct Playback {
    stop: Arc<AtomicBool>,
    finished: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl Playback {
    pub(super) fn spawn(
        mut source: Box<dyn AudioSource>,
        mut sink: Box<dyn PlaybackSink>,
        start_block: u64,
        shared: Arc<Shared>,
    ) -> io::Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let finished = Arc::new(AtomicBool::new(false));
        let handle = {
            let stop = Arc::clone(&stop);
            let finished = Arc::clone(&finished);
            thread::Builder::new()
                .name("trackbreak-play".into())
                .spawn(move || {
                    play_loop(source.as_mut(), sink.as_mut(), start_block, &stop, &shared);
                    sink.finish();
                    finished.store(true, Ordering::Release);
                })?
        };
        Ok(Self {
            stop,
            finished,
            handle,
        })
    }

    pub(super) fn is_running(&self) -> bool {
        !self.finished.load(Ordering::Acquire)
    }

    /// Request cancellation and wait until the task has exited.
    pub(super) fn stop(self) {
        self.stop.store(true, Ordering::Release);
        if self.handle.join().is_err() {
            warn!("Playback thread panicked");
        }
    }
}

fn play_loop(
    source: &mut dyn AudioSource,
    sink: &mut dyn PlaybackSink,
    start_block: u64,
    stop: &AtomicBool,
    shared: &Shared,
) {
    let position = &shared.play_position;
    let info = *source.info();
    let block_size = u64::from(info.block_size.max(1));
    let mut buf = vec![0u8; info.buffer_size];
    let mut offset = start_block * block_size;
    position.store(start_block, Ordering::Release);
    info!(start_block, "Playback started");

    while !stop.load(Ordering::Acquire) {
        let read = match source.read_frames(&mut buf, offset) {
            Ok(0) => {
                debug!(offset, "Playback reached end of stream");
                break;
            }
            Ok(read) => read,
            Err(err) => {
                warn!(offset, "Playback stopped by read error: {err}");
                shared.record_error(format!("Playback stopped: {err}"));
                break;
            }
        };
        if let Err(err) = sink.write(&buf[..read]) {
            warn!("Playback sink rejected buffer: {err}");
            shared.record_error(format!("Playback stopped: {err}"));
            break;
        }
        offset += read as u64;
        position.store(offset / block_size, Ordering::Release);
    }
    info!(block = position.load(Ordering::Acquire), "Playback finished");
}
