use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use trackbreak::StreamInfo;
use trackbreak::engine::PlaybackSink;

/// Sink that counts buffers and sleeps per buffer like a real device.
#[derive(Clone, Default)]
pub struct RecordingSink {
    pub writes: Arc<AtomicUsize>,
    pub bytes: Arc<AtomicUsize>,
    pub device: Arc<Mutex<Option<String>>>,
    pub finished: Arc<AtomicUsize>,
    pub delay: Duration,
}

impl RecordingSink {
    pub fn slow() -> Self {
        Self {
            delay: Duration::from_millis(5),
            ..Self::default()
        }
    }

    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

impl PlaybackSink for RecordingSink {
    fn start(&mut self, _info: &StreamInfo, device: &str) -> io::Result<()> {
        *self.device.lock().unwrap() = Some(device.to_string());
        Ok(())
    }

    fn write(&mut self, pcm: &[u8]) -> io::Result<()> {
        std::thread::sleep(self.delay);
        self.bytes.fetch_add(pcm.len(), Ordering::SeqCst);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn finish(&mut self) {
        self.finished.fetch_add(1, Ordering::SeqCst);
    }
}
