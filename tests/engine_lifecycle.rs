mod support;

use std::time::Duration;

use support::sink::RecordingSink;
use support::wait_until;
use support::wav::write_stereo_wav;
use trackbreak::engine::WriteOptions;
use trackbreak::track_breaks::TrackBreak;
use trackbreak::{AudioError, ByteOrder, EngineError, EngineState, FormatKind, SampleEngine};

const RATE: u32 = 44_100;
const PATIENCE: Duration = Duration::from_secs(10);

#[test]
fn unrecognized_file_falls_back_to_raw() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("image.bin");
    let bytes: Vec<u8> = (0..2_352 * 10).map(|index| (index % 7) as u8 + 1).collect();
    std::fs::write(&path, &bytes).unwrap();

    let engine = SampleEngine::new();
    let err = engine.open(&path).unwrap_err();
    assert!(matches!(
        err,
        EngineError::Audio(AudioError::FormatUnrecognized { .. })
    ));
    assert_eq!(engine.state(), EngineState::Closed);
    assert!(engine.last_error().is_some());

    let info = engine.open_raw(&path, ByteOrder::BigEndian).unwrap();
    assert_eq!(engine.kind(), Some(FormatKind::Raw));
    assert_eq!(info.byte_length, bytes.len() as u64);
    assert_eq!(info.block_count(), 10);

    let mut buf = [0u8; 4];
    assert_eq!(engine.read(&mut buf, 0).unwrap(), 4);
    assert_eq!(buf, [bytes[1], bytes[0], bytes[3], bytes[2]]);
}

#[test]
fn failed_open_keeps_the_previous_session() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("good.wav");
    write_stereo_wav(&path, RATE, RATE * 10);
    let engine = SampleEngine::new();
    engine.open(&path).unwrap();
    assert!(wait_until(PATIENCE, || engine.summary().is_some()));
    let sink = RecordingSink::slow();
    engine.play(0, Box::new(sink.clone())).unwrap();

    let err = engine.open(&dir.path().join("missing.wav")).unwrap_err();
    assert!(matches!(err, EngineError::Audio(AudioError::OpenFailed { .. })));
    assert_eq!(engine.path(), Some(path));
    assert_eq!(engine.state(), EngineState::Playing);
    assert_eq!(engine.summary().unwrap().len(), 750);
    engine.stop();
    assert_eq!(engine.state(), EngineState::Ready);
}

#[test]
fn reopening_the_same_file_gives_the_same_geometry() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("twice.wav");
    write_stereo_wav(&path, RATE, RATE * 2);
    let engine = SampleEngine::new();

    let first = engine.open(&path).unwrap();
    let second = engine.open(&path).unwrap();
    assert_eq!(first, second);
    assert_eq!(first.block_size, 2_352);
    assert_eq!(first.buffer_size, 2_352 * 4);
    assert!(wait_until(PATIENCE, || engine.summary().is_some()));
    assert_eq!(engine.summary().unwrap().len(), 150);
}

#[test]
fn reads_do_not_depend_on_earlier_reads() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pure.wav");
    write_stereo_wav(&path, RATE, RATE);
    let engine = SampleEngine::new();
    engine.open(&path).unwrap();

    let mut first = vec![0u8; 1_000];
    let mut other = vec![0u8; 4_000];
    let mut again = vec![0u8; 1_000];
    assert_eq!(engine.read(&mut first, 40_000).unwrap(), 1_000);
    engine.read(&mut other, 100_000).unwrap();
    engine.read(&mut other, 0).unwrap();
    assert_eq!(engine.read(&mut again, 40_000).unwrap(), 1_000);
    assert_eq!(first, again);

    let length = engine.info().unwrap().byte_length;
    assert_eq!(engine.read(&mut first, length).unwrap(), 0);
}

#[test]
fn summary_covers_every_partial_block() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("odd.wav");
    write_stereo_wav(&path, RATE, RATE * 3 + 100);
    let engine = SampleEngine::new();
    let info = engine.open(&path).unwrap();

    assert!(wait_until(PATIENCE, || engine.summary().is_some()));
    let summary = engine.summary().unwrap();
    assert_eq!(summary.len(), 226);
    assert_eq!(summary.len() as u64, info.block_count());
    assert_eq!(summary.max_sample_value, 32_767);
    let (min, max) = summary.block(0).unwrap();
    assert!(min < 0 && max > 0);
    assert_eq!(engine.open_progress(), 1.0);
}

#[test]
fn latest_open_wins_the_summary() {
    let dir = tempfile::tempdir().unwrap();
    let long = dir.path().join("long.wav");
    let short = dir.path().join("short.wav");
    write_stereo_wav(&long, RATE, RATE * 30);
    write_stereo_wav(&short, RATE, RATE);
    let engine = SampleEngine::new();

    engine.open(&long).unwrap();
    engine.open(&short).unwrap();
    assert!(wait_until(PATIENCE, || engine.summary().is_some()));
    assert_eq!(engine.summary().unwrap().len(), 75);
    std::thread::sleep(Duration::from_millis(300));
    assert_eq!(engine.summary().unwrap().len(), 75);
}

#[test]
fn second_play_is_refused_until_stopped() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("play.wav");
    write_stereo_wav(&path, RATE, RATE * 10);
    let engine = SampleEngine::new();
    engine.open(&path).unwrap();

    let sink = RecordingSink::slow();
    engine.play(0, Box::new(sink.clone())).unwrap();
    assert_eq!(engine.state(), EngineState::Playing);
    assert_eq!(sink.device.lock().unwrap().as_deref(), Some("default"));

    let refused = engine.play(0, Box::new(RecordingSink::default()));
    assert!(matches!(refused, Err(EngineError::AlreadyPlaying)));
    let write = engine.write_segments(&[TrackBreak::new(0)], dir.path(), WriteOptions::default());
    assert!(matches!(write, Err(EngineError::PlaybackActive)));

    assert!(wait_until(PATIENCE, || sink.write_count() > 2));
    engine.stop();
    let after_stop = sink.write_count();
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(sink.write_count(), after_stop);
    assert!(!engine.is_playing());
    assert!(engine.play_position() > 0);

    engine.play(700, Box::new(RecordingSink::default())).unwrap();
    engine.stop();
}

#[test]
fn playback_runs_to_the_end_of_the_stream() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("short.wav");
    write_stereo_wav(&path, RATE, RATE / 2);
    let engine = SampleEngine::new();
    let info = engine.open(&path).unwrap();

    let sink = RecordingSink::default();
    engine.play(0, Box::new(sink.clone())).unwrap();
    assert!(wait_until(PATIENCE, || !engine.is_playing()));
    assert_eq!(
        sink.bytes.load(std::sync::atomic::Ordering::SeqCst) as u64,
        info.byte_length
    );
    assert_eq!(sink.finished.load(std::sync::atomic::Ordering::SeqCst), 1);
}

#[test]
fn operations_without_a_file_are_refused() {
    let engine = SampleEngine::new();
    let mut buf = [0u8; 16];
    assert!(matches!(engine.read(&mut buf, 0), Err(EngineError::NoFileOpen)));
    assert!(matches!(
        engine.play(0, Box::new(RecordingSink::default())),
        Err(EngineError::NoFileOpen)
    ));
    let dir = tempfile::tempdir().unwrap();
    let write = engine.write_segments(&[TrackBreak::new(0)], dir.path(), WriteOptions::default());
    assert!(matches!(write, Err(EngineError::NoFileOpen)));
}

#[test]
fn close_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("close.wav");
    write_stereo_wav(&path, RATE, RATE);
    let engine = SampleEngine::new();
    engine.open(&path).unwrap();

    engine.close();
    engine.close();
    assert_eq!(engine.state(), EngineState::Closed);
    assert!(engine.info().is_none());
    assert!(engine.summary().is_none());
}
