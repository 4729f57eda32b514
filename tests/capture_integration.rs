//! Input capture to WAV through a running analysis worker.

mod helpers;

use approx::assert_relative_eq;
use helpers::*;
use resona::prelude::*;
use std::path::Path;

/// Sample count of a finalized WAV file, `None` while it is still open.
fn finished_len(path: &Path) -> Option<u32> {
    let reader = hound::WavReader::open(path).ok()?;
    match reader.len() {
        0 => None,
        n => Some(n),
    }
}

#[test]
fn test_capture_writes_requested_duration() {
    init_tracing();
    let engine = ResonaEngine::builder()
        .input_state(ChannelState::new(8000, 1))
        .block_frames(64)
        .build()
        .unwrap();
    let ch = ChannelId::input(0);
    engine
        .start_channel_analysis(ch, engine.input_state())
        .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("input.wav");
    engine.capture_input(ch, &path, 0.05).unwrap();

    // Keep audio flowing until the worker has finalized the file
    let mut driver = engine.capture_driver();
    let block = generate_dc(0.25, 64);
    let done = wait_until(5000, || {
        feed_mono(&mut driver, &block, 64);
        finished_len(&path).is_some()
    });
    assert!(done, "capture never finalized");

    let mut reader = hound::WavReader::open(&path).unwrap();
    let spec = reader.spec();
    assert_eq!(spec.channels, 1);
    assert_eq!(spec.sample_rate, 8000);
    assert_eq!(spec.sample_format, hound::SampleFormat::Float);
    assert_eq!(reader.len(), 400);

    for sample in reader.samples::<f32>() {
        assert_relative_eq!(sample.unwrap(), 0.25);
    }

    // Analysis kept running alongside the capture
    assert!(engine.get_latest_result(ch).is_some());
}

#[test]
fn test_capture_rejects_output_and_idle_channels() {
    let engine = ResonaEngine::builder()
        .input_state(ChannelState::new(8000, 2))
        .output_state(ChannelState::new(8000, 2))
        .build()
        .unwrap();
    let dir = tempfile::tempdir().unwrap();

    let err = engine
        .capture_input(ChannelId::output(0), dir.path().join("out.wav"), 1.0)
        .unwrap_err();
    assert!(matches!(
        err,
        resona::Error::Analysis(resona::analysis::Error::CaptureOnOutput(_))
    ));

    // Input channel without a worker
    let err = engine
        .capture_input(ChannelId::input(1), dir.path().join("in.wav"), 1.0)
        .unwrap_err();
    assert!(matches!(
        err,
        resona::Error::Core(resona::core::Error::UnknownChannel(_))
    ));
    assert!(!dir.path().join("in.wav").exists());
}

#[test]
fn test_cancel_finalizes_partial_capture() {
    let engine = ResonaEngine::builder()
        .input_state(ChannelState::new(8000, 1))
        .block_frames(64)
        .build()
        .unwrap();
    let ch = ChannelId::input(0);
    engine
        .start_channel_analysis(ch, engine.input_state())
        .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("partial.wav");
    engine.capture_input(ch, &path, 10.0).unwrap();

    let mut driver = engine.capture_driver();
    let block = generate_dc(-0.5, 64);
    assert!(wait_until(5000, || {
        feed_mono(&mut driver, &block, 64);
        path.exists()
    }));
    feed_mono(&mut driver, &block, 64);
    let target = engine.processed(ch) + 1;
    feed_mono(&mut driver, &block, 64);
    assert!(wait_for_processed(&engine, ch, target));

    engine.cancel_capture(ch).unwrap();
    assert!(wait_until(5000, || finished_len(&path).is_some()));
    engine.stop_channel_analysis(ch).unwrap();

    let reader = hound::WavReader::open(&path).unwrap();
    assert!(reader.len() > 0);
    assert!(reader.len() < 80_000);
    assert_eq!(reader.len() % 64, 0);
}
