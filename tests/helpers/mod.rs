//! Test helpers and fixtures for resona integration tests
//!
//! Drives a [`CallbackDriver`] by hand in place of a real audio backend, so
//! every test controls the exact block sequence the workers see.
//!
//! ## Tolerance Levels
//!
//! Use the appropriate tolerance from [`tolerances`] module:
//! - `FLOAT_EPSILON` (1e-6): Exact operations (copies, floor level)
//! - `DSP_EPSILON` (1e-4): FFT and smoothing results

#![allow(dead_code)]

pub mod tolerances;

use resona::prelude::*;
use resona::CallbackDriver;
use std::time::{Duration, Instant};

/// Default test sample rate (matches the analysis scenarios)
pub const TEST_SAMPLE_RATE: u32 = 44100;

/// Standard callback block size
pub const TEST_BUFFER_SIZE: usize = 512;

/// Install a fmt subscriber once so worker logs show up with `--nocapture`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// Engine with `inputs` capture channels and no playback channels.
pub fn test_engine(inputs: u32) -> ResonaEngine {
    test_engine_with(inputs, AnalysisSettings::default())
}

pub fn test_engine_with(inputs: u32, settings: AnalysisSettings) -> ResonaEngine {
    init_tracing();
    ResonaEngine::builder()
        .input_state(ChannelState::new(TEST_SAMPLE_RATE, inputs))
        .output_state(ChannelState::new(TEST_SAMPLE_RATE, 0))
        .block_frames(TEST_BUFFER_SIZE)
        .settings(settings)
        .build()
        .expect("Failed to create test engine")
}

/// Generate a test signal: sine wave at given frequency for specified samples.
pub fn generate_sine(frequency: f64, sample_rate: u32, num_samples: usize) -> Vec<f32> {
    (0..num_samples)
        .map(|i| {
            let t = i as f64 / sample_rate as f64;
            (2.0 * std::f64::consts::PI * frequency * t).sin() as f32
        })
        .collect()
}

/// Generate silence (zero samples).
pub fn generate_silence(num_samples: usize) -> Vec<f32> {
    vec![0.0; num_samples]
}

/// Generate a DC offset signal (constant value).
pub fn generate_dc(value: f32, num_samples: usize) -> Vec<f32> {
    vec![value; num_samples]
}

/// Interleave mono channels into one device buffer.
pub fn interleave(channels: &[&[f32]]) -> Vec<f32> {
    let frames = channels.iter().map(|c| c.len()).min().unwrap_or(0);
    let mut out = Vec::with_capacity(frames * channels.len());
    for i in 0..frames {
        for channel in channels {
            out.push(channel[i]);
        }
    }
    out
}

/// Feed a mono signal block by block through the driver as input channel 0.
///
/// Returns the number of blocks delivered.
pub fn feed_mono(driver: &mut CallbackDriver, signal: &[f32], block: usize) -> usize {
    let mut blocks = 0;
    for chunk in signal.chunks(block) {
        driver.on_audio_block(Some(chunk), None, chunk.len(), ChannelLayout::new(1, 0));
        blocks += 1;
    }
    blocks
}

/// Poll `condition` every millisecond until it holds or `max_wait_ms` passes.
pub fn wait_until(max_wait_ms: u64, mut condition: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    let timeout = Duration::from_millis(max_wait_ms);

    while start.elapsed() < timeout {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    false
}

/// Wait until the worker on `channel` has analysed `count` bundles.
pub fn wait_for_processed(engine: &ResonaEngine, channel: ChannelId, count: u64) -> bool {
    wait_until(5000, || engine.processed(channel) >= count)
}
