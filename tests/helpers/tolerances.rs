//! Tolerance constants for analysis tests.

/// Floating point rounding errors (copies, the smoothing kernel on a flat
/// spectrum).
pub const FLOAT_EPSILON: f32 = 1e-6;

/// FFT and windowing differences between platforms.
pub const DSP_EPSILON: f32 = 1e-4;

/// Width of one display bucket at 44.1 kHz with 512 buckets, in Hz.
pub const BUCKET_WIDTH_HZ: f32 = 44100.0 / 2.0 / 512.0;

/// Generous upper bound for one real-time callback. Real calls take
/// microseconds; this only catches a call that waited on a worker.
pub const CALLBACK_BUDGET_MS: u128 = 20;
