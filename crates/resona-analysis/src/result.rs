//! One completed spectral analysis pass.

use resona_core::ChannelId;

/// Snapshot published by an analysis worker.
///
/// Instances are pooled: the worker refills a recycled result each pass, so
/// the vectors keep their capacity across frames.
#[derive(Debug, Clone)]
pub struct AnalysisResult {
    pub channel: ChannelId,
    /// Publish counter of the producing worker (starts at 0).
    pub sequence: u64,
    /// Sequence number of the bundle that completed this pass.
    pub source_sequence: u64,
    pub sample_rate: u32,
    /// FFT frame size used for this pass
    pub frames: usize,
    /// Window-normalized power per bin (`frames / 2 + 1` values)
    pub spectrum_raw: Vec<f32>,
    /// Decibels mapped onto 0..1 per bin
    pub spectrum: Vec<f32>,
    /// Display buckets derived from `spectrum`
    pub buckets: Vec<f32>,
    /// Inclusive upper bin of each bucket
    pub bucket_boundaries: Vec<usize>,
    /// Rolling waveform of the last `frames` samples
    pub audio: Vec<f32>,
    /// False when the window's peak-to-peak range was below the activity threshold
    pub audio_active: bool,
    /// Bin with the largest power, DC excluded
    pub peak_bin: usize,
}

impl AnalysisResult {
    pub fn new(channel: ChannelId) -> Self {
        Self {
            channel,
            sequence: 0,
            source_sequence: 0,
            sample_rate: 0,
            frames: 0,
            spectrum_raw: Vec::new(),
            spectrum: Vec::new(),
            buckets: Vec::new(),
            bucket_boundaries: Vec::new(),
            audio: Vec::new(),
            audio_active: false,
            peak_bin: 0,
        }
    }

    /// Width of one FFT bin in Hz.
    pub fn bin_width(&self) -> f32 {
        if self.frames == 0 {
            return 0.0;
        }
        self.sample_rate as f32 / self.frames as f32
    }

    /// Center frequency of `bin` in Hz.
    pub fn bin_frequency(&self, bin: usize) -> f32 {
        bin as f32 * self.bin_width()
    }

    /// Index of the loudest bucket.
    pub fn peak_bucket(&self) -> Option<usize> {
        self.buckets
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
    }

    /// Center frequency of bucket `index` in Hz; `None` past the last bucket.
    pub fn bucket_frequency(&self, index: usize) -> Option<f32> {
        let hi = *self.bucket_boundaries.get(index)?;
        let lo = match index.checked_sub(1) {
            Some(prev) => self.bucket_boundaries[prev] + 1,
            None => 1,
        };
        Some((lo + hi) as f32 * 0.5 * self.bin_width())
    }
}
