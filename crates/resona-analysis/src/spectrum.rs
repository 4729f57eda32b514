//! Per-channel spectral pipeline.
//!
//! One pass per incoming bundle:
//!
//! 1. Shift the bundle into a sliding window of `frames` samples
//! 2. Skip the FFT when the window's peak-to-peak range is below
//!    [`ACTIVITY_THRESHOLD`] (the result is still published, at floor level)
//! 3. Apply a Hamming window and run a forward FFT
//! 4. Convert to window-normalized power, then to decibels mapped onto 0..1
//! 5. Optionally smooth across bins with a `[1, 2, 3, 2, 1] / 9` kernel
//! 6. Average bins into display buckets via a cached [`PartitionTable`]
//! 7. Optionally blend buckets over time (EMA in the normalized dB domain)
//! 8. Reduce buckets to four gain-weighted bands in an [`AtomicBands`]
//!
//! Frame size changes are picked up at the start of a pass; the plan, window
//! and buffers are rebuilt before any sample is touched.

use crate::partition::{PartitionKey, PartitionTable};
use crate::settings::{AnalysisSettings, MIN_BUCKETS, MIN_POWER};
use crate::AnalysisResult;
use resona_core::{AtomicBands, Bundle, ChannelId, ChannelState, BAND_COUNT};
use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::sync::Arc;

/// Peak-to-peak range below which a window counts as silent.
pub const ACTIVITY_THRESHOLD: f32 = 0.001;

/// What a pipeline pass had to do besides the regular computation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessOutcome {
    /// FFT plan, window and buffers were rebuilt for a new frame size
    pub reinitialized: bool,
    /// Bucket boundaries were regenerated
    pub partitions_regenerated: bool,
    /// The window was above the activity threshold
    pub active: bool,
}

/// Owns all FFT and smoothing state of one analysed channel.
pub struct SpectralPipeline {
    channel: ChannelId,
    state: ChannelState,
    frames: usize,
    planner: FftPlanner<f32>,
    fft: Option<Arc<dyn Fft<f32>>>,
    fft_buffer: Vec<Complex<f32>>,
    fft_scratch: Vec<Complex<f32>>,
    window: Vec<f32>,
    window_sum: f32,
    /// Sliding window of raw samples, oldest first
    audio: Vec<f32>,
    smoothing_scratch: Vec<f32>,
    partitions: PartitionTable,
    ema: Vec<f32>,
    bands: Arc<AtomicBands>,
}

impl SpectralPipeline {
    pub fn new(channel: ChannelId, state: ChannelState, bands: Arc<AtomicBands>) -> Self {
        Self {
            channel,
            state,
            frames: 0,
            planner: FftPlanner::new(),
            fft: None,
            fft_buffer: Vec::new(),
            fft_scratch: Vec::new(),
            window: Vec::new(),
            window_sum: 0.0,
            audio: Vec::new(),
            smoothing_scratch: Vec::new(),
            partitions: PartitionTable::new(),
            ema: Vec::new(),
            bands,
        }
    }

    pub fn channel(&self) -> ChannelId {
        self.channel
    }

    /// Frame size of the current plan (0 before the first pass).
    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn partitions(&self) -> &PartitionTable {
        &self.partitions
    }

    pub fn bands(&self) -> &Arc<AtomicBands> {
        &self.bands
    }

    /// Run one pass over `bundle` and write the outcome into `result`.
    pub fn process(
        &mut self,
        bundle: &Bundle,
        settings: &AnalysisSettings,
        result: &mut AnalysisResult,
    ) -> ProcessOutcome {
        let mut outcome = ProcessOutcome::default();
        let frames = settings.fft_frames();
        if self.frames != frames || self.fft.is_none() {
            self.reinitialize(frames);
            outcome.reinitialized = true;
        }

        self.push_samples(&bundle.data);

        let (min, max) = self
            .audio
            .iter()
            .fold((f32::MAX, f32::MIN), |(lo, hi), &s| (lo.min(s), hi.max(s)));
        let active = max - min > ACTIVITY_THRESHOLD;
        outcome.active = active;

        self.transform(active);
        self.fill_spectrum(settings, result);

        if settings.filter_fft {
            smooth(&mut result.spectrum, &mut self.smoothing_scratch);
        }

        outcome.partitions_regenerated = self.fill_buckets(settings, result);

        let block_seconds = (bundle.data.len() as f64 * self.state.delta_time()) as f32;
        self.blend_buckets(settings, block_seconds, &mut result.buckets);

        let levels = band_levels(settings, self.state.sample_rate, &result.buckets);
        self.bands.blend(levels, settings.band_blend);

        result.channel = self.channel;
        result.source_sequence = bundle.sequence;
        result.sample_rate = self.state.sample_rate;
        result.frames = self.frames;
        result.audio_active = active;
        result.peak_bin = if active {
            peak_bin(&result.spectrum_raw)
        } else {
            0
        };
        result.bucket_boundaries.clear();
        result
            .bucket_boundaries
            .extend_from_slice(self.partitions.boundaries());
        self.snapshot_audio(settings.normalize_audio, min, max, &mut result.audio);

        outcome
    }

    /// Forget accumulated history (sliding window, blend state, band levels).
    pub fn reset(&mut self) {
        self.audio.fill(0.0);
        self.ema.clear();
        self.bands.reset();
    }

    fn reinitialize(&mut self, frames: usize) {
        let fft = self.planner.plan_fft_forward(frames);
        self.fft_scratch
            .resize(fft.get_inplace_scratch_len(), Complex::default());
        self.fft_buffer.clear();
        self.fft_buffer.resize(frames, Complex::default());
        self.fft = Some(fft);

        self.window = hamming_window(frames);
        self.window_sum = self.window.iter().sum();

        self.audio.clear();
        self.audio.resize(frames, 0.0);
        self.ema.clear();

        tracing::debug!(
            "Analysis {}: initialized {}-point FFT ({} bins)",
            self.channel,
            frames,
            frames / 2 + 1
        );
        self.frames = frames;
    }

    fn push_samples(&mut self, samples: &[f32]) {
        let frames = self.audio.len();
        let n = samples.len();
        if n >= frames {
            self.audio.copy_from_slice(&samples[n - frames..]);
        } else {
            self.audio.copy_within(n.., 0);
            self.audio[frames - n..].copy_from_slice(samples);
        }
    }

    fn transform(&mut self, active: bool) {
        if !active {
            self.fft_buffer.fill(Complex::default());
            return;
        }
        for ((dst, &sample), &w) in self
            .fft_buffer
            .iter_mut()
            .zip(self.audio.iter())
            .zip(self.window.iter())
        {
            *dst = Complex::new(sample * w, 0.0);
        }
        if let Some(fft) = &self.fft {
            fft.process_with_scratch(&mut self.fft_buffer, &mut self.fft_scratch);
        }
    }

    fn fill_spectrum(&self, settings: &AnalysisSettings, result: &mut AnalysisResult) {
        let output_samples = self.frames / 2 + 1;
        let nyquist = self.frames / 2;
        let norm = 1.0 / (self.window_sum * self.window_sum).max(f32::EPSILON);
        let range = settings.audio_decibel_range.max(1.0);

        result.spectrum_raw.resize(output_samples, 0.0);
        result.spectrum.resize(output_samples, 0.0);

        for bin in 0..output_samples {
            let mut power = self.fft_buffer[bin].norm_sqr() * norm;
            // Only half the spectrum is kept.
            if bin != 0 && bin != nyquist {
                power *= 2.0;
            }
            if bin == 0 && settings.suppress_dc {
                power = 0.0;
            }
            result.spectrum_raw[bin] = power;

            let db = 10.0 * power.max(MIN_POWER).log10();
            result.spectrum[bin] = (db / range + 1.0).clamp(0.0, 1.0);
        }
    }

    fn fill_buckets(&mut self, settings: &AnalysisSettings, result: &mut AnalysisResult) -> bool {
        let limit = self.frames / 2;
        let key = PartitionKey {
            limit,
            buckets: settings.spectrum_buckets.clamp(MIN_BUCKETS, limit.max(MIN_BUCKETS)),
            mode: settings.partition,
        };
        let regenerated = self.partitions.ensure(key);
        if regenerated {
            tracing::debug!(
                "Analysis {}: partitioned {} bins into {} buckets ({:?})",
                self.channel,
                limit,
                self.partitions.len(),
                key.mode
            );
        }

        result.buckets.resize(self.partitions.len(), 0.0);
        for (i, bucket) in result.buckets.iter_mut().enumerate() {
            let bins = &result.spectrum[self.partitions.bucket_bins(i)];
            *bucket = bins.iter().sum::<f32>() / bins.len().max(1) as f32;
        }
        regenerated
    }

    fn blend_buckets(&mut self, settings: &AnalysisSettings, block_seconds: f32, buckets: &mut [f32]) {
        if self.ema.len() != buckets.len() {
            self.ema.clear();
            self.ema.extend_from_slice(buckets);
            return;
        }
        if !settings.blend_fft {
            self.ema.copy_from_slice(buckets);
            return;
        }
        let alpha = settings.blend_alpha(block_seconds);
        for (avg, bucket) in self.ema.iter_mut().zip(buckets.iter_mut()) {
            *avg += alpha * (*bucket - *avg);
            *bucket = *avg;
        }
    }

    fn snapshot_audio(&self, normalize: bool, min: f32, max: f32, out: &mut Vec<f32>) {
        out.clear();
        out.extend_from_slice(&self.audio);
        if normalize {
            let range = max - min;
            if range > ACTIVITY_THRESHOLD {
                for sample in out.iter_mut() {
                    *sample = (*sample - min) / range;
                }
            } else {
                out.fill(0.5);
            }
        }
    }
}

/// Hamming window: `0.54 - 0.46 cos(2 pi i / (N - 1))`.
pub fn hamming_window(size: usize) -> Vec<f32> {
    if size < 2 {
        return vec![1.0; size];
    }
    (0..size)
        .map(|i| {
            let angle = 2.0 * core::f32::consts::PI * i as f32 / (size - 1) as f32;
            0.54 - 0.46 * angle.cos()
        })
        .collect()
}

/// Triangular smoothing across bins. The two outermost bins on each side keep
/// their values.
fn smooth(spectrum: &mut [f32], scratch: &mut Vec<f32>) {
    if spectrum.len() < 5 {
        return;
    }
    scratch.clear();
    scratch.extend_from_slice(spectrum);
    for i in 2..spectrum.len() - 2 {
        spectrum[i] = (scratch[i - 2]
            + 2.0 * scratch[i - 1]
            + 3.0 * scratch[i]
            + 2.0 * scratch[i + 1]
            + scratch[i + 2])
            / 9.0;
    }
}

fn peak_bin(power: &[f32]) -> usize {
    power
        .iter()
        .enumerate()
        .skip(1)
        .max_by(|a, b| a.1.total_cmp(b.1))
        .map(|(i, _)| i)
        .unwrap_or(0)
}

/// Average buckets into the four configured bands.
///
/// Each band ends at `frequency / (sample_rate / buckets)`, plus one bucket
/// for all but the last band. Empty bands read as 0.
pub fn band_levels(
    settings: &AnalysisSettings,
    sample_rate: u32,
    buckets: &[f32],
) -> [f32; BAND_COUNT] {
    let mut levels = [0.0; BAND_COUNT];
    let n = buckets.len();
    if n == 0 || sample_rate == 0 {
        return levels;
    }
    let per_bucket = sample_rate as f32 / n as f32;

    let mut start = 0;
    for (band, level) in levels.iter_mut().enumerate() {
        let extra = usize::from(band + 1 < BAND_COUNT);
        let edge = (settings.spectrum_frequencies[band] as f32 / per_bucket) as usize + extra;
        let end = edge.clamp(start, n);
        let slice = &buckets[start..end];
        if !slice.is_empty() {
            *level = slice.iter().sum::<f32>() / slice.len() as f32
                * settings.spectrum_gains[band];
        }
        start = end;
    }
    levels
}
