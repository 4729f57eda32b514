//! Analysis settings and their lock-free snapshot handle.
//!
//! Settings are read by the workers once per pipeline pass. Changes from a UI
//! thread replace the whole value through [`SettingsHandle`], so a worker
//! never sees a partially edited struct.

use arc_swap::ArcSwap;
use resona_core::BAND_COUNT;
use std::sync::Arc;

/// Smallest supported FFT frame size.
pub const MIN_FRAMES: usize = 64;

/// Largest supported FFT frame size.
pub const MAX_FRAMES: usize = 8192;

/// Lower bound on display buckets.
pub const MIN_BUCKETS: usize = 4;

/// Power floor applied before `log10`.
pub const MIN_POWER: f32 = 1e-10;

/// Highest band boundary accepted, in Hz.
pub const MAX_BAND_FREQUENCY: u32 = 22000;

/// How FFT bins are grouped into display buckets.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub enum PartitionMode {
    /// Equal-width buckets.
    #[default]
    Linear,
    /// Boundaries follow `limit * (i / n) ^ sharpness`. Values above 1 give
    /// low frequencies more buckets.
    PowerCurve { sharpness: f32 },
}

impl PartitionMode {
    pub fn sharpness(&self) -> f32 {
        match self {
            Self::Linear => 1.0,
            Self::PowerCurve { sharpness } => *sharpness,
        }
    }
}

/// Per-pass configuration of the spectral pipeline.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct AnalysisSettings {
    /// FFT frame size (power of two)
    pub frames: usize,
    /// Requested display bucket count
    pub spectrum_buckets: usize,
    /// EMA half-life of the bucket blend, in milliseconds
    pub blend_factor: f32,
    /// Enable temporal blending of buckets
    pub blend_fft: bool,
    /// Enable triangular smoothing across bins
    pub filter_fft: bool,
    /// Normalize the published waveform snapshot into 0..1
    pub normalize_audio: bool,
    /// Zero the DC bin
    pub suppress_dc: bool,
    pub partition: PartitionMode,
    /// Upper edge of each aggregate band, in Hz
    pub spectrum_frequencies: [u32; BAND_COUNT],
    pub spectrum_gains: [f32; BAND_COUNT],
    /// Decibel span mapped onto 0..1
    pub audio_decibel_range: f32,
    /// Weight of the newest band vector (1.0 = no smoothing)
    pub band_blend: f32,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            frames: 4096,
            spectrum_buckets: 512,
            blend_factor: 100.0,
            blend_fft: true,
            filter_fft: true,
            normalize_audio: false,
            suppress_dc: false,
            partition: PartitionMode::Linear,
            spectrum_frequencies: [100, 500, 3000, 10000],
            spectrum_gains: [1.0; BAND_COUNT],
            audio_decibel_range: 110.0,
            band_blend: 1.0,
        }
    }
}

impl AnalysisSettings {
    /// Clamp every field into its supported range.
    pub fn validate(&mut self) {
        self.frames = self.fft_frames();
        self.spectrum_buckets = self.spectrum_buckets.clamp(MIN_BUCKETS, self.frames / 2);
        self.blend_factor = self.blend_factor.clamp(1.0, 1000.0);
        if let PartitionMode::PowerCurve { sharpness } = &mut self.partition {
            *sharpness = sharpness.clamp(0.1, 8.0);
        }

        let mut floor = 0;
        for freq in self.spectrum_frequencies.iter_mut() {
            *freq = (*freq).clamp(floor, MAX_BAND_FREQUENCY);
            floor = *freq;
        }
        for gain in self.spectrum_gains.iter_mut() {
            *gain = gain.max(0.0);
        }

        self.audio_decibel_range = self.audio_decibel_range.max(1.0);
        self.band_blend = self.band_blend.clamp(0.0, 1.0);
    }

    /// Builder-style variant of [`validate`](Self::validate).
    pub fn validated(mut self) -> Self {
        self.validate();
        self
    }

    /// `frames` rounded into a supported FFT size, whether or not the
    /// settings were validated.
    pub fn fft_frames(&self) -> usize {
        self.frames.clamp(MIN_FRAMES, MAX_FRAMES).next_power_of_two()
    }

    /// Number of FFT output bins (`frames / 2 + 1`).
    pub fn output_samples(&self) -> usize {
        self.frames / 2 + 1
    }

    /// Normalized level of the power floor; silence lands here.
    pub fn floor_level(&self) -> f32 {
        let floor_db = 10.0 * MIN_POWER.log10();
        (1.0 + floor_db / self.audio_decibel_range.max(1.0)).clamp(0.0, 1.0)
    }

    /// EMA coefficient for a frame of `frame_seconds`.
    pub fn blend_alpha(&self, frame_seconds: f32) -> f32 {
        let blend_seconds = (self.blend_factor / 1000.0).max(1e-4);
        (1.0 - (-frame_seconds / blend_seconds).exp()).clamp(0.0, 1.0)
    }
}

/// Shared, swappable settings snapshot.
#[derive(Clone)]
pub struct SettingsHandle {
    inner: Arc<ArcSwap<AnalysisSettings>>,
}

impl SettingsHandle {
    pub fn new(settings: AnalysisSettings) -> Self {
        Self {
            inner: Arc::new(ArcSwap::from_pointee(settings.validated())),
        }
    }

    /// Current snapshot. Cheap; hold it for the duration of one pass.
    pub fn load(&self) -> Arc<AnalysisSettings> {
        self.inner.load_full()
    }

    /// Replace the settings wholesale (validated first).
    pub fn store(&self, settings: AnalysisSettings) {
        self.inner.store(Arc::new(settings.validated()));
    }

    /// Read-copy-update a subset of fields.
    pub fn update(&self, mut f: impl FnMut(&mut AnalysisSettings)) {
        self.inner.rcu(|current| {
            let mut next = AnalysisSettings::clone(current);
            f(&mut next);
            next.validated()
        });
    }
}

impl Default for SettingsHandle {
    fn default() -> Self {
        Self::new(AnalysisSettings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_default_settings_are_valid() {
        let settings = AnalysisSettings::default();
        assert_eq!(settings.clone().validated(), settings);
        assert_eq!(settings.output_samples(), 2049);
    }

    #[test]
    fn test_validate_clamps() {
        let mut settings = AnalysisSettings {
            frames: 100,
            spectrum_buckets: 1000,
            blend_factor: 0.0,
            spectrum_frequencies: [500, 100, 30000, 200],
            audio_decibel_range: 0.0,
            ..Default::default()
        };
        settings.validate();
        assert_eq!(settings.frames, 128);
        assert_eq!(settings.spectrum_buckets, 64);
        assert_eq!(settings.blend_factor, 1.0);
        assert_eq!(settings.spectrum_frequencies, [500, 500, 22000, 22000]);
        assert_eq!(settings.audio_decibel_range, 1.0);
    }

    #[test]
    fn test_bucket_floor() {
        let settings = AnalysisSettings {
            spectrum_buckets: 1,
            ..Default::default()
        }
        .validated();
        assert_eq!(settings.spectrum_buckets, MIN_BUCKETS);
    }

    #[test]
    fn test_floor_level() {
        let settings = AnalysisSettings::default();
        // -100 dB over a 110 dB range
        assert_relative_eq!(settings.floor_level(), 1.0 - 100.0 / 110.0, epsilon = 1e-6);
    }

    #[test]
    fn test_blend_alpha() {
        let settings = AnalysisSettings::default();
        let alpha = settings.blend_alpha(0.1);
        assert_relative_eq!(alpha, 1.0 - (-1.0f32).exp(), epsilon = 1e-6);
        assert_eq!(settings.blend_alpha(0.0), 0.0);
    }

    #[test]
    fn test_handle_update_is_whole_value() {
        let handle = SettingsHandle::default();
        let before = handle.load();
        handle.update(|s| s.spectrum_buckets = 256);
        assert_eq!(before.spectrum_buckets, 512);
        assert_eq!(handle.load().spectrum_buckets, 256);
    }

    #[test]
    fn test_handle_store_validates() {
        let handle = SettingsHandle::default();
        handle.store(AnalysisSettings {
            frames: 1_000_000,
            ..Default::default()
        });
        assert_eq!(handle.load().frames, MAX_FRAMES);
    }
}
