//! Builder for configuring and constructing a `ResonaEngine`.

use crate::{EngineConfig, ResonaEngine, Result};
use resona_analysis::AnalysisSettings;
use resona_core::ChannelState;
use std::time::Duration;

/// The device itself is opened by the host; the builder only needs the stream
/// parameters it negotiated.
///
/// # Example
///
/// ```
/// use resona::prelude::*;
///
/// let engine = ResonaEngine::builder()
///     .input_state(ChannelState::new(48000, 2))
///     .output_state(ChannelState::new(48000, 2))
///     .block_frames(512)
///     .build()?;
///
/// assert_eq!(engine.pool().max_bundles(), 64);
/// # Ok::<(), resona::Error>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct ResonaEngineBuilder {
    config: EngineConfig,
    settings: AnalysisSettings,
    input_state: ChannelState,
    output_state: ChannelState,
}

impl ResonaEngineBuilder {
    /// Initial analysis settings (validated on build).
    pub fn settings(mut self, settings: AnalysisSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Default: 64
    pub fn pool_size(mut self, bundles: usize) -> Self {
        self.config.pool_size = bundles;
        self
    }

    /// Default: 1024
    pub fn block_frames(mut self, frames: usize) -> Self {
        self.config.block_frames = frames;
        self
    }

    /// Default: 3
    pub fn result_cache(mut self, results: usize) -> Self {
        self.config.result_cache = results;
        self
    }

    /// Default: 1 ms
    pub fn wake_interval(mut self, interval: Duration) -> Self {
        self.config.wake_interval = interval;
        self
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Capture side of the device. Default: 44100 Hz, 2 channels
    pub fn input_state(mut self, state: ChannelState) -> Self {
        self.input_state = state;
        self
    }

    /// Playback side of the device. Default: 44100 Hz, 2 channels
    pub fn output_state(mut self, state: ChannelState) -> Self {
        self.output_state = state;
        self
    }

    pub fn build(self) -> Result<ResonaEngine> {
        self.config.validate()?;
        Ok(ResonaEngine::from_parts(
            self.config,
            self.settings,
            self.input_state,
            self.output_state,
        ))
    }
}
