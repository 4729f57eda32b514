//! # Resona - Real-time Audio Analysis Pipeline
//!
//! Moves samples from an audio backend's callback thread to background
//! spectral analysis without ever blocking, locking or allocating on the
//! audio thread.
//!
//! ## Architecture
//!
//! Resona is an umbrella crate that coordinates:
//! - **resona-core** - Real-time side (bundle pool, lock-free queues, callback driver)
//! - **resona-analysis** - Analysis workers (FFT pipeline, partitions, result hand-off)
//!
//! ```text
//! backend callback -> CallbackDriver -> BundlePool -> bundle queue
//!     -> AnalysisWorker -> SpectralPipeline -> ResultConsumer -> UI
//! ```
//!
//! ## Quick Start
//!
//! ```
//! use resona::prelude::*;
//!
//! let engine = ResonaEngine::builder()
//!     .input_state(ChannelState::new(44100, 2))
//!     .build()?;
//!
//! // Analyse every channel of the device
//! engine.create_all();
//!
//! // The backend calls this from its audio thread
//! let mut driver = engine.capture_driver();
//! let block = vec![0.0f32; 512 * 2];
//! driver.on_audio_block(Some(&block), None, 512, ChannelLayout::new(2, 0));
//!
//! // UI thread
//! if let Some(result) = engine.get_latest_result(ChannelId::input(0)) {
//!     println!("{} buckets", result.buckets.len());
//! }
//! let bands = engine.get_band_levels(ChannelId::input(0));
//! # let _ = bands;
//! # Ok::<(), resona::Error>(())
//! ```
//!
//! ## Feature Flags
//!
//! - `serialization` - serde derives on [`AnalysisSettings`](analysis::AnalysisSettings)

/// Re-export of resona-core for direct access
pub use resona_core as core;

/// Re-export of resona-analysis for direct access
pub use resona_analysis as analysis;

// Real-time side
pub use resona_core::{
    AudioCallback, Bundle, BundlePool, CallbackDriver, ChannelDirection, ChannelId, ChannelLayout,
    ChannelState, DriverStats, BAND_COUNT,
};

// Analysis side
pub use resona_analysis::{
    AnalysisResult, AnalysisSettings, ChannelReader, PartitionMode, SettingsHandle, WorkerState,
};

mod builder;
mod config;
mod engine;
mod error;

pub use builder::ResonaEngineBuilder;
pub use config::EngineConfig;
pub use engine::ResonaEngine;
pub use error::{Error, Result};

/// Convenience prelude for common imports
pub mod prelude {
    // Main engine
    pub use crate::{EngineConfig, ResonaEngine, ResonaEngineBuilder};

    // Channels and the callback contract
    pub use crate::core::{AudioCallback, ChannelId, ChannelLayout, ChannelState};

    // Analysis output and settings
    pub use crate::analysis::{AnalysisResult, AnalysisSettings, PartitionMode};
}
