//! # Resona Analysis
//!
//! Background spectral analysis of the channels tapped by
//! [`resona_core::CallbackDriver`].
//!
//! Each analysed channel gets one [`AnalysisWorker`] thread that drains the
//! channel's bundle queue, runs the [`SpectralPipeline`] and publishes an
//! [`AnalysisResult`] per bundle:
//!
//! - **Spectrum**: Hamming-windowed FFT, window-normalized power, decibels
//!   mapped onto 0..1
//! - **Buckets**: bins averaged through a cached [`PartitionTable`] (linear or
//!   power curve), optionally smoothed and blended over time
//! - **Bands**: four gain-weighted band levels in a lock-free [`AtomicBands`]
//! - **Publication**: a pooled multi-buffer so neither the worker nor the UI
//!   ever waits for the other
//!
//! [`AtomicBands`]: resona_core::AtomicBands
//!
//! ## Example
//!
//! ```rust
//! use resona_analysis::{AnalysisResult, AnalysisSettings, SpectralPipeline};
//! use resona_core::{AtomicBands, BundlePool, ChannelId, ChannelState};
//! use std::sync::Arc;
//!
//! let settings = AnalysisSettings {
//!     frames: 1024,
//!     spectrum_buckets: 64,
//!     ..Default::default()
//! };
//! let channel = ChannelId::input(0);
//! let mut pipeline = SpectralPipeline::new(
//!     channel,
//!     ChannelState::new(48000, 1),
//!     Arc::new(AtomicBands::new()),
//! );
//!
//! let pool = BundlePool::new(1, 1024);
//! let bundle = pool.acquire(channel).unwrap();
//! let mut result = AnalysisResult::new(channel);
//! pipeline.process(&bundle, &settings, &mut result);
//!
//! assert_eq!(result.buckets.len(), 64);
//! assert!(!result.audio_active);
//! ```

pub mod capture;
pub mod exchange;
pub mod partition;
pub mod result;
pub mod settings;
pub mod spectrum;
pub mod worker;

mod error;

pub use capture::InputCapture;
pub use error::{Error, Result};
pub use exchange::{result_exchange, ResultConsumer, ResultPublisher};
pub use partition::{PartitionKey, PartitionTable};
pub use result::AnalysisResult;
pub use settings::{AnalysisSettings, PartitionMode, SettingsHandle};
pub use spectrum::{band_levels, hamming_window, ProcessOutcome, SpectralPipeline};
pub use worker::{AnalysisWorker, ChannelReader, WorkerCommand, WorkerConfig, WorkerState};
