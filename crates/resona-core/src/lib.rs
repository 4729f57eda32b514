//! Real-time core of the resona analysis pipeline.
//!
//! Everything in this crate is either touched by the audio callback thread or
//! shared between it and the analysis workers, so the real-time paths are
//! lock-free and allocation-free.
//!
//! # Primary API
//!
//! - [`BundlePool`]: Reusable sample buffers handed out to the audio thread
//! - [`bundle_queue`]: Per-channel lock-free queue from the callback to a worker
//! - [`CallbackDriver`]: Demultiplexes interleaved device blocks into bundles
//! - [`AtomicBands`]: Lock-free 4-band aggregate for reactive consumers
//!
//! # Example
//!
//! ```
//! use resona_core::{bundle_queue, BundlePool, ChannelId};
//! use std::sync::Arc;
//!
//! let pool = Arc::new(BundlePool::new(8, 256));
//! pool.prewarm(8);
//! let (tx, rx) = bundle_queue(pool.max_bundles());
//!
//! let mut bundle = pool.try_acquire(ChannelId::input(0)).unwrap();
//! bundle.data.fill(0.5);
//! tx.try_enqueue(bundle).unwrap();
//!
//! let bundle = rx.try_dequeue().unwrap();
//! pool.release(bundle);
//! ```

pub mod error;
pub use error::{Error, Result};

pub mod channel;
pub use channel::{ChannelDirection, ChannelId, ChannelLayout, ChannelState};

mod bundle;
pub use bundle::Bundle;

pub mod pool;
pub use pool::BundlePool;

pub mod queue;
pub use queue::{bundle_queue, BundleReceiver, BundleSender};

pub(crate) mod lockfree;
pub use lockfree::{AtomicBands, AtomicFlag, AtomicFloat};

pub mod callback;
pub use callback::{AudioCallback, CallbackDriver, DriverStats, RouteTable};

/// Number of aggregate frequency bands published per channel.
pub const BAND_COUNT: usize = 4;
