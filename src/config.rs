//! Engine-level resource configuration.

use crate::Result;
use resona_analysis::WorkerConfig;
use resona_core::Error;
use std::time::Duration;

/// Sizing of the shared bundle pool and the analysis workers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineConfig {
    /// Bundles shared by all analysed channels. Also the capacity of every
    /// channel queue, so a queue can only fill up once the pool is empty.
    pub pool_size: usize,
    /// Largest callback block, in frames, a bundle can hold
    pub block_frames: usize,
    /// Result objects cached per worker
    pub result_cache: usize,
    /// Worker sleep when its queue is empty
    pub wake_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            pool_size: 64,
            block_frames: 1024,
            result_cache: 3,
            wake_interval: Duration::from_millis(1),
        }
    }
}

impl EngineConfig {
    pub const MAX_BLOCK_FRAMES: usize = 16384;

    pub fn validate(&self) -> Result<()> {
        if self.pool_size < 2 {
            return Err(Error::InvalidConfig(format!(
                "pool_size {} too small (at least 2 bundles)",
                self.pool_size
            ))
            .into());
        }
        if self.block_frames == 0 || self.block_frames > Self::MAX_BLOCK_FRAMES {
            return Err(Error::InvalidConfig(format!(
                "block_frames {} out of range (1-{})",
                self.block_frames,
                Self::MAX_BLOCK_FRAMES
            ))
            .into());
        }
        if self.result_cache < WorkerConfig::MIN_RESULT_CACHE {
            return Err(Error::InvalidConfig(format!(
                "result_cache {} too small (at least {})",
                self.result_cache,
                WorkerConfig::MIN_RESULT_CACHE
            ))
            .into());
        }
        if self.wake_interval < WorkerConfig::MIN_WAKE_INTERVAL
            || self.wake_interval > WorkerConfig::MAX_WAKE_INTERVAL
        {
            return Err(Error::InvalidConfig(format!(
                "wake_interval {:?} out of range ({:?}-{:?})",
                self.wake_interval,
                WorkerConfig::MIN_WAKE_INTERVAL,
                WorkerConfig::MAX_WAKE_INTERVAL
            ))
            .into());
        }
        Ok(())
    }

    pub fn worker_config(&self) -> WorkerConfig {
        WorkerConfig {
            result_cache: self.result_cache,
            wake_interval: self.wake_interval,
        }
    }
}
