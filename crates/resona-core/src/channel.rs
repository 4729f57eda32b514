//! Channel identity and per-device stream state.

use core::fmt;
use core::time::Duration;

/// Which side of the device a channel belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ChannelDirection {
    Input,
    Output,
}

/// A single mono channel of the device, e.g. input 0 or output 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId {
    pub direction: ChannelDirection,
    pub index: u32,
}

impl ChannelId {
    pub const fn new(direction: ChannelDirection, index: u32) -> Self {
        Self { direction, index }
    }

    pub const fn input(index: u32) -> Self {
        Self::new(ChannelDirection::Input, index)
    }

    pub const fn output(index: u32) -> Self {
        Self::new(ChannelDirection::Output, index)
    }

    pub fn is_input(&self) -> bool {
        self.direction == ChannelDirection::Input
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.direction {
            ChannelDirection::Input => write!(f, "in:{}", self.index),
            ChannelDirection::Output => write!(f, "out:{}", self.index),
        }
    }
}

/// Stream parameters for one direction of the device.
///
/// Immutable for the duration of one buffer. Device reconfiguration replaces
/// it wholesale.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelState {
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Interleaved channel count
    pub channel_count: u32,
    /// Frame count of the current buffer
    pub frames: u32,
    /// Frames processed since the stream started
    pub total_frames: u64,
}

impl Default for ChannelState {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            channel_count: 2,
            frames: 0,
            total_frames: 0,
        }
    }
}

impl ChannelState {
    pub fn new(sample_rate: u32, channel_count: u32) -> Self {
        Self {
            sample_rate,
            channel_count,
            ..Default::default()
        }
    }

    /// Seconds per sample.
    #[inline]
    pub fn delta_time(&self) -> f64 {
        1.0 / self.sample_rate.max(1) as f64
    }

    /// Wall-clock length of `frames` samples at this rate.
    pub fn duration_of(&self, frames: usize) -> Duration {
        Duration::from_secs_f64(frames as f64 * self.delta_time())
    }

    /// Wall-clock length of the current buffer.
    pub fn buffer_duration(&self) -> Duration {
        self.duration_of(self.frames as usize)
    }
}

/// Interleaving of one callback block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChannelLayout {
    pub input_channels: u32,
    pub output_channels: u32,
}

impl ChannelLayout {
    pub fn new(input_channels: u32, output_channels: u32) -> Self {
        Self {
            input_channels,
            output_channels,
        }
    }
}
