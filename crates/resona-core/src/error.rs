//! Error types for resona-core.

use crate::ChannelId;
use thiserror::Error;

/// Error type for resona-core operations.
///
/// None of these are produced on the real-time thread; the callback path
/// only counts drops.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Channel {0} is not routed")]
    UnknownChannel(ChannelId),

    #[error("Channel index {index} out of range (device has {count} channels)")]
    ChannelOutOfRange { index: u32, count: u32 },
}

/// Result type alias.
pub type Result<T> = core::result::Result<T, Error>;
