//! Error types for resona-analysis.

use resona_core::ChannelId;
use thiserror::Error;

/// Error type for analysis worker and capture operations.
///
/// The spectral pipeline itself never fails; numeric edge cases are clamped.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Failed to spawn analysis thread for {channel}: {source}")]
    ThreadSpawn {
        channel: ChannelId,
        #[source]
        source: std::io::Error,
    },

    #[error("Analysis worker for {0} is already running")]
    AlreadyRunning(ChannelId),

    #[error("Analysis worker for {0} is not running")]
    NotRunning(ChannelId),

    #[error("Capture is only available on input channels, got {0}")]
    CaptureOnOutput(ChannelId),

    #[error("WAV write failed: {0}")]
    Wav(#[from] hound::Error),

    #[error(transparent)]
    Core(#[from] resona_core::Error),
}

/// Result type alias.
pub type Result<T> = core::result::Result<T, Error>;
