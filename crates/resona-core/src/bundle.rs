use crate::ChannelId;

/// One channel's samples for one audio block.
///
/// Owned by the audio thread while it is filled, moved through the channel's
/// queue to its worker, and released back to the [`BundlePool`](crate::BundlePool)
/// once analysed. The sample vector is never reallocated on the audio thread.
#[derive(Debug, Clone)]
pub struct Bundle {
    pub channel: ChannelId,
    /// Per-channel block counter stamped by the callback driver.
    pub sequence: u64,
    pub data: Vec<f32>,
}

impl Bundle {
    pub(crate) fn with_capacity(frames: usize) -> Self {
        Self {
            channel: ChannelId::input(0),
            sequence: 0,
            data: Vec::with_capacity(frames),
        }
    }

    /// Number of samples carried.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
