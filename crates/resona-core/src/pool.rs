//! Lock-free pool of reusable sample bundles.
//!
//! The audio thread draws from [`BundlePool::try_acquire`], which only hands
//! out pre-allocated bundles. Control and worker threads may use
//! [`BundlePool::acquire`], which is allowed to allocate while the pool is
//! below its bundle limit.

use crate::{Bundle, ChannelId};
use crossbeam_channel::{bounded, Receiver, Sender};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Fungible sample buffers shared by the audio thread and analysis workers.
pub struct BundlePool {
    spare_tx: Sender<Bundle>,
    spare_rx: Receiver<Bundle>,
    max_bundles: usize,
    /// Bundles created so far (spare + in flight). Never exceeds `max_bundles`.
    allocated: AtomicUsize,
    frames: AtomicUsize,
}

impl BundlePool {
    /// Create an empty pool that will never hold more than `max_bundles`.
    pub fn new(max_bundles: usize, frames: usize) -> Self {
        let max_bundles = max_bundles.max(1);
        let (spare_tx, spare_rx) = bounded(max_bundles);
        Self {
            spare_tx,
            spare_rx,
            max_bundles,
            allocated: AtomicUsize::new(0),
            frames: AtomicUsize::new(frames),
        }
    }

    /// Allocate up to `count` spare bundles. Call off the audio thread.
    ///
    /// Returns the number of bundles actually added.
    pub fn prewarm(&self, count: usize) -> usize {
        let frames = self.frames();
        let mut added = 0;
        for _ in 0..count {
            if !self.reserve_slot() {
                break;
            }
            let mut bundle = Bundle::with_capacity(frames);
            bundle.data.resize(frames, 0.0);
            if self.spare_tx.try_send(bundle).is_err() {
                self.allocated.fetch_sub(1, Ordering::AcqRel);
                break;
            }
            added += 1;
        }
        if added > 0 {
            tracing::debug!(
                "Bundle pool prewarmed {} bundles ({} / {})",
                added,
                self.allocated(),
                self.max_bundles
            );
        }
        added
    }

    /// Take a bundle, allocating one if no spare is available.
    ///
    /// Not real-time safe. Returns `None` once `max_bundles` are in flight.
    pub fn acquire(&self, channel: ChannelId) -> Option<Bundle> {
        let frames = self.frames();
        let mut bundle = match self.spare_rx.try_recv() {
            Ok(bundle) => bundle,
            Err(_) => {
                if !self.reserve_slot() {
                    return None;
                }
                Bundle::with_capacity(frames)
            }
        };
        bundle.data.clear();
        if bundle.data.capacity() < frames {
            bundle.data.reserve_exact(frames);
        }
        bundle.data.resize(frames, 0.0);
        bundle.channel = channel;
        Some(bundle)
    }

    /// Take a spare bundle without allocating.
    ///
    /// Real-time safe. The returned bundle holds exactly `frames()` samples.
    #[inline]
    pub fn try_acquire(&self, channel: ChannelId) -> Option<Bundle> {
        let frames = self.frames();
        let mut bundle = self.spare_rx.try_recv().ok()?;
        if bundle.data.capacity() < frames {
            // Stale bundle from before a reconfiguration; growing it would allocate.
            let _ = self.spare_tx.try_send(bundle);
            return None;
        }
        // Within capacity: length adjustment only.
        bundle.data.resize(frames, 0.0);
        bundle.channel = channel;
        Some(bundle)
    }

    /// Return a bundle for reuse.
    ///
    /// Bundles that predate a frame-size increase are grown here, on the
    /// releasing (worker) thread. Bundles acquired via `try_acquire` are never
    /// grown, so releasing them from the audio thread does not allocate.
    pub fn release(&self, mut bundle: Bundle) {
        let frames = self.frames();
        if bundle.data.capacity() < frames {
            bundle.data.clear();
            bundle.data.reserve_exact(frames);
        }
        if self.spare_tx.try_send(bundle).is_err() {
            // Only reachable if bundles from another pool are released here.
            self.allocated.fetch_sub(1, Ordering::AcqRel);
        }
    }

    /// Change the per-bundle frame count. Call only while no audio is flowing.
    pub fn set_frames(&self, frames: usize) {
        let previous = self.frames.swap(frames, Ordering::AcqRel);
        if previous == frames {
            return;
        }

        let spares: Vec<Bundle> = self.spare_rx.try_iter().collect();
        let count = spares.len();
        for mut bundle in spares {
            bundle.data.clear();
            if bundle.data.capacity() < frames {
                bundle.data.reserve_exact(frames);
            }
            bundle.data.resize(frames, 0.0);
            let _ = self.spare_tx.try_send(bundle);
        }
        tracing::debug!(
            "Bundle pool resized {} spares from {} to {} frames",
            count,
            previous,
            frames
        );
    }

    /// Current per-bundle frame count.
    #[inline]
    pub fn frames(&self) -> usize {
        self.frames.load(Ordering::Acquire)
    }

    pub fn max_bundles(&self) -> usize {
        self.max_bundles
    }

    /// Bundles created so far, spare or in flight.
    pub fn allocated(&self) -> usize {
        self.allocated.load(Ordering::Acquire)
    }

    /// Spare bundles ready for `try_acquire`.
    pub fn available(&self) -> usize {
        self.spare_rx.len()
    }

    /// Bundles currently handed out.
    pub fn in_flight(&self) -> usize {
        self.allocated().saturating_sub(self.available())
    }

    fn reserve_slot(&self) -> bool {
        self.allocated
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < self.max_bundles).then_some(n + 1)
            })
            .is_ok()
    }
}
