//! Per-channel bundle queue from the audio callback to an analysis worker.
//!
//! Backed by a bounded crossbeam channel whose capacity matches the bundle
//! pool's limit. Since every queued bundle comes from the pool, the queue can
//! only be full when the pool itself is exhausted; enqueue never blocks and
//! never allocates.

use crate::{Bundle, BundlePool};
use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError, TrySendError};

/// Producer half, held by the callback driver's route table.
#[derive(Clone)]
pub struct BundleSender {
    tx: Sender<Bundle>,
}

/// Consumer half, owned by the channel's analysis worker.
pub struct BundleReceiver {
    rx: Receiver<Bundle>,
}

/// Create a queue able to hold `capacity` bundles.
pub fn bundle_queue(capacity: usize) -> (BundleSender, BundleReceiver) {
    let (tx, rx) = bounded(capacity.max(1));
    (BundleSender { tx }, BundleReceiver { rx })
}

impl BundleSender {
    /// Enqueue without blocking. On failure the bundle is handed back so the
    /// caller can return it to the pool.
    #[inline]
    pub fn try_enqueue(&self, bundle: Bundle) -> Result<(), Bundle> {
        self.tx.try_send(bundle).map_err(|e| match e {
            TrySendError::Full(b) | TrySendError::Disconnected(b) => b,
        })
    }

    /// Bundles waiting to be analysed.
    pub fn len(&self) -> usize {
        self.tx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.is_empty()
    }
}

impl BundleReceiver {
    /// Non-blocking dequeue. `None` just means no block has arrived yet.
    #[inline]
    pub fn try_dequeue(&self) -> Option<Bundle> {
        self.rx.try_recv().ok()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Return every queued bundle to `pool`. Used on teardown, never by a
    /// running worker.
    pub fn drain_into(&self, pool: &BundlePool) -> usize {
        let mut count = 0;
        while let Ok(bundle) = self.rx.try_recv() {
            pool.release(bundle);
            count += 1;
        }
        count
    }

    /// Return queued bundles to `pool` and report whether every sender is
    /// gone. Once this returns `true` nothing can be enqueued any more and
    /// the receiver can be dropped without losing a bundle.
    pub fn drain_closed(&self, pool: &BundlePool) -> bool {
        loop {
            match self.rx.try_recv() {
                Ok(bundle) => pool.release(bundle),
                Err(TryRecvError::Empty) => return false,
                Err(TryRecvError::Disconnected) => return true,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ChannelId;

    #[test]
    fn test_fifo_order() {
        let pool = BundlePool::new(8, 4);
        pool.prewarm(8);
        let (tx, rx) = bundle_queue(8);

        for seq in 0..5 {
            let mut b = pool.try_acquire(ChannelId::input(0)).unwrap();
            b.sequence = seq;
            tx.try_enqueue(b).unwrap();
        }

        for seq in 0..5 {
            assert_eq!(rx.try_dequeue().unwrap().sequence, seq);
        }
        assert!(rx.try_dequeue().is_none());
    }

    #[test]
    fn test_full_only_when_pool_exhausted() {
        let pool = BundlePool::new(3, 4);
        pool.prewarm(3);
        let (tx, _rx) = bundle_queue(pool.max_bundles());

        for _ in 0..3 {
            let b = pool.try_acquire(ChannelId::input(0)).unwrap();
            tx.try_enqueue(b).unwrap();
        }
        // Every bundle is queued: the pool is dry before the queue rejects anything
        assert!(pool.try_acquire(ChannelId::input(0)).is_none());
        assert_eq!(tx.len(), 3);
    }

    #[test]
    fn test_disconnected_returns_bundle() {
        let pool = BundlePool::new(1, 4);
        pool.prewarm(1);
        let (tx, rx) = bundle_queue(1);
        drop(rx);

        let b = pool.try_acquire(ChannelId::input(0)).unwrap();
        let b = tx.try_enqueue(b).unwrap_err();
        pool.release(b);
        assert_eq!(pool.available(), 1);
    }

    #[test]
    fn test_drain_into_returns_bundles() {
        let pool = BundlePool::new(4, 4);
        pool.prewarm(4);
        let (tx, rx) = bundle_queue(4);
        for _ in 0..4 {
            tx.try_enqueue(pool.try_acquire(ChannelId::input(0)).unwrap())
                .unwrap();
        }
        assert_eq!(pool.available(), 0);
        assert_eq!(rx.drain_into(&pool), 4);
        assert_eq!(pool.available(), 4);
    }

    #[test]
    fn test_drain_closed_waits_for_every_sender() {
        let pool = BundlePool::new(4, 4);
        pool.prewarm(4);
        let (tx, rx) = bundle_queue(4);
        let late = tx.clone();
        drop(tx);

        enqueue_one(&pool, &late);
        assert!(!rx.drain_closed(&pool));
        assert_eq!(pool.available(), 4);

        // A sender still alive may enqueue after the first drain
        enqueue_one(&pool, &late);
        drop(late);
        assert!(rx.drain_closed(&pool));
        assert_eq!(pool.available(), 4);
        assert_eq!(pool.in_flight(), 0);
    }

    fn enqueue_one(pool: &BundlePool, tx: &BundleSender) {
        tx.try_enqueue(pool.try_acquire(ChannelId::input(0)).unwrap())
            .unwrap();
    }
}
