//! Pooled multi-buffer hand-off of analysis results to the UI.
//!
//! A small set of [`AnalysisResult`]s cycles through three roles:
//!
//! - **spare**: waiting in the lock-free cache channel
//! - **being written**: checked out by the worker for one pipeline pass
//! - **published**: queued to the UI, then held as its "current" result
//!
//! When the UI picks up a newer result it returns the previous one to the
//! cache. The set only grows while UI callers hold on to snapshots: when no
//! spare is free and nobody is reading, the worker takes back the oldest
//! unread result instead of allocating. Neither side ever waits for the other.

use crate::AnalysisResult;
use arc_swap::ArcSwapOption;
use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use resona_core::ChannelId;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

/// Counters shared by both halves.
#[derive(Debug, Default)]
struct ExchangeStats {
    allocated: AtomicUsize,
    published: AtomicU64,
    reclaimed: AtomicU64,
}

/// Worker half of the exchange.
pub struct ResultPublisher {
    channel: ChannelId,
    spare_tx: Sender<Arc<AnalysisResult>>,
    spare_rx: Receiver<Arc<AnalysisResult>>,
    published_tx: Sender<Arc<AnalysisResult>>,
    /// Lets the worker reclaim results the UI never picked up.
    published_rx: Receiver<Arc<AnalysisResult>>,
    next_sequence: u64,
    stats: Arc<ExchangeStats>,
    generation: Arc<AtomicU64>,
}

/// UI half of the exchange.
pub struct ResultConsumer {
    spare_tx: Sender<Arc<AnalysisResult>>,
    published_rx: Receiver<Arc<AnalysisResult>>,
    current: ArcSwapOption<AnalysisResult>,
    /// Held by the one UI thread currently moving published results into
    /// `current`. Other readers skip the drain instead of waiting.
    drain: Mutex<()>,
    stats: Arc<ExchangeStats>,
}

/// Create an exchange pre-populated with `cache_size` spare results.
///
/// `generation` is bumped on every publish so consumers can cheaply tell
/// whether anything new arrived.
pub fn result_exchange(
    channel: ChannelId,
    cache_size: usize,
    generation: Arc<AtomicU64>,
) -> (ResultPublisher, ResultConsumer) {
    let (spare_tx, spare_rx) = unbounded();
    let (published_tx, published_rx) = unbounded();
    let stats = Arc::new(ExchangeStats::default());

    for _ in 0..cache_size {
        let _ = spare_tx.send(Arc::new(AnalysisResult::new(channel)));
    }
    stats.allocated.store(cache_size, Ordering::Release);

    let publisher = ResultPublisher {
        channel,
        spare_tx: spare_tx.clone(),
        spare_rx,
        published_tx,
        published_rx: published_rx.clone(),
        next_sequence: 0,
        stats: stats.clone(),
        generation,
    };
    let consumer = ResultConsumer {
        spare_tx,
        published_rx,
        current: ArcSwapOption::const_empty(),
        drain: Mutex::new(()),
        stats,
    };
    (publisher, consumer)
}

impl ResultPublisher {
    /// Take a result to write into.
    ///
    /// Order of preference: a spare nobody references, the oldest published
    /// result the UI has not picked up, a new allocation. The last one only
    /// happens while UI callers still hold every other result.
    pub fn checkout(&mut self) -> Arc<AnalysisResult> {
        for _ in 0..self.spare_rx.len() {
            let Ok(mut result) = self.spare_rx.try_recv() else {
                break;
            };
            if Arc::get_mut(&mut result).is_some() {
                return result;
            }
            // Still held by a UI caller; try it again next pass.
            let _ = self.spare_tx.send(result);
        }

        while let Ok(mut result) = self.published_rx.try_recv() {
            if Arc::get_mut(&mut result).is_some() {
                self.stats.reclaimed.fetch_add(1, Ordering::Relaxed);
                return result;
            }
        }

        let total = self.stats.allocated.fetch_add(1, Ordering::AcqRel) + 1;
        tracing::trace!(
            "Analysis {}: all results held by readers, allocated result #{}",
            self.channel,
            total
        );
        Arc::new(AnalysisResult::new(self.channel))
    }

    /// Hand a filled result to the UI.
    pub fn publish(&mut self, mut result: Arc<AnalysisResult>) {
        if let Some(inner) = Arc::get_mut(&mut result) {
            inner.sequence = self.next_sequence;
        }
        self.next_sequence += 1;
        if self.published_tx.send(result).is_ok() {
            self.stats.published.fetch_add(1, Ordering::Release);
            self.generation.fetch_add(1, Ordering::Release);
        }
    }

    /// Return an unused result to the cache.
    pub fn recycle(&mut self, result: Arc<AnalysisResult>) {
        let _ = self.spare_tx.send(result);
    }

    /// Spare results currently cached.
    pub fn spare(&self) -> usize {
        self.spare_rx.len()
    }

    pub fn channel(&self) -> ChannelId {
        self.channel
    }
}

impl ResultConsumer {
    /// Most recent complete result, or `None` before the first pass.
    ///
    /// Never blocks: neither on the worker nor on other UI threads. Results
    /// are observed in publish order, so a newer result is never followed by
    /// an older one.
    pub fn latest(&self) -> Option<Arc<AnalysisResult>> {
        if let Some(_drain) = self.drain.try_lock() {
            while let Ok(next) = self.published_rx.try_recv() {
                if let Some(previous) = self.current.swap(Some(next)) {
                    self.recycle(previous);
                }
            }
        }
        self.current.load_full()
    }

    /// Results published but not yet picked up.
    pub fn pending(&self) -> usize {
        self.published_rx.len()
    }

    /// Total results published by the worker.
    pub fn published(&self) -> u64 {
        self.stats.published.load(Ordering::Acquire)
    }

    /// Unread results the worker took back for reuse.
    pub fn reclaimed(&self) -> u64 {
        self.stats.reclaimed.load(Ordering::Relaxed)
    }

    /// Result objects created so far, cached or in use.
    pub fn allocated(&self) -> usize {
        self.stats.allocated.load(Ordering::Acquire)
    }

    /// Forget the current result (e.g. after the channel was restarted).
    pub fn clear(&self) {
        let _drain = self.drain.lock();
        if let Some(previous) = self.current.swap(None) {
            self.recycle(previous);
        }
        while let Ok(stale) = self.published_rx.try_recv() {
            self.recycle(stale);
        }
    }

    fn recycle(&self, result: Arc<AnalysisResult>) {
        let _ = self.spare_tx.send(result);
    }
}
