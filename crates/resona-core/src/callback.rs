//! Real-time audio callback driver.
//!
//! The audio backend calls [`CallbackDriver::on_audio_block`] with fixed-size
//! interleaved buffers. The driver runs the synthesis callback, then copies
//! each routed channel into a pooled [`Bundle`](crate::Bundle) and hands it
//! to that channel's analysis queue.
//!
//! # RT Safety
//! Only lock-free operations happen here:
//! - `ArcSwap::load()` for the route table snapshot
//! - `BundlePool::try_acquire()` / bounded `try_send()` for bundles
//! - relaxed atomic counters for statistics

use crate::{BundlePool, BundleSender, ChannelId, ChannelLayout, ChannelState};
use arc_swap::ArcSwap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Upper bound on channels per direction that get sequence numbers.
const MAX_CHANNELS: usize = 64;

/// Synthesis/mix callback invoked on the output buffer of every block.
pub trait AudioCallback: Send {
    /// Render `frames` interleaved frames into `output`.
    fn process(&mut self, output: &mut [f32], frames: usize, state: &ChannelState);
}

impl<F> AudioCallback for F
where
    F: FnMut(&mut [f32], usize, &ChannelState) + Send,
{
    fn process(&mut self, output: &mut [f32], frames: usize, state: &ChannelState) {
        self(output, frames, state)
    }
}

/// Which channels currently feed an analysis worker.
///
/// Built on a control thread and published to the audio thread through
/// `ArcSwap`, so the callback never sees a half-edited table.
#[derive(Clone, Default)]
pub struct RouteTable {
    inputs: Vec<Option<BundleSender>>,
    outputs: Vec<Option<BundleSender>>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, channel: ChannelId, sender: BundleSender) {
        let routes = self.side_mut(channel);
        let index = channel.index as usize;
        if routes.len() <= index {
            routes.resize(index + 1, None);
        }
        routes[index] = Some(sender);
    }

    pub fn remove(&mut self, channel: ChannelId) -> Option<BundleSender> {
        self.side_mut(channel)
            .get_mut(channel.index as usize)
            .and_then(Option::take)
    }

    #[inline]
    pub fn route(&self, channel: ChannelId) -> Option<&BundleSender> {
        let routes = if channel.is_input() {
            &self.inputs
        } else {
            &self.outputs
        };
        routes.get(channel.index as usize).and_then(Option::as_ref)
    }

    pub fn is_routed(&self, channel: ChannelId) -> bool {
        self.route(channel).is_some()
    }

    /// Number of routed channels in both directions.
    pub fn len(&self) -> usize {
        self.inputs.iter().chain(&self.outputs).flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn side_mut(&mut self, channel: ChannelId) -> &mut Vec<Option<BundleSender>> {
        if channel.is_input() {
            &mut self.inputs
        } else {
            &mut self.outputs
        }
    }
}

/// Counters written by the audio thread, readable from anywhere.
#[derive(Debug, Default)]
pub struct DriverStats {
    blocks: AtomicU64,
    bundles_sent: AtomicU64,
    dropped_blocks: AtomicU64,
}

impl DriverStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Callback invocations so far.
    pub fn blocks(&self) -> u64 {
        self.blocks.load(Ordering::Relaxed)
    }

    /// Bundles successfully queued for analysis.
    pub fn bundles_sent(&self) -> u64 {
        self.bundles_sent.load(Ordering::Relaxed)
    }

    /// Per-channel blocks skipped because the pool was exhausted.
    pub fn dropped_blocks(&self) -> u64 {
        self.dropped_blocks.load(Ordering::Relaxed)
    }
}

/// Audio-thread side of the pipeline. Owned by the backend's callback closure.
pub struct CallbackDriver {
    routes: Arc<ArcSwap<RouteTable>>,
    pool: Arc<BundlePool>,
    stats: Arc<DriverStats>,
    callback: Option<Box<dyn AudioCallback>>,
    input_state: ChannelState,
    output_state: ChannelState,
    input_sequences: [u64; MAX_CHANNELS],
    output_sequences: [u64; MAX_CHANNELS],
}

impl CallbackDriver {
    pub fn new(
        routes: Arc<ArcSwap<RouteTable>>,
        pool: Arc<BundlePool>,
        stats: Arc<DriverStats>,
        input_state: ChannelState,
        output_state: ChannelState,
    ) -> Self {
        Self {
            routes,
            pool,
            stats,
            callback: None,
            input_state,
            output_state,
            input_sequences: [0; MAX_CHANNELS],
            output_sequences: [0; MAX_CHANNELS],
        }
    }

    /// Attach the synthesis/mix callback.
    pub fn with_callback(mut self, callback: impl AudioCallback + 'static) -> Self {
        self.callback = Some(Box::new(callback));
        self
    }

    pub fn input_state(&self) -> &ChannelState {
        &self.input_state
    }

    pub fn output_state(&self) -> &ChannelState {
        &self.output_state
    }

    pub fn stats(&self) -> &Arc<DriverStats> {
        &self.stats
    }

    /// Process one interleaved device block.
    ///
    /// Completes in time proportional to `frames` times the routed channel
    /// count, regardless of what the analysis workers are doing.
    pub fn on_audio_block(
        &mut self,
        input: Option<&[f32]>,
        output: Option<&mut [f32]>,
        frames: usize,
        layout: ChannelLayout,
    ) {
        self.input_state.frames = frames as u32;
        self.input_state.channel_count = layout.input_channels;
        self.output_state.frames = frames as u32;
        self.output_state.channel_count = layout.output_channels;

        let routes = self.routes.load();

        if let Some(input) = input {
            for ch in 0..layout.input_channels {
                let channel = ChannelId::input(ch);
                if let Some(sender) = routes.route(channel) {
                    let sequence = next_sequence(&mut self.input_sequences, ch);
                    let stride = layout.input_channels as usize;
                    send_strided(
                        &self.pool,
                        &self.stats,
                        sender,
                        channel,
                        sequence,
                        input,
                        stride,
                        frames,
                    );
                }
            }
        }

        if let Some(output) = output {
            if let Some(callback) = self.callback.as_mut() {
                callback.process(output, frames, &self.output_state);
            }

            for ch in 0..layout.output_channels {
                let channel = ChannelId::output(ch);
                if let Some(sender) = routes.route(channel) {
                    let sequence = next_sequence(&mut self.output_sequences, ch);
                    let stride = layout.output_channels as usize;
                    send_strided(
                        &self.pool,
                        &self.stats,
                        sender,
                        channel,
                        sequence,
                        output,
                        stride,
                        frames,
                    );
                }
            }
        }

        self.input_state.total_frames += frames as u64;
        self.output_state.total_frames += frames as u64;
        self.stats.blocks.fetch_add(1, Ordering::Relaxed);
    }
}

#[inline]
fn next_sequence(sequences: &mut [u64; MAX_CHANNELS], channel: u32) -> u64 {
    match sequences.get_mut(channel as usize) {
        Some(seq) => {
            let current = *seq;
            *seq += 1;
            current
        }
        None => 0,
    }
}

/// Copy one strided channel out of an interleaved block and queue it.
#[allow(clippy::too_many_arguments)]
#[inline]
fn send_strided(
    pool: &BundlePool,
    stats: &DriverStats,
    sender: &BundleSender,
    channel: ChannelId,
    sequence: u64,
    interleaved: &[f32],
    stride: usize,
    frames: usize,
) {
    let Some(mut bundle) = pool.try_acquire(channel) else {
        stats.dropped_blocks.fetch_add(1, Ordering::Relaxed);
        return;
    };

    if frames > bundle.data.capacity() || stride == 0 {
        // Block larger than the negotiated size; growing would allocate.
        pool.release(bundle);
        stats.dropped_blocks.fetch_add(1, Ordering::Relaxed);
        return;
    }

    bundle.data.resize(frames, 0.0);
    let source = interleaved
        .iter()
        .skip(channel.index as usize)
        .step_by(stride);
    let mut copied = 0;
    for (dst, &src) in bundle.data.iter_mut().zip(source) {
        *dst = src;
        copied += 1;
    }
    bundle.data.truncate(copied);
    bundle.sequence = sequence;

    match sender.try_enqueue(bundle) {
        Ok(()) => {
            stats.bundles_sent.fetch_add(1, Ordering::Relaxed);
        }
        Err(bundle) => {
            pool.release(bundle);
            stats.dropped_blocks.fetch_add(1, Ordering::Relaxed);
        }
    }
}
