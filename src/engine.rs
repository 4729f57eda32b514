//! ResonaEngine that owns the pool, the routes and the analysis workers

use crate::{EngineConfig, Result};
use arc_swap::ArcSwap;
use parking_lot::{Mutex, RwLock};
use resona_analysis::{
    AnalysisResult, AnalysisSettings, AnalysisWorker, ChannelReader, SettingsHandle,
    WorkerCommand, WorkerState,
};
use resona_core::{
    bundle_queue, AudioCallback, BundlePool, BundleReceiver, CallbackDriver, ChannelDirection,
    ChannelId, ChannelState, DriverStats, RouteTable, BAND_COUNT,
};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Stream parameters of both device directions.
#[derive(Debug, Clone, Copy, Default)]
struct DeviceStates {
    input: ChannelState,
    output: ChannelState,
}

impl DeviceStates {
    fn for_direction(&self, direction: ChannelDirection) -> ChannelState {
        match direction {
            ChannelDirection::Input => self.input,
            ChannelDirection::Output => self.output,
        }
    }
}

/// Explicitly owned analysis context.
///
/// Holds everything shared between the audio callback and the analysis
/// workers. Several engines can coexist; nothing is process-global.
///
/// # Example
///
/// ```
/// use resona::prelude::*;
///
/// let engine = ResonaEngine::builder()
///     .input_state(ChannelState::new(48000, 1))
///     .build()?;
///
/// // Handed to the audio backend's callback
/// let mut driver = engine.driver(|out: &mut [f32], _frames: usize, _state: &ChannelState| {
///     out.fill(0.0);
/// });
///
/// engine.start_channel_analysis(ChannelId::input(0), ChannelState::new(48000, 1))?;
///
/// let input = vec![0.0f32; 256];
/// let mut output = vec![0.0f32; 512];
/// driver.on_audio_block(Some(&input), Some(&mut output), 256, ChannelLayout::new(1, 2));
///
/// // `None` until the worker finished its first pass
/// let _latest = engine.get_latest_result(ChannelId::input(0));
/// engine.destroy_all();
/// # Ok::<(), resona::Error>(())
/// ```
pub struct ResonaEngine {
    config: EngineConfig,
    settings: SettingsHandle,
    pool: Arc<BundlePool>,
    routes: Arc<ArcSwap<RouteTable>>,
    /// Previous route table, kept so the audio thread never frees one.
    retired_routes: Mutex<Option<Arc<RouteTable>>>,
    /// Queues of stopped workers that an old route snapshot may still feed.
    retired_queues: Mutex<Vec<BundleReceiver>>,
    stats: Arc<DriverStats>,
    workers: Mutex<BTreeMap<ChannelId, AnalysisWorker>>,
    /// Read side of every running worker; UI queries never touch `workers`.
    readers: ArcSwap<BTreeMap<ChannelId, ChannelReader>>,
    generation: Arc<AtomicU64>,
    device: RwLock<DeviceStates>,
}

impl ResonaEngine {
    /// Create a new engine builder
    pub fn builder() -> crate::ResonaEngineBuilder {
        crate::ResonaEngineBuilder::default()
    }

    pub(crate) fn from_parts(
        config: EngineConfig,
        settings: AnalysisSettings,
        input_state: ChannelState,
        output_state: ChannelState,
    ) -> Self {
        let pool = Arc::new(BundlePool::new(config.pool_size, config.block_frames));
        pool.prewarm(config.pool_size);

        tracing::info!(
            "Resona engine: {} bundles of {} frames, input {} ch @ {} Hz, output {} ch @ {} Hz",
            config.pool_size,
            config.block_frames,
            input_state.channel_count,
            input_state.sample_rate,
            output_state.channel_count,
            output_state.sample_rate
        );

        Self {
            config,
            settings: SettingsHandle::new(settings),
            pool,
            routes: Arc::new(ArcSwap::from_pointee(RouteTable::new())),
            retired_routes: Mutex::new(None),
            retired_queues: Mutex::new(Vec::new()),
            stats: Arc::new(DriverStats::new()),
            workers: Mutex::new(BTreeMap::new()),
            readers: ArcSwap::from_pointee(BTreeMap::new()),
            generation: Arc::new(AtomicU64::new(0)),
            device: RwLock::new(DeviceStates {
                input: input_state,
                output: output_state,
            }),
        }
    }

    /// Callback-side driver for the audio backend, with a synthesis callback
    /// rendering into the output buffer.
    pub fn driver(&self, callback: impl AudioCallback + 'static) -> CallbackDriver {
        self.capture_driver().with_callback(callback)
    }

    /// Driver that only taps channels and renders nothing.
    pub fn capture_driver(&self) -> CallbackDriver {
        let device = *self.device.read();
        CallbackDriver::new(
            self.routes.clone(),
            self.pool.clone(),
            self.stats.clone(),
            device.input,
            device.output,
        )
    }

    /// Spawn an analysis worker for `channel` and route its samples to it.
    ///
    /// A failed thread spawn is reported here once; the channel then simply
    /// never publishes results.
    pub fn start_channel_analysis(&self, channel: ChannelId, state: ChannelState) -> Result<()> {
        let count = self.device.read().for_direction(channel.direction).channel_count;
        if channel.index >= count {
            return Err(resona_core::Error::ChannelOutOfRange {
                index: channel.index,
                count,
            }
            .into());
        }

        let mut workers = self.workers.lock();
        if workers.contains_key(&channel) {
            return Err(resona_analysis::Error::AlreadyRunning(channel).into());
        }

        let (sender, receiver) = bundle_queue(self.pool.max_bundles());
        let mut worker = AnalysisWorker::new(channel, self.config.worker_config())
            .with_generation(self.generation.clone());

        if let Err(e) = worker.start(state, receiver, self.pool.clone(), self.settings.clone()) {
            tracing::warn!("Analysis {} unavailable: {}", channel, e);
            return Err(e.into());
        }

        if let Some(reader) = worker.reader() {
            self.update_readers(|readers| {
                readers.insert(channel, reader.clone());
            });
        }
        self.update_routes(|routes| routes.insert(channel, sender.clone()));
        workers.insert(channel, worker);
        tracing::info!("Analysis started on {} @ {} Hz", channel, state.sample_rate);
        Ok(())
    }

    /// Unroute `channel` and join its worker.
    ///
    /// Blocks the calling thread until the worker has exited. Never call from
    /// the audio thread.
    pub fn stop_channel_analysis(&self, channel: ChannelId) -> Result<()> {
        self.update_routes(|routes| {
            routes.remove(channel);
        });
        self.update_readers(|readers| {
            readers.remove(&channel);
        });
        let worker = self.workers.lock().remove(&channel);
        match worker {
            Some(mut worker) => {
                self.retire(worker.stop());
                self.reclaim_retired();
                tracing::info!("Analysis stopped on {}", channel);
                Ok(())
            }
            None => Err(resona_core::Error::UnknownChannel(channel).into()),
        }
    }

    /// Start analysis on every channel of the device in both directions.
    ///
    /// Channels that fail to start are logged and skipped. Returns how many
    /// workers were started.
    pub fn create_all(&self) -> usize {
        let device = *self.device.read();
        let channels = (0..device.input.channel_count)
            .map(ChannelId::input)
            .chain((0..device.output.channel_count).map(ChannelId::output));

        let mut started = 0;
        for channel in channels {
            if self.workers.lock().contains_key(&channel) {
                continue;
            }
            let state = device.for_direction(channel.direction);
            match self.start_channel_analysis(channel, state) {
                Ok(()) => started += 1,
                Err(e) => tracing::warn!("Skipping analysis on {}: {}", channel, e),
            }
        }
        started
    }

    /// Unroute all channels and join every worker.
    pub fn destroy_all(&self) {
        self.update_routes(|routes| *routes = RouteTable::new());
        self.readers.store(Arc::new(BTreeMap::new()));
        let workers = std::mem::take(&mut *self.workers.lock());
        let count = workers.len();
        for (_, mut worker) in workers {
            self.retire(worker.stop());
        }
        self.reclaim_retired();
        if count > 0 {
            tracing::info!("Analysis stopped on {} channels", count);
        }
    }

    /// Device reconfiguration: full teardown, new stream parameters, then
    /// restart of the channels that still exist.
    ///
    /// The pool is resized to the largest block of either state, so call this
    /// only while no audio is flowing.
    pub fn reconfigure(&self, input_state: ChannelState, output_state: ChannelState) -> Result<()> {
        let previous = self.active_channels();
        self.destroy_all();

        *self.device.write() = DeviceStates {
            input: input_state,
            output: output_state,
        };

        let block = (input_state.frames.max(output_state.frames) as usize)
            .max(self.config.block_frames)
            .min(EngineConfig::MAX_BLOCK_FRAMES);
        self.pool.set_frames(block);
        self.pool.prewarm(self.pool.max_bundles());

        let device = *self.device.read();
        for channel in previous {
            let count = device.for_direction(channel.direction).channel_count;
            if channel.index >= count {
                tracing::debug!("Dropping analysis on {}: no longer on the device", channel);
                continue;
            }
            self.start_channel_analysis(channel, device.for_direction(channel.direction))?;
        }
        Ok(())
    }

    /// Latest published analysis of `channel`. `None` before the first pass or
    /// when the channel is not analysed.
    ///
    /// Lock-free: never waits on a worker being started or stopped.
    pub fn get_latest_result(&self, channel: ChannelId) -> Option<Arc<AnalysisResult>> {
        self.readers.load().get(&channel)?.latest()
    }

    /// 4-band aggregate of `channel`; zeros when the channel is not analysed.
    pub fn get_band_levels(&self, channel: ChannelId) -> [f32; BAND_COUNT] {
        self.readers
            .load()
            .get(&channel)
            .map(|r| r.band_levels())
            .unwrap_or([0.0; BAND_COUNT])
    }

    /// Read handle of `channel` that stays usable across engine calls.
    pub fn channel_reader(&self, channel: ChannelId) -> Option<ChannelReader> {
        self.readers.load().get(&channel).cloned()
    }

    /// Write the next `seconds` of an input channel to a mono WAV file.
    pub fn capture_input(&self, channel: ChannelId, path: impl AsRef<Path>, seconds: f32) -> Result<()> {
        if !channel.is_input() {
            return Err(resona_analysis::Error::CaptureOnOutput(channel).into());
        }
        let sample_rate = self.device.read().input.sample_rate;
        let max_samples = (seconds.max(0.0) * sample_rate as f32) as usize;

        let workers = self.workers.lock();
        let worker = workers
            .get(&channel)
            .ok_or(resona_core::Error::UnknownChannel(channel))?;
        worker.send(WorkerCommand::Capture {
            path: path.as_ref().to_path_buf(),
            max_samples,
        })?;
        Ok(())
    }

    /// Finalize a running capture on `channel` with what it has so far.
    pub fn cancel_capture(&self, channel: ChannelId) -> Result<()> {
        let workers = self.workers.lock();
        let worker = workers
            .get(&channel)
            .ok_or(resona_core::Error::UnknownChannel(channel))?;
        worker.send(WorkerCommand::CancelCapture)?;
        Ok(())
    }

    /// Bumped on every published result of any channel.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub fn settings(&self) -> &SettingsHandle {
        &self.settings
    }

    /// Replace the analysis settings. Workers pick them up on their next pass.
    pub fn set_settings(&self, settings: AnalysisSettings) {
        self.settings.store(settings);
    }

    /// Channels with a worker, inputs first.
    pub fn active_channels(&self) -> Vec<ChannelId> {
        self.workers.lock().keys().copied().collect()
    }

    pub fn worker_state(&self, channel: ChannelId) -> Option<WorkerState> {
        self.readers.load().get(&channel).map(|r| r.state())
    }

    /// Bundles analysed on `channel` so far.
    pub fn processed(&self, channel: ChannelId) -> u64 {
        self.readers
            .load()
            .get(&channel)
            .map(|r| r.processed())
            .unwrap_or(0)
    }

    pub fn driver_stats(&self) -> &Arc<DriverStats> {
        &self.stats
    }

    pub fn pool(&self) -> &Arc<BundlePool> {
        &self.pool
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn input_state(&self) -> ChannelState {
        self.device.read().input
    }

    pub fn output_state(&self) -> ChannelState {
        self.device.read().output
    }

    fn update_routes(&self, mut edit: impl FnMut(&mut RouteTable)) {
        let previous = self.routes.rcu(|current| {
            let mut next = RouteTable::clone(current);
            edit(&mut next);
            next
        });
        *self.retired_routes.lock() = Some(previous);
    }

    fn update_readers(&self, mut edit: impl FnMut(&mut BTreeMap<ChannelId, ChannelReader>)) {
        self.readers.rcu(|current| {
            let mut next = BTreeMap::clone(current);
            edit(&mut next);
            next
        });
    }

    fn retire(&self, receiver: Option<BundleReceiver>) {
        if let Some(receiver) = receiver {
            self.retired_queues.lock().push(receiver);
        }
    }

    /// Drain stopped queues and drop those no route snapshot can reach.
    fn reclaim_retired(&self) {
        {
            let mut retired = self.retired_routes.lock();
            // Only the engine still holds it: no callback is using this table.
            if retired.as_ref().is_some_and(|t| Arc::strong_count(t) == 1) {
                *retired = None;
            }
        }
        let mut queues = self.retired_queues.lock();
        queues.retain(|rx| !rx.drain_closed(&self.pool));
        if !queues.is_empty() {
            tracing::debug!("{} retired queues still reachable by a callback", queues.len());
        }
    }
}

impl Drop for ResonaEngine {
    fn drop(&mut self) {
        self.destroy_all();
    }
}
