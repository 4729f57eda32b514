//! Per-channel background analysis thread.
//!
//! The worker polls its bundle queue, runs the [`SpectralPipeline`] on every
//! bundle in arrival order and publishes the results. When the queue is empty
//! it sleeps for `wake_interval`, which bounds both the pickup latency of a
//! new bundle and the reaction time to a stop request.

use crate::capture::InputCapture;
use crate::exchange::{result_exchange, ResultConsumer, ResultPublisher};
use crate::spectrum::SpectralPipeline;
use crate::{AnalysisResult, Error, Result, SettingsHandle};
use crossbeam_channel::{unbounded, Receiver, Sender};
use resona_core::{
    AtomicBands, AtomicFlag, Bundle, BundlePool, BundleReceiver, ChannelId, ChannelState,
    BAND_COUNT,
};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Lifecycle of an analysis worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum WorkerState {
    #[default]
    Stopped = 0,
    Starting = 1,
    Running = 2,
    StopRequested = 3,
    Exited = 4,
}

impl WorkerState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Starting,
            2 => Self::Running,
            3 => Self::StopRequested,
            4 => Self::Exited,
            _ => Self::Stopped,
        }
    }

    /// True while a thread exists for this worker.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Starting | Self::Running | Self::StopRequested)
    }
}

/// Worker tuning.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorkerConfig {
    /// Result objects pre-populated into the cache (at least 2)
    pub result_cache: usize,
    /// Sleep when the queue is empty
    pub wake_interval: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            result_cache: 3,
            wake_interval: Duration::from_millis(1),
        }
    }
}

impl WorkerConfig {
    pub const MIN_RESULT_CACHE: usize = 2;
    pub const MIN_WAKE_INTERVAL: Duration = Duration::from_micros(100);
    pub const MAX_WAKE_INTERVAL: Duration = Duration::from_millis(10);

    pub fn validate(&mut self) {
        self.result_cache = self.result_cache.max(Self::MIN_RESULT_CACHE);
        self.wake_interval = self
            .wake_interval
            .clamp(Self::MIN_WAKE_INTERVAL, Self::MAX_WAKE_INTERVAL);
    }
}

/// Control messages processed at the top of each worker iteration.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerCommand {
    /// Write the next `max_samples` samples of the channel to a mono WAV file.
    Capture { path: PathBuf, max_samples: usize },
    /// Finalize a running capture early.
    CancelCapture,
    /// Drop the sliding window and blend history.
    Reset,
}

/// State shared between the control handle and the thread.
#[derive(Default)]
struct WorkerShared {
    state: AtomicU8,
    quit: AtomicFlag,
    processed: AtomicU64,
}

impl WorkerShared {
    fn state(&self) -> WorkerState {
        WorkerState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: WorkerState) {
        self.state.store(state as u8, Ordering::Release);
    }

    fn transition(&self, from: WorkerState, to: WorkerState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// Read side of one analysed channel, for UI threads.
///
/// Cheap to clone. Every read is lock-free with respect to the worker and to
/// whoever owns the [`AnalysisWorker`], and stays valid after the worker stops
/// (it then keeps returning the last values).
#[derive(Clone)]
pub struct ChannelReader {
    channel: ChannelId,
    results: Arc<ResultConsumer>,
    bands: Arc<AtomicBands>,
    shared: Arc<WorkerShared>,
}

impl ChannelReader {
    pub fn channel(&self) -> ChannelId {
        self.channel
    }

    /// Latest published result; `None` before the first pass.
    pub fn latest(&self) -> Option<Arc<AnalysisResult>> {
        self.results.latest()
    }

    /// Atomic read of the 4-band aggregate.
    pub fn band_levels(&self) -> [f32; BAND_COUNT] {
        self.bands.load()
    }

    /// Bundles analysed so far.
    pub fn processed(&self) -> u64 {
        self.shared.processed.load(Ordering::Acquire)
    }

    pub fn state(&self) -> WorkerState {
        self.shared.state()
    }

    pub fn results(&self) -> &ResultConsumer {
        &self.results
    }
}

/// Control handle of one channel's analysis thread.
pub struct AnalysisWorker {
    channel: ChannelId,
    config: WorkerConfig,
    shared: Arc<WorkerShared>,
    bands: Arc<AtomicBands>,
    generation: Arc<AtomicU64>,
    command_tx: Sender<WorkerCommand>,
    command_rx: Option<Receiver<WorkerCommand>>,
    consumer: Option<Arc<ResultConsumer>>,
    pool: Option<Arc<BundlePool>>,
    thread_handle: Option<JoinHandle<BundleReceiver>>,
}

impl AnalysisWorker {
    pub fn new(channel: ChannelId, mut config: WorkerConfig) -> Self {
        config.validate();
        let (command_tx, command_rx) = unbounded();
        Self {
            channel,
            config,
            shared: Arc::new(WorkerShared::default()),
            bands: Arc::new(AtomicBands::new()),
            generation: Arc::new(AtomicU64::new(0)),
            command_tx,
            command_rx: Some(command_rx),
            consumer: None,
            pool: None,
            thread_handle: None,
        }
    }

    /// Share a publish counter with other workers.
    pub fn with_generation(mut self, generation: Arc<AtomicU64>) -> Self {
        self.generation = generation;
        self
    }

    /// Spawn the analysis thread.
    ///
    /// On spawn failure the worker stays `Stopped` and never publishes.
    pub fn start(
        &mut self,
        state: ChannelState,
        receiver: BundleReceiver,
        pool: Arc<BundlePool>,
        settings: SettingsHandle,
    ) -> Result<()> {
        if self.thread_handle.is_some() {
            return Err(Error::AlreadyRunning(self.channel));
        }
        self.shared.set_state(WorkerState::Starting);
        self.shared.quit.set(false);
        self.bands.reset();

        let (publisher, consumer) =
            result_exchange(self.channel, self.config.result_cache, self.generation.clone());
        let commands = match self.command_rx.take() {
            Some(rx) => rx,
            // Consumed by a spawn that failed.
            None => self.renew_commands(),
        };

        let worker_loop = WorkerLoop {
            channel: self.channel,
            sample_rate: state.sample_rate,
            shared: self.shared.clone(),
            receiver,
            pool: pool.clone(),
            settings,
            publisher,
            pipeline: SpectralPipeline::new(self.channel, state, self.bands.clone()),
            commands,
            capture: None,
            wake_interval: self.config.wake_interval,
        };

        let spawned = thread::Builder::new()
            .name(format!("resona-analysis-{}", self.channel))
            .spawn(move || worker_loop.run());

        match spawned {
            Ok(handle) => {
                self.thread_handle = Some(handle);
                self.consumer = Some(Arc::new(consumer));
                self.pool = Some(pool);
                self.shared
                    .transition(WorkerState::Starting, WorkerState::Running);
                tracing::debug!(
                    "Analysis {}: started ({} cached results, {:?} wake interval)",
                    self.channel,
                    self.config.result_cache,
                    self.config.wake_interval
                );
                Ok(())
            }
            Err(source) => {
                self.shared.set_state(WorkerState::Stopped);
                Err(Error::ThreadSpawn {
                    channel: self.channel,
                    source,
                })
            }
        }
    }

    /// Request the thread to exit and join it.
    ///
    /// Blocks the caller for at most one wake interval plus the bundle being
    /// processed. Never call from the audio thread. Bundles still queued are
    /// returned to the pool, and the drained queue is handed back: a callback
    /// holding an older route snapshot may still push into it, so the caller
    /// keeps draining it until every sender is gone.
    pub fn stop(&mut self) -> Option<BundleReceiver> {
        let handle = self.thread_handle.take()?;
        self.shared
            .transition(WorkerState::Running, WorkerState::StopRequested);
        self.shared
            .transition(WorkerState::Starting, WorkerState::StopRequested);
        self.shared.quit.set(true);

        let receiver = match handle.join() {
            Ok(receiver) => {
                if let Some(pool) = self.pool.take() {
                    let leftovers = receiver.drain_into(&pool);
                    if leftovers > 0 {
                        tracing::debug!(
                            "Analysis {}: returned {} unprocessed bundles to the pool",
                            self.channel,
                            leftovers
                        );
                    }
                }
                Some(receiver)
            }
            Err(_) => {
                tracing::warn!("Analysis {}: worker thread panicked", self.channel);
                self.shared.set_state(WorkerState::Exited);
                None
            }
        };
        let commands = self.renew_commands();
        self.command_rx = Some(commands);
        tracing::debug!(
            "Analysis {}: stopped after {} bundles",
            self.channel,
            self.processed()
        );
        receiver
    }

    /// Queue a control command. Commands sent before `start` are processed
    /// before the first bundle.
    pub fn send(&self, command: WorkerCommand) -> Result<()> {
        self.command_tx
            .send(command)
            .map_err(|_| Error::NotRunning(self.channel))
    }

    pub fn channel(&self) -> ChannelId {
        self.channel
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn state(&self) -> WorkerState {
        self.shared.state()
    }

    pub fn is_running(&self) -> bool {
        self.thread_handle.is_some()
    }

    /// Bundles analysed since the worker was created.
    pub fn processed(&self) -> u64 {
        self.shared.processed.load(Ordering::Acquire)
    }

    /// Latest published result; `None` before the first pass.
    pub fn latest(&self) -> Option<Arc<AnalysisResult>> {
        self.consumer.as_ref()?.latest()
    }

    /// Read handle for UI threads. `None` until the worker has started.
    pub fn reader(&self) -> Option<ChannelReader> {
        Some(ChannelReader {
            channel: self.channel,
            results: self.consumer.clone()?,
            bands: self.bands.clone(),
            shared: self.shared.clone(),
        })
    }

    /// Result objects the exchange has created so far.
    pub fn results_allocated(&self) -> usize {
        self.consumer.as_ref().map_or(0, |c| c.allocated())
    }

    /// Lock-free read of the 4-band aggregate.
    pub fn band_levels(&self) -> [f32; BAND_COUNT] {
        self.bands.load()
    }

    pub fn bands(&self) -> &Arc<AtomicBands> {
        &self.bands
    }

    pub fn generation(&self) -> &Arc<AtomicU64> {
        &self.generation
    }

    /// Replace the command channel; the old receiver went to the thread.
    fn renew_commands(&mut self) -> Receiver<WorkerCommand> {
        let (tx, rx) = unbounded();
        self.command_tx = tx;
        rx
    }
}

impl Drop for AnalysisWorker {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

/// Everything the analysis thread owns.
struct WorkerLoop {
    channel: ChannelId,
    sample_rate: u32,
    shared: Arc<WorkerShared>,
    receiver: BundleReceiver,
    pool: Arc<BundlePool>,
    settings: SettingsHandle,
    publisher: ResultPublisher,
    pipeline: SpectralPipeline,
    commands: Receiver<WorkerCommand>,
    capture: Option<InputCapture>,
    wake_interval: Duration,
}

impl WorkerLoop {
    fn run(mut self) -> BundleReceiver {
        self.shared
            .transition(WorkerState::Starting, WorkerState::Running);

        loop {
            self.process_commands();
            if self.shared.quit.get() {
                break;
            }
            match self.receiver.try_dequeue() {
                Some(bundle) => self.process_bundle(bundle),
                None => thread::sleep(self.wake_interval),
            }
        }

        self.capture = None;
        self.shared.set_state(WorkerState::Exited);
        self.receiver
    }

    fn process_bundle(&mut self, bundle: Bundle) {
        let settings = self.settings.load();
        let mut result = self.publisher.checkout();
        let outcome = self
            .pipeline
            .process(&bundle, &settings, Arc::make_mut(&mut result));
        if outcome.partitions_regenerated && result.buckets.len() != settings.spectrum_buckets {
            tracing::debug!(
                "Analysis {}: {} buckets requested, {} available",
                self.channel,
                settings.spectrum_buckets,
                result.buckets.len()
            );
        }

        self.write_capture(&bundle.data);
        self.pool.release(bundle);
        self.publisher.publish(result);
        self.shared.processed.fetch_add(1, Ordering::AcqRel);
    }

    fn process_commands(&mut self) {
        while let Ok(command) = self.commands.try_recv() {
            match command {
                WorkerCommand::Capture { path, max_samples } => {
                    if !self.channel.is_input() {
                        tracing::warn!("Analysis {}: capture ignored on output", self.channel);
                        continue;
                    }
                    match InputCapture::create(&path, self.sample_rate, max_samples) {
                        Ok(capture) => {
                            tracing::debug!(
                                "Analysis {}: capturing {} samples to {}",
                                self.channel,
                                max_samples,
                                path.display()
                            );
                            self.capture = Some(capture);
                        }
                        Err(e) => {
                            tracing::warn!(
                                "Analysis {}: cannot capture to {}: {}",
                                self.channel,
                                path.display(),
                                e
                            );
                        }
                    }
                }
                WorkerCommand::CancelCapture => {
                    self.capture = None;
                }
                WorkerCommand::Reset => {
                    self.pipeline.reset();
                }
            }
        }
    }

    fn write_capture(&mut self, samples: &[f32]) {
        let Some(capture) = self.capture.as_mut() else {
            return;
        };
        match capture.push(samples) {
            Ok(false) => {}
            Ok(true) => self.capture = None,
            Err(e) => {
                tracing::warn!(
                    "Analysis {}: capture to {} failed: {}",
                    self.channel,
                    capture.path().display(),
                    e
                );
                self.capture = None;
            }
        }
    }
}
