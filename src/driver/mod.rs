//! Pipeline driver: capture callback → processor chain → animated queue.
//!
//! The driver owns the chain and the queue and leases frames from the
//! queue's pool. It forwards the `start`/`stop`/`release` lifecycle to an
//! optional [`CaptureSource`].
//! Capture blocks arrive on the source's thread through
//! [`PipelineDriver::add_data`]; the render side reads frames back through
//! [`PipelineDriver::acquire_buffer`] and [`PipelineDriver::interpolated`].
//!
//! A frame whose processing fails is dropped with a warning. The queue keeps
//! whatever it was showing, so a bad block only costs one stale frame.

use crate::capture::{CaptureSink, CaptureSource};
use crate::config::{ProcessingConfig, VisualizerConfig};
use crate::error::Result;
use crate::pool::{ArrayPool, PoolStats, PooledBuffer, SharedBuffer};
use crate::processor::{AnyStage, PipelineError, PipelineResult, ProcessorChain, StageId};
use crate::queue::{AnimatedDataQueue, Frame, QueueStats};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

/// Receives every processed frame as its own shared lease.
///
/// The listener owns the lease and must hand it back with
/// [`ArrayPool::recycle_shared`] once it is done, which may be long after
/// the call returns.
pub type FrameListener = Box<dyn Fn(SharedBuffer) + Send + Sync>;

/// Snapshot of driver, queue and pool counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DriverStats {
    pub frames_processed: u64,
    pub frames_dropped: u64,
    pub queue: QueueStats,
    pub pool: PoolStats,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct PipelineDriver {
    pool: ArrayPool,
    chain: Mutex<ProcessorChain>,
    queue: AnimatedDataQueue,
    listener: RwLock<Option<FrameListener>>,
    source: Mutex<Option<Box<dyn CaptureSource>>>,
    frames_processed: AtomicU64,
    frames_dropped: AtomicU64,
}

impl PipelineDriver {
    /// Frames are leased from the queue's pool, so every buffer the queue
    /// recycles goes back to the pool it came from.
    pub fn new(chain: ProcessorChain, queue: AnimatedDataQueue) -> Self {
        Self {
            pool: queue.pool().clone(),
            chain: Mutex::new(chain),
            queue,
            listener: RwLock::new(None),
            source: Mutex::new(None),
            frames_processed: AtomicU64::new(0),
            frames_dropped: AtomicU64::new(0),
        }
    }

    /// Build the pool, the default chain and the queue from a config.
    pub fn from_config(config: &VisualizerConfig) -> Self {
        let pool = ArrayPool::with_config(&config.pool);
        let chain = ProcessorChain::from_config(&config.processing);
        let queue = AnimatedDataQueue::with_config(pool, &config.animation);
        Self::new(chain, queue)
    }

    pub fn with_source(self, source: Box<dyn CaptureSource>) -> Self {
        *lock(&self.source) = Some(source);
        self
    }

    pub fn with_listener(self, listener: FrameListener) -> Self {
        self.set_listener(Some(listener));
        self
    }

    /// Replace the capture source. The previous source is released.
    pub fn set_source(&self, source: Option<Box<dyn CaptureSource>>) -> Result<()> {
        let mut slot = lock(&self.source);
        if let Some(old) = slot.as_mut() {
            old.release()?;
        }
        *slot = source;
        Ok(())
    }

    pub fn set_listener(&self, listener: Option<FrameListener>) {
        *self.listener.write().unwrap_or_else(PoisonError::into_inner) = listener;
    }

    pub fn pool(&self) -> &ArrayPool {
        &self.pool
    }

    pub fn queue(&self) -> &AnimatedDataQueue {
        &self.queue
    }

    // ==================== Stage list ====================

    pub fn add_stage(&self, stage: impl Into<AnyStage>) -> StageId {
        lock(&self.chain).add(stage)
    }

    pub fn insert_stage(&self, index: usize, stage: impl Into<AnyStage>) -> StageId {
        lock(&self.chain).insert(index, stage)
    }

    pub fn remove_stage(&self, id: StageId) -> Option<AnyStage> {
        lock(&self.chain).remove(id)
    }

    pub fn replace_stage(&self, id: StageId, stage: impl Into<AnyStage>) -> Option<AnyStage> {
        lock(&self.chain).replace(id, stage)
    }

    /// Swap in a whole new chain, returning the old one.
    pub fn set_chain(&self, chain: ProcessorChain) -> ProcessorChain {
        std::mem::replace(&mut *lock(&self.chain), chain)
    }

    pub fn use_default_chain(&self, config: &ProcessingConfig) {
        self.set_chain(ProcessorChain::from_config(config));
        tracing::debug!("Reset to the default processor chain");
    }

    /// Run `f` with exclusive access to the chain.
    pub fn with_chain<R>(&self, f: impl FnOnce(&mut ProcessorChain) -> R) -> R {
        f(&mut lock(&self.chain))
    }

    pub fn stage_names(&self) -> Vec<String> {
        lock(&self.chain)
            .stage_names()
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    // ==================== Producer side ====================

    /// Process one raw capture block and queue the result.
    ///
    /// Blocks delivered while the pipeline is stopped are dropped with
    /// [`PipelineError::NotRunning`]. A stage failure drops the frame and is
    /// returned after being logged; the queue is left untouched.
    pub fn add_data(&self, raw: &[u8]) -> PipelineResult<()> {
        if !self.queue.is_running() {
            return Err(PipelineError::NotRunning);
        }

        let result = lock(&self.chain).process(raw, &self.pool);
        let frame = match result {
            Ok(frame) => frame,
            Err(e) => {
                self.frames_dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!("Dropping frame: {}", e);
                return Err(e);
            }
        };

        self.frames_processed.fetch_add(1, Ordering::Relaxed);
        self.deliver(frame);
        Ok(())
    }

    fn deliver(&self, frame: PooledBuffer) {
        let listener = self.listener.read().unwrap_or_else(PoisonError::into_inner);
        let Some(listener) = listener.as_ref() else {
            self.queue.add_buffer(frame);
            return;
        };

        let shared = self.pool.share(frame);
        if let Some(lease) = self.pool.retain(&shared) {
            listener(lease);
        }
        self.queue.add_data(&shared.read());
        self.pool.recycle_shared(shared);
    }

    // ==================== Consumer side ====================

    pub fn acquire_buffer(&self) -> Option<Frame<'_>> {
        self.queue.acquire_buffer()
    }

    pub fn interpolated(&self) -> Option<Frame<'_>> {
        self.queue.interpolated()
    }

    // ==================== Lifecycle ====================

    /// Start the queue, then the capture source (if any). The source's sink
    /// holds only a weak reference, so it never keeps the driver alive.
    pub fn start(self: &Arc<Self>) -> Result<()> {
        self.queue.start()?;

        let mut source = lock(&self.source);
        if let Some(source) = source.as_mut() {
            let driver = Arc::downgrade(self);
            let sink: CaptureSink = Arc::new(move |raw: &[u8]| {
                if let Some(driver) = driver.upgrade() {
                    let _ = driver.add_data(raw);
                }
            });
            if let Err(e) = source.start(sink) {
                self.queue.stop();
                return Err(e);
            }
        }

        tracing::info!("Pipeline started");
        Ok(())
    }

    /// Stop the capture source and clear the queue. The pipeline can be
    /// started again.
    pub fn stop(&self) -> Result<()> {
        let result = match lock(&self.source).as_mut() {
            Some(source) => source.stop(),
            None => Ok(()),
        };
        self.queue.stop();
        tracing::info!("Pipeline stopped");
        result
    }

    /// Stop for good and release the capture source.
    pub fn release(&self) -> Result<()> {
        let result = match lock(&self.source).take() {
            Some(mut source) => source.release(),
            None => Ok(()),
        };
        self.queue.release();
        tracing::info!("Pipeline released");
        result
    }

    pub fn is_running(&self) -> bool {
        self.queue.is_running()
    }

    pub fn stats(&self) -> DriverStats {
        DriverStats {
            frames_processed: self.frames_processed.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            queue: self.queue.stats(),
            pool: self.pool.stats(),
        }
    }
}

impl std::fmt::Debug for PipelineDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineDriver")
            .field("chain", &*lock(&self.chain))
            .field("queue", &self.queue)
            .finish()
    }
}
