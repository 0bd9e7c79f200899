//! Animated data queue: newest-wins hand-off plus frame interpolation.
//!
//! The producer side (`add_data`) only ever touches the `latest` slot, so it
//! never waits on the consumer. The consumer commits the newest pending
//! buffer with [`AnimatedDataQueue::acquire_buffer`] and then walks toward it
//! with [`AnimatedDataQueue::interpolated`], one step per call.
//!
//! ```text
//!  add_data ──► latest ──acquire──► current ──┐
//!                                   previous ─┴─interpolated──► interpolated
//! ```
//!
//! A pending buffer that is overwritten before it is acquired goes straight
//! back to the pool; there is no backlog.

use crate::config::{AnimationConfig, DEFAULT_INTERPOLATION_FRAMES};
use crate::pool::{ArrayPool, PooledBuffer};
use crate::processor::{PipelineError, PipelineResult};
use crossbeam_channel::{bounded, Receiver, Sender};
use std::ops::Deref;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Notification posted to the consumer's scheduling context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueSignal {
    /// At least one buffer is waiting to be acquired.
    BufferAvailable,
}

/// Counters for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    /// Buffers accepted by `add_data`/`add_buffer`.
    pub ingested: u64,
    /// Pending buffers replaced before they were acquired.
    pub overwritten: u64,
    /// Buffers committed by `acquire_buffer`.
    pub committed: u64,
}

#[derive(Default)]
struct FrameState {
    current: Option<PooledBuffer>,
    previous: Option<PooledBuffer>,
    interpolated: Option<PooledBuffer>,
    step: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameSlot {
    Current,
    Interpolated,
}

/// Borrowed view of a frame held by the queue.
///
/// Holds the queue's frame lock: drop it before calling `acquire_buffer`,
/// `interpolated` or `stop` again from the same thread. The producer side is
/// never blocked by a live `Frame`.
pub struct Frame<'a> {
    guard: MutexGuard<'a, FrameState>,
    slot: FrameSlot,
    progress: f64,
}

impl Frame<'_> {
    /// Interpolation progress in `[0, 1]`; `1.0` means the frame equals `current`.
    pub fn progress(&self) -> f64 {
        self.progress
    }

    /// Whether this is the committed frame rather than an in-between step.
    pub fn is_current(&self) -> bool {
        self.slot == FrameSlot::Current
    }
}

impl Deref for Frame<'_> {
    type Target = [f64];

    fn deref(&self) -> &[f64] {
        let buffer = match self.slot {
            FrameSlot::Current => &self.guard.current,
            FrameSlot::Interpolated => &self.guard.interpolated,
        };
        buffer.as_deref().unwrap_or(&[])
    }
}

impl std::fmt::Debug for Frame<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("slot", &self.slot)
            .field("progress", &self.progress)
            .field("len", &self.len())
            .finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Newest-wins buffer queue that animates between committed frames.
pub struct AnimatedDataQueue {
    pool: ArrayPool,
    interpolation_frames: u32,
    running: AtomicBool,
    released: AtomicBool,
    latest: Mutex<Option<PooledBuffer>>,
    frames: Mutex<FrameState>,
    signal_tx: Sender<QueueSignal>,
    signal_rx: Receiver<QueueSignal>,
    ingested: AtomicU64,
    overwritten: AtomicU64,
    committed: AtomicU64,
}

impl AnimatedDataQueue {
    pub fn new(pool: ArrayPool) -> Self {
        Self::with_frames(pool, DEFAULT_INTERPOLATION_FRAMES)
    }

    pub fn with_config(pool: ArrayPool, config: &AnimationConfig) -> Self {
        Self::with_frames(pool, config.interpolation_frames)
    }

    /// `interpolation_frames` of 0 is treated as 1.
    pub fn with_frames(pool: ArrayPool, interpolation_frames: u32) -> Self {
        // Capacity 1 coalesces repeated signals into one.
        let (signal_tx, signal_rx) = bounded(1);
        Self {
            pool,
            interpolation_frames: interpolation_frames.max(1),
            running: AtomicBool::new(false),
            released: AtomicBool::new(false),
            latest: Mutex::new(None),
            frames: Mutex::new(FrameState::default()),
            signal_tx,
            signal_rx,
            ingested: AtomicU64::new(0),
            overwritten: AtomicU64::new(0),
            committed: AtomicU64::new(0),
        }
    }

    pub fn pool(&self) -> &ArrayPool {
        &self.pool
    }

    pub fn interpolation_frames(&self) -> u32 {
        self.interpolation_frames
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    /// Receiver for availability signals. Signals are coalesced: at most one
    /// is pending at a time.
    pub fn signals(&self) -> Receiver<QueueSignal> {
        self.signal_rx.clone()
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            ingested: self.ingested.load(Ordering::Relaxed),
            overwritten: self.overwritten.load(Ordering::Relaxed),
            committed: self.committed.load(Ordering::Relaxed),
        }
    }

    /// Copy `samples` into a pooled buffer and make it the pending frame.
    ///
    /// Returns `false` (and does nothing) when the queue is not running.
    pub fn add_data(&self, samples: &[f64]) -> bool {
        if !self.is_running() {
            return false;
        }
        let mut buffer = self.pool.acquire(samples.len());
        buffer.copy_from_slice(samples);
        self.add_buffer(buffer)
    }

    /// Make an already-leased buffer the pending frame, taking ownership.
    ///
    /// When the queue is not running the buffer is recycled and `false` is
    /// returned.
    pub fn add_buffer(&self, buffer: PooledBuffer) -> bool {
        let displaced = {
            let mut latest = lock(&self.latest);
            // Checked under the lock so a concurrent stop() cannot miss it.
            if !self.is_running() {
                drop(latest);
                self.pool.recycle(buffer);
                return false;
            }
            let displaced = latest.replace(buffer);
            // Posted under the lock so stop() drains it after clearing.
            // Full means a signal is already pending.
            let _ = self.signal_tx.try_send(QueueSignal::BufferAvailable);
            displaced
        };

        self.ingested.fetch_add(1, Ordering::Relaxed);
        if let Some(old) = displaced {
            self.overwritten.fetch_add(1, Ordering::Relaxed);
            self.pool.recycle(old);
        }
        tracing::trace!("Frame queued");
        true
    }

    /// Commit the pending buffer as the new interpolation target.
    ///
    /// Returns `None` and leaves all state untouched when nothing is pending.
    pub fn acquire_buffer(&self) -> Option<Frame<'_>> {
        let mut frames = lock(&self.frames);
        let next = lock(&self.latest).take()?;

        let state = &mut *frames;
        if let Some(old) = state.previous.take() {
            self.pool.recycle(old);
        }
        state.previous = state.current.replace(next);
        state.step = 0;
        self.committed.fetch_add(1, Ordering::Relaxed);

        Some(Frame {
            guard: frames,
            slot: FrameSlot::Current,
            progress: 0.0,
        })
    }

    /// Advance one step from `previous` toward `current` and return the blend.
    ///
    /// Without a previous frame, `current` is returned as is. Indices beyond
    /// the previous frame's length blend from 0.0.
    pub fn interpolated(&self) -> Option<Frame<'_>> {
        let mut frames = lock(&self.frames);
        let state = &mut *frames;

        let current = state.current.as_ref()?;
        let Some(previous) = state.previous.as_ref() else {
            return Some(Frame {
                guard: frames,
                slot: FrameSlot::Current,
                progress: 1.0,
            });
        };

        state.step = (state.step + 1).min(self.interpolation_frames);
        let progress = state.step as f64 / self.interpolation_frames as f64;

        let mut target = match state.interpolated.take() {
            Some(buffer) if buffer.len() == current.len() => buffer,
            Some(buffer) => {
                self.pool.recycle(buffer);
                self.pool.acquire(current.len())
            }
            None => self.pool.acquire(current.len()),
        };

        if state.step >= self.interpolation_frames {
            target.copy_from_slice(current);
        } else {
            for (i, (out, &to)) in target.iter_mut().zip(current.iter()).enumerate() {
                let from = previous.get(i).copied().unwrap_or(0.0);
                *out = from + (to - from) * progress;
            }
        }
        state.interpolated = Some(target);

        Some(Frame {
            guard: frames,
            slot: FrameSlot::Interpolated,
            progress,
        })
    }

    /// Mark the queue as accepting data.
    pub fn start(&self) -> PipelineResult<()> {
        if self.is_released() {
            return Err(PipelineError::Released);
        }
        if !self.running.swap(true, Ordering::AcqRel) {
            tracing::debug!("Animated data queue started");
        }
        Ok(())
    }

    /// Stop accepting data and return every held buffer to the pool.
    pub fn stop(&self) {
        let was_running = self.running.swap(false, Ordering::AcqRel);
        self.clear_slots();
        while self.signal_rx.try_recv().is_ok() {}
        if was_running {
            tracing::debug!("Animated data queue stopped");
        }
    }

    /// Stop for good. Later `start` calls fail with [`PipelineError::Released`].
    pub fn release(&self) {
        self.stop();
        if !self.released.swap(true, Ordering::AcqRel) {
            tracing::debug!("Animated data queue released");
        }
    }

    fn clear_slots(&self) {
        if let Some(buffer) = lock(&self.latest).take() {
            self.pool.recycle(buffer);
        }

        let mut frames = lock(&self.frames);
        let state = &mut *frames;
        for buffer in [
            state.current.take(),
            state.previous.take(),
            state.interpolated.take(),
        ]
        .into_iter()
        .flatten()
        {
            self.pool.recycle(buffer);
        }
        state.step = 0;
    }
}

impl Drop for AnimatedDataQueue {
    fn drop(&mut self) {
        self.clear_slots();
    }
}

impl std::fmt::Debug for AnimatedDataQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnimatedDataQueue")
            .field("interpolation_frames", &self.interpolation_frames)
            .field("running", &self.is_running())
            .field("released", &self.is_released())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn running_queue() -> AnimatedDataQueue {
        let queue = AnimatedDataQueue::new(ArrayPool::new());
        queue.start().unwrap();
        queue
    }

    #[test]
    fn test_no_data_before_first_frame() {
        let queue = running_queue();
        assert!(queue.acquire_buffer().is_none());
        assert!(queue.interpolated().is_none());
    }

    #[test]
    fn test_first_frame_is_not_interpolated() {
        let queue = running_queue();
        assert!(queue.add_data(&[1.0, 2.0]));

        let frame = queue.acquire_buffer().unwrap();
        assert_eq!(&frame[..], &[1.0, 2.0]);
        drop(frame);

        let frame = queue.interpolated().unwrap();
        assert!(frame.is_current());
        assert_eq!(&frame[..], &[1.0, 2.0]);
    }

    #[test]
    fn test_interpolation_steps_toward_current() {
        let queue = running_queue();
        queue.add_data(&[0.0, 0.0]);
        queue.acquire_buffer();
        queue.add_data(&[10.0, 20.0]);
        queue.acquire_buffer();

        let frame = queue.interpolated().unwrap();
        assert!((frame[0] - 0.5).abs() < 1e-12);
        assert!((frame[1] - 1.0).abs() < 1e-12);
        assert!((frame.progress() - 0.05).abs() < 1e-12);
        drop(frame);

        for _ in 0..18 {
            queue.interpolated();
        }
        let frame = queue.interpolated().unwrap();
        assert_eq!(frame.progress(), 1.0);
        assert_eq!(&frame[..], &[10.0, 20.0]);
        drop(frame);

        // Progress stays clamped.
        let frame = queue.interpolated().unwrap();
        assert_eq!(&frame[..], &[10.0, 20.0]);
    }

    #[test]
    fn test_shorter_previous_blends_from_zero() {
        let queue = AnimatedDataQueue::with_frames(ArrayPool::new(), 2);
        queue.start().unwrap();
        queue.add_data(&[4.0]);
        queue.acquire_buffer();
        queue.add_data(&[8.0, 6.0]);
        queue.acquire_buffer();

        let frame = queue.interpolated().unwrap();
        assert_eq!(&frame[..], &[6.0, 3.0]);
    }

    #[test]
    fn test_acquire_without_new_data_keeps_state() {
        let queue = running_queue();
        queue.add_data(&[0.0]);
        queue.acquire_buffer();
        queue.add_data(&[20.0]);
        queue.acquire_buffer();
        queue.interpolated();

        assert!(queue.acquire_buffer().is_none());
        let frame = queue.interpolated().unwrap();
        assert!((frame[0] - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_newest_wins_recycles_displaced() {
        let pool = ArrayPool::new();
        let queue = AnimatedDataQueue::new(pool.clone());
        queue.start().unwrap();

        queue.add_data(&[1.0, 1.0]);
        queue.add_data(&[2.0, 2.0]);
        assert_eq!(pool.stats().live, 1);
        assert_eq!(pool.stats().pooled, 1);

        let frame = queue.acquire_buffer().unwrap();
        assert_eq!(&frame[..], &[2.0, 2.0]);
        drop(frame);

        let stats = queue.stats();
        assert_eq!(stats.ingested, 2);
        assert_eq!(stats.overwritten, 1);
        assert_eq!(stats.committed, 1);
    }

    #[test]
    fn test_signals_are_coalesced_and_drained() {
        let queue = running_queue();
        let signals = queue.signals();
        queue.add_data(&[1.0]);
        queue.add_data(&[2.0]);
        assert_eq!(signals.try_recv(), Ok(QueueSignal::BufferAvailable));
        assert!(signals.try_recv().is_err());

        queue.add_data(&[3.0]);
        queue.stop();
        assert!(signals.try_recv().is_err());
    }

    #[test]
    fn test_ingest_is_noop_when_stopped() {
        let pool = ArrayPool::new();
        let queue = AnimatedDataQueue::new(pool.clone());
        assert!(!queue.add_data(&[1.0]));

        let buffer = pool.acquire(3);
        assert!(!queue.add_buffer(buffer));
        assert_eq!(pool.stats().live, 0);
        assert!(queue.acquire_buffer().is_none());
    }

    #[test]
    fn test_stop_recycles_all_slots() {
        let pool = ArrayPool::new();
        let queue = AnimatedDataQueue::new(pool.clone());
        queue.start().unwrap();
        queue.add_data(&[1.0, 2.0]);
        queue.acquire_buffer();
        queue.add_data(&[3.0, 4.0]);
        queue.acquire_buffer();
        queue.interpolated();
        queue.add_data(&[5.0, 6.0]);
        assert_eq!(pool.stats().live, 4);

        queue.stop();
        assert!(!queue.is_running());
        assert_eq!(pool.stats().live, 0);
        assert!(queue.interpolated().is_none());

        // Restartable after stop.
        queue.start().unwrap();
        assert!(queue.add_data(&[7.0]));
    }

    #[test]
    fn test_release_is_final() {
        let queue = running_queue();
        queue.release();
        assert!(queue.is_released());
        assert!(matches!(queue.start(), Err(PipelineError::Released)));
        assert!(!queue.add_data(&[1.0]));
    }

    #[test]
    fn test_drop_returns_buffers() {
        let pool = ArrayPool::new();
        {
            let queue = AnimatedDataQueue::new(pool.clone());
            queue.start().unwrap();
            queue.add_data(&[1.0]);
            queue.acquire_buffer();
            queue.add_data(&[2.0]);
        }
        assert_eq!(pool.stats().live, 0);
    }

    #[test]
    fn test_concurrent_producer_and_consumer() {
        let pool = ArrayPool::new();
        let queue = Arc::new(AnimatedDataQueue::new(pool.clone()));
        queue.start().unwrap();

        let producer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                for i in 0..2000 {
                    queue.add_data(&[i as f64; 16]);
                }
            })
        };

        let mut last_seen = -1.0;
        while !producer.is_finished() {
            if let Some(frame) = queue.acquire_buffer() {
                // Committed frames arrive in production order.
                assert!(frame[0] > last_seen);
                last_seen = frame[0];
            }
            if let Some(frame) = queue.interpolated() {
                assert_eq!(frame.len(), 16);
            }
        }
        producer.join().unwrap();

        queue.stop();
        assert_eq!(pool.stats().live, 0);
    }

    #[test]
    fn test_stop_leaves_no_signal_behind() {
        let queue = Arc::new(running_queue());
        let signals = queue.signals();
        let done = Arc::new(AtomicBool::new(false));

        let producer = {
            let queue = Arc::clone(&queue);
            let done = Arc::clone(&done);
            thread::spawn(move || {
                while !done.load(Ordering::Acquire) {
                    queue.add_data(&[1.0; 8]);
                }
            })
        };

        for _ in 0..500 {
            queue.stop();
            assert!(signals.try_recv().is_err());
            assert!(queue.acquire_buffer().is_none());
            queue.start().unwrap();
            thread::yield_now();
        }

        done.store(true, Ordering::Release);
        producer.join().unwrap();
        queue.stop();
        assert!(signals.try_recv().is_err());
        assert_eq!(queue.pool().stats().live, 0);
    }
}
