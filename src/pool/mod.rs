//! Thread-safe recycling allocator for fixed-length `f64` buffers.
//!
//! # Layout
//!
//! - **Buckets**: free buffers keyed by length, partitioned into shards.
//!   A thread always returns buffers to its home shard and takes from it
//!   first; other shards are only probed with `try_lock` so producer and
//!   consumer never block each other on the hot path.
//! - **Usage arena**: one packed `AtomicU64` (generation + owner count) per
//!   live lease, shared by every thread. Handles carry a [`BufferId`] that
//!   indexes the arena, so there is no hashing of buffer contents and a stale
//!   handle is rejected by its generation.
//!
//! Buffers are zero-filled before they go back into a bucket, so `acquire`
//! always yields an all-zero buffer.

pub mod buffer;
pub mod id;

pub use buffer::{PooledBuffer, SharedBuffer};
pub use id::BufferId;

use crate::config::PoolConfig;
use id::SlotState;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{
    Arc, Mutex, MutexGuard, OnceLock, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard,
};

static NEXT_POOL_ID: AtomicU32 = AtomicU32::new(0);
static GLOBAL_POOL: OnceLock<ArrayPool> = OnceLock::new();

type Bucket = Vec<Vec<f64>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

/// Outcome of dropping one owner of a lease.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Release {
    /// Id does not name a live lease of this pool.
    Unknown,
    /// Other owners remain.
    Outstanding(u32),
    /// That was the last owner; the slot is retired.
    Last,
}

/// Shared table of owner counts, indexed by `BufferId::index`.
struct UsageTable {
    slots: RwLock<Vec<AtomicU64>>,
    free: Mutex<Vec<u32>>,
}

impl UsageTable {
    fn new() -> Self {
        Self {
            slots: RwLock::new(Vec::new()),
            free: Mutex::new(Vec::new()),
        }
    }

    /// Issue a new lease with one owner. Returns `(index, generation)`.
    fn register(&self) -> (u32, u32) {
        let reused = lock(&self.free).pop();
        if let Some(index) = reused {
            let slots = read(&self.slots);
            let slot = &slots[index as usize];
            // Retired slots have count 0, so nothing else can touch this one.
            let generation = SlotState(slot.load(Ordering::Acquire)).generation();
            slot.store(SlotState::new(generation, 1).0, Ordering::Release);
            return (index, generation);
        }

        let mut slots = write(&self.slots);
        let index = slots.len() as u32;
        slots.push(AtomicU64::new(SlotState::new(0, 1).0));
        (index, 0)
    }

    fn increment(&self, id: BufferId) -> bool {
        let slots = read(&self.slots);
        let Some(slot) = slots.get(id.index()) else {
            return false;
        };

        let mut current = slot.load(Ordering::Acquire);
        loop {
            let state = SlotState(current);
            if state.generation() != id.generation()
                || state.count() == 0
                || state.count() == u32::MAX
            {
                return false;
            }
            match slot.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    fn decrement(&self, id: BufferId) -> Release {
        let outcome = {
            let slots = read(&self.slots);
            let Some(slot) = slots.get(id.index()) else {
                return Release::Unknown;
            };

            let mut current = slot.load(Ordering::Acquire);
            loop {
                let state = SlotState(current);
                if state.generation() != id.generation() || state.count() == 0 {
                    return Release::Unknown;
                }
                let next = if state.count() == 1 {
                    state.retired()
                } else {
                    SlotState(current - 1)
                };
                match slot.compare_exchange_weak(
                    current,
                    next.0,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                ) {
                    Ok(_) if next.count() == 0 => break Release::Last,
                    Ok(_) => break Release::Outstanding(next.count()),
                    Err(actual) => current = actual,
                }
            }
        };

        if outcome == Release::Last {
            lock(&self.free).push(id.index() as u32);
        }
        outcome
    }

    fn count(&self, id: BufferId) -> Option<u32> {
        let slots = read(&self.slots);
        let state = SlotState(slots.get(id.index())?.load(Ordering::Acquire));
        (state.generation() == id.generation() && state.count() > 0).then_some(state.count())
    }

    fn live(&self) -> usize {
        read(&self.slots)
            .iter()
            .filter(|slot| SlotState(slot.load(Ordering::Acquire)).count() > 0)
            .count()
    }
}

/// Snapshot of pool bookkeeping, mostly useful for leak checks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Leases currently held by at least one owner.
    pub live: usize,
    /// Free buffers sitting in buckets.
    pub pooled: usize,
    /// Buffers created with a fresh allocation.
    pub allocations: u64,
    /// Buffers served from a bucket.
    pub reuses: u64,
}

pub(crate) struct PoolInner {
    pool_id: u32,
    shards: Box<[Mutex<HashMap<usize, Bucket>>]>,
    max_per_bucket: usize,
    usage: UsageTable,
    allocations: AtomicU64,
    reuses: AtomicU64,
}

/// Recycling allocator for `f64` buffers. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct ArrayPool {
    inner: Arc<PoolInner>,
}

impl ArrayPool {
    /// Create a pool with default sharding and bucket limits.
    pub fn new() -> Self {
        Self::with_config(&PoolConfig::default())
    }

    pub fn with_config(config: &PoolConfig) -> Self {
        let shard_count = config.shard_count.max(1);
        let shards = (0..shard_count)
            .map(|_| Mutex::new(HashMap::new()))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Self {
            inner: Arc::new(PoolInner {
                pool_id: NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed),
                shards,
                max_per_bucket: config.max_buffers_per_bucket,
                usage: UsageTable::new(),
                allocations: AtomicU64::new(0),
                reuses: AtomicU64::new(0),
            }),
        }
    }

    /// Process-wide pool with the default configuration.
    pub fn global() -> &'static ArrayPool {
        GLOBAL_POOL.get_or_init(ArrayPool::new)
    }

    /// Lease an all-zero buffer of exactly `len` samples with one owner.
    pub fn acquire(&self, len: usize) -> PooledBuffer {
        let data = match self.take_free(len) {
            Some(data) => {
                self.inner.reuses.fetch_add(1, Ordering::Relaxed);
                data
            }
            None => {
                self.inner.allocations.fetch_add(1, Ordering::Relaxed);
                vec![0.0; len]
            }
        };

        let (index, generation) = self.inner.usage.register();
        PooledBuffer {
            id: BufferId::new(self.inner.pool_id, index, generation),
            data,
            pool: Arc::downgrade(&self.inner),
        }
    }

    /// Give up an exclusive buffer.
    ///
    /// Returns `true` if the buffer went back into its bucket, `false` if the
    /// id is unknown to this pool (foreign or stale) or another owner is
    /// still outstanding. The storage is never returned twice.
    pub fn recycle(&self, buffer: PooledBuffer) -> bool {
        let (id, data) = buffer.detach();
        self.reclaim(id, data)
    }

    fn reclaim(&self, id: BufferId, data: Vec<f64>) -> bool {
        match self.release(id) {
            Release::Last => {
                self.return_storage(data);
                true
            }
            Release::Outstanding(remaining) => {
                tracing::warn!(
                    "Exclusive buffer {} recycled with {} owners outstanding",
                    id,
                    remaining
                );
                false
            }
            Release::Unknown => false,
        }
    }

    /// Turn an exclusive buffer into a shared lease (owner count unchanged).
    pub fn share(&self, buffer: PooledBuffer) -> SharedBuffer {
        let (id, data) = buffer.detach();
        SharedBuffer {
            id,
            data: Arc::new(RwLock::new(data)),
        }
    }

    /// Register another owner of `buffer` and hand out its lease.
    ///
    /// Returns `None` if the buffer is not tracked by this pool.
    pub fn retain(&self, buffer: &SharedBuffer) -> Option<SharedBuffer> {
        if buffer.id.pool() != self.inner.pool_id || !self.inner.usage.increment(buffer.id) {
            return None;
        }
        Some(SharedBuffer {
            id: buffer.id,
            data: Arc::clone(&buffer.data),
        })
    }

    /// Release one shared lease. Returns `true` if this was the last owner
    /// and the storage went back into its bucket.
    pub fn recycle_shared(&self, buffer: SharedBuffer) -> bool {
        match self.release(buffer.id) {
            Release::Last => {
                let data = buffer.take_storage();
                self.return_storage(data);
                true
            }
            Release::Outstanding(_) | Release::Unknown => false,
        }
    }

    /// Current owner count of a lease, `None` if it is not live.
    pub fn usage_count(&self, id: BufferId) -> Option<u32> {
        if id.pool() != self.inner.pool_id {
            return None;
        }
        self.inner.usage.count(id)
    }

    /// Drop every free buffer. Leased buffers are unaffected.
    pub fn clear(&self) {
        for shard in self.inner.shards.iter() {
            lock(shard).clear();
        }
        tracing::debug!("Array pool {} cleared", self.inner.pool_id);
    }

    pub fn stats(&self) -> PoolStats {
        let pooled = self
            .inner
            .shards
            .iter()
            .map(|shard| lock(shard).values().map(Vec::len).sum::<usize>())
            .sum();

        PoolStats {
            live: self.inner.usage.live(),
            pooled,
            allocations: self.inner.allocations.load(Ordering::Relaxed),
            reuses: self.inner.reuses.load(Ordering::Relaxed),
        }
    }

    fn release(&self, id: BufferId) -> Release {
        if id.pool() != self.inner.pool_id {
            tracing::warn!("Buffer {} does not belong to pool {}", id, self.inner.pool_id);
            return Release::Unknown;
        }
        let outcome = self.inner.usage.decrement(id);
        if outcome == Release::Unknown {
            tracing::warn!("Release of untracked buffer {}", id);
        }
        outcome
    }

    fn home_shard(&self) -> usize {
        thread_local! {
            static THREAD_HASH: u64 = {
                let mut hasher = DefaultHasher::new();
                std::thread::current().id().hash(&mut hasher);
                hasher.finish()
            };
        }
        THREAD_HASH.with(|hash| (*hash as usize) % self.inner.shards.len())
    }

    fn take_free(&self, len: usize) -> Option<Vec<f64>> {
        let shards = &self.inner.shards;
        let home = self.home_shard();

        if let Some(data) = lock(&shards[home]).get_mut(&len).and_then(Vec::pop) {
            return Some(data);
        }

        // Borrow from a neighbour, but never wait for it.
        (1..shards.len())
            .map(|offset| (home + offset) % shards.len())
            .find_map(|idx| shards[idx].try_lock().ok()?.get_mut(&len)?.pop())
    }

    fn return_storage(&self, mut data: Vec<f64>) {
        data.fill(0.0);
        let mut shard = lock(&self.inner.shards[self.home_shard()]);
        let bucket = shard.entry(data.len()).or_default();
        if bucket.len() < self.inner.max_per_bucket {
            bucket.push(data);
        }
    }
}

impl Default for ArrayPool {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ArrayPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArrayPool")
            .field("pool_id", &self.inner.pool_id)
            .field("shards", &self.inner.shards.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_acquire_is_zeroed_and_sized() {
        let pool = ArrayPool::new();
        let buf = pool.acquire(16);
        assert_eq!(buf.len(), 16);
        assert!(buf.iter().all(|&v| v == 0.0));
        assert_eq!(pool.usage_count(buf.id()), Some(1));
        assert!(pool.recycle(buf));
    }

    #[test]
    fn test_recycled_buffer_is_zero_filled() {
        let pool = ArrayPool::new();
        let mut buf = pool.acquire(8);
        buf.fill(3.5);
        assert!(pool.recycle(buf));

        let again = pool.acquire(8);
        assert!(again.iter().all(|&v| v == 0.0));
        assert_eq!(pool.stats().reuses, 1);
        pool.recycle(again);
    }

    #[test]
    fn test_zero_length_buffer() {
        let pool = ArrayPool::new();
        let buf = pool.acquire(0);
        assert!(buf.is_empty());
        assert!(pool.recycle(buf));
        assert_eq!(pool.stats().live, 0);
    }

    #[test]
    fn test_buckets_are_keyed_by_length() {
        let pool = ArrayPool::new();
        let a = pool.acquire(4);
        pool.recycle(a);

        let b = pool.acquire(5);
        assert_eq!(b.len(), 5);
        let stats = pool.stats();
        assert_eq!(stats.allocations, 2);
        assert_eq!(stats.pooled, 1);
        pool.recycle(b);
    }

    #[test]
    fn test_stale_id_is_rejected() {
        let pool = ArrayPool::new();
        let buf = pool.acquire(4);
        let id = buf.id();
        assert!(pool.recycle(buf));

        // Same slot, next generation.
        let next = pool.acquire(4);
        assert_eq!(next.id().index(), id.index());
        assert_ne!(next.id(), id);
        assert_eq!(pool.usage_count(id), None);
        assert_eq!(pool.usage_count(next.id()), Some(1));

        let forged = PooledBuffer {
            id,
            data: vec![0.0; 4],
            pool: std::sync::Weak::new(),
        };
        assert!(!pool.recycle(forged));
        assert_eq!(pool.usage_count(next.id()), Some(1));
        pool.recycle(next);
    }

    #[test]
    fn test_dropped_buffer_releases_its_lease() {
        let pool = ArrayPool::new();
        let mut buf = pool.acquire(6);
        buf.fill(1.0);
        let id = buf.id();
        drop(buf);

        assert_eq!(pool.usage_count(id), None);
        let stats = pool.stats();
        assert_eq!(stats.live, 0);
        assert_eq!(stats.pooled, 1);
        assert!(pool.acquire(6).iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_buffer_outliving_its_pool() {
        let pool = ArrayPool::new();
        let buf = pool.acquire(4);
        drop(pool);
        drop(buf);
    }

    #[test]
    fn test_shared_buffer_does_not_release_on_share() {
        let pool = ArrayPool::new();
        let shared = pool.share(pool.acquire(2));
        assert_eq!(pool.usage_count(shared.id()), Some(1));
        assert!(pool.recycle_shared(shared));
        assert_eq!(pool.stats().live, 0);
    }

    #[test]
    fn test_foreign_buffer_is_rejected() {
        let a = ArrayPool::new();
        let b = ArrayPool::new();
        let buf = a.acquire(4);
        let id = buf.id();
        assert!(!b.recycle(buf));
        assert_eq!(b.stats().pooled, 0);
        // The lease in `a` is untouched.
        assert_eq!(a.usage_count(id), Some(1));
    }

    #[test]
    fn test_shared_lease_counting() {
        let pool = ArrayPool::new();
        let mut buf = pool.acquire(3);
        buf.copy_from_slice(&[1.0, 2.0, 3.0]);

        let shared = pool.share(buf);
        let lease = pool.retain(&shared).expect("tracked buffer");
        assert_eq!(pool.usage_count(shared.id()), Some(2));
        assert_eq!(lease.to_vec(), vec![1.0, 2.0, 3.0]);

        assert!(!pool.recycle_shared(shared));
        assert_eq!(lease.to_vec(), vec![1.0, 2.0, 3.0]);
        assert!(pool.recycle_shared(lease));

        let stats = pool.stats();
        assert_eq!(stats.live, 0);
        assert_eq!(stats.pooled, 1);
    }

    #[test]
    fn test_retain_untracked_fails() {
        let a = ArrayPool::new();
        let b = ArrayPool::new();
        let shared = a.share(a.acquire(2));
        assert!(b.retain(&shared).is_none());
        assert!(a.recycle_shared(shared));
    }

    #[test]
    fn test_clear_keeps_live_buffers() {
        let pool = ArrayPool::new();
        let held = pool.acquire(10);
        let freed = pool.acquire(10);
        pool.recycle(freed);
        assert_eq!(pool.stats().pooled, 1);

        pool.clear();
        let stats = pool.stats();
        assert_eq!(stats.pooled, 0);
        assert_eq!(stats.live, 1);
        assert_eq!(pool.usage_count(held.id()), Some(1));
        assert!(pool.recycle(held));
    }

    #[test]
    fn test_bucket_capacity_is_bounded() {
        let pool = ArrayPool::with_config(&PoolConfig {
            shard_count: 1,
            max_buffers_per_bucket: 2,
        });
        let bufs: Vec<_> = (0..4).map(|_| pool.acquire(6)).collect();
        for buf in bufs {
            assert!(pool.recycle(buf));
        }
        assert_eq!(pool.stats().pooled, 2);
    }

    #[test]
    fn test_cross_thread_recycle_is_reused() {
        let pool = ArrayPool::new();
        let buf = pool.acquire(32);

        let other = pool.clone();
        thread::spawn(move || assert!(other.recycle(buf)))
            .join()
            .unwrap();

        // Either our shard or a neighbour's holds it now.
        let again = pool.acquire(32);
        assert_eq!(pool.stats().reuses, 1);
        pool.recycle(again);
    }

    #[test]
    fn test_concurrent_acquire_recycle_leaves_no_leases() {
        let pool = ArrayPool::new();
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let pool = pool.clone();
                thread::spawn(move || {
                    for i in 0..500 {
                        let mut buf = pool.acquire(64 + (i % 3));
                        buf[0] = t as f64;
                        let shared = pool.share(buf);
                        let lease = pool.retain(&shared).unwrap();
                        let recycled = [pool.recycle_shared(shared), pool.recycle_shared(lease)];
                        assert_eq!(recycled.iter().filter(|r| **r).count(), 1);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(pool.stats().live, 0);
    }

    // Property-based tests using proptest
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn test_reacquired_buffers_are_zero(len in 0usize..512, fill in -1e6f64..1e6) {
            let pool = ArrayPool::new();
            let mut buf = pool.acquire(len);
            buf.fill(fill);
            prop_assert!(pool.recycle(buf));

            let again = pool.acquire(len);
            prop_assert_eq!(again.len(), len);
            prop_assert!(again.iter().all(|&v| v == 0.0));
            prop_assert!(pool.recycle(again));
        }
    }
}
