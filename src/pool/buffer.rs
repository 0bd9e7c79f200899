//! Buffer handles handed out by [`ArrayPool`](super::ArrayPool).
//!
//! `PooledBuffer` is move-only and exclusively owned, so only one stage can
//! mutate it at a time. `SharedBuffer` is the read-only form used when a frame
//! must outlive the call that produced it (an external listener); each clone
//! is a counted lease obtained through `ArrayPool::retain`.

use crate::pool::id::BufferId;
use crate::pool::{ArrayPool, PoolInner};
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, Weak};

/// Fixed-length `f64` buffer leased from a pool.
///
/// Hand it back with [`ArrayPool::recycle`]. A buffer that is dropped
/// instead (a panicking stage, an early return) still releases its lease,
/// as long as the pool is alive.
pub struct PooledBuffer {
    pub(crate) id: BufferId,
    pub(crate) data: Vec<f64>,
    pub(super) pool: Weak<PoolInner>,
}

impl PooledBuffer {
    pub fn id(&self) -> BufferId {
        self.id
    }

    /// Take the id and storage out without touching the lease.
    pub(super) fn detach(mut self) -> (BufferId, Vec<f64>) {
        self.pool = Weak::new();
        (self.id, std::mem::take(&mut self.data))
    }

    #[inline]
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [f64] {
        &mut self.data
    }
}

impl Deref for PooledBuffer {
    type Target = [f64];

    fn deref(&self) -> &[f64] {
        &self.data
    }
}

impl DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut [f64] {
        &mut self.data
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        let Some(inner) = self.pool.upgrade() else {
            return;
        };
        tracing::debug!("Buffer {} dropped without recycle", self.id);
        ArrayPool { inner }.reclaim(self.id, std::mem::take(&mut self.data));
    }
}

impl std::fmt::Debug for PooledBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledBuffer")
            .field("id", &self.id)
            .field("len", &self.data.len())
            .finish()
    }
}

/// Read-only, lease-counted view of a pooled buffer.
///
/// Not `Clone`: new leases come from `ArrayPool::retain` so the usage count
/// always matches the number of live handles.
pub struct SharedBuffer {
    pub(crate) id: BufferId,
    pub(crate) data: Arc<RwLock<Vec<f64>>>,
}

impl SharedBuffer {
    pub fn id(&self) -> BufferId {
        self.id
    }

    /// Borrow the samples for reading.
    pub fn read(&self) -> RwLockReadGuard<'_, Vec<f64>> {
        self.data.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy the samples out.
    pub fn to_vec(&self) -> Vec<f64> {
        self.read().clone()
    }

    /// Move the storage out, leaving an empty vector behind. Only called by
    /// the pool once the last lease has been released.
    pub(crate) fn take_storage(&self) -> Vec<f64> {
        let mut guard = self.data.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::take(&mut *guard)
    }
}

impl std::fmt::Debug for SharedBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedBuffer")
            .field("id", &self.id)
            .field("len", &self.len())
            .finish()
    }
}
