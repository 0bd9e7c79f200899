//! Identity types for pooled buffers.
//!
//! A `BufferId` names one lease of one buffer: the owning pool, an index into
//! that pool's usage arena, and the generation of the arena slot at the time
//! the lease was handed out. Retiring a slot bumps its generation, so an id
//! outlives its lease only as a stale value that the pool rejects.

use std::fmt;

/// Identifier of a live buffer lease.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferId {
    pool: u32,
    index: u32,
    generation: u32,
}

impl BufferId {
    pub(crate) fn new(pool: u32, index: u32, generation: u32) -> Self {
        Self {
            pool,
            index,
            generation,
        }
    }

    /// Identifier of the pool that issued this id.
    #[inline]
    pub fn pool(self) -> u32 {
        self.pool
    }

    /// Index into the pool's usage arena.
    #[inline]
    pub fn index(self) -> usize {
        self.index as usize
    }

    #[inline]
    pub fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Debug for BufferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "BufferId(pool={}, index={}, gen={})",
            self.pool, self.index, self.generation
        )
    }
}

impl fmt::Display for BufferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Packed slot state: high 32 bits = generation, low 32 bits = usage count.
///
/// Keeping both halves in one word lets increment, decrement and retirement
/// be a single compare-and-swap, so a decrement can never land on a slot that
/// was retired and re-issued in between.
#[derive(Clone, Copy, PartialEq, Eq)]
pub(crate) struct SlotState(pub u64);

impl SlotState {
    const COUNT_MASK: u64 = u32::MAX as u64;

    #[inline]
    pub fn new(generation: u32, count: u32) -> Self {
        Self(((generation as u64) << 32) | count as u64)
    }

    #[inline]
    pub fn generation(self) -> u32 {
        (self.0 >> 32) as u32
    }

    #[inline]
    pub fn count(self) -> u32 {
        (self.0 & Self::COUNT_MASK) as u32
    }

    /// State after the last owner lets go: next generation, zero owners.
    #[inline]
    pub fn retired(self) -> Self {
        Self::new(self.generation().wrapping_add(1), 0)
    }
}

impl fmt::Debug for SlotState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SlotState(gen={}, count={})",
            self.generation(),
            self.count()
        )
    }
}
