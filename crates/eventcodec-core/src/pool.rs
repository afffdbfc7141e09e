//! Tiered byte-buffer / byte-slice pool substrate (spec §4.A).
//!
//! Three size tiers — small (≤4 KiB), medium (≤64 KiB), large (≤1 MiB) — for
//! both buffers (`Vec<u8>`, used for variable-length scratch space) and
//! slices (`Box<[u8]>`, used as fixed-capacity scratch space). Locking
//! follows `gauss_engine::topic::TopicRegistry`: a `std::sync::Mutex` per
//! tier's free list, poisoned-lock recovery via `tracing::warn!` instead of
//! a panic, and atomic counters for the hot path.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::error::{codes, ResourceError};

pub const SMALL_MAX: usize = 4 * 1024;
pub const MEDIUM_MAX: usize = 64 * 1024;
pub const LARGE_MAX: usize = 1024 * 1024;

/// Absolute ceiling for the "safe" out-of-pool fallback allocation (spec §4.A, §5).
pub const ABSOLUTE_CEILING: usize = 100 * 1024 * 1024;

/// Default per-tier live-entry cap. Generous enough that ordinary traffic
/// never hits it; tuned down in tests to exercise exhaustion.
pub const DEFAULT_TIER_CAPACITY: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Small,
    Medium,
    Large,
}

impl Tier {
    pub fn max_size(self) -> usize {
        match self {
            Tier::Small => SMALL_MAX,
            Tier::Medium => MEDIUM_MAX,
            Tier::Large => LARGE_MAX,
        }
    }

    /// Smallest tier whose `max_size` ≥ `requested`, or `None` if it exceeds
    /// even the large tier (falls back to a direct, bounded allocation).
    pub fn for_size(requested: usize) -> Option<Tier> {
        if requested <= SMALL_MAX {
            Some(Tier::Small)
        } else if requested <= MEDIUM_MAX {
            Some(Tier::Medium)
        } else if requested <= LARGE_MAX {
            Some(Tier::Large)
        } else {
            None
        }
    }

    /// Tier an entry belongs to by its *current capacity* — release routes by
    /// capacity, never by the size originally requested (spec §4.A).
    fn for_capacity(capacity: usize) -> Option<Tier> {
        Self::for_size(capacity)
    }
}

/// `{gets, puts, news, resets}` atomic counters (spec §3, §4.A).
#[derive(Debug, Default)]
pub struct PoolMetrics {
    pub gets: AtomicU64,
    pub puts: AtomicU64,
    pub news: AtomicU64,
    pub resets: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolMetricsSnapshot {
    pub gets: u64,
    pub puts: u64,
    pub news: u64,
    pub resets: u64,
}

impl PoolMetrics {
    pub fn snapshot(&self) -> PoolMetricsSnapshot {
        PoolMetricsSnapshot {
            gets: self.gets.load(Ordering::Relaxed),
            puts: self.puts.load(Ordering::Relaxed),
            news: self.news.load(Ordering::Relaxed),
            resets: self.resets.load(Ordering::Relaxed),
        }
    }

    /// Zero every counter. Callers must quiesce traffic first (spec §5) —
    /// this is not safe to run concurrently with active gets/puts.
    pub fn reset(&self) {
        self.gets.store(0, Ordering::Relaxed);
        self.puts.store(0, Ordering::Relaxed);
        self.news.store(0, Ordering::Relaxed);
        self.resets.store(0, Ordering::Relaxed);
    }
}

struct TierState<T> {
    max_size: usize,
    max_entries: usize,
    free: Mutex<Vec<T>>,
    active: AtomicUsize,
    metrics: PoolMetrics,
}

impl<T> TierState<T> {
    fn new(max_size: usize, max_entries: usize) -> Self {
        Self {
            max_size,
            max_entries,
            free: Mutex::new(Vec::new()),
            active: AtomicUsize::new(0),
            metrics: PoolMetrics::default(),
        }
    }

    fn lock_free(&self) -> std::sync::MutexGuard<'_, Vec<T>> {
        match self.free.lock() {
            Ok(g) => g,
            Err(poisoned) => {
                tracing::warn!(max_size = self.max_size, "pool free-list lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }
}

// ════════════════════════════════════════════════════════════════
//  BufferPool — Vec<u8>
// ════════════════════════════════════════════════════════════════

/// A borrowed growable buffer. Caller must return it via
/// [`BufferPool::release`] or [`BufferPool::release_secure`] on every exit
/// path (spec §3: "lifecycle ... callers must return it on every exit path").
pub struct PooledBuffer {
    buf: Vec<u8>,
    origin: Option<Tier>,
}

impl PooledBuffer {
    fn outside_pool(buf: Vec<u8>) -> Self {
        Self { buf, origin: None }
    }
}

impl std::ops::Deref for PooledBuffer {
    type Target = Vec<u8>;
    fn deref(&self) -> &Vec<u8> {
        &self.buf
    }
}

impl std::ops::DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut Vec<u8> {
        &mut self.buf
    }
}

pub struct BufferPool {
    small: TierState<Vec<u8>>,
    medium: TierState<Vec<u8>>,
    large: TierState<Vec<u8>>,
    /// Secure mode is the default (spec §4.A); zero the used prefix on release.
    secure_by_default: bool,
}

impl BufferPool {
    pub fn new(secure_by_default: bool) -> Self {
        Self {
            small: TierState::new(SMALL_MAX, DEFAULT_TIER_CAPACITY),
            medium: TierState::new(MEDIUM_MAX, DEFAULT_TIER_CAPACITY),
            large: TierState::new(LARGE_MAX, DEFAULT_TIER_CAPACITY),
            secure_by_default,
        }
    }

    pub fn with_tier_capacity(secure_by_default: bool, small: usize, medium: usize, large: usize) -> Self {
        Self {
            small: TierState::new(SMALL_MAX, small),
            medium: TierState::new(MEDIUM_MAX, medium),
            large: TierState::new(LARGE_MAX, large),
            secure_by_default,
        }
    }

    fn tier_state(&self, tier: Tier) -> &TierState<Vec<u8>> {
        match tier {
            Tier::Small => &self.small,
            Tier::Medium => &self.medium,
            Tier::Large => &self.large,
        }
    }

    /// Acquire a zero-length buffer with capacity ≥ `expected_size`, or a
    /// `POOL_EXHAUSTED` `ResourceError` if the tier's live-entry cap is
    /// reached and no pooled entry is available.
    pub fn acquire(&self, expected_size: usize) -> Result<PooledBuffer, ResourceError> {
        let Some(tier) = Tier::for_size(expected_size) else {
            return Err(ResourceError::new("buffer", LARGE_MAX, expected_size).with_code(codes::OVER_LIMIT));
        };
        let state = self.tier_state(tier);

        if let Some(mut buf) = state.lock_free().pop() {
            buf.clear();
            state.metrics.gets.fetch_add(1, Ordering::Relaxed);
            return Ok(PooledBuffer { buf, origin: Some(tier) });
        }

        let active = state.active.fetch_add(1, Ordering::AcqRel);
        if active >= state.max_entries {
            state.active.fetch_sub(1, Ordering::AcqRel);
            return Err(ResourceError::new("buffer", state.max_entries, active + 1));
        }
        state.metrics.news.fetch_add(1, Ordering::Relaxed);
        state.metrics.gets.fetch_add(1, Ordering::Relaxed);
        Ok(PooledBuffer { buf: Vec::with_capacity(tier.max_size()), origin: Some(tier) })
    }

    /// Like `acquire`, but falls back to a direct, bounded allocation
    /// (`ABSOLUTE_CEILING`) instead of failing when the pool is saturated.
    /// Reference codecs use this variant and never panic (spec §5).
    pub fn acquire_safe(&self, expected_size: usize) -> Result<PooledBuffer, ResourceError> {
        match self.acquire(expected_size) {
            Ok(buf) => Ok(buf),
            Err(_) if expected_size <= ABSOLUTE_CEILING => {
                tracing::warn!(expected_size, "buffer pool saturated, falling back to direct allocation");
                Ok(PooledBuffer::outside_pool(Vec::with_capacity(expected_size)))
            }
            Err(e) => Err(e.with_code(codes::OVER_LIMIT)),
        }
    }

    /// Release using the pool's default secure setting.
    pub fn release(&self, entry: Option<PooledBuffer>) {
        self.release_with(entry, self.secure_by_default)
    }

    /// Release, always zeroing the used prefix regardless of the pool's default.
    pub fn release_secure(&self, entry: Option<PooledBuffer>) {
        self.release_with(entry, true)
    }

    fn release_with(&self, entry: Option<PooledBuffer>, secure: bool) {
        let Some(mut entry) = entry else { return };
        let Some(origin) = entry.origin else {
            // Allocated outside the pool by acquire_safe's fallback — drop it.
            return;
        };
        let state = self.tier_state(origin);
        let capacity = entry.buf.capacity();

        if Tier::for_capacity(capacity) != Some(origin) {
            // Grew past its tier's ceiling: drop, don't pool (spec §4.A).
            state.active.fetch_sub(1, Ordering::AcqRel);
            return;
        }

        if secure {
            entry.buf.iter_mut().for_each(|b| *b = 0);
        }
        entry.buf.clear();
        state.metrics.resets.fetch_add(1, Ordering::Relaxed);
        state.metrics.puts.fetch_add(1, Ordering::Relaxed);
        state.lock_free().push(entry.buf);
    }

    pub fn metrics(&self, tier: Tier) -> PoolMetricsSnapshot {
        self.tier_state(tier).metrics.snapshot()
    }

    pub fn active_entries(&self, tier: Tier) -> usize {
        self.tier_state(tier).active.load(Ordering::Relaxed)
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new(true)
    }
}

// ════════════════════════════════════════════════════════════════
//  SlicePool — Box<[u8]>, fixed-capacity scratch space
// ════════════════════════════════════════════════════════════════

pub struct PooledSlice {
    buf: Box<[u8]>,
    used: usize,
    origin: Tier,
}

impl PooledSlice {
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.buf
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    pub fn set_used(&mut self, used: usize) {
        self.used = used.min(self.buf.len());
    }
}

pub struct SlicePool {
    small: TierState<Box<[u8]>>,
    medium: TierState<Box<[u8]>>,
    large: TierState<Box<[u8]>>,
    secure_by_default: bool,
}

impl SlicePool {
    pub fn new(secure_by_default: bool) -> Self {
        Self {
            small: TierState::new(SMALL_MAX, DEFAULT_TIER_CAPACITY),
            medium: TierState::new(MEDIUM_MAX, DEFAULT_TIER_CAPACITY),
            large: TierState::new(LARGE_MAX, DEFAULT_TIER_CAPACITY),
            secure_by_default,
        }
    }

    fn tier_state(&self, tier: Tier) -> &TierState<Box<[u8]>> {
        match tier {
            Tier::Small => &self.small,
            Tier::Medium => &self.medium,
            Tier::Large => &self.large,
        }
    }

    pub fn acquire(&self, expected_size: usize) -> Result<PooledSlice, ResourceError> {
        let Some(tier) = Tier::for_size(expected_size) else {
            return Err(ResourceError::new("slice", LARGE_MAX, expected_size).with_code(codes::OVER_LIMIT));
        };
        let state = self.tier_state(tier);

        if let Some(buf) = state.lock_free().pop() {
            state.metrics.gets.fetch_add(1, Ordering::Relaxed);
            return Ok(PooledSlice { buf, used: 0, origin: tier });
        }

        let active = state.active.fetch_add(1, Ordering::AcqRel);
        if active >= state.max_entries {
            state.active.fetch_sub(1, Ordering::AcqRel);
            return Err(ResourceError::new("slice", state.max_entries, active + 1));
        }
        state.metrics.news.fetch_add(1, Ordering::Relaxed);
        state.metrics.gets.fetch_add(1, Ordering::Relaxed);
        Ok(PooledSlice { buf: vec![0u8; tier.max_size()].into_boxed_slice(), used: 0, origin: tier })
    }

    pub fn release(&self, entry: Option<PooledSlice>) {
        self.release_with(entry, self.secure_by_default)
    }

    pub fn release_secure(&self, entry: Option<PooledSlice>) {
        self.release_with(entry, true)
    }

    fn release_with(&self, entry: Option<PooledSlice>, secure: bool) {
        let Some(mut entry) = entry else { return };
        let state = self.tier_state(entry.origin);
        if secure {
            entry.buf[..entry.used].iter_mut().for_each(|b| *b = 0);
        }
        entry.used = 0;
        state.metrics.resets.fetch_add(1, Ordering::Relaxed);
        state.metrics.puts.fetch_add(1, Ordering::Relaxed);
        state.lock_free().push(entry.buf);
    }

    pub fn metrics(&self, tier: Tier) -> PoolMetricsSnapshot {
        self.tier_state(tier).metrics.snapshot()
    }
}

impl Default for SlicePool {
    fn default() -> Self {
        Self::new(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tier_selection_picks_smallest_fit() {
        assert_eq!(Tier::for_size(100), Some(Tier::Small));
        assert_eq!(Tier::for_size(SMALL_MAX + 1), Some(Tier::Medium));
        assert_eq!(Tier::for_size(MEDIUM_MAX + 1), Some(Tier::Large));
        assert_eq!(Tier::for_size(LARGE_MAX + 1), None);
    }

    #[test]
    fn pool_conservation_balanced_acquire_release() {
        let pool = BufferPool::new(true);
        for _ in 0..64 {
            let buf = pool.acquire(100).unwrap();
            pool.release(Some(buf));
        }
        assert_eq!(pool.active_entries(Tier::Small), 1);
        let m = pool.metrics(Tier::Small);
        assert_eq!(m.gets, 64);
        assert_eq!(m.puts, 64);
    }

    #[test]
    fn secure_release_zeroes_used_prefix() {
        let pool = BufferPool::with_tier_capacity(true, 1, 1, 1);
        let mut buf = pool.acquire(64).unwrap();
        buf.extend_from_slice(&[0xAA; 32]);
        pool.release_secure(Some(buf));

        // Same tier, capacity 1 → this must be the exact Vec's underlying storage recycled.
        let mut buf2 = pool.acquire(64).unwrap();
        unsafe { buf2.set_len(32) };
        assert!(buf2.iter().all(|&b| b == 0), "prior logical content must have been zeroed on release");
    }

    #[test]
    fn exhaustion_surfaces_resource_error() {
        let pool = BufferPool::with_tier_capacity(true, 1, 1, 1);
        let first = pool.acquire(100).unwrap();
        let err = pool.acquire(100).unwrap_err();
        assert_eq!(err.resource, "buffer");
        pool.release(Some(first));
        assert!(pool.acquire(100).is_ok());
    }

    #[test]
    fn acquire_safe_falls_back_when_saturated() {
        let pool = BufferPool::with_tier_capacity(true, 1, 1, 1);
        let _first = pool.acquire(100).unwrap();
        let second = pool.acquire_safe(100).unwrap();
        assert_eq!(second.capacity(), 100);
    }

    #[test]
    fn over_ceiling_request_fails_even_with_safe_acquire() {
        let pool = BufferPool::new(true);
        let err = pool.acquire_safe(ABSOLUTE_CEILING + 1).unwrap_err();
        assert_eq!(err.code, codes::OVER_LIMIT);
    }

    #[test]
    fn release_none_is_a_no_op() {
        let pool = BufferPool::new(true);
        pool.release(None);
        assert_eq!(pool.active_entries(Tier::Small), 0);
    }
}
