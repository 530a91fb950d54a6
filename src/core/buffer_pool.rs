//! Recycling buffer provider.
//!
//! Keeps up to `capacity` released buffers and hands them back to later
//! `acquire_buffer` calls that fit. Useful when many engines come and go
//! (list items, thumbnails) with similar dimensions.

use log::trace;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use crate::entities::frame::{PixelBuffer, PixelFormat};
use crate::entities::traits::BufferProvider;

/// Pool hit/miss counters
#[derive(Debug, Default)]
pub struct PoolStats {
    hits: AtomicU64,
    misses: AtomicU64,
}

impl PoolStats {
    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn hit_rate(&self) -> f64 {
        let total = self.hits() + self.misses();
        if total == 0 { 0.0 } else { self.hits() as f64 / total as f64 }
    }
}

/// Bounded pool of RGBA8888 buffers
pub struct BufferPool {
    free: Mutex<Vec<PixelBuffer>>,
    capacity: usize,
    stats: PoolStats,
}

impl BufferPool {
    pub fn new(capacity: usize) -> Self {
        Self {
            free: Mutex::new(Vec::with_capacity(capacity)),
            capacity,
            stats: PoolStats::default(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Buffers currently pooled
    pub fn len(&self) -> usize {
        self.free.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> &PoolStats {
        &self.stats
    }

    /// Drop every pooled buffer
    pub fn clear(&self) {
        self.free.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }
}

impl BufferProvider for BufferPool {
    fn acquire_buffer(&self, min_width: u32, min_height: u32) -> PixelBuffer {
        let reused = {
            let mut free = self.free.lock().unwrap_or_else(|e| e.into_inner());
            // Smallest fitting buffer, so big ones stay available for big requests
            let best = free
                .iter()
                .enumerate()
                .filter(|(_, b)| b.satisfies(min_width, min_height))
                .min_by_key(|(_, b)| b.mem())
                .map(|(i, _)| i);
            best.map(|i| free.swap_remove(i))
        };

        match reused {
            Some(buffer) => {
                self.stats.record_hit();
                trace!("Pool hit: buffer {} for {}x{}", buffer.id(), min_width, min_height);
                buffer
            }
            None => {
                self.stats.record_miss();
                trace!("Pool miss: allocating {}x{}", min_width, min_height);
                PixelBuffer::new(min_width, min_height, PixelFormat::Rgba8888)
            }
        }
    }

    fn release_buffer(&self, buffer: PixelBuffer) {
        if buffer.format() != PixelFormat::Rgba8888 {
            return;
        }
        let mut free = self.free.lock().unwrap_or_else(|e| e.into_inner());
        if free.len() < self.capacity {
            free.push(buffer);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_miss_then_hit() {
        let pool = BufferPool::new(4);
        let a = pool.acquire_buffer(8, 8);
        let id = a.id();
        assert_eq!(pool.stats().misses(), 1);

        pool.release_buffer(a);
        assert_eq!(pool.len(), 1);

        let b = pool.acquire_buffer(4, 4);
        assert_eq!(b.id(), id);
        assert_eq!(pool.stats().hits(), 1);
        assert!(pool.is_empty());
        assert!((pool.stats().hit_rate() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_too_small_not_reused() {
        let pool = BufferPool::new(4);
        pool.release_buffer(PixelBuffer::new(4, 4, PixelFormat::Rgba8888));

        let big = pool.acquire_buffer(16, 4);
        assert!(big.satisfies(16, 4));
        assert_eq!(pool.stats().hits(), 0);
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_prefers_smallest_fit() {
        let pool = BufferPool::new(4);
        let large = PixelBuffer::new(64, 64, PixelFormat::Rgba8888);
        let small = PixelBuffer::new(10, 10, PixelFormat::Rgba8888);
        let small_id = small.id();
        pool.release_buffer(large);
        pool.release_buffer(small);

        assert_eq!(pool.acquire_buffer(8, 8).id(), small_id);
    }

    #[test]
    fn test_capacity_bound() {
        let pool = BufferPool::new(2);
        assert_eq!(pool.capacity(), 2);
        for _ in 0..5 {
            pool.release_buffer(PixelBuffer::new(2, 2, PixelFormat::Rgba8888));
        }
        assert_eq!(pool.len(), 2);

        pool.clear();
        assert!(pool.is_empty());
    }

    #[test]
    fn test_foreign_format_dropped() {
        let pool = BufferPool::new(2);
        pool.release_buffer(PixelBuffer::new(2, 2, PixelFormat::Alpha8));
        assert!(pool.is_empty());
    }
}
