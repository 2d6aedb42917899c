//! Reusable write buffers.
//!
//! `submit_send` copies the caller's bytes into an engine-owned buffer that
//! must stay alive until the final completion drains it. Allocating one per
//! send costs on every call under load, so a fixed pool of vectors is kept
//! and handed out by ownership transfer: acquire takes the vector out of an
//! available slot, release puts it back into the same slot.
//!
//! The pool is sized 2x the ring depth so that concurrent sends plus
//! in-flight completions rarely exhaust it; when they do, acquire falls
//! back to a fresh heap vector that is simply dropped on release.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicBool, Ordering};

/// A write buffer checked out of the pool (or heap-allocated on overflow).
///
/// Owns its bytes exclusively; hand it back with [`BufferPool::release`]
/// once the kernel is done with it.
#[derive(Debug)]
pub struct PooledBuf {
    pub(crate) data: Vec<u8>,
    /// Slot index when the buffer originated in the pool, `None` otherwise.
    slot: Option<usize>,
}

impl PooledBuf {
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn extend_from_slice(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    /// True if this buffer came from a pool slot.
    pub fn is_pooled(&self) -> bool {
        self.slot.is_some()
    }
}

struct PoolSlot {
    available: AtomicBool,
    storage: UnsafeCell<Option<Vec<u8>>>,
}

// Safety: `storage` is accessed only by the thread that won the CAS on
// `available` (acquire side) or by the releasing owner before the
// release-store that republishes the slot. The flag transfers ownership.
unsafe impl Sync for PoolSlot {}

/// Fixed pool of write buffers with per-slot CAS handoff.
pub struct BufferPool {
    slots: Box<[PoolSlot]>,
    default_capacity: usize,
}

impl BufferPool {
    pub fn new(pool_size: usize, default_capacity: usize) -> Self {
        let slots = (0..pool_size)
            .map(|_| PoolSlot {
                available: AtomicBool::new(true),
                storage: UnsafeCell::new(Some(Vec::with_capacity(default_capacity))),
            })
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            slots,
            default_capacity,
        }
    }

    /// Check out a cleared buffer with capacity for at least `needed` bytes.
    ///
    /// Scans for an available slot; if every slot is busy the buffer is a
    /// plain heap allocation outside the pool.
    pub fn acquire(&self, needed: usize) -> PooledBuf {
        for (i, slot) in self.slots.iter().enumerate() {
            if slot
                .available
                .compare_exchange(true, false, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
            {
                // Safety: winning the CAS gives us exclusive slot access
                // until we release-store `available` again.
                let mut data = unsafe { (*slot.storage.get()).take() }
                    .unwrap_or_else(|| Vec::with_capacity(self.default_capacity));
                data.clear();
                if data.capacity() < needed {
                    data.reserve(needed);
                }
                return PooledBuf {
                    data,
                    slot: Some(i),
                };
            }
        }
        PooledBuf {
            data: Vec::with_capacity(needed),
            slot: None,
        }
    }

    /// Return a buffer. Pooled buffers go back to their slot; foreign ones
    /// are dropped.
    pub fn release(&self, buf: PooledBuf) {
        if let Some(i) = buf.slot {
            let slot = &self.slots[i];
            // Safety: the slot was claimed by the acquire that produced this
            // buffer and stays unavailable until the store below.
            unsafe {
                *slot.storage.get() = Some(buf.data);
            }
            slot.available.store(true, Ordering::Release);
        }
    }

    /// Total slot count.
    pub fn pool_size(&self) -> usize {
        self.slots.len()
    }

    /// Currently available slots (diagnostic).
    pub fn available(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| s.available.load(Ordering::Relaxed))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_acquire_clears_and_reserves() {
        let pool = BufferPool::new(2, 16);
        let mut buf = pool.acquire(8);
        assert!(buf.is_pooled());
        assert!(buf.is_empty());
        buf.extend_from_slice(b"hello");
        assert_eq!(buf.bytes(), b"hello");
        pool.release(buf);

        // Re-acquired buffer is cleared again and grows on demand.
        let buf = pool.acquire(64);
        assert!(buf.is_empty());
        assert!(buf.data.capacity() >= 64);
        pool.release(buf);
    }

    #[test]
    fn test_release_returns_same_slot() {
        let pool = BufferPool::new(1, 16);
        let buf = pool.acquire(4);
        assert!(buf.is_pooled());
        assert_eq!(pool.available(), 0);

        let heap = pool.acquire(4);
        assert!(!heap.is_pooled());

        pool.release(buf);
        assert_eq!(pool.available(), 1);

        // Dropping the heap buffer does not disturb the pool.
        pool.release(heap);
        assert_eq!(pool.available(), 1);
    }

    #[test]
    fn test_exhaustion_falls_back_to_heap() {
        let pool = BufferPool::new(2, 16);
        let a = pool.acquire(1);
        let b = pool.acquire(1);
        let c = pool.acquire(1);
        assert!(a.is_pooled() && b.is_pooled());
        assert!(!c.is_pooled());
        pool.release(a);
        pool.release(b);
        pool.release(c);
        assert_eq!(pool.available(), 2);
    }

    #[test]
    fn test_concurrent_acquire_release() {
        let pool = Arc::new(BufferPool::new(4, 64));
        let mut handles = vec![];
        for t in 0..8u8 {
            let pool = Arc::clone(&pool);
            handles.push(thread::spawn(move || {
                for i in 0..500usize {
                    let mut buf = pool.acquire(32);
                    assert!(buf.is_empty());
                    buf.extend_from_slice(&[t; 16]);
                    assert_eq!(buf.bytes(), &[t; 16]);
                    if i % 3 == 0 {
                        thread::yield_now();
                    }
                    pool.release(buf);
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(pool.available(), 4);
    }
}
