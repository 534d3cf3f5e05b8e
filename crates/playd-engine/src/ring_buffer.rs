//! Bounded single-producer/single-consumer queue between the decode pump and
//! the output callback.
//!
//! The control thread writes decoded bytes; the audio callback reads them.
//! Both sides take a short critical section around a cursor update and one
//! `copy_from_slice` per contiguous segment, so neither side ever waits on the
//! other for longer than a memcpy. `clear` takes the same lock, which means a
//! clear either fully precedes or fully follows any in-progress read.
//!
//! Nothing here blocks on a condition, grows, or allocates after construction.

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Fixed-capacity circular buffer of `T`.
pub struct RingBuffer<T: Copy + Default> {
    capacity: usize,
    inner: Mutex<RingInner<T>>,
}

struct RingInner<T> {
    slots: Box<[T]>,
    /// Index of the next element to read.
    read: usize,
    /// Number of readable elements; `0 <= occupied <= slots.len()`.
    occupied: usize,
}

impl<T: Copy + Default> RingBuffer<T> {
    /// Create a buffer holding at most `capacity` elements (at least one).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            inner: Mutex::new(RingInner {
                slots: vec![T::default(); capacity].into_boxed_slice(),
                read: 0,
                occupied: 0,
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Elements currently waiting to be read (best-effort snapshot).
    pub fn occupied(&self) -> usize {
        self.lock().occupied
    }

    /// Elements that a `write` could accept right now (best-effort snapshot).
    pub fn free(&self) -> usize {
        self.capacity - self.lock().occupied
    }

    /// Append as much of `src` as fits; returns the number of elements accepted.
    pub fn write(&self, src: &[T]) -> usize {
        let mut g = self.lock();
        let count = src.len().min(self.capacity - g.occupied);
        if count == 0 {
            return 0;
        }

        let start = (g.read + g.occupied) % self.capacity;
        let first = count.min(self.capacity - start);
        g.slots[start..start + first].copy_from_slice(&src[..first]);
        if first < count {
            g.slots[..count - first].copy_from_slice(&src[first..count]);
        }
        g.occupied += count;
        count
    }

    /// Fill the front of `dst` with buffered elements; returns how many were copied.
    pub fn read(&self, dst: &mut [T]) -> usize {
        self.read_and(dst, |count| count)
    }

    /// [`RingBuffer::read`], then `after(count)` before the lock is released.
    ///
    /// Bookkeeping done in `after` is ordered against [`RingBuffer::clear_and`].
    pub fn read_and<R>(&self, dst: &mut [T], after: impl FnOnce(usize) -> R) -> R {
        let mut g = self.lock();
        let count = dst.len().min(g.occupied);
        if count > 0 {
            let start = g.read;
            let first = count.min(self.capacity - start);
            dst[..first].copy_from_slice(&g.slots[start..start + first]);
            if first < count {
                dst[first..count].copy_from_slice(&g.slots[..count - first]);
            }
            g.read = (start + count) % self.capacity;
            g.occupied -= count;
        }
        after(count)
    }

    /// Discard everything buffered.
    pub fn clear(&self) {
        self.clear_and(|| {});
    }

    /// [`RingBuffer::clear`], then `after()` before the lock is released.
    pub fn clear_and(&self, after: impl FnOnce()) {
        let mut g = self.lock();
        g.read = 0;
        g.occupied = 0;
        after();
    }

    fn lock(&self) -> MutexGuard<'_, RingInner<T>> {
        // The guarded data is plain cursors; a panic elsewhere cannot leave it torn.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
