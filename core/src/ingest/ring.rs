use crossbeam::queue::ArrayQueue;
use std::sync::atomic::{AtomicU64, Ordering};

/// Bounded hand-off between one channel producer and the synchronizer.
///
/// Items move by ownership: the producer hands over a filled object and gets
/// back a spare one to fill next, the consumer returns drained objects with
/// `recycle`. Once the spares are seeded no allocation happens per pulse.
/// A write into a full ring displaces the oldest unread item, which is
/// counted as an overrun and handed back to the producer for reuse.
pub struct RecyclingRing<T> {
    filled: ArrayQueue<T>,
    spares: ArrayQueue<T>,
    overruns: AtomicU64,
    written: AtomicU64,
}

impl<T: Default> RecyclingRing<T> {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let spares = ArrayQueue::new(capacity + 1);
        for _ in 0..capacity {
            let _ = spares.push(T::default());
        }
        Self {
            filled: ArrayQueue::new(capacity),
            spares,
            overruns: AtomicU64::new(0),
            written: AtomicU64::new(0),
        }
    }

    /// Hands `item` to the consumer and returns an object for the next write.
    pub fn write(&self, item: T) -> T {
        self.written.fetch_add(1, Ordering::Relaxed);
        if let Some(displaced) = self.filled.force_push(item) {
            self.overruns.fetch_add(1, Ordering::Relaxed);
            return displaced;
        }
        self.spares.pop().unwrap_or_default()
    }

    /// Takes the oldest unread item, if any.
    pub fn pop(&self) -> Option<T> {
        self.filled.pop()
    }

    /// Returns a drained object so the producer can fill it again.
    pub fn recycle(&self, item: T) {
        // With the spare pool full the object is simply dropped.
        let _ = self.spares.push(item);
    }

    pub fn len(&self) -> usize {
        self.filled.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filled.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.filled.capacity()
    }

    pub fn overruns(&self) -> u64 {
        self.overruns.load(Ordering::Relaxed)
    }

    pub fn written(&self) -> u64 {
        self.written.load(Ordering::Relaxed)
    }
}
