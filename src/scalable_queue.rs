//! A bounded MPMC queue of arbitrary values, composed from two [`Ring`]s of indices
//! plus a shared storage array: enqueue claims a free index, writes the value, and
//! publishes the index as allocated; dequeue reverses the process.

use crate::config::Config;
use crate::error::QueueOverflow;
use crate::mem_resource::{default_resource, MemoryResource};
use crate::raw_array::RawArray;
use crate::ring::Ring;
use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::ptr;
use std::sync::Arc;

/// MPMC bounded queue built from a *free-index* ring and an *allocated-index* ring
/// sharing one storage array. Tolerates move-only `T`: cells are manipulated via
/// placement writes and explicit drops, never by value-copying the whole array.
pub struct ScalableCircularQueue<T> {
    free_ring: Ring,
    alloc_ring: Ring,
    storage: UnsafeCell<RawArray<MaybeUninit<T>>>,
    capacity: usize,
    resource: Arc<dyn MemoryResource>,
}

unsafe impl<T: Send> Send for ScalableCircularQueue<T> {}
unsafe impl<T: Send> Sync for ScalableCircularQueue<T> {}

impl<T> ScalableCircularQueue<T> {
    /// Creates a queue with the capacity from `config`; `free_ring` starts holding
    /// every index `[0, C)`, `alloc_ring` starts empty, `storage` is uninitialised.
    /// Backed by the default (global-allocator) memory resource.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self::with_resource(config, default_resource())
    }

    /// As [`ScalableCircularQueue::new`], but `storage` and both rings are allocated
    /// through `resource` instead of the default global-allocator resource.
    #[must_use]
    pub fn with_resource(config: Config, resource: Arc<dyn MemoryResource>) -> Self {
        let capacity = config.capacity();
        let free_ring = Ring::with_resource(config, Arc::clone(&resource));
        for i in 0..capacity as u32 {
            free_ring.enqueue(i).expect("freshly constructed free ring has room for every index");
        }
        let alloc_ring = Ring::with_resource(config, Arc::clone(&resource));
        let storage = RawArray::new(capacity, Arc::clone(&resource), |_| MaybeUninit::uninit());

        Self { free_ring, alloc_ring, storage: UnsafeCell::new(storage), capacity, resource }
    }

    /// Queue capacity, a power of two.
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of currently-stored values. Racy under concurrent access.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.alloc_ring.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.alloc_ring.is_empty()
    }

    /// Drains and drops every currently-stored value, returning their slots to
    /// `free_ring`. Concurrent enqueuers may race with `clear` and have their value
    /// observed (and then cleared) rather than rejected; callers wanting a clean
    /// cutover should stop enqueuing before calling this.
    pub fn clear(&self) {
        while self.dequeue().is_some() {}
    }

    /// Stores `value`, returning the stable slot index it now occupies. Fails and
    /// hands `value` back if the queue is at capacity.
    pub fn enqueue(&self, value: T) -> Result<usize, QueueOverflow<T>> {
        let k = match self.free_ring.dequeue() {
            Some(k) => k,
            None => return Err(QueueOverflow::new(value)),
        };

        // SAFETY: index `k` was just claimed from `free_ring`, so no other caller
        // holds it; `alloc_ring` will not hand it out again until it's published
        // below and a consumer claims it back out.
        unsafe {
            let slot = (*self.storage.get()).as_mut_ptr().add(k as usize);
            (*slot).write(value);
        }

        self.alloc_ring
            .enqueue(k)
            .expect("alloc_ring has exactly as many free slots as free_ring has claimed indices");
        Ok(k as usize)
    }

    /// Removes and returns the oldest stored value, or `None` if the queue is empty.
    pub fn dequeue(&self) -> Option<T> {
        let k = self.alloc_ring.dequeue()?;

        // SAFETY: index `k` was published by a prior `enqueue` and has not been
        // claimed by any other dequeue (alloc_ring hands each index out once).
        let value = unsafe {
            let slot = (*self.storage.get()).as_mut_ptr().add(k as usize);
            (*slot).assume_init_read()
        };

        self.free_ring.enqueue(k).expect("free_ring has exactly as many free slots as were just vacated");
        Some(value)
    }

    /// Resizes the queue, refilling `free_ring` with the new index range. Only
    /// legal while the queue is empty; the caller is responsible for ensuring no
    /// concurrent enqueue/dequeue is in flight.
    ///
    /// # Panics
    ///
    /// Panics if the queue is not currently empty.
    pub fn set_capacity(&mut self, new_capacity: usize) {
        assert!(self.is_empty(), "set_capacity is only legal on an empty queue");
        let config = Config::new(new_capacity, 1, false);
        let resource = Arc::clone(&self.resource);
        *self = Self::with_resource(config, resource);
    }
}

impl<T> Drop for ScalableCircularQueue<T> {
    fn drop(&mut self) {
        // Any index still sitting in alloc_ring holds a value that was never
        // dequeued; MaybeUninit won't drop it for us, and `RawArray`'s own `Drop`
        // only releases the backing memory (see its doc comment), so this is the
        // only place those values are ever reclaimed.
        while let Some(k) = self.alloc_ring.dequeue() {
            unsafe {
                let slot = (*self.storage.get()).as_mut_ptr().add(k as usize);
                ptr::drop_in_place((*slot).as_mut_ptr());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enqueue_returns_stable_index() {
        let q: ScalableCircularQueue<u64> = ScalableCircularQueue::new(Config::new(4, 1, false));
        let k0 = q.enqueue(100).unwrap();
        let k1 = q.enqueue(200).unwrap();
        assert_ne!(k0, k1);
    }

    #[test]
    fn test_fifo_roundtrip() {
        let q: ScalableCircularQueue<String> = ScalableCircularQueue::new(Config::new(4, 1, false));
        q.enqueue("a".to_string()).unwrap();
        q.enqueue("b".to_string()).unwrap();
        assert_eq!(q.dequeue(), Some("a".to_string()));
        assert_eq!(q.dequeue(), Some("b".to_string()));
        assert_eq!(q.dequeue(), None);
    }

    #[test]
    fn test_overflow_returns_value() {
        let q: ScalableCircularQueue<u64> = ScalableCircularQueue::new(Config::new(2, 1, false));
        q.enqueue(1).unwrap();
        q.enqueue(2).unwrap();
        let err = q.enqueue(3).unwrap_err();
        assert_eq!(err.into_value(), 3);
    }

    #[test]
    fn test_drop_runs_destructors_for_unconsumed_values() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        struct DropCounter(Arc<AtomicUsize>);
        impl Drop for DropCounter {
            fn drop(&mut self) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let counter = Arc::new(AtomicUsize::new(0));
        {
            let q: ScalableCircularQueue<DropCounter> = ScalableCircularQueue::new(Config::new(4, 1, false));
            q.enqueue(DropCounter(Arc::clone(&counter))).unwrap();
            q.enqueue(DropCounter(Arc::clone(&counter))).unwrap();
            let _ = q.dequeue();
        }
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_move_only_value_type() {
        let q: ScalableCircularQueue<Box<u64>> = ScalableCircularQueue::new(Config::new(4, 1, false));
        q.enqueue(Box::new(7)).unwrap();
        assert_eq!(q.dequeue(), Some(Box::new(7)));
    }

    #[test]
    fn test_with_explicit_resource() {
        use crate::mem_resource::GlobalMemoryResource;
        use std::sync::Arc;

        let q: ScalableCircularQueue<u64> =
            ScalableCircularQueue::with_resource(Config::new(4, 1, false), Arc::new(GlobalMemoryResource));
        q.enqueue(9).unwrap();
        assert_eq!(q.dequeue(), Some(9));
    }

    #[test]
    fn test_clear_drains_and_frees_slots() {
        let q: ScalableCircularQueue<u64> = ScalableCircularQueue::new(Config::new(4, 1, false));
        q.enqueue(1).unwrap();
        q.enqueue(2).unwrap();
        q.clear();
        assert!(q.is_empty());
        for i in 0..4 {
            q.enqueue(i).unwrap();
        }
    }
}
