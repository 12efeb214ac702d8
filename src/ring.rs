use crate::backoff::Backoff;
use crate::config::Config;
use crate::error::QueueError;
use crate::invariants::{
    debug_assert_bounded_count, debug_assert_cycle_matches, debug_assert_head_not_past_tail,
    debug_assert_monotonic, debug_assert_no_wrap,
};
use crate::mem_resource::{default_resource, MemoryResource};
use crate::metrics::{Metrics, MetricsSnapshot};
use crate::raw_array::RawArray;
use crossbeam_utils::CachePadded;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

// =============================================================================
// SLOT ENCODING
// =============================================================================
//
// Each slot is a single 64-bit word: the high 32 bits are a cycle tag, the low
// 32 bits are the stored value. `VALUE_EMPTY` is a value no caller may enqueue
// (this ring only ever stores small non-negative indices, matching its use as
// the free/allocated index ring underneath the scalable queue); a slot reading
// `(c, VALUE_EMPTY)` means "vacated, ready for cycle c's writer".
//
// The slot array is double the requested capacity (`N = 2C`) so a producer's
// cycle for a given physical slot is always one generation ahead of the last
// consumer cycle that could have touched it, which is what makes the ABA-style
// CAS races below safe without hazard pointers: a stale CAS from a slow
// producer can only ever target a cycle that has already been superseded.

const VALUE_EMPTY: u32 = u32::MAX;

#[inline]
fn encode(cycle: u64, value: u32) -> u64 {
    (cycle << 32) | u64::from(value)
}

#[inline]
fn decode(slot: u64) -> (u64, u32) {
    (slot >> 32, (slot & 0xFFFF_FFFF) as u32)
}

/// A bounded MPMC queue of `u32` indices, backed by three monotone 64-bit counters
/// and a cycle-tagged slot array. The portable fallback referenced by the scalable
/// circular queue for its free-index and allocated-index rings.
#[repr(C)]
pub struct Ring {
    head: CachePadded<AtomicU64>,
    tail: CachePadded<AtomicU64>,
    threshold: CachePadded<AtomicI64>,
    slots: RawArray<AtomicU64>,
    config: Config,
    metrics: Metrics,
}

unsafe impl Send for Ring {}
unsafe impl Sync for Ring {}

impl Ring {
    /// Creates an empty ring with the capacity from `config` (already rounded to a
    /// power of two), backed by the default (global-allocator) memory resource.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self::with_resource(config, default_resource())
    }

    /// As [`Ring::new`], but the slot array is allocated through `resource` instead
    /// of the default global-allocator resource.
    #[must_use]
    pub fn with_resource(config: Config, resource: Arc<dyn MemoryResource>) -> Self {
        let n = config.capacity() << 1;
        let slots = RawArray::new(n, resource, |_| AtomicU64::new(encode(0, VALUE_EMPTY)));
        Self {
            head: CachePadded::new(AtomicU64::new(0)),
            tail: CachePadded::new(AtomicU64::new(0)),
            threshold: CachePadded::new(AtomicI64::new(-1)),
            slots,
            metrics: Metrics::new(config.enable_metrics),
            config,
        }
    }

    /// Capacity `C`; at most this many items may be live at once.
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.config.capacity()
    }

    /// Current occupied count. Racy under concurrent access — a snapshot, not a
    /// linearised read.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        let tail = self.tail.load(Ordering::Acquire);
        let head = self.head.load(Ordering::Acquire);
        tail.saturating_sub(head) as usize
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A snapshot of this ring's enqueue/dequeue/overflow counters. All zero if
    /// `config.enable_metrics` was `false` at construction.
    #[inline]
    #[must_use]
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    #[inline]
    fn slot_count(&self) -> u64 {
        (self.config.capacity() << 1) as u64
    }

    #[inline]
    fn locate(&self, seq: u64) -> (usize, u64) {
        let n = self.slot_count();
        ((seq % n) as usize, seq / n)
    }

    /// Publishes `value` into the queue. Fails with `Overflow` if `tail` has lapped
    /// `head` by the full capacity; state is left unmodified in that case.
    pub fn enqueue(&self, value: u32) -> Result<(), QueueError> {
        assert!(value != VALUE_EMPTY, "value {VALUE_EMPTY} is reserved as the empty sentinel");
        loop {
            let tail = self.tail.load(Ordering::Relaxed);
            let head = self.head.load(Ordering::Acquire);
            debug_assert_head_not_past_tail!(head, tail);
            if tail.wrapping_sub(head) >= self.capacity() as u64 {
                return Err(QueueError::Overflow);
            }

            let new_tail = tail.wrapping_add(1);
            if self
                .tail
                .compare_exchange_weak(tail, new_tail, Ordering::Relaxed, Ordering::Relaxed)
                .is_err()
            {
                continue;
            }
            debug_assert_monotonic!("tail", tail, new_tail);
            debug_assert_no_wrap!("tail", tail, new_tail);

            self.publish(tail, value);
            if self.threshold.load(Ordering::Relaxed) < 0 {
                self.threshold.store((self.capacity() / 2) as i64, Ordering::Relaxed);
            }
            self.metrics.record_enqueue();
            return Ok(());
        }
    }

    /// Cooperatively writes `value` at producer sequence `seq`, retrying through any
    /// contending slot-bump until the slot is ours.
    fn publish(&self, seq: u64, value: u32) {
        let (idx, desired_cycle) = self.locate(seq);
        let mut backoff = Backoff::new();
        loop {
            let current = self.slots[idx].load(Ordering::Acquire);
            let (cur_cycle, cur_value) = decode(current);

            if cur_cycle == desired_cycle && cur_value == VALUE_EMPTY {
                let new_slot = encode(desired_cycle, value);
                if self.slots[idx]
                    .compare_exchange_weak(current, new_slot, Ordering::AcqRel, Ordering::Relaxed)
                    .is_ok()
                {
                    debug_assert_cycle_matches!(desired_cycle, seq / self.slot_count());
                    return;
                }
            } else if cur_cycle < desired_cycle {
                let bumped = encode(desired_cycle, cur_value);
                let _ = self.slots[idx].compare_exchange_weak(
                    current,
                    bumped,
                    Ordering::AcqRel,
                    Ordering::Relaxed,
                );
            }
            backoff.snooze();
        }
    }

    /// Removes and returns the next value in FIFO order, or `None` if the queue is
    /// currently empty.
    pub fn dequeue(&self) -> Option<u32> {
        loop {
            let head = self.head.load(Ordering::Relaxed);
            let tail = self.tail.load(Ordering::Acquire);
            debug_assert_head_not_past_tail!(head, tail);
            if head == tail {
                return None;
            }

            let new_head = head.wrapping_add(1);
            if self
                .head
                .compare_exchange_weak(head, new_head, Ordering::Relaxed, Ordering::Relaxed)
                .is_err()
            {
                continue;
            }
            debug_assert_monotonic!("head", head, new_head);

            match self.claim(head) {
                Some(value) => {
                    let prev = self.threshold.fetch_sub(1, Ordering::Relaxed);
                    let _ = prev;
                    self.metrics.record_dequeue();
                    return Some(value);
                }
                None => {
                    // Producer hasn't caught up. If we're confident the queue is
                    // genuinely empty (low watermark tripped and tail hasn't moved
                    // since our claim), undo our claim by rolling head back.
                    if self.threshold.load(Ordering::Relaxed) < 0 {
                        let tail_now = self.tail.load(Ordering::Acquire);
                        if tail_now <= new_head {
                            let _ = self.head.compare_exchange(
                                new_head,
                                head,
                                Ordering::Relaxed,
                                Ordering::Relaxed,
                            );
                            return None;
                        }
                    }
                    // Otherwise a producer is still landing its write for this
                    // sequence; spin briefly and retry at the same claimed `head`.
                    self.wait_for_publish(head);
                }
            }
        }
    }

    /// Spins waiting for the producer writing sequence `seq` to land, then retries
    /// the claim from `dequeue`.
    fn wait_for_publish(&self, seq: u64) {
        let (idx, desired_cycle) = self.locate(seq);
        let mut backoff = Backoff::new();
        loop {
            let (cur_cycle, cur_value) = decode(self.slots[idx].load(Ordering::Acquire));
            if cur_cycle == desired_cycle && cur_value != VALUE_EMPTY {
                return;
            }
            if backoff.is_completed() {
                return;
            }
            backoff.snooze();
        }
    }

    /// Attempts to extract the value published at consumer sequence `seq`, vacating
    /// the slot for the next generation on success.
    fn claim(&self, seq: u64) -> Option<u32> {
        let (idx, desired_cycle) = self.locate(seq);
        let current = self.slots[idx].load(Ordering::Acquire);
        let (cur_cycle, cur_value) = decode(current);
        if cur_cycle != desired_cycle || cur_value == VALUE_EMPTY {
            return None;
        }
        let vacated = encode(desired_cycle.wrapping_add(1), VALUE_EMPTY);
        if self.slots[idx].compare_exchange(current, vacated, Ordering::AcqRel, Ordering::Relaxed).is_ok() {
            debug_assert_bounded_count!(
                self.tail.load(Ordering::Relaxed).wrapping_sub(self.head.load(Ordering::Relaxed)),
                self.capacity() as u64
            );
            Some(cur_value)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enqueue_dequeue_fifo() {
        let ring = Ring::new(Config::new(8, 1, false));
        for i in 0..8 {
            ring.enqueue(i).unwrap();
        }
        for i in 0..8 {
            assert_eq!(ring.dequeue(), Some(i));
        }
        assert_eq!(ring.dequeue(), None);
    }

    #[test]
    fn test_overflow_when_full() {
        let ring = Ring::new(Config::new(4, 1, false));
        for i in 0..4 {
            ring.enqueue(i).unwrap();
        }
        assert!(matches!(ring.enqueue(99), Err(QueueError::Overflow)));
        assert_eq!(ring.dequeue(), Some(0));
        ring.enqueue(99).unwrap();
    }

    #[test]
    fn test_empty_dequeue_returns_none() {
        let ring = Ring::new(Config::new(4, 1, false));
        assert_eq!(ring.dequeue(), None);
    }

    #[test]
    fn test_wrap_around_reuses_slots() {
        let ring = Ring::new(Config::new(4, 1, false));
        for round in 0..20u32 {
            ring.enqueue(round).unwrap();
            assert_eq!(ring.dequeue(), Some(round));
        }
    }

    #[test]
    fn test_concurrent_producers_consumers_conserve_values() {
        use std::collections::HashSet;
        use std::sync::Arc;
        use std::thread;

        let ring = Arc::new(Ring::new(Config::new(64, 1, false)));
        const PER_PRODUCER: u32 = 200;
        const PRODUCERS: u32 = 8;

        let producers: Vec<_> = (0..PRODUCERS)
            .map(|p| {
                let ring = Arc::clone(&ring);
                thread::spawn(move || {
                    for i in 0..PER_PRODUCER {
                        let value = p * PER_PRODUCER + i;
                        loop {
                            if ring.enqueue(value).is_ok() {
                                break;
                            }
                            thread::yield_now();
                        }
                    }
                })
            })
            .collect();

        let total = (PRODUCERS * PER_PRODUCER) as usize;
        let ring_c = Arc::clone(&ring);
        let consumer = thread::spawn(move || {
            let mut seen = HashSet::with_capacity(total);
            while seen.len() < total {
                if let Some(v) = ring_c.dequeue() {
                    assert!(seen.insert(v), "value {v} observed twice");
                } else {
                    thread::yield_now();
                }
            }
            seen
        });

        for p in producers {
            p.join().unwrap();
        }
        let seen = consumer.join().unwrap();
        assert_eq!(seen.len(), total);
    }
}
