//! Debug assertion macros for the core's quantified runtime invariants.
//!
//! These macros provide runtime checks for the core's quantified invariants. They are
//! only active in debug builds (`#[cfg(debug_assertions)]`), so there is zero overhead
//! in release builds.
//!
//! Used by `ring.rs`, `scalable_queue.rs`, `bitset.rs`, and `thread_manager.rs`.

// =============================================================================
// INV-SEQ-01: Bounded Count
// =============================================================================

/// Assert that a ring's occupied count does not exceed its capacity.
///
/// **Invariant**: `0 ≤ (tail - head) ≤ capacity`
macro_rules! debug_assert_bounded_count {
    ($count:expr, $capacity:expr) => {
        debug_assert!(
            $count <= $capacity,
            "INV-SEQ-01 violated: count {} exceeds capacity {}",
            $count,
            $capacity
        )
    };
}

/// Assert that head never advances past tail.
///
/// **Invariant**: `head ≤ tail` at every linearisation point.
macro_rules! debug_assert_head_not_past_tail {
    ($head:expr, $tail:expr) => {
        debug_assert!(
            $head <= $tail,
            "INV-SEQ-01 violated: head {} advanced past tail {}",
            $head,
            $tail
        )
    };
}

// =============================================================================
// INV-SEQ-02: Monotonic Progress
// =============================================================================

/// Assert that a sequence counter only increases.
macro_rules! debug_assert_monotonic {
    ($name:literal, $old:expr, $new:expr) => {
        debug_assert!(
            $new >= $old,
            "INV-SEQ-02 violated: {} decreased from {} to {}",
            $name,
            $old,
            $new
        )
    };
}

// =============================================================================
// INV-SEQ-03: No Wrap-Around (extremely unlikely but detectable)
// =============================================================================

/// Assert that a 64-bit sequence counter has not wrapped.
macro_rules! debug_assert_no_wrap {
    ($name:literal, $old:expr, $new:expr) => {
        debug_assert!(
            $new > $old || $old.wrapping_sub($new) > (1u64 << 32),
            "INV-SEQ-03 potential wrap detected: {} went from {} to {}",
            $name,
            $old,
            $new
        )
    };
}

// =============================================================================
// INV-SLOT-01: Cycle Tag Sanity
// =============================================================================

/// Assert that a claimed slot's cycle tag is consistent with the claiming sequence.
///
/// **Invariant**: a slot published for sequence `seq` is tagged with `seq`'s own
/// generation — this is the basis of the ring's ABA-freedom argument.
macro_rules! debug_assert_cycle_matches {
    ($slot_cycle:expr, $expected_cycle:expr) => {
        debug_assert!(
            $slot_cycle == $expected_cycle,
            "INV-SLOT-01 violated: slot cycle {} does not match expected generation {}",
            $slot_cycle,
            $expected_cycle
        )
    };
}

// =============================================================================
// INV-BITSET-01: Trailing Zero Invariant
// =============================================================================

/// Assert that bits beyond the logical length `n` inside the last block are zero.
macro_rules! debug_assert_trailing_zero {
    ($blocks:expr, $n:expr) => {
        debug_assert!(
            $crate::bitset::trailing_bits_are_zero($blocks, $n),
            "INV-BITSET-01 violated: trailing bits past n={} are not zero",
            $n
        )
    };
}

// =============================================================================
// INV-RANGE-01: Thread-range Partition
// =============================================================================

/// Assert that a computed sub-range lies within the parent range `[0, len)`.
macro_rules! debug_assert_partition_bounds {
    ($start:expr, $end:expr, $len:expr) => {
        debug_assert!(
            $start <= $end && $end <= $len,
            "INV-RANGE-01 violated: sub-range [{}, {}) escapes parent [0, {})",
            $start,
            $end,
            $len
        )
    };
}

// =============================================================================
// INV-TM-01: Worker Identity Bound
// =============================================================================

/// Assert that a worker's thread id lies within `[0, num_workers)`.
macro_rules! debug_assert_thread_id_bound {
    ($id:expr, $num_workers:expr) => {
        debug_assert!(
            $id < $num_workers,
            "INV-TM-01 violated: thread id {} out of bounds for {} workers",
            $id,
            $num_workers
        )
    };
}

// =============================================================================
// Re-exports for crate-internal use
// =============================================================================

pub(crate) use debug_assert_bounded_count;
pub(crate) use debug_assert_cycle_matches;
pub(crate) use debug_assert_head_not_past_tail;
pub(crate) use debug_assert_monotonic;
pub(crate) use debug_assert_no_wrap;
pub(crate) use debug_assert_partition_bounds;
pub(crate) use debug_assert_thread_id_bound;
pub(crate) use debug_assert_trailing_zero;
