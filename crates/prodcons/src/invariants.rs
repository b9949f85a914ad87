//! Debug assertion macros for buffer invariants.
//!
//! Only active in debug builds (`#[cfg(debug_assertions)]` via
//! `debug_assert!`), so release builds pay nothing. Every macro is evaluated
//! while the engine lock is held.

// =============================================================================
// INV-CAP: Bounded Count
// =============================================================================

/// Assert that the occupied count never exceeds capacity.
///
/// **Invariant**: `0 ≤ count ≤ capacity`
///
/// Used in: `Store::push_back()`, `State::admit()`
macro_rules! debug_assert_bounded_count {
    ($count:expr, $capacity:expr) => {
        debug_assert!(
            $count <= $capacity,
            "INV-CAP violated: count {} exceeds capacity {}",
            $count,
            $capacity
        )
    };
}

// =============================================================================
// INV-ADM: Monotonic Admission Counter
// =============================================================================

/// Assert that a counter only increases.
///
/// **Invariant**: `new ≥ old` for `total_admitted` and `groups_completed`
///
/// Used in: `State::admit()`, `FanoutBuffer::get()`
macro_rules! debug_assert_monotonic {
    ($name:literal, $old:expr, $new:expr) => {
        debug_assert!(
            $new >= $old,
            "INV-ADM violated: {} decreased from {} to {}",
            $name,
            $old,
            $new
        )
    };
}

// =============================================================================
// INV-CLOSE: No Admission After Close
// =============================================================================

/// Assert that nothing is inserted into a closed buffer.
///
/// **Invariant**: `closed ⇒ no new slot`
///
/// Used in: `State::admit()`
macro_rules! debug_assert_open {
    ($closed:expr) => {
        debug_assert!(!$closed, "INV-CLOSE violated: admitting into a closed buffer")
    };
}

// =============================================================================
// INV-GRP: Group Claim Bounds
// =============================================================================

/// Assert that a group is never over-claimed.
///
/// **Invariant**: `0 ≤ taken ≤ required`
///
/// Used in: `FanoutBuffer::get()` after incrementing `taken`
macro_rules! debug_assert_taken_bounded {
    ($taken:expr, $required:expr) => {
        debug_assert!(
            $taken <= $required,
            "INV-GRP violated: taken {} exceeds required {}",
            $taken,
            $required
        )
    };
}

/// Assert that groups complete in insertion order.
///
/// **Invariant**: the removed group's sequence equals `groups_completed`
///
/// Used in: `FanoutBuffer::get()` when the last copy is claimed
macro_rules! debug_assert_group_fifo {
    ($seq:expr, $completed:expr) => {
        debug_assert!(
            $seq == $completed,
            "INV-GRP violated: group {} completed while {} groups were done",
            $seq,
            $completed
        )
    };
}

// =============================================================================
// Re-exports for crate-internal use
// =============================================================================

pub(crate) use debug_assert_bounded_count;
pub(crate) use debug_assert_group_fifo;
pub(crate) use debug_assert_monotonic;
pub(crate) use debug_assert_open;
pub(crate) use debug_assert_taken_bounded;
