//! Incremental snapshot diffing.
//!
//! The source re-reports the whole comment list on every poll and offers no
//! cursor, so "what's new" is recovered positionally: find the last item of
//! the previous snapshot inside the current one and take everything after
//! it. A single anchor search, not a set difference — order matters and
//! equal-valued items inside the new suffix must survive.

#[derive(Debug)]
pub struct DiffOutcome<'a, T> {
    /// Items of `current` considered new, in source order.
    pub new_items:      &'a [T],
    /// The previous snapshot's last item was not found in `current` — the
    /// source truncated, reordered, or rewrote history. `new_items` is then
    /// the whole of `current` and the caller should expect duplicates.
    pub anchor_missing: bool,
}

/// Diff `current` against `previous`.
///
/// Empty `previous` means everything is new. The anchor is matched by value
/// equality at its first occurrence, scanning forward.
pub fn diff<'a, T: PartialEq>(previous: &[T], current: &'a [T]) -> DiffOutcome<'a, T> {
    let Some(anchor) = previous.last() else {
        return DiffOutcome { new_items: current, anchor_missing: false };
    };
    match current.iter().position(|item| item == anchor) {
        Some(pos) => DiffOutcome { new_items: &current[pos + 1..], anchor_missing: false },
        None => DiffOutcome { new_items: current, anchor_missing: true },
    }
}
