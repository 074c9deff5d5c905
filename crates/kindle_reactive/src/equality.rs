//! Write-skipping equality.

/// Returns `true` if writing `next` over `current` would be a no-op.
///
/// Plain `PartialEq`, except that two values which are both unequal to
/// themselves (NaN) also count as the same value, so repeated NaN writes do
/// not re-notify subscribers.
#[inline]
#[allow(clippy::eq_op)]
pub fn same_value<T: PartialEq>(current: &T, next: &T) -> bool {
    current == next || (current != current && next != next)
}
