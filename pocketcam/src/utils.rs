use std::ops::RangeBounds;

pub trait WithinExt {
    fn within(&self, range: impl RangeBounds<Self>) -> bool;
}

impl <T: PartialOrd<T>> WithinExt for T {
    fn within(&self, range: impl RangeBounds<Self>) -> bool {
        range.contains(self)
    }
}

/// Steps `index` by `delta` positions through `len` slots, wrapping at both ends.
pub fn wrap_step(index: usize, delta: isize, len: usize) -> usize {
    if len == 0 {
        return 0;
    }
    (index as isize + delta).rem_euclid(len as isize) as usize
}
