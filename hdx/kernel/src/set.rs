//! Small bitset of member slots within one priority level

/// Members a single priority level can hold
pub const SET_CAPACITY: usize = 56;

const MASK: u64 = (1 << SET_CAPACITY) - 1;

/// Set of up to 56 member indices, iterated in ascending order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Set56(u64);

impl Set56 {
    pub const EMPTY: Set56 = Set56(0);

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn insert(&mut self, n: usize) {
        if n < SET_CAPACITY {
            self.0 |= 1 << n;
        }
    }

    pub fn remove(&mut self, n: usize) {
        if n < SET_CAPACITY {
            self.0 &= !(1 << n);
        }
    }

    pub const fn contains(self, n: usize) -> bool {
        n < SET_CAPACITY && self.0 & (1 << n) != 0
    }

    /// Lowest member
    pub fn first(self) -> Option<usize> {
        if self.0 & MASK == 0 {
            None
        } else {
            Some(self.0.trailing_zeros() as usize)
        }
    }

    pub fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn iter(self) -> impl Iterator<Item = usize> {
        let mut rest = self;
        core::iter::from_fn(move || {
            let n = rest.first()?;
            rest.remove(n);
            Some(n)
        })
    }
}
