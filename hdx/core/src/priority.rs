//! Priority levels and the pending-level bitmask

use core::fmt;

/// Number of scheduler priority levels
pub const LEVELS: usize = 8;

/// Position of the most significant set bit for every byte value.
///
/// Index 0 is never looked up; it maps to 0.
pub const LOG2_LOOKUP: [u8; 256] = build_log2();

const fn build_log2() -> [u8; 256] {
    let mut table = [0u8; 256];
    let mut i = 2;
    while i < 256 {
        table[i] = table[i / 2] + 1;
        i += 1;
    }
    table
}

/// Priority of an active object. 0 is the highest, `LEVELS - 1` the lowest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Priority(u8);

impl Priority {
    pub const HIGHEST: Priority = Priority(0);
    pub const LOWEST: Priority = Priority(LEVELS as u8 - 1);

    /// Validate a raw priority level
    pub const fn new(level: u8) -> Option<Self> {
        if (level as usize) < LEVELS {
            Some(Priority(level))
        } else {
            None
        }
    }

    pub const fn raw(self) -> u8 {
        self.0
    }

    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// Single-bit mask of this level; higher priorities map to higher bits.
    pub const fn mask(self) -> PrioMask {
        PrioMask(1 << (LEVELS as u8 - self.0 - 1))
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Priority({})", self.0)
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Priority {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "Priority({=u8})", self.0);
    }
}

/// Set of priority levels, one bit per level.
///
/// Bit `LEVELS - 1 - p` represents priority `p`, so numeric comparison of two
/// masks orders them by priority: any mask `>= m << 1` contains a level
/// strictly more urgent than the single level `m`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct PrioMask(u8);

impl PrioMask {
    pub const EMPTY: PrioMask = PrioMask(0);

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn insert(&mut self, priority: Priority) {
        self.0 |= priority.mask().0;
    }

    pub fn remove(&mut self, priority: Priority) {
        self.0 &= !priority.mask().0;
    }

    pub const fn contains(self, priority: Priority) -> bool {
        self.0 & priority.mask().0 != 0
    }

    /// Most urgent level in the set
    pub fn highest(self) -> Option<Priority> {
        if self.0 == 0 {
            None
        } else {
            let bit = LOG2_LOOKUP[self.0 as usize];
            Some(Priority(LEVELS as u8 - 1 - bit))
        }
    }

    /// True if the set holds a level strictly more urgent than every level in
    /// `serviced`.
    pub fn preempts(self, serviced: PrioMask) -> bool {
        self.0 as u16 >= (serviced.0 as u16) << 1 && self.0 > serviced.0
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for PrioMask {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "PrioMask({=u8:b})", self.0);
    }
}
