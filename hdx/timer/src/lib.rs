#![no_std]
#![forbid(unsafe_code)]

//! # HDX Timer
//!
//! Software timer daemon sharing two hardware countdown timers.
//!
//! Each hardware timer ("bank") carries a fixed number of software timer
//! slots. The bank's counter is always loaded with the shortest remaining time
//! of its active timers; whenever a timer is started or stopped, or the
//! counter expires, the daemon charges the elapsed time to every running
//! timer, fires the callbacks of those that reached zero and reloads the
//! counter. Resolution is one microsecond per tick.
//!
//! ```ignore
//! let timers = TimerDaemon::<_>::new([bank_a, bank_b]);
//! let id = timers.create(1_000, TimerFlags::PERIODIC, Some(Callback::post(&kernel, me)), tick)?;
//! timers.start(id)?;
//! ```

#[cfg(feature = "std")]
extern crate std;

use core::fmt;

pub mod daemon;
pub mod guard;
pub mod hw;
pub mod sim;

pub use daemon::*;
pub use guard::*;
pub use hw::*;

/// Number of hardware timer banks
pub const BANKS: usize = 2;

/// Default slot count per bank
pub const DEFAULT_SLOTS: usize = 10;

/// Handle of a software timer.
///
/// Carries a generation counter so that a handle kept after its timer was
/// killed is rejected instead of silently addressing a reused slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId {
    bank: u8,
    slot: u8,
    generation: u16,
}

impl TimerId {
    pub(crate) const fn new(bank: u8, slot: u8, generation: u16) -> Self {
        Self { bank, slot, generation }
    }

    /// Rebuild a handle from its packed form and generation
    pub const fn from_raw(raw: u16, generation: u16) -> Self {
        Self::new((raw >> 8) as u8, raw as u8, generation)
    }

    pub const fn bank(self) -> usize {
        self.bank as usize
    }

    pub const fn slot(self) -> usize {
        self.slot as usize
    }

    pub const fn generation(self) -> u16 {
        self.generation
    }

    /// Packed `bank << 8 | slot` form, without the generation
    pub const fn raw(self) -> u16 {
        (self.bank as u16) << 8 | self.slot as u16
    }
}

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T{}.{}", self.bank, self.slot)
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for TimerId {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "T{=u8}.{=u8}", self.bank, self.slot);
    }
}

/// Timer behaviour on expiry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TimerFlags(u8);

impl TimerFlags {
    /// Stop after firing once
    pub const SINGLE_SHOT: TimerFlags = TimerFlags(0x00);
    /// Reload the period after firing
    pub const PERIODIC: TimerFlags = TimerFlags(0x01);
    /// Free the slot after a single-shot expiry
    pub const KILL: TimerFlags = TimerFlags(0x02);

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn is_periodic(self) -> bool {
        self.0 & Self::PERIODIC.0 != 0
    }

    pub const fn kills(self) -> bool {
        self.0 & Self::KILL.0 != 0
    }
}

impl core::ops::BitOr for TimerFlags {
    type Output = TimerFlags;

    fn bitor(self, rhs: TimerFlags) -> TimerFlags {
        TimerFlags(self.0 | rhs.0)
    }
}

/// Life cycle of a timer slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TimerState {
    Empty,
    Stopped,
    /// Started, but not yet picked up by the bank's rescheduling pass
    Waiting,
    Running,
}

/// Timer daemon errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerError {
    /// Bank or slot index out of range
    InvalidId,
    /// The slot holds no timer
    EmptySlot,
    /// The timer behind this handle was killed
    Stale,
    /// `start` or `resume` on a timer that is already active
    AlreadyRunning,
    /// `resume` on a timer with no remaining time
    NothingToResume,
    /// A period of zero was requested
    ZeroPeriod,
    /// The period does not fit the hardware counter
    PeriodTooLong(u32),
    /// Every slot of every bank is in use
    NoFreeSlot,
}

impl fmt::Display for TimerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimerError::InvalidId => write!(f, "Invalid timer id"),
            TimerError::EmptySlot => write!(f, "Timer slot is empty"),
            TimerError::Stale => write!(f, "Timer was killed"),
            TimerError::AlreadyRunning => write!(f, "Timer already running"),
            TimerError::NothingToResume => write!(f, "Timer has no remaining time to resume"),
            TimerError::ZeroPeriod => write!(f, "Timer period must not be zero"),
            TimerError::PeriodTooLong(us) => write!(f, "Timer period {}us exceeds the counter", us),
            TimerError::NoFreeSlot => write!(f, "No free timer slot"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for TimerError {}

#[cfg(feature = "defmt")]
impl defmt::Format for TimerError {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            TimerError::InvalidId => defmt::write!(fmt, "InvalidId"),
            TimerError::EmptySlot => defmt::write!(fmt, "EmptySlot"),
            TimerError::Stale => defmt::write!(fmt, "Stale"),
            TimerError::AlreadyRunning => defmt::write!(fmt, "AlreadyRunning"),
            TimerError::NothingToResume => defmt::write!(fmt, "NothingToResume"),
            TimerError::ZeroPeriod => defmt::write!(fmt, "ZeroPeriod"),
            TimerError::PeriodTooLong(us) => defmt::write!(fmt, "PeriodTooLong({=u32})", us),
            TimerError::NoFreeSlot => defmt::write!(fmt, "NoFreeSlot"),
        }
    }
}
