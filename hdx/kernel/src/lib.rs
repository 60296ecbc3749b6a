#![no_std]
#![forbid(unsafe_code)]

//! # HDX Kernel
//!
//! Cooperative, priority-based scheduler for active objects.
//!
//! Every active object owns a bounded [`Mailbox`] and runs at one of eight
//! priority levels (0 is the highest). The [`Kernel`] keeps one pending bit
//! per level and, per level, the set of members with queued events. Its run
//! loop always services the most urgent pending level, one event per member
//! per round, and re-evaluates after every single dispatch.
//!
//! All bookkeeping shared with interrupt handlers lives behind
//! `critical_section::Mutex`; handlers themselves always run outside any
//! critical section.

#[cfg(feature = "std")]
extern crate std;

use core::fmt;

use hdx_core::{AoId, Priority};

pub mod config;
pub mod queue;
pub mod scheduler;
pub mod set;

pub use config::*;
pub use queue::*;
pub use scheduler::*;
pub use set::*;

/// Size of the registration table
pub const MAX_ACTIVE: usize = 64;

/// Errors reported by [`Kernel::register`] and friends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterError {
    /// Priority outside `0..LEVELS`
    InvalidPriority(u8),
    /// No registration slots left
    TableFull,
    /// The priority level already holds the maximum number of members
    LevelFull(Priority),
    /// Mailbox storage is empty
    MissingMailbox,
    /// Mailbox storage exceeds [`MAX_CAPACITY`]
    MailboxTooLarge(usize),
    /// Handle was never reserved
    UnknownHandle(AoId),
    /// Handle is already registered
    AlreadyRegistered(AoId),
}

impl fmt::Display for RegisterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegisterError::InvalidPriority(p) => write!(f, "Invalid priority level {}", p),
            RegisterError::TableFull => write!(f, "Active object table is full"),
            RegisterError::LevelFull(p) => write!(f, "{} has no free member slots", p),
            RegisterError::MissingMailbox => write!(f, "Active object has no mailbox storage"),
            RegisterError::MailboxTooLarge(n) => write!(f, "Mailbox capacity {} too large", n),
            RegisterError::UnknownHandle(id) => write!(f, "{} was never reserved", id),
            RegisterError::AlreadyRegistered(id) => write!(f, "{} is already registered", id),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for RegisterError {}

#[cfg(feature = "defmt")]
impl defmt::Format for RegisterError {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            RegisterError::InvalidPriority(p) => defmt::write!(fmt, "InvalidPriority({=u8})", p),
            RegisterError::TableFull => defmt::write!(fmt, "TableFull"),
            RegisterError::LevelFull(p) => defmt::write!(fmt, "LevelFull({})", p),
            RegisterError::MissingMailbox => defmt::write!(fmt, "MissingMailbox"),
            RegisterError::MailboxTooLarge(n) => defmt::write!(fmt, "MailboxTooLarge({=usize})", n),
            RegisterError::UnknownHandle(id) => defmt::write!(fmt, "UnknownHandle({})", id),
            RegisterError::AlreadyRegistered(id) => defmt::write!(fmt, "AlreadyRegistered({})", id),
        }
    }
}
