#![no_std]
#![forbid(unsafe_code)]

//! # HDX Core
//!
//! Value types and seams shared by every layer of the HDX firmware core:
//! events and signals, priority levels, active-object handles, the
//! [`ActiveObject`] trait implemented by the state machine engines, and the
//! [`EventSink`]/[`Callback`] contract drivers use to talk to their consumers.

#[cfg(feature = "std")]
extern crate std;

use core::fmt;

pub mod active;
pub mod event;
pub mod priority;

pub use active::*;
pub use event::*;
pub use priority::*;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Fatal kernel conditions.
///
/// These only arise from a mis-sized configuration or a wiring mistake, never
/// from normal traffic. The kernel latches the first one it sees and reports it
/// from its run loop instead of halting the processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// A post found the target mailbox full
    MailboxOverflow(AoId),
    /// An event was addressed to a handle that was never registered
    UnknownTarget(AoId),
    /// The scheduler marked a mailbox pending but could not read from it
    MailboxUnreadable(AoId),
    /// The scheduler tried to run an object that is already executing
    Reentered(AoId),
}

impl Fault {
    /// Handle of the active object involved
    pub const fn target(self) -> AoId {
        match self {
            Fault::MailboxOverflow(id)
            | Fault::UnknownTarget(id)
            | Fault::MailboxUnreadable(id)
            | Fault::Reentered(id) => id,
        }
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fault::MailboxOverflow(id) => write!(f, "mailbox of {} overflowed", id),
            Fault::UnknownTarget(id) => write!(f, "{} is not registered", id),
            Fault::MailboxUnreadable(id) => write!(f, "mailbox of {} pending but empty", id),
            Fault::Reentered(id) => write!(f, "{} dispatched while already running", id),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Fault {}

#[cfg(feature = "defmt")]
impl defmt::Format for Fault {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            Fault::MailboxOverflow(id) => defmt::write!(fmt, "MailboxOverflow({})", id),
            Fault::UnknownTarget(id) => defmt::write!(fmt, "UnknownTarget({})", id),
            Fault::MailboxUnreadable(id) => defmt::write!(fmt, "MailboxUnreadable({})", id),
            Fault::Reentered(id) => defmt::write!(fmt, "Reentered({})", id),
        }
    }
}
