#![no_std]
#![forbid(unsafe_code)]

//! # HDX Com
//!
//! Half-duplex framed serial link on top of HDX active objects.
//!
//! Three active objects share one UART:
//! - [`Receiver`]: reassembles frames from the receive FIFO into a
//!   [`FrameBuffer`], checking preamble, length and CRC
//! - [`Transmitter`]: pushes a prepared buffer out as one frame
//! - [`HalfDuplex`]: sequences send-then-receive, drives the optional line
//!   enable outputs and enforces the response timeout
//!
//! The UART interrupt handler calls [`isr::service`], which turns interrupt
//! causes into events for the receiver and transmitter. Every outcome reaches
//! the application as an event on its [`Callback`](hdx_core::Callback), with a
//! detail word in [`Event::data`](hdx_core::Event) describing the cause.
//!
//! [`HalfDuplexPort`] wires the three objects to a kernel and a timer daemon.

#[cfg(any(test, feature = "std"))]
extern crate std;

use core::fmt;

use hdx_kernel::RegisterError;
use hdx_timer::TimerError;

pub mod config;
pub mod crc;
pub mod frame;
pub mod hx;
pub mod isr;
pub mod port;
pub mod rx;
pub mod signals;
pub mod sim;
pub mod tx;
pub mod uart;

pub use config::*;
pub use crc::{crc16, Crc16};
pub use frame::*;
pub use hx::*;
pub use port::*;
pub use rx::*;
pub use tx::*;
pub use uart::*;

#[cfg(test)]
mod tests;

/// Type tag reported by the kernel for receivers
pub const RX_TAG: u8 = 0x10;
/// Type tag reported by the kernel for transmitters
pub const TX_TAG: u8 = 0x11;
/// Type tag reported by the kernel for half-duplex orchestrators
pub const HX_TAG: u8 = 0x12;

/// Frame encoding and buffer errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    /// Payload exceeds the buffer or the length byte
    TooLong(usize),
    /// Output slice cannot hold the encoded frame of this size
    BufferTooSmall(usize),
    /// First byte is not the preamble
    Preamble(u8),
    /// Frame ends before its declared length
    Truncated,
    /// CRC check failed
    Crc,
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameError::TooLong(n) => write!(f, "Payload of {} bytes too long", n),
            FrameError::BufferTooSmall(n) => write!(f, "Frame needs {} bytes", n),
            FrameError::Preamble(b) => write!(f, "Bad preamble {:#04x}", b),
            FrameError::Truncated => write!(f, "Frame truncated"),
            FrameError::Crc => write!(f, "CRC mismatch"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for FrameError {}

#[cfg(feature = "defmt")]
impl defmt::Format for FrameError {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            FrameError::TooLong(n) => defmt::write!(fmt, "TooLong({=usize})", n),
            FrameError::BufferTooSmall(n) => defmt::write!(fmt, "BufferTooSmall({=usize})", n),
            FrameError::Preamble(b) => defmt::write!(fmt, "Preamble({=u8:#x})", b),
            FrameError::Truncated => defmt::write!(fmt, "Truncated"),
            FrameError::Crc => defmt::write!(fmt, "Crc"),
        }
    }
}

/// Errors raised while wiring a [`HalfDuplexPort`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupError {
    Register(RegisterError),
    Timer(TimerError),
    /// Mailbox capacity outside `1..=MAX_QUEUE`
    MailboxCapacity(usize),
}

impl From<RegisterError> for SetupError {
    fn from(e: RegisterError) -> Self {
        SetupError::Register(e)
    }
}

impl From<TimerError> for SetupError {
    fn from(e: TimerError) -> Self {
        SetupError::Timer(e)
    }
}

impl fmt::Display for SetupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SetupError::Register(e) => write!(f, "Registration failed: {}", e),
            SetupError::Timer(e) => write!(f, "Timer allocation failed: {}", e),
            SetupError::MailboxCapacity(n) => write!(f, "Invalid mailbox capacity {}", n),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for SetupError {}

#[cfg(feature = "defmt")]
impl defmt::Format for SetupError {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            SetupError::Register(e) => defmt::write!(fmt, "Register({})", e),
            SetupError::Timer(e) => defmt::write!(fmt, "Timer({})", e),
            SetupError::MailboxCapacity(n) => defmt::write!(fmt, "MailboxCapacity({=usize})", n),
        }
    }
}
