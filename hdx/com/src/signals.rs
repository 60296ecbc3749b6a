//! Signals and detail codes of the serial link.
//!
//! Input signals are private to the object that consumes them and start at
//! zero. Report signals travel to the orchestrator or the application and
//! use disjoint values so all of them can share one mailbox.

use hdx_core::Signal;

// Receiver inputs, raised by the UART interrupt handler
/// Receive FIFO reached its trigger level
pub const RX_DATA: Signal = Signal::new(0);
/// Line error, `data` holds the error bits
pub const RX_ERROR: Signal = Signal::new(1);
/// Line went idle with bytes left in the FIFO
pub const RX_TIMEOUT: Signal = Signal::new(2);

// Transmitter inputs
/// Send the prepared buffer
pub const TX_GO: Signal = Signal::new(0);
/// Abort after the bytes already in the FIFO
pub const TX_STOP: Signal = Signal::new(1);
/// Last byte left the shift register
pub const TX_EOT: Signal = Signal::new(2);

// Orchestrator inputs
pub const HX_ON: Signal = Signal::new(0);
pub const HX_OFF: Signal = Signal::new(1);
/// Send the prepared buffer and wait for the answer
pub const HX_GO: Signal = Signal::new(2);
/// Response timer expired
pub const HX_TIMEOUT: Signal = Signal::new(3);
/// Transmit settle delay elapsed
pub const HX_TX_DELAY: Signal = Signal::new(4);

// Receiver reports
/// Frame received, `data` holds the payload length
pub const RX_DONE: Signal = Signal::new(0x20);
/// Frame rejected, `data` holds an [`RxCause`] or line error bits
pub const RX_ERR: Signal = Signal::new(0x21);
/// Valid header seen, payload on its way
pub const RX_RECEIVING: Signal = Signal::new(0x22);

// Transmitter reports
pub const TX_DONE: Signal = Signal::new(0x28);
/// `data` holds a [`TxCause`]
pub const TX_ERR: Signal = Signal::new(0x29);

// Orchestrator reports
/// No frame within the response timeout, `data` holds a [`NoResponse`] leg
pub const HX_NO_RESPONSE: Signal = Signal::new(0x30);
/// `data` holds an [`HxErrLeg`] in the high byte and the cause in the low byte
pub const HX_ERR: Signal = Signal::new(0x31);
/// Response received, `data` holds the payload length
pub const HX_RX: Signal = Signal::new(0x32);
/// Reception while none was expected, `data` holds an [`InvalidRx`] context
/// in the high byte and, for errors, the cause in the low byte
pub const HX_INV_RX: Signal = Signal::new(0x33);

/// Receive error causes. Line errors are reported with their raw bits
/// (framing 0x10, parity 0x20, break 0x40, overrun 0x80) instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u16)]
pub enum RxCause {
    /// Line went idle before the frame was complete
    TooShort = 1,
    /// Frame does not fit the receive buffer
    TooLong = 2,
    Preamble = 3,
    /// Previous frame not yet consumed
    BufferUsed = 4,
    Crc = 5,
}

impl RxCause {
    pub const fn code(self) -> u16 {
        self as u16
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u16)]
pub enum TxCause {
    /// `GO` with nothing to send
    BufferEmpty = 0,
    /// `GO` while a frame was still going out
    UartBusy = 1,
    /// Stopped on request
    Stop = 2,
}

impl TxCause {
    pub const fn code(self) -> u16 {
        self as u16
    }
}

/// Which leg of an exchange an [`HX_ERR`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u16)]
pub enum HxErrLeg {
    Transmit = 0x0000,
    ReceiveWhileTransmit = 0x0100,
    Loopback = 0x0200,
    Receive = 0x0300,
}

/// Where an [`HX_INV_RX`] was observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u16)]
pub enum InvalidRx {
    WaitingErr = 0x0000,
    WaitingRx = 0x0100,
    SendingErr = 0x0200,
    SendingRx = 0x0300,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u16)]
pub enum NoResponse {
    /// Peer did not answer
    Receive = 0,
    /// Own frame never came back
    Loopback = 1,
}

/// Mask selecting the leg or context of a detail word
pub const DETAIL_LEG_MASK: u16 = 0xFF00;

/// Combine a leg or context with a cause code
pub const fn detail(leg: u16, cause: u16) -> u16 {
    leg | (cause & !DETAIL_LEG_MASK)
}
