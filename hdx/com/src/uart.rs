//! UART peripheral abstraction for the frame drivers

use core::cell::RefCell;
use core::convert::Infallible;
use core::fmt;

use critical_section::Mutex;

/// Interrupt causes latched by the UART.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct IrqStatus(u16);

impl IrqStatus {
    pub const NONE: IrqStatus = IrqStatus(0);
    /// Receive FIFO reached its trigger level
    pub const RX: IrqStatus = IrqStatus(0x0001);
    /// Line idle with data left in the receive FIFO
    pub const TIMEOUT: IrqStatus = IrqStatus(0x0002);
    /// Last bit of the transmit FIFO left the shift register
    pub const TX: IrqStatus = IrqStatus(0x0004);
    pub const FRAMING: IrqStatus = IrqStatus(0x0010);
    pub const PARITY: IrqStatus = IrqStatus(0x0020);
    pub const BREAK: IrqStatus = IrqStatus(0x0040);
    pub const OVERRUN: IrqStatus = IrqStatus(0x0080);
    /// All line error causes
    pub const ERRORS: IrqStatus = IrqStatus(0x00F0);

    pub const fn from_bits(bits: u16) -> Self {
        IrqStatus(bits)
    }

    pub const fn bits(self) -> u16 {
        self.0
    }

    pub const fn contains(self, other: IrqStatus) -> bool {
        self.0 & other.0 == other.0 && other.0 != 0
    }

    pub const fn intersects(self, other: IrqStatus) -> bool {
        self.0 & other.0 != 0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Line error bits only
    pub const fn errors(self) -> IrqStatus {
        IrqStatus(self.0 & Self::ERRORS.0)
    }
}

impl core::ops::BitOr for IrqStatus {
    type Output = IrqStatus;

    fn bitor(self, rhs: IrqStatus) -> IrqStatus {
        IrqStatus(self.0 | rhs.0)
    }
}

impl core::ops::BitOrAssign for IrqStatus {
    fn bitor_assign(&mut self, rhs: IrqStatus) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for IrqStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#06x}", self.0)
    }
}

/// A UART with 16-byte FIFOs and per-cause interrupt control.
///
/// The receive and timeout interrupts are one-shot: the interrupt service
/// routine disables them when they fire and the receiver re-enables them
/// once it has handled the event.
pub trait UartPort {
    /// Pop one byte from the receive FIFO
    fn read(&mut self) -> nb::Result<u8, Infallible>;

    fn rx_fifo_empty(&self) -> bool;

    /// Discard everything in the receive FIFO
    fn clear_rx_fifo(&mut self) {
        while self.read().is_ok() {}
    }

    /// Raise the receive interrupt once `bytes` are queued
    fn set_rx_trigger(&mut self, bytes: u8);

    fn enable_rx_irq(&mut self);
    fn disable_rx_irq(&mut self);
    fn enable_timeout_irq(&mut self);
    fn disable_timeout_irq(&mut self);

    /// Stop line errors from raising interrupts
    fn mask_error_irqs(&mut self);
    fn unmask_error_irqs(&mut self);
    /// Acknowledge latched line errors
    fn clear_errors(&mut self);

    /// Push one byte into the transmit FIFO
    fn write(&mut self, byte: u8) -> nb::Result<(), Infallible>;

    /// True while the transmitter is still shifting bits out
    fn is_busy(&self) -> bool;

    /// Enable the end-of-transmission interrupt
    fn enable_tx_irq(&mut self);

    /// Read and acknowledge the pending interrupt causes
    fn take_irqs(&mut self) -> IrqStatus;
}

/// A UART shared by the receiver, the transmitter and the interrupt handler
pub type SharedUart<U> = Mutex<RefCell<U>>;

/// Run `f` on the UART inside a critical section
pub fn with_uart<U, R>(uart: &SharedUart<U>, f: impl FnOnce(&mut U) -> R) -> R {
    critical_section::with(|cs| f(&mut uart.borrow_ref_mut(cs)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_bits() {
        let status = IrqStatus::RX | IrqStatus::PARITY | IrqStatus::OVERRUN;
        assert!(status.contains(IrqStatus::RX));
        assert!(!status.contains(IrqStatus::TX));
        assert_eq!(status.errors().bits(), 0xA0);
        assert!(!IrqStatus::TIMEOUT.intersects(IrqStatus::ERRORS));
    }
}
