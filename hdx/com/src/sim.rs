//! Simulated UART and GPIO for host tests and bench runs
//!
//! [`SimUart`] models 16-byte FIFOs, a receive trigger level, the one-shot
//! receive/timeout interrupts and the end-of-transmission interrupt. The
//! wire is advanced explicitly one byte at a time, so a test decides exactly
//! when bytes arrive relative to interrupt handling.

use core::convert::Infallible;
use core::sync::atomic::{AtomicBool, Ordering};

use embedded_hal::digital::{ErrorType, OutputPin};
use heapless::{Deque, Vec};

use crate::frame::FIFO_DEPTH;
use crate::uart::{IrqStatus, UartPort};

/// Bytes the simulated line can hold in flight, and the size of the sent log
pub const LINE_CAPACITY: usize = 512;

#[derive(Debug, Default)]
pub struct SimUart {
    rx_fifo: Deque<u8, FIFO_DEPTH>,
    tx_fifo: Deque<u8, FIFO_DEPTH>,
    /// Bytes on their way to the receiver
    line: Deque<u8, LINE_CAPACITY>,
    sent: Vec<u8, LINE_CAPACITY>,
    loopback: bool,
    trigger: u8,
    rx_irq: bool,
    timeout_irq: bool,
    tx_irq: bool,
    errors_masked: bool,
    /// Raw latched causes, reported through the enables
    latched: IrqStatus,
}

impl SimUart {
    pub fn new() -> Self {
        Self {
            trigger: 1,
            ..Default::default()
        }
    }

    /// Echo every transmitted byte back into the receive line
    pub fn with_loopback(mut self) -> Self {
        self.loopback = true;
        self
    }

    /// Queue bytes on the receive line. Returns how many fit.
    pub fn inject(&mut self, bytes: &[u8]) -> usize {
        bytes.iter().take_while(|&&b| self.line.push_back(b).is_ok()).count()
    }

    /// Latch line error bits, as a corrupted character would
    pub fn inject_error(&mut self, errors: IrqStatus) {
        self.latched |= errors.errors();
    }

    /// Move one byte from the line into the receive FIFO. Returns false when
    /// the line is empty.
    pub fn step_rx_line(&mut self) -> bool {
        let Some(byte) = self.line.pop_front() else {
            return false;
        };
        if self.rx_fifo.push_back(byte).is_err() {
            self.latched |= IrqStatus::OVERRUN;
        }
        true
    }

    /// Shift one byte out of the transmit FIFO. Returns false when it was
    /// already empty.
    pub fn step_tx(&mut self) -> bool {
        let Some(byte) = self.tx_fifo.pop_front() else {
            return false;
        };
        // Log saturates at LINE_CAPACITY
        let _ = self.sent.push(byte);
        if self.loopback && self.line.push_back(byte).is_err() {
            log::warn!("sim uart: loopback line full");
        }
        if self.tx_fifo.is_empty() {
            self.latched |= IrqStatus::TX;
        }
        true
    }

    /// The line has been quiet long enough for a receive timeout. Returns
    /// true if that raised an interrupt.
    pub fn line_idle(&mut self) -> bool {
        if self.timeout_irq && !self.rx_fifo.is_empty() && !self.latched.contains(IrqStatus::TIMEOUT) {
            self.latched |= IrqStatus::TIMEOUT;
            true
        } else {
            false
        }
    }

    pub fn line_pending(&self) -> usize {
        self.line.len()
    }

    pub fn rx_fifo_len(&self) -> usize {
        self.rx_fifo.len()
    }

    pub fn tx_fifo_len(&self) -> usize {
        self.tx_fifo.len()
    }

    pub fn trigger(&self) -> u8 {
        self.trigger
    }

    pub fn rx_irq_enabled(&self) -> bool {
        self.rx_irq
    }

    pub fn timeout_irq_enabled(&self) -> bool {
        self.timeout_irq
    }

    pub fn errors_masked(&self) -> bool {
        self.errors_masked
    }

    /// Everything transmitted so far
    pub fn sent(&self) -> &[u8] {
        &self.sent
    }

    pub fn clear_sent(&mut self) {
        self.sent.clear();
    }

    /// Hold back the end-of-transmission interrupt
    pub fn disable_tx_irq(&mut self) {
        self.tx_irq = false;
    }

    /// Causes that would raise the interrupt line right now
    pub fn pending(&self) -> IrqStatus {
        let mut status = IrqStatus::NONE;
        if self.rx_irq && self.rx_fifo.len() >= usize::from(self.trigger) {
            status |= IrqStatus::RX;
        }
        if self.timeout_irq && self.latched.contains(IrqStatus::TIMEOUT) {
            status |= IrqStatus::TIMEOUT;
        }
        if self.tx_irq && self.latched.contains(IrqStatus::TX) {
            status |= IrqStatus::TX;
        }
        if !self.errors_masked {
            status |= self.latched.errors();
        }
        status
    }

    pub fn has_pending_irq(&self) -> bool {
        !self.pending().is_empty()
    }
}

impl UartPort for SimUart {
    fn read(&mut self) -> nb::Result<u8, Infallible> {
        self.rx_fifo.pop_front().ok_or(nb::Error::WouldBlock)
    }

    fn rx_fifo_empty(&self) -> bool {
        self.rx_fifo.is_empty()
    }

    fn set_rx_trigger(&mut self, bytes: u8) {
        self.trigger = bytes.clamp(1, FIFO_DEPTH as u8);
    }

    fn enable_rx_irq(&mut self) {
        self.rx_irq = true;
    }

    fn disable_rx_irq(&mut self) {
        self.rx_irq = false;
    }

    fn enable_timeout_irq(&mut self) {
        self.timeout_irq = true;
    }

    fn disable_timeout_irq(&mut self) {
        self.timeout_irq = false;
    }

    fn mask_error_irqs(&mut self) {
        self.errors_masked = true;
    }

    fn unmask_error_irqs(&mut self) {
        self.errors_masked = false;
    }

    fn clear_errors(&mut self) {
        self.latched = IrqStatus::from_bits(self.latched.bits() & !IrqStatus::ERRORS.bits());
    }

    fn write(&mut self, byte: u8) -> nb::Result<(), Infallible> {
        self.tx_fifo.push_back(byte).map_err(|_| nb::Error::WouldBlock)?;
        self.latched = IrqStatus::from_bits(self.latched.bits() & !IrqStatus::TX.bits());
        Ok(())
    }

    fn is_busy(&self) -> bool {
        !self.tx_fifo.is_empty()
    }

    fn enable_tx_irq(&mut self) {
        self.tx_irq = true;
    }

    fn take_irqs(&mut self) -> IrqStatus {
        let status = self.pending();
        self.latched = IrqStatus::from_bits(self.latched.bits() & !status.bits());
        status
    }
}

/// An output pin backed by a flag the test can inspect.
#[derive(Debug, Clone, Copy)]
pub struct SimPin<'p> {
    level: &'p AtomicBool,
}

impl<'p> SimPin<'p> {
    pub fn new(level: &'p AtomicBool) -> Self {
        Self { level }
    }

    pub fn is_high(&self) -> bool {
        self.level.load(Ordering::Relaxed)
    }
}

impl ErrorType for SimPin<'_> {
    type Error = Infallible;
}

impl OutputPin for SimPin<'_> {
    fn set_low(&mut self) -> Result<(), Infallible> {
        self.level.store(false, Ordering::Relaxed);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Infallible> {
        self.level.store(true, Ordering::Relaxed);
        Ok(())
    }
}
