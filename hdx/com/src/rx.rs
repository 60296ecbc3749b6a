//! Frame receiver
//!
//! Reassembles `PREAMBLE | LENGTH | PAYLOAD | CRC` frames from a UART receive
//! FIFO with as few interrupts as possible. The header is read from an
//! 8-byte trigger; long payloads are drained 10 bytes per 14-byte trigger,
//! always leaving 4 bytes in the FIFO; the tail is collected by one final
//! trigger set to the exact number of bytes still due.
//!
//! Payload and CRC bytes land in the shared [`FrameBuffer`]. The buffer's
//! length is only set for a frame that passed its CRC check, which marks it
//! occupied until the consumer clears it.

use hdx_core::{Callback, Context, Event, Signal};
use hdx_sm::{FlatBehavior, Step};

use crate::crc::Crc16;
use crate::frame::{FrameBuffer, SharedBuffer, CRC_LEN, PREAMBLE};
use crate::signals::{RxCause, RX_DATA, RX_DONE, RX_ERR, RX_ERROR, RX_RECEIVING, RX_TIMEOUT};
use crate::uart::{SharedUart, UartPort};
use crate::RX_TAG;

/// Trigger level while waiting for a header
pub const IDLE_TRIGGER: u8 = 8;
/// Trigger level while draining a long payload
pub const BUSY_TRIGGER: u8 = 14;
/// Bytes left in the FIFO whenever a drain step finishes
const FIFO_REMAINDER: usize = 4;
/// Payload bytes read together with the header
const HEAD_PAYLOAD: usize = IDLE_TRIGGER as usize - 2 - FIFO_REMAINDER;
/// Bytes read per busy trigger
const BUSY_CHUNK: usize = BUSY_TRIGGER as usize - FIFO_REMAINDER;
/// Shortest accepted payload; shorter frames never reach the idle trigger
pub const MIN_PAYLOAD: usize = FIFO_REMAINDER;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RxState {
    Idle,
    Busy,
    EndOfReceive,
    /// Line errors masked until the line goes quiet
    Error,
}

/// Receiver active object behavior, run inside an [`Stm`](hdx_sm::Stm).
pub struct Receiver<'a, U, const N: usize> {
    uart: &'a SharedUart<U>,
    buf: &'a SharedBuffer<N>,
    report: Option<Callback<'a>>,
    crc: Crc16,
    len: usize,
    /// Payload and CRC bytes still expected
    remaining: usize,
}

impl<'a, U: UartPort, const N: usize> Receiver<'a, U, N> {
    pub fn new(uart: &'a SharedUart<U>, buf: &'a SharedBuffer<N>, report: Option<Callback<'a>>) -> Self {
        Self {
            uart,
            buf,
            report,
            crc: Crc16::new(),
            len: 0,
            remaining: 0,
        }
    }

    /// Payload length of the frame in progress
    pub fn frame_len(&self) -> usize {
        self.len
    }

    pub fn remaining(&self) -> usize {
        self.remaining
    }

    fn with_hw<R>(&mut self, f: impl FnOnce(&mut Self, &mut U, &mut FrameBuffer<N>) -> R) -> R {
        let (uart, buf) = (self.uart, self.buf);
        critical_section::with(|cs| f(self, &mut uart.borrow_ref_mut(cs), &mut buf.borrow_ref_mut(cs)))
    }

    fn with_uart<R>(&self, f: impl FnOnce(&mut U) -> R) -> R {
        crate::uart::with_uart(self.uart, f)
    }

    fn notify(&self, signal: Signal, data: u16) {
        if let Some(report) = self.report {
            if let Err(fault) = report.invoke(Event::with_data(signal, data)) {
                log::error!("rx: {} not delivered: {}", signal, fault);
            }
        }
    }

    fn fail(&self, cause: u16) -> Step<RxState> {
        log::debug!("rx: frame rejected, cause {:#06x}", cause);
        self.notify(RX_ERR, cause);
        Step::Tran(RxState::Error)
    }

    /// Read up to `count` bytes into the buffer, feeding the CRC.
    fn read_payload(&mut self, uart: &mut U, buf: &mut FrameBuffer<N>, count: usize) {
        for _ in 0..count.min(self.remaining) {
            let Ok(byte) = uart.read() else {
                break;
            };
            self.crc.update(byte);
            buf.push_byte(byte);
            self.remaining -= 1;
        }
    }

    fn check_header(&self, preamble: u8, len: usize, buf: &FrameBuffer<N>) -> Result<(), RxCause> {
        if preamble != PREAMBLE {
            Err(RxCause::Preamble)
        } else if !buf.is_free() {
            Err(RxCause::BufferUsed)
        } else if len + CRC_LEN > buf.capacity() {
            Err(RxCause::TooLong)
        } else if len < MIN_PAYLOAD {
            Err(RxCause::TooShort)
        } else {
            Ok(())
        }
    }

    fn next_drain_state(&self) -> RxState {
        if self.remaining <= BUSY_TRIGGER as usize {
            RxState::EndOfReceive
        } else {
            RxState::Busy
        }
    }

    fn idle(&mut self, event: &Event) -> Step<RxState> {
        match event.signal {
            Signal::ENTRY => {
                self.with_uart(|u| {
                    u.clear_rx_fifo();
                    u.set_rx_trigger(IDLE_TRIGGER);
                });
                Step::Handled
            }
            RX_DATA => {
                let header = self.with_hw(|rx, uart, buf| {
                    let preamble = read_byte(uart);
                    let len = read_byte(uart);
                    uart.enable_rx_irq();
                    let (Some(preamble), Some(len)) = (preamble, len) else {
                        return Err(RxCause::TooShort);
                    };
                    rx.check_header(preamble, len as usize, buf)?;
                    rx.crc.reset();
                    rx.crc.update(len);
                    rx.len = len as usize;
                    rx.remaining = len as usize + CRC_LEN;
                    buf.begin();
                    rx.read_payload(uart, buf, HEAD_PAYLOAD);
                    Ok(())
                });
                match header {
                    Ok(()) => {
                        self.notify(RX_RECEIVING, 0);
                        Step::Tran(self.next_drain_state())
                    }
                    Err(cause) => self.fail(cause.code()),
                }
            }
            RX_TIMEOUT => {
                self.with_uart(|u| {
                    u.clear_rx_fifo();
                    u.enable_timeout_irq();
                });
                self.fail(RxCause::TooShort.code())
            }
            RX_ERROR => {
                // An error with an empty FIFO carries no frame to discard
                if self.with_uart(|u| u.rx_fifo_empty()) {
                    Step::Handled
                } else {
                    self.fail(event.data)
                }
            }
            _ => Step::Ignored,
        }
    }

    fn busy(&mut self, event: &Event) -> Step<RxState> {
        match event.signal {
            Signal::ENTRY => {
                self.with_uart(|u| u.set_rx_trigger(BUSY_TRIGGER));
                Step::Handled
            }
            RX_DATA => {
                self.with_hw(|rx, uart, buf| {
                    rx.read_payload(uart, buf, BUSY_CHUNK);
                    uart.enable_rx_irq();
                });
                match self.next_drain_state() {
                    RxState::Busy => Step::Handled,
                    next => Step::Tran(next),
                }
            }
            RX_TIMEOUT => self.too_short(),
            RX_ERROR => self.fail(event.data),
            _ => Step::Ignored,
        }
    }

    fn end_of_receive(&mut self, ctx: &Context<'_>, event: &Event) -> Step<RxState> {
        match event.signal {
            Signal::ENTRY => {
                if self.remaining == FIFO_REMAINDER {
                    // Everything due is already queued
                    if let Err(fault) = ctx.post_self(Event::new(RX_DATA)) {
                        log::error!("rx: cannot schedule tail read: {}", fault);
                    }
                } else {
                    let odd = self.remaining & (FIFO_REMAINDER - 1);
                    self.with_hw(|rx, uart, buf| {
                        rx.read_payload(uart, buf, odd);
                        uart.set_rx_trigger(rx.remaining as u8);
                    });
                }
                Step::Handled
            }
            RX_DATA => {
                let outcome = self.with_hw(|rx, uart, buf| {
                    rx.read_payload(uart, buf, rx.remaining);
                    uart.enable_rx_irq();
                    if rx.remaining != 0 {
                        Err(RxCause::TooShort)
                    } else if rx.crc.is_valid() {
                        buf.commit(rx.len);
                        Ok(rx.len)
                    } else {
                        Err(RxCause::Crc)
                    }
                });
                match outcome {
                    Ok(len) => {
                        log::trace!("rx: frame of {} bytes", len);
                        self.notify(RX_DONE, len as u16);
                    }
                    Err(cause) => {
                        log::debug!("rx: frame rejected, cause {:#06x}", cause.code());
                        self.notify(RX_ERR, cause.code());
                    }
                }
                Step::Tran(RxState::Idle)
            }
            RX_TIMEOUT => self.too_short(),
            RX_ERROR => self.fail(event.data),
            _ => Step::Ignored,
        }
    }

    fn too_short(&mut self) -> Step<RxState> {
        self.with_uart(|u| u.enable_timeout_irq());
        self.notify(RX_ERR, RxCause::TooShort.code());
        Step::Tran(RxState::Idle)
    }

    fn error(&mut self, event: &Event) -> Step<RxState> {
        match event.signal {
            Signal::ENTRY => {
                self.with_uart(|u| {
                    u.mask_error_irqs();
                    u.disable_rx_irq();
                });
                Step::Handled
            }
            RX_TIMEOUT => {
                self.with_uart(|u| {
                    u.clear_errors();
                    u.unmask_error_irqs();
                    u.enable_rx_irq();
                    u.enable_timeout_irq();
                });
                Step::Tran(RxState::Idle)
            }
            _ => Step::Ignored,
        }
    }
}

fn read_byte<U: UartPort>(uart: &mut U) -> Option<u8> {
    match uart.read() {
        Ok(byte) => Some(byte),
        Err(nb::Error::WouldBlock) => None,
        Err(nb::Error::Other(never)) => match never {},
    }
}

impl<U: UartPort, const N: usize> FlatBehavior for Receiver<'_, U, N> {
    type State = RxState;

    fn on_start(&mut self, _ctx: &Context<'_>) {
        self.with_uart(|u| {
            u.clear_errors();
            u.unmask_error_irqs();
            u.enable_rx_irq();
            u.enable_timeout_irq();
        });
    }

    fn on_event(&mut self, ctx: &Context<'_>, state: RxState, event: &Event) -> Step<RxState> {
        match state {
            RxState::Idle => self.idle(event),
            RxState::Busy => self.busy(event),
            RxState::EndOfReceive => self.end_of_receive(ctx, event),
            RxState::Error => self.error(event),
        }
    }

    fn type_tag(&self) -> u8 {
        RX_TAG
    }
}
