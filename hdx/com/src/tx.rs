//! Frame transmitter
//!
//! Sends the pending part of a prepared [`FrameBuffer`] as one frame. Short
//! frames go into the FIFO in one piece; longer ones are refilled each time
//! the FIFO drains, always keeping the two CRC bytes together. Completion is
//! taken from the end-of-transmission interrupt so the line is really idle
//! when `TX_DONE` is reported.

use hdx_core::{Callback, Context, Event, Signal};
use hdx_sm::{FlatBehavior, Step};

use crate::crc::Crc16;
use crate::frame::{FrameBuffer, SharedBuffer, CRC_LEN, FIFO_DEPTH, HEADER_LEN, OVERHEAD, PREAMBLE};
use crate::signals::{TxCause, TX_DONE, TX_EOT, TX_ERR, TX_GO, TX_STOP};
use crate::uart::{SharedUart, UartPort};
use crate::TX_TAG;

/// Largest payload sent in a single FIFO load
const SINGLE_LOAD: usize = FIFO_DEPTH - OVERHEAD;
/// Payload bytes in the first load of a long frame
const FIRST_CHUNK: usize = FIFO_DEPTH - 1 - HEADER_LEN;
/// Payload bytes per refill while more than a final load remains
const REFILL_CHUNK: usize = FIFO_DEPTH - 1;
/// Largest remainder that fits one load together with the CRC
const FINAL_LOAD: usize = FIFO_DEPTH - CRC_LEN;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TxState {
    Idle,
    /// More payload waits for the FIFO to drain
    Busy,
    /// Everything is queued, waiting for the line to go idle
    EndOfTransmission,
}

/// Errors latched while a frame is on the wire.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Latched {
    busy: bool,
    stop: bool,
}

impl Latched {
    fn take(&mut self) -> Option<TxCause> {
        let cause = if self.busy {
            Some(TxCause::UartBusy)
        } else if self.stop {
            Some(TxCause::Stop)
        } else {
            None
        };
        *self = Latched::default();
        cause
    }
}

/// Transmitter active object behavior, run inside an [`Stm`](hdx_sm::Stm).
pub struct Transmitter<'a, U, const N: usize> {
    uart: &'a SharedUart<U>,
    buf: &'a SharedBuffer<N>,
    report: Option<Callback<'a>>,
    crc: Crc16,
    latched: Latched,
}

impl<'a, U: UartPort, const N: usize> Transmitter<'a, U, N> {
    pub fn new(uart: &'a SharedUart<U>, buf: &'a SharedBuffer<N>, report: Option<Callback<'a>>) -> Self {
        Self {
            uart,
            buf,
            report,
            crc: Crc16::new(),
            latched: Latched::default(),
        }
    }

    fn with_hw<R>(&mut self, f: impl FnOnce(&mut Self, &mut U, &mut FrameBuffer<N>) -> R) -> R {
        let (uart, buf) = (self.uart, self.buf);
        critical_section::with(|cs| f(self, &mut uart.borrow_ref_mut(cs), &mut buf.borrow_ref_mut(cs)))
    }

    fn uart_busy(&self) -> bool {
        crate::uart::with_uart(self.uart, |u| u.is_busy())
    }

    fn notify(&self, signal: Signal, data: u16) {
        if let Some(report) = self.report {
            if let Err(fault) = report.invoke(Event::with_data(signal, data)) {
                log::error!("tx: {} not delivered: {}", signal, fault);
            }
        }
    }

    fn put(&mut self, uart: &mut U, byte: u8) {
        if uart.write(byte).is_err() {
            log::warn!("tx: FIFO full, byte dropped");
        }
    }

    fn write_payload(&mut self, uart: &mut U, buf: &mut FrameBuffer<N>, count: usize) {
        for _ in 0..count {
            let Some(byte) = buf.take_byte() else {
                break;
            };
            self.crc.update(byte);
            self.put(uart, byte);
        }
    }

    fn write_crc(&mut self, uart: &mut U) {
        let [hi, lo] = self.crc.value().to_be_bytes();
        self.put(uart, hi);
        self.put(uart, lo);
    }

    /// Report the outcome of a finished or abandoned frame and go idle.
    fn finish(&mut self) -> Step<TxState> {
        match self.latched.take() {
            Some(cause) => {
                log::debug!("tx: frame ended with {:?}", cause);
                self.notify(TX_ERR, cause.code());
            }
            None => self.notify(TX_DONE, 0),
        }
        Step::Tran(TxState::Idle)
    }

    /// Latch a `GO` or `STOP` that arrived mid-frame.
    fn latch(&mut self, signal: Signal) {
        if signal == TX_GO {
            self.latched.busy = true;
        } else {
            self.latched.stop = true;
        }
    }

    fn idle(&mut self, event: &Event) -> Step<TxState> {
        if event.signal != TX_GO {
            return Step::Ignored;
        }
        let next = self.with_hw(|tx, uart, buf| {
            let pending = buf.pending();
            if pending == 0 {
                return None;
            }
            tx.crc.reset();
            uart.enable_tx_irq();
            tx.put(uart, PREAMBLE);
            tx.crc.update(pending as u8);
            tx.put(uart, pending as u8);
            if pending <= SINGLE_LOAD {
                tx.write_payload(uart, buf, pending);
                tx.write_crc(uart);
                Some(TxState::EndOfTransmission)
            } else {
                tx.write_payload(uart, buf, FIRST_CHUNK);
                Some(TxState::Busy)
            }
        });
        match next {
            Some(state) => Step::Tran(state),
            None => {
                log::debug!("tx: nothing to send");
                self.notify(TX_ERR, TxCause::BufferEmpty.code());
                Step::Handled
            }
        }
    }

    fn busy(&mut self, event: &Event) -> Step<TxState> {
        match event.signal {
            TX_EOT => {
                let done = self.with_hw(|tx, uart, buf| {
                    let pending = buf.pending();
                    if pending <= FINAL_LOAD {
                        tx.write_payload(uart, buf, pending);
                        tx.write_crc(uart);
                        true
                    } else {
                        tx.write_payload(uart, buf, REFILL_CHUNK);
                        false
                    }
                });
                if done {
                    Step::Tran(TxState::EndOfTransmission)
                } else {
                    Step::Handled
                }
            }
            // The frame keeps going; the error is reported once it is out
            TX_GO => {
                self.latch(TX_GO);
                if self.uart_busy() {
                    Step::Handled
                } else {
                    self.finish()
                }
            }
            TX_STOP => {
                self.latch(TX_STOP);
                if self.uart_busy() {
                    Step::Tran(TxState::EndOfTransmission)
                } else {
                    self.finish()
                }
            }
            _ => Step::Ignored,
        }
    }

    fn end_of_transmission(&mut self, event: &Event) -> Step<TxState> {
        match event.signal {
            TX_EOT => self.finish(),
            TX_GO | TX_STOP => {
                self.latch(event.signal);
                if self.uart_busy() {
                    Step::Handled
                } else {
                    self.finish()
                }
            }
            _ => Step::Ignored,
        }
    }
}

impl<U: UartPort, const N: usize> FlatBehavior for Transmitter<'_, U, N> {
    type State = TxState;

    fn on_event(&mut self, _ctx: &Context<'_>, state: TxState, event: &Event) -> Step<TxState> {
        match state {
            TxState::Idle => self.idle(event),
            TxState::Busy => self.busy(event),
            TxState::EndOfTransmission => self.end_of_transmission(event),
        }
    }

    fn type_tag(&self) -> u8 {
        TX_TAG
    }
}
