//! Receiver tests: frames fed byte by byte through the simulated UART

use std::vec;
use std::vec::Vec;

use hdx_core::{ActiveObject, Callback, Context};
use hdx_sm::Stm;

use super::{sim, sim_uart, Recorder, HX, RX, TX};
use crate::frame::{encode, shared_buffer, with_buffer, SharedBuffer, OVERHEAD};
use crate::isr::{self, IsrLinks};
use crate::rx::{Receiver, RxState, BUSY_TRIGGER, IDLE_TRIGGER};
use crate::signals::*;
use crate::sim::SimUart;
use crate::uart::{IrqStatus, SharedUart};

struct Rig<'a> {
    uart: &'a SharedUart<SimUart>,
    buf: &'a SharedBuffer<64>,
    rec: &'a Recorder,
    rx: Stm<Receiver<'a, SimUart, 64>>,
}

impl<'a> Rig<'a> {
    fn new(uart: &'a SharedUart<SimUart>, buf: &'a SharedBuffer<64>, rec: &'a Recorder) -> Self {
        let mut rx = Stm::new(Receiver::new(uart, buf, Some(Callback::post(rec, HX))), RxState::Idle);
        rx.start(&Context::new(rec, RX));
        Self { uart, buf, rec, rx }
    }

    /// Dispatch everything queued for the receiver
    fn deliver(&mut self) -> bool {
        let inbox = self.rec.take_for(RX);
        let ctx = Context::new(self.rec, RX);
        for event in &inbox {
            self.rx.dispatch(&ctx, *event);
        }
        !inbox.is_empty()
    }

    fn service(&self) -> bool {
        if !sim(self.uart, |u| u.has_pending_irq()) {
            return false;
        }
        isr::service(self.uart, self.rec, IsrLinks { rx: RX, tx: TX });
        true
    }

    /// Deliver the line into the receiver without letting it go quiet
    fn settle(&mut self) {
        while self.deliver() || self.service() || sim(self.uart, |u| u.step_rx_line()) {}
    }

    /// Run until the line is drained and nothing is left to do
    fn pump(&mut self) {
        loop {
            self.settle();
            if !sim(self.uart, |u| u.line_idle()) {
                break;
            }
        }
    }

    fn feed(&mut self, bytes: &[u8]) {
        sim(self.uart, |u| assert_eq!(u.inject(bytes), bytes.len()));
        self.pump();
    }

    fn state(&self) -> RxState {
        self.rx.state()
    }

    fn payload(&self) -> Vec<u8> {
        with_buffer(self.buf, |b| b.payload().to_vec())
    }
}

fn frame(payload: &[u8]) -> Vec<u8> {
    let mut out = vec![0u8; payload.len() + OVERHEAD];
    encode(payload, &mut out).unwrap();
    out
}

fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 7 + 3) as u8).collect()
}

#[test]
fn test_start_configures_uart() {
    let (uart, buf, rec) = (sim_uart(), shared_buffer::<64>(), Recorder::default());
    let rig = Rig::new(&uart, &buf, &rec);
    assert_eq!(rig.state(), RxState::Idle);
    sim(&uart, |u| {
        assert_eq!(u.trigger(), IDLE_TRIGGER);
        assert!(u.rx_irq_enabled());
        assert!(u.timeout_irq_enabled());
        assert!(!u.errors_masked());
    });
}

#[test]
fn test_short_frame() {
    let (uart, buf, rec) = (sim_uart(), shared_buffer::<64>(), Recorder::default());
    let mut rig = Rig::new(&uart, &buf, &rec);

    rig.feed(&frame(b"HELLO"));

    assert_eq!(rec.reports(), vec![(RX_RECEIVING, 0), (RX_DONE, 5)]);
    assert_eq!(rig.payload(), b"HELLO");
    assert_eq!(rig.state(), RxState::Idle);
    assert_eq!(sim(&uart, |u| u.rx_fifo_len()), 0);
}

#[test]
fn test_long_frame_drains_in_chunks() {
    let (uart, buf, rec) = (sim_uart(), shared_buffer::<64>(), Recorder::default());
    let mut rig = Rig::new(&uart, &buf, &rec);
    let payload = pattern(40);

    rig.feed(&frame(&payload));

    assert_eq!(rec.reports(), vec![(RX_RECEIVING, 0), (RX_DONE, 40)]);
    assert_eq!(rig.payload(), payload);
    assert_eq!(rig.state(), RxState::Idle);
}

#[test]
fn test_busy_trigger_while_draining() {
    let (uart, buf, rec) = (sim_uart(), shared_buffer::<64>(), Recorder::default());
    let mut rig = Rig::new(&uart, &buf, &rec);
    let bytes = frame(&pattern(40));

    // Header trigger only
    sim(&uart, |u| u.inject(&bytes[..IDLE_TRIGGER as usize]));
    rig.settle();
    assert_eq!(rig.state(), RxState::Busy);
    assert_eq!(sim(&uart, |u| u.trigger()), BUSY_TRIGGER);
    assert_eq!(rig.rx.behavior().remaining(), 40);

    rig.feed(&bytes[IDLE_TRIGGER as usize..]);
    assert_eq!(rig.state(), RxState::Idle);
    assert_eq!(rec.reports().last(), Some(&(RX_DONE, 40)));
}

#[test]
fn test_minimum_frame_completes_without_tail_trigger() {
    let (uart, buf, rec) = (sim_uart(), shared_buffer::<64>(), Recorder::default());
    let mut rig = Rig::new(&uart, &buf, &rec);

    rig.feed(&frame(&[1, 2, 3, 4]));

    assert_eq!(rec.reports(), vec![(RX_RECEIVING, 0), (RX_DONE, 4)]);
    assert_eq!(rig.payload(), [1, 2, 3, 4]);
}

#[test]
fn test_crc_mismatch() {
    let (uart, buf, rec) = (sim_uart(), shared_buffer::<64>(), Recorder::default());
    let mut rig = Rig::new(&uart, &buf, &rec);
    let mut bytes = frame(b"HELLO");
    *bytes.last_mut().unwrap() ^= 0x01;

    rig.feed(&bytes);

    assert_eq!(rec.reports(), vec![(RX_RECEIVING, 0), (RX_ERR, RxCause::Crc.code())]);
    assert!(with_buffer(&buf, |b| b.is_free()));
    assert_eq!(rig.state(), RxState::Idle);
}

#[test]
fn test_occupied_buffer_rejects_frame() {
    let (uart, buf, rec) = (sim_uart(), shared_buffer::<64>(), Recorder::default());
    let mut rig = Rig::new(&uart, &buf, &rec);

    rig.feed(&frame(b"HELLO"));
    rig.feed(&frame(b"WORLD"));

    assert_eq!(
        rec.reports(),
        vec![(RX_RECEIVING, 0), (RX_DONE, 5), (RX_ERR, RxCause::BufferUsed.code())]
    );
    // The unconsumed frame is untouched and the line recovered
    assert_eq!(rig.payload(), b"HELLO");
    assert_eq!(rig.state(), RxState::Idle);

    with_buffer(&buf, |b| b.clear());
    rig.feed(&frame(b"AGAIN"));
    assert_eq!(rig.payload(), b"AGAIN");
}

#[test]
fn test_bad_preamble() {
    let (uart, buf, rec) = (sim_uart(), shared_buffer::<64>(), Recorder::default());
    let mut rig = Rig::new(&uart, &buf, &rec);
    let mut bytes = frame(b"HELLO");
    bytes[0] = 0x5A;

    rig.feed(&bytes);

    assert_eq!(rec.reports(), vec![(RX_ERR, RxCause::Preamble.code())]);
    assert_eq!(rig.state(), RxState::Idle);
}

#[test]
fn test_frame_larger_than_buffer() {
    let (uart, buf, rec) = (sim_uart(), shared_buffer::<64>(), Recorder::default());
    let mut rig = Rig::new(&uart, &buf, &rec);

    // 63 payload bytes plus CRC exceed 64 bytes of storage
    rig.feed(&frame(&pattern(63)));

    assert_eq!(rec.reports(), vec![(RX_ERR, RxCause::TooLong.code())]);
    assert_eq!(rig.state(), RxState::Idle);
    sim(&uart, |u| {
        assert!(!u.errors_masked());
        assert!(!u.has_pending_irq());
    });

    rig.feed(&frame(b"HELLO"));
    assert_eq!(rec.reports().last(), Some(&(RX_DONE, 5)));
}

#[test]
fn test_short_length_field() {
    let (uart, buf, rec) = (sim_uart(), shared_buffer::<64>(), Recorder::default());
    let mut rig = Rig::new(&uart, &buf, &rec);
    // Three payload bytes, padded so the header trigger fires
    let mut bytes = frame(&[1, 2, 3]);
    bytes.push(0);

    rig.feed(&bytes);

    assert_eq!(rec.reports(), vec![(RX_ERR, RxCause::TooShort.code())]);
    assert!(with_buffer(&buf, |b| b.is_free()));
}

#[test]
fn test_truncated_frame_times_out() {
    let (uart, buf, rec) = (sim_uart(), shared_buffer::<64>(), Recorder::default());
    let mut rig = Rig::new(&uart, &buf, &rec);
    let bytes = frame(&pattern(40));

    rig.feed(&bytes[..30]);

    assert_eq!(rec.reports(), vec![(RX_RECEIVING, 0), (RX_ERR, RxCause::TooShort.code())]);
    assert_eq!(rig.state(), RxState::Idle);
    assert!(sim(&uart, |u| u.timeout_irq_enabled()));

    rig.feed(&frame(b"HELLO"));
    assert_eq!(rec.reports().last(), Some(&(RX_DONE, 5)));
}

#[test]
fn test_idle_timeout_waits_for_quiet_line() {
    let (uart, buf, rec) = (sim_uart(), shared_buffer::<64>(), Recorder::default());
    let mut rig = Rig::new(&uart, &buf, &rec);

    rig.feed(&[0xA5, 0x05, 0x01]);
    assert_eq!(rec.reports(), vec![(RX_ERR, RxCause::TooShort.code())]);
    assert_eq!(rig.state(), RxState::Error);
    assert!(sim(&uart, |u| u.errors_masked()));

    // The next burst only ends the error state
    rig.feed(&[0x00]);
    assert_eq!(rig.state(), RxState::Idle);

    rig.feed(&frame(b"HELLO"));
    assert_eq!(rec.reports().last(), Some(&(RX_DONE, 5)));
}

#[test]
fn test_line_error_masks_until_quiet() {
    let (uart, buf, rec) = (sim_uart(), shared_buffer::<64>(), Recorder::default());
    let mut rig = Rig::new(&uart, &buf, &rec);

    sim(&uart, |u| {
        u.inject(&[0xA5, 0x05]);
        u.step_rx_line();
        u.step_rx_line();
        u.inject_error(IrqStatus::PARITY);
    });
    assert!(rig.service());
    rig.deliver();

    assert_eq!(rec.reports(), vec![(RX_ERR, IrqStatus::PARITY.bits())]);
    assert_eq!(rig.state(), RxState::Error);
    sim(&uart, |u| {
        assert!(u.errors_masked());
        assert!(!u.rx_irq_enabled());
    });

    rig.pump();
    assert_eq!(rig.state(), RxState::Idle);
    sim(&uart, |u| {
        assert!(!u.errors_masked());
        assert!(u.rx_irq_enabled());
        assert_eq!(u.rx_fifo_len(), 0);
    });
}

#[test]
fn test_error_on_empty_fifo_is_ignored() {
    let (uart, buf, rec) = (sim_uart(), shared_buffer::<64>(), Recorder::default());
    let mut rig = Rig::new(&uart, &buf, &rec);

    sim(&uart, |u| u.inject_error(IrqStatus::BREAK));
    rig.pump();

    assert!(rec.reports().is_empty());
    assert_eq!(rig.state(), RxState::Idle);
}
