//! Half-duplex orchestrator
//!
//! ```text
//! Off
//! On
//!  ├─ Waiting ──GO──▶ Sending ──TX_DONE──▶ [ReceivingLoopback ──▶] Receiving
//!  └───────────────────◀──── report, error or timeout ◀─────────────┘
//! ```
//!
//! One exchange per `HX_GO`: the prepared transmit buffer is sent, then
//! exactly one answer frame is awaited. With loopback enabled, the echo of
//! the own frame is consumed first. Everything the application needs to know
//! is reported on its callback with an `HX_*` signal and a detail word.

use core::convert::Infallible;

use embedded_hal::digital::{ErrorType, OutputPin};
use hdx_core::{AoId, Callback, Context, Event, Signal};
use hdx_sm::{HierBehavior, Reaction, Targets};
use hdx_timer::{TimerFlags, TimerId, TimerService};

use crate::config::HxConfig;
use crate::frame::{with_buffer, SharedBuffer};
use crate::signals::*;
use crate::HX_TAG;

/// Nesting depth of the orchestrator's state machine
pub const HX_DEPTH: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HxState {
    Off,
    On,
    Waiting,
    Sending,
    ReceivingLoopback,
    Receiving,
}

/// Placeholder pin for links without an external line driver.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPin;

impl ErrorType for NoPin {
    type Error = Infallible;
}

impl OutputPin for NoPin {
    fn set_low(&mut self) -> Result<(), Infallible> {
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Infallible> {
        Ok(())
    }
}

/// Enable output of an external line driver, with its polarity.
#[derive(Debug)]
pub struct LineDriver<P> {
    pin: Option<P>,
    active_low: bool,
}

impl<P: OutputPin> LineDriver<P> {
    pub fn new(pin: Option<P>, active_low: bool) -> Self {
        Self { pin, active_low }
    }

    pub fn enable(&mut self) {
        self.drive(true);
    }

    pub fn disable(&mut self) {
        self.drive(false);
    }

    fn drive(&mut self, on: bool) {
        let Some(pin) = self.pin.as_mut() else {
            return;
        };
        let result = if on != self.active_low {
            pin.set_high()
        } else {
            pin.set_low()
        };
        if let Err(e) = result {
            log::error!("hx: line driver: {:?}", e);
        }
    }
}

/// Handles of the three objects forming a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PortIds {
    pub hx: AoId,
    pub rx: AoId,
    pub tx: AoId,
}

/// Orchestrator behavior, run inside an [`Hsm`](hdx_sm::Hsm) of depth
/// [`HX_DEPTH`].
pub struct HalfDuplex<'a, TP, RP, const N: usize> {
    ids: PortIds,
    timers: &'a dyn TimerService<'a>,
    timer: TimerId,
    /// Delivers timer expiries back to this object
    wake: Callback<'a>,
    consumer: Option<Callback<'a>>,
    rx_buf: &'a SharedBuffer<N>,
    tx_line: LineDriver<TP>,
    rx_line: LineDriver<RP>,
    config: HxConfig,
    /// The loopback frame arrived before `TX_DONE`
    lb_early: bool,
}

impl<'a, TP: OutputPin, RP: OutputPin, const N: usize> HalfDuplex<'a, TP, RP, N> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        ids: PortIds,
        timers: &'a dyn TimerService<'a>,
        timer: TimerId,
        wake: Callback<'a>,
        consumer: Option<Callback<'a>>,
        rx_buf: &'a SharedBuffer<N>,
        lines: (LineDriver<TP>, LineDriver<RP>),
        config: HxConfig,
    ) -> Self {
        let (tx_line, rx_line) = lines;
        Self {
            ids,
            timers,
            timer,
            wake,
            consumer,
            rx_buf,
            tx_line,
            rx_line,
            config,
            lb_early: false,
        }
    }

    pub fn ids(&self) -> PortIds {
        self.ids
    }

    fn report(&self, signal: Signal, data: u16) {
        log::debug!("hx: report {} ({:#06x})", signal, data);
        if let Some(consumer) = self.consumer {
            if let Err(fault) = consumer.invoke(Event::with_data(signal, data)) {
                log::error!("hx: {} not delivered: {}", signal, fault);
            }
        }
    }

    fn clear_rx(&self) {
        with_buffer(self.rx_buf, |b| b.clear());
    }

    fn stop_timer(&self) {
        if let Err(e) = self.timers.stop(self.timer) {
            log::error!("hx: stopping {}: {}", self.timer, e);
        }
    }

    fn arm(&self, us: u32, signal: Signal) {
        let armed = self
            .timers
            .set(self.timer, us, TimerFlags::SINGLE_SHOT, Some(self.wake), Event::new(signal))
            .and_then(|()| self.timers.start(self.timer));
        if let Err(e) = armed {
            log::error!("hx: arming {} for {}us: {}", self.timer, us, e);
        }
    }

    fn send_go(&self, ctx: &Context<'_>) {
        if let Err(fault) = ctx.post(self.ids.tx, Event::new(TX_GO)) {
            log::error!("hx: TX_GO lost: {}", fault);
        }
    }

    fn to_waiting(next: &mut Targets<'_, HxState>) -> Reaction {
        next.set(1, HxState::Waiting);
        Reaction::tran(1)
    }

    fn off(&mut self, next: &mut Targets<'_, HxState>, event: &Event) -> Reaction {
        match event.signal {
            Signal::ENTRY => {
                self.tx_line.disable();
                self.rx_line.disable();
                Reaction::Handled
            }
            HX_ON => {
                self.clear_rx();
                next.set(0, HxState::On);
                Reaction::tran(0)
            }
            _ => Reaction::Unhandled,
        }
    }

    fn on(&mut self, next: &mut Targets<'_, HxState>, event: &Event) -> Reaction {
        match event.signal {
            Signal::INIT => {
                next.set(1, HxState::Waiting);
                Reaction::Handled
            }
            HX_OFF => {
                self.stop_timer();
                next.set(0, HxState::Off);
                Reaction::tran(0)
            }
            // Header notifications only matter while an answer is awaited
            RX_RECEIVING => Reaction::Handled,
            _ => Reaction::Unhandled,
        }
    }

    fn waiting(&mut self, next: &mut Targets<'_, HxState>, event: &Event) -> Reaction {
        match event.signal {
            Signal::ENTRY => {
                self.stop_timer();
                Reaction::Handled
            }
            HX_GO => {
                next.set(1, HxState::Sending);
                Reaction::tran(1)
            }
            RX_DONE => {
                self.clear_rx();
                self.report(HX_INV_RX, InvalidRx::WaitingRx as u16);
                Reaction::Handled
            }
            RX_ERR => {
                self.report(HX_INV_RX, detail(InvalidRx::WaitingErr as u16, event.data));
                Reaction::Handled
            }
            _ => Reaction::Unhandled,
        }
    }

    fn sending(&mut self, ctx: &Context<'_>, next: &mut Targets<'_, HxState>, event: &Event) -> Reaction {
        match event.signal {
            Signal::ENTRY => {
                self.tx_line.enable();
                if self.config.tx_delay_us > 0 {
                    self.arm(u32::from(self.config.tx_delay_us), HX_TX_DELAY);
                } else {
                    self.send_go(ctx);
                }
                Reaction::Handled
            }
            Signal::EXIT => {
                self.lb_early = false;
                self.tx_line.disable();
                Reaction::Handled
            }
            HX_TX_DELAY => {
                self.send_go(ctx);
                Reaction::Handled
            }
            TX_DONE => {
                if self.config.response_timeout_ms > 0 {
                    self.arm(u32::from(self.config.response_timeout_ms) * 1000, HX_TIMEOUT);
                }
                let target = if self.config.loopback && !self.lb_early {
                    HxState::ReceivingLoopback
                } else {
                    HxState::Receiving
                };
                next.set(1, target);
                Reaction::tran(1)
            }
            TX_ERR => {
                self.report(HX_ERR, detail(HxErrLeg::Transmit as u16, event.data));
                Self::to_waiting(next)
            }
            RX_DONE => {
                self.clear_rx();
                if self.config.loopback {
                    self.lb_early = true;
                } else {
                    self.report(HX_INV_RX, InvalidRx::SendingRx as u16);
                }
                Reaction::Handled
            }
            RX_ERR if self.config.loopback => {
                self.report(HX_ERR, detail(HxErrLeg::Loopback as u16, event.data));
                if let Err(fault) = ctx.post(self.ids.tx, Event::new(TX_STOP)) {
                    log::error!("hx: TX_STOP lost: {}", fault);
                }
                Self::to_waiting(next)
            }
            RX_ERR => {
                self.report(HX_INV_RX, detail(InvalidRx::SendingErr as u16, event.data));
                Reaction::Handled
            }
            _ => Reaction::Unhandled,
        }
    }

    fn receiving_loopback(&mut self, next: &mut Targets<'_, HxState>, event: &Event) -> Reaction {
        match event.signal {
            HX_TIMEOUT => {
                self.report(HX_NO_RESPONSE, NoResponse::Loopback as u16);
                Self::to_waiting(next)
            }
            RX_ERR => {
                self.report(HX_ERR, detail(HxErrLeg::Loopback as u16, event.data));
                Self::to_waiting(next)
            }
            RX_DONE => {
                self.clear_rx();
                next.set(1, HxState::Receiving);
                Reaction::tran(1)
            }
            _ => Reaction::Unhandled,
        }
    }

    fn receiving(&mut self, next: &mut Targets<'_, HxState>, event: &Event) -> Reaction {
        match event.signal {
            Signal::ENTRY => {
                self.rx_line.enable();
                Reaction::Handled
            }
            Signal::EXIT => {
                self.rx_line.disable();
                Reaction::Handled
            }
            HX_TIMEOUT => {
                self.report(HX_NO_RESPONSE, NoResponse::Receive as u16);
                Self::to_waiting(next)
            }
            RX_ERR => {
                self.report(HX_ERR, detail(HxErrLeg::Receive as u16, event.data));
                Self::to_waiting(next)
            }
            RX_RECEIVING => {
                self.stop_timer();
                Reaction::Handled
            }
            RX_DONE => {
                self.report(HX_RX, event.data);
                Self::to_waiting(next)
            }
            _ => Reaction::Unhandled,
        }
    }
}

impl<TP: OutputPin, RP: OutputPin, const N: usize> HierBehavior for HalfDuplex<'_, TP, RP, N> {
    type State = HxState;

    fn on_event(
        &mut self,
        ctx: &Context<'_>,
        next: &mut Targets<'_, HxState>,
        state: HxState,
        event: &Event,
    ) -> Reaction {
        if event.signal == Signal::ENTRY {
            log::debug!("hx: enter {:?}", state);
        }
        match state {
            HxState::Off => self.off(next, event),
            HxState::On => self.on(next, event),
            HxState::Waiting => self.waiting(next, event),
            HxState::Sending => self.sending(ctx, next, event),
            HxState::ReceivingLoopback => self.receiving_loopback(next, event),
            HxState::Receiving => self.receiving(next, event),
        }
    }

    fn on_unhandled(&mut self, _ctx: &Context<'_>, event: &Event) {
        if event.signal == HX_GO {
            log::warn!("hx: GO ignored, exchange in progress or link off");
        }
    }

    fn type_tag(&self) -> u8 {
        HX_TAG
    }
}
