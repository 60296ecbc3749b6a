//! Wiring of one half-duplex link

use embedded_hal::digital::OutputPin;
use hdx_core::{Callback, Event};
use hdx_kernel::Kernel;
use hdx_sm::{Hsm, Stm};
use hdx_timer::{TimerFlags, TimerService};

use crate::config::{HxConfig, MAX_QUEUE};
use crate::frame::SharedBuffer;
use crate::hx::{HalfDuplex, HxState, LineDriver, PortIds, HX_DEPTH};
use crate::isr::IsrLinks;
use crate::rx::{Receiver, RxState};
use crate::signals::HX_TIMEOUT;
use crate::tx::{Transmitter, TxState};
use crate::uart::{SharedUart, UartPort};
use crate::SetupError;

/// Peripherals and buffers a link runs on.
///
/// `N` is the receive buffer size and must hold the largest expected payload
/// plus two CRC bytes. `M` is the transmit buffer size.
pub struct HxPeripherals<'a, U, TP, RP, const N: usize, const M: usize> {
    pub uart: &'a SharedUart<U>,
    pub rx_buf: &'a SharedBuffer<N>,
    pub tx_buf: &'a SharedBuffer<M>,
    /// Transmit line driver enable, if the board has one
    pub tx_enable: Option<TP>,
    /// Receive line driver enable, if the board has one
    pub rx_enable: Option<RP>,
}

/// The orchestrator, receiver and transmitter of one link together with
/// their mailbox storage.
///
/// ```ignore
/// let mut port = HalfDuplexPort::new(&kernel, &timers, peripherals, config, Some(app))?;
/// let ids = port.register(&kernel)?;
/// kernel.post(ids.hx, Event::new(HX_ON))?;
/// ```
pub struct HalfDuplexPort<'a, U, TP, RP, const N: usize, const M: usize>
where
    U: UartPort,
    TP: OutputPin,
    RP: OutputPin,
{
    ids: PortIds,
    config: HxConfig,
    hx: Hsm<HalfDuplex<'a, TP, RP, N>, HX_DEPTH>,
    rx: Stm<Receiver<'a, U, N>>,
    tx: Stm<Transmitter<'a, U, M>>,
    hx_events: [Event; MAX_QUEUE],
    rx_events: [Event; MAX_QUEUE],
    tx_events: [Event; MAX_QUEUE],
}

impl<'a, U, TP, RP, const N: usize, const M: usize> HalfDuplexPort<'a, U, TP, RP, N, M>
where
    U: UartPort + Send + 'a,
    TP: OutputPin + Send + 'a,
    RP: OutputPin + Send + 'a,
{
    /// Reserve handles for the three objects, allocate the link's timer and
    /// build the state machines. Nothing runs until [`register`](Self::register).
    pub fn new(
        kernel: &'a Kernel<'a>,
        timers: &'a dyn TimerService<'a>,
        hw: HxPeripherals<'a, U, TP, RP, N, M>,
        config: HxConfig,
        consumer: Option<Callback<'a>>,
    ) -> Result<Self, SetupError> {
        config.validate()?;
        let ids = PortIds {
            hx: kernel.reserve()?,
            rx: kernel.reserve()?,
            tx: kernel.reserve()?,
        };
        let wake = Callback::post(kernel, ids.hx);
        let timer = timers.create(1, TimerFlags::SINGLE_SHOT, Some(wake), Event::new(HX_TIMEOUT))?;
        let lines = (
            LineDriver::new(hw.tx_enable, config.tx_active_low),
            LineDriver::new(hw.rx_enable, config.rx_active_low),
        );
        let hx = HalfDuplex::new(ids, timers, timer, wake, consumer, hw.rx_buf, lines, config);

        Ok(Self {
            ids,
            config,
            hx: Hsm::new(hx, HxState::Off),
            rx: Stm::new(Receiver::new(hw.uart, hw.rx_buf, Some(wake)), RxState::Idle),
            tx: Stm::new(Transmitter::new(hw.uart, hw.tx_buf, Some(wake)), TxState::Idle),
            hx_events: [Event::EMPTY; MAX_QUEUE],
            rx_events: [Event::EMPTY; MAX_QUEUE],
            tx_events: [Event::EMPTY; MAX_QUEUE],
        })
    }

    pub fn ids(&self) -> PortIds {
        self.ids
    }

    /// Handles the UART interrupt handler posts to
    pub fn isr_links(&self) -> IsrLinks {
        IsrLinks {
            rx: self.ids.rx,
            tx: self.ids.tx,
        }
    }

    /// Register all three objects with `kernel` at the configured priority.
    ///
    /// The link starts in its off state; post `HX_ON` to the orchestrator to
    /// bring it up.
    pub fn register(&'a mut self, kernel: &Kernel<'a>) -> Result<PortIds, SetupError> {
        let Self {
            ids,
            config,
            hx,
            rx,
            tx,
            hx_events,
            rx_events,
            tx_events,
        } = self;
        kernel.register_reserved(ids.rx, rx, &mut rx_events[..config.rx_mailbox], config.priority)?;
        kernel.register_reserved(ids.tx, tx, &mut tx_events[..config.tx_mailbox], config.priority)?;
        kernel.register_reserved(ids.hx, hx, &mut hx_events[..config.hx_mailbox], config.priority)?;
        log::info!("hx: link registered as {}/{}/{}", ids.hx, ids.rx, ids.tx);
        Ok(*ids)
    }
}
