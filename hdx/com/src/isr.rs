//! UART interrupt service routine

use hdx_core::{AoId, Event, EventSink};

use crate::signals::{RX_DATA, RX_ERROR, RX_TIMEOUT, TX_EOT};
use crate::uart::{with_uart, IrqStatus, SharedUart, UartPort};

/// Handles of the objects the interrupt handler feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IsrLinks {
    pub rx: AoId,
    pub tx: AoId,
}

/// Acknowledge the UART's pending interrupts and post the matching events.
///
/// Call from the UART interrupt handler. The receive and timeout interrupts
/// are disabled when they fire; the receiver re-enables them after handling
/// the event. Returns the causes that were serviced.
pub fn service<U: UartPort>(uart: &SharedUart<U>, sink: &dyn EventSink, links: IsrLinks) -> IrqStatus {
    let status = with_uart(uart, |u| {
        let status = u.take_irqs();
        if status.contains(IrqStatus::RX) {
            u.disable_rx_irq();
        }
        if status.contains(IrqStatus::TIMEOUT) {
            u.disable_timeout_irq();
        }
        status
    });

    let errors = status.errors();
    if !errors.is_empty() {
        deliver(sink, links.rx, Event::with_data(RX_ERROR, errors.bits()));
    }
    if status.contains(IrqStatus::RX) {
        deliver(sink, links.rx, Event::new(RX_DATA));
    }
    if status.contains(IrqStatus::TIMEOUT) {
        deliver(sink, links.rx, Event::new(RX_TIMEOUT));
    }
    if status.contains(IrqStatus::TX) {
        deliver(sink, links.tx, Event::new(TX_EOT));
    }
    status
}

fn deliver(sink: &dyn EventSink, target: AoId, event: Event) {
    if let Err(fault) = sink.post(target, event) {
        log::error!("uart isr: {} lost: {}", event.signal, fault);
    }
}
