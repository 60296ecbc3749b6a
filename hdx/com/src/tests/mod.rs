mod rx_test;

use core::cell::RefCell;
use std::sync::Mutex;
use std::vec::Vec;

use hdx_core::{AoId, Event, EventSink, Fault, Signal};

use crate::sim::SimUart;
use crate::uart::SharedUart;

pub(crate) const HX: AoId = AoId::new(0);
pub(crate) const RX: AoId = AoId::new(1);
pub(crate) const TX: AoId = AoId::new(2);

/// Stands in for the kernel: keeps every posted event until a test takes it.
#[derive(Default)]
pub(crate) struct Recorder {
    log: Mutex<Vec<(AoId, Event)>>,
}

impl Recorder {
    /// Remove and return the events addressed to `target`
    pub(crate) fn take_for(&self, target: AoId) -> Vec<Event> {
        let mut log = self.log.lock().unwrap();
        let (mine, rest): (Vec<_>, Vec<_>) = log.drain(..).partition(|(id, _)| *id == target);
        *log = rest;
        mine.into_iter().map(|(_, e)| e).collect()
    }

    /// Reports delivered to the orchestrator so far, as `(signal, data)`
    pub(crate) fn reports(&self) -> Vec<(Signal, u16)> {
        self.log
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _)| *id == HX)
            .map(|(_, e)| (e.signal, e.data))
            .collect()
    }
}

impl EventSink for Recorder {
    fn post(&self, target: AoId, event: Event) -> Result<(), Fault> {
        self.log.lock().unwrap().push((target, event));
        Ok(())
    }
}

pub(crate) fn sim_uart() -> SharedUart<SimUart> {
    critical_section::Mutex::new(RefCell::new(SimUart::new()))
}

pub(crate) fn sim<R>(uart: &SharedUart<SimUart>, f: impl FnOnce(&mut SimUart) -> R) -> R {
    crate::uart::with_uart(uart, f)
}
