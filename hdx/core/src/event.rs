//! Events and signals

use core::fmt;

/// Discriminant of an event.
///
/// Negative values are reserved for framework pseudo-signals; non-negative
/// values are user signals, namespaced per active-object type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Signal(i16);

impl Signal {
    /// Placeholder carried by unused mailbox slots
    pub const NONE: Signal = Signal(-6);
    /// Marks an event that requested a state transition
    pub const TRAN: Signal = Signal(-5);
    /// Sent to a state when it is entered
    pub const ENTRY: Signal = Signal(-4);
    /// Sent to a state after entry to select its initial substate
    pub const INIT: Signal = Signal(-3);
    /// Marks an event consumed by a hierarchical state
    pub const HANDLED: Signal = Signal(-2);
    /// Sent to a state when it is left
    pub const EXIT: Signal = Signal(-1);
    /// First value available to applications
    pub const FIRST_USER: Signal = Signal(0);

    /// Create a user signal. Panics at compile time when used in a const
    /// context with a negative value.
    pub const fn new(value: i16) -> Self {
        assert!(value >= 0, "user signals must be non-negative");
        Signal(value)
    }

    /// Raw signal value
    pub const fn raw(self) -> i16 {
        self.0
    }

    /// True for framework pseudo-signals
    pub const fn is_reserved(self) -> bool {
        self.0 < 0
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Signal::NONE => f.write_str("NONE"),
            Signal::TRAN => f.write_str("TRAN"),
            Signal::ENTRY => f.write_str("ENTRY"),
            Signal::INIT => f.write_str("INIT"),
            Signal::HANDLED => f.write_str("HANDLED"),
            Signal::EXIT => f.write_str("EXIT"),
            Signal(n) => write!(f, "SIG{}", n),
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Signal {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "Signal({=i16})", self.0);
    }
}

/// Opaque pointer-sized reference carried alongside an event.
///
/// The kernel never interprets it; sender and receiver agree on its meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ObjRef(pub usize);

/// A message passed by value between active objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Event {
    pub signal: Signal,
    pub data: u16,
    pub obj: Option<ObjRef>,
}

impl Event {
    /// Filler for mailbox storage
    pub const EMPTY: Event = Event::reserved(Signal::NONE);
    pub const ENTRY: Event = Event::reserved(Signal::ENTRY);
    pub const EXIT: Event = Event::reserved(Signal::EXIT);
    pub const INIT: Event = Event::reserved(Signal::INIT);

    const fn reserved(signal: Signal) -> Self {
        Self { signal, data: 0, obj: None }
    }

    /// Event with a signal and no payload
    pub const fn new(signal: Signal) -> Self {
        Self { signal, data: 0, obj: None }
    }

    /// Event with a signal and a data word
    pub const fn with_data(signal: Signal, data: u16) -> Self {
        Self { signal, data, obj: None }
    }

    /// Attach an opaque reference
    pub const fn with_obj(mut self, obj: ObjRef) -> Self {
        self.obj = Some(obj);
        self
    }
}

impl Default for Event {
    fn default() -> Self {
        Self::EMPTY
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserved_signals_are_negative() {
        for sig in [
            Signal::NONE,
            Signal::TRAN,
            Signal::ENTRY,
            Signal::INIT,
            Signal::HANDLED,
            Signal::EXIT,
        ] {
            assert!(sig.is_reserved());
        }
        assert!(!Signal::FIRST_USER.is_reserved());
        assert!(!Signal::new(42).is_reserved());
    }

    #[test]
    fn test_event_builders() {
        let e = Event::with_data(Signal::new(3), 0x1234).with_obj(ObjRef(7));
        assert_eq!(e.signal, Signal::new(3));
        assert_eq!(e.data, 0x1234);
        assert_eq!(e.obj, Some(ObjRef(7)));
        assert_eq!(Event::default(), Event::EMPTY);
    }
}
