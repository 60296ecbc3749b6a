//! Active objects and the delivery contract between them

use core::fmt;

use crate::{Event, Fault};

/// Stable handle of a registered active object.
///
/// Handles are issued in registration order and never change, even though the
/// scheduler keeps its own priority-sorted table internally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AoId(u8);

impl AoId {
    pub const fn new(raw: u8) -> Self {
        AoId(raw)
    }

    pub const fn raw(self) -> u8 {
        self.0
    }

    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for AoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AO#{}", self.0)
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for AoId {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "AO#{=u8}", self.0);
    }
}

/// Something that accepts events addressed to active objects.
///
/// `post` always queues. `dispatch` may run the target synchronously when it
/// outranks whatever is currently executing; sinks without that notion fall
/// back to queueing.
pub trait EventSink: Sync {
    fn post(&self, target: AoId, event: Event) -> Result<(), Fault>;

    fn dispatch(&self, target: AoId, event: Event) -> Result<(), Fault> {
        self.post(target, event)
    }
}

/// How a [`Callback`] hands its event to the sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Route {
    Post,
    Dispatch,
}

/// A delivery function bound to a handle.
///
/// Drivers report to their consumer through one of these, so the same driver
/// can feed a mailbox or notify synchronously without knowing which.
#[derive(Clone, Copy)]
pub struct Callback<'a> {
    sink: &'a dyn EventSink,
    target: AoId,
    route: Route,
}

impl<'a> Callback<'a> {
    /// Deliver by queueing into the target's mailbox
    pub fn post(sink: &'a dyn EventSink, target: AoId) -> Self {
        Self { sink, target, route: Route::Post }
    }

    /// Deliver synchronously when priorities allow
    pub fn dispatch(sink: &'a dyn EventSink, target: AoId) -> Self {
        Self { sink, target, route: Route::Dispatch }
    }

    pub fn target(&self) -> AoId {
        self.target
    }

    pub fn route(&self) -> Route {
        self.route
    }

    pub fn invoke(&self, event: Event) -> Result<(), Fault> {
        match self.route {
            Route::Post => self.sink.post(self.target, event),
            Route::Dispatch => self.sink.dispatch(self.target, event),
        }
    }
}

impl fmt::Debug for Callback<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callback")
            .field("target", &self.target)
            .field("route", &self.route)
            .finish_non_exhaustive()
    }
}

/// What a running state handler sees of the kernel.
#[derive(Clone, Copy)]
pub struct Context<'k> {
    sink: &'k dyn EventSink,
    me: AoId,
}

impl<'k> Context<'k> {
    pub fn new(sink: &'k dyn EventSink, me: AoId) -> Self {
        Self { sink, me }
    }

    /// Handle of the object being dispatched
    pub fn id(&self) -> AoId {
        self.me
    }

    pub fn sink(&self) -> &'k dyn EventSink {
        self.sink
    }

    pub fn post(&self, target: AoId, event: Event) -> Result<(), Fault> {
        self.sink.post(target, event)
    }

    pub fn dispatch(&self, target: AoId, event: Event) -> Result<(), Fault> {
        self.sink.dispatch(target, event)
    }

    /// Queue an event to the running object itself
    pub fn post_self(&self, event: Event) -> Result<(), Fault> {
        self.sink.post(self.me, event)
    }
}

impl fmt::Debug for Context<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context").field("me", &self.me).finish_non_exhaustive()
    }
}

/// An independently scheduled state machine.
///
/// The kernel calls `start` once at registration and `dispatch` once per
/// queued event.
pub trait ActiveObject {
    /// Take the initial transition and enter the initial state(s)
    fn start(&mut self, ctx: &Context<'_>);

    /// Process one event to completion
    fn dispatch(&mut self, ctx: &Context<'_>, event: Event);

    /// Application-defined type tag, reported by the kernel's queries
    fn type_tag(&self) -> u8 {
        0
    }
}
