//! Flat state machines

use core::fmt;

use hdx_core::{ActiveObject, Context, Event};

/// Outcome of a flat state handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step<S> {
    /// Event consumed
    Handled,
    /// Event not relevant in this state
    Ignored,
    /// Leave the current state and enter `S`
    Tran(S),
}

/// Behavior of a flat machine: one handler, selected by the current state.
pub trait FlatBehavior {
    type State: Copy + PartialEq + fmt::Debug;

    /// Top-level initial action, run once before the initial state is entered
    fn on_start(&mut self, _ctx: &Context<'_>) {}

    fn on_event(
        &mut self,
        ctx: &Context<'_>,
        state: Self::State,
        event: &Event,
    ) -> Step<Self::State>;

    fn type_tag(&self) -> u8 {
        0
    }
}

/// Flat dispatch engine.
///
/// A transition runs the old state's `EXIT`, swaps the state and runs the new
/// state's `ENTRY`. Transitions requested from `ENTRY` or `EXIT` are ignored.
pub struct Stm<B: FlatBehavior> {
    behavior: B,
    state: B::State,
    ignored: u32,
}

impl<B: FlatBehavior> Stm<B> {
    pub fn new(behavior: B, initial: B::State) -> Self {
        Self {
            behavior,
            state: initial,
            ignored: 0,
        }
    }

    pub fn state(&self) -> B::State {
        self.state
    }

    pub fn behavior(&self) -> &B {
        &self.behavior
    }

    pub fn behavior_mut(&mut self) -> &mut B {
        &mut self.behavior
    }

    /// Number of events that no state reacted to
    pub fn ignored(&self) -> u32 {
        self.ignored
    }

    fn signal_state(&mut self, ctx: &Context<'_>, event: &Event) {
        if let Step::Tran(target) = self.behavior.on_event(ctx, self.state, event) {
            log::error!(
                "{:?}: transition to {:?} requested from {} ignored",
                self.state,
                target,
                event.signal
            );
        }
    }

    /// Run the `EXIT`/`ENTRY` pair for a transition to `target`
    pub fn transition(&mut self, ctx: &Context<'_>, target: B::State) {
        self.signal_state(ctx, &Event::EXIT);
        self.state = target;
        self.signal_state(ctx, &Event::ENTRY);
    }
}

impl<B: FlatBehavior> ActiveObject for Stm<B> {
    fn start(&mut self, ctx: &Context<'_>) {
        self.behavior.on_start(ctx);
        self.signal_state(ctx, &Event::ENTRY);
    }

    fn dispatch(&mut self, ctx: &Context<'_>, event: Event) {
        match self.behavior.on_event(ctx, self.state, &event) {
            Step::Handled => {}
            Step::Ignored => {
                self.ignored = self.ignored.wrapping_add(1);
                log::trace!("{:?}: ignored {}", self.state, event.signal);
            }
            Step::Tran(target) => self.transition(ctx, target),
        }
    }

    fn type_tag(&self) -> u8 {
        self.behavior.type_tag()
    }
}
