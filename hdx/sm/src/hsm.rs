//! Hierarchical state machines
//!
//! The machine keeps one slot per nesting level (0 is outermost). Each slot
//! holds the state currently entered at that level and, during a transition,
//! the pending state to enter there next. Handlers name pending states through
//! [`Targets`] and ask for a transition by returning [`Reaction::Transition`]
//! with the number of outer levels to keep.
//!
//! Dispatch walks from the deepest entered level outward until a handler
//! reports [`Reaction::Handled`] or transitions. An event nobody handles is
//! counted and passed to [`HierBehavior::on_unhandled`].

use core::fmt;

use hdx_core::{ActiveObject, Context, Event, Signal};

/// Outcome of a hierarchical state handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reaction {
    /// Event consumed, stop propagating
    Handled,
    /// Let the enclosing level try
    Unhandled,
    /// Exit every level at or below `keep`, then enter the pending states
    /// starting at level `keep`. With `local`, level `keep - 1` receives
    /// `INIT` before the entry sequence runs.
    Transition { keep: usize, local: bool },
}

impl Reaction {
    /// Transition that keeps the `keep` outermost levels
    pub const fn tran(keep: usize) -> Self {
        Reaction::Transition { keep, local: false }
    }

    /// Local transition: the deepest kept level is re-initialized
    pub const fn tran_local(keep: usize) -> Self {
        Reaction::Transition { keep, local: true }
    }

    /// Reserved signal describing this reaction
    pub const fn signal(self) -> Signal {
        match self {
            Reaction::Handled => Signal::HANDLED,
            Reaction::Unhandled => Signal::NONE,
            Reaction::Transition { .. } => Signal::TRAN,
        }
    }
}

/// Pending-next slots, as seen by a handler.
pub struct Targets<'s, S> {
    next: &'s mut [Option<S>],
}

impl<'s, S: Copy + fmt::Debug> Targets<'s, S> {
    /// Schedule `state` to be entered at `level` by the next entry sequence
    pub fn set(&mut self, level: usize, state: S) {
        match self.next.get_mut(level) {
            Some(slot) => *slot = Some(state),
            None => log::error!("{:?}: level {} exceeds machine depth", state, level),
        }
    }

    pub fn get(&self, level: usize) -> Option<S> {
        self.next.get(level).copied().flatten()
    }
}

/// Behavior of a hierarchical machine.
pub trait HierBehavior {
    type State: Copy + PartialEq + fmt::Debug;

    fn on_event(
        &mut self,
        ctx: &Context<'_>,
        next: &mut Targets<'_, Self::State>,
        state: Self::State,
        event: &Event,
    ) -> Reaction;

    /// Called for events that reached the outermost level unhandled
    fn on_unhandled(&mut self, _ctx: &Context<'_>, _event: &Event) {}

    fn type_tag(&self) -> u8 {
        0
    }
}

/// Hierarchical dispatch engine with `DEPTH` nesting levels.
pub struct Hsm<B: HierBehavior, const DEPTH: usize> {
    behavior: B,
    current: [Option<B::State>; DEPTH],
    next: [Option<B::State>; DEPTH],
    /// Number of entered levels
    depth: usize,
    unhandled: u32,
}

impl<B: HierBehavior, const DEPTH: usize> Hsm<B, DEPTH> {
    /// Create a machine whose outermost level starts in `top`
    pub fn new(behavior: B, top: B::State) -> Self {
        let mut next = [None; DEPTH];
        if let Some(slot) = next.first_mut() {
            *slot = Some(top);
        }
        Self {
            behavior,
            current: [None; DEPTH],
            next,
            depth: 0,
            unhandled: 0,
        }
    }

    /// Number of currently entered levels
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// State entered at `level`, if that level is active
    pub fn state_at(&self, level: usize) -> Option<B::State> {
        if level < self.depth {
            self.current[level]
        } else {
            None
        }
    }

    /// Deepest entered state
    pub fn leaf(&self) -> Option<B::State> {
        self.depth.checked_sub(1).and_then(|l| self.current[l])
    }

    pub fn behavior(&self) -> &B {
        &self.behavior
    }

    pub fn behavior_mut(&mut self) -> &mut B {
        &mut self.behavior
    }

    /// Events dropped after reaching the outermost level
    pub fn unhandled(&self) -> u32 {
        self.unhandled
    }

    fn call(&mut self, ctx: &Context<'_>, state: B::State, event: &Event) -> Reaction {
        let mut targets = Targets { next: &mut self.next[..] };
        self.behavior.on_event(ctx, &mut targets, state, event)
    }

    fn signal_state(&mut self, ctx: &Context<'_>, level: usize, event: &Event) {
        let Some(state) = self.current[level] else {
            return;
        };
        if let Reaction::Transition { .. } = self.call(ctx, state, event) {
            log::error!("{:?}: transition from {} ignored", state, event.signal);
        }
    }

    /// Enter pending states from `level` inward.
    fn enter_from(&mut self, ctx: &Context<'_>, mut level: usize) {
        while level < DEPTH {
            let Some(state) = self.next[level].take() else {
                break;
            };
            self.current[level] = Some(state);
            self.depth = level + 1;
            self.signal_state(ctx, level, &Event::ENTRY);
            if level + 1 < DEPTH && self.next[level + 1].is_none() {
                self.signal_state(ctx, level, &Event::INIT);
            }
            level += 1;
        }
    }

    fn transition(&mut self, ctx: &Context<'_>, from: usize, keep: usize, local: bool) {
        let keep = if keep > from + 1 {
            log::warn!("transition from level {} cannot keep {} levels", from, keep);
            from + 1
        } else {
            keep
        };
        for level in (keep..self.depth).rev() {
            self.signal_state(ctx, level, &Event::EXIT);
        }
        if local && keep > 0 {
            self.signal_state(ctx, keep - 1, &Event::INIT);
        }
        self.depth = keep;
        self.enter_from(ctx, keep);
    }
}

impl<B: HierBehavior, const DEPTH: usize> ActiveObject for Hsm<B, DEPTH> {
    fn start(&mut self, ctx: &Context<'_>) {
        self.enter_from(ctx, 0);
    }

    fn dispatch(&mut self, ctx: &Context<'_>, event: Event) {
        let mut level = self.depth;
        while level > 0 {
            level -= 1;
            let Some(state) = self.current[level] else {
                continue;
            };
            match self.call(ctx, state, &event) {
                Reaction::Handled => return,
                Reaction::Unhandled => {}
                Reaction::Transition { keep, local } => {
                    self.transition(ctx, level, keep, local);
                    return;
                }
            }
        }
        self.unhandled = self.unhandled.wrapping_add(1);
        log::debug!("{:?}: dropped unhandled {}", self.leaf(), event.signal);
        self.behavior.on_unhandled(ctx, &event);
    }

    fn type_tag(&self) -> u8 {
        self.behavior.type_tag()
    }
}
