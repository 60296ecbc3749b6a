//! Re-entry guard for a timer bank's rescheduling pass

use core::cell::Cell;

use critical_section::{CriticalSection, Mutex};

/// Two-flag guard serializing the rescheduling pass of one bank.
///
/// Only one pass runs at a time. A caller that finds a pass already active,
/// from a timer callback or from the bank's interrupt, does not run its own:
/// it leaves a request behind, and the active pass repeats its final step
/// until a full iteration completed without new requests.
#[derive(Debug)]
pub struct ReentryGuard {
    active: Mutex<Cell<bool>>,
    requested: Mutex<Cell<bool>>,
}

impl ReentryGuard {
    pub const fn new() -> Self {
        Self {
            active: Mutex::new(Cell::new(false)),
            requested: Mutex::new(Cell::new(false)),
        }
    }

    /// Begin a pass, or record a request if one is already running.
    pub fn try_enter(&self) -> Option<PassToken<'_>> {
        critical_section::with(|cs| {
            if self.active.borrow(cs).get() {
                self.requested.borrow(cs).set(true);
                None
            } else {
                self.active.borrow(cs).set(true);
                Some(PassToken { guard: self })
            }
        })
    }

    pub fn is_active(&self, cs: CriticalSection<'_>) -> bool {
        self.active.borrow(cs).get()
    }

    pub fn is_requested(&self) -> bool {
        critical_section::with(|cs| self.requested.borrow(cs).get())
    }
}

impl Default for ReentryGuard {
    fn default() -> Self {
        Self::new()
    }
}

/// Proof of an active pass. Dropping it ends the pass.
#[derive(Debug)]
pub struct PassToken<'g> {
    guard: &'g ReentryGuard,
}

impl PassToken<'_> {
    /// Run `pass` until an iteration finishes without a re-entrant request.
    pub fn settle<R>(&self, mut pass: impl FnMut() -> R) -> R {
        loop {
            critical_section::with(|cs| self.guard.requested.borrow(cs).set(false));
            let out = pass();
            if !self.guard.is_requested() {
                return out;
            }
        }
    }
}

impl Drop for PassToken<'_> {
    fn drop(&mut self) {
        critical_section::with(|cs| self.guard.active.borrow(cs).set(false));
    }
}
