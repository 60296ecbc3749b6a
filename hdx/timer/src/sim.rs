//! Simulated countdown timers for host tests and bench runs

use crate::{CountdownTimer, TimerDaemon, BANKS};

/// A countdown timer driven by [`TimerDaemon::advance`] instead of a clock.
#[derive(Debug, Clone, Default)]
pub struct SimCountdown {
    reload: u32,
    counter: u32,
    enabled: bool,
    expired: bool,
    arms: u32,
}

impl SimCountdown {
    pub const fn new() -> Self {
        Self {
            reload: 0,
            counter: 0,
            enabled: false,
            expired: false,
            arms: 0,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Number of times the timer was loaded
    pub fn arms(&self) -> u32 {
        self.arms
    }

    /// Ticks until expiry while enabled
    pub fn due_in(&self) -> Option<u32> {
        self.enabled.then_some(self.counter)
    }

    fn tick(&mut self, ticks: u32) {
        if !self.enabled {
            return;
        }
        self.counter = self.counter.saturating_sub(ticks);
        if self.counter == 0 {
            self.enabled = false;
            self.expired = true;
        }
    }

    fn take_expired(&mut self) -> bool {
        core::mem::take(&mut self.expired)
    }
}

impl CountdownTimer for SimCountdown {
    fn disable(&mut self) {
        self.enabled = false;
        self.expired = false;
    }

    fn reload_value(&self) -> u32 {
        self.reload
    }

    fn counter(&self) -> u32 {
        self.counter
    }

    fn arm(&mut self, ticks: u32) {
        self.reload = ticks;
        self.counter = ticks;
        self.enabled = true;
        self.expired = false;
        self.arms += 1;
    }
}

impl<'a, const SLOTS: usize> TimerDaemon<'a, SimCountdown, SLOTS> {
    /// Two idle simulated banks
    pub fn simulated() -> Self {
        Self::new([SimCountdown::new(), SimCountdown::new()])
    }

    /// Let `us` microseconds pass, raising every expiry interrupt on the way
    /// in time order.
    pub fn advance(&self, us: u32) {
        let mut left = us;
        loop {
            let step = (0..BANKS)
                .filter_map(|bank| self.with_hardware(bank, |hw| hw.due_in()).flatten())
                .min()
                .map_or(left, |due| due.min(left));
            for bank in 0..BANKS {
                self.with_hardware(bank, |hw| hw.tick(step));
            }
            left -= step;
            for bank in 0..BANKS {
                if self.with_hardware(bank, SimCountdown::take_expired) == Some(true) {
                    self.on_timeout(bank);
                }
            }
            if left == 0 {
                return;
            }
        }
    }
}
