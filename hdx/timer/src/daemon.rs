//! Software timers multiplexed onto the hardware banks

use core::cell::RefCell;

use critical_section::Mutex;
use hdx_core::{Callback, Event};
use heapless::Vec;

use crate::{
    CountdownTimer, ReentryGuard, TimerError, TimerFlags, TimerId, TimerState, BANKS, DEFAULT_SLOTS,
};

#[derive(Debug, Clone, Copy)]
struct Timer<'a> {
    period: u32,
    remaining: u32,
    callback: Option<Callback<'a>>,
    /// Template; each expiry delivers a copy
    event: Event,
    flags: TimerFlags,
    state: TimerState,
    generation: u16,
}

impl<'a> Timer<'a> {
    const EMPTY: Self = Self {
        period: 0,
        remaining: 0,
        callback: None,
        event: Event::EMPTY,
        flags: TimerFlags::SINGLE_SHOT,
        state: TimerState::Empty,
        generation: 0,
    };

    fn configure(&mut self, period: u32, flags: TimerFlags, callback: Option<Callback<'a>>, event: Event) {
        self.period = period;
        self.remaining = period;
        self.flags = flags;
        self.callback = callback;
        self.event = event;
    }

    fn is_active(&self) -> bool {
        matches!(self.state, TimerState::Waiting | TimerState::Running)
    }
}

type Expired<'a, const SLOTS: usize> = Vec<(Callback<'a>, Event), SLOTS>;

/// One hardware timer and the software timers it serves.
struct Bank<'a, T, const SLOTS: usize> {
    hw: T,
    timers: [Timer<'a>; SLOTS],
}

impl<'a, T: CountdownTimer, const SLOTS: usize> Bank<'a, T, SLOTS> {
    fn timer(&self, id: TimerId) -> Result<&Timer<'a>, TimerError> {
        let timer = self.timers.get(id.slot()).ok_or(TimerError::InvalidId)?;
        if timer.generation != id.generation() {
            return Err(TimerError::Stale);
        }
        if timer.state == TimerState::Empty {
            return Err(TimerError::EmptySlot);
        }
        Ok(timer)
    }

    fn timer_mut(&mut self, id: TimerId) -> Result<&mut Timer<'a>, TimerError> {
        let timer = self.timers.get_mut(id.slot()).ok_or(TimerError::InvalidId)?;
        if timer.generation != id.generation() {
            return Err(TimerError::Stale);
        }
        if timer.state == TimerState::Empty {
            return Err(TimerError::EmptySlot);
        }
        Ok(timer)
    }

    /// Charge `elapsed` ticks to every running timer and collect the
    /// callbacks of those that reached zero.
    fn expire(&mut self, elapsed: u32) -> Expired<'a, SLOTS> {
        let mut expired: Expired<'a, SLOTS> = Vec::new();
        for timer in self.timers.iter_mut() {
            if timer.state != TimerState::Running {
                continue;
            }
            timer.remaining = timer.remaining.saturating_sub(elapsed);
            if timer.remaining > 0 {
                continue;
            }
            if timer.flags.is_periodic() {
                timer.remaining = timer.period;
            } else if timer.flags.kills() {
                timer.state = TimerState::Empty;
                timer.generation = timer.generation.wrapping_add(1);
            } else {
                timer.state = TimerState::Stopped;
            }
            if let Some(callback) = timer.callback {
                // one entry per slot at most
                let _ = expired.push((callback, timer.event));
            }
        }
        expired
    }

    /// Promote waiting timers and load the shortest remaining time.
    fn rearm(&mut self) -> Option<u32> {
        let mut next: Option<u32> = None;
        for timer in self.timers.iter_mut().filter(|t| t.is_active()) {
            timer.state = TimerState::Running;
            next = Some(next.map_or(timer.remaining, |n| n.min(timer.remaining)));
        }
        if let Some(ticks) = next {
            self.hw.arm(ticks);
        }
        next
    }
}

#[derive(Debug, Clone, Copy)]
enum StartMode {
    /// From the full period; fails if already active
    Normal,
    /// From the full period, whatever the current state
    Restart,
    /// From the remaining time; fails if already active
    Resume,
}

/// The timer daemon.
///
/// Owns both hardware banks. Shared by reference between the foreground,
/// the active objects and the two expiry interrupt handlers.
pub struct TimerDaemon<'a, T, const SLOTS: usize = DEFAULT_SLOTS> {
    banks: [Mutex<RefCell<Bank<'a, T, SLOTS>>>; BANKS],
    guards: [ReentryGuard; BANKS],
}

impl<'a, T: CountdownTimer, const SLOTS: usize> TimerDaemon<'a, T, SLOTS> {
    const SLOTS_FIT: () = assert!(SLOTS > 0 && SLOTS <= 256, "slot count must fit in a u8 index");

    /// Take ownership of the two hardware timers. Both are disabled.
    pub fn new(hardware: [T; BANKS]) -> Self {
        let () = Self::SLOTS_FIT;
        Self {
            banks: hardware.map(|mut hw| {
                hw.disable();
                Mutex::new(RefCell::new(Bank {
                    hw,
                    timers: [Timer::EMPTY; SLOTS],
                }))
            }),
            guards: core::array::from_fn(|_| ReentryGuard::new()),
        }
    }

    fn bank(&self, id: TimerId) -> Result<&Mutex<RefCell<Bank<'a, T, SLOTS>>>, TimerError> {
        self.banks.get(id.bank()).ok_or(TimerError::InvalidId)
    }

    fn check_period(period_us: u32) -> Result<(), TimerError> {
        if period_us == 0 {
            Err(TimerError::ZeroPeriod)
        } else if period_us > T::MAX_TICKS {
            Err(TimerError::PeriodTooLong(period_us))
        } else {
            Ok(())
        }
    }

    /// Allocate a stopped timer.
    ///
    /// Slots are searched slot-major across the banks, so consecutive timers
    /// land on alternating hardware timers.
    pub fn create(
        &self,
        period_us: u32,
        flags: TimerFlags,
        callback: Option<Callback<'a>>,
        event: Event,
    ) -> Result<TimerId, TimerError> {
        Self::check_period(period_us)?;
        let found = critical_section::with(|cs| {
            for slot in 0..SLOTS {
                for (bank, cell) in self.banks.iter().enumerate() {
                    let mut state = cell.borrow_ref_mut(cs);
                    let timer = &mut state.timers[slot];
                    if timer.state == TimerState::Empty {
                        timer.configure(period_us, flags, callback, event);
                        timer.state = TimerState::Stopped;
                        return Some(TimerId::new(bank as u8, slot as u8, timer.generation));
                    }
                }
            }
            None
        });
        match found {
            Some(id) => {
                log::debug!("timers: created {} ({}us, flags {:#x})", id, period_us, flags.bits());
                Ok(id)
            }
            None => {
                log::error!("timers: {}", TimerError::NoFreeSlot);
                Err(TimerError::NoFreeSlot)
            }
        }
    }

    /// Replace period, flags and callback of an existing timer. The timer is
    /// stopped first.
    pub fn set(
        &self,
        id: TimerId,
        period_us: u32,
        flags: TimerFlags,
        callback: Option<Callback<'a>>,
        event: Event,
    ) -> Result<(), TimerError> {
        Self::check_period(period_us)?;
        self.stop(id)?;
        critical_section::with(|cs| -> Result<(), TimerError> {
            self.bank(id)?
                .borrow_ref_mut(cs)
                .timer_mut(id)?
                .configure(period_us, flags, callback, event);
            Ok(())
        })
    }

    /// Start from the full period.
    pub fn start(&self, id: TimerId) -> Result<(), TimerError> {
        self.launch(id, StartMode::Normal)
    }

    /// Start from the full period, even if already running.
    pub fn restart(&self, id: TimerId) -> Result<(), TimerError> {
        self.launch(id, StartMode::Restart)
    }

    /// Continue a stopped timer from where it was stopped.
    pub fn resume(&self, id: TimerId) -> Result<(), TimerError> {
        self.launch(id, StartMode::Resume)
    }

    fn launch(&self, id: TimerId, mode: StartMode) -> Result<(), TimerError> {
        critical_section::with(|cs| -> Result<(), TimerError> {
            let mut bank = self.bank(id)?.borrow_ref_mut(cs);
            let timer = bank.timer_mut(id)?;
            match mode {
                StartMode::Normal => {
                    if timer.is_active() {
                        return Err(TimerError::AlreadyRunning);
                    }
                    timer.remaining = timer.period;
                }
                StartMode::Restart => timer.remaining = timer.period,
                StartMode::Resume => {
                    if timer.is_active() {
                        return Err(TimerError::AlreadyRunning);
                    }
                    if timer.remaining == 0 {
                        return Err(TimerError::NothingToResume);
                    }
                }
            }
            timer.state = TimerState::Waiting;
            Ok(())
        })?;
        self.service(id.bank(), false);
        Ok(())
    }

    /// Stop a timer, keeping its remaining time for [`resume`](Self::resume).
    /// Stopping a stopped timer succeeds.
    pub fn stop(&self, id: TimerId) -> Result<(), TimerError> {
        let changed = critical_section::with(|cs| -> Result<bool, TimerError> {
            // inside a pass, remaining times are already charged
            let in_pass = self.guards.get(id.bank()).is_some_and(|g| g.is_active(cs));
            let mut bank = self.bank(id)?.borrow_ref_mut(cs);
            let elapsed = if in_pass { 0 } else { bank.hw.elapsed() };
            let timer = bank.timer_mut(id)?;
            match timer.state {
                TimerState::Running => {
                    timer.remaining = timer.remaining.saturating_sub(elapsed);
                    timer.state = TimerState::Stopped;
                    Ok(true)
                }
                TimerState::Waiting => {
                    timer.state = TimerState::Stopped;
                    Ok(true)
                }
                _ => Ok(false),
            }
        })?;
        if changed {
            self.service(id.bank(), false);
        }
        Ok(())
    }

    /// Stop a timer and free its slot. `id` is stale afterwards.
    pub fn kill(&self, id: TimerId) -> Result<(), TimerError> {
        self.stop(id)?;
        critical_section::with(|cs| -> Result<(), TimerError> {
            let mut bank = self.bank(id)?.borrow_ref_mut(cs);
            let timer = bank.timer_mut(id)?;
            *timer = Timer {
                generation: timer.generation.wrapping_add(1),
                ..Timer::EMPTY
            };
            Ok(())
        })?;
        log::debug!("timers: killed {}", id);
        Ok(())
    }

    pub fn state(&self, id: TimerId) -> Result<TimerState, TimerError> {
        critical_section::with(|cs| -> Result<TimerState, TimerError> {
            Ok(self.bank(id)?.borrow_ref(cs).timer(id)?.state)
        })
    }

    /// Microseconds left until the timer fires
    pub fn remaining(&self, id: TimerId) -> Result<u32, TimerError> {
        critical_section::with(|cs| -> Result<u32, TimerError> {
            let in_pass = self.guards.get(id.bank()).is_some_and(|g| g.is_active(cs));
            let bank = self.bank(id)?.borrow_ref(cs);
            let timer = bank.timer(id)?;
            if timer.state == TimerState::Running && !in_pass {
                Ok(timer.remaining.saturating_sub(bank.hw.elapsed()))
            } else {
                Ok(timer.remaining)
            }
        })
    }

    /// True while `id` still names a live timer
    pub fn is_alive(&self, id: TimerId) -> bool {
        self.state(id).is_ok()
    }

    /// Number of empty slots across both banks
    pub fn free_slots(&self) -> usize {
        critical_section::with(|cs| {
            self.banks
                .iter()
                .map(|cell| {
                    cell.borrow_ref(cs)
                        .timers
                        .iter()
                        .filter(|t| t.state == TimerState::Empty)
                        .count()
                })
                .sum()
        })
    }

    /// Run `f` on the hardware timer of `bank`
    pub fn with_hardware<R>(&self, bank: usize, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        let cell = self.banks.get(bank)?;
        Some(critical_section::with(|cs| f(&mut cell.borrow_ref_mut(cs).hw)))
    }

    /// Expiry interrupt entry point of `bank`.
    pub fn on_timeout(&self, bank: usize) {
        if bank >= BANKS {
            log::warn!("timers: expiry on unknown bank {}", bank);
            return;
        }
        self.service(bank, true);
    }

    /// Charge elapsed time, fire expired timers and reload the counter.
    ///
    /// Callbacks run outside any critical section and may start or stop
    /// timers on the same bank; those requests are folded into the reload
    /// step of this pass.
    fn service(&self, bank: usize, from_isr: bool) {
        let (Some(cell), Some(guard)) = (self.banks.get(bank), self.guards.get(bank)) else {
            return;
        };
        let Some(token) = guard.try_enter() else {
            return;
        };

        let expired = critical_section::with(|cs| {
            let mut state = cell.borrow_ref_mut(cs);
            state.hw.disable();
            let elapsed = if from_isr {
                state.hw.reload_value()
            } else {
                state.hw.elapsed()
            };
            state.expire(elapsed)
        });

        for (callback, event) in expired {
            if let Err(fault) = callback.invoke(event) {
                log::error!("timers: bank {} callback to {} failed: {}", bank, callback.target(), fault);
            }
        }

        let next = token.settle(|| critical_section::with(|cs| cell.borrow_ref_mut(cs).rearm()));
        if let Some(ticks) = next {
            log::trace!("timers: bank {} armed for {}us", bank, ticks);
        }
    }
}

/// Object-safe view of a [`TimerDaemon`], independent of the hardware type.
///
/// Drivers hold a `&dyn TimerService` so they need not be generic over the
/// board's timer peripheral.
pub trait TimerService<'a>: Sync {
    fn create(
        &self,
        period_us: u32,
        flags: TimerFlags,
        callback: Option<Callback<'a>>,
        event: Event,
    ) -> Result<TimerId, TimerError>;

    fn set(
        &self,
        id: TimerId,
        period_us: u32,
        flags: TimerFlags,
        callback: Option<Callback<'a>>,
        event: Event,
    ) -> Result<(), TimerError>;

    fn start(&self, id: TimerId) -> Result<(), TimerError>;
    fn restart(&self, id: TimerId) -> Result<(), TimerError>;
    fn resume(&self, id: TimerId) -> Result<(), TimerError>;
    fn stop(&self, id: TimerId) -> Result<(), TimerError>;
    fn kill(&self, id: TimerId) -> Result<(), TimerError>;
    fn state(&self, id: TimerId) -> Result<TimerState, TimerError>;
}

impl<'a, T: CountdownTimer + Send, const SLOTS: usize> TimerService<'a> for TimerDaemon<'a, T, SLOTS> {
    fn create(
        &self,
        period_us: u32,
        flags: TimerFlags,
        callback: Option<Callback<'a>>,
        event: Event,
    ) -> Result<TimerId, TimerError> {
        TimerDaemon::create(self, period_us, flags, callback, event)
    }

    fn set(
        &self,
        id: TimerId,
        period_us: u32,
        flags: TimerFlags,
        callback: Option<Callback<'a>>,
        event: Event,
    ) -> Result<(), TimerError> {
        TimerDaemon::set(self, id, period_us, flags, callback, event)
    }

    fn start(&self, id: TimerId) -> Result<(), TimerError> {
        TimerDaemon::start(self, id)
    }

    fn restart(&self, id: TimerId) -> Result<(), TimerError> {
        TimerDaemon::restart(self, id)
    }

    fn resume(&self, id: TimerId) -> Result<(), TimerError> {
        TimerDaemon::resume(self, id)
    }

    fn stop(&self, id: TimerId) -> Result<(), TimerError> {
        TimerDaemon::stop(self, id)
    }

    fn kill(&self, id: TimerId) -> Result<(), TimerError> {
        TimerDaemon::kill(self, id)
    }

    fn state(&self, id: TimerId) -> Result<TimerState, TimerError> {
        TimerDaemon::state(self, id)
    }
}
