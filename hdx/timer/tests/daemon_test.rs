//! Timer daemon integration tests
//!
//! Time is driven through the simulated countdown banks.

use std::sync::{Mutex, OnceLock};

use hdx_core::{AoId, Callback, Event, EventSink, Fault, Signal};
use hdx_timer::{
    sim::SimCountdown, CountdownTimer, TimerDaemon, TimerError, TimerFlags, TimerId, TimerState,
};

const TICK: Signal = Signal::new(7);

#[derive(Default)]
struct Recorder {
    log: Mutex<Vec<(AoId, Event)>>,
}

impl Recorder {
    fn targets(&self) -> Vec<u8> {
        self.log.lock().unwrap().iter().map(|(id, _)| id.raw()).collect()
    }

    fn count(&self) -> usize {
        self.log.lock().unwrap().len()
    }
}

impl EventSink for Recorder {
    fn post(&self, target: AoId, event: Event) -> Result<(), Fault> {
        self.log.lock().unwrap().push((target, event));
        Ok(())
    }
}

fn cb(sink: &Recorder, target: u8) -> Option<Callback<'_>> {
    Some(Callback::post(sink, AoId::new(target)))
}

#[test]
fn test_fires_after_exact_period() {
    let sink = Recorder::default();
    let timers = TimerDaemon::<SimCountdown>::simulated();
    let id = timers
        .create(1_000, TimerFlags::SINGLE_SHOT, cb(&sink, 1), Event::new(TICK))
        .unwrap();
    timers.start(id).unwrap();

    timers.advance(999);
    assert_eq!(sink.count(), 0);
    assert_eq!(timers.remaining(id), Ok(1));

    timers.advance(1);
    assert_eq!(sink.count(), 1);
    assert_eq!(timers.state(id), Ok(TimerState::Stopped));

    timers.advance(10_000);
    assert_eq!(sink.count(), 1);
}

#[test]
fn test_periodic_refires() {
    let sink = Recorder::default();
    let timers = TimerDaemon::<SimCountdown>::simulated();
    let id = timers
        .create(250, TimerFlags::PERIODIC, cb(&sink, 1), Event::new(TICK))
        .unwrap();
    timers.start(id).unwrap();

    timers.advance(1_000);
    assert_eq!(sink.count(), 4);
    timers.advance(249);
    assert_eq!(sink.count(), 4);
    timers.advance(1);
    assert_eq!(sink.count(), 5);
    assert_eq!(timers.state(id), Ok(TimerState::Running));
}

#[test]
fn test_callback_receives_template_copy() {
    let sink = Recorder::default();
    let timers = TimerDaemon::<SimCountdown>::simulated();
    let id = timers
        .create(10, TimerFlags::PERIODIC, cb(&sink, 3), Event::with_data(TICK, 0xBEEF))
        .unwrap();
    timers.start(id).unwrap();
    timers.advance(20);

    let log = sink.log.lock().unwrap();
    assert_eq!(log.len(), 2);
    for (target, event) in log.iter() {
        assert_eq!(target.raw(), 3);
        assert_eq!(event.signal, TICK);
        assert_eq!(event.data, 0xBEEF);
    }
}

#[test]
fn test_banks_fire_in_time_order() {
    let sink = Recorder::default();
    let timers = TimerDaemon::<SimCountdown>::simulated();
    let slow = timers.create(300, TimerFlags::SINGLE_SHOT, cb(&sink, 1), Event::new(TICK)).unwrap();
    let fast = timers.create(100, TimerFlags::SINGLE_SHOT, cb(&sink, 2), Event::new(TICK)).unwrap();
    assert_ne!(slow.bank(), fast.bank());

    timers.start(slow).unwrap();
    timers.start(fast).unwrap();
    timers.advance(500);
    assert_eq!(sink.targets(), vec![2, 1]);
}

#[test]
fn test_later_start_on_same_bank() {
    let sink = Recorder::default();
    let timers = TimerDaemon::<SimCountdown>::simulated();
    let long = timers.create(1_000, TimerFlags::SINGLE_SHOT, cb(&sink, 1), Event::new(TICK)).unwrap();
    let _other_bank = timers.create(1, TimerFlags::SINGLE_SHOT, None, Event::EMPTY).unwrap();
    let short = timers.create(100, TimerFlags::SINGLE_SHOT, cb(&sink, 2), Event::new(TICK)).unwrap();
    assert_eq!(long.bank(), short.bank());

    timers.start(long).unwrap();
    timers.advance(400);
    timers.start(short).unwrap();
    assert_eq!(timers.remaining(long), Ok(600));

    timers.advance(100);
    assert_eq!(sink.targets(), vec![2]);
    timers.advance(499);
    assert_eq!(sink.targets(), vec![2]);
    timers.advance(1);
    assert_eq!(sink.targets(), vec![2, 1]);
}

#[test]
fn test_create_alternates_banks() {
    let timers = TimerDaemon::<SimCountdown, 2>::simulated();
    let banks: Vec<usize> = (0..4)
        .map(|_| timers.create(5, TimerFlags::SINGLE_SHOT, None, Event::EMPTY).unwrap().bank())
        .collect();
    assert_eq!(banks, vec![0, 1, 0, 1]);
    assert_eq!(timers.free_slots(), 0);
    assert_eq!(
        timers.create(5, TimerFlags::SINGLE_SHOT, None, Event::EMPTY),
        Err(TimerError::NoFreeSlot)
    );
}

#[test]
fn test_error_codes() {
    let timers = TimerDaemon::<SimCountdown>::simulated();
    assert_eq!(
        timers.create(0, TimerFlags::SINGLE_SHOT, None, Event::EMPTY),
        Err(TimerError::ZeroPeriod)
    );

    let id = timers.create(50, TimerFlags::SINGLE_SHOT, None, Event::EMPTY).unwrap();
    assert_eq!(timers.resume(id), Ok(()));
    assert_eq!(timers.start(id), Err(TimerError::AlreadyRunning));
    assert_eq!(timers.resume(id), Err(TimerError::AlreadyRunning));
    assert_eq!(timers.restart(id), Ok(()));

    timers.advance(50);
    assert_eq!(timers.resume(id), Err(TimerError::NothingToResume));
    assert_eq!(timers.stop(id), Ok(()));
    assert_eq!(timers.stop(id), Ok(()));
    assert_eq!(
        timers.set(id, 0, TimerFlags::SINGLE_SHOT, None, Event::EMPTY),
        Err(TimerError::ZeroPeriod)
    );

    assert_eq!(timers.start(TimerId::from_raw(0x0200, 0)), Err(TimerError::InvalidId));
    assert_eq!(timers.start(TimerId::from_raw(0x0040, 0)), Err(TimerError::InvalidId));
    assert_eq!(timers.start(TimerId::from_raw(0x0005, 0)), Err(TimerError::EmptySlot));
}

#[derive(Default)]
struct Narrow(SimCountdown);

impl CountdownTimer for Narrow {
    const MAX_TICKS: u32 = 0xFFFF;

    fn disable(&mut self) {
        self.0.disable()
    }

    fn reload_value(&self) -> u32 {
        self.0.reload_value()
    }

    fn counter(&self) -> u32 {
        self.0.counter()
    }

    fn arm(&mut self, ticks: u32) {
        self.0.arm(ticks)
    }
}

#[test]
fn test_period_bounded_by_counter_width() {
    let timers: TimerDaemon<'_, Narrow> = TimerDaemon::new([Narrow::default(), Narrow::default()]);
    assert_eq!(
        timers.create(0x1_0000, TimerFlags::SINGLE_SHOT, None, Event::EMPTY),
        Err(TimerError::PeriodTooLong(0x1_0000))
    );
    assert!(timers.create(0xFFFF, TimerFlags::SINGLE_SHOT, None, Event::EMPTY).is_ok());
}

#[test]
fn test_stop_keeps_remaining_for_resume() {
    let sink = Recorder::default();
    let timers = TimerDaemon::<SimCountdown>::simulated();
    let id = timers
        .create(1_000, TimerFlags::SINGLE_SHOT, cb(&sink, 1), Event::new(TICK))
        .unwrap();
    timers.start(id).unwrap();
    timers.advance(300);
    timers.stop(id).unwrap();
    assert_eq!(timers.remaining(id), Ok(700));
    assert_eq!(timers.with_hardware(0, |hw| hw.is_enabled()), Some(false));

    timers.advance(5_000);
    assert_eq!(sink.count(), 0);

    timers.resume(id).unwrap();
    timers.advance(699);
    assert_eq!(sink.count(), 0);
    timers.advance(1);
    assert_eq!(sink.count(), 1);
}

#[test]
fn test_set_replaces_configuration() {
    let sink = Recorder::default();
    let timers = TimerDaemon::<SimCountdown>::simulated();
    let id = timers.create(1_000, TimerFlags::SINGLE_SHOT, None, Event::EMPTY).unwrap();
    timers.start(id).unwrap();
    timers
        .set(id, 20, TimerFlags::PERIODIC, cb(&sink, 4), Event::new(TICK))
        .unwrap();
    assert_eq!(timers.state(id), Ok(TimerState::Stopped));

    timers.start(id).unwrap();
    timers.advance(60);
    assert_eq!(sink.count(), 3);
}

#[test]
fn test_kill_invalidates_handle() {
    let timers = TimerDaemon::<SimCountdown>::simulated();
    let old = timers.create(10, TimerFlags::SINGLE_SHOT, None, Event::EMPTY).unwrap();
    timers.start(old).unwrap();
    timers.kill(old).unwrap();

    assert!(!timers.is_alive(old));
    assert_eq!(timers.start(old), Err(TimerError::Stale));
    assert_eq!(timers.kill(old), Err(TimerError::Stale));

    let new = timers.create(10, TimerFlags::SINGLE_SHOT, None, Event::EMPTY).unwrap();
    assert_eq!(new.raw(), old.raw());
    assert_ne!(new.generation(), old.generation());
    assert!(timers.is_alive(new));
}

#[test]
fn test_kill_flag_frees_slot_on_expiry() {
    let sink = Recorder::default();
    let timers = TimerDaemon::<SimCountdown>::simulated();
    let id = timers
        .create(10, TimerFlags::SINGLE_SHOT | TimerFlags::KILL, cb(&sink, 1), Event::new(TICK))
        .unwrap();
    let free = timers.free_slots();
    timers.start(id).unwrap();
    timers.advance(10);

    assert_eq!(sink.count(), 1);
    assert!(!timers.is_alive(id));
    assert_eq!(timers.free_slots(), free + 1);
}

/// Sink that manipulates timers from inside their callbacks
#[derive(Default)]
struct Chain {
    timers: OnceLock<&'static TimerDaemon<'static, SimCountdown>>,
    follow_up: OnceLock<TimerId>,
    fired: Mutex<Vec<u8>>,
}

impl EventSink for Chain {
    fn post(&self, target: AoId, _event: Event) -> Result<(), Fault> {
        self.fired.lock().unwrap().push(target.raw());
        let (Some(timers), Some(&next)) = (self.timers.get(), self.follow_up.get()) else {
            return Ok(());
        };
        match target.raw() {
            // start another timer on the same bank
            1 => timers.start(next).unwrap(),
            // stop the firing timer itself
            2 => timers.stop(next).unwrap(),
            _ => {}
        }
        Ok(())
    }
}

fn chain() -> (&'static Chain, &'static TimerDaemon<'static, SimCountdown>) {
    let sink: &'static Chain = Box::leak(Box::default());
    let timers: &'static TimerDaemon<'static, SimCountdown> = Box::leak(Box::new(TimerDaemon::simulated()));
    let _ = sink.timers.set(timers);
    (sink, timers)
}

#[test]
fn test_start_from_callback_is_rescheduled() {
    let (sink, timers) = chain();
    let first = timers
        .create(100, TimerFlags::SINGLE_SHOT, Some(Callback::post(sink, AoId::new(1))), Event::new(TICK))
        .unwrap();
    let _filler = timers.create(1, TimerFlags::SINGLE_SHOT, None, Event::EMPTY).unwrap();
    let second = timers
        .create(200, TimerFlags::SINGLE_SHOT, Some(Callback::post(sink, AoId::new(9))), Event::new(TICK))
        .unwrap();
    assert_eq!(first.bank(), second.bank());
    let _ = sink.follow_up.set(second);

    timers.start(first).unwrap();
    timers.advance(100);
    assert_eq!(*sink.fired.lock().unwrap(), vec![1]);
    assert_eq!(timers.state(second), Ok(TimerState::Running));
    assert_eq!(timers.remaining(second), Ok(200));

    timers.advance(200);
    assert_eq!(*sink.fired.lock().unwrap(), vec![1, 9]);
}

#[test]
fn test_stop_from_own_callback() {
    let (sink, timers) = chain();
    let id = timers
        .create(100, TimerFlags::PERIODIC, Some(Callback::post(sink, AoId::new(2))), Event::new(TICK))
        .unwrap();
    let _ = sink.follow_up.set(id);

    timers.start(id).unwrap();
    timers.advance(1_000);
    assert_eq!(*sink.fired.lock().unwrap(), vec![2]);
    assert_eq!(timers.state(id), Ok(TimerState::Stopped));
    assert_eq!(timers.with_hardware(id.bank(), |hw| hw.is_enabled()), Some(false));
}
