//! Callback and context tests for hdx-core
//! These run on the host with std, against no_std compatible code

use std::sync::Mutex;

use hdx_core::{AoId, Callback, Context, Event, EventSink, Fault, Route, Signal};

#[derive(Default)]
struct Recorder {
    log: Mutex<Vec<(&'static str, AoId, Event)>>,
}

impl EventSink for Recorder {
    fn post(&self, target: AoId, event: Event) -> Result<(), Fault> {
        self.log.lock().unwrap().push(("post", target, event));
        Ok(())
    }

    fn dispatch(&self, target: AoId, event: Event) -> Result<(), Fault> {
        self.log.lock().unwrap().push(("dispatch", target, event));
        Ok(())
    }
}

struct Refusing;

impl EventSink for Refusing {
    fn post(&self, target: AoId, _event: Event) -> Result<(), Fault> {
        Err(Fault::MailboxOverflow(target))
    }
}

#[test]
fn test_callback_routes() {
    let sink = Recorder::default();
    let target = AoId::new(3);
    let evt = Event::with_data(Signal::new(1), 9);

    let posted = Callback::post(&sink, target);
    let direct = Callback::dispatch(&sink, target);
    assert_eq!(posted.route(), Route::Post);
    assert_eq!(direct.target(), target);

    posted.invoke(evt).unwrap();
    direct.invoke(evt).unwrap();

    let log = sink.log.lock().unwrap();
    assert_eq!(log[0], ("post", target, evt));
    assert_eq!(log[1], ("dispatch", target, evt));
}

#[test]
fn test_dispatch_defaults_to_post() {
    let cb = Callback::dispatch(&Refusing, AoId::new(1));
    assert_eq!(
        cb.invoke(Event::new(Signal::new(0))),
        Err(Fault::MailboxOverflow(AoId::new(1)))
    );
}

#[test]
fn test_context_post_self() {
    let sink = Recorder::default();
    let ctx = Context::new(&sink, AoId::new(5));
    ctx.post_self(Event::new(Signal::new(2))).unwrap();
    ctx.post(AoId::new(6), Event::new(Signal::new(3))).unwrap();

    let log = sink.log.lock().unwrap();
    assert_eq!(log[0].1, AoId::new(5));
    assert_eq!(log[1].1, AoId::new(6));
    assert_eq!(ctx.id(), AoId::new(5));
}

#[test]
fn test_fault_display_names_target() {
    let fault = Fault::UnknownTarget(AoId::new(12));
    assert_eq!(fault.target(), AoId::new(12));
    assert_eq!(fault.to_string(), "AO#12 is not registered");
}
