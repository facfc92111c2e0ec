use std::cell::RefCell;
use std::rc::Rc;

use horo::format::TimeDisplayMode;
use horo::notifier::TerminalNotifier;
use horo::preferences::{Preferences, ThemeMode};
use horo::runtime::{Runtime, RuntimeEvent};
use horo::stopwatch::StopwatchState;
use horo::time_source::ManualTimeSource;

fn runtime_at(start_ms: i64) -> (ManualTimeSource, Runtime, Rc<RefCell<Vec<RuntimeEvent>>>) {
    let clock = ManualTimeSource::new(start_ms);
    let mut runtime = Runtime::new(
        Box::new(clock.clone()),
        Preferences::in_memory(false),
        Box::new(TerminalNotifier::new(Vec::new())),
    );
    let events = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&events);
    runtime.subscribe(move |event| sink.borrow_mut().push(event.clone()));
    (clock, runtime, events)
}

#[test]
fn stopwatch_reset_through_the_library() {
    let (clock, mut runtime, _) = runtime_at(1_700_000_000_000);
    assert!(runtime.start_stopwatch());
    clock.advance_ms(1_500);
    runtime.lap().expect("running");
    runtime.reset_stopwatch();

    let stopwatch = runtime.stopwatch();
    assert_eq!(stopwatch.state(), StopwatchState::Idle);
    assert_eq!(stopwatch.elapsed_ms(), 0);
    assert!(stopwatch.laps().is_empty());
    assert_eq!(runtime.next_deadline(), None);
}

#[test]
fn alarms_toggle_and_remove_by_id() {
    let (_, mut runtime, _) = runtime_at(1_700_000_000_000);
    let entry = runtime
        .add_alarm("07:00", Some("Wake"), Vec::new())
        .expect("valid");

    assert_eq!(runtime.toggle_alarm(&entry.id), Some(false));
    assert_eq!(runtime.toggle_alarm(&entry.id), Some(true));
    assert_eq!(
        runtime.remove_alarm(&entry.id).map(|removed| removed.label),
        Some("Wake".to_string())
    );
    assert!(runtime.alarms().is_empty());
    assert_eq!(runtime.toggle_alarm(&entry.id), None);
}

#[test]
fn preference_changes_reach_observers_as_json() {
    let (_, mut runtime, events) = runtime_at(1_700_000_000_000);
    runtime.set_theme(ThemeMode::Dark);
    runtime.set_clock_format(TimeDisplayMode::Hour12);

    let events = events.borrow();
    assert_eq!(events.len(), 2);
    let json = serde_json::to_value(&events[1]).expect("serialize");
    assert_eq!(json["event"], "preferences_changed");
    assert_eq!(json["theme"], "dark");
    assert_eq!(json["clock_format"], "hour12");
}
