use std::time::{Duration, Instant};

use anyhow::Result;
use chrono::Weekday;
use serde::Serialize;

use crate::alarm::model::{AlarmEntry, AlarmError, AlarmId};
use crate::alarm::registry::{AlarmRegistry, DueAlarm};
use crate::diagnostics::sleep_until;
use crate::format::{ClockReading, TimeDisplayMode, format_clock};
use crate::notifier::Notifier;
use crate::preferences::{Preferences, ThemeMode};
use crate::stopwatch::{Lap, StopwatchEngine, StopwatchSnapshot};
use crate::ticker::SecondTicker;
use crate::time_source::{TimeSource, to_local_datetime};

/// A wake-up this long after the previous clock tick is treated as the host
/// coming back from suspension.
pub const RESUME_GAP_MS: i64 = 2_500;

#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RuntimeEvent {
    ClockTick {
        unix_ms: i64,
        display: String,
        reading: ClockReading,
    },
    Stopwatch(StopwatchSnapshot),
    AlarmDue(DueAlarm),
    PreferencesChanged {
        theme: ThemeMode,
        clock_format: TimeDisplayMode,
    },
}

type Observer = Box<dyn FnMut(&RuntimeEvent)>;

/// Owns the clock, stopwatch, alarms and preferences and drives their timers.
///
/// Every state change goes through a method here and is reported to the
/// registered observers as a [`RuntimeEvent`].
pub struct Runtime {
    source: Box<dyn TimeSource>,
    ticker: SecondTicker,
    stopwatch: StopwatchEngine,
    alarms: AlarmRegistry,
    preferences: Preferences,
    notifier: Box<dyn Notifier>,
    observers: Vec<Observer>,
    last_tick_ms: Option<i64>,
}

impl Runtime {
    pub fn new(
        source: Box<dyn TimeSource>,
        preferences: Preferences,
        notifier: Box<dyn Notifier>,
    ) -> Self {
        Self {
            source,
            ticker: SecondTicker::new(),
            stopwatch: StopwatchEngine::new(),
            alarms: AlarmRegistry::new(),
            preferences,
            notifier,
            observers: Vec::new(),
            last_tick_ms: None,
        }
    }

    pub fn subscribe(&mut self, observer: impl FnMut(&RuntimeEvent) + 'static) {
        self.observers.push(Box::new(observer));
    }

    pub fn now_ms(&self) -> i64 {
        self.source.now_ms()
    }

    pub fn source_label(&self) -> &'static str {
        self.source.label()
    }

    /// Shows the current time immediately and starts the aligned ticker.
    pub fn mount(&mut self) -> Result<()> {
        let now = self.now_ms();
        self.emit_clock_tick(now)?;
        self.ticker.start(now);
        Ok(())
    }

    /// Cancels every timer the runtime owns. A running stopwatch is paused.
    pub fn unmount(&mut self) {
        let now = self.now_ms();
        self.ticker.stop();
        if self.stopwatch.pause(now) {
            self.emit(RuntimeEvent::Stopwatch(self.stopwatch.snapshot()));
        }
    }

    pub fn set_visible(&mut self, visible: bool) -> Result<()> {
        let now = self.now_ms();
        if let Some(at) = self.ticker.on_visibility(visible, now) {
            self.emit_clock_tick(at)?;
        }
        Ok(())
    }

    pub fn next_deadline(&self) -> Option<i64> {
        match (self.ticker.next_deadline(), self.stopwatch.next_deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Handles every timer that is due at the current instant.
    pub fn dispatch_due(&mut self) -> Result<usize> {
        let now = self.now_ms();
        let mut dispatched = 0;

        if self.ticker.is_running()
            && self
                .last_tick_ms
                .is_some_and(|last| now - last > RESUME_GAP_MS || now < last)
        {
            log::debug!("clock resumed after suspension or a backwards step");
            self.set_visible(true)?;
            dispatched += 1;
        }

        while let Some(at) = self.ticker.poll(now) {
            self.emit_clock_tick(at)?;
            dispatched += 1;
        }
        while self.stopwatch.poll(now).is_some() {
            self.emit(RuntimeEvent::Stopwatch(self.stopwatch.snapshot()));
            dispatched += 1;
        }
        Ok(dispatched)
    }

    /// Sleeps until each deadline and dispatches it, until `done` says stop
    /// or nothing is scheduled any more.
    pub fn run_until(&mut self, mut done: impl FnMut(&Runtime) -> bool) -> Result<()> {
        while !done(self) {
            let Some(deadline) = self.next_deadline() else {
                break;
            };
            let wait_ms = u64::try_from(deadline - self.now_ms()).unwrap_or(0);
            sleep_until(Instant::now() + Duration::from_millis(wait_ms));
            self.dispatch_due()?;
        }
        Ok(())
    }

    pub fn stopwatch(&self) -> &StopwatchEngine {
        &self.stopwatch
    }

    pub fn start_stopwatch(&mut self) -> bool {
        let now = self.now_ms();
        let changed = self.stopwatch.start(now);
        if changed {
            self.emit(RuntimeEvent::Stopwatch(self.stopwatch.snapshot()));
        }
        changed
    }

    pub fn pause_stopwatch(&mut self) -> bool {
        let now = self.now_ms();
        let changed = self.stopwatch.pause(now);
        if changed {
            self.emit(RuntimeEvent::Stopwatch(self.stopwatch.snapshot()));
        }
        changed
    }

    pub fn reset_stopwatch(&mut self) {
        self.stopwatch.reset();
        self.emit(RuntimeEvent::Stopwatch(self.stopwatch.snapshot()));
    }

    pub fn lap(&mut self) -> Option<Lap> {
        let now = self.now_ms();
        let lap = self.stopwatch.lap(now)?;
        self.emit(RuntimeEvent::Stopwatch(self.stopwatch.snapshot()));
        Some(lap)
    }

    pub fn alarms(&self) -> &AlarmRegistry {
        &self.alarms
    }

    pub fn add_alarm(
        &mut self,
        time: &str,
        label: Option<&str>,
        repeat_days: Vec<Weekday>,
    ) -> Result<AlarmEntry, AlarmError> {
        self.alarms.add_with_days(time, label, repeat_days)
    }

    pub fn toggle_alarm(&mut self, id: &AlarmId) -> Option<bool> {
        self.alarms.toggle(id)
    }

    pub fn remove_alarm(&mut self, id: &AlarmId) -> Option<AlarmEntry> {
        self.alarms.remove(id)
    }

    pub fn preferences(&self) -> &Preferences {
        &self.preferences
    }

    pub fn set_theme(&mut self, theme: ThemeMode) {
        self.preferences.set_theme(theme);
        self.emit_preferences();
    }

    pub fn toggle_theme(&mut self) -> ThemeMode {
        let theme = self.preferences.toggle_theme();
        self.emit_preferences();
        theme
    }

    pub fn set_clock_format(&mut self, format: TimeDisplayMode) {
        self.preferences.set_clock_format(format);
        self.emit_preferences();
    }

    pub fn toggle_clock_format(&mut self) -> TimeDisplayMode {
        let format = self.preferences.toggle_clock_format();
        self.emit_preferences();
        format
    }

    fn emit_clock_tick(&mut self, unix_ms: i64) -> Result<()> {
        let local = to_local_datetime(unix_ms)?;
        let reading = ClockReading::from_datetime(&local);
        let display = format_clock(&reading, self.preferences.clock_format());
        self.last_tick_ms = Some(unix_ms);
        self.emit(RuntimeEvent::ClockTick {
            unix_ms,
            display,
            reading,
        });

        for due in self.alarms.check_due(&local) {
            self.notifier.ring(&due);
            self.emit(RuntimeEvent::AlarmDue(due));
        }
        Ok(())
    }

    fn emit_preferences(&mut self) {
        self.emit(RuntimeEvent::PreferencesChanged {
            theme: self.preferences.theme(),
            clock_format: self.preferences.clock_format(),
        });
    }

    fn emit(&mut self, event: RuntimeEvent) {
        for observer in &mut self.observers {
            observer(&event);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use chrono::{Local, TimeZone, Timelike};

    use super::*;
    use crate::time_source::ManualTimeSource;

    struct RecordingNotifier(Rc<RefCell<Vec<DueAlarm>>>);

    impl Notifier for RecordingNotifier {
        fn ring(&mut self, alarm: &DueAlarm) {
            self.0.borrow_mut().push(alarm.clone());
        }
    }

    struct Fixture {
        clock: ManualTimeSource,
        runtime: Runtime,
        events: Rc<RefCell<Vec<RuntimeEvent>>>,
        rings: Rc<RefCell<Vec<DueAlarm>>>,
    }

    fn fixture(start_ms: i64) -> Fixture {
        let clock = ManualTimeSource::new(start_ms);
        let rings = Rc::new(RefCell::new(Vec::new()));
        let mut runtime = Runtime::new(
            Box::new(clock.clone()),
            Preferences::in_memory(true),
            Box::new(RecordingNotifier(Rc::clone(&rings))),
        );
        let events = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&events);
        runtime.subscribe(move |event| sink.borrow_mut().push(event.clone()));
        Fixture {
            clock,
            runtime,
            events,
            rings,
        }
    }

    fn tick_count(events: &[RuntimeEvent]) -> usize {
        events
            .iter()
            .filter(|event| matches!(event, RuntimeEvent::ClockTick { .. }))
            .count()
    }

    fn local_ms(hour: u32, minute: u32, second: u32) -> i64 {
        Local
            .with_ymd_and_hms(2026, 6, 15, hour, minute, second)
            .earliest()
            .expect("valid local time")
            .timestamp_millis()
    }

    #[test]
    fn mount_emits_immediately_then_on_second_boundaries() {
        let mut f = fixture(1_700_000_000_400);
        f.runtime.mount().expect("mount");
        assert_eq!(tick_count(&f.events.borrow()), 1);
        assert_eq!(f.runtime.next_deadline(), Some(1_700_000_001_000));

        f.clock.set_ms(1_700_000_000_999);
        assert_eq!(f.runtime.dispatch_due().expect("dispatch"), 0);

        f.clock.set_ms(1_700_000_001_000);
        assert_eq!(f.runtime.dispatch_due().expect("dispatch"), 1);
        f.clock.set_ms(1_700_000_002_004);
        assert_eq!(f.runtime.dispatch_due().expect("dispatch"), 1);
        assert_eq!(tick_count(&f.events.borrow()), 3);
    }

    #[test]
    fn unmount_cancels_all_timers() {
        let mut f = fixture(0);
        f.runtime.mount().expect("mount");
        f.runtime.start_stopwatch();
        f.runtime.unmount();
        assert_eq!(f.runtime.next_deadline(), None);

        let before = f.events.borrow().len();
        f.clock.advance_ms(10_000);
        assert_eq!(f.runtime.dispatch_due().expect("dispatch"), 0);
        assert_eq!(f.events.borrow().len(), before);
    }

    #[test]
    fn clock_tick_uses_persisted_format() {
        let mut f = fixture(local_ms(13, 5, 0));
        f.runtime.set_clock_format(TimeDisplayMode::Hour12);
        f.runtime.mount().expect("mount");
        let events = f.events.borrow();
        let display = events.iter().find_map(|event| match event {
            RuntimeEvent::ClockTick { display, .. } => Some(display.clone()),
            _ => None,
        });
        assert_eq!(display.as_deref(), Some("01:05:00"));
    }

    #[test]
    fn alarm_rings_once_through_a_minute_of_ticks() {
        let start = local_ms(6, 59, 58);
        let mut f = fixture(start);
        let alarm_time = Local
            .timestamp_millis_opt(start + 2_000)
            .single()
            .expect("valid");
        let hh_mm = format!("{:02}:{:02}", alarm_time.hour(), alarm_time.minute());
        f.runtime
            .add_alarm(&hh_mm, Some("Wake"), Vec::new())
            .expect("valid");
        f.runtime.mount().expect("mount");

        for _ in 0..70 {
            f.clock.advance_ms(1_000);
            f.runtime.dispatch_due().expect("dispatch");
        }

        let rings = f.rings.borrow();
        assert_eq!(rings.len(), 1);
        assert_eq!(rings[0].label, "Wake");
        let due_events = f
            .events
            .borrow()
            .iter()
            .filter(|event| matches!(event, RuntimeEvent::AlarmDue(_)))
            .count();
        assert_eq!(due_events, 1);
    }

    #[test]
    fn suspension_gap_realigns_with_a_single_tick() {
        let mut f = fixture(10_000);
        f.runtime.mount().expect("mount");
        f.clock.set_ms(11_000);
        f.runtime.dispatch_due().expect("dispatch");
        assert_eq!(tick_count(&f.events.borrow()), 2);

        // Host slept through several ticks and wakes mid-second.
        f.clock.set_ms(45_300);
        assert_eq!(f.runtime.dispatch_due().expect("dispatch"), 1);
        assert_eq!(tick_count(&f.events.borrow()), 3);
        assert_eq!(f.runtime.next_deadline(), Some(46_000));

        f.clock.set_ms(46_000);
        assert_eq!(f.runtime.dispatch_due().expect("dispatch"), 1);
        assert_eq!(tick_count(&f.events.borrow()), 4);
    }

    #[test]
    fn backwards_clock_step_keeps_ticking() {
        let start = 1_700_000_000_000;
        let mut f = fixture(start);
        f.runtime.mount().expect("mount");
        f.clock.set_ms(start + 1_000);
        f.runtime.dispatch_due().expect("dispatch");
        assert_eq!(tick_count(&f.events.borrow()), 2);

        // Wall clock steps back one hour.
        f.clock.set_ms(start + 1_000 - 3_600_000);
        assert_eq!(f.runtime.dispatch_due().expect("dispatch"), 1);
        assert_eq!(f.runtime.next_deadline(), Some(start + 2_000 - 3_600_000));

        for _ in 0..10 {
            f.clock.advance_ms(1_000);
            assert_eq!(f.runtime.dispatch_due().expect("dispatch"), 1);
        }
        assert_eq!(tick_count(&f.events.borrow()), 13);
    }

    #[test]
    fn explicit_visibility_signal_emits_current_instant() {
        let mut f = fixture(10_000);
        f.runtime.mount().expect("mount");
        f.clock.set_ms(10_600);
        f.runtime.set_visible(false).expect("hidden");
        assert_eq!(tick_count(&f.events.borrow()), 1);
        f.runtime.set_visible(true).expect("visible");
        assert_eq!(tick_count(&f.events.borrow()), 2);
        assert_eq!(f.runtime.next_deadline(), Some(11_000));
    }

    #[test]
    fn stopwatch_flow_reports_snapshots() {
        let mut f = fixture(0);
        assert!(f.runtime.start_stopwatch());
        f.clock.advance_ms(1_000);
        let lap = f.runtime.lap().expect("running");
        assert_eq!(lap.split_ms, 1_000);
        assert_eq!(lap.cumulative_ms, 1_000);

        f.clock.advance_ms(20);
        assert!(f.runtime.dispatch_due().expect("dispatch") >= 1);
        assert!(f.runtime.pause_stopwatch());
        assert_eq!(f.runtime.lap(), None);

        f.runtime.reset_stopwatch();
        assert_eq!(f.runtime.stopwatch().elapsed_ms(), 0);
        assert!(f.runtime.stopwatch().laps().is_empty());

        let last = f.events.borrow().iter().rev().find_map(|event| match event {
            RuntimeEvent::Stopwatch(snapshot) => Some(snapshot.clone()),
            _ => None,
        });
        assert_eq!(last.map(|s| s.elapsed_ms), Some(0));
    }

    #[test]
    fn preference_changes_are_observed() {
        let mut f = fixture(0);
        assert_eq!(f.runtime.toggle_theme(), ThemeMode::Light);
        assert_eq!(f.runtime.toggle_clock_format(), TimeDisplayMode::Hour12);
        let events = f.events.borrow();
        assert_eq!(
            events.last(),
            Some(&RuntimeEvent::PreferencesChanged {
                theme: ThemeMode::Light,
                clock_format: TimeDisplayMode::Hour12,
            })
        );
    }

    #[test]
    fn events_serialize_with_tag() {
        let event = RuntimeEvent::ClockTick {
            unix_ms: 1,
            display: "00:00:00".to_string(),
            reading: ClockReading::new(0, 0, 0),
        };
        let json = serde_json::to_value(&event).expect("serialize");
        assert_eq!(json["event"], "clock_tick");
        assert_eq!(json["display"], "00:00:00");
    }
}
