use serde::Serialize;

use crate::timer::{TimerHandle, TimerQueue};

/// Display refresh cadence while running.
pub const DISPLAY_TICK_MS: u64 = 10;

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopwatchState {
    Idle,
    Running,
    Paused,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize)]
pub struct Lap {
    pub number: u32,
    pub cumulative_ms: u64,
    pub split_ms: u64,
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct StopwatchSnapshot {
    pub state: StopwatchState,
    pub elapsed_ms: u64,
    pub laps: Vec<Lap>,
}

/// Start/pause/reset/lap state machine over a wall-clock accumulator.
///
/// Elapsed time is `accumulated + (now - segment_start)` and is folded into
/// the accumulator every time the engine observes the clock, so it only ever
/// grows while running. If the wall clock steps backwards the segment start is
/// moved back with it and the reading holds still instead of shrinking.
#[derive(Debug)]
pub struct StopwatchEngine {
    state: StopwatchState,
    accumulated_ms: u64,
    segment_start_ms: i64,
    last_lap_cumulative_ms: u64,
    laps: Vec<Lap>,
    timers: TimerQueue,
    display_tick: Option<TimerHandle>,
}

impl Default for StopwatchEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl StopwatchEngine {
    pub fn new() -> Self {
        Self {
            state: StopwatchState::Idle,
            accumulated_ms: 0,
            segment_start_ms: 0,
            last_lap_cumulative_ms: 0,
            laps: Vec::new(),
            timers: TimerQueue::new(),
            display_tick: None,
        }
    }

    pub fn state(&self) -> StopwatchState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == StopwatchState::Running
    }

    pub fn start(&mut self, now_ms: i64) -> bool {
        if self.state == StopwatchState::Running {
            return false;
        }
        self.segment_start_ms = now_ms;
        self.state = StopwatchState::Running;
        let tick = self
            .timers
            .schedule_repeating(now_ms, DISPLAY_TICK_MS, DISPLAY_TICK_MS);
        self.display_tick = Some(tick);
        log::debug!("stopwatch started at {} ms elapsed", self.accumulated_ms);
        true
    }

    pub fn pause(&mut self, now_ms: i64) -> bool {
        if self.state != StopwatchState::Running {
            return false;
        }
        self.observe(now_ms);
        self.state = StopwatchState::Paused;
        self.cancel_display_tick();
        log::debug!("stopwatch paused at {} ms", self.accumulated_ms);
        true
    }

    pub fn reset(&mut self) {
        self.cancel_display_tick();
        self.state = StopwatchState::Idle;
        self.accumulated_ms = 0;
        self.segment_start_ms = 0;
        self.last_lap_cumulative_ms = 0;
        self.laps.clear();
        log::debug!("stopwatch reset");
    }

    /// Records a lap. Ignored unless running.
    pub fn lap(&mut self, now_ms: i64) -> Option<Lap> {
        if self.state != StopwatchState::Running {
            return None;
        }
        let cumulative_ms = self.observe(now_ms);
        let lap = Lap {
            number: u32::try_from(self.laps.len() + 1).unwrap_or(u32::MAX),
            cumulative_ms,
            split_ms: cumulative_ms - self.last_lap_cumulative_ms,
        };
        self.last_lap_cumulative_ms = cumulative_ms;
        self.laps.push(lap);
        Some(lap)
    }

    /// Elapsed time as of `now_ms`, folding the running segment in.
    pub fn sample(&mut self, now_ms: i64) -> u64 {
        self.observe(now_ms)
    }

    /// Elapsed time as of the last observation.
    pub fn elapsed_ms(&self) -> u64 {
        self.accumulated_ms
    }

    pub fn laps(&self) -> &[Lap] {
        &self.laps
    }

    pub fn laps_newest_first(&self) -> impl Iterator<Item = &Lap> {
        self.laps.iter().rev()
    }

    pub fn snapshot(&self) -> StopwatchSnapshot {
        StopwatchSnapshot {
            state: self.state,
            elapsed_ms: self.accumulated_ms,
            laps: self.laps.clone(),
        }
    }

    pub fn next_deadline(&self) -> Option<i64> {
        self.timers.next_deadline()
    }

    /// Returns the fresh elapsed value when the display tick is due.
    pub fn poll(&mut self, now_ms: i64) -> Option<u64> {
        let expired = self.timers.pop_expired(now_ms)?;
        if Some(expired.handle) != self.display_tick {
            return None;
        }
        Some(self.observe(now_ms))
    }

    fn observe(&mut self, now_ms: i64) -> u64 {
        if self.state == StopwatchState::Running {
            let delta = now_ms.saturating_sub(self.segment_start_ms).max(0);
            self.accumulated_ms = self
                .accumulated_ms
                .saturating_add(u64::try_from(delta).unwrap_or(0));
            self.segment_start_ms = now_ms;
        }
        self.accumulated_ms
    }

    fn cancel_display_tick(&mut self) {
        if let Some(handle) = self.display_tick.take() {
            self.timers.cancel(handle);
        }
    }
}
