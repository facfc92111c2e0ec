use crate::timer::{TimerHandle, TimerQueue};

pub const TICK_PERIOD_MS: u64 = 1_000;

/// Milliseconds from `now_ms` until the next whole second.
///
/// Exactly on a boundary this is a full period, never zero.
pub fn alignment_delay_ms(now_ms: i64) -> u64 {
    let period = TICK_PERIOD_MS as i64;
    (period - now_ms.rem_euclid(period)) as u64
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
enum Phase {
    Idle,
    Aligning(TimerHandle),
    Ticking(TimerHandle),
}

/// Once-per-second subscription aligned to real second boundaries.
///
/// The ticker first waits out the remainder of the current second with a
/// one-shot timer, then switches to a repeating interval anchored on that
/// boundary. Only one of the two timers is ever pending. Becoming visible
/// again after a suspension cancels whatever is pending, emits the current
/// instant right away and aligns from scratch.
#[derive(Debug)]
pub struct SecondTicker {
    timers: TimerQueue,
    phase: Phase,
}

impl Default for SecondTicker {
    fn default() -> Self {
        Self::new()
    }
}

impl SecondTicker {
    pub fn new() -> Self {
        Self {
            timers: TimerQueue::new(),
            phase: Phase::Idle,
        }
    }

    pub fn start(&mut self, now_ms: i64) {
        self.timers.cancel_all();
        let delay = alignment_delay_ms(now_ms);
        let handle = self.timers.schedule_once(now_ms, delay);
        log::debug!("ticker aligning, first tick in {delay} ms");
        self.phase = Phase::Aligning(handle);
    }

    pub fn stop(&mut self) {
        if self.phase != Phase::Idle {
            log::debug!("ticker stopped");
        }
        self.timers.cancel_all();
        self.phase = Phase::Idle;
    }

    pub fn is_running(&self) -> bool {
        self.phase != Phase::Idle
    }

    pub fn next_deadline(&self) -> Option<i64> {
        self.timers.next_deadline()
    }

    pub fn poll(&mut self, now_ms: i64) -> Option<i64> {
        let expired = self.timers.pop_expired(now_ms)?;
        match self.phase {
            Phase::Aligning(handle) if handle == expired.handle => {
                // The alignment deadline sits on a whole second, so the next
                // boundary after `now_ms` keeps the interval on that grid.
                let interval = self.timers.schedule_repeating(
                    now_ms,
                    alignment_delay_ms(now_ms),
                    TICK_PERIOD_MS,
                );
                self.phase = Phase::Ticking(interval);
                Some(now_ms)
            }
            Phase::Ticking(handle) if handle == expired.handle => Some(now_ms),
            _ => None,
        }
    }

    pub fn on_visibility(&mut self, visible: bool, now_ms: i64) -> Option<i64> {
        if !visible || !self.is_running() {
            return None;
        }
        log::debug!("ticker realigning after becoming visible");
        self.start(now_ms);
        Some(now_ms)
    }
}
