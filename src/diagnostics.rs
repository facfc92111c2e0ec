use std::collections::VecDeque;
use std::io::Write;
use std::time::{Duration, Instant};

use anyhow::Result;

use crate::ticker::{SecondTicker, TICK_PERIOD_MS};
use crate::time_source::TimeSource;

/// Upper bounds (ms) of the lateness histogram buckets; the last bucket is open.
const LATENESS_BUCKETS_MS: [i64; 5] = [1, 2, 5, 10, 50];

/// How far past the second boundary aligned ticks actually land.
pub struct TickStats {
    total_ticks: u64,
    last_lateness_ms: i64,
    max_lateness_ms: i64,
    window_size: usize,
    window: VecDeque<i64>,
    histogram: [u64; 6],
}

impl TickStats {
    pub fn new(window_size: usize) -> Self {
        Self {
            total_ticks: 0,
            last_lateness_ms: 0,
            max_lateness_ms: 0,
            window_size: window_size.max(1),
            window: VecDeque::with_capacity(window_size.max(1)),
            histogram: [0; 6],
        }
    }

    /// Records a tick observed at `tick_ms`, measured against the preceding
    /// whole second.
    pub fn record_tick(&mut self, tick_ms: i64) {
        let lateness = tick_ms.rem_euclid(TICK_PERIOD_MS as i64);
        self.total_ticks += 1;
        self.last_lateness_ms = lateness;
        self.max_lateness_ms = self.max_lateness_ms.max(lateness);

        if self.window.len() == self.window_size {
            let _ = self.window.pop_front();
        }
        self.window.push_back(lateness);

        let bucket = LATENESS_BUCKETS_MS
            .iter()
            .position(|bound| lateness <= *bound)
            .unwrap_or(LATENESS_BUCKETS_MS.len());
        self.histogram[bucket] += 1;
    }

    pub fn total_ticks(&self) -> u64 {
        self.total_ticks
    }

    pub fn last_lateness_ms(&self) -> i64 {
        self.last_lateness_ms
    }

    pub fn max_lateness_ms(&self) -> i64 {
        self.max_lateness_ms
    }

    pub fn rolling_mean_ms(&self) -> f64 {
        if self.window.is_empty() {
            return 0.0;
        }
        self.window.iter().sum::<i64>() as f64 / self.window.len() as f64
    }

    pub fn histogram(&self) -> [u64; 6] {
        self.histogram
    }
}

pub fn run_diagnostics(source: &dyn TimeSource, ticks: u32, out: &mut impl Write) -> Result<()> {
    writeln!(out, "Horo diagnostics")?;
    writeln!(out, "Time source: {}", source.label())?;
    writeln!(out, "Measuring {ticks} aligned tick(s)...")?;

    let mut stats = TickStats::new(256);
    let mut ticker = SecondTicker::new();
    ticker.start(source.now_ms());
    while stats.total_ticks() < u64::from(ticks) {
        let Some(deadline) = ticker.next_deadline() else {
            break;
        };
        let wait_ms = u64::try_from(deadline - source.now_ms()).unwrap_or(0);
        sleep_until(Instant::now() + Duration::from_millis(wait_ms));
        if let Some(at) = ticker.poll(source.now_ms()) {
            stats.record_tick(at);
        }
    }
    ticker.stop();

    writeln!(out, "Tick lateness summary:")?;
    writeln!(out, "  Ticks: {}", stats.total_ticks())?;
    writeln!(out, "  Last lateness: {} ms", stats.last_lateness_ms())?;
    writeln!(out, "  Mean lateness: {:.1} ms", stats.rolling_mean_ms())?;
    writeln!(out, "  Max lateness: {} ms", stats.max_lateness_ms())?;
    writeln!(out, "  Histogram buckets (<=1, <=2, <=5, <=10, <=50, >50 ms):")?;
    writeln!(out, "  {:?}", stats.histogram())?;
    Ok(())
}

pub fn sleep_until(deadline: Instant) {
    let now = Instant::now();
    if now >= deadline {
        return;
    }

    let mut remaining = deadline.saturating_duration_since(now);
    if remaining > Duration::from_millis(1) {
        std::thread::sleep(remaining - Duration::from_micros(250));
    }

    loop {
        let current = Instant::now();
        if current >= deadline {
            break;
        }
        remaining = deadline.saturating_duration_since(current);
        if remaining > Duration::from_micros(50) {
            std::thread::yield_now();
        } else {
            std::hint::spin_loop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lateness_is_measured_from_the_whole_second() {
        let mut stats = TickStats::new(4);
        stats.record_tick(12_000);
        stats.record_tick(13_003);
        stats.record_tick(14_070);
        assert_eq!(stats.total_ticks(), 3);
        assert_eq!(stats.last_lateness_ms(), 70);
        assert_eq!(stats.max_lateness_ms(), 70);
        assert_eq!(stats.histogram(), [1, 0, 1, 0, 0, 1]);
        assert!((stats.rolling_mean_ms() - 73.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn rolling_window_drops_oldest() {
        let mut stats = TickStats::new(2);
        stats.record_tick(1_040);
        stats.record_tick(2_000);
        stats.record_tick(3_002);
        assert!((stats.rolling_mean_ms() - 1.0).abs() < 1e-9);
        assert_eq!(stats.max_lateness_ms(), 40);
    }

    #[test]
    fn sleep_until_past_deadline_returns_immediately() {
        let start = Instant::now();
        sleep_until(start - Duration::from_millis(5));
        assert!(start.elapsed() < Duration::from_millis(50));
    }
}
