use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use anyhow::{Result, anyhow};
use chrono::{DateTime, Local, TimeZone};

/// Source of the current wall-clock instant, in Unix milliseconds.
pub trait TimeSource: Send + Sync {
    fn now_ms(&self) -> i64;
    fn label(&self) -> &'static str;
}

/// The host's wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now_ms(&self) -> i64 {
        Local::now().timestamp_millis()
    }

    fn label(&self) -> &'static str {
        "SYSTEM_WALL_CLOCK"
    }
}

/// A clock that only moves when told to. Clones share the same instant.
#[derive(Debug, Clone, Default)]
pub struct ManualTimeSource {
    now_ms: Arc<AtomicI64>,
}

impl ManualTimeSource {
    pub fn new(start_ms: i64) -> Self {
        Self {
            now_ms: Arc::new(AtomicI64::new(start_ms)),
        }
    }

    pub fn advance_ms(&self, delta_ms: i64) {
        self.now_ms.fetch_add(delta_ms, Ordering::Relaxed);
    }

    pub fn set_ms(&self, now_ms: i64) {
        self.now_ms.store(now_ms, Ordering::Relaxed);
    }
}

impl TimeSource for ManualTimeSource {
    fn now_ms(&self) -> i64 {
        self.now_ms.load(Ordering::Relaxed)
    }

    fn label(&self) -> &'static str {
        "MANUAL"
    }
}

pub fn to_local_datetime(unix_ms: i64) -> Result<DateTime<Local>> {
    Local
        .timestamp_millis_opt(unix_ms)
        .single()
        .ok_or_else(|| anyhow!("failed to convert {unix_ms} ms into local datetime"))
}
