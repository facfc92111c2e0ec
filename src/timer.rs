use std::collections::BTreeMap;

/// Smallest period a repeating timer may use.
pub const MIN_PERIOD_MS: u64 = 1;

#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct TimerHandle(u64);

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct Expired {
    pub handle: TimerHandle,
    pub deadline_ms: i64,
    pub repeating: bool,
}

#[derive(Debug, Clone, Copy)]
struct PendingTimer {
    deadline_ms: i64,
    period_ms: Option<i64>,
}

/// Single-threaded timer queue driven by explicit timestamps.
///
/// The queue never reads a clock. Callers pass the current Unix time in
/// milliseconds to every operation and drain expired timers with
/// [`TimerQueue::pop_expired`], one at a time, so each expiry is fully handled
/// before the next one is looked at.
///
/// Cancellation is idempotent: cancelling a handle twice, or cancelling a
/// handle that already fired, is a no-op, and a cancelled handle is never
/// reported as expired.
#[derive(Debug, Default)]
pub struct TimerQueue {
    next_handle: u64,
    pending: BTreeMap<TimerHandle, PendingTimer>,
}

impl TimerQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule_once(&mut self, now_ms: i64, delay_ms: u64) -> TimerHandle {
        self.insert(PendingTimer {
            deadline_ms: now_ms.saturating_add(clamp_ms(delay_ms)),
            period_ms: None,
        })
    }

    pub fn schedule_repeating(
        &mut self,
        now_ms: i64,
        first_delay_ms: u64,
        period_ms: u64,
    ) -> TimerHandle {
        self.insert(PendingTimer {
            deadline_ms: now_ms.saturating_add(clamp_ms(first_delay_ms)),
            period_ms: Some(clamp_ms(period_ms.max(MIN_PERIOD_MS))),
        })
    }

    pub fn cancel(&mut self, handle: TimerHandle) -> bool {
        self.pending.remove(&handle).is_some()
    }

    pub fn cancel_all(&mut self) {
        self.pending.clear();
    }

    pub fn is_pending(&self, handle: TimerHandle) -> bool {
        self.pending.contains_key(&handle)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn next_deadline(&self) -> Option<i64> {
        self.pending.values().map(|timer| timer.deadline_ms).min()
    }

    /// Returns the earliest timer whose deadline is at or before `now_ms`.
    ///
    /// Repeating timers that slept through several periods fire once and are
    /// re-armed on the first grid point strictly after `now_ms`.
    pub fn pop_expired(&mut self, now_ms: i64) -> Option<Expired> {
        let (handle, timer) = self
            .pending
            .iter()
            .filter(|(_, timer)| timer.deadline_ms <= now_ms)
            .min_by_key(|(handle, timer)| (timer.deadline_ms, **handle))
            .map(|(handle, timer)| (*handle, *timer))?;

        match timer.period_ms {
            None => {
                self.pending.remove(&handle);
            }
            Some(period) => {
                let missed = (now_ms - timer.deadline_ms).div_euclid(period);
                let next_deadline = timer
                    .deadline_ms
                    .saturating_add(period.saturating_mul(missed.saturating_add(1)));
                if let Some(entry) = self.pending.get_mut(&handle) {
                    entry.deadline_ms = next_deadline;
                }
            }
        }

        Some(Expired {
            handle,
            deadline_ms: timer.deadline_ms,
            repeating: timer.period_ms.is_some(),
        })
    }

    fn insert(&mut self, timer: PendingTimer) -> TimerHandle {
        let handle = TimerHandle(self.next_handle);
        self.next_handle += 1;
        self.pending.insert(handle, timer);
        handle
    }
}

fn clamp_ms(ms: u64) -> i64 {
    i64::try_from(ms).unwrap_or(i64::MAX)
}
