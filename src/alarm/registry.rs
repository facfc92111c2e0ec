use std::collections::HashMap;

use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Timelike, Weekday};
use serde::Serialize;

use crate::alarm::model::{
    AlarmEntry, AlarmError, AlarmId, format_hh_mm, normalize_label, parse_alarm_time,
};

/// What the notifier receives for an alarm that came due.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct DueAlarm {
    pub id: AlarmId,
    pub label: String,
    pub time: String,
}

/// Local calendar minute an alarm last rang in.
type WallMinute = (NaiveDate, u32, u32);

/// In-memory alarm list with per-tick due checks.
///
/// Each entry remembers the local wall-clock minute it last fired in, so an
/// entry rings at most once per matching minute no matter how many ticks land
/// inside it. A repeated hour at a DST fold reads the same wall minute twice
/// and still rings once.
#[derive(Debug, Default)]
pub struct AlarmRegistry {
    entries: Vec<AlarmEntry>,
    last_triggered_minute: HashMap<AlarmId, WallMinute>,
    next_sequence: u64,
}

impl AlarmRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, time: &str, label: Option<&str>) -> Result<AlarmEntry, AlarmError> {
        self.add_with_days(time, label, Vec::new())
    }

    pub fn add_with_days(
        &mut self,
        time: &str,
        label: Option<&str>,
        repeat_days: Vec<Weekday>,
    ) -> Result<AlarmEntry, AlarmError> {
        let time = parse_alarm_time(time)?;
        self.next_sequence += 1;
        let entry = AlarmEntry {
            id: AlarmId::from_sequence(self.next_sequence),
            time,
            label: normalize_label(label),
            active: true,
            repeat_days,
        };
        log::debug!(
            "added alarm {} at {} ({})",
            entry.id,
            entry.time_text(),
            entry.label
        );
        self.entries.push(entry.clone());
        Ok(entry)
    }

    /// Flips `active` and returns the new value, or `None` for unknown ids.
    pub fn toggle(&mut self, id: &AlarmId) -> Option<bool> {
        let entry = self.entries.iter_mut().find(|entry| &entry.id == id)?;
        entry.active = !entry.active;
        log::debug!("alarm {} active={}", entry.id, entry.active);
        Some(entry.active)
    }

    pub fn remove(&mut self, id: &AlarmId) -> Option<AlarmEntry> {
        let index = self.entries.iter().position(|entry| &entry.id == id)?;
        self.last_triggered_minute.remove(id);
        let removed = self.entries.remove(index);
        log::debug!("removed alarm {}", removed.id);
        Some(removed)
    }

    pub fn get(&self, id: &AlarmId) -> Option<&AlarmEntry> {
        self.entries.iter().find(|entry| &entry.id == id)
    }

    pub fn entries(&self) -> &[AlarmEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Active entries whose `HH:MM` equals the local time of `now` and that
    /// have not already fired during this minute.
    pub fn check_due<Tz: TimeZone>(&mut self, now: &DateTime<Tz>) -> Vec<DueAlarm> {
        let (hour, minute, weekday) = (now.hour(), now.minute(), now.weekday());
        let wall_minute = (now.date_naive(), hour, minute);

        let mut due = Vec::new();
        for entry in &self.entries {
            if !entry.active
                || entry.time.hour() != hour
                || entry.time.minute() != minute
                || !entry.runs_on(weekday)
            {
                continue;
            }
            if self.last_triggered_minute.get(&entry.id) == Some(&wall_minute) {
                continue;
            }
            self.last_triggered_minute.insert(entry.id.clone(), wall_minute);
            due.push(DueAlarm {
                id: entry.id.clone(),
                label: entry.label.clone(),
                time: format_hh_mm(entry.time),
            });
        }
        due
    }
}
