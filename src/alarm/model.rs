use std::fmt;

use chrono::{NaiveTime, Timelike, Weekday};
use serde::{Serialize, Serializer};
use thiserror::Error;

pub const DEFAULT_LABEL: &str = "Alarm";

#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum AlarmError {
    #[error("alarm time is empty")]
    EmptyTime,
    #[error("invalid alarm time '{0}', expected HH:MM")]
    InvalidTime(String),
    #[error("invalid weekday '{0}', expected Mon..Sun")]
    InvalidWeekday(String),
}

#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize)]
#[serde(transparent)]
pub struct AlarmId(String);

impl AlarmId {
    pub(crate) fn from_sequence(sequence: u64) -> Self {
        Self(format!("alarm-{sequence}"))
    }
}

impl fmt::Display for AlarmId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AlarmId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct AlarmEntry {
    pub id: AlarmId,
    #[serde(serialize_with = "serialize_hh_mm")]
    pub time: NaiveTime,
    pub label: String,
    pub active: bool,
    pub repeat_days: Vec<Weekday>,
}

impl AlarmEntry {
    pub fn time_text(&self) -> String {
        format_hh_mm(self.time)
    }

    /// An empty day list means the alarm is due every day.
    pub fn runs_on(&self, day: Weekday) -> bool {
        self.repeat_days.is_empty() || self.repeat_days.contains(&day)
    }
}

/// Parses a local 24h `HH:MM` (or `HH:MM:SS`, seconds dropped).
pub fn parse_alarm_time(input: &str) -> Result<NaiveTime, AlarmError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(AlarmError::EmptyTime);
    }
    let parsed = NaiveTime::parse_from_str(trimmed, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(trimmed, "%H:%M:%S"))
        .map_err(|_| AlarmError::InvalidTime(trimmed.to_string()))?;
    NaiveTime::from_hms_opt(parsed.hour(), parsed.minute(), 0)
        .ok_or_else(|| AlarmError::InvalidTime(trimmed.to_string()))
}

pub fn normalize_label(label: Option<&str>) -> String {
    match label.map(str::trim) {
        Some(text) if !text.is_empty() => text.to_string(),
        _ => DEFAULT_LABEL.to_string(),
    }
}

/// Parses a comma separated weekday list such as `Mon,Wed,Fri`.
pub fn parse_weekdays(input: &str) -> Result<Vec<Weekday>, AlarmError> {
    let mut days = Vec::new();
    for token in input.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        let day = token
            .parse::<Weekday>()
            .map_err(|_| AlarmError::InvalidWeekday(token.to_string()))?;
        if !days.contains(&day) {
            days.push(day);
        }
    }
    Ok(days)
}

pub fn format_hh_mm(time: NaiveTime) -> String {
    time.format("%H:%M").to_string()
}

fn serialize_hh_mm<S>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&format_hh_mm(*time))
}
