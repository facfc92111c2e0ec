use chrono::{DateTime, TimeZone, Timelike};
use serde::Serialize;

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize)]
pub struct ClockReading {
    pub hours: u32,
    pub minutes: u32,
    pub seconds: u32,
}

impl ClockReading {
    pub fn new(hours: u32, minutes: u32, seconds: u32) -> Self {
        Self {
            hours,
            minutes,
            seconds,
        }
    }

    pub fn from_datetime<Tz: TimeZone>(instant: &DateTime<Tz>) -> Self {
        Self::new(instant.hour(), instant.minute(), instant.second())
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeDisplayMode {
    Hour24,
    Hour12,
}

impl TimeDisplayMode {
    pub fn as_store_value(self) -> &'static str {
        match self {
            TimeDisplayMode::Hour24 => "24",
            TimeDisplayMode::Hour12 => "12",
        }
    }

    pub fn from_store_value(value: &str) -> Option<Self> {
        match value {
            "24" => Some(TimeDisplayMode::Hour24),
            "12" => Some(TimeDisplayMode::Hour12),
            _ => None,
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            TimeDisplayMode::Hour24 => TimeDisplayMode::Hour12,
            TimeDisplayMode::Hour12 => TimeDisplayMode::Hour24,
        }
    }
}

/// Fixed-width `HH:MM:SS`. In 12-hour mode midnight and noon read `12`.
pub fn format_clock(reading: &ClockReading, mode: TimeDisplayMode) -> String {
    let hours = match mode {
        TimeDisplayMode::Hour24 => reading.hours,
        TimeDisplayMode::Hour12 => match reading.hours % 12 {
            0 => 12,
            hour => hour,
        },
    };
    format!("{hours:02}:{:02}:{:02}", reading.minutes, reading.seconds)
}

/// `MM:SS.CC`. Minutes keep growing past 59; there is no hour field.
pub fn format_stopwatch(elapsed_ms: u64) -> String {
    let total_secs = elapsed_ms / 1000;
    let minutes = total_secs / 60;
    let seconds = total_secs % 60;
    let centis = (elapsed_ms % 1000) / 10;
    format!("{minutes:02}:{seconds:02}.{centis:02}")
}

/// Long date shown above the clock, e.g. `Sunday, October 18, 2026`.
pub fn format_date_line<Tz: TimeZone>(instant: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    instant.format("%A, %B %-d, %Y").to_string()
}
