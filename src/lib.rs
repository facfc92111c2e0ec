//! Timing engine behind the `horo` binary: an aligned second ticker, a
//! wall-clock stopwatch, an alarm registry and persisted display preferences,
//! all driven by one deterministic timer queue.

pub mod alarm;
pub mod diagnostics;
pub mod format;
pub mod notifier;
pub mod preferences;
pub mod runtime;
pub mod stopwatch;
pub mod ticker;
pub mod time_source;
pub mod timer;
