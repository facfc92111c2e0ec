use std::io::Write;

use crate::alarm::registry::DueAlarm;

/// Receives alarms as they come due.
pub trait Notifier {
    fn ring(&mut self, alarm: &DueAlarm);
}

/// Writes a single line per ring to the wrapped writer.
pub struct TerminalNotifier<W: Write> {
    out: W,
}

impl<W: Write> TerminalNotifier<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> Notifier for TerminalNotifier<W> {
    fn ring(&mut self, alarm: &DueAlarm) {
        log::info!("alarm {} ringing: {} ({})", alarm.id, alarm.label, alarm.time);
        if let Err(err) = writeln!(self.out, "Alarm ringing: {} ({})", alarm.label, alarm.time) {
            log::warn!("failed to write alarm notification: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alarm::model::AlarmId;

    #[test]
    fn terminal_notifier_writes_label_and_time() {
        let mut notifier = TerminalNotifier::new(Vec::new());
        notifier.ring(&DueAlarm {
            id: AlarmId::from("alarm-1"),
            label: "Wake".to_string(),
            time: "07:00".to_string(),
        });
        let text = String::from_utf8(notifier.into_inner()).expect("utf8");
        assert_eq!(text, "Alarm ringing: Wake (07:00)\n");
    }
}
