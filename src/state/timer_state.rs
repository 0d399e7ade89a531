//! Timer mode and the read-only timer snapshot

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use super::TimerSettings;
use crate::utils::format_time;

/// One of the three timer phases
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TimerMode {
    #[default]
    Pomodoro,
    ShortBreak,
    LongBreak,
}

impl TimerMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimerMode::Pomodoro => "pomodoro",
            TimerMode::ShortBreak => "shortBreak",
            TimerMode::LongBreak => "longBreak",
        }
    }

    pub fn is_break(&self) -> bool {
        !matches!(self, TimerMode::Pomodoro)
    }

    /// Mode that follows a finished session in `self`.
    ///
    /// `completed_before` is the pomodoro count at the moment the session
    /// finished, before it was counted. Every fourth pomodoro earns a long break.
    pub fn next(&self, completed_before: u32) -> TimerMode {
        match self {
            TimerMode::Pomodoro if completed_before % 4 == 3 => TimerMode::LongBreak,
            TimerMode::Pomodoro => TimerMode::ShortBreak,
            TimerMode::ShortBreak | TimerMode::LongBreak => TimerMode::Pomodoro,
        }
    }
}

impl fmt::Display for TimerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TimerMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pomodoro" => Ok(TimerMode::Pomodoro),
            "shortBreak" | "short-break" | "short_break" => Ok(TimerMode::ShortBreak),
            "longBreak" | "long-break" | "long_break" => Ok(TimerMode::LongBreak),
            other => Err(format!("Unknown timer mode: {}", other)),
        }
    }
}

/// Coarse state of the timer, derived from the running and ringing flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimerPhase {
    Idle,
    Running,
    Ringing,
}

/// Read-only view of the timer handed to the view layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerSnapshot {
    pub mode: TimerMode,
    pub time_left: u32,
    pub is_running: bool,
    pub is_muted: bool,
    pub is_alarm_ringing: bool,
    pub completed_pomodoros: u32,
    pub settings: TimerSettings,
    pub phase: TimerPhase,
    /// Remaining time as MM:SS
    pub display: String,
    /// Label of the current mode
    pub label: String,
    /// Fraction of the session already elapsed, in [0, 1]
    pub progress: f32,
}

impl TimerSnapshot {
    pub(crate) fn new(
        mode: TimerMode,
        time_left: u32,
        is_running: bool,
        is_muted: bool,
        is_alarm_ringing: bool,
        completed_pomodoros: u32,
        settings: &TimerSettings,
    ) -> Self {
        let phase = if is_alarm_ringing {
            TimerPhase::Ringing
        } else if is_running {
            TimerPhase::Running
        } else {
            TimerPhase::Idle
        };

        let total = settings.duration(mode);
        let progress = if total == 0 {
            0.0
        } else {
            (total.saturating_sub(time_left) as f32 / total as f32).clamp(0.0, 1.0)
        };

        Self {
            mode,
            time_left,
            is_running,
            is_muted,
            is_alarm_ringing,
            completed_pomodoros,
            settings: settings.clone(),
            phase,
            display: format_time(time_left),
            label: settings.label(mode).to_string(),
            progress,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_parses_from_path_segments() {
        assert_eq!("pomodoro".parse::<TimerMode>(), Ok(TimerMode::Pomodoro));
        assert_eq!("shortBreak".parse::<TimerMode>(), Ok(TimerMode::ShortBreak));
        assert_eq!("long-break".parse::<TimerMode>(), Ok(TimerMode::LongBreak));
        assert!("nap".parse::<TimerMode>().is_err());
    }

    #[test]
    fn every_fourth_pomodoro_earns_a_long_break() {
        let next: Vec<TimerMode> = (0..4).map(|n| TimerMode::Pomodoro.next(n)).collect();
        assert_eq!(
            next,
            vec![
                TimerMode::ShortBreak,
                TimerMode::ShortBreak,
                TimerMode::ShortBreak,
                TimerMode::LongBreak,
            ]
        );
        assert_eq!(TimerMode::Pomodoro.next(7), TimerMode::LongBreak);
        assert_eq!(TimerMode::ShortBreak.next(3), TimerMode::Pomodoro);
        assert_eq!(TimerMode::LongBreak.next(0), TimerMode::Pomodoro);
    }

    #[test]
    fn snapshot_derives_display_fields() {
        let settings = TimerSettings::default();
        let snapshot = TimerSnapshot::new(TimerMode::ShortBreak, 75, true, false, false, 2, &settings);

        assert_eq!(snapshot.phase, TimerPhase::Running);
        assert_eq!(snapshot.display, "01:15");
        assert_eq!(snapshot.label, "SHORT BREAK");
        assert!((snapshot.progress - 0.75).abs() < f32::EPSILON);
    }

    #[test]
    fn ringing_wins_over_idle() {
        let settings = TimerSettings::default();
        let snapshot = TimerSnapshot::new(TimerMode::Pomodoro, 0, false, true, true, 0, &settings);
        assert_eq!(snapshot.phase, TimerPhase::Ringing);
        assert_eq!(snapshot.progress, 1.0);
    }
}
